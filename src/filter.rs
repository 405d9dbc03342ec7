pub mod accumulate;
pub mod orchestrate;
pub mod session;
