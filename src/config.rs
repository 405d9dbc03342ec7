pub mod directives;
