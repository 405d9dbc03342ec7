//! Imagemill is a streaming image transformation filter for response
//! pipelines.
//!
//! A response flows through in three stages: the header gate decides whether
//! to intercept at all, a per-request session then accumulates the chunked
//! body inside a hard byte limit, and a transformation run rewrites the
//! image before it continues downstream with corrected metadata.
//!
//! # Filter overview
//!
//! 1. **Gate**: `ResponseHead -> Gate` (engage, pass through, or reject up front)
//! 2. **Read**: ordered [`BodyChunk`]s accumulate in a buffer allocated once
//!    ([`FeedOutcome::NeedMore`])
//! 3. **Process**: decode -> [`CommandPipeline`] -> re-encode via an [`ImageEngine`]
//! 4. **Pass**: the replacement body is emitted ([`FeedOutcome::Emit`]); later
//!    chunks forward unchanged
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Strictly sequential per request**: a session consumes chunks in stream
//!   order; the only suspension point is `NeedMore`.
//! - **Bounded memory**: one arena per request, sized up front, never grown.
//! - **Scoped resources**: decoded image handles are dropped on every exit
//!   path, success or failure.
//! - **One immutable configuration per scope**: directives merge once into a
//!   [`ResolvedFilterConfig`] shared by all sessions.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod command;
mod config;
mod engine;
mod error;
mod filter;
mod sniff;

pub use command::options::{
    CompositeOptions, ConvertOptions, Geometry, Gravity, ResizeMode, Rotation, parse_offset,
};
pub use command::pipeline::{CommandFailure, CommandPipeline, TransformCommand};
pub use config::directives::{
    CommandDirective, DEFAULT_BUFFER_SIZE, DEFAULT_QUALITY, FilterDirectives, ResolvedFilterConfig,
};
pub use engine::raster::RasterEngine;
pub use engine::{EngineKind, ImageEngine, ImageHandle, create_engine};
pub use error::{MillError, MillResult, UNSUPPORTED_MEDIA_TYPE};
pub use filter::accumulate::{Accumulation, BodyBuffer};
pub use filter::orchestrate::{OutputPackage, transform_body};
pub use filter::session::{
    BodyChunk, EmittedBody, FeedOutcome, FilterSession, Gate, ImageFilter, Phase, ResponseHead,
};
pub use sniff::{ImageKind, SNIFF_PREFIX_LEN};
