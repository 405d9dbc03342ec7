pub mod raster;

use std::sync::Arc;

use crate::command::options::{CompositeOptions, ConvertOptions};
use crate::error::MillResult;

/// A decoded image owned by exactly one transformation run.
///
/// Handles release their engine-side state when dropped, so every exit path
/// out of a run disposes of them without explicit cleanup calls.
pub trait ImageHandle: Send {
    /// Re-render the working image per convert options.
    fn convert(&mut self, opts: &ConvertOptions) -> MillResult<()>;

    /// Overlay a secondary image per composite options.
    fn composite(&mut self, opts: &CompositeOptions) -> MillResult<()>;

    /// Re-encode the current pixels into the handle's target format.
    ///
    /// `quality` applies to lossy targets and is ignored by lossless ones.
    fn encode(&self, quality: u8) -> MillResult<Vec<u8>>;

    /// Current pixel dimensions as `(width, height)`.
    fn dimensions(&self) -> (u32, u32);
}

/// Image-processing capability behind the filter: decodes accumulated bodies
/// into working handles.
///
/// Implementations report decode failures as [`MillError::Decode`] and keep
/// no per-request state of their own; one engine serves every session in the
/// scope.
///
/// [`MillError::Decode`]: crate::error::MillError::Decode
pub trait ImageEngine: Send + Sync {
    /// Decode an in-memory encoded image into a working handle.
    fn decode(&self, bytes: &[u8]) -> MillResult<Box<dyn ImageHandle>>;
}

/// Available engine implementations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineKind {
    /// In-process raster engine backed by the `image` crate.
    Raster,
}

/// Create an engine of the requested kind, ready to share across sessions.
pub fn create_engine(kind: EngineKind) -> Arc<dyn ImageEngine> {
    match kind {
        EngineKind::Raster => Arc::new(raster::RasterEngine::new()),
    }
}
