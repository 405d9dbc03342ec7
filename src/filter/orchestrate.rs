use crate::command::pipeline::CommandPipeline;
use crate::engine::ImageEngine;
use crate::error::{MillError, MillResult};

/// Final encoded body produced by one transformation run.
///
/// Ownership of the bytes moves to whoever forwards them downstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputPackage {
    bytes: Vec<u8>,
}

impl OutputPackage {
    /// Wrap encoded output bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Encoded body bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Corrected Content-Length for the outgoing response.
    pub fn content_length(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Consume the package, handing the bytes to the outbound stream.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Run one complete transformation: decode the body, apply the pipeline,
/// re-encode, package.
///
/// The run consumes the input body and owns the decoded handle for its whole
/// scope, so both are released on every exit path, success or failure.
#[tracing::instrument(skip_all, fields(body_len = body.len(), commands = pipeline.len()))]
pub fn transform_body(
    engine: &dyn ImageEngine,
    body: Vec<u8>,
    pipeline: &CommandPipeline,
    quality: u8,
) -> MillResult<OutputPackage> {
    let mut handle = engine.decode(&body)?;
    tracing::debug!(dimensions = ?handle.dimensions(), "decoded body");
    if let Err(failure) = pipeline.run(handle.as_mut()) {
        let command = pipeline.commands()[failure.index].name();
        return Err(MillError::transform(
            failure.index,
            format!("{command}: {}", failure.cause),
        ));
    }
    let bytes = handle.encode(quality)?;
    tracing::debug!(out_len = bytes.len(), "re-encoded body");
    Ok(OutputPackage::new(bytes))
}
