use std::sync::Arc;

use crate::command::pipeline::CommandPipeline;
use crate::config::directives::ResolvedFilterConfig;
use crate::engine::ImageEngine;
use crate::error::{MillError, MillResult};
use crate::filter::accumulate::{Accumulation, BodyBuffer};
use crate::filter::orchestrate::{OutputPackage, transform_body};
use crate::sniff::ImageKind;

const NOT_MODIFIED: u16 = 304;
const MIXED_REPLACE: &str = "multipart/x-mixed-replace";

/// Lifecycle phase of one filter session. Transitions only move forward:
/// `Start -> Read -> Process -> Pass -> Done`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Waiting for the first bytes to sniff.
    Start,
    /// Accumulating the body.
    Read,
    /// Transforming the completed body.
    Process,
    /// Forwarding the rest of the stream unchanged.
    Pass,
    /// Terminal; any further delivery is a stream error.
    Done,
}

/// One segment of a streamed response body, delivered in stream order.
#[derive(Clone, Copy, Debug)]
pub struct BodyChunk<'a> {
    /// Chunk payload.
    pub data: &'a [u8],
    /// End-of-body marker.
    pub last: bool,
}

impl<'a> BodyChunk<'a> {
    /// A non-final chunk.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, last: false }
    }

    /// The final chunk of the body.
    pub fn last(data: &'a [u8]) -> Self {
        Self { data, last: true }
    }
}

/// Response metadata inspected by the header gate.
#[derive(Clone, Debug)]
pub struct ResponseHead {
    /// Upstream status code.
    pub status: u16,
    /// Upstream Content-Type, if any.
    pub content_type: Option<String>,
    /// Declared body length, if known up front.
    pub content_length: Option<u64>,
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self {
            status: 200,
            content_type: None,
            content_length: None,
        }
    }
}

/// Decision produced by [`ImageFilter::gate`].
pub enum Gate {
    /// Leave this response alone; forward headers and body untouched.
    Pass,
    /// Intercept the body with the returned session.
    ///
    /// The host must keep the body in memory, disable range serving, drop
    /// any `Refresh` header, and withhold the outgoing headers until the
    /// session emits its replacement body.
    Transform(FilterSession),
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => f.write_str("Pass"),
            Self::Transform(session) => f.debug_tuple("Transform").field(session).finish(),
        }
    }
}

/// Replacement body emitted after a successful transformation.
#[derive(Debug)]
pub struct EmittedBody {
    /// The packaged encoded body.
    pub package: OutputPackage,
    /// Corrected Content-Type for the outgoing headers, from re-sniffing
    /// the output.
    pub content_type: &'static str,
}

/// What the host must do after delivering a batch of chunks.
#[derive(Debug)]
#[must_use]
pub enum FeedOutcome {
    /// Body incomplete. Deliver more chunks later, and mark the request's
    /// output as buffered so silence is not mistaken for completion.
    NeedMore,
    /// Replacement body ready. Rewrite Content-Type and Content-Length from
    /// it, send headers, then forward the body downstream.
    Emit(EmittedBody),
    /// Forward the delivered batch downstream unchanged.
    Forward,
}

/// An installed body filter: one immutable resolved configuration plus a
/// shared engine.
///
/// Cheap to clone; clones share the same configuration and engine.
#[derive(Clone)]
pub struct ImageFilter {
    config: Arc<ResolvedFilterConfig>,
    engine: Arc<dyn ImageEngine>,
}

impl ImageFilter {
    /// Install a filter over a resolved configuration and an engine.
    pub fn new(config: ResolvedFilterConfig, engine: Arc<dyn ImageEngine>) -> Self {
        Self {
            config: Arc::new(config),
            engine,
        }
    }

    /// The resolved configuration this filter serves.
    pub fn config(&self) -> &ResolvedFilterConfig {
        &self.config
    }

    /// Inspect response headers and decide whether to intercept the body.
    ///
    /// Responses pass untouched when the scope configures no commands or the
    /// status is `304 Not Modified`. A `multipart/x-mixed-replace` response
    /// or a declared length beyond the buffer capacity is rejected before
    /// anything is allocated.
    pub fn gate(&self, head: &ResponseHead) -> MillResult<Gate> {
        let Some(pipeline) = self.config.pipeline() else {
            return Ok(Gate::Pass);
        };
        if head.status == NOT_MODIFIED {
            return Ok(Gate::Pass);
        }
        if head.content_type.as_deref().is_some_and(is_mixed_replace) {
            tracing::warn!("image filter cannot buffer a multipart/x-mixed-replace response");
            return Err(MillError::unsupported_media("multipart/x-mixed-replace response"));
        }
        let capacity = self.config.buffer_capacity;
        if let Some(declared) = head.content_length
            && declared > capacity as u64
        {
            tracing::warn!(
                declared,
                capacity,
                "declared body length exceeds the image filter buffer"
            );
            return Err(MillError::TooLarge {
                size: declared,
                capacity: capacity as u64,
            });
        }
        // A declared length tightens the accumulation limit below capacity.
        let limit = head.content_length.map_or(capacity, |declared| declared as usize);
        Ok(Gate::Transform(FilterSession {
            phase: Phase::Start,
            declared_length: head.content_length,
            buffer: BodyBuffer::new(limit),
            detected: None,
            pipeline: pipeline.clone(),
            quality: self.config.quality,
            engine: Arc::clone(&self.engine),
        }))
    }
}

fn is_mixed_replace(content_type: &str) -> bool {
    content_type
        .get(..MIXED_REPLACE.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(MIXED_REPLACE))
}

/// Per-request transformation state: the phase machine, the bounded body
/// buffer, and the format detected from the first chunk.
///
/// Strictly sequential: one `feed` call at a time, in stream order. The
/// session never retains chunk references past the call.
pub struct FilterSession {
    phase: Phase,
    declared_length: Option<u64>,
    buffer: BodyBuffer,
    detected: Option<ImageKind>,
    pipeline: CommandPipeline,
    quality: u8,
    engine: Arc<dyn ImageEngine>,
}

impl std::fmt::Debug for FilterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterSession")
            .field("phase", &self.phase)
            .field("declared_length", &self.declared_length)
            .field("buffered", &self.buffer.written())
            .field("detected", &self.detected)
            .finish_non_exhaustive()
    }
}

impl FilterSession {
    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Format detected from the first chunk, once known.
    pub fn detected_format(&self) -> Option<ImageKind> {
        self.detected
    }

    /// Declared body length from the response head, if any.
    pub fn declared_length(&self) -> Option<u64> {
        self.declared_length
    }

    /// Bytes buffered so far.
    pub fn bytes_buffered(&self) -> usize {
        self.buffer.written()
    }

    /// Deliver the next ordered batch of body chunks.
    ///
    /// The first chunk of the body is sniffed as delivered, so it must
    /// already hold the signature prefix. An empty batch is a no-op and is
    /// forwarded in any phase. Any error terminates the request: the host
    /// answers with [`MillError::response_status`] when it yields a status
    /// and aborts the stream otherwise.
    pub fn feed(&mut self, batch: &[BodyChunk<'_>]) -> MillResult<FeedOutcome> {
        if batch.is_empty() {
            return Ok(FeedOutcome::Forward);
        }
        loop {
            match self.phase {
                Phase::Start => {
                    let first = &batch[0];
                    let Some(kind) = ImageKind::sniff(first.data) else {
                        tracing::warn!(
                            len = first.data.len(),
                            "first chunk does not carry a supported image signature"
                        );
                        return Err(MillError::unsupported_media("unrecognized image signature"));
                    };
                    self.detected = Some(kind);
                    // The sniff consumed nothing; the same batch feeds Read.
                    self.advance(Phase::Read);
                }
                Phase::Read => match self.read_batch(batch)? {
                    Accumulation::Pending => return Ok(FeedOutcome::NeedMore),
                    Accumulation::Complete => self.advance(Phase::Process),
                },
                Phase::Process => {
                    let body = self.buffer.take();
                    let package = match transform_body(
                        self.engine.as_ref(),
                        body,
                        &self.pipeline,
                        self.quality,
                    ) {
                        Ok(package) => package,
                        Err(e) => {
                            tracing::warn!(error = %e, "body transformation failed");
                            return Err(e);
                        }
                    };
                    // The replacement body must itself classify as a
                    // supported format before it is announced downstream.
                    let Some(kind) = ImageKind::sniff(package.bytes()) else {
                        return Err(MillError::unsupported_media(
                            "transformed output does not carry a supported image signature",
                        ));
                    };
                    self.advance(Phase::Pass);
                    return Ok(FeedOutcome::Emit(EmittedBody {
                        package,
                        content_type: kind.content_type(),
                    }));
                }
                Phase::Pass => return Ok(FeedOutcome::Forward),
                Phase::Done => {
                    return Err(MillError::stream("body chunk delivered after completion"));
                }
            }
        }
    }

    /// Force the session into its terminal phase.
    ///
    /// Idempotent. After this, any further delivery is a stream error
    /// rather than a clean completion.
    pub fn finish(&mut self) {
        self.phase = Phase::Done;
    }

    fn read_batch(&mut self, batch: &[BodyChunk<'_>]) -> MillResult<Accumulation> {
        for chunk in batch {
            if self.buffer.append(chunk.data, chunk.last)? == Accumulation::Complete {
                return Ok(Accumulation::Complete);
            }
        }
        Ok(Accumulation::Pending)
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(next > self.phase, "session phases only move forward");
        self.phase = next;
    }
}
