use crate::error::{MillError, MillResult};

/// Progress of body accumulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accumulation {
    /// The end-of-body marker arrived; the buffered bytes are the whole body.
    Complete,
    /// More chunks are required.
    Pending,
}

/// Bounded accumulator that assembles a response body from ordered chunks.
///
/// The arena is allocated once, on first append, sized to the limit. The
/// limit is a hard ceiling: bytes past it are dropped during the copy, and
/// the shortfall surfaces as [`MillError::TooLarge`] when the final chunk
/// arrives. A truncated body is never handed out as complete.
#[derive(Debug)]
pub struct BodyBuffer {
    buf: Option<Vec<u8>>,
    limit: usize,
    received: u64,
}

impl BodyBuffer {
    /// Create an accumulator with a fixed byte limit. Nothing is allocated
    /// until the first append.
    pub fn new(limit: usize) -> Self {
        Self {
            buf: None,
            limit,
            received: 0,
        }
    }

    /// Append one chunk in delivery order; `last` marks the end of the body.
    pub fn append(&mut self, data: &[u8], last: bool) -> MillResult<Accumulation> {
        if self.buf.is_none() {
            let mut arena = Vec::new();
            arena.try_reserve_exact(self.limit).map_err(|e| {
                MillError::allocation(format!("cannot reserve {} body bytes: {e}", self.limit))
            })?;
            self.buf = Some(arena);
        }
        let buf = self.buf.get_or_insert_with(Vec::new);
        self.received = self.received.saturating_add(data.len() as u64);
        let room = self.limit - buf.len();
        buf.extend_from_slice(&data[..data.len().min(room)]);
        if last {
            if self.received > self.limit as u64 {
                return Err(MillError::TooLarge {
                    size: self.received,
                    capacity: self.limit as u64,
                });
            }
            return Ok(Accumulation::Complete);
        }
        Ok(Accumulation::Pending)
    }

    /// Bytes buffered so far.
    pub fn written(&self) -> usize {
        self.buf.as_ref().map_or(0, Vec::len)
    }

    /// Total bytes delivered so far, including any dropped past the limit.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Whether the arena has been allocated yet.
    pub fn is_allocated(&self) -> bool {
        self.buf.is_some()
    }

    /// Take the accumulated body, leaving the accumulator empty.
    pub fn take(&mut self) -> Vec<u8> {
        self.buf.take().unwrap_or_default()
    }
}
