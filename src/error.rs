/// Convenience result type used across imagemill.
pub type MillResult<T> = Result<T, MillError>;

/// Status code a host should send for every media-shaped rejection.
pub const UNSUPPORTED_MEDIA_TYPE: u16 = 415;

/// Top-level error taxonomy used by filter APIs.
#[derive(thiserror::Error, Debug)]
pub enum MillError {
    /// Invalid configuration directive or option value.
    #[error("config error: {0}")]
    Config(String),

    /// Body bytes or response headers outside the supported image formats.
    #[error("unsupported media type: {0}")]
    UnsupportedMedia(String),

    /// Declared or delivered body size exceeds the accumulation capacity.
    #[error("response too large: {size} bytes exceeds the {capacity}-byte buffer")]
    TooLarge {
        /// Declared or observed body size in bytes.
        size: u64,
        /// Configured accumulation capacity in bytes.
        capacity: u64,
    },

    /// Engine could not decode the accumulated body.
    #[error("decode error: {0}")]
    Decode(String),

    /// A pipeline command failed at the given position.
    #[error("transform command {index} failed: {reason}")]
    Transform {
        /// Zero-based position of the failing command in the pipeline.
        index: usize,
        /// Engine-provided diagnostic.
        reason: String,
    },

    /// Engine could not re-encode the transformed image.
    #[error("encode error: {0}")]
    Encode(String),

    /// Buffer or engine resource acquisition failed.
    #[error("allocation error: {0}")]
    Allocation(String),

    /// Data arrived on a stream that already completed.
    #[error("stream error: {0}")]
    Stream(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MillError {
    /// Build a [`MillError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`MillError::UnsupportedMedia`] value.
    pub fn unsupported_media(msg: impl Into<String>) -> Self {
        Self::UnsupportedMedia(msg.into())
    }

    /// Build a [`MillError::Decode`] value.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Build a [`MillError::Transform`] value.
    pub fn transform(index: usize, reason: impl Into<String>) -> Self {
        Self::Transform {
            index,
            reason: reason.into(),
        }
    }

    /// Build a [`MillError::Encode`] value.
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Build a [`MillError::Allocation`] value.
    pub fn allocation(msg: impl Into<String>) -> Self {
        Self::Allocation(msg.into())
    }

    /// Build a [`MillError::Stream`] value.
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }

    /// Status code a host should answer with, or `None` when the response
    /// must be aborted instead (output may already have started streaming).
    pub fn response_status(&self) -> Option<u16> {
        match self {
            Self::UnsupportedMedia(_)
            | Self::TooLarge { .. }
            | Self::Decode(_)
            | Self::Transform { .. }
            | Self::Encode(_)
            | Self::Allocation(_) => Some(UNSUPPORTED_MEDIA_TYPE),
            Self::Config(_) | Self::Stream(_) | Self::Other(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert_eq!(
            MillError::unsupported_media("x").to_string(),
            "unsupported media type: x"
        );
        assert_eq!(MillError::decode("bad marker").to_string(), "decode error: bad marker");
        assert_eq!(
            MillError::transform(2, "oom").to_string(),
            "transform command 2 failed: oom"
        );
        assert_eq!(
            MillError::TooLarge {
                size: 10,
                capacity: 4
            }
            .to_string(),
            "response too large: 10 bytes exceeds the 4-byte buffer"
        );
    }

    #[test]
    fn media_errors_map_to_415() {
        assert_eq!(
            MillError::unsupported_media("x").response_status(),
            Some(UNSUPPORTED_MEDIA_TYPE)
        );
        assert_eq!(
            MillError::TooLarge {
                size: 9,
                capacity: 8
            }
            .response_status(),
            Some(UNSUPPORTED_MEDIA_TYPE)
        );
        assert_eq!(MillError::encode("x").response_status(), Some(UNSUPPORTED_MEDIA_TYPE));
    }

    #[test]
    fn stream_and_wrapped_errors_abort() {
        assert_eq!(MillError::stream("late chunk").response_status(), None);
        let wrapped: MillError = anyhow::anyhow!("io").into();
        assert_eq!(wrapped.response_status(), None);
    }

    #[test]
    fn other_preserves_source_chain() {
        let wrapped: MillError = anyhow::anyhow!("root cause").into();
        assert!(wrapped.to_string().contains("root cause"));
    }
}
