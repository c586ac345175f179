//! Error types for opus-bind.

use std::io;
use std::path::PathBuf;

/// Result type alias for opus-bind.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for codec configuration, native loading and frame coding.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Options rejected by `OptionsBuilder` validation.
    #[error("opus: invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// No native binary is known for the running OS.
    #[error("opus: no native library for system {0:?}")]
    UnsupportedPlatform(String),

    /// The platform binary is neither registered nor bundled.
    #[error("opus: native resource {0:?} is not bundled")]
    MissingResource(String),

    /// Writing the extracted binary failed.
    #[error("opus: failed to extract native library to {}: {source}", path.display())]
    Extraction {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The dynamic load failed. Fatal for the rest of the process.
    #[error("opus: failed to load native library: {0}")]
    LinkFailure(String),

    /// The native library refused to create encoder or decoder state.
    #[error("opus: native init failed ({code}): {message}")]
    NativeInit { code: i32, message: String },

    /// PCM input is not exactly one frame long.
    #[error("opus: expected frame length to be {expected}, but got {actual}")]
    InvalidFrameLength { expected: usize, actual: usize },

    /// `offset + length` runs past the end of the buffer.
    #[error("opus: range {offset}..{offset}+{length} is out of bounds for buffer of {size} bytes")]
    BufferBounds {
        offset: usize,
        length: usize,
        size: usize,
    },

    /// The native encoder reported an internal fault.
    #[error("opus: failed to encode frame ({code}): {message}")]
    NativeEncode { code: i32, message: String },

    /// The packet could not be parsed by the native decoder.
    #[error("opus: input data is not a valid packet: {0}")]
    InvalidPacket(String),

    /// The native decoder reported a fault other than a malformed packet.
    #[error("opus: failed to decode data ({code}): {message}")]
    NativeDecode { code: i32, message: String },
}

impl Error {
    /// Returns true if the error was caused by the values a caller passed in.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration(_)
                | Self::InvalidFrameLength { .. }
                | Self::BufferBounds { .. }
        )
    }

    /// Returns true if the native library failed on input that passed validation.
    ///
    /// A packet the decoder cannot parse counts here: packet contents are only
    /// checked on the native side.
    pub fn is_native_fault(&self) -> bool {
        matches!(
            self,
            Self::NativeInit { .. }
                | Self::NativeEncode { .. }
                | Self::InvalidPacket(_)
                | Self::NativeDecode { .. }
        )
    }

    /// Returns true if the process has no usable codec after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LinkFailure(_) | Self::UnsupportedPlatform(_))
    }
}
