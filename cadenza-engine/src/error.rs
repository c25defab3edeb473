//! Engine error types.
//!
//! Errors are raised on the control path only: opening sources, seeking,
//! editing effect slots and the bus graph. `read`/`process` never fail; a
//! source that cannot produce audio yields silence or zero frames instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    // ---- Construction ----
    /// No decoder is registered for this file extension
    #[error("Unsupported file extension: {ext:?}")]
    UnsupportedExtension { ext: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    /// The container holds no decodable audio track
    #[error("No audio track found in stream")]
    MissingTrack,

    #[error("Stream does not declare a sample rate")]
    MissingSampleRate,

    #[error("Unsupported channel count: {0}")]
    UnsupportedChannels(usize),

    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),

    // ---- Unsupported operation ----
    #[error("Source is not seekable")]
    NotSeekable,

    #[error("Invalid loop area: start={start} end={end}")]
    InvalidLoopArea { start: u64, end: u64 },

    #[error("Effect slot {slot} out of range (slots: {slots})")]
    SlotOutOfRange { slot: usize, slots: usize },

    /// Attaching the bus would make it feed itself
    #[error("Bus cannot be attached to itself")]
    BusCycle,

    #[error("Channel already exists: {0}")]
    DuplicateChannel(String),

    // ---- Device ----
    #[error("No audio output device found")]
    NoOutputDevice,

    #[error("Audio device error: {0}")]
    Device(String),
}

impl EngineError {
    /// Raised while building a source, before it reaches any bus.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            EngineError::UnsupportedExtension { .. }
                | EngineError::Io(_)
                | EngineError::Decode(_)
                | EngineError::MissingTrack
                | EngineError::MissingSampleRate
                | EngineError::UnsupportedChannels(_)
                | EngineError::InvalidFormat(_)
        )
    }

    /// The call is not valid for the object's current configuration.
    pub fn is_unsupported_operation(&self) -> bool {
        matches!(
            self,
            EngineError::NotSeekable
                | EngineError::InvalidLoopArea { .. }
                | EngineError::SlotOutOfRange { .. }
                | EngineError::BusCycle
                | EngineError::DuplicateChannel(_)
        )
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
