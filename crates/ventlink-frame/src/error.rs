/// Reasons a frame or state record is rejected.
///
/// Decoding never panics; every malformed input maps onto one of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes than the smallest possible response frame.
    #[error("frame too short ({len} bytes, min {min})")]
    TooShort { len: usize, min: usize },

    /// The first two bytes are not the response start marker.
    #[error("invalid frame start {found:02x?} (expected 55 aa)")]
    BadStart { found: [u8; 2] },

    /// The length byte claims more payload than the buffer holds.
    #[error("declared payload length {declared} exceeds buffer ({available} bytes available)")]
    LengthExceedsBuffer { declared: usize, available: usize },

    /// The trailing checksum does not match the payload.
    #[error("checksum mismatch (got {received:#04x}, calculated {calculated:#04x})")]
    ChecksumMismatch { received: u8, calculated: u8 },

    /// The frame is well-formed but carries no command code.
    #[error("frame carries an empty payload")]
    EmptyPayload,

    /// A state response shorter than the fixed record.
    #[error("state record too short ({len} bytes, min {min})")]
    StateTooShort { len: usize, min: usize },

    /// The password contains non-ASCII characters.
    #[error("password must be ASCII")]
    InvalidPassword,

    /// Unknown command code.
    #[error("unknown command code {0:#04x}")]
    UnknownCommand(u8),

    /// Unknown operating mode code.
    #[error("unknown mode code {0}")]
    UnknownMode(u8),
}

pub type Result<T> = std::result::Result<T, FrameError>;
