//! Frame codec for the ventilation unit's wireless protocol.
//!
//! Two frame shapes travel over the link:
//! - Outbound commands: always 20 bytes, command code + 4-byte ASCII password +
//!   zero-filled arguments + a checksum over code and password only
//! - Inbound responses and notifications: `0x55 0xAA`, a length byte, the
//!   payload (echoed command code first), and a checksum over the payload
//!
//! Everything here is pure. Routing decoded payloads is the session's job.

pub mod codec;
pub mod command;
pub mod error;
pub mod state;

pub use codec::{
    checksum, decode_frame, encode_command, encode_response, AuthReply, CommandFrame, Response,
    ResponseKind, COMMAND_FRAME_LEN, MAX_ARGS, MIN_RESPONSE_LEN, RESPONSE_START,
};
pub use command::{Command, Password, DEFAULT_PASSWORD, PASSWORD_LEN};
pub use error::{FrameError, Result};
pub use state::{encode_state, parse_state, DeviceState, Mode, STATE_RECORD_MIN_LEN};
