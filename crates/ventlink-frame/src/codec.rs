use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::command::{Command, Password, PASSWORD_LEN};
use crate::error::{FrameError, Result};

/// Every outbound command frame is exactly this long.
pub const COMMAND_FRAME_LEN: usize = 20;

/// Offset of the first argument byte (after command code and password).
pub const ARGS_OFFSET: usize = 1 + PASSWORD_LEN;

/// Room for arguments: the last argument slot sits one byte before the checksum.
pub const MAX_ARGS: usize = COMMAND_FRAME_LEN - 2 - ARGS_OFFSET;

/// Offset of the command checksum.
pub const CHECKSUM_OFFSET: usize = COMMAND_FRAME_LEN - 1;

/// Start marker of every inbound frame.
pub const RESPONSE_START: [u8; 2] = [0x55, 0xAA];

/// Start (2) + length (1) + checksum (1).
pub const RESPONSE_OVERHEAD: usize = 4;

/// Smallest buffer that is even considered as a response.
pub const MIN_RESPONSE_LEN: usize = 6;

/// Sum of `bytes` modulo 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// An encoded outbound command.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame([u8; COMMAND_FRAME_LEN]);

impl CommandFrame {
    /// Raw frame bytes.
    pub fn as_bytes(&self) -> &[u8; COMMAND_FRAME_LEN] {
        &self.0
    }

    /// The command code in byte 0.
    pub fn code(&self) -> u8 {
        self.0[0]
    }

    /// Argument region (always `MAX_ARGS` bytes, zero-filled past the supplied args).
    pub fn args(&self) -> &[u8] {
        &self.0[ARGS_OFFSET..ARGS_OFFSET + MAX_ARGS]
    }

    /// The checksum in the last byte.
    pub fn checksum(&self) -> u8 {
        self.0[CHECKSUM_OFFSET]
    }

    /// Check the checksum over command code and password.
    pub fn is_valid(&self) -> bool {
        checksum(&self.0[..ARGS_OFFSET]) == self.checksum()
    }

    /// Reinterpret raw bytes as a command frame (device side).
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; COMMAND_FRAME_LEN] = bytes.try_into().ok()?;
        Some(Self(raw))
    }
}

impl AsRef<[u8]> for CommandFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for CommandFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Bytes 1..5 are the password.
        f.debug_struct("CommandFrame")
            .field("code", &format_args!("{:#04x}", self.code()))
            .field("args", &format_args!("{:02x?}", self.args()))
            .field("checksum", &format_args!("{:#04x}", self.checksum()))
            .finish()
    }
}

/// Encode a command into the fixed 20-byte wire format.
///
/// Wire format:
/// ```text
/// ┌─────────┬──────────────┬───────────────────────┬──────────┐
/// │ Cmd (1) │ Password (4) │ Args (13, zero-fill)  │ Sum (1)  │
/// └─────────┴──────────────┴───────────────────────┴──────────┘
/// ```
///
/// The checksum covers only the command code and password. Arguments beyond
/// [`MAX_ARGS`] are dropped with a warning.
pub fn encode_command(command: Command, password: &Password, args: &[u8]) -> CommandFrame {
    let mut frame = [0u8; COMMAND_FRAME_LEN];
    frame[0] = command.code();
    frame[1..ARGS_OFFSET].copy_from_slice(password.as_bytes());

    let args = if args.len() > MAX_ARGS {
        warn!(
            command = command.name(),
            supplied = args.len(),
            max = MAX_ARGS,
            "arguments too long for frame, truncating"
        );
        &args[..MAX_ARGS]
    } else {
        args
    };
    frame[ARGS_OFFSET..ARGS_OFFSET + args.len()].copy_from_slice(args);
    frame[CHECKSUM_OFFSET] = checksum(&frame[..ARGS_OFFSET]);

    debug!(command = command.name(), args = ?args, "encoded command frame");
    CommandFrame(frame)
}

/// A validated inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Echoed command code (first payload byte).
    pub code: u8,
    /// Command-specific remainder of the payload.
    pub body: Bytes,
}

/// Outcome of an AUTH response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthReply {
    /// Bare acknowledgement without a result byte.
    Acknowledged,
    /// Result byte `0x01`.
    Accepted,
    /// Any other result byte.
    Rejected(u8),
}

/// What an inbound frame is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    Auth(AuthReply),
    State(Bytes),
    Other(u8),
}

impl Response {
    /// The command this response echoes, if the code is known.
    pub fn command(&self) -> Option<Command> {
        Command::try_from(self.code).ok()
    }

    /// Classify the response for routing.
    pub fn kind(&self) -> ResponseKind {
        match self.command() {
            Some(Command::Auth) => ResponseKind::Auth(match self.body.first() {
                None => AuthReply::Acknowledged,
                Some(0x01) => AuthReply::Accepted,
                Some(other) => AuthReply::Rejected(*other),
            }),
            Some(Command::GetState) => ResponseKind::State(self.body.clone()),
            _ => ResponseKind::Other(self.code),
        }
    }
}

/// Decode and validate one inbound frame.
///
/// Wire format:
/// ```text
/// ┌──────────┬─────────┬──────────────────────┬─────────┐
/// │ 0x55 0xAA│ Len (1) │ Payload (Len bytes)  │ Sum (1) │
/// └──────────┴─────────┴──────────────────────┴─────────┘
/// ```
///
/// Trailing bytes past the checksum are ignored. Pure: a rejected buffer has
/// no side effects.
pub fn decode_frame(src: &[u8]) -> Result<Response> {
    if src.len() < MIN_RESPONSE_LEN {
        return Err(FrameError::TooShort {
            len: src.len(),
            min: MIN_RESPONSE_LEN,
        });
    }

    if src[0..2] != RESPONSE_START {
        return Err(FrameError::BadStart {
            found: [src[0], src[1]],
        });
    }

    let declared = src[2] as usize;
    let available = src.len() - RESPONSE_OVERHEAD;
    if declared > available {
        return Err(FrameError::LengthExceedsBuffer {
            declared,
            available,
        });
    }

    let payload = &src[3..3 + declared];
    let received = src[3 + declared];
    let calculated = checksum(payload);
    if received != calculated {
        return Err(FrameError::ChecksumMismatch {
            received,
            calculated,
        });
    }

    let Some((&code, body)) = payload.split_first() else {
        return Err(FrameError::EmptyPayload);
    };

    Ok(Response {
        code,
        body: Bytes::copy_from_slice(body),
    })
}

/// Encode an inbound frame (device side of the protocol).
pub fn encode_response(code: u8, body: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = body.len() + 1;
    if len > u8::MAX as usize {
        return Err(FrameError::LengthExceedsBuffer {
            declared: len,
            available: u8::MAX as usize,
        });
    }
    dst.reserve(RESPONSE_OVERHEAD + len);
    dst.put_slice(&RESPONSE_START);
    dst.put_u8(len as u8);
    dst.put_u8(code);
    dst.put_slice(body);
    dst.put_u8(code.wrapping_add(checksum(body)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn password() -> Password {
        Password::new("1234").unwrap()
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` with a thread-local subscriber and return what it logged.
    fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        let out = tracing::subscriber::with_default(subscriber, f);
        let logs = String::from_utf8_lossy(&buffer.0.lock().unwrap()).into_owned();
        (out, logs)
    }

    fn response(code: u8, body: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_response(code, body, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn get_state_frame_layout() {
        let frame = encode_command(Command::GetState, &password(), &[]);
        let bytes = frame.as_bytes();

        assert_eq!(bytes.len(), COMMAND_FRAME_LEN);
        assert_eq!(&bytes[0..5], &[0x05, b'1', b'2', b'3', b'4']);
        let expected = (0x05u32 + b'1' as u32 + b'2' as u32 + b'3' as u32 + b'4' as u32) & 0xFF;
        assert_eq!(bytes[19] as u32, expected);
        assert!(bytes[5..19].iter().all(|b| *b == 0));
    }

    #[test]
    fn checksum_ignores_arguments() {
        let bare = encode_command(Command::SetSpeed, &password(), &[]);
        let with_args = encode_command(Command::SetSpeed, &password(), &[7, 8, 9]);

        assert_eq!(bare.checksum(), with_args.checksum());
        assert_eq!(&with_args.as_bytes()[5..8], &[7, 8, 9]);
    }

    #[test]
    fn checksum_property_holds_for_all_commands() {
        let passwords = ["0000", "1234", "zzzz", "~~~~", ""];
        for command in Command::all() {
            for pwd in passwords {
                let pwd = Password::new(pwd).unwrap();
                for args in [&[][..], &[0xFF; 4][..], &[0x80; MAX_ARGS][..]] {
                    let frame = encode_command(command, &pwd, args);
                    let bytes = frame.as_bytes();
                    assert_eq!(bytes[19], checksum(&bytes[0..5]));
                    assert!(frame.is_valid());
                }
            }
        }
    }

    #[test]
    fn oversized_arguments_are_truncated() {
        let args: Vec<u8> = (1..=15).collect();
        let (frame, logs) = capture_logs(|| encode_command(Command::SetTimer, &password(), &args));
        let bytes = frame.as_bytes();

        assert!(logs.contains("WARN"), "logs: {logs}");
        assert!(logs.contains("truncating"), "logs: {logs}");
        assert!(logs.contains("supplied=15"), "logs: {logs}");

        assert_eq!(bytes.len(), COMMAND_FRAME_LEN);
        assert_eq!(frame.args(), &args[..MAX_ARGS]);
        assert_eq!(bytes[18], 13);
        assert_eq!(bytes[19], checksum(&bytes[0..5]));
    }

    #[test]
    fn fitting_arguments_log_no_warning() {
        let (_, logs) = capture_logs(|| encode_command(Command::SetSpeed, &password(), &[4]));
        assert!(!logs.contains("WARN"), "logs: {logs}");
    }

    #[test]
    fn debug_hides_password() {
        let frame = encode_command(Command::Auth, &password(), &[]);
        let rendered = format!("{frame:?}");
        assert!(!rendered.contains("0x31"));
        assert!(rendered.contains("0x01"));
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let err = decode_frame(&[0x55, 0xAA, 0x01, 0x05, 0x05]).unwrap_err();
        assert_eq!(err, FrameError::TooShort { len: 5, min: 6 });
    }

    #[test]
    fn decode_rejects_bad_start() {
        let err = decode_frame(&[0x54, 0xAA, 0x02, 0x05, 0x00, 0x05]).unwrap_err();
        assert!(matches!(err, FrameError::BadStart { found: [0x54, 0xAA] }));
    }

    #[test]
    fn decode_rejects_length_past_buffer() {
        let err = decode_frame(&[0x55, 0xAA, 0x09, 0x05, 0x00, 0x05]).unwrap_err();
        assert_eq!(
            err,
            FrameError::LengthExceedsBuffer {
                declared: 9,
                available: 2
            }
        );
    }

    #[test]
    fn decode_rejects_checksum_mismatch() {
        let mut wire = response(0x05, &[0x01, 0x02]);
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;

        let err = decode_frame(&wire).unwrap_err();
        assert!(matches!(err, FrameError::ChecksumMismatch { .. }));
    }

    #[test]
    fn decode_rejects_empty_payload() {
        let err = decode_frame(&[0x55, 0xAA, 0x00, 0x00, 0x00, 0x00]).unwrap_err();
        assert_eq!(err, FrameError::EmptyPayload);
    }

    #[test]
    fn decode_accepts_trailing_padding() {
        let mut wire = response(0x05, &[0xAB]);
        wire.extend_from_slice(&[0u8; 8]);

        let resp = decode_frame(&wire).unwrap();
        assert_eq!(resp.code, 0x05);
        assert_eq!(resp.body.as_ref(), &[0xAB]);
    }

    #[test]
    fn response_kinds() {
        let ack = decode_frame(&response(0x01, &[0x00, 0x00])).unwrap();
        assert_eq!(ack.kind(), ResponseKind::Auth(AuthReply::Rejected(0x00)));

        let ok = decode_frame(&response(0x01, &[0x01, 0x00])).unwrap();
        assert_eq!(ok.kind(), ResponseKind::Auth(AuthReply::Accepted));

        let bare = decode_frame(&[0x55, 0xAA, 0x01, 0x01, 0x01, 0x00]).unwrap();
        assert_eq!(bare.kind(), ResponseKind::Auth(AuthReply::Acknowledged));

        let state = decode_frame(&response(0x05, &[1, 2, 3])).unwrap();
        assert!(matches!(state.kind(), ResponseKind::State(body) if body.as_ref() == [1, 2, 3]));

        let other = decode_frame(&response(0x07, &[])).unwrap();
        assert_eq!(other.kind(), ResponseKind::Other(0x07));
    }

    #[test]
    fn command_frame_from_bytes_requires_exact_length() {
        let frame = encode_command(Command::SetPower, &password(), &[1]);
        assert_eq!(CommandFrame::from_bytes(frame.as_ref()), Some(frame));
        assert!(CommandFrame::from_bytes(&frame.as_ref()[..19]).is_none());
    }
}
