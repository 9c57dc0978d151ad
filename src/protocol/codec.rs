use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Decoder;

use crate::protocol::ProtocolError;
use crate::protocol::frontend::{FrontendMessage, StartupMessage};

/// Maximum typed message size in bytes (16 MB). The protocol allows frames
/// up to 1 GB, but nothing this server exchanges comes close, and a tighter
/// cap bounds what a misbehaving client can make it buffer.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Maximum startup packet size in bytes. Startup packets carry a handful of
/// key/value parameters; anything larger is a confused or hostile client.
pub const MAX_STARTUP_PACKET_SIZE: usize = 10_000;

/// Pulls one NUL-terminated string off the front of `src`, leaving the rest
/// of the buffer in place. The string comes back without its terminator.
///
/// The terminator scan is capped: a frame that lost its NUL is an invalid
/// message, not a license to walk an attacker-sized buffer.
pub fn get_cstring(src: &mut BytesMut) -> Result<String, ProtocolError> {
    const MAX_CSTRING_LENGTH: usize = 64 * 1024;

    let Some(null_pos) = src.iter().take(MAX_CSTRING_LENGTH).position(|&b| b == 0) else {
        return Err(ProtocolError::InvalidMessage);
    };

    let bytes = src.split_to(null_pos);
    src.advance(1);
    Ok(String::from_utf8(bytes.to_vec())?)
}

/// Appends `s` to `dst` followed by its NUL terminator.
pub fn put_cstring(dst: &mut BytesMut, s: &str) {
    dst.put_slice(s.as_bytes());
    dst.put_u8(0);
}

/// Read a big-endian i16 from the buffer.
pub fn get_i16(src: &mut BytesMut) -> Result<i16, ProtocolError> {
    if src.remaining() < 2 {
        return Err(ProtocolError::InsufficientData);
    }
    Ok(src.get_i16())
}

/// Read a big-endian i32 from the buffer.
pub fn get_i32(src: &mut BytesMut) -> Result<i32, ProtocolError> {
    if src.remaining() < 4 {
        return Err(ProtocolError::InsufficientData);
    }
    Ok(src.get_i32())
}

/// Read a single byte from the buffer.
pub fn get_u8(src: &mut BytesMut) -> Result<u8, ProtocolError> {
    if src.remaining() < 1 {
        return Err(ProtocolError::InsufficientData);
    }
    Ok(src.get_u8())
}

/// Read a fixed-length byte slab from the buffer.
pub fn get_bytes(src: &mut BytesMut, len: usize) -> Result<Vec<u8>, ProtocolError> {
    if src.remaining() < len {
        return Err(ProtocolError::InsufficientData);
    }
    Ok(src.split_to(len).to_vec())
}

/// Canonicalizes a `client_encoding` name.
///
/// Older drivers announce `UNICODE` where modern ones say `UTF8`; both map to
/// the canonical `UTF-8`. Unrecognized names pass through untouched so they
/// can be echoed back in ParameterStatus.
pub fn canonical_encoding(name: &str) -> String {
    if name.eq_ignore_ascii_case("UNICODE")
        || name.eq_ignore_ascii_case("UTF8")
        || name.eq_ignore_ascii_case("UTF-8")
    {
        "UTF-8".to_string()
    } else {
        name.to_string()
    }
}

/// Codec for the query phase of the PostgreSQL protocol.
/// Encodes BackendMessage (in backend.rs) and decodes FrontendMessage (in
/// frontend.rs). Also tracks the session's canonical character encoding name
/// as negotiated during startup.
pub struct PostgresCodec {
    pub(crate) max_message_size: usize,
    encoding: String,
}

impl PostgresCodec {
    /// Creates a new PostgresCodec with the default maximum message size.
    pub fn new() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            encoding: "UTF-8".to_string(),
        }
    }

    /// The canonical encoding name negotiated at startup.
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// Replaces the session encoding name.
    pub fn set_encoding(&mut self, name: &str) {
        self.encoding = canonical_encoding(name);
    }
}

impl Default for PostgresCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for PostgresCodec {
    type Item = FrontendMessage;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<FrontendMessage>, ProtocolError> {
        // Typed frame: 1 byte type | i32 length (includes itself, not the type)
        if src.len() < 5 {
            return Ok(None);
        }
        let ty = src[0];
        let len = i32::from_be_bytes([src[1], src[2], src[3], src[4]]);
        if len < 4 {
            return Err(ProtocolError::InvalidMessage);
        }
        let len = len as usize;
        if len > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge(len));
        }
        if src.len() < 1 + len {
            src.reserve(1 + len - src.len());
            return Ok(None);
        }
        src.advance(5);
        let mut body = src.split_to(len - 4);
        let message = FrontendMessage::decode(ty, &mut body)?;
        Ok(Some(message))
    }
}

/// Codec for the startup phase of the PostgreSQL protocol.
/// Decodes StartupMessage only (the startup, cancel-request and SSL-request
/// frames have no type byte, just a length prefix).
pub struct StartupCodec {
    pub(crate) max_message_size: usize,
}

impl StartupCodec {
    /// Creates a new StartupCodec with the startup packet size limit.
    pub fn new() -> Self {
        Self {
            max_message_size: MAX_STARTUP_PACKET_SIZE,
        }
    }

    /// Transitions to the query phase codec after successful startup,
    /// carrying the encoding negotiated from the startup parameters.
    pub fn ready(self, encoding: &str) -> PostgresCodec {
        let mut codec = PostgresCodec::new();
        codec.set_encoding(encoding);
        codec
    }
}

impl Default for StartupCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StartupCodec {
    type Item = StartupMessage;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<StartupMessage>, ProtocolError> {
        // Untyped frame: i32 length (includes itself) | i32 code | body
        if src.len() < 4 {
            return Ok(None);
        }
        let len = i32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        if len < 8 {
            return Err(ProtocolError::InvalidMessage);
        }
        let len = len as usize;
        if len > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge(len));
        }
        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }
        src.advance(4);
        let mut body = src.split_to(len - 4);
        let message = StartupMessage::decode(&mut body)?;
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_cstring_splits_at_terminator() {
        let mut buf = BytesMut::from(&b"portal\0rest"[..]);
        assert_eq!(get_cstring(&mut buf).unwrap(), "portal");
        assert_eq!(buf, b"rest"[..]);

        // Consecutive strings come off one at a time; empty is a valid name
        let mut buf = BytesMut::from(&b"\0stmt\0"[..]);
        assert_eq!(get_cstring(&mut buf).unwrap(), "");
        assert_eq!(get_cstring(&mut buf).unwrap(), "stmt");
    }

    #[test]
    fn test_get_cstring_missing_terminator() {
        let mut buf = BytesMut::from(&b"no terminator here"[..]);
        assert!(matches!(
            get_cstring(&mut buf),
            Err(ProtocolError::InvalidMessage)
        ));
    }

    #[test]
    fn test_put_cstring_appends_terminator() {
        let mut buf = BytesMut::new();
        put_cstring(&mut buf, "SELECT 1");
        put_cstring(&mut buf, "");
        assert_eq!(buf, b"SELECT 1\0\0"[..]);
    }

    #[test]
    fn test_typed_readers_report_truncation() {
        let mut buf = BytesMut::from(&[0u8, 1][..]);
        assert!(matches!(
            get_i32(&mut buf),
            Err(ProtocolError::InsufficientData)
        ));
        assert_eq!(get_i16(&mut buf).unwrap(), 1);
        assert!(matches!(
            get_u8(&mut buf),
            Err(ProtocolError::InsufficientData)
        ));
    }

    #[test]
    fn test_canonical_encoding() {
        assert_eq!(canonical_encoding("UNICODE"), "UTF-8");
        assert_eq!(canonical_encoding("utf8"), "UTF-8");
        assert_eq!(canonical_encoding("UTF-8"), "UTF-8");
        assert_eq!(canonical_encoding("LATIN1"), "LATIN1");
    }

    #[test]
    fn test_postgres_codec_waits_for_full_frame() {
        let mut codec = PostgresCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u8(b'Q');
        buf.put_i32(8); // length: 4 (self) + 4 (body)
        buf.put_slice(b"SE");

        // Partial body: no frame yet
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.put_slice(b"L\0");
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(msg, FrontendMessage::Query { sql } if sql == "SEL"));
    }

    #[test]
    fn test_postgres_codec_rejects_short_length() {
        let mut codec = PostgresCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u8(b'S');
        buf.put_i32(3);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_startup_codec_rejects_oversized_packet() {
        let mut codec = StartupCodec::new();
        let mut buf = BytesMut::new();
        buf.put_i32((MAX_STARTUP_PACKET_SIZE + 1) as i32);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::MessageTooLarge(_))
        ));
    }
}
