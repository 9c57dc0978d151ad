use bytes::{BufMut, BytesMut};
use std::io;
use tokio_util::codec::Encoder;

use crate::protocol::codec::{PostgresCodec, StartupCodec, put_cstring};
use crate::protocol::types::{ErrorFieldCode, FormatCode};

/// Authentication request codes carried in 'R' messages.
const AUTHENTICATION_OK: i32 = 0;
const AUTHENTICATION_CLEARTEXT_PASSWORD: i32 = 3;

/// Messages sent by the backend (server) to the client.
#[derive(Debug)]
pub enum BackendMessage {
    /// 'R' - AuthenticationCleartextPassword request
    AuthenticationCleartextPassword,
    /// 'R' - AuthenticationOk
    AuthenticationOk,
    /// 'K' - Backend key data for cancel requests
    BackendKeyData { process_id: i32, secret_key: i32 },
    /// 'S' - Parameter status notification
    ParameterStatus { name: String, value: String },
    /// 'Z' - Ready for query
    ReadyForQuery { status: TransactionStatus },
    /// 'E' - Error response
    ErrorResponse { fields: Vec<ErrorField> },
    /// 'T' - Row description (column metadata)
    RowDescription { fields: Vec<FieldDescription> },
    /// 'D' - Data row
    DataRow { values: Vec<DataValue> },
    /// 'C' - Command complete
    CommandComplete { tag: String },
    /// '1' - Parse complete
    ParseComplete,
    /// '2' - Bind complete
    BindComplete,
    /// '3' - Close complete
    CloseComplete,
    /// 'n' - No data
    NoData,
}

impl BackendMessage {
    /// The frame's type byte.
    fn ty(&self) -> u8 {
        match self {
            BackendMessage::AuthenticationCleartextPassword => b'R',
            BackendMessage::AuthenticationOk => b'R',
            BackendMessage::BackendKeyData { .. } => b'K',
            BackendMessage::ParameterStatus { .. } => b'S',
            BackendMessage::ReadyForQuery { .. } => b'Z',
            BackendMessage::ErrorResponse { .. } => b'E',
            BackendMessage::RowDescription { .. } => b'T',
            BackendMessage::DataRow { .. } => b'D',
            BackendMessage::CommandComplete { .. } => b'C',
            BackendMessage::ParseComplete => b'1',
            BackendMessage::BindComplete => b'2',
            BackendMessage::CloseComplete => b'3',
            BackendMessage::NoData => b'n',
        }
    }

    /// Writes the complete frame: type byte, then a length back-patched
    /// once the body size is known. The length covers itself but not the
    /// type byte.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.ty());

        let len_pos = dst.len();
        dst.put_i32(0); // placeholder, back-patched below

        self.encode_body(dst);

        let total_len = (dst.len() - len_pos) as i32;
        dst[len_pos..][..4].copy_from_slice(&total_len.to_be_bytes());
    }

    /// Writes the frame body for this message.
    fn encode_body(&self, dst: &mut BytesMut) {
        match self {
            BackendMessage::AuthenticationCleartextPassword => {
                dst.put_i32(AUTHENTICATION_CLEARTEXT_PASSWORD);
            }
            BackendMessage::AuthenticationOk => {
                dst.put_i32(AUTHENTICATION_OK);
            }
            BackendMessage::BackendKeyData {
                process_id,
                secret_key,
            } => {
                dst.put_i32(*process_id);
                dst.put_i32(*secret_key);
            }
            BackendMessage::ParameterStatus { name, value } => {
                put_cstring(dst, name);
                put_cstring(dst, value);
            }
            BackendMessage::ReadyForQuery { status } => {
                dst.put_u8(status.as_byte());
            }
            BackendMessage::ErrorResponse { fields } => {
                for field in fields {
                    field.encode(dst);
                }
                dst.put_u8(0); // terminator
            }
            BackendMessage::RowDescription { fields } => {
                dst.put_i16(fields.len() as i16);
                for field in fields {
                    field.encode(dst);
                }
            }
            BackendMessage::DataRow { values } => {
                dst.put_i16(values.len() as i16);
                for value in values {
                    value.encode(dst);
                }
            }
            BackendMessage::CommandComplete { tag } => {
                put_cstring(dst, tag);
            }
            BackendMessage::ParseComplete
            | BackendMessage::BindComplete
            | BackendMessage::CloseComplete
            | BackendMessage::NoData => {
                // No body for these messages
            }
        }
    }
}

impl Encoder<BackendMessage> for StartupCodec {
    type Error = io::Error;

    fn encode(&mut self, msg: BackendMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        msg.encode(dst);
        Ok(())
    }
}

impl Encoder<BackendMessage> for PostgresCodec {
    type Error = io::Error;

    fn encode(&mut self, msg: BackendMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        msg.encode(dst);
        Ok(())
    }
}

/// Transaction status indicator for ReadyForQuery message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// 'I' - Idle (not in a transaction block)
    Idle,
    /// 'T' - In a transaction block
    InTransaction,
    /// 'E' - In a failed transaction block
    Failed,
}

impl TransactionStatus {
    fn as_byte(self) -> u8 {
        match self {
            TransactionStatus::Idle => b'I',
            TransactionStatus::InTransaction => b'T',
            TransactionStatus::Failed => b'E',
        }
    }
}

/// Error/Notice field.
#[derive(Debug)]
pub struct ErrorField {
    pub code: ErrorFieldCode,
    pub value: String,
}

impl ErrorField {
    /// Creates a new error field.
    pub fn new(code: ErrorFieldCode, value: impl Into<String>) -> Self {
        Self {
            code,
            value: value.into(),
        }
    }

    /// One field: its code byte, then the NUL-terminated value.
    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.code.as_u8());
        put_cstring(dst, &self.value);
    }
}

/// Error information for PostgreSQL error responses.
///
/// This server emits exactly the severity and message fields; no SQLSTATE is
/// reported, and clients that want one degrade gracefully.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Severity level (ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG)
    pub severity: &'static str,
    /// Primary human-readable error message
    pub message: String,
}

impl ErrorInfo {
    /// Creates a new error with severity "ERROR".
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            severity: "ERROR",
            message: message.into(),
        }
    }
}

impl From<ErrorInfo> for BackendMessage {
    fn from(info: ErrorInfo) -> Self {
        BackendMessage::ErrorResponse {
            fields: vec![
                ErrorField::new(ErrorFieldCode::Severity, info.severity),
                ErrorField::new(ErrorFieldCode::Message, info.message),
            ],
        }
    }
}

/// A single column value in a data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataValue {
    /// SQL NULL value (encoded as length -1)
    Null,
    /// Non-NULL value (encoded as length + data bytes)
    Data(Vec<u8>),
}

impl DataValue {
    /// A text-format value from a string.
    pub fn text(s: impl Into<String>) -> Self {
        DataValue::Data(s.into().into_bytes())
    }

    /// Length-prefixed value bytes; NULL is length -1 with no bytes at all.
    fn encode(&self, dst: &mut BytesMut) {
        match self {
            DataValue::Null => dst.put_i32(-1),
            DataValue::Data(bytes) => {
                dst.put_i32(bytes.len() as i32);
                dst.put_slice(bytes);
            }
        }
    }
}

/// Field description for RowDescription message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    /// Column name
    pub name: String,
    /// Table OID (0 if not from a table)
    pub table_oid: i32,
    /// Column attribute number (0 if not from a table)
    pub column_id: i16,
    /// Data type OID
    pub type_oid: i32,
    /// Data type size (-1 for variable length)
    pub type_size: i16,
    /// Type modifier (-1 if not applicable)
    pub type_modifier: i32,
    /// Format code
    pub format_code: FormatCode,
}

impl FieldDescription {
    /// Column metadata in RowDescription field order.
    fn encode(&self, dst: &mut BytesMut) {
        put_cstring(dst, &self.name);
        dst.put_i32(self.table_oid);
        dst.put_i16(self.column_id);
        dst.put_i32(self.type_oid);
        dst.put_i16(self.type_size);
        dst.put_i32(self.type_modifier);
        dst.put_i16(self.format_code.as_i16());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use tokio_util::codec::Encoder;

    use crate::protocol::types::type_oid;

    /// Encodes one message through the query-phase codec and returns the
    /// raw frame bytes.
    fn encode_message(msg: BackendMessage) -> Vec<u8> {
        let mut codec = PostgresCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(msg, &mut buf).unwrap();
        buf.to_vec()
    }

    /// Helper to read i32 from buffer at offset.
    fn read_i32(buf: &[u8], offset: usize) -> i32 {
        i32::from_be_bytes([
            buf[offset],
            buf[offset + 1],
            buf[offset + 2],
            buf[offset + 3],
        ])
    }

    /// Helper to read i16 from buffer at offset.
    fn read_i16(buf: &[u8], offset: usize) -> i16 {
        i16::from_be_bytes([buf[offset], buf[offset + 1]])
    }

    #[test]
    fn test_write_authentication_cleartext_password() {
        let msg = BackendMessage::AuthenticationCleartextPassword;
        let buf = encode_message(msg);
        assert_eq!(buf, vec![b'R', 0, 0, 0, 8, 0, 0, 0, 3]);
    }

    #[test]
    fn test_write_authentication_ok() {
        let msg = BackendMessage::AuthenticationOk;
        let buf = encode_message(msg);
        assert_eq!(buf, vec![b'R', 0, 0, 0, 8, 0, 0, 0, 0]);
    }

    #[test]
    fn test_write_backend_key_data() {
        let msg = BackendMessage::BackendKeyData {
            process_id: 12345,
            secret_key: 67890,
        };
        let buf = encode_message(msg);

        assert_eq!(buf[0], b'K');
        assert_eq!(read_i32(&buf, 1), 12); // length = 4 + 8 = 12
        assert_eq!(read_i32(&buf, 5), 12345); // process_id
        assert_eq!(read_i32(&buf, 9), 67890); // secret_key
    }

    #[test]
    fn test_write_parameter_status() {
        let msg = BackendMessage::ParameterStatus {
            name: "server_version".to_string(),
            value: "8.4.7".to_string(),
        };
        let buf = encode_message(msg);

        assert_eq!(buf[0], b'S');
        assert_eq!(read_i32(&buf, 1), 25); // length = 4 + 15 + 6 = 25
        assert_eq!(&buf[5..], b"server_version\x008.4.7\x00");
    }

    #[test]
    fn test_write_ready_for_query() {
        let msg = BackendMessage::ReadyForQuery {
            status: TransactionStatus::Idle,
        };
        let buf = encode_message(msg);
        assert_eq!(buf, vec![b'Z', 0, 0, 0, 5, b'I']);
    }

    #[test]
    fn test_write_error_response() {
        let error = ErrorInfo::new("Not a SELECT");
        let msg: BackendMessage = error.into();
        let buf = encode_message(msg);

        assert_eq!(buf[0], b'E');
        // Fields: S=ERROR(7), M=Not a SELECT(14), terminator(1)
        assert_eq!(read_i32(&buf, 1), 26);

        assert_eq!(buf[5], b'S'); // Severity
        assert_eq!(&buf[6..12], b"ERROR\x00");
        assert_eq!(buf[12], b'M'); // Message
        assert_eq!(&buf[13..26], b"Not a SELECT\x00");
        assert_eq!(buf[26], 0); // terminator
    }

    #[test]
    fn test_write_row_description() {
        let msg = BackendMessage::RowDescription {
            fields: vec![
                FieldDescription {
                    name: "?column?".to_string(),
                    table_oid: 0,
                    column_id: 0,
                    type_oid: type_oid::INT4,
                    type_size: 4,
                    type_modifier: -1,
                    format_code: FormatCode::Text,
                },
                FieldDescription {
                    name: "greeting".to_string(),
                    table_oid: 0,
                    column_id: 0,
                    type_oid: type_oid::TEXT,
                    type_size: -1,
                    type_modifier: -1,
                    format_code: FormatCode::Text,
                },
            ],
        };
        let buf = encode_message(msg);

        assert_eq!(buf[0], b'T');
        assert_eq!(read_i16(&buf, 5), 2); // field count
        // First field: name, then 4+2+4+2+4+2 fixed bytes
        assert_eq!(&buf[7..16], b"?column?\x00");
        assert_eq!(read_i32(&buf, 22), type_oid::INT4);
    }

    #[test]
    fn test_write_data_row() {
        let msg = BackendMessage::DataRow {
            values: vec![
                DataValue::text("hello"),
                DataValue::Data(vec![]),
                DataValue::Null,
            ],
        };
        let buf = encode_message(msg);

        assert_eq!(buf[0], b'D');
        assert_eq!(read_i16(&buf, 5), 3); // column count

        assert_eq!(read_i32(&buf, 7), 5); // length of "hello"
        assert_eq!(&buf[11..16], b"hello");
        assert_eq!(read_i32(&buf, 16), 0); // empty value
        assert_eq!(read_i32(&buf, 20), -1); // NULL
    }

    #[test]
    fn test_write_command_complete() {
        let msg = BackendMessage::CommandComplete {
            tag: "SELECT".to_string(),
        };
        let buf = encode_message(msg);

        assert_eq!(buf[0], b'C');
        assert_eq!(read_i32(&buf, 1), 11); // 4 + 7
        assert_eq!(&buf[5..], b"SELECT\x00");
    }

    #[test]
    fn test_write_parse_complete() {
        let buf = encode_message(BackendMessage::ParseComplete);
        assert_eq!(buf, vec![b'1', 0, 0, 0, 4]);
    }

    #[test]
    fn test_write_bind_complete() {
        let buf = encode_message(BackendMessage::BindComplete);
        assert_eq!(buf, vec![b'2', 0, 0, 0, 4]);
    }

    #[test]
    fn test_write_close_complete() {
        let buf = encode_message(BackendMessage::CloseComplete);
        assert_eq!(buf, vec![b'3', 0, 0, 0, 4]);
    }

    #[test]
    fn test_write_no_data() {
        let buf = encode_message(BackendMessage::NoData);
        assert_eq!(buf, vec![b'n', 0, 0, 0, 4]);
    }
}
