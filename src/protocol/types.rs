/// Format code for parameter and result values in the PostgreSQL protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i16)]
pub enum FormatCode {
    /// Text format (0)
    #[default]
    Text = 0,
    /// Binary format (1)
    Binary = 1,
}

impl TryFrom<i16> for FormatCode {
    type Error = i16;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FormatCode::Text),
            1 => Ok(FormatCode::Binary),
            _ => Err(value),
        }
    }
}

impl FormatCode {
    /// Converts the FormatCode to an i16 value.
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

/// Error and notice message field type codes.
/// See: https://www.postgresql.org/docs/current/protocol-error-fields.html
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorFieldCode {
    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG
    Severity = b'S',
    /// SQLSTATE code
    SqlState = b'C',
    /// Primary human-readable error message
    Message = b'M',
    /// Optional detail message
    Detail = b'D',
    /// Optional hint message
    Hint = b'H',
    /// Error cursor position in the original query string
    Position = b'P',
}

impl ErrorFieldCode {
    /// Converts the ErrorFieldCode to a u8 value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Type OIDs from the PostgreSQL catalog (`pg_type.oid`) for the types this
/// server announces in row descriptions.
pub mod type_oid {
    pub const BOOL: i32 = 16;
    pub const INT8: i32 = 20;
    pub const INT4: i32 = 23;
    pub const TEXT: i32 = 25;
}
