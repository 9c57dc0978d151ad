/// Protocol parsing errors
#[derive(Debug)]
pub enum ProtocolError {
    InsufficientData,
    InvalidMessage,
    UnsupportedProtocolVersion(i32),
    UnknownMessageType(u8),
    MessageTooLarge(usize),
    InvalidUtf8(std::string::FromUtf8Error),
    Io(std::io::Error),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::InsufficientData => write!(f, "insufficient data"),
            ProtocolError::InvalidMessage => write!(f, "invalid message"),
            ProtocolError::UnsupportedProtocolVersion(v) => {
                write!(f, "unsupported protocol version: {}", v)
            }
            ProtocolError::UnknownMessageType(t) => {
                write!(f, "unknown message type: 0x{:02x}", t)
            }
            ProtocolError::MessageTooLarge(len) => write!(f, "message too large: {} bytes", len),
            ProtocolError::InvalidUtf8(e) => write!(f, "invalid UTF-8: {}", e),
            ProtocolError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        ProtocolError::Io(e)
    }
}

impl From<std::string::FromUtf8Error> for ProtocolError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        ProtocolError::InvalidUtf8(e)
    }
}
