use crate::engine::EngineError;
use crate::protocol::ProtocolError;

/// Connection error types.
///
/// The `Display` text of every non-I/O variant is what the client sees in
/// the `M` field of an ErrorResponse.
#[derive(Debug)]
pub enum ConnectionError {
    Io(std::io::Error),
    Protocol(ProtocolError),
    Engine(EngineError),
    /// Bind named a prepared statement that does not exist.
    UnknownStatement(String),
    /// Describe/Execute named a portal that does not exist.
    UnknownPortal(String),
    /// Bind carried a binary-format parameter value.
    BinaryParameter,
    /// Bind requested binary encoding for result columns.
    BinaryResultFormat,
    /// Describe/Close carried a source byte other than 'S' or 'P'.
    UnknownTarget(u8),
    /// The query was canceled out of band.
    Canceled,
}

impl ConnectionError {
    /// Whether this error makes the connection unusable. Fatal errors tear
    /// the connection down instead of being reported as an ErrorResponse.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConnectionError::Io(_))
    }
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionError::Io(e) => write!(f, "I/O error: {}", e),
            ConnectionError::Protocol(e) => write!(f, "protocol error: {}", e),
            ConnectionError::Engine(e) => write!(f, "{}", e),
            ConnectionError::UnknownStatement(name) => {
                write!(f, "prepared statement \"{}\" does not exist", name)
            }
            ConnectionError::UnknownPortal(name) => {
                write!(f, "portal \"{}\" does not exist", name)
            }
            ConnectionError::BinaryParameter => {
                write!(f, "Don't know how to parse binary format.")
            }
            ConnectionError::BinaryResultFormat => {
                write!(f, "Don't know how to send binary format.")
            }
            ConnectionError::UnknownTarget(b) => {
                write!(f, "unknown describe source: '{}'", *b as char)
            }
            ConnectionError::Canceled => write!(f, "query canceled"),
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<std::io::Error> for ConnectionError {
    fn from(e: std::io::Error) -> Self {
        ConnectionError::Io(e)
    }
}

impl From<ProtocolError> for ConnectionError {
    fn from(e: ProtocolError) -> Self {
        // Keep socket failures on the fatal path even when they arrive
        // wrapped by the codec.
        match e {
            ProtocolError::Io(io) => ConnectionError::Io(io),
            other => ConnectionError::Protocol(other),
        }
    }
}

impl From<EngineError> for ConnectionError {
    fn from(e: EngineError) -> Self {
        ConnectionError::Engine(e)
    }
}
