//! Query engine seams.
//!
//! The protocol server is generic over the engine that parses, compiles and
//! executes SQL. A [`QueryEngine`] produces one [`QueryContext`] per
//! connection (the session, parser and compiler rolled into one object, built
//! from the startup parameters); contexts compile statement trees into
//! [`PreparedStatement`]s, which can describe their result columns, be bound
//! into portals, and be executed with a row cap.

pub mod values;

use crate::protocol::backend::{DataValue, FieldDescription};
use crate::protocol::frontend::StartupParameters;
use crate::protocol::types::FormatCode;
use crate::sql::{Statement as ParseTree, SyntaxError};

/// One result row, in wire-value form.
pub type Row = Vec<DataValue>;

/// A query engine shared by all connections of a server.
pub trait QueryEngine: Send + Sync + 'static {
    type Context: QueryContext + Send + 'static;

    /// Opens a fresh per-connection context from the startup parameters.
    /// The `database` and `user` properties select what the context sees.
    fn open(&self, startup: &StartupParameters) -> Self::Context;
}

/// Per-connection query services: parsing, compilation and execution against
/// this connection's session.
pub trait QueryContext {
    type Statement: PreparedStatement;

    /// Parses a possibly multi-statement SQL string into statement trees.
    fn parse(&self, sql: &str) -> Result<Vec<ParseTree>, EngineError>;

    /// Compiles a single statement tree with optional parameter type OID
    /// hints (an empty slice means "infer everything").
    fn compile(&mut self, tree: ParseTree, param_types: &[i32])
    -> Result<Self::Statement, EngineError>;

    /// Executes a compiled statement against this context's session.
    ///
    /// `max_rows <= 0` means unbounded (libpq sends 0 in Execute for "all
    /// rows"); a positive value caps the result.
    fn execute(&mut self, stmt: &Self::Statement, max_rows: i32) -> Result<Vec<Row>, EngineError>;
}

/// A compiled statement.
///
/// Statements are stateless across executions; binding produces a new
/// statement (the portal's) rather than mutating the original. `Clone` is
/// required so the connection registries can hand out working copies.
pub trait PreparedStatement: Clone + Send + Sync + 'static {
    /// Column metadata for the RowDescription frame.
    fn fields(&self) -> Vec<FieldDescription>;

    /// Binds text-format parameter values (`None` = SQL NULL) and result
    /// format codes, producing the bound statement a portal stores.
    fn bind(
        &self,
        params: Vec<Option<String>>,
        result_formats: ResultFormats,
    ) -> Result<Self, EngineError>;
}

/// Result-column format codes from a Bind message.
///
/// Zero codes means every column is text; one code applies to every column;
/// more than one is indexed per column, with the last entry carrying over to
/// any columns beyond the list.
#[derive(Debug, Clone, Default)]
pub struct ResultFormats {
    formats: Vec<FormatCode>,
    default_format: FormatCode,
}

impl ResultFormats {
    pub fn new(codes: &[FormatCode]) -> Self {
        match codes {
            [] => Self::default(),
            [single] => Self {
                formats: Vec::new(),
                default_format: *single,
            },
            many => Self {
                formats: many.to_vec(),
                default_format: many[many.len() - 1],
            },
        }
    }

    /// The format for a result column by position.
    pub fn column(&self, index: usize) -> FormatCode {
        self.formats
            .get(index)
            .copied()
            .unwrap_or(self.default_format)
    }
}

/// Errors raised by the parser, compiler or executor.
#[derive(Debug)]
pub enum EngineError {
    /// The parser rejected the SQL text.
    Syntax(SyntaxError),
    /// The statement is not a result-returning SELECT.
    NotSelect,
    /// The compiler rejected the statement.
    Compile(String),
    /// A parameter was referenced but never bound.
    ParameterNotBound(u16),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Syntax(e) => write!(f, "{}", e),
            EngineError::NotSelect => write!(f, "Not a SELECT"),
            EngineError::Compile(msg) => write!(f, "{}", msg),
            EngineError::ParameterNotBound(n) => write!(f, "there is no parameter ${}", n),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<SyntaxError> for EngineError {
    fn from(e: SyntaxError) -> Self {
        EngineError::Syntax(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_formats_empty_defaults_text() {
        let formats = ResultFormats::new(&[]);
        assert_eq!(formats.column(0), FormatCode::Text);
        assert_eq!(formats.column(9), FormatCode::Text);
    }

    #[test]
    fn test_result_formats_single_applies_to_all() {
        let formats = ResultFormats::new(&[FormatCode::Binary]);
        assert_eq!(formats.column(0), FormatCode::Binary);
        assert_eq!(formats.column(5), FormatCode::Binary);
    }

    #[test]
    fn test_result_formats_per_column_with_overflow_default() {
        let formats = ResultFormats::new(&[FormatCode::Text, FormatCode::Binary]);
        assert_eq!(formats.column(0), FormatCode::Text);
        assert_eq!(formats.column(1), FormatCode::Binary);
        // Beyond the list, the last entry is the default
        assert_eq!(formats.column(2), FormatCode::Binary);
    }
}
