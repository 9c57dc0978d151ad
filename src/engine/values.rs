//! Literal-values engine.
//!
//! [`ValuesEngine`] compiles SELECT statements whose items are literals or
//! positional parameters and evaluates them to a single row. It exists to
//! give the protocol server a complete, self-contained execution path; richer
//! engines plug in behind the same [`QueryEngine`] traits.

use crate::engine::{
    EngineError, PreparedStatement, QueryContext, QueryEngine, ResultFormats, Row,
};
use crate::protocol::backend::{DataValue, FieldDescription};
use crate::protocol::frontend::StartupParameters;
use crate::protocol::types::type_oid;
use crate::sql::{self, Expr, Literal, Statement};

/// Engine that evaluates literal SELECTs.
#[derive(Debug, Default)]
pub struct ValuesEngine;

impl ValuesEngine {
    pub fn new() -> Self {
        Self
    }
}

impl QueryEngine for ValuesEngine {
    type Context = ValuesContext;

    fn open(&self, startup: &StartupParameters) -> ValuesContext {
        ValuesContext {
            user: startup.user.clone().unwrap_or_default(),
            database: startup.database.clone(),
        }
    }
}

/// Per-connection context for the values engine.
///
/// The engine is stateless, so the session only records who connected.
#[derive(Debug)]
pub struct ValuesContext {
    user: String,
    database: Option<String>,
}

impl ValuesContext {
    /// The authenticated user this session belongs to.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The database named at startup, if any.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }
}

impl QueryContext for ValuesContext {
    type Statement = ValuesStatement;

    fn parse(&self, sql_text: &str) -> Result<Vec<Statement>, EngineError> {
        Ok(sql::parse_statements(sql_text)?)
    }

    fn compile(
        &mut self,
        tree: Statement,
        param_types: &[i32],
    ) -> Result<ValuesStatement, EngineError> {
        let select = match tree {
            Statement::Select(select) => select,
            Statement::Other(_) => return Err(EngineError::NotSelect),
        };

        let columns = select
            .items
            .into_iter()
            .map(|expr| OutputColumn::plan(expr, param_types))
            .collect();

        Ok(ValuesStatement {
            columns,
            params: None,
            result_formats: ResultFormats::default(),
        })
    }

    fn execute(&mut self, stmt: &ValuesStatement, max_rows: i32) -> Result<Vec<Row>, EngineError> {
        let mut rows = stmt.evaluate()?;
        if max_rows > 0 {
            rows.truncate(max_rows as usize);
        }
        Ok(rows)
    }
}

/// A compiled literal SELECT.
#[derive(Debug, Clone)]
pub struct ValuesStatement {
    columns: Vec<OutputColumn>,
    /// Bound parameter values; `None` until Bind produces the portal form.
    params: Option<Vec<Option<String>>>,
    result_formats: ResultFormats,
}

impl PreparedStatement for ValuesStatement {
    fn fields(&self) -> Vec<FieldDescription> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, column)| FieldDescription {
                name: column.name.clone(),
                table_oid: 0,
                column_id: 0,
                type_oid: column.type_oid,
                type_size: column.type_size,
                type_modifier: -1,
                format_code: self.result_formats.column(i),
            })
            .collect()
    }

    fn bind(
        &self,
        params: Vec<Option<String>>,
        result_formats: ResultFormats,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            columns: self.columns.clone(),
            params: Some(params),
            result_formats,
        })
    }
}

impl ValuesStatement {
    /// Evaluates the statement to its single result row.
    fn evaluate(&self) -> Result<Vec<Row>, EngineError> {
        let row = self
            .columns
            .iter()
            .map(|column| column.evaluate(self.params.as_deref()))
            .collect::<Result<Row, EngineError>>()?;
        Ok(vec![row])
    }
}

/// One planned output column: its wire metadata plus the expression that
/// produces its value.
#[derive(Debug, Clone)]
struct OutputColumn {
    name: String,
    type_oid: i32,
    type_size: i16,
    expr: Expr,
}

impl OutputColumn {
    fn plan(expr: Expr, param_types: &[i32]) -> Self {
        let (type_oid, type_size) = match &expr {
            Expr::Literal(Literal::Null) => (type_oid::TEXT, -1),
            Expr::Literal(Literal::Boolean(_)) => (type_oid::BOOL, 1),
            Expr::Literal(Literal::Integer(v)) => {
                if i32::try_from(*v).is_ok() {
                    (type_oid::INT4, 4)
                } else {
                    (type_oid::INT8, 8)
                }
            }
            Expr::Literal(Literal::String(_)) => (type_oid::TEXT, -1),
            Expr::Parameter(index) => {
                // A nonzero OID hint from Parse wins; otherwise text.
                match param_types.get(*index as usize - 1) {
                    Some(&oid) if oid != 0 => (oid, -1),
                    _ => (type_oid::TEXT, -1),
                }
            }
        };

        Self {
            name: "?column?".to_string(),
            type_oid,
            type_size,
            expr,
        }
    }

    fn evaluate(&self, params: Option<&[Option<String>]>) -> Result<DataValue, EngineError> {
        match &self.expr {
            Expr::Literal(Literal::Null) => Ok(DataValue::Null),
            Expr::Literal(Literal::Boolean(b)) => {
                Ok(DataValue::text(if *b { "t" } else { "f" }))
            }
            Expr::Literal(Literal::Integer(v)) => Ok(DataValue::text(v.to_string())),
            Expr::Literal(Literal::String(s)) => Ok(DataValue::text(s.clone())),
            Expr::Parameter(index) => {
                let params = params.ok_or(EngineError::ParameterNotBound(*index))?;
                match params.get(*index as usize - 1) {
                    Some(Some(value)) => Ok(DataValue::text(value.clone())),
                    Some(None) => Ok(DataValue::Null),
                    None => Err(EngineError::ParameterNotBound(*index)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ValuesContext {
        ValuesEngine::new().open(&StartupParameters {
            user: Some("alice".to_string()),
            database: Some("test".to_string()),
            ..Default::default()
        })
    }

    fn compile(ctx: &mut ValuesContext, sql_text: &str, param_types: &[i32]) -> ValuesStatement {
        let tree = sql::parse_statement(sql_text).unwrap();
        ctx.compile(tree, param_types).unwrap()
    }

    #[test]
    fn test_open_records_session_identity() {
        let ctx = context();
        assert_eq!(ctx.user(), "alice");
        assert_eq!(ctx.database(), Some("test"));
    }

    #[test]
    fn test_literal_row() {
        let mut ctx = context();
        let stmt = compile(&mut ctx, "SELECT 1, 'hi', NULL, true", &[]);

        let fields = stmt.fields();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0].type_oid, type_oid::INT4);
        assert_eq!(fields[1].type_oid, type_oid::TEXT);
        assert_eq!(fields[3].type_oid, type_oid::BOOL);
        assert!(fields.iter().all(|f| f.name == "?column?"));

        let rows = ctx.execute(&stmt, -1).unwrap();
        assert_eq!(
            rows,
            vec![vec![
                DataValue::text("1"),
                DataValue::text("hi"),
                DataValue::Null,
                DataValue::text("t"),
            ]]
        );
    }

    #[test]
    fn test_wide_integer_gets_int8() {
        let mut ctx = context();
        let stmt = compile(&mut ctx, "SELECT 5000000000", &[]);
        assert_eq!(stmt.fields()[0].type_oid, type_oid::INT8);
    }

    #[test]
    fn test_non_select_rejected() {
        let mut ctx = context();
        let tree = sql::parse_statement("DROP TABLE t").unwrap();
        assert!(matches!(
            ctx.compile(tree, &[]),
            Err(EngineError::NotSelect)
        ));
    }

    #[test]
    fn test_parameter_uses_hint_oid() {
        let mut ctx = context();
        let stmt = compile(&mut ctx, "SELECT $1", &[type_oid::INT4]);
        assert_eq!(stmt.fields()[0].type_oid, type_oid::INT4);
    }

    #[test]
    fn test_unbound_parameter_fails_execution() {
        let mut ctx = context();
        let stmt = compile(&mut ctx, "SELECT $1", &[]);
        assert!(matches!(
            ctx.execute(&stmt, -1),
            Err(EngineError::ParameterNotBound(1))
        ));
    }

    #[test]
    fn test_bound_parameters_substitute() {
        let mut ctx = context();
        let stmt = compile(&mut ctx, "SELECT $1, $2", &[]);
        let bound = stmt
            .bind(
                vec![Some("hello".to_string()), None],
                ResultFormats::default(),
            )
            .unwrap();

        let rows = ctx.execute(&bound, -1).unwrap();
        assert_eq!(rows, vec![vec![DataValue::text("hello"), DataValue::Null]]);
    }

    #[test]
    fn test_max_rows_caps_result() {
        let mut ctx = context();
        let stmt = compile(&mut ctx, "SELECT 1", &[]);
        assert_eq!(ctx.execute(&stmt, 0).unwrap().len(), 1); // 0 = unbounded
        assert_eq!(ctx.execute(&stmt, 5).unwrap().len(), 1);
    }
}
