mod error;
mod state;

pub use error::ConnectionError;
pub use state::SessionState;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::{EngineError, PreparedStatement, QueryContext, ResultFormats};
use crate::protocol::{
    BackendMessage, BindMessage, ErrorInfo, FormatCode, FrontendMessage, ParseMessage,
    PostgresCodec, ProtocolError, TransactionStatus,
};
use crate::server::registry::CancelFlag;

/// The ODBC driver sends this query right after connecting; answering with a
/// bare CommandComplete (no rows, no row description) satisfies it.
pub const ODBC_LO_TYPE_QUERY: &str = "select oid, typbasetype from pg_type where typname = 'lo'";

/// Error reporting mode for the frame currently being dispatched.
///
/// This is per-frame scratch, not connection state: it is decided when a
/// frame arrives and forgotten when its handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorMode {
    /// Errors tear the connection down.
    None,
    /// Simple query: report the error, then ReadyForQuery.
    Simple,
    /// Extended query: report the error, then discard frames until Sync.
    Extended,
}

fn error_mode(message: &FrontendMessage) -> ErrorMode {
    match message {
        FrontendMessage::Query { .. } => ErrorMode::Simple,
        FrontendMessage::Parse(_)
        | FrontendMessage::Bind(_)
        | FrontendMessage::Describe { .. }
        | FrontendMessage::Execute { .. } => ErrorMode::Extended,
        _ => ErrorMode::None,
    }
}

/// A single client connection in the query phase.
///
/// Owns the framed socket, the per-connection engine context and the
/// prepared statement / portal registries. All state is single-writer; the
/// only cross-task signal is the cancel flag.
pub struct Connection<C: QueryContext> {
    framed: Framed<TcpStream, PostgresCodec>,
    pid: i32,
    context: C,
    state: SessionState<C::Statement>,
    cancel: CancelFlag,
}

impl<C: QueryContext> Connection<C> {
    pub fn new(
        framed: Framed<TcpStream, PostgresCodec>,
        pid: i32,
        context: C,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            framed,
            pid,
            context,
            state: SessionState::new(),
            cancel,
        }
    }

    /// Runs the dispatch loop until EOF, Terminate, a fatal error, or server
    /// shutdown.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), ConnectionError> {
        loop {
            let message = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                message = self.framed.next() => message,
            };
            let Some(message) = message else {
                // EOF
                return Ok(());
            };
            let message = message?;

            if self.state.ignore_until_sync {
                if !matches!(message, FrontendMessage::Sync) {
                    continue;
                }
                self.state.ignore_until_sync = false;
            }

            if matches!(message, FrontendMessage::Terminate) {
                return Ok(());
            }

            let mode = error_mode(&message);
            if let Err(e) = self.dispatch(message).await {
                if e.is_fatal() || mode == ErrorMode::None {
                    return Err(e);
                }
                warn!(pid = self.pid, error = %e, "error in query");
                self.framed
                    .send(BackendMessage::from(ErrorInfo::new(e.to_string())))
                    .await?;
                match mode {
                    ErrorMode::Simple => self.ready_for_query().await?,
                    ErrorMode::Extended => self.state.ignore_until_sync = true,
                    ErrorMode::None => {}
                }
            }
        }
    }

    async fn dispatch(&mut self, message: FrontendMessage) -> Result<(), ConnectionError> {
        match message {
            FrontendMessage::Query { sql } => self.on_query(&sql).await,
            FrontendMessage::Parse(parse) => self.on_parse(parse).await,
            FrontendMessage::Bind(bind) => self.on_bind(bind).await,
            FrontendMessage::Describe { target, name } => self.on_describe(target, &name).await,
            FrontendMessage::Execute { portal, max_rows } => {
                self.on_execute(&portal, max_rows).await
            }
            FrontendMessage::Close { target, name } => self.on_close(target, &name).await,
            FrontendMessage::Sync => self.ready_for_query().await,
            // Terminate is handled before dispatch; a password frame after
            // authentication is a protocol violation.
            FrontendMessage::Terminate | FrontendMessage::Password { .. } => {
                Err(ProtocolError::InvalidMessage.into())
            }
        }
    }

    /// Simple query: parse, then describe/execute/complete each statement,
    /// with one ReadyForQuery at the end.
    async fn on_query(&mut self, sql: &str) -> Result<(), ConnectionError> {
        self.check_canceled()?;
        debug!(pid = self.pid, sql, "query");

        if sql == ODBC_LO_TYPE_QUERY {
            self.command_complete().await?;
        } else {
            let trees = self.context.parse(sql)?;
            for tree in trees {
                if !tree.is_select() {
                    return Err(EngineError::NotSelect.into());
                }
                let stmt = self.context.compile(tree, &[])?;
                self.send_row_description(&stmt).await?;
                self.stream_rows(&stmt, -1).await?;
                self.command_complete().await?;
            }
        }

        self.ready_for_query().await
    }

    async fn on_parse(&mut self, parse: ParseMessage) -> Result<(), ConnectionError> {
        debug!(pid = self.pid, sql = %parse.sql, "parse");

        let mut trees = self.context.parse(&parse.sql)?;
        let Some(tree) = trees.pop() else {
            return Err(EngineError::Compile("empty query".to_string()).into());
        };
        if !trees.is_empty() {
            return Err(EngineError::Compile(
                "cannot insert multiple commands into a prepared statement".to_string(),
            )
            .into());
        }
        if !tree.is_select() {
            return Err(EngineError::NotSelect.into());
        }

        let stmt = self.context.compile(tree, &parse.param_types)?;
        self.state.put_statement(parse.statement, stmt);
        self.framed.send(BackendMessage::ParseComplete).await?;
        Ok(())
    }

    async fn on_bind(&mut self, bind: BindMessage) -> Result<(), ConnectionError> {
        let BindMessage {
            portal,
            statement,
            param_formats,
            params,
            result_formats,
        } = bind;

        let mut values = Vec::with_capacity(params.len());
        for (i, param) in params.into_iter().enumerate() {
            match param {
                // NULL carries no bytes, so its format never matters
                None => values.push(None),
                Some(bytes) => {
                    // Zero format codes: all text. One: applies to every
                    // parameter. Several: indexed, last entry carrying over.
                    let format = if param_formats.is_empty() {
                        FormatCode::Text
                    } else {
                        param_formats[i.min(param_formats.len() - 1)]
                    };
                    if format == FormatCode::Binary {
                        return Err(ConnectionError::BinaryParameter);
                    }
                    let text = String::from_utf8(bytes).map_err(ProtocolError::from)?;
                    values.push(Some(text));
                }
            }
        }

        // The engines behind this server emit text wire values only, so a
        // binary result request is refused here rather than mislabeled in
        // the row description.
        if result_formats.contains(&FormatCode::Binary) {
            return Err(ConnectionError::BinaryResultFormat);
        }

        let formats = ResultFormats::new(&result_formats);
        let Some(stmt) = self.state.statement(&statement) else {
            return Err(ConnectionError::UnknownStatement(statement));
        };
        let bound = stmt.bind(values, formats)?;
        self.state.put_portal(portal, bound);
        self.framed.send(BackendMessage::BindComplete).await?;
        Ok(())
    }

    async fn on_describe(&mut self, target: u8, name: &str) -> Result<(), ConnectionError> {
        let stmt = match target {
            b'S' => self.state.statement(name),
            b'P' => self.state.portal(name),
            _ => return Err(ConnectionError::UnknownTarget(target)),
        };
        let Some(stmt) = stmt else {
            return Err(if target == b'S' {
                ConnectionError::UnknownStatement(name.to_string())
            } else {
                ConnectionError::UnknownPortal(name.to_string())
            });
        };

        // Only result-returning statements exist here, so Describe always
        // answers with a row description, never NoData.
        let fields = stmt.fields();
        self.framed
            .send(BackendMessage::RowDescription { fields })
            .await?;
        Ok(())
    }

    async fn on_execute(&mut self, portal: &str, max_rows: i32) -> Result<(), ConnectionError> {
        self.check_canceled()?;

        let Some(stmt) = self.state.portal(portal) else {
            return Err(ConnectionError::UnknownPortal(portal.to_string()));
        };
        let stmt = stmt.clone();
        self.stream_rows(&stmt, max_rows).await?;
        // No ReadyForQuery here; that is Sync's job
        self.command_complete().await
    }

    async fn on_close(&mut self, target: u8, name: &str) -> Result<(), ConnectionError> {
        match target {
            b'S' => self.state.close_statement(name),
            b'P' => self.state.close_portal(name),
            _ => return Err(ConnectionError::UnknownTarget(target)),
        }
        self.framed.send(BackendMessage::CloseComplete).await?;
        Ok(())
    }

    async fn send_row_description(&mut self, stmt: &C::Statement) -> Result<(), ConnectionError> {
        let fields = stmt.fields();
        self.framed
            .send(BackendMessage::RowDescription { fields })
            .await?;
        Ok(())
    }

    /// Executes and streams data rows, watching the cancel flag between rows.
    async fn stream_rows(
        &mut self,
        stmt: &C::Statement,
        max_rows: i32,
    ) -> Result<(), ConnectionError> {
        let rows = self.context.execute(stmt, max_rows)?;
        for values in rows {
            self.check_canceled()?;
            self.framed
                .feed(BackendMessage::DataRow { values })
                .await?;
        }
        Ok(())
    }

    async fn command_complete(&mut self) -> Result<(), ConnectionError> {
        self.framed
            .send(BackendMessage::CommandComplete {
                tag: "SELECT".to_string(),
            })
            .await?;
        Ok(())
    }

    async fn ready_for_query(&mut self) -> Result<(), ConnectionError> {
        self.framed
            .send(BackendMessage::ReadyForQuery {
                status: TransactionStatus::Idle,
            })
            .await?;
        Ok(())
    }

    /// Consumes a pending cancel request, surfacing it through the standard
    /// error path of the frame being handled.
    fn check_canceled(&self) -> Result<(), ConnectionError> {
        if self.cancel.take() {
            Err(ConnectionError::Canceled)
        } else {
            Ok(())
        }
    }
}
