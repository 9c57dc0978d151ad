use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info};

use crate::protocol::{
    BackendMessage, FrontendMessage, PostgresCodec, ProtocolError, StartupCodec, StartupMessage,
    StartupParameters, TransactionStatus, canonical_encoding,
};
use crate::server::connection::ConnectionError;

/// Version string announced in ParameterStatus. Old enough that every
/// mainstream driver accepts it.
const SERVER_VERSION: &str = "8.4.7";

pub enum HandshakeResult {
    /// Handshake completed successfully, transitioning to query phase.
    Ready {
        framed: Framed<TcpStream, PostgresCodec>,
        parameters: StartupParameters,
    },
    /// Handshake was a CancelRequest naming another connection.
    CancelRequested { pid: i32, secret_key: i32 },
}

/// A single client handshake.
///
/// Startup negotiation covers SSL refusal, cancel-request dispatch and the
/// cleartext-password exchange. The password is requested but never
/// validated; any value authenticates.
///
/// The `(pid, secret_key)` pair is registered by the listener before the
/// handshake runs, so a cancel request that races the startup preamble
/// always finds its target in the registry.
pub struct Handshake {
    framed: Framed<TcpStream, StartupCodec>,
    pid: i32,
    secret_key: i32,
}

impl Handshake {
    pub fn new(socket: TcpStream, pid: i32, secret_key: i32) -> Self {
        Self {
            framed: Framed::new(socket, StartupCodec::new()),
            pid,
            secret_key,
        }
    }

    pub async fn run(mut self) -> Result<HandshakeResult, ConnectionError> {
        loop {
            let message = self.framed.next().await.ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed during handshake",
                )
            })??;

            match message {
                StartupMessage::SslRequest => {
                    // Refuse SSL with 'N' - write directly to the socket and
                    // keep waiting for the real startup message
                    self.framed.get_mut().write_all(b"N").await?;
                    self.framed.get_mut().flush().await?;
                }
                StartupMessage::Startup {
                    protocol_version,
                    parameters,
                } => {
                    debug!(
                        major = protocol_version >> 16,
                        minor = protocol_version & 0xffff,
                        "client protocol version"
                    );
                    debug!(?parameters, "startup properties");
                    return self.authenticate(parameters).await;
                }
                StartupMessage::CancelRequest {
                    process_id,
                    secret_key,
                } => {
                    return Ok(HandshakeResult::CancelRequested {
                        pid: process_id,
                        secret_key,
                    });
                }
            }
        }
    }

    /// Runs the cleartext-password exchange and sends the startup preamble.
    async fn authenticate(
        self,
        parameters: StartupParameters,
    ) -> Result<HandshakeResult, ConnectionError> {
        let encoding = canonical_encoding(parameters.client_encoding.as_deref().unwrap_or("UTF-8"));

        let mut framed = self.framed;
        framed
            .send(BackendMessage::AuthenticationCleartextPassword)
            .await?;

        // Startup is done; everything from here on is typed frames
        let mut framed = framed.map_codec(|codec| codec.ready(&encoding));

        let message = framed.next().await.ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before password",
            )
        })??;
        let FrontendMessage::Password { .. } = message else {
            return Err(ProtocolError::InvalidMessage.into());
        };

        // Any password is accepted
        let user = parameters.user.clone().unwrap_or_default();
        info!(pid = self.pid, user = %user, "login");

        framed.send(BackendMessage::AuthenticationOk).await?;

        let server_encoding = framed.codec().encoding().to_string();
        let status = [
            ("client_encoding", encoding.clone()),
            ("server_encoding", server_encoding),
            ("server_version", SERVER_VERSION.to_string()),
            ("session_authorization", user),
        ];
        for (name, value) in status {
            framed
                .send(BackendMessage::ParameterStatus {
                    name: name.to_string(),
                    value,
                })
                .await?;
        }

        framed
            .send(BackendMessage::BackendKeyData {
                process_id: self.pid,
                secret_key: self.secret_key,
            })
            .await?;

        framed
            .send(BackendMessage::ReadyForQuery {
                status: TransactionStatus::Idle,
            })
            .await?;

        Ok(HandshakeResult::Ready { framed, parameters })
    }
}
