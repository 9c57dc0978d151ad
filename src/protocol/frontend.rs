use std::collections::HashMap;

use bytes::{Buf, BytesMut};

use crate::protocol::ProtocolError;
use crate::protocol::codec::{get_bytes, get_cstring, get_i16, get_i32, get_u8};
use crate::protocol::types::FormatCode;

/// SSLRequest magic number
pub const SSL_REQUEST_CODE: i32 = (1234 << 16) | 5679; // 80877103

/// CancelRequest magic number
pub const CANCEL_REQUEST_CODE: i32 = (1234 << 16) | 5678; // 80877102

/// Messages sent by the frontend (client) during startup phase.
#[derive(Debug)]
pub enum StartupMessage {
    /// SSLRequest - client wants to negotiate SSL
    SslRequest,
    /// CancelRequest - client wants to cancel a query on another connection
    CancelRequest { process_id: i32, secret_key: i32 },
    /// StartupMessage - normal connection startup
    Startup {
        protocol_version: i32,
        parameters: StartupParameters,
    },
}

/// Startup parameters from the client.
///
/// `user`, `database` and `client_encoding` are the keys this server acts on;
/// everything else is retained in `other` but otherwise ignored.
#[derive(Debug, Clone, Default)]
pub struct StartupParameters {
    pub user: Option<String>,
    pub database: Option<String>,
    pub client_encoding: Option<String>,
    pub other: HashMap<String, String>,
}

impl StartupMessage {
    /// Decode a startup-phase message body (everything after the length
    /// prefix, starting with the 32-bit version/request code).
    pub fn decode(body: &mut BytesMut) -> Result<Self, ProtocolError> {
        let code = get_i32(body)?;

        match code {
            SSL_REQUEST_CODE if !body.has_remaining() => Ok(StartupMessage::SslRequest),
            CANCEL_REQUEST_CODE if body.remaining() == 8 => {
                let process_id = get_i32(body)?;
                let secret_key = get_i32(body)?;
                Ok(StartupMessage::CancelRequest {
                    process_id,
                    secret_key,
                })
            }
            SSL_REQUEST_CODE | CANCEL_REQUEST_CODE => Err(ProtocolError::InvalidMessage),
            version if (version >> 16) == 3 => {
                let parameters = Self::decode_parameters(body)?;
                Ok(StartupMessage::Startup {
                    protocol_version: version,
                    parameters,
                })
            }
            _ => Err(ProtocolError::UnsupportedProtocolVersion(code)),
        }
    }

    fn decode_parameters(body: &mut BytesMut) -> Result<StartupParameters, ProtocolError> {
        let mut params = StartupParameters::default();

        while body.has_remaining() {
            let name = get_cstring(body)?;

            // Empty name signals end of parameters
            if name.is_empty() {
                break;
            }

            let value = get_cstring(body)?;

            match name.as_str() {
                "user" => params.user = Some(value),
                "database" => params.database = Some(value),
                "client_encoding" => params.client_encoding = Some(value),
                _ => {
                    params.other.insert(name, value);
                }
            }
        }

        Ok(params)
    }
}

/// Messages sent by the frontend (client) during the query phase.
#[derive(Debug)]
pub enum FrontendMessage {
    /// 'Q' - Simple query
    Query { sql: String },
    /// 'P' - Parse (extended query)
    Parse(ParseMessage),
    /// 'B' - Bind (extended query)
    Bind(BindMessage),
    /// 'D' - Describe a prepared statement ('S') or portal ('P')
    Describe { target: u8, name: String },
    /// 'E' - Execute a portal
    Execute { portal: String, max_rows: i32 },
    /// 'C' - Close a prepared statement ('S') or portal ('P')
    Close { target: u8, name: String },
    /// 'S' - Sync
    Sync,
    /// 'X' - Terminate
    Terminate,
    /// 'p' - Password response during authentication
    Password { password: String },
}

/// Body of a Parse ('P') message.
#[derive(Debug)]
pub struct ParseMessage {
    /// Destination prepared statement name ("" = unnamed).
    pub statement: String,
    /// The SQL text to prepare.
    pub sql: String,
    /// Parameter type OID hints. Zero entries means "infer everything".
    pub param_types: Vec<i32>,
}

/// Body of a Bind ('B') message.
#[derive(Debug)]
pub struct BindMessage {
    /// Destination portal name ("" = unnamed).
    pub portal: String,
    /// Source prepared statement name.
    pub statement: String,
    /// Per-parameter format codes; may be empty (all text) or a single
    /// entry applying to every parameter.
    pub param_formats: Vec<FormatCode>,
    /// Parameter values; `None` is SQL NULL.
    pub params: Vec<Option<Vec<u8>>>,
    /// Result column format codes; empty, uniform, or per-column.
    pub result_formats: Vec<FormatCode>,
}

impl FrontendMessage {
    /// Decode a typed frame body given its type byte.
    ///
    /// Describe/Close targets are kept as raw bytes here; the connection
    /// validates them because an unknown target is a query-level error for
    /// Describe but tears the connection down for Close.
    pub fn decode(ty: u8, body: &mut BytesMut) -> Result<Self, ProtocolError> {
        match ty {
            b'Q' => Ok(FrontendMessage::Query {
                sql: get_cstring(body)?,
            }),
            b'P' => {
                let statement = get_cstring(body)?;
                let sql = get_cstring(body)?;
                let nparams = get_i16(body)?;
                if nparams < 0 {
                    return Err(ProtocolError::InvalidMessage);
                }
                let mut param_types = Vec::with_capacity(nparams as usize);
                for _ in 0..nparams {
                    param_types.push(get_i32(body)?);
                }
                Ok(FrontendMessage::Parse(ParseMessage {
                    statement,
                    sql,
                    param_types,
                }))
            }
            b'B' => Ok(FrontendMessage::Bind(BindMessage::decode(body)?)),
            b'D' => Ok(FrontendMessage::Describe {
                target: get_u8(body)?,
                name: get_cstring(body)?,
            }),
            b'E' => Ok(FrontendMessage::Execute {
                portal: get_cstring(body)?,
                max_rows: get_i32(body)?,
            }),
            b'C' => Ok(FrontendMessage::Close {
                target: get_u8(body)?,
                name: get_cstring(body)?,
            }),
            b'S' => Ok(FrontendMessage::Sync),
            b'X' => Ok(FrontendMessage::Terminate),
            b'p' => Ok(FrontendMessage::Password {
                password: get_cstring(body)?,
            }),
            _ => Err(ProtocolError::UnknownMessageType(ty)),
        }
    }
}

impl BindMessage {
    fn decode(body: &mut BytesMut) -> Result<Self, ProtocolError> {
        let portal = get_cstring(body)?;
        let statement = get_cstring(body)?;

        let param_formats = decode_format_codes(body)?;

        let nparams = get_i16(body)?;
        if nparams < 0 {
            return Err(ProtocolError::InvalidMessage);
        }
        let mut params = Vec::with_capacity(nparams as usize);
        for _ in 0..nparams {
            let len = get_i32(body)?;
            if len < 0 {
                params.push(None);
            } else {
                params.push(Some(get_bytes(body, len as usize)?));
            }
        }

        let result_formats = decode_format_codes(body)?;

        Ok(BindMessage {
            portal,
            statement,
            param_formats,
            params,
            result_formats,
        })
    }
}

fn decode_format_codes(body: &mut BytesMut) -> Result<Vec<FormatCode>, ProtocolError> {
    let n = get_i16(body)?;
    if n < 0 {
        return Err(ProtocolError::InvalidMessage);
    }
    let mut codes = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let raw = get_i16(body)?;
        codes.push(FormatCode::try_from(raw).map_err(|_| ProtocolError::InvalidMessage)?);
    }
    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn startup_body(code: i32, body: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_i32(code);
        buf.put_slice(body);
        buf
    }

    #[test]
    fn test_decode_ssl_request() {
        let mut body = startup_body(SSL_REQUEST_CODE, &[]);
        let msg = StartupMessage::decode(&mut body).unwrap();
        assert!(matches!(msg, StartupMessage::SslRequest));
    }

    #[test]
    fn test_decode_cancel_request() {
        let mut extra = Vec::new();
        extra.extend_from_slice(&42i32.to_be_bytes());
        extra.extend_from_slice(&7i32.to_be_bytes());
        let mut body = startup_body(CANCEL_REQUEST_CODE, &extra);
        let msg = StartupMessage::decode(&mut body).unwrap();
        match msg {
            StartupMessage::CancelRequest {
                process_id,
                secret_key,
            } => {
                assert_eq!(process_id, 42);
                assert_eq!(secret_key, 7);
            }
            _ => panic!("expected CancelRequest"),
        }
    }

    #[test]
    fn test_decode_startup_message() {
        let mut kv = Vec::new();
        kv.extend_from_slice(b"user\0alice\0");
        kv.extend_from_slice(b"database\0testdb\0");
        kv.extend_from_slice(b"options\0-c x=y\0");
        kv.push(0); // terminator

        let mut body = startup_body(3 << 16, &kv);
        let msg = StartupMessage::decode(&mut body).unwrap();

        match msg {
            StartupMessage::Startup {
                protocol_version,
                parameters,
            } => {
                assert_eq!(protocol_version, 3 << 16);
                assert_eq!(parameters.user.as_deref(), Some("alice"));
                assert_eq!(parameters.database.as_deref(), Some("testdb"));
                assert_eq!(
                    parameters.other.get("options").map(String::as_str),
                    Some("-c x=y")
                );
            }
            _ => panic!("expected Startup message"),
        }
    }

    #[test]
    fn test_decode_rejects_v2_protocol() {
        let mut body = startup_body(2 << 16, &[0]);
        assert!(matches!(
            StartupMessage::decode(&mut body),
            Err(ProtocolError::UnsupportedProtocolVersion(_))
        ));
    }

    #[test]
    fn test_decode_query() {
        let mut body = BytesMut::from(&b"SELECT 1\0"[..]);
        let msg = FrontendMessage::decode(b'Q', &mut body).unwrap();
        assert!(matches!(msg, FrontendMessage::Query { sql } if sql == "SELECT 1"));
    }

    #[test]
    fn test_decode_parse() {
        let mut body = BytesMut::new();
        body.put_slice(b"stmt\0SELECT $1\0");
        body.put_i16(1);
        body.put_i32(23);
        let msg = FrontendMessage::decode(b'P', &mut body).unwrap();
        match msg {
            FrontendMessage::Parse(parse) => {
                assert_eq!(parse.statement, "stmt");
                assert_eq!(parse.sql, "SELECT $1");
                assert_eq!(parse.param_types, vec![23]);
            }
            _ => panic!("expected Parse"),
        }
    }

    #[test]
    fn test_decode_bind_with_null_and_value() {
        let mut body = BytesMut::new();
        body.put_slice(b"portal\0stmt\0");
        body.put_i16(1); // one format code for all params
        body.put_i16(0); // text
        body.put_i16(2); // two params
        body.put_i32(-1); // NULL
        body.put_i32(2);
        body.put_slice(b"42");
        body.put_i16(0); // no result formats

        let msg = FrontendMessage::decode(b'B', &mut body).unwrap();
        match msg {
            FrontendMessage::Bind(bind) => {
                assert_eq!(bind.portal, "portal");
                assert_eq!(bind.statement, "stmt");
                assert_eq!(bind.param_formats, vec![FormatCode::Text]);
                assert_eq!(bind.params, vec![None, Some(b"42".to_vec())]);
                assert!(bind.result_formats.is_empty());
            }
            _ => panic!("expected Bind"),
        }
    }

    #[test]
    fn test_decode_execute() {
        let mut body = BytesMut::new();
        body.put_slice(b"\0");
        body.put_i32(10);
        let msg = FrontendMessage::decode(b'E', &mut body).unwrap();
        match msg {
            FrontendMessage::Execute { portal, max_rows } => {
                assert_eq!(portal, "");
                assert_eq!(max_rows, 10);
            }
            _ => panic!("expected Execute"),
        }
    }

    #[test]
    fn test_decode_truncated_parse_fails() {
        let mut body = BytesMut::new();
        body.put_slice(b"stmt\0SELECT 1\0");
        body.put_i16(2);
        body.put_i32(23); // second OID missing
        assert!(matches!(
            FrontendMessage::decode(b'P', &mut body),
            Err(ProtocolError::InsufficientData)
        ));
    }

    #[test]
    fn test_decode_unknown_type() {
        let mut body = BytesMut::new();
        assert!(matches!(
            FrontendMessage::decode(b'z', &mut body),
            Err(ProtocolError::UnknownMessageType(b'z'))
        ));
    }
}
