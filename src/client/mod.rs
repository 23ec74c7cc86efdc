use crate::error::RpcError;
use crate::rpc::{Params, Reply, RpcRequest, RpcResponse};
use crate::transport::framing::Framing;
use serde_json::Value;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

/// A connected client. Calls run one at a time and may be repeated on the
/// same connection.
pub enum RpcClient {
    Tcp(TcpClient),
    #[cfg(feature = "http")]
    Http(HttpClient),
}

impl RpcClient {
    /// Connect to `host` (`host:port`), over HTTP when `http` is set.
    ///
    /// Failure here is final: there is no retry.
    pub async fn connect(host: &str, http: bool) -> Result<Self, RpcError> {
        if http {
            #[cfg(feature = "http")]
            {
                return Ok(RpcClient::Http(HttpClient::connect(host).await?));
            }

            #[cfg(not(feature = "http"))]
            {
                return Err(RpcError::Connect {
                    addr: host.to_string(),
                    message: "built without HTTP support".to_string(),
                });
            }
        }
        Ok(RpcClient::Tcp(TcpClient::connect(host, Framing::LengthPrefixed).await?))
    }

    pub async fn call(&mut self, method: &str, params: &Params) -> Result<Reply, RpcError> {
        match self {
            RpcClient::Tcp(c) => c.call(method, params).await,
            #[cfg(feature = "http")]
            RpcClient::Http(c) => c.call(method, params).await,
        }
    }
}

/// Client over a raw TCP socket.
pub struct TcpClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    framing: Framing,
    next_id: u64,
}

impl TcpClient {
    pub async fn connect(addr: &str, framing: Framing) -> Result<Self, RpcError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| RpcError::Connect {
                addr: addr.to_string(),
                message: e.to_string(),
            })?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            framing,
            next_id: 1,
        })
    }

    pub async fn call(&mut self, method: &str, params: &Params) -> Result<Reply, RpcError> {
        let id = self.next_id;
        self.next_id += 1;

        let req = RpcRequest::new(id, method, params);
        debug!("Sending request {} {}", id, method);
        self.framing.write_frame(&mut self.writer, &req).await?;

        let frame = self
            .framing
            .read_frame(&mut self.reader)
            .await?
            .ok_or(RpcError::ConnectionClosed)?;
        let resp: RpcResponse = self.framing.decode(&frame)?;
        into_reply(id, resp)
    }
}

/// Client over HTTP: one POST per call, body framed as one text line.
#[cfg(feature = "http")]
pub struct HttpClient {
    http: reqwest::Client,
    base: String,
    next_id: u64,
}

#[cfg(feature = "http")]
impl HttpClient {
    /// Builds the client and checks `GET /health`, so an unreachable server
    /// is reported here and not on the first call.
    pub async fn connect(host: &str) -> Result<Self, RpcError> {
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host)
        };
        let http = reqwest::Client::new();

        http.get(format!("{}/health", base))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RpcError::Connect {
                addr: host.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            base,
            next_id: 1,
        })
    }

    pub async fn call(&mut self, method: &str, params: &Params) -> Result<Reply, RpcError> {
        use crate::transport::http_transport::RPC_PATH;

        let id = self.next_id;
        self.next_id += 1;

        let framing = Framing::LineDelimited;
        let body = framing.encode(&RpcRequest::new(id, method, params))?;
        debug!("Posting request {} {}", id, method);

        let bytes = self
            .http
            .post(format!("{}{}", self.base, RPC_PATH))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RpcError::Http(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))?;

        let resp: RpcResponse = framing.decode(&bytes)?;
        into_reply(id, resp)
    }
}

fn into_reply(id: u64, resp: RpcResponse) -> Result<Reply, RpcError> {
    if resp.id != Value::from(id) {
        // A null id means the server could not parse the request at all
        if let (Value::Null, Some(err)) = (&resp.id, &resp.error) {
            return Err(RpcError::Remote {
                code: err.code,
                message: err.message.clone(),
            });
        }
        return Err(RpcError::IdMismatch {
            expected: id,
            got: resp.id,
        });
    }

    if let Some(err) = resp.error {
        return Err(RpcError::Remote {
            code: err.code,
            message: err.message,
        });
    }

    match resp.result {
        Some(result) => Ok(serde_json::from_value(result)?),
        None => Ok(Reply::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_reply_success() {
        let resp = RpcResponse::with_result(json!(4), json!({"hello": "x", "result": "OK"}));
        let reply = into_reply(4, resp).unwrap();
        assert_eq!(reply.get("hello").map(String::as_str), Some("x"));
    }

    #[test]
    fn test_into_reply_remote_error() {
        let resp = RpcResponse::with_error(json!(2), -32601, "Method not found: A.B");
        let err = into_reply(2, resp).unwrap_err();
        assert!(matches!(err, RpcError::Remote { code: -32601, .. }));
    }

    #[test]
    fn test_into_reply_id_mismatch() {
        let resp = RpcResponse::with_result(json!(9), json!({}));
        let err = into_reply(1, resp).unwrap_err();
        assert!(matches!(err, RpcError::IdMismatch { expected: 1, .. }));
    }

    #[test]
    fn test_into_reply_non_string_result_is_decode_error() {
        let resp = RpcResponse::with_result(json!(1), json!({"n": 5}));
        assert!(matches!(into_reply(1, resp).unwrap_err(), RpcError::Decode(_)));
    }
}
