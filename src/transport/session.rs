use crate::error::RpcError;
use crate::rpc::{INVALID_REQUEST, PARSE_ERROR, RpcRequest, RpcResponse, RpcServer};
use crate::server::metrics::{CallTimer, Metrics, UNKNOWN_METHOD};
use crate::transport::framing::Framing;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::{debug, warn};

/// Serve one connection until the peer closes it.
///
/// Frames are handled strictly one at a time in arrival order: read, decode,
/// dispatch, encode, write. A frame that fails to decode is answered with an
/// error response and the loop carries on. Clean EOF returns `Ok`; an I/O
/// failure or an oversized frame ends this session only.
pub async fn serve_connection<S>(
    server: Arc<RpcServer>,
    stream: S,
    framing: Framing,
    metrics: Arc<Metrics>,
) -> Result<(), RpcError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    while let Some(frame) = framing.read_frame(&mut reader).await? {
        let response = respond(&server, &framing, &frame, &metrics).await;
        framing.write_frame(&mut write_half, &response).await?;
    }

    debug!("Peer closed connection");
    Ok(())
}

/// Turn one raw frame into the response to send back.
///
/// Shared by the socket sessions and the HTTP handler.
pub async fn respond(
    server: &RpcServer,
    framing: &Framing,
    frame: &[u8],
    metrics: &Arc<Metrics>,
) -> RpcResponse {
    let raw: Value = match framing.decode(frame) {
        Ok(v) => v,
        Err(e) => {
            warn!("Dropping malformed frame: {}", e);
            metrics.record_rejected();
            return RpcResponse::with_error(Value::Null, PARSE_ERROR, format!("Parse error: {}", e));
        }
    };

    let req: RpcRequest = match serde_json::from_value(raw.clone()) {
        Ok(req) => req,
        Err(e) => {
            warn!("Rejecting invalid request: {}", e);
            metrics.record_rejected();
            let id = raw.get("id").cloned().unwrap_or(Value::Null);
            return RpcResponse::with_error(id, INVALID_REQUEST, format!("Invalid Request: {}", e));
        }
    };

    let label = if server.contains(&req.method) {
        req.method.as_str()
    } else {
        UNKNOWN_METHOD
    };
    let timer = CallTimer::start(label, metrics.clone());
    let response = server.handle_request(req);
    match &response.error {
        Some(err) => timer.failed(&err.message).await,
        None => timer.succeeded().await,
    }
    response
}
