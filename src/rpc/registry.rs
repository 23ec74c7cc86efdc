use crate::error::RpcError;
use crate::rpc::message::{
    HANDLER_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, Params, Reply, RpcErrorObj, RpcRequest,
    RpcResponse,
};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

// A Handler reads the call arguments and fills in the reply, or fails.
pub type Handler = dyn Fn(&Params, &mut Reply) -> Result<(), RpcErrorObj> + Send + Sync + 'static;

/// Method registry and dispatcher.
///
/// Handlers are registered through `&mut self` before serving begins. The
/// server is then moved into an `Arc` and shared by every session, which
/// makes it read-only for the rest of its life: no lock is taken on the
/// dispatch path and no handler can be added while sessions are running.
///
/// Registering a name twice is an error; the first registration stays in
/// place.
pub struct RpcServer {
    handlers: HashMap<String, Box<Handler>>,
}

impl RpcServer {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, method: &str, f: F) -> Result<(), RpcError>
    where
        F: Fn(&Params, &mut Reply) -> Result<(), RpcErrorObj> + Send + Sync + 'static,
    {
        if self.handlers.contains_key(method) {
            return Err(RpcError::DuplicateMethod(method.to_string()));
        }
        self.handlers.insert(method.to_string(), Box::new(f));
        debug!("Registered method {}", method);
        Ok(())
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Invoke `method` with `params` and a fresh, empty reply.
    ///
    /// An unknown method yields `METHOD_NOT_FOUND` without running anything.
    /// A handler failure is returned as-is and the partial reply is dropped.
    pub fn dispatch(&self, method: &str, params: &Params) -> Result<Reply, RpcErrorObj> {
        let Some(handler) = self.handlers.get(method) else {
            warn!("Method not found: {}", method);
            return Err(RpcErrorObj::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", method),
            ));
        };

        let mut reply = Reply::new();
        handler(params, &mut reply)?;
        Ok(reply)
    }

    /// Decode the params of `req`, dispatch it and wrap the outcome.
    pub fn handle_request(&self, req: RpcRequest) -> RpcResponse {
        let id = req.id;
        let params = match decode_params(req.params) {
            Ok(p) => p,
            Err(err) => return RpcResponse::from_error_obj(id, err),
        };

        match self.dispatch(&req.method, &params) {
            Ok(reply) => match serde_json::to_value(reply) {
                Ok(res) => RpcResponse::with_result(id, res),
                Err(e) => RpcResponse::with_error(id, HANDLER_ERROR, e.to_string()),
            },
            Err(err) => RpcResponse::from_error_obj(id, err),
        }
    }
}

impl Default for RpcServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Params must be an object of strings. Null or absent means no arguments.
fn decode_params(raw: Value) -> Result<Params, RpcErrorObj> {
    match raw {
        Value::Null => Ok(Params::new()),
        Value::Object(_) => serde_json::from_value(raw).map_err(|e| {
            RpcErrorObj::new(INVALID_PARAMS, format!("Invalid params: {}", e))
        }),
        _ => Err(RpcErrorObj::new(
            INVALID_PARAMS,
            "Invalid params: expected an object of strings",
        )),
    }
}
