use crate::error::RpcError;
use crate::rpc::{Params, Reply, RpcErrorObj, RpcServer};
use tracing::info;

pub const HELLO: &str = "Greet.Hello";

/// `Greet.Hello`: greets `params["name"]`.
///
/// - `{"name": v}` -> `{"hello": v, "result": "OK"}`
/// - no `name` -> `{"result": "NG"}`
pub fn hello(params: &Params, reply: &mut Reply) -> Result<(), RpcErrorObj> {
    match params.get("name") {
        Some(name) => {
            reply.insert("hello".to_string(), name.clone());
            reply.insert("result".to_string(), "OK".to_string());
        }
        None => {
            reply.insert("result".to_string(), "NG".to_string());
        }
    }
    info!("reply {:?}", reply);
    Ok(())
}

/// Register the `Greet` service on `server`.
pub fn register(server: &mut RpcServer) -> Result<(), RpcError> {
    server.register(HELLO, hello)
}
