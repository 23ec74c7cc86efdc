// Wire messages
pub mod message;

// Method registry & dispatcher
pub mod registry;

pub use message::{
    HANDLER_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, Params, Reply,
    RpcErrorObj, RpcRequest, RpcResponse,
};
pub use registry::{Handler, RpcServer};
