// Errors
pub mod error;

// Method registry & dispatcher
pub mod rpc;

// Framing, sessions and listeners
pub mod transport;

// Services and metrics
pub mod server;

// Client
pub mod client;

// Command-line options
pub mod config;

pub use client::RpcClient;
pub use config::{Mode, Opts};
pub use error::{ErrorKind, RpcError};
pub use rpc::{Params, Reply, RpcErrorObj, RpcRequest, RpcResponse, RpcServer};
pub use server::metrics::Metrics;
pub use transport::Framing;
