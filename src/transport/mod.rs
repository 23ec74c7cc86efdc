pub mod framing;
pub mod session;
pub mod shutdown;

#[cfg(feature = "http")]
pub mod http_transport;

#[cfg(feature = "tcp")]
pub mod tcp;

pub use framing::{Framing, MAX_FRAME_LEN};
pub use session::serve_connection;
pub use shutdown::ShutdownCoordinator;

#[cfg(feature = "http")]
pub use http_transport::HttpTransport;

#[cfg(feature = "tcp")]
pub use tcp::{TcpServer, TcpServerConfig, run_with_framing};
