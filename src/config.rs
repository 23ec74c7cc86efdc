use crate::error::RpcError;
use crate::rpc::Params;
use clap::{ArgAction, Parser, ValueEnum};
use std::num::NonZeroUsize;

#[derive(Parser, Debug)]
#[command(name = "greet_rpc")]
#[command(about = "Greet.Hello over a tiny RPC transport, as server or client")]
pub struct Opts {
    /// Run as server or client
    #[arg(long, value_enum, default_value_t = Mode::Server)]
    pub mode: Mode,

    /// TCP host:port to listen on or connect to
    #[arg(long, default_value = "localhost:9999")]
    pub host: String,

    /// Carry the protocol over HTTP instead of raw TCP
    #[arg(
        long,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub http: bool,

    /// Method name (client only)
    #[arg(long, default_value = "Greet.Hello")]
    pub method: String,

    /// Call arguments as a JSON object of strings (client only)
    #[arg(long, default_value = r#"{"name":"world"}"#)]
    pub params: String,

    /// Bound concurrent connections (server only, unbounded by default)
    #[arg(long)]
    pub max_connections: Option<NonZeroUsize>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Server,
    Client,
}

impl Opts {
    /// Decode `--params` into the call arguments.
    pub fn call_params(&self) -> Result<Params, RpcError> {
        serde_json::from_str(&self.params).map_err(|e| RpcError::InvalidParams(e.to_string()))
    }

    pub fn max_connections(&self) -> Option<usize> {
        self.max_connections.map(NonZeroUsize::get)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Opts {
        Opts::try_parse_from(std::iter::once("greet_rpc").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let opts = parse(&[]);
        assert_eq!(opts.mode, Mode::Server);
        assert_eq!(opts.host, "localhost:9999");
        assert!(!opts.http);
        assert_eq!(opts.method, "Greet.Hello");
        assert_eq!(
            opts.call_params().unwrap(),
            Params::from([("name".to_string(), "world".to_string())])
        );
        assert_eq!(opts.max_connections(), None);
    }

    #[test]
    fn test_http_flag_forms() {
        assert!(parse(&["--http"]).http);
        assert!(parse(&["--http", "true"]).http);
        assert!(!parse(&["--http", "false"]).http);
        assert!(parse(&["--http", "--mode", "client"]).http);
    }

    #[test]
    fn test_client_options() {
        let opts = parse(&[
            "--mode",
            "client",
            "--host",
            "127.0.0.1:4000",
            "--method",
            "Greet.Unknown",
            "--params",
            "{}",
        ]);
        assert_eq!(opts.mode, Mode::Client);
        assert_eq!(opts.host, "127.0.0.1:4000");
        assert_eq!(opts.method, "Greet.Unknown");
        assert!(opts.call_params().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_params() {
        for bad in ["not json", "[1,2]", r#"{"name": 1}"#] {
            let opts = parse(&["--params", bad]);
            assert!(matches!(opts.call_params(), Err(RpcError::InvalidParams(_))));
        }
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Opts::try_parse_from(["greet_rpc", "--mode", "proxy"]).is_err());
        assert!(Opts::try_parse_from(["greet_rpc", "--max-connections", "0"]).is_err());
        assert_eq!(parse(&["--max-connections", "8"]).max_connections(), Some(8));
    }
}
