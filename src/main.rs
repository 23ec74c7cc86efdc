use anyhow::Context;
use clap::Parser;
use greet_rpc::rpc::RpcServer;
use greet_rpc::server::{self, Metrics, greet};
use greet_rpc::transport::ShutdownCoordinator;
use greet_rpc::{Mode, Opts, RpcClient};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    server::init_logging();

    let opts = Opts::parse();
    let outcome = match opts.mode {
        Mode::Server => run_server(&opts).await,
        Mode::Client => run_client(&opts).await,
    };

    if let Err(e) = outcome {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run_server(opts: &Opts) -> anyhow::Result<()> {
    info!("server {} http {}", opts.host, opts.http);

    let mut registry = RpcServer::new();
    greet::register(&mut registry).context("registering Greet")?;
    let registry = Arc::new(registry);
    info!("Methods: {:?}", registry.methods());

    let metrics = Arc::new(Metrics::new());
    let shutdown = Arc::new(ShutdownCoordinator::new());
    let rx = shutdown.subscribe();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { shutdown.wait_for_signal().await });
    }

    if opts.http {
        serve_http(opts, registry, metrics, rx).await
    } else {
        serve_tcp(opts, registry, metrics, rx).await
    }
}

#[cfg(feature = "http")]
async fn serve_http(
    opts: &Opts,
    registry: Arc<RpcServer>,
    metrics: Arc<Metrics>,
    rx: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    use greet_rpc::transport::HttpTransport;

    HttpTransport::new(registry)
        .with_metrics(metrics)
        .with_max_in_flight(opts.max_connections())
        .serve(&opts.host, rx)
        .await
        .context("server error (http)")
}

#[cfg(not(feature = "http"))]
async fn serve_http(
    _opts: &Opts,
    _registry: Arc<RpcServer>,
    _metrics: Arc<Metrics>,
    _rx: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    anyhow::bail!("built without HTTP support")
}

#[cfg(feature = "tcp")]
async fn serve_tcp(
    opts: &Opts,
    registry: Arc<RpcServer>,
    metrics: Arc<Metrics>,
    rx: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    use greet_rpc::transport::{TcpServer, TcpServerConfig};

    let config = TcpServerConfig::new(opts.host.clone(), registry)
        .with_metrics(metrics)
        .with_max_connections(opts.max_connections());
    TcpServer::bind(config)
        .await
        .context("listen error")?
        .run(rx)
        .await?;
    info!("finished");
    Ok(())
}

#[cfg(not(feature = "tcp"))]
async fn serve_tcp(
    _opts: &Opts,
    _registry: Arc<RpcServer>,
    _metrics: Arc<Metrics>,
    _rx: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    anyhow::bail!("built without TCP server support")
}

async fn run_client(opts: &Opts) -> anyhow::Result<()> {
    info!("client {} http {}", opts.host, opts.http);

    let params = opts.call_params().context("json decode")?;
    let mut client = RpcClient::connect(&opts.host, opts.http)
        .await
        .context("connect error")?;

    info!("method {} args {:?}", opts.method, params);
    let reply = client
        .call(&opts.method, &params)
        .await
        .context("call error")?;

    info!("response {:?}", reply);
    println!("{}", serde_json::to_string(&reply)?);
    Ok(())
}
