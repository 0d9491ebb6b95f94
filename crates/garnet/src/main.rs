use bytes::Bytes;
use clap::{Parser, Subcommand};
use log::{Level, error, info};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::lookup_host;

use garnet_log::GarnetLogger;
use garnet_route::{Router, UdpDataLink};
use garnet_stream::{Receiver, Sender, SenderConfig, StreamError, UdpLink};

pub mod config;

#[derive(thiserror::Error, Debug)]
enum AppError {
    #[error("transfer error: {0}")]
    Stream(#[from] StreamError),
    #[error("router error: {0}")]
    Route(#[from] garnet_route::RouteError),
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot resolve {0}")]
    Resolve(String),
}

type Result<T> = std::result::Result<T, AppError>;

#[derive(Parser)]
#[command(
    name = "garnet",
    version,
    about = "Virtual-network toolkit: reliable file transfer over datagrams and a distance-vector router."
)]
struct Cli {
    /// Log protocol chatter at debug level.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a file to a listening receiver.
    Send {
        /// Local UDP port to bind.
        #[arg(long)]
        port: u16,
        /// Receiver host name or address.
        #[arg(long)]
        host: String,
        /// Receiver UDP port.
        #[arg(long = "peer-port")]
        peer_port: u16,
        /// File to transfer.
        #[arg(long)]
        file: PathBuf,
        /// Payload bytes per segment.
        #[arg(long, default_value_t = 1400)]
        mtu: usize,
        /// Maximum outstanding segments.
        #[arg(long, default_value_t = 8)]
        window: usize,
    },
    /// Receive a file from a sender.
    Recv {
        /// Local UDP port to bind.
        #[arg(long)]
        port: u16,
        /// Where to write the delivered bytes.
        #[arg(long)]
        out: PathBuf,
        /// Payload bytes per segment.
        #[arg(long, default_value_t = 1400)]
        mtu: usize,
        /// Accepted for symmetry with `send`; the receiver never windows.
        #[arg(long, default_value_t = 8)]
        window: usize,
    },
    /// Run the router and forwarding plane.
    Route {
        /// Router configuration file.
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::Debug } else { Level::Info };
    if GarnetLogger::init(level).is_err() {
        eprintln!("logger already installed");
    }

    if let Err(e) = run(cli.command).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Send {
            port,
            host,
            peer_port,
            file,
            mtu,
            window,
        } => send(port, host, peer_port, file, mtu, window).await,
        Command::Recv {
            port,
            out,
            mtu: _,
            window: _,
        } => recv(port, out).await,
        Command::Route { config } => route(config).await,
    }
}

async fn send(
    port: u16,
    host: String,
    peer_port: u16,
    file: PathBuf,
    mtu: usize,
    window: usize,
) -> Result<()> {
    let peer: SocketAddr = lookup_host((host.as_str(), peer_port))
        .await?
        .next()
        .ok_or_else(|| AppError::Resolve(format!("{host}:{peer_port}")))?;
    let contents = Bytes::from(tokio::fs::read(&file).await?);
    let link = Arc::new(UdpLink::connect(port, peer).await?);

    info!(
        "sending {} bytes from {} to {peer} (mtu {mtu}, window {window})",
        contents.len(),
        file.display()
    );
    let mut sender = Sender::new(link, SenderConfig { mss: mtu, window });
    match sender.run(contents).await {
        Ok(stats) => {
            stats.log_summary();
            Ok(())
        }
        Err(e) => {
            sender.stats().await.log_summary();
            Err(e.into())
        }
    }
}

async fn recv(port: u16, out: PathBuf) -> Result<()> {
    let link = Arc::new(UdpLink::bind(port).await?);
    let file = tokio::fs::File::create(&out).await?;
    let mut sink = tokio::io::BufWriter::new(file);

    info!("listening on port {port}, writing to {}", out.display());
    let stats = Receiver::new(link).run(&mut sink).await?;
    sink.shutdown().await?;
    info!("wrote {} bytes to {}", stats.bytes, out.display());
    Ok(())
}

async fn route(path: PathBuf) -> Result<()> {
    let config = config::load(&path)?;
    let interfaces = config.interfaces()?;
    let arp = Arc::new(config.arp_cache()?);
    let link = Arc::new(UdpDataLink::open(&config.endpoints()?).await?);

    let router = match config.route_table(&interfaces)? {
        Some(table) => {
            info!("static routing with {} entries", table.len());
            Router::fixed(link, interfaces, arp, table)
        }
        None => {
            info!("dynamic routing over RIP");
            Router::dynamic(link, interfaces, arp)
        }
    };
    router.run().await?;
    Ok(())
}
