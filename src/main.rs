//! Node binary: process bootstrap (CLI, config, logging,
//! output-channel construction), then hands off to the supervisor.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use lichtenstein_client::config::Config;
use lichtenstein_client::endpoint::{ServerEndpoint, DEFAULT_PORT};
use lichtenstein_client::identity::NodeIdentity;
use lichtenstein_client::output::OutputChannel;
use lichtenstein_client::wire::PixelFormat;
use lichtenstein_client::Supervisor;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "lichtenstein-client", version, about = "Lichtenstein protocol client node")]
struct Args {
    /// Path to the node's TOML configuration file.
    #[arg(short, long, default_value = "lichtenstein.toml")]
    config: PathBuf,

    /// Override the tracing env-filter (e.g. "debug", "lichtenstein_client=trace").
    #[arg(short, long)]
    log_level: Option<String>,
}

/// Output channel that logs and discards: the production stand-in for a
/// real hardware driver, which is loaded by an external plugin mechanism
/// out of scope here.
struct NullChannel {
    index: u32,
    pixel_count: u32,
    format: PixelFormat,
}

impl OutputChannel for NullChannel {
    fn channel_index(&self) -> u32 {
        self.index
    }

    fn pixel_count(&self) -> u32 {
        self.pixel_count
    }

    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn update_pixels(&self, offset: u32, data: &[u8]) {
        info!(channel = self.index, offset, bytes = data.len(), "pixels received (no driver attached)");
    }
}

fn build_channels(cfg: &Config) -> Vec<Arc<dyn OutputChannel>> {
    let count = cfg.get_u64("channels.count", 0);
    (0..count)
        .map(|i| {
            let base = format!("channels.{i}");
            let pixel_count = cfg.get_u64(&format!("{base}.pixel_count"), 0) as u32;
            let format_str = cfg.get_string(&format!("{base}.format"), "rgb");
            let format = match format_str.as_str() {
                "rgbw" => PixelFormat::Rgbw,
                _ => PixelFormat::Rgb,
            };
            Arc::new(NullChannel { index: i as u32, pixel_count, format }) as Arc<dyn OutputChannel>
        })
        .collect()
}

fn init_logging(override_filter: Option<&str>) {
    let filter = override_filter
        .map(|s| s.to_owned())
        .unwrap_or_else(|| std::env::var("RUST_LOG").unwrap_or_else(|_| "lichtenstein_client=info".to_owned()));
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();
}

fn main() -> std::process::ExitCode {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    let cfg = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return std::process::ExitCode::FAILURE;
        }
    };

    let identity = match cfg
        .get_string_required("id.uuid")
        .and_then(|uuid| Ok((uuid, cfg.get_string_required("id.secret")?)))
        .map_err(|e| e.to_string())
        .and_then(|(uuid, secret)| NodeIdentity::from_config(&uuid, &secret).map_err(|e| e.to_string()))
    {
        Ok(id) => id,
        Err(e) => {
            error!(error = %e, "invalid node identity");
            return std::process::ExitCode::FAILURE;
        }
    };

    let host = match cfg.get_string_required("remote.server.address") {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "remote address (remote.server.address) is required");
            return std::process::ExitCode::FAILURE;
        }
    };
    let raw_port = cfg.get_u64("remote.server.port", DEFAULT_PORT as u64);
    let port = match u16::try_from(raw_port) {
        Ok(p) => p,
        Err(_) => {
            error!(port = raw_port, "remote.server.port is out of range (must fit in 16 bits)");
            return std::process::ExitCode::FAILURE;
        }
    };
    let ipv4_only = cfg.get_bool("remote.server.ipv4_only", false);
    let endpoint = ServerEndpoint::new(host, port, ipv4_only);
    let read_timeout = cfg.get_duration("remote.recv_timeout", 2.0);

    let channels = build_channels(&cfg);
    if channels.is_empty() {
        warn!("no output channels configured, node will subscribe to nothing");
    }

    info!(peer = %endpoint.host, port = endpoint.port, channels = channels.len(), "starting node");

    let supervisor = Arc::new(Supervisor::new(endpoint, identity, read_timeout, channels));
    let sig_supervisor = supervisor.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("signal received, shutting down");
        sig_supervisor.terminate();
    }) {
        warn!(error = %e, "failed to install signal handler, Ctrl-C will not terminate cleanly");
    }

    match supervisor.run() {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "node exiting");
            std::process::ExitCode::FAILURE
        }
    }
}
