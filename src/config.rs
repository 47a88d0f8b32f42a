//! Startup configuration
//!
//! Every setting can come from a flag or an environment variable; nothing is
//! re-read after startup.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::Parser;

use crate::model::DEFAULT_ARTIFACT_PATH;

/// Default request body limit for uploads (10 MiB).
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

/// Serve the latest tracked model over HTTP.
#[derive(Debug, Clone, Parser)]
#[command(name = "model-serving", version, about)]
pub struct ServeConfig {
    /// Tracking server base URL
    #[arg(long, env = "MLFLOW_TRACKING_URI", default_value = "http://localhost:5000")]
    pub tracking_uri: String,

    /// Experiment whose most recent run is served
    #[arg(long, env = "EXPERIMENT_NAME", default_value = "Fashion MNIST Classification")]
    pub experiment_name: String,

    /// Model artifact path inside the run
    #[arg(long, env = "MODEL_ARTIFACT_PATH", default_value = DEFAULT_ARTIFACT_PATH)]
    pub artifact_path: String,

    /// Address to bind
    #[arg(long, env = "BIND_ADDR", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind_addr: IpAddr,

    /// Port to listen on (5001 keeps clear of the tracking UI on 5000)
    #[arg(short, long, env = "PORT", default_value_t = 5001)]
    pub port: u16,

    /// Metric key logged for every prediction
    #[arg(long, env = "METRIC_KEY", default_value = "prediction")]
    pub metric_key: String,

    /// Maximum accepted request body size in bytes
    #[arg(long, env = "BODY_LIMIT_BYTES", default_value_t = DEFAULT_BODY_LIMIT_BYTES)]
    pub body_limit_bytes: usize,
}

impl ServeConfig {
    /// Socket address the server listens on.
    #[must_use]
    pub const fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}
