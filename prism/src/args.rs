use std::path::PathBuf;

use clap::Parser;

/// Prism media generation gateway
#[derive(Debug, Parser)]
#[command(name = "prism", about = "Unified gateway for image and video generation providers")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "prism.toml", env = "PRISM_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "PRISM_LISTEN")]
    pub listen: Option<std::net::SocketAddr>,
}
