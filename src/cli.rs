use clap::Parser;
use std::path::PathBuf;

/// ilo_fand — daemon supervising the cooling of an HPE iLO server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML config file path (default: /etc/ilo_fand/config.yml)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Detach from the terminal and run as a background daemon
    #[arg(short = 'd', long = "daemonize", default_value = "false")]
    pub daemonize: bool,
}
