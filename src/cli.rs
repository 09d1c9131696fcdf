use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediarelay")]
#[command(author, version, about = "Fetch, transcode, and publish media to object storage")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP service
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one source through the pipeline and print the result as JSON
    Process {
        /// Source media URL (http or https)
        #[arg(long)]
        source: String,

        /// Storage key for the published artifact
        #[arg(long)]
        key: String,

        /// Named style preset
        #[arg(long, conflicts_with = "filter")]
        style: Option<String>,

        /// Explicit filter expression
        #[arg(long)]
        filter: Option<String>,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
