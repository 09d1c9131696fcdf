mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use mr_av::{ToolRegistry, TransformSpec};
use mr_core::config::Config;
use mr_core::RequestId;
use mr_pipeline::Coordinator;
use mr_server::routes::process::ProcessResponse;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise derive from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediarelay=trace,mr_core=trace,mr_av=trace,mr_pipeline=trace,mr_server=trace,tower_http=debug".to_string()
        } else {
            "mediarelay=info,mr_core=info,mr_av=info,mr_pipeline=info,mr_server=info,tower_http=info".to_string()
        }
    });

    // Logs go to stderr so `process` output stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Process {
            source,
            key,
            style,
            filter,
        } => {
            let transform = match (style, filter) {
                (_, Some(filter)) => Some(TransformSpec::filter(filter)),
                (Some(style), None) => Some(TransformSpec::style(style)),
                (None, None) => None,
            };
            let rt = tokio::runtime::Runtime::new()?;
            let ok = rt.block_on(process_once(&source, &key, transform, cli.config.as_deref()))?;
            if !ok {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mediarelay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn start_server(host: Option<String>, port: Option<u16>, config_path: Option<&Path>) -> Result<()> {
    let mut config = Config::load_or_default(config_path);
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!(
        "Starting mediarelay on {}:{}",
        config.server.host,
        config.server.port
    );

    mr_server::start(config).await?;
    Ok(())
}

/// Run one pipeline in-process. Returns whether the run succeeded.
async fn process_once(
    source: &str,
    key: &str,
    transform: Option<TransformSpec>,
    config_path: Option<&Path>,
) -> Result<bool> {
    let config = Config::load_or_default(config_path);
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let tools = Arc::new(ToolRegistry::discover(&config.tools));
    let coordinator = Coordinator::from_config(&config, tools)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted; cancelling run");
            on_interrupt.cancel();
        }
    });

    let outcome = coordinator
        .submit(RequestId::new(), source, key, transform, &cancel)
        .await;

    let response = ProcessResponse::from_outcome(&outcome);
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(outcome.is_ok())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let registry = ToolRegistry::discover(&config.tools);
    let mut all_ok = true;

    for tool in registry.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else if config.transcode.enabled {
        println!("Some tools are missing. Requests will fail with toolNotAvailable.");
    } else {
        println!("Some tools are missing, but transcoding is disabled; sources pass through.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            Config::load(p).with_context(|| format!("invalid config file {}", p.display()))?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("✓ Configuration parsed");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Transcoding enabled: {}", config.transcode.enabled);
    println!("  Max concurrent runs: {}", config.pipeline.concurrency());
    println!(
        "  Storage: {}",
        if config.storage.is_configured() {
            "configured"
        } else {
            "not configured"
        }
    );

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in warnings {
            println!("  - {warning}");
        }
    }

    Ok(())
}
