//! PlantCare Classifier Server - Main Entry Point

use std::path::PathBuf;

use anyhow::Context;
use api::{init_logging, run_server, ServerConfig};
use clap::Parser;
use inference_engine::{BackendKind, Classifier};
use tracing::info;

/// Plant leaf disease classification server
#[derive(Parser, Debug)]
#[command(name = "plantcare-server")]
#[command(version)]
#[command(about = "HTTP API serving the plant leaf disease classifier")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "PLANTCARE_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// ONNX model file
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Newline-separated class labels replacing the built-in table
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Serve deterministic mock predictions without loading a model
    #[arg(long)]
    mock: bool,
}

impl Cli {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(model) = self.model {
            config.model.model_path = model;
        }
        if let Some(labels) = self.labels {
            config.model.labels_path = Some(labels);
        }
        if self.mock {
            config.model.backend = BackendKind::Mock;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ServerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config);

    init_logging(&config.log).map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("=== PlantCare Classifier v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Model: {:?} ({})", config.model.model_path, config.model.backend.as_str());

    let model_config = config.model.clone();
    let classifier = tokio::task::spawn_blocking(move || Classifier::load(&model_config))
        .await
        .context("Model loading task panicked")?
        .context("Failed to load classifier")?;

    run_server(&config, classifier)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
