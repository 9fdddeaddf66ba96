//! edgekit - edge simulators, connectors and IaC tools
//!
//! Main entry point. Each subcommand runs one service or one tool; services
//! read their settings from the environment (`.env` is loaded first).

use anyhow::Context;
use clap::{Parser, Subcommand};
use edgekit::{
    iac::{self, BicepDocsArgs, LinkLangArgs, PrDiffArgs, TfVarsArgs, VersionCheckArgs},
    onvif_camera::{self, OnvifCameraConfig},
    onvif_connector::{self, OnvifConnectorConfig},
    rest_connector::{self, RestConnectorConfig},
    rest_devices::{self, AuthDeviceConfig, SensorConfig, WeatherStationConfig},
    sse_connector::{self, SseConnectorConfig},
    sse_server::{self, SseServerConfig},
};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "edgekit", version, about = "Edge device simulators, MQTT connectors and IaC tools")]
struct Cli {
    /// Load environment variables from this file instead of ./.env
    #[arg(long, global = true, env = "EDGEKIT_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// ONVIF camera simulator
    OnvifCamera,
    /// ONVIF camera polling -> MQTT
    OnvifConnector,
    /// Server-Sent Events device simulator
    SseServer,
    /// SSE stream -> MQTT
    SseConnector,
    /// Weather station REST simulator
    WeatherStation,
    /// Field sensor REST simulator
    SensorSimulator,
    /// HTTP Basic-auth device simulator
    AuthDevice,
    /// REST device polling -> MQTT
    RestConnector,
    /// Compare AIO component versions with the published release manifests
    AioVersionCheck(VersionCheckArgs),
    /// Summarise the diff in a PR reference XML file
    PrDiff(PrDiffArgs),
    /// Find (or fix) URLs pinned to the en-us locale
    LinkLangCheck(LinkLangArgs),
    /// Check Terraform variable descriptions for consistency
    TfVarsCheck(TfVarsArgs),
    /// Generate Markdown docs from compiled Bicep (ARM JSON)
    BicepDocs(BicepDocsArgs),
}

fn load_env(path: Option<&Path>) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load env file {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "edgekit=debug,tower_http=debug"
    } else {
        "edgekit=info,tower_http=info"
    };
    // stdout is reserved for tool output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn execute(command: Command) -> edgekit::Result<i32> {
    match command {
        Command::OnvifCamera => onvif_camera::run(OnvifCameraConfig::default()).await?,
        Command::OnvifConnector => onvif_connector::run(OnvifConnectorConfig::default()).await?,
        Command::SseServer => sse_server::run(SseServerConfig::default()).await?,
        Command::SseConnector => sse_connector::run(SseConnectorConfig::default()).await?,
        Command::WeatherStation => {
            rest_devices::run_weather_station(WeatherStationConfig::default()).await?
        }
        Command::SensorSimulator => rest_devices::run_sensor_simulator(SensorConfig::default()).await?,
        Command::AuthDevice => rest_devices::run_auth_device(AuthDeviceConfig::default()).await?,
        Command::RestConnector => rest_connector::run(RestConnectorConfig::default()).await?,
        Command::AioVersionCheck(args) => return iac::version_check::run(&args).await,
        Command::PrDiff(args) => return iac::pr_diff::run(&args),
        Command::LinkLangCheck(args) => return iac::link_lang::run(&args),
        Command::TfVarsCheck(args) => return iac::tf_vars::run(&args),
        Command::BicepDocs(args) => return iac::bicep_docs::run(&args),
    }
    Ok(0)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    load_env(cli.env_file.as_deref())?;
    init_tracing(cli.verbose);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), command = ?cli.command, "Starting edgekit");

    let code = match execute(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            e.exit_code()
        }
    };
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
