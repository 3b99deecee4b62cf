//! Footfall publisher: publishes one telemetry snapshot per invocation.
//!
//! Reads settings from flags and an optional TOML file, connects to AWS IoT
//! Core over mutual TLS or WebSocket TLS, publishes the snapshot at QoS 1,
//! and exits with 0 on success, 2 on a configuration error, 1 otherwise.
//! Running with no options, or with options that do not parse, prints
//! usage and exits 1.

use std::process::ExitCode;
use std::sync::Arc;

use tracing::Instrument;
use tracing_subscriber::EnvFilter;

use ff_mqtt_channel::MqttTransportFactory;
use ff_publisher::cli::Cli;
use ff_publisher::{PublishSession, TracingReporter};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "footfall-publisher starting"
    );

    let cli = match Cli::try_parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(Cli::exit_code_for(&e));
        }
    };

    // ── Load config ─────────────────────────────────────────────
    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "failed to load config");
            return ExitCode::from(2);
        }
    };

    let collaborators = match config.collaborators() {
        Ok(collaborators) => collaborators,
        Err(e) => {
            tracing::error!(error = %e, "failed to set up data sources");
            return ExitCode::from(2);
        }
    };

    // ── Run ─────────────────────────────────────────────────────
    let reporter = Arc::new(TracingReporter::new());
    let span = reporter.span().clone();
    let session = PublishSession::new(
        config.session_settings(),
        Arc::new(MqttTransportFactory),
        collaborators,
        reporter,
    );

    let outcome = session.run().instrument(span).await;
    let code = outcome.exit_code();
    tracing::info!(exit_code = code, "footfall-publisher finished");
    ExitCode::from(code)
}
