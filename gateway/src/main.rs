mod config;
mod config_api;
mod metrics_defs;
mod projects;
mod server;

use clap::{Args, Parser};
use config::{Config, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use shared::metrics_defs::describe_metrics;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
enum CliCommand {
    /// Serve the gateway
    Run(ConfigArgs),
    /// Check a config file and exit
    Validate(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long, default_value = "gateway.yaml")]
    config: PathBuf,
}

fn main() {
    let cli = CliCommand::parse();

    match cli {
        CliCommand::Validate(args) => match Config::from_file(&args.config) {
            Ok(_) => println!("{} is valid", args.config.display()),
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        },
        CliCommand::Run(args) => {
            let config = match Config::from_file(&args.config) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("{e}");
                    process::exit(1);
                }
            };
            let _sentry = init_logging(&config.logging);
            if let Some(metrics) = &config.metrics {
                init_metrics(metrics);
            }
            if let Err(e) = run(config) {
                tracing::error!(error = %e, "gateway stopped");
                process::exit(1);
            }
        }
    }
}

#[tokio::main]
async fn run(config: Config) -> Result<(), server::GatewayError> {
    server::run(config).await
}

/// Installs the tracing subscriber. Events also go to Sentry when a DSN is
/// configured; the returned guard flushes them on drop.
fn init_logging(logging: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let guard = logging.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    guard
}

fn init_metrics(metrics: &MetricsConfig) {
    let recorder = match StatsdBuilder::from(metrics.statsd_host.as_str(), metrics.statsd_port)
        .build(Some("gateway"))
    {
        Ok(recorder) => recorder,
        Err(e) => {
            tracing::error!(error = %e, "could not create statsd recorder, metrics are disabled");
            return;
        }
    };
    if let Err(e) = metrics::set_global_recorder(recorder) {
        tracing::error!(error = %e, "could not install statsd recorder");
        return;
    }

    for defs in [
        auth::metrics_defs::ALL_METRICS,
        integrations::metrics_defs::ALL_METRICS,
        runner::metrics_defs::ALL_METRICS,
        crud::metrics_defs::ALL_METRICS,
        metrics_defs::ALL_METRICS,
    ] {
        describe_metrics(defs);
    }
}
