use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use spotter_control_plane::features::failover::controller::FailoverController;
use spotter_control_plane::features::failover::service::FailoverService;
use spotter_control_plane::features::price_evaluation::controller::PriceEvaluationController;
use spotter_control_plane::features::price_evaluation::service::PriceEvaluationService;
use spotter_control_plane::features::recommendation_store::controller::RecommendationController;
use spotter_control_plane::features::recommendation_store::service::RecommendationStore;
use spotter_control_plane::shared::adapters::{self, AdapterSettings};
use spotter_control_plane::shared::error::SpotterError;
use spotter_core::{ErrorResponse, SpotterConfig};
use tokio::io::AsyncReadExt;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "spotter")]
#[command(version, about = "Keeps a spot workload on the cheapest acceptable capacity")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Use in-process stand-ins for any collaborator that is not configured.
    /// Nothing is launched and recommendations are not persisted.
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one price evaluation cycle
    Evaluate,

    /// Handle one interruption event
    Failover {
        /// Event JSON file, or `-` for stdin
        #[arg(short, long)]
        event: String,
    },

    /// Evaluate on the configured cadence until interrupted
    Run,

    /// Print the stored recommendation
    Recommendation,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "spotter=debug,spotter_control_plane=debug,info"
    } else {
        "spotter=info,spotter_control_plane=info,info"
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = SpotterConfig::from_env()?;
    config.validate()?;

    info!(
        cluster = %config.cluster_name,
        region = %config.region,
        candidates = config.candidates.len(),
        dry_run = cli.dry_run,
        "Starting Spotter"
    );

    let settings = AdapterSettings::from_env(cli.dry_run);
    let repository = adapters::recommendation_repository(&settings)
        .await
        .unwrap_or_else(|e| report(e.into()));
    let store = Arc::new(RecommendationStore::new(repository, config.call_timeout()));

    match cli.command {
        Commands::Evaluate => {
            let controller = evaluation_controller(&settings, &config, store)
                .unwrap_or_else(|e| report(e.into()));
            finish(controller.run_cycle().await)
        }
        Commands::Failover { event } => {
            let compute = adapters::compute_launcher(&settings, &config)
                .unwrap_or_else(|e| report(e.into()));
            let event = read_event(&event).await?;
            let service = Arc::new(FailoverService::new(store, compute, &config));
            let controller = FailoverController::new(
                service,
                config.cluster_name.clone(),
                config.invocation_deadline(),
            );
            finish(controller.handle_event(&event).await)
        }
        Commands::Run => {
            let controller = Arc::new(
                evaluation_controller(&settings, &config, store)
                    .unwrap_or_else(|e| report(e.into())),
            );
            let handle = controller.spawn_periodic_evaluation();
            info!(
                every_minutes = config.check_frequency_minutes,
                "Periodic evaluation started"
            );

            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
            handle.abort();
            Ok(())
        }
        Commands::Recommendation => {
            let controller = RecommendationController::new(store, config.cluster_name.clone());
            finish(controller.current().await)
        }
    }
}

fn evaluation_controller(
    settings: &AdapterSettings,
    config: &SpotterConfig,
    store: Arc<RecommendationStore>,
) -> Result<PriceEvaluationController, SpotterError> {
    let prices = adapters::price_source(settings, config)?;
    let service = Arc::new(PriceEvaluationService::new(prices, store, config));
    Ok(PriceEvaluationController::new(
        service,
        config.check_interval(),
        config.invocation_deadline(),
    ))
}

async fn read_event(path: &str) -> Result<Value, Box<dyn std::error::Error>> {
    let raw = if path == "-" {
        let mut buffer = String::new();
        tokio::io::stdin().read_to_string(&mut buffer).await?;
        buffer
    } else {
        tokio::fs::read_to_string(path).await?
    };

    Ok(serde_json::from_str(&raw)?)
}

/// Print the invocation result; a reported error ends the process with a
/// non-zero status.
fn finish<T: Serialize>(result: Result<T, ErrorResponse>) -> Result<(), Box<dyn std::error::Error>> {
    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(response) => report(response),
    }
}

fn report(response: ErrorResponse) -> ! {
    error!(code = %response.error_code, message = %response.message, "Invocation failed");
    match serde_json::to_string_pretty(&response) {
        Ok(body) => eprintln!("{body}"),
        Err(_) => eprintln!("{}: {}", response.error_code, response.message),
    }
    std::process::exit(1);
}
