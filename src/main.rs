use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use weather_pipeline::config::Config;
use weather_pipeline::db::{self, LocationRepository, ReadingRepository};
use weather_pipeline::etl::{self, PipelineOptions};
use weather_pipeline::fetcher::TomorrowClient;
use weather_pipeline::scheduler;

#[derive(Parser)]
#[command(
    name = "weather-pipeline",
    about = "Scheduled ETL pipeline for Tomorrow.io weather forecasts"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the ETL pipeline once and exit
    Run,
    /// Run the ETL pipeline on the configured interval, forever
    Scheduler,
    /// Apply pending database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,weather_pipeline=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    info!("Connecting to database...");
    let pool = db::connect(
        &config.database_url,
        config.pool_size,
        config.pool_acquire_timeout(),
    )
    .await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations completed");

    match cli.command {
        Command::Migrate => {
            // Migrations already ran above; nothing left to do.
            pool.close().await;
            Ok(())
        }
        Command::Run => {
            let exit_ok = run_once(&config, pool.clone()).await?;
            pool.close().await;
            if exit_ok {
                Ok(())
            } else {
                std::process::exit(1);
            }
        }
        Command::Scheduler => {
            if !db::health_check(&pool).await {
                error!("Database health check failed, refusing to start scheduler");
                std::process::exit(1);
            }

            let client = build_client(&config)?;
            let location_repo = LocationRepository::new(pool.clone());
            let reading_repo = ReadingRepository::new(pool.clone());

            info!("Starting pipeline scheduler");
            scheduler::start_pipeline_scheduler(
                client,
                location_repo,
                reading_repo,
                pipeline_options(&config),
                config.fetch_interval_minutes,
            )
            .await;
            Ok(())
        }
    }
}

async fn run_once(config: &Config, pool: PgPool) -> Result<bool, Box<dyn std::error::Error>> {
    if !db::health_check(&pool).await {
        error!("Database health check failed");
        return Ok(false);
    }

    let client = build_client(config)?;
    let location_repo = LocationRepository::new(pool.clone());
    let reading_repo = ReadingRepository::new(pool);

    let outcome = etl::run_pipeline(
        &client,
        &location_repo,
        &reading_repo,
        &pipeline_options(config),
    )
    .await;

    if outcome.success() {
        info!(
            locations_processed = outcome.locations_processed,
            readings_upserted = outcome.readings_upserted,
            "Pipeline run succeeded"
        );
    } else {
        error!(
            locations_failed = outcome.locations_failed,
            errors = ?outcome.errors,
            "Pipeline run failed"
        );
    }

    Ok(outcome.success())
}

fn build_client(config: &Config) -> Result<TomorrowClient, Box<dyn std::error::Error>> {
    Ok(TomorrowClient::new(
        config.tomorrow_api_base_url.clone(),
        config.tomorrow_api_key.clone(),
        config.api_timeout(),
        config.api_max_retries,
    )?)
}

fn pipeline_options(config: &Config) -> PipelineOptions {
    PipelineOptions {
        granularity: config.data_granularity,
        historical_hours: config.historical_hours,
        forecast_hours: config.forecast_hours,
        request_delay: config.request_delay(),
    }
}
