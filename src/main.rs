use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use std::fs;
use std::path::Path;
use tokio::sync::watch;

mod models;
mod repositories;
mod services;
mod settings;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log4rs).expect("Failed to initialize logging.");
    log::info!("Starting SINPE ledger service.");

    let config = settings::Settings::new(&args.config).expect("Could not load config file.");
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .connect(&config.postgres.url)
        .await
        .expect("Could not connect to database.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Could not run database migrations.");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    services::start_services(pool, config, shutdown_rx)
        .await
        .expect("Could not start services.");

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal.");

    log::info!("Shutdown signal received, stopping services.");
    let _ = shutdown_tx.send(true);

    // Give schedulers and the HTTP server a moment to wind down.
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}
