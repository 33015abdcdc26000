// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use examprep::config::Config;
use examprep::fixtures::demo_catalog;
use examprep::routes;
use examprep::state::AppState;
use examprep::store::{MemoryStore, PgStore, Store};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DB_CONNECT_RETRIES: u32 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if present)
    dotenv().ok();

    let config = Config::from_env()?;

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pool = connect_with_retry(url).await?;
            tracing::info!("Database connected...");

            tracing::info!("Running migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Migrations applied successfully.");

            if config.seed_demo_data {
                tracing::warn!("SEED_DEMO_DATA only applies to the in-memory store, ignoring");
            }
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running on the in-memory store");
            let store = MemoryStore::new();
            if config.seed_demo_data {
                let demo = demo_catalog(&store)?;
                tracing::info!(
                    "Seeded demo catalog: tests {}, {} and {}",
                    demo.physics_test,
                    demo.chemistry_test,
                    demo.general_test
                );
            }
            Arc::new(store)
        }
    };

    tracing::info!(
        "Marking +{}/{} per question, attempt policy {:?}",
        config.marking.correct_points,
        config.marking.incorrect_points,
        config.attempt_policy
    );

    let bind_addr = config.bind_addr.clone();
    let app = routes::create_router(AppState::new(store, config));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn connect_with_retry(url: &str) -> Result<PgPool, sqlx::Error> {
    let mut retry_count = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) if retry_count < DB_CONNECT_RETRIES => {
                retry_count += 1;
                tracing::warn!(
                    "Database not ready, retrying in 2s... (Attempt {}): {}",
                    retry_count,
                    e
                );
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
