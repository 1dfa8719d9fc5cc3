use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pos_companion::config::Config;
use pos_companion::db::{LedgerStore, PosStore};
use pos_companion::routes::{self, AppState};
use pos_companion::topics::TableTopics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pos_companion=debug"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("BUILD_GIT_SHA"),
        built = env!("BUILD_TIMESTAMP"),
        "Iniciando POS companion"
    );

    let config = Config::from_env()?;

    let ledger = Arc::new(LedgerStore::init(&config.ledger_db_path)?);
    let pos = Arc::new(PosStore::init(&config.pos_db_path)?);
    let topics = Arc::new(TableTopics::new());

    let state = AppState {
        ledger,
        pos,
        topics,
    };
    let app = routes::router(state, &config.public_dir);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "Servidor escuchando");
    axum::serve(listener, app).await?;

    Ok(())
}
