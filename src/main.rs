use dirgate::api::{self, app_state::AppState};
use dirgate::config::loader::{ConfigLoader, default_config_path};
use dirgate::config::FileDirectoryConfig;
use dirgate::directory::InMemoryDirectory;
use dirgate::observability::init_tracing;
use dirgate::schema::builtin;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = ConfigLoader::load_from(config_path.clone())?;
    ConfigLoader::validate(&config)?;

    let guard = init_tracing(&config.logging);
    info!(
        "Starting {} ({}) with {}",
        config.app_name,
        config.environment,
        config_path.display()
    );

    let directory = match &config.directory.seed_path {
        Some(seed) => {
            info!("Loading directory seed {}", seed.display());
            InMemoryDirectory::from_seed(seed)?
        }
        None => {
            info!("No directory seed configured, using the example directory");
            InMemoryDirectory::example()
        }
    };
    info!("Directory initialized with {} entries", directory.len());

    let state = AppState::new(
        &config,
        Arc::new(FileDirectoryConfig::new(&config.directory.config_path)),
        Arc::new(directory),
        Arc::new(builtin::registry()),
    );
    let fatal = state.fatal.clone();
    let router = api::initialize_api(state).await?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    let shutdown = {
        let fatal = fatal.clone();
        async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
                _ = fatal.triggered() => {}
            }
        }
    };
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    if let Some(reason) = fatal.reason() {
        error!("Stopped after fatal error: {}", reason);
        drop(guard);
        std::process::exit(1);
    }

    info!("Server stopped");
    drop(guard);
    Ok(())
}
