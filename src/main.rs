use anyhow::Context;
use mimalloc::MiMalloc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use seat_inventory::{
    config::Config,
    controllers,
    database::Database,
    rpc::InventoryGrpc,
    store::PgSeatStore,
    AppState,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.app.rust_log));

    let registry = tracing_subscriber::registry().with(filter);
    if config.app.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Invalid configuration")?;
    init_tracing(&config);

    info!("Starting seat inventory service");

    // Connect to the database
    let db = Database::new(&config.database.url, config.database.pool_size)
        .await
        .context("Failed to connect to database")?;
    info!("Database connected");

    // Run migrations
    db.run_migrations().await.context("Failed to run migrations")?;

    let store = Arc::new(PgSeatStore::new(db));
    let app_state = AppState::new(store, config.clone());

    // --- Start background tasks ---

    // Возврат просроченных блокировок в продажу
    let sweeper = app_state.expiry_sweeper();
    info!(
        "Expiry sweeper: ttl {:?}, every {:?}",
        config.reservation.lock_ttl(),
        config.reservation.sweep_interval()
    );
    task::spawn(sweeper.run());

    // --- Start the gRPC server ---

    let grpc_addr: SocketAddr = format!("{}:{}", config.app.host, config.app.grpc_port)
        .parse()
        .context("Invalid gRPC listen address")?;
    let grpc = InventoryGrpc::new(app_state.commit_service()).into_service();
    info!("gRPC server listening on {}", grpc_addr);
    let grpc_server = async move {
        tonic::transport::Server::builder()
            .add_service(grpc)
            .serve(grpc_addr)
            .await
            .context("gRPC server failed")
    };

    // --- Start the web server ---

    let app = controllers::routes()
        .with_state(app_state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let http_addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .context("Invalid HTTP listen address")?;
    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", http_addr))?;
    info!("HTTP server listening on {}", http_addr);
    let http_server = async move {
        axum::serve(listener, app.into_make_service())
            .await
            .context("HTTP server failed")
    };

    if let Err(e) = futures::future::try_join(grpc_server, http_server).await {
        error!("Server stopped: {:#}", e);
        return Err(e);
    }
    Ok(())
}
