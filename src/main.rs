use rafflehub::orchestration::CheckoutSweeper;
use rafflehub::{api, config::Config, db::init_db, PaymentGateway, Repository, StripeGateway};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    // Initialize database and dependencies
    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));
    let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeGateway::new(
        config.payment_api_url.clone(),
        config.payment_secret_key.clone(),
    ));

    let sweeper = CheckoutSweeper::new(
        repo.clone(),
        config.checkout_ttl_ms,
        Duration::from_secs(config.sweep_interval_secs),
    );
    tokio::spawn(sweeper.run());

    // Create router
    let app = api::create_router(api::AppState::new(repo, gateway, config));

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    // Run server
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
