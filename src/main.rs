use std::net::SocketAddr;
use std::sync::Arc;

use trackback_item::config::Config;
use trackback_item::db::create_pool;
use trackback_item::proto::health::health_server::HealthServer;
use trackback_item::proto::items::items_service_server::ItemsServiceServer;
use trackback_item::services::{HealthServiceImpl, ItemsServiceImpl};
use trackback_item::store::{ItemStore, MemoryItemStore, PgItemStore};

use tonic::transport::Server;
use tonic_reflection::server::Builder as ReflectionBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Include file descriptor for gRPC reflection
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("trackback_descriptor");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trackback_item=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    tracing::info!("Starting trackback-item gRPC server...");

    // Pick the item store backend
    let store: Arc<dyn ItemStore> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = create_pool(database_url).await?;
            sqlx::migrate!().run(&pool).await?;
            tracing::info!("Database connection established");
            Arc::new(PgItemStore::new(pool))
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory item store");
            Arc::new(MemoryItemStore::new())
        }
    };

    // Create services
    let items_service = ItemsServiceImpl::new(store);
    let health_service = HealthServiceImpl::new();

    // CORS layer for gRPC-Web
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any)
        .expose_headers(Any);

    // Build reflection service
    let reflection_service = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    // Parse server address
    let addr: SocketAddr = config.server_addr().parse()?;
    tracing::info!("Listening on {}", addr);

    // Build and run server with gRPC-Web support
    Server::builder()
        .accept_http1(true) // Required for gRPC-Web
        .layer(cors)
        .layer(tonic_web::GrpcWebLayer::new()) // Enable gRPC-Web
        .add_service(reflection_service)
        .add_service(ItemsServiceServer::new(items_service))
        .add_service(HealthServer::new(health_service))
        .serve(addr)
        .await?;

    Ok(())
}
