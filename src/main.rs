use crud_gateway::{
    builtin, load_from_path, router, AppState, ConstraintValidator, CrudEngine, EntityStore, MemoryStore, PgStore,
    Settings, StoreKind,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("crud_gateway=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let config = match &settings.entities_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading entity descriptors");
            load_from_path(path).await?
        }
        None => builtin()?,
    };

    let store: Arc<dyn EntityStore> = match settings.store {
        StoreKind::Postgres => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(settings.max_connections)
                .connect(&settings.database_url)
                .await?;
            Arc::new(PgStore::new(pool))
        }
        StoreKind::Memory => Arc::new(MemoryStore::new()),
    };
    tracing::info!(store = ?settings.store, "store ready");

    let engine = CrudEngine::from_config(&config, store, Arc::new(ConstraintValidator))?;
    let entities: Vec<&str> = engine.registry().entities().map(|e| e.path_segment.as_str()).collect();
    tracing::info!(?entities, "entities registered");
    let app = router(AppState::new(engine), settings.body_limit);

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("crud-gateway listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
