pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

pub use api::handlers::{AppState, Catalog};
pub use api::routes::create_router;
pub use error::{CatalogError, CatalogResult};
pub use logic::{AssociationManager, PageLimits, QueryEngine};
pub use model::*;
pub use store::{CatalogStore, MemoryStore, PostgresStore};

use std::sync::Arc;

/// Wire the manager and query engine around one store and mount the routes
pub fn build_app<S: CatalogStore + 'static>(store: Arc<S>, limits: PageLimits) -> axum::Router {
    let state: AppState<S> = Arc::new(Catalog::new(store, limits));
    create_router::<S>().with_state(state)
}

/// Serve `app` until the listener fails
pub async fn run_server(app: axum::Router, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let address = listener.local_addr()?;
    log::info!("Movie catalog listening on http://{}", address);
    axum::serve(listener, app).await?;
    Ok(())
}
