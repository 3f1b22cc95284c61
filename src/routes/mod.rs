use axum::Router;

use crate::storage::SharedRepository;
use crate::Config;

mod equipment;
mod health;
mod report;
mod summary;
mod upload;
mod uploads;

// ---

/// Build the application router.
///
/// API routes are served both at the root and under `/api`, each with and
/// without a trailing slash, so existing dashboard clients keep working.
pub fn router(repo: SharedRepository, config: &Config) -> Router {
    // ---
    let api = Router::new()
        .merge(upload::router(config.max_upload_bytes as usize))
        .merge(uploads::router())
        .merge(equipment::router())
        .merge(summary::router())
        .merge(report::router());

    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .merge(health::router())
        .with_state(repo)
}
