//! REST backend for a coding-bootcamp directory.
//!
//! Bootcamps own courses and reviews. Every collection listing goes through the
//! same advanced-results pipeline:
//!
//! - Query strings such as `averageCost[lte]=10000&careers[in]=Business` are
//!   translated into a [`query::FilterPredicate`]
//! - `select`, `sort`, `page` and `limit` are reserved and never filter
//! - Matching records are counted and fetched concurrently, then wrapped in an
//!   [`results::Envelope`] carrying `success`, `count`, `pagination` and `data`
//!
//! # Storage
//!
//! Records live in Redis, one hash per collection keyed by record id. Setting
//! `STORE_BACKEND=memory` swaps in an in-process store, which is what the tests
//! run against.
//!
//! # Setup
//!
//! Run with seeded fixtures and verbose logs.
//! ```sh
//! STORE_BACKEND=memory SEED_DIR=_data RUST_LOG=devcamper=debug,tower_http=info cargo run
//! ```
//!
//! Load fixtures into Redis.
//! ```sh
//! cargo run -p seeder -- --import
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{Method, StatusCode, header::CONTENT_TYPE},
    routing::get,
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod database;
pub mod error;
pub mod pagination;
pub mod query;
pub mod results;
pub mod routes;
pub mod state;
pub mod utils;

use routes::{
    bootcamp_courses, bootcamp_reviews, create_bootcamp, create_course, create_review,
    delete_bootcamp, delete_course, delete_review, get_bootcamp, get_course, get_review,
    list_bootcamps, list_courses, list_reviews, update_bootcamp, update_course, update_review,
};
use state::State;

pub fn app(state: Arc<State>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let api = Router::new()
        .route("/bootcamps", get(list_bootcamps).post(create_bootcamp))
        .route(
            "/bootcamps/{id}",
            get(get_bootcamp).put(update_bootcamp).delete(delete_bootcamp),
        )
        .route(
            "/bootcamps/{bootcamp_id}/courses",
            get(bootcamp_courses).post(create_course),
        )
        .route(
            "/bootcamps/{bootcamp_id}/reviews",
            get(bootcamp_reviews).post(create_review),
        )
        .route("/courses", get(list_courses))
        .route(
            "/courses/{id}",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route("/reviews", get(list_reviews))
        .route(
            "/reviews/{id}",
            get(get_review).put(update_review).delete(delete_review),
        );

    Router::new()
        .nest("/api/v1", api)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = State::new().await.inspect_err(|e| {
        error!("Failed to initialize state: {e}");
    })?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    println!("Server shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
