//! # Apothecary API
//!
//! REST server for the pharmacy back-office and tills.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          API Server Routes                              │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────────┐│
//! │  │  auth / users  │  │  products      │  │  sales                     ││
//! │  │                │  │                │  │                            ││
//! │  │ • login  • me  │  │ • CRUD, search │  │ • fulfill  • hold          ││
//! │  │ • password     │  │ • low stock    │  │ • complete • cancel        ││
//! │  │ • create user  │  │ • stock moves  │  └────────────────────────────┘│
//! │  └────────────────┘  │ • categories   │                                │
//! │                      │ • suppliers    │                                │
//! │                      └────────────────┘                                │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────────┐│
//! │  │  customers     │  │  settings      │  │  prescriptions             ││
//! │  │                │  │                │  │                            ││
//! │  │ • create/search│  │ • get/update   │  │ • create  • dispense       ││
//! │  └────────────────┘  └────────────────┘  │ • cancel                   ││
//! │                                          └────────────────────────────┘│
//! │  ┌──────────────────────────────────┐  ┌──────────────────────────────┐│
//! │  │  test types / lab tests          │  │  expenses                    ││
//! │  │                                  │  │                              ││
//! │  │ • request • start • measure      │  │ • record • edit own          ││
//! │  │ • complete • review • pay        │  │ • approve • unapprove        ││
//! │  └──────────────────────────────────┘  └──────────────────────────────┘│
//! │                                                                         │
//! │  Every protected handler: Actor (JWT) → require(Action) → repository   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! Environment variables:
//! - `API_HOST` / `API_PORT` - bind address (default: 127.0.0.1:8080)
//! - `DATABASE_PATH` - SQLite file (default: ./apothecary.db)
//! - `DB_MAX_CONNECTIONS` - pool size (default: 5)
//! - `JWT_SECRET` - Secret for JWT signing
//! - `JWT_ACCESS_LIFETIME_SECS` - Access token lifetime (default: 28800)
//! - `RUST_LOG` - log filter

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use apothecary_db::Database;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// Re-exports
pub use auth::{Actor, JwtManager};
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};

/// Shared application state.
pub struct AppState {
    pub db: Database,
    pub jwt: JwtManager,
}

impl AppState {
    pub fn new(db: Database, jwt: JwtManager) -> Arc<Self> {
        Arc::new(AppState { db, jwt })
    }
}

/// Builds the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
