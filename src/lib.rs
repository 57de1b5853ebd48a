//! # groundctl
//!
//! Control plane for edge registry satellites: fleet membership, zero-touch
//! registration and state artifact publishing. Usable both as a standalone
//! binary and as a library.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use groundctl::config::ServerConfig;
//! use groundctl::server::{AppState, create_router};
//! use groundctl::store::SqliteStore;
//! use groundctl::upstream::{HarborClient, OciClient};
//!
//! let config = ServerConfig::default();
//! let store = SqliteStore::new(config.db_path())?;
//! store.initialize().await?;
//!
//! let state = Arc::new(AppState::new(
//!     store,
//!     &config,
//!     Arc::new(HarborClient::new(&config.registry)?),
//!     Arc::new(OciClient::new(&config.registry)?),
//! ));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): builds the `groundctl` binary. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod registration;
pub mod server;
pub mod state;
pub mod store;
pub mod sync;
pub mod types;
pub mod upstream;
