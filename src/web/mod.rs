//! Axum front for the portal: SSO login, session cookie, subdomain endpoints.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use subdomain_portal::web::{AppState, PortalConfig, app_routes};
//!
//! let config = PortalConfig::from_env()?;
//! let state = AppState::new(&config, store, dns);
//! let app = axum::Router::new().merge(app_routes(state));
//! ```

mod config;
mod cookies;
mod error;
mod extractor;
mod routes;
mod state;
mod types;

pub use config::PortalConfig;
pub use error::WebError;
pub use extractor::{AdminUser, AuthenticatedUser, SessionContext};
pub use routes::app_routes;
pub use state::AppState;
pub use types::{
    AdminCheckResponse, ProfileResponse, RegisterSubdomainRequest, RegisterSubdomainResponse,
};

/// Re-export cookie key type for builder API.
pub use axum_extra::extract::cookie::Key as CookieKey;
