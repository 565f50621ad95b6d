//! HTTP surface for the scrape engine.
//!
//! `POST /scrape` accepts a [`scrape_engine::ScrapeInvocation`] and returns a
//! [`scrape_engine::ScrapeResponse`]; `GET /health` is a liveness check.

pub mod app;
pub mod config;
pub mod routes;

pub use app::{build_app, build_service, AppState};
pub use config::ServerConfig;
