//! Inbound adapters

pub mod http;

pub use http::AppState;
