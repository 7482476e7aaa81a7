//! HTTP surface: health, websocket upgrade, static assets

pub mod routes;

pub use routes::build_router;
