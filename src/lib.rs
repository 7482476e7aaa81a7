//! Aim Duel - relay server and client core for a two-player aim duel
//!
//! The server half keeps the authoritative health and life state of at most two
//! participants and relays movement between them. The client half mirrors the
//! opponent, predicts local movement and resolves shots locally before sending
//! hit-intents to the server.

pub mod app;
pub mod client;
pub mod config;
pub mod duel;
pub mod http;
pub mod util;
pub mod ws;
