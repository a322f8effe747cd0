//! HTTP surface for the ytscribe engine.

pub mod config;
pub mod handlers;
pub mod observability;
pub mod preflight;
pub mod router;
pub mod state;

pub use config::ServerSettings;
pub use router::create_router;
pub use state::AppState;
