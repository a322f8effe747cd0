mod error;
mod health;
mod root;
mod transcribe;

pub use error::{ApiError, ErrorResponse};
pub use health::{health_handler, HealthResponse};
pub use root::root_handler;
pub use transcribe::{transcribe_by_id_handler, transcribe_handler, TranscribeQuery, TranscribeRequest};
