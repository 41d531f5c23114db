pub mod core_services;
pub mod error;
pub mod extractor;
pub mod state_service;
pub mod sync_service;

pub use core_services::AlertingCore;
pub use error::AlertError;
pub use extractor::{AlertExtractor, ExtractionError};
pub use state_service::{AlertStateMachine, apply_state_change};
pub use sync_service::AlertSyncer;
