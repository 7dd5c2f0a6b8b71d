//! Audit trail for user-facing and retention actions.

mod model;
mod repository;

pub use model::{AccessLogEntry, AccessType};
pub use repository::AccessLogRepository;
