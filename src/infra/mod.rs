pub mod attachments;
pub mod error;
pub mod telemetry;
