pub mod agents;
pub mod error;
