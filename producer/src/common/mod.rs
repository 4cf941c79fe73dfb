pub mod errors;

pub use errors::{ErrorCondition, EventHubError, EventHubResult, conditions};
