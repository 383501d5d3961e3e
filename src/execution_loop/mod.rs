pub mod controller;
pub mod error_classifier;
pub mod record;

pub use controller::RetryController;
pub use error_classifier::{ErrorClassifier, SqlErrorClass};
pub use record::{Attempt, AttemptOutcome, CandidateOrigin, FailureStage, RunOutcome, RunRecord};
