mod difficulty;
mod error;
mod ids;
mod ingestion;
mod platform;
mod submission;
mod submission_status;

pub use difficulty::Difficulty;
pub use error::DomainError;
pub use ids::{DeliveryId, UserId};
pub use ingestion::{DeliveryResult, IngestionClient};
pub use platform::Platform;
pub use submission::Submission;
pub use submission_status::SubmissionStatus;
