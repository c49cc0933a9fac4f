//! mailsift — concurrent spam-triage pipeline core.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod services;

pub use config::PipelineConfig;
pub use error::{Error, Result, ServiceError, StageFailure};
pub use pipeline::Pipeline;
pub use pipeline::types::{ClassificationRecord, MessageId, PipelineReport, User};
pub use services::{MessageLister, Services, SpamClassifier, UserResolver};
