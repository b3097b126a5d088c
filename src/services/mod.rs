pub mod factory;
pub mod orchestrator;
pub mod progress;
pub mod view;

pub use factory::{StandardTaskFactory, TaskFactory};
pub use orchestrator::{UpdateContext, UpdateSession, UpdateStage};
pub use progress::ProgressReporter;
pub use view::{CredentialProvider, ProgressView};
