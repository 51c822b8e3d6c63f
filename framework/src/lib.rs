pub mod config;
pub mod jobs;
pub mod lifecycle;
pub mod mail;
mod serve;

pub use config::{DispatcherConfig, EnvConfig};
pub use jobs::{Dispatcher, Handler, JobFailure, ShutdownOutcome, SubmitError};
pub use lifecycle::Lifecycle;
pub use serve::serve;
pub use tokio_util::task::TaskTracker;
