//! Event-synchronized trial scheduling: session config, response collection,
//! the event log and the scheduler loop that ties them to the display and
//! trigger hardware.

pub mod collector;
pub mod config;
pub mod error;
pub mod log;
pub mod plan;
pub mod report;
pub mod scheduler;
pub mod sim;
pub mod surface;

pub use collector::{InputSource, Polled, ResponseCollector};
pub use config::{KeyConfig, SchedulerConfig, SessionConfig, TriggerCodes};
pub use error::{ConfigError, InputError, LogError, PresentationError, SessionError};
pub use log::{EventLog, SessionInfo};
pub use plan::TrialPlanBuilder;
pub use report::SessionReport;
pub use scheduler::{BackgroundControl, CancellationToken, RunOutcome, Scheduler};
pub use surface::{Frame, PresentationSurface};
