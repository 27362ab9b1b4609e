pub mod event;
pub mod key;
pub mod payload;
pub mod phase;
pub mod stimulus;
pub mod trial;

pub use event::{EventRecord, EventValue, event_type};
pub use key::{Key, KeyPress, KeySet};
pub use payload::TrialPayload;
pub use phase::SessionState;
pub use stimulus::{ArrowDirection, StimulusType};
pub use trial::{
    PlanError, Response, TrialDescriptor, TrialPlan, TrialResult, TrialState, TrialStatus,
};
