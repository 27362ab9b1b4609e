use crate::event::EventRecord;
use crate::trial::{Response, TrialStatus};

/// Task-specific data carried by each trial.
///
/// The scheduler only owns timing and I/O sequencing; everything it needs to
/// know about task semantics comes through this trait.
pub trait TrialPayload {
    /// Content handed to the presentation surface at onset.
    type Content;

    fn stimulus(&self) -> &Self::Content;

    /// Code emitted on the onset flip.
    fn trigger_code(&self) -> u8;

    /// Pure correctness predicate, called exactly once per trial.
    fn classify(&self, response: Option<&Response>) -> TrialStatus;

    /// Adds task fields (target, congruency, ...) to the onset record.
    fn describe(&self, _record: &mut EventRecord) {}
}
