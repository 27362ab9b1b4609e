use serde::{Deserialize, Serialize};

/// Session-level state machine.
///
/// `AwaitingTrigger -> Running -> Finished`. The clock origin is fixed on the
/// first transition; `Finished` is terminal and a new session object is
/// needed to run again.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    AwaitingTrigger,
    Running,
    Finished,
}

impl SessionState {
    pub fn next(&self) -> Option<Self> {
        use SessionState::*;
        Some(match self {
            AwaitingTrigger => Running,
            Running => Finished,
            Finished => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_forward_and_stops() {
        let s = SessionState::default();
        assert_eq!(s, SessionState::AwaitingTrigger);
        let s = s.next().unwrap();
        assert_eq!(s, SessionState::Running);
        let s = s.next().unwrap();
        assert_eq!(s, SessionState::Finished);
        assert_eq!(s.next(), None);
    }
}
