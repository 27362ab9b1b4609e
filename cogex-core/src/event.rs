use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle points at which records are emitted.
pub mod event_type {
    pub const TRIGGER_RECEIVED: &str = "trigger_received";
    pub const STIM_ONSET: &str = "stim_onset";
    pub const STIM_OFFSET: &str = "stim_offset";
    pub const RESPONSE_GIVEN: &str = "response_given";
    pub const RESPONSE_TIMEOUT: &str = "response_timeout";
    pub const TRIAL_END: &str = "trial_end";
    pub const REST_START: &str = "rest_start";
    pub const REST_END: &str = "rest_end";
    pub const SESSION_CANCELLED: &str = "session_cancelled";
    pub const SESSION_END: &str = "session_end";
}

/// A single cell value in the event table.
#[derive(Debug, Clone, PartialEq)]
pub enum EventValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(Cow<'static, str>),
    Missing,
}

impl EventValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, EventValue::Missing)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            EventValue::Text(s) => Some(s.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for EventValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventValue::Int(i) => write!(f, "{i}"),
            EventValue::Float(x) => write!(f, "{x}"),
            EventValue::Bool(b) => f.write_str(if *b { "True" } else { "False" }),
            EventValue::Text(s) => f.write_str(s),
            EventValue::Missing => Ok(()),
        }
    }
}

impl Serialize for EventValue {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            EventValue::Int(i) => s.serialize_i64(*i),
            EventValue::Float(x) => s.serialize_f64(*x),
            EventValue::Bool(b) => s.serialize_bool(*b),
            EventValue::Text(t) => s.serialize_str(t),
            EventValue::Missing => s.serialize_none(),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {$(
        impl From<$t> for EventValue {
            fn from(v: $t) -> Self {
                EventValue::Int(v as i64)
            }
        }
    )*};
}
impl_from_int!(i32, i64, u8, u16, u32, usize);

impl From<f64> for EventValue {
    fn from(v: f64) -> Self {
        EventValue::Float(v)
    }
}

impl From<bool> for EventValue {
    fn from(v: bool) -> Self {
        EventValue::Bool(v)
    }
}

impl From<&'static str> for EventValue {
    fn from(v: &'static str) -> Self {
        EventValue::Text(Cow::Borrowed(v))
    }
}

impl From<String> for EventValue {
    fn from(v: String) -> Self {
        EventValue::Text(Cow::Owned(v))
    }
}

impl<T: Into<EventValue>> From<Option<T>> for EventValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(EventValue::Missing, Into::into)
    }
}

/// Schema-less record emitted at a named lifecycle point.
///
/// `time_s`, `trial_index` and `event_type` are always present. Everything
/// else goes in `fields`; the event log computes the union of field names at
/// flush time, so records of different types can carry different fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub time_s: f64,
    pub trial_index: Option<usize>,
    pub event_type: Cow<'static, str>,
    #[serde(flatten)]
    pub fields: BTreeMap<Cow<'static, str>, EventValue>,
}

impl EventRecord {
    pub fn new(event_type: impl Into<Cow<'static, str>>, time_s: f64) -> Self {
        Self {
            time_s,
            trial_index: None,
            event_type: event_type.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn for_trial(mut self, index: usize) -> Self {
        self.trial_index = Some(index);
        self
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<Cow<'static, str>>, value: impl Into<EventValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a field. Names of the mandatory columns are ignored so a
    /// payload cannot shadow them.
    pub fn insert(&mut self, key: impl Into<Cow<'static, str>>, value: impl Into<EventValue>) {
        let key = key.into();
        if is_reserved(&key) {
            return;
        }
        self.fields.insert(key, value.into());
    }

    pub fn get(&self, key: &str) -> Option<&EventValue> {
        self.fields.get(key)
    }

    pub fn is(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }
}

fn is_reserved(key: &str) -> bool {
    matches!(key, "time_s" | "trial_index" | "event_type")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mandatory_fields_cannot_be_overwritten() {
        let mut r = EventRecord::new(event_type::STIM_ONSET, 1.5).for_trial(3);
        r.insert("time_s", 99.0);
        r.insert("condition", "congruent");
        assert_eq!(r.time_s, 1.5);
        assert!(r.get("time_s").is_none());
        assert_eq!(r.get("condition").and_then(EventValue::as_str), Some("congruent"));
    }

    #[test]
    fn option_maps_to_missing() {
        let v: EventValue = Option::<f64>::None.into();
        assert!(v.is_missing());
        assert_eq!(v.to_string(), "");
        let v: EventValue = Some(0.25).into();
        assert_eq!(v, EventValue::Float(0.25));
    }

    #[test]
    fn serializes_flat() {
        let r = EventRecord::new("response_given", 0.4)
            .for_trial(1)
            .with("key", "x");
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(
            json,
            r#"{"time_s":0.4,"trial_index":1,"event_type":"response_given","key":"x"}"#
        );
    }
}
