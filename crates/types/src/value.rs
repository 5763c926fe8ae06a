//! Consensus values and per-epoch state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A proposable value: either defined with a payload, or the bottom
/// element.
///
/// Comparisons on "highest timestamp" during the read phase ignore
/// definedness; a leader only adopts a value from the read quorum when the
/// chosen value is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    pub defined: bool,
    pub v: i64,
}

impl Value {
    /// The bottom element.
    pub const UNDEFINED: Value = Value {
        defined: false,
        v: 0,
    };

    pub fn of(v: i64) -> Self {
        Self { defined: true, v }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.defined {
            write!(f, "{}", self.v)
        } else {
            f.write_str("⊥")
        }
    }
}

/// The `(valueTimestamp, value)` pair a process last accepted in some
/// epoch. Carried from an aborted epoch into its successor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpState {
    pub value_timestamp: u64,
    pub value: Value,
}

impl EpState {
    pub fn new(value_timestamp: u64, value: Value) -> Self {
        Self {
            value_timestamp,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_bottom() {
        let state = EpState::default();
        assert_eq!(state.value_timestamp, 0);
        assert!(!state.value.defined);
    }

    #[test]
    fn test_defined_value() {
        let value = Value::of(42);
        assert!(value.defined);
        assert_eq!(value.v, 42);
        assert_ne!(value, Value::UNDEFINED);
    }
}
