//! State specifications

use serde::{Deserialize, Serialize};

/// Static description of the recurrent state an algorithm threads between steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateSpec {
    /// No state
    Empty,
    /// A single tensor per batch entry with the given shape
    Tensor {
        /// Shape excluding the batch axis
        shape: Vec<usize>,
    },
    /// Named sub-states, in a fixed order
    Record(Vec<(String, StateSpec)>),
}

impl Default for StateSpec {
    fn default() -> Self {
        Self::Empty
    }
}

impl StateSpec {
    /// Spec for a tensor state of the given per-entry shape
    #[must_use]
    pub fn tensor(shape: &[usize]) -> Self {
        Self::Tensor {
            shape: shape.to_vec(),
        }
    }

    /// Build a record spec from `(name, spec)` pairs
    #[must_use]
    pub fn record<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, StateSpec)>,
        S: Into<String>,
    {
        Self::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Whether the spec describes no state at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Tensor { .. } => false,
            Self::Record(fields) => fields.iter().all(|(_, spec)| spec.is_empty()),
        }
    }

    /// Look up a named field of a record spec
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&StateSpec> {
        match self {
            Self::Record(fields) => fields.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Field names of a record spec, in order
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Self::Record(fields) => fields.iter().map(|(k, _)| k.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_lookup_and_emptiness() {
        let spec = StateSpec::record([
            ("rl", StateSpec::Empty),
            ("icm", StateSpec::tensor(&[4])),
        ]);
        assert_eq!(spec.keys(), vec!["rl", "icm"]);
        assert_eq!(spec.field("icm"), Some(&StateSpec::tensor(&[4])));
        assert!(spec.field("entropy_target").is_none());
        assert!(!spec.is_empty());

        let empty = StateSpec::record([("rl", StateSpec::Empty), ("icm", StateSpec::Empty)]);
        assert!(empty.is_empty());
    }
}
