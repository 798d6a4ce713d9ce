//! Error types for the SNN runtime

use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur in the SNN runtime
///
/// Structural errors (`DuplicateName`, `UnknownReference`, `InvalidTopology`)
/// are raised while the network is being built. `ShapeMismatch` and
/// `MissingInput` abort a `run` call before any state of the offending
/// timestep is touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// Tensor dimensions disagree with the population or connection they feed
    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// What was being checked
        context: String,
        /// Expected shape
        expected: Vec<usize>,
        /// Shape that was supplied
        actual: Vec<usize>,
    },

    /// A layer, connection, monitor or state variable is not registered
    #[error("Unknown {kind} '{name}'")]
    UnknownReference {
        /// Kind of the referenced entity
        kind: &'static str,
        /// Name that failed to resolve
        name: String,
    },

    /// A name was registered twice
    #[error("Duplicate {kind} name '{name}'")]
    DuplicateName {
        /// Kind of the registered entity
        kind: &'static str,
        /// Offending name
        name: String,
    },

    /// An Input layer has no entry in the input mapping of a `run` call
    #[error("Missing input for layer '{layer}'")]
    MissingInput {
        /// Layer without input
        layer: String,
    },

    /// Invalid parameter value
    #[error("Invalid parameter {parameter}: {value} (expected {constraint})")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// Network topology error
    #[error("Network topology error: {reason}")]
    InvalidTopology {
        /// Reason for topology error
        reason: String,
    },

    /// Structural change requested after the network started running
    #[error("Network is frozen: cannot {operation} after run")]
    NetworkFrozen {
        /// Rejected operation
        operation: &'static str,
    },
}

impl RuntimeError {
    /// Create a shape mismatch error
    pub fn shape_mismatch(
        context: impl Into<String>,
        expected: impl Into<Vec<usize>>,
        actual: impl Into<Vec<usize>>,
    ) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an unknown reference error
    pub fn unknown(kind: &'static str, name: impl Into<String>) -> Self {
        Self::UnknownReference {
            kind,
            name: name.into(),
        }
    }

    /// Create a duplicate name error
    pub fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Self::DuplicateName {
            kind,
            name: name.into(),
        }
    }

    /// Create a missing input error
    pub fn missing_input(layer: impl Into<String>) -> Self {
        Self::MissingInput {
            layer: layer.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(
        parameter: impl Into<String>,
        value: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            constraint: constraint.into(),
        }
    }

    /// Create a network topology error
    pub fn invalid_topology(reason: impl Into<String>) -> Self {
        Self::InvalidTopology {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = RuntimeError::duplicate("layer", "X");
        assert!(matches!(err, RuntimeError::DuplicateName { .. }));

        let err = RuntimeError::invalid_parameter("tau_rc", "0.5", ">= 1.0");
        assert!(matches!(err, RuntimeError::InvalidParameter { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = RuntimeError::shape_mismatch("layer 'Y' input", [4], [3]);
        let msg = format!("{}", err);
        assert!(msg.contains("layer 'Y' input"));
        assert!(msg.contains("[4]"));

        let err = RuntimeError::missing_input("X");
        assert_eq!(err.to_string(), "Missing input for layer 'X'");

        let err = RuntimeError::NetworkFrozen { operation: "add layer" };
        assert!(err.to_string().contains("add layer"));
    }
}
