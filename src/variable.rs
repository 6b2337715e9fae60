//! Domain model for recorded outcome/response variables
//!
//! A [`Variable`] is one named datum captured during a delivery attempt.
//! Its payload is a closed set of tagged variants ([`VariableValue`]),
//! so property lookup is a static match instead of reflective getter
//! dispatch, and unknown property names simply yield nothing.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single recorded outcome/response datum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Logical name of the variable within its item or test scope
    pub identifier: String,
    /// QTI-style cardinality ("single", "multiple", "ordered", "record")
    pub cardinality: Option<String>,
    /// Base type of the value ("float", "identifier", ...)
    pub base_type: Option<String>,
    /// Creation timestamp as unix seconds; stamped at write time if unset
    pub epoch: Option<f64>,
    pub value: VariableValue,
}

/// The closed set of stored value kinds, tagged for recovery on read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VariableValue {
    Response {
        candidate_response: Option<String>,
        correct_response: Option<String>,
    },
    Outcome {
        value: Option<String>,
        normal_minimum: Option<f64>,
        normal_maximum: Option<f64>,
    },
    Trace {
        trace: Option<String>,
    },
}

impl Variable {
    pub fn new(identifier: impl Into<String>, value: VariableValue) -> Self {
        Self {
            identifier: identifier.into(),
            cardinality: None,
            base_type: None,
            epoch: None,
            value,
        }
    }

    pub fn with_epoch(mut self, epoch: f64) -> Self {
        self.epoch = Some(epoch);
        self
    }

    /// Stamp the variable with the current time if no epoch was set
    pub fn ensure_epoch(&mut self) {
        if self.epoch.is_none() {
            self.epoch = Some(now_epoch());
        }
    }

    /// Static property lookup over the variable and its value variant.
    ///
    /// Returns `None` for property names the concrete variant does not
    /// expose; this is the "absent" outcome, never an error.
    pub fn property(&self, name: &str) -> Option<serde_json::Value> {
        match name {
            "identifier" => Some(json!(self.identifier)),
            "cardinality" => self.cardinality.as_ref().map(|c| json!(c)),
            "base_type" => self.base_type.as_ref().map(|b| json!(b)),
            "epoch" => self.epoch.map(|e| json!(e)),
            _ => self.value.property(name),
        }
    }
}

impl VariableValue {
    /// The class tag recovered on read, matching the serialized `type` field
    pub fn type_tag(&self) -> &'static str {
        match self {
            VariableValue::Response { .. } => "response",
            VariableValue::Outcome { .. } => "outcome",
            VariableValue::Trace { .. } => "trace",
        }
    }

    fn property(&self, name: &str) -> Option<serde_json::Value> {
        match (self, name) {
            (VariableValue::Response { candidate_response, .. }, "candidate_response") => {
                candidate_response.as_ref().map(|v| json!(v))
            }
            (VariableValue::Response { correct_response, .. }, "correct_response") => {
                correct_response.as_ref().map(|v| json!(v))
            }
            (VariableValue::Outcome { value, .. }, "value") => value.as_ref().map(|v| json!(v)),
            (VariableValue::Outcome { normal_minimum, .. }, "normal_minimum") => {
                normal_minimum.map(|v| json!(v))
            }
            (VariableValue::Outcome { normal_maximum, .. }, "normal_maximum") => {
                normal_maximum.map(|v| json!(v))
            }
            (VariableValue::Trace { trace }, "trace") => trace.as_ref().map(|v| json!(v)),
            _ => None,
        }
    }
}

/// Current time as unix seconds with sub-second precision
pub fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(value: &str) -> Variable {
        Variable::new(
            "SCORE",
            VariableValue::Outcome {
                value: Some(value.to_string()),
                normal_minimum: Some(0.0),
                normal_maximum: Some(1.0),
            },
        )
    }

    #[test]
    fn test_property_lookup() {
        let var = outcome("0.75");
        assert_eq!(var.property("identifier"), Some(json!("SCORE")));
        assert_eq!(var.property("value"), Some(json!("0.75")));
        assert_eq!(var.property("normal_maximum"), Some(json!(1.0)));
    }

    #[test]
    fn test_property_absent_for_unknown_or_foreign_name() {
        let var = outcome("0.75");
        assert_eq!(var.property("no_such_property"), None);
        // Response-only property on an outcome variable
        assert_eq!(var.property("candidate_response"), None);
    }

    #[test]
    fn test_ensure_epoch_stamps_once() {
        let mut var = outcome("1.0");
        assert!(var.epoch.is_none());
        var.ensure_epoch();
        let stamped = var.epoch.unwrap();
        assert!(stamped > 0.0);
        assert!(stamped <= now_epoch());

        var.ensure_epoch();
        assert_eq!(var.epoch, Some(stamped));
    }
}
