//! Opaque (de)serialization of stored variable values
//!
//! The `value` column is a blob written and read by this component only.
//! The concrete encoding (JSON with an internal `type` tag) stays behind
//! this seam so it can be swapped without touching the access API.

use crate::Result;
use crate::variable::Variable;

/// Serialize a variable into its stored form
pub fn encode(variable: &Variable) -> Result<String> {
    Ok(serde_json::to_string(variable)?)
}

/// Deserialize a stored value back into a variable
pub fn decode(raw: &str) -> Result<Variable> {
    Ok(serde_json::from_str(raw)?)
}
