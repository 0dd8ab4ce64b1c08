use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::KnowledgeBaseError;


/// Knowledge-base document as produced by the extraction stage.
///
/// Unknown fields on entries are kept in `meta` and never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseDocument {
    #[serde(default, alias = "primitive_props")]
    pub propositions: Vec<PropositionEntry>,
    #[serde(default)]
    pub hard_constraints: Vec<ConstraintEntry>,
    #[serde(default)]
    pub soft_constraints: Vec<ConstraintEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropositionEntry {
    pub id: String,
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintEntry {
    pub id: String,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<Value>,
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}

impl ConstraintEntry {
    pub fn formula(&self) -> Result<&str, KnowledgeBaseError> {
        self.formula.as_deref()
            .ok_or_else(|| self.malformed("missing formula"))
    }

    /// The scalar confidence of a soft constraint.
    ///
    /// Only a finite number is accepted. Probability pairs have to be reduced
    /// to one value before they reach the core.
    pub fn confidence(&self) -> Result<f64, KnowledgeBaseError> {
        match &self.weight {
            None | Some(Value::Null) => Err(self.malformed("weight is missing or not a number")),
            Some(Value::Number(n)) => n.as_f64()
                .filter(|w| w.is_finite())
                .ok_or_else(|| self.malformed(format!("weight {n} is not a finite number"))),
            Some(Value::Array(items)) => Err(self.malformed(
                format!("expected a scalar weight, got an array of {} values", items.len())
            )),
            Some(Value::String(s)) => Err(self.malformed(format!("expected a scalar weight, got string \"{s}\""))),
            Some(other) => Err(self.malformed(format!("expected a scalar weight, got {other}"))),
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> KnowledgeBaseError {
        KnowledgeBaseError::MalformedConstraint { id: self.id.clone(), reason: reason.into() }
    }
}

impl KnowledgeBaseDocument {
    pub fn from_json_str(text: &str) -> Result<Self, KnowledgeBaseError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, KnowledgeBaseError> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, KnowledgeBaseError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }
}
