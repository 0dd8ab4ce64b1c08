mod document;
mod encoder;
mod registry;

use std::path::Path;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::ConfigError;
use crate::logic::{Formula, ParseError, WeightedClauseSet, XCNF};
use crate::query::debug;

pub use document::{ConstraintEntry, KnowledgeBaseDocument, PropositionEntry};
pub use encoder::{Encoder, EncoderConfig, SoftGranularity, WeightTransform};
pub use registry::{PropositionRegistry, UnknownProposition};


#[derive(Error, Debug)]
pub enum KnowledgeBaseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid knowledge-base document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse constraint '{constraint}': {source}")]
    Parse {
        constraint: String,
        #[source]
        source: ParseError,
    },

    #[error("Constraint '{constraint}' references unknown proposition '{id}' at position {position}")]
    UnknownProposition { constraint: String, id: String, position: usize },

    #[error("Malformed constraint '{id}': {reason}")]
    MalformedConstraint { id: String, reason: String },

    #[error("Duplicate id '{0}'")]
    DuplicateId(String),

    #[error("Invalid encoder configuration: {0}")]
    Config(#[from] ConfigError),
}


#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstraintKind {
    Hard,
    Soft { confidence: f64, weight: u64 },
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub id: String,
    pub formula: Formula,
    pub kind: ConstraintKind,
    /// Definitional clauses and root literal, before weighting
    pub compiled: XCNF,
    pub meta: Map<String, Value>,
}

impl Constraint {
    pub fn is_hard(&self) -> bool {
        self.kind == ConstraintKind::Hard
    }
}

/// Frozen snapshot of a compiled knowledge base.
///
/// Never mutated after construction. Queries layer their own variables and
/// clauses on top of it, so one instance can be shared between threads.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    registry: PropositionRegistry,
    propositions: Vec<PropositionEntry>,
    constraints: Vec<Constraint>,
    clauses: WeightedClauseSet,
}

impl KnowledgeBase {
    fn new(
        registry: PropositionRegistry,
        propositions: Vec<PropositionEntry>,
        constraints: Vec<Constraint>,
        clauses: WeightedClauseSet,
    ) -> Self {
        debug_assert!(
            debug::vars_in_clauses(clauses.iter().map(|wc| &wc.clause))
                .iter()
                .all(|&var| var >= 1 && var <= registry.num_vars()),
            "compiled clause references a variable unknown to the registry"
        );
        Self { registry, propositions, constraints, clauses }
    }

    pub fn builder() -> KnowledgeBaseBuilder {
        KnowledgeBaseBuilder::new()
    }

    pub fn from_document(doc: &KnowledgeBaseDocument, config: &EncoderConfig) -> Result<Self, KnowledgeBaseError> {
        Encoder::new(config.clone()).encode(doc)
    }

    pub fn from_json_str(text: &str, config: &EncoderConfig) -> Result<Self, KnowledgeBaseError> {
        Self::from_document(&KnowledgeBaseDocument::from_json_str(text)?, config)
    }

    pub fn load<P: AsRef<Path>>(path: P, config: &EncoderConfig) -> Result<Self, KnowledgeBaseError> {
        Self::from_document(&KnowledgeBaseDocument::load(path)?, config)
    }

    pub fn registry(&self) -> &PropositionRegistry {
        &self.registry
    }

    /// Proposition entries with their metadata, in document order.
    pub fn propositions(&self) -> &[PropositionEntry] {
        &self.propositions
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn constraint(&self, id: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.id == id)
    }

    pub fn clauses(&self) -> &WeightedClauseSet {
        &self.clauses
    }

    /// Highest variable index used by the snapshot. Query variables start above it.
    pub fn num_vars(&self) -> i32 {
        self.registry.num_vars()
    }
}


/// Assembles a knowledge base in code instead of from a JSON document.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBaseBuilder {
    doc: KnowledgeBaseDocument,
    config: EncoderConfig,
}

impl KnowledgeBaseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: EncoderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn proposition(mut self, id: &str) -> Self {
        self.doc.propositions.push(PropositionEntry { id: id.to_string(), meta: Map::new() });
        self
    }

    pub fn propositions<'a, I>(self, ids: I) -> Self
    where I: IntoIterator<Item = &'a str>
    {
        ids.into_iter().fold(self, |builder, id| builder.proposition(id))
    }

    pub fn hard(mut self, id: &str, formula: &str) -> Self {
        self.doc.hard_constraints.push(Self::entry(id, formula, None));
        self
    }

    pub fn soft(mut self, id: &str, formula: &str, confidence: f64) -> Self {
        self.doc.soft_constraints.push(Self::entry(id, formula, Some(Value::from(confidence))));
        self
    }

    fn entry(id: &str, formula: &str, weight: Option<Value>) -> ConstraintEntry {
        ConstraintEntry {
            id: id.to_string(),
            formula: Some(formula.to_string()),
            weight,
            meta: Map::new(),
        }
    }

    pub fn build(self) -> Result<KnowledgeBase, KnowledgeBaseError> {
        Encoder::new(self.config).encode(&self.doc)
    }
}
