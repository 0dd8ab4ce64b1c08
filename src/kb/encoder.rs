use std::collections::HashSet;
use std::fmt::{Debug, Formatter};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::document::{ConstraintEntry, KnowledgeBaseDocument};
use super::registry::PropositionRegistry;
use super::{Constraint, ConstraintKind, KnowledgeBase, KnowledgeBaseError};
use crate::config::ConfigError;
use crate::logic::{self, parse_formula, CompileError, Weight, WeightedClauseSet};


/// Maps a confidence in (0, 1) onto a clause weight scale.
#[derive(Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightTransform {
    /// `ln(w / (1 - w))`
    #[default]
    LogOdds,
    /// `w / (1 - w)`
    LinearOdds,
    #[serde(skip)]
    Custom(fn(f64) -> f64),
}

impl WeightTransform {
    pub fn apply(&self, confidence: f64) -> f64 {
        match self {
            WeightTransform::LogOdds => (confidence / (1.0 - confidence)).ln(),
            WeightTransform::LinearOdds => confidence / (1.0 - confidence),
            WeightTransform::Custom(f) => f(confidence),
        }
    }
}

impl Debug for WeightTransform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WeightTransform::LogOdds => write!(f, "LogOdds"),
            WeightTransform::LinearOdds => write!(f, "LinearOdds"),
            WeightTransform::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Which clauses of a compiled soft constraint carry its weight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftGranularity {
    /// Every definitional clause and the root unit are soft.
    #[default]
    StructuralClauses,
    /// Definitions are hard, only the root unit is soft.
    RootLiteral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub transform: WeightTransform,
    pub multiplier: f64,
    pub hard_cap: u64,
    pub floor: u64,
    pub soft_granularity: SoftGranularity,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            transform: WeightTransform::LogOdds,
            multiplier: 1000.0,
            hard_cap: 1_000_000,
            floor: 1,
            soft_granularity: SoftGranularity::StructuralClauses,
        }
    }
}

impl EncoderConfig {
    pub fn with_transform(mut self, transform: WeightTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.multiplier.is_finite() && self.multiplier > 0.0) {
            return Err(ConfigError::invalid("encoder.multiplier", "must be a positive number"));
        }
        if self.floor == 0 {
            return Err(ConfigError::invalid("encoder.floor", "must be at least 1"));
        }
        if self.hard_cap < self.floor {
            return Err(ConfigError::invalid("encoder.hard_cap", "must not be below encoder.floor"));
        }
        Ok(())
    }

    /// Integer clause weight for a soft constraint of the given confidence,
    /// always within `[floor, hard_cap]` and never zero.
    pub fn soft_weight(&self, confidence: f64) -> u64 {
        let floor = self.floor.max(1);
        let cap = self.hard_cap.max(floor);
        if confidence >= 1.0 {
            return cap;
        }
        if confidence <= 0.0 || confidence.is_nan() {
            return floor;
        }

        let scaled = (self.transform.apply(confidence) * self.multiplier).round();
        if scaled.is_nan() {
            floor
        } else {
            // Negative log-odds (confidence below one half) end up at the floor
            scaled.clamp(floor as f64, cap as f64) as u64
        }
    }
}


/// Compiles knowledge-base documents into [KnowledgeBase] snapshots.
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    config: EncoderConfig,
}

impl Encoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn encode(&self, doc: &KnowledgeBaseDocument) -> Result<KnowledgeBase, KnowledgeBaseError> {
        self.config.validate()?;

        let mut registry = PropositionRegistry::new();
        for prop in &doc.propositions {
            if registry.contains(&prop.id) {
                return Err(KnowledgeBaseError::DuplicateId(prop.id.clone()));
            }
            registry.register(&prop.id);
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut constraints = Vec::with_capacity(doc.hard_constraints.len() + doc.soft_constraints.len());
        let mut clauses = WeightedClauseSet::new();

        let entries = doc.hard_constraints.iter().map(|e| (e, true))
            .chain(doc.soft_constraints.iter().map(|e| (e, false)));

        for (entry, is_hard) in entries {
            if !seen.insert(entry.id.as_str()) {
                return Err(KnowledgeBaseError::DuplicateId(entry.id.clone()));
            }

            let kind = if is_hard {
                ConstraintKind::Hard
            } else {
                let confidence = entry.confidence()?;
                ConstraintKind::Soft { confidence, weight: self.config.soft_weight(confidence) }
            };
            let constraint = self.compile_constraint(entry, kind, &mut registry)?;

            let origin = constraints.len();
            match (constraint.kind, self.config.soft_granularity) {
                (ConstraintKind::Hard, _) => {
                    clauses.extend_from_cnf(&constraint.compiled.asserted(), Weight::Hard, origin);
                }
                (ConstraintKind::Soft { weight, .. }, SoftGranularity::StructuralClauses) => {
                    clauses.extend_from_cnf(&constraint.compiled.asserted(), Weight::Soft(weight), origin);
                }
                (ConstraintKind::Soft { weight, .. }, SoftGranularity::RootLiteral) => {
                    clauses.extend_from_cnf(&constraint.compiled.clauses, Weight::Hard, origin);
                    clauses.push(constraint.compiled.out_lit.into(), Weight::Soft(weight), origin);
                }
            }
            constraints.push(constraint);
        }

        debug!(
            propositions = registry.num_propositions(),
            constraints = constraints.len(),
            clauses = clauses.len(),
            vars = registry.num_vars(),
            "Compiled knowledge base"
        );

        Ok(KnowledgeBase::new(registry, doc.propositions.clone(), constraints, clauses))
    }

    fn compile_constraint(
        &self,
        entry: &ConstraintEntry,
        kind: ConstraintKind,
        registry: &mut PropositionRegistry,
    ) -> Result<Constraint, KnowledgeBaseError> {
        let text = entry.formula()?;
        let formula = parse_formula(text).map_err(|source| KnowledgeBaseError::Parse {
            constraint: entry.id.clone(),
            source,
        })?;

        let compiled = logic::compile(&formula, registry).map_err(|e| match e {
            CompileError::UnknownProposition { id, position } => KnowledgeBaseError::UnknownProposition {
                constraint: entry.id.clone(),
                id,
                position,
            },
        })?;

        Ok(Constraint { id: entry.id.clone(), formula, kind, compiled, meta: entry.meta.clone() })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn document(text: &str) -> KnowledgeBaseDocument {
        KnowledgeBaseDocument::from_json_str(text).unwrap()
    }

    #[test]
    fn weights_stay_positive_under_any_settings() {
        let inverted = EncoderConfig { floor: 10, hard_cap: 5, ..Default::default() };
        assert_eq!(inverted.soft_weight(0.9), 10);
        assert_eq!(inverted.soft_weight(1.0), 10);

        let zero_floor = EncoderConfig { floor: 0, ..Default::default() };
        assert_eq!(zero_floor.soft_weight(0.3), 1);
        assert_eq!(zero_floor.soft_weight(f64::NAN), 1);
    }

    #[test]
    fn weight_scale() {
        let config = EncoderConfig::default();
        assert_eq!(config.soft_weight(1.0), 1_000_000);
        assert_eq!(config.soft_weight(1.7), 1_000_000);
        assert_eq!(config.soft_weight(0.0), 1);
        assert_eq!(config.soft_weight(-0.3), 1);
        assert_eq!(config.soft_weight(0.5), 1);
        assert_eq!(config.soft_weight(0.2), 1);
        // ln(9) * 1000
        assert_eq!(config.soft_weight(0.9), 2197);
        assert!(config.soft_weight(0.99) > config.soft_weight(0.9));
        assert!(config.soft_weight(0.999_999_999) <= 1_000_000);
    }

    #[test]
    fn alternative_transforms() {
        let linear = EncoderConfig::default().with_transform(WeightTransform::LinearOdds);
        assert_eq!(linear.soft_weight(0.9), 9000);
        assert_eq!(linear.soft_weight(0.5), 1000);

        let custom = EncoderConfig::default().with_transform(WeightTransform::Custom(|w| w));
        assert_eq!(custom.soft_weight(0.25), 250);
    }

    #[test]
    fn encode_granularity() {
        let doc = document(r#"{
            "propositions": [{"id": "a"}, {"id": "b"}],
            "hard_constraints": [{"id": "H_1", "formula": "a ∨ b"}],
            "soft_constraints": [{"id": "S_1", "formula": "a ∧ b", "weight": 0.9}]
        }"#);

        let structural = Encoder::default().encode(&doc).unwrap();
        // (a ∨ b): 3 definitions + root, (a ∧ b): 3 definitions + root
        assert_eq!(structural.clauses().hard().count(), 4);
        assert_eq!(structural.clauses().soft().count(), 4);
        assert!(structural.clauses().soft().all(|(_, w)| w == 2197));

        let config = EncoderConfig { soft_granularity: SoftGranularity::RootLiteral, ..Default::default() };
        let rooted = Encoder::new(config).encode(&doc).unwrap();
        assert_eq!(rooted.clauses().hard().count(), 7);
        let soft: Vec<_> = rooted.clauses().soft().collect();
        assert_eq!(soft.len(), 1);
        assert_eq!(soft[0].0.len(), 1);
        assert_eq!(soft[0].0.lits()[0], rooted.constraint("S_1").unwrap().compiled.out_lit);
    }

    #[test]
    fn compilation_errors() {
        let unknown = document(r#"{
            "propositions": [{"id": "a"}],
            "hard_constraints": [{"id": "H_1", "formula": "a ⇒ ghost"}]
        }"#);
        match Encoder::default().encode(&unknown) {
            Err(KnowledgeBaseError::UnknownProposition { constraint, id, position }) => {
                assert_eq!((constraint.as_str(), id.as_str(), position), ("H_1", "ghost", 4));
            }
            other => panic!("expected unknown proposition, got {other:?}"),
        }

        let broken = document(r#"{
            "propositions": [{"id": "a"}],
            "soft_constraints": [{"id": "S_1", "formula": "(a ∧", "weight": 0.7}]
        }"#);
        assert!(matches!(
            Encoder::default().encode(&broken),
            Err(KnowledgeBaseError::Parse { constraint, .. }) if constraint == "S_1"
        ));

        let pair = document(r#"{
            "propositions": [{"id": "a"}],
            "soft_constraints": [{"id": "S_1", "formula": "a", "weight": [0.8, 0.1]}]
        }"#);
        assert!(matches!(
            Encoder::default().encode(&pair),
            Err(KnowledgeBaseError::MalformedConstraint { id, .. }) if id == "S_1"
        ));
    }

    #[test]
    fn duplicate_ids() {
        let props = document(r#"{"propositions": [{"id": "a"}, {"id": "a"}]}"#);
        assert!(matches!(Encoder::default().encode(&props), Err(KnowledgeBaseError::DuplicateId(id)) if id == "a"));

        let constraints = document(r#"{
            "propositions": [{"id": "a"}],
            "hard_constraints": [{"id": "C", "formula": "a"}],
            "soft_constraints": [{"id": "C", "formula": "¬a", "weight": 0.6}]
        }"#);
        assert!(matches!(Encoder::default().encode(&constraints), Err(KnowledgeBaseError::DuplicateId(id)) if id == "C"));
    }

    #[test]
    fn serde_names() {
        let config: EncoderConfig = serde_json::from_str(r#"{"transform": "linear_odds", "soft_granularity": "root_literal"}"#).unwrap();
        assert!(matches!(config.transform, WeightTransform::LinearOdds));
        assert_eq!(config.soft_granularity, SoftGranularity::RootLiteral);
        assert_eq!(config.multiplier, 1000.0);
    }
}
