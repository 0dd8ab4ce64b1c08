//! Symbolic reasoning core: compiles weighted propositional knowledge bases
//! and answers entailment, consistency and confidence queries against them
//! with core-guided MaxSAT.

pub mod config;
pub mod kb;
pub mod logic;
pub mod query;

pub use config::{ConfigError, ReasonerConfig};
pub use kb::{KnowledgeBase, KnowledgeBaseDocument, KnowledgeBaseError};
pub use query::{
    ConfidenceReport, Explanation, Query, QueryAnswer, QueryConfig, QueryEngine, QueryError, QueryKind,
    SolverResult, Verdict,
};
