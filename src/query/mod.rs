mod engine;
pub mod maxsat;

pub(crate) mod debug;

use thiserror::Error;

use crate::logic::{OracleFault, ParseError};

pub use engine::*;


#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Failed to parse query: {0}")]
    Parse(#[from] ParseError),

    #[error("Query references unknown proposition '{id}' at position {position}")]
    UnknownProposition { id: String, position: usize },

    #[error("The hard constraints of the knowledge base contradict each other")]
    InconsistentKnowledgeBase,

    #[error("SAT oracle failed during the hard-constraint check: {0}")]
    Oracle(#[from] OracleFault),
}
