use std::collections::HashMap;

use thiserror::Error;

use crate::logic::{Literal, VarPool};


#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown proposition '{0}'")]
pub struct UnknownProposition(pub String);

/// Maps proposition ids to dense variable indices starting at 1.
///
/// Propositions and the auxiliary variables of compiled constraints share one
/// index space. Nothing is ever removed, so an index stays valid for the whole
/// lifetime of the knowledge base.
#[derive(Debug, Clone, Default)]
pub struct PropositionRegistry {
    ids: HashMap<String, i32>,
    /// `names[var - 1]` is the proposition behind `var`, `None` for auxiliaries
    names: Vec<Option<String>>,
}

impl PropositionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of `id`, assigning the next free one on first sight.
    pub fn register(&mut self, id: &str) -> i32 {
        if let Some(&var) = self.ids.get(id) {
            return var;
        }
        self.names.push(Some(id.to_string()));
        let var = self.names.len() as i32;
        self.ids.insert(id.to_string(), var);
        var
    }

    pub fn lookup(&self, id: &str) -> Result<i32, UnknownProposition> {
        self.ids.get(id)
            .copied()
            .ok_or_else(|| UnknownProposition(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    pub fn fresh_auxiliary(&mut self) -> i32 {
        self.names.push(None);
        self.names.len() as i32
    }

    /// Highest variable index in use.
    pub fn num_vars(&self) -> i32 {
        self.names.len() as i32
    }

    pub fn num_propositions(&self) -> usize {
        self.ids.len()
    }

    pub fn name_of(&self, var: i32) -> Option<&str> {
        let idx = usize::try_from(var).ok()?.checked_sub(1)?;
        self.names.get(idx)?.as_deref()
    }

    /// Registered propositions with their indices, in registration order.
    pub fn propositions(&self) -> impl Iterator<Item = (&str, i32)> {
        self.names.iter()
            .enumerate()
            .filter_map(|(i, name)| name.as_deref().map(|n| (n, i as i32 + 1)))
    }
}

impl VarPool for PropositionRegistry {
    fn resolve(&self, name: &str) -> Option<Literal> {
        self.ids.get(name).map(|&var| Literal::from_var(var))
    }

    fn fresh(&mut self) -> Literal {
        Literal::from_var(self.fresh_auxiliary())
    }
}
