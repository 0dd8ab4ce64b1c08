use std::collections::HashSet;

use crate::kb::PropositionRegistry;
use crate::logic::{Clause, Literal, Model, WeightedClause, WeightedClauseSet};

pub fn vars_in_clauses<'a, I>(clauses: I) -> HashSet<i32>
where I: IntoIterator<Item = &'a Clause>
{
    let mut vars = HashSet::new();
    for clause in clauses {
        for lit in clause {
            vars.insert(lit.var());
        }
    }
    vars
}

/// Weighted clauses falsified by `model`.
pub fn violated_clauses<'a>(model: &Model, clauses: &'a WeightedClauseSet) -> Vec<&'a WeightedClause> {
    clauses.iter()
        .filter(|wc| !model.satisfies(&wc.clause))
        .collect()
}

/// Renders the proposition part of a model, e.g. `P_1=true, P_2=false`.
pub fn describe_model(model: &Model, registry: &PropositionRegistry) -> String {
    registry.propositions()
        .map(|(name, var)| format!("{}={}", name, model.value(Literal::from_var(var))))
        .collect::<Vec<_>>()
        .join(", ")
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::Weight;

    #[test]
    fn model_inspection() {
        let mut registry = PropositionRegistry::new();
        let a = Literal::from_var(registry.register("a"));
        let b = Literal::from_var(registry.register("b"));

        let mut clauses = WeightedClauseSet::new();
        clauses.push(Clause::from([a, b]), Weight::Hard, 0);
        clauses.push(Clause::from([-a]), Weight::Soft(3), 1);
        clauses.push(Clause::from([b]), Weight::Soft(5), 2);

        let model = Model::from_literals([a, -b]);
        let violated: Vec<usize> = violated_clauses(&model, &clauses).iter().map(|wc| wc.origin).collect();
        assert_eq!(violated, vec![1, 2]);
        assert_eq!(describe_model(&model, &registry), "a=true, b=false");
        assert_eq!(vars_in_clauses(clauses.iter().map(|wc| &wc.clause)), HashSet::from([1, 2]));
    }
}
