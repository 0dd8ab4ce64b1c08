//! Core-guided weighted MaxSAT in the OLL / RC2 style.
//!
//! Every soft clause is guarded by a selector literal that is assumed true.
//! Whenever the oracle reports a core over the assumptions, its minimum weight
//! is added to the lower bound, the weights of the core literals are reduced
//! by it, and the core is relaxed by a totalizer whose "at most one false"
//! bound is assumed in turn. Bound literals showing up in later cores raise
//! the bound of their totalizer by one. The first satisfiable call is optimal.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, trace};

use crate::logic::{Clause, Literal, Model, OracleFault, OracleOutcome, SatOracle, Totalizer, VarPool};


#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MaxSatError {
    #[error(transparent)]
    Oracle(#[from] OracleFault),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaxSatOutcome {
    Optimal { cost: u64, model: Model },
    /// The budget ran out. No assignment is known to be cheaper than `lower_bound`.
    BudgetExhausted { lower_bound: u64 },
    /// The hard clauses alone are unsatisfiable.
    HardUnsat,
}

/// Limits on the optimization loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Budget {
    pub max_iterations: Option<usize>,
    pub deadline: Option<Instant>,
}

impl Budget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = Some(iterations);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn exhausted(&self, iterations: usize) -> bool {
        self.max_iterations.is_some_and(|max| iterations >= max)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaxSatStats {
    pub iterations: usize,
    pub oracle_calls: usize,
    pub cores: usize,
    pub totalizers: usize,
}

/// Bound literal `at_most(bound)` of totalizer `totalizer`
#[derive(Debug, Clone, Copy)]
struct BoundLit {
    totalizer: usize,
    bound: usize,
    weight: u64,
}

/// Cores longer than this are relaxed as reported.
const MAX_MINIMIZED_CORE: usize = 64;


pub struct CoreGuided<'p, P: VarPool + ?Sized> {
    oracle: Box<dyn SatOracle>,
    pool: &'p mut P,
    budget: Budget,
    minimize_cores: bool,

    /// Original soft clauses, for the cost of the final model
    soft: Vec<(Clause, u64)>,
    /// Weight of soft clauses that are empty and always falsified
    base_cost: u64,

    /// Current assumptions with their remaining weight
    assumptions: BTreeMap<Literal, u64>,
    totalizers: Vec<Totalizer>,
    bounds: HashMap<Literal, BoundLit>,
    cost: u64,
    stats: MaxSatStats,
}

impl<'p, P: VarPool + ?Sized> CoreGuided<'p, P> {
    /// `pool` provides selector and totalizer variables, which must be fresh
    /// with respect to every clause given to `oracle`.
    pub fn new(oracle: Box<dyn SatOracle>, pool: &'p mut P) -> Self {
        Self {
            oracle,
            pool,
            budget: Budget::unlimited(),
            minimize_cores: true,
            soft: Vec::new(),
            base_cost: 0,
            assumptions: BTreeMap::new(),
            totalizers: Vec::new(),
            bounds: HashMap::new(),
            cost: 0,
            stats: MaxSatStats::default(),
        }
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_core_minimization(mut self, enabled: bool) -> Self {
        self.minimize_cores = enabled;
        self
    }

    pub fn add_hard(&mut self, clause: &[Literal]) {
        self.oracle.add_clause(clause);
    }

    pub fn add_soft(&mut self, clause: Clause, weight: u64) {
        if weight == 0 {
            return;
        }

        match clause.lits() {
            [] => self.base_cost += weight,
            // Unit soft clauses are assumed directly
            [lit] => *self.assumptions.entry(*lit).or_insert(0) += weight,
            lits => {
                let selector = self.pool.fresh();
                let guarded: Vec<Literal> = lits.iter().copied().chain([-selector]).collect();
                self.oracle.add_clause(&guarded);
                self.assumptions.insert(selector, weight);
            }
        }
        self.soft.push((clause, weight));
    }

    pub fn stats(&self) -> MaxSatStats {
        self.stats
    }

    pub fn solve(&mut self) -> Result<MaxSatOutcome, MaxSatError> {
        self.cost = self.base_cost;

        loop {
            if self.budget.exhausted(self.stats.iterations) {
                debug!(lower_bound = self.cost, iterations = self.stats.iterations, "MaxSAT budget exhausted");
                return Ok(MaxSatOutcome::BudgetExhausted { lower_bound: self.cost });
            }
            self.stats.iterations += 1;

            let assumptions: Vec<Literal> = self.assumptions.keys().copied().collect();
            let core = match self.call_oracle(&assumptions)? {
                OracleOutcome::Sat(model) => {
                    let cost = self.model_cost(&model);
                    if cost != self.cost {
                        debug!(model_cost = cost, lower_bound = self.cost, "Model cost differs from lower bound");
                    }
                    return Ok(MaxSatOutcome::Optimal { cost, model });
                }
                OracleOutcome::Unsat(core) => core,
            };

            if core.is_empty() {
                return Ok(MaxSatOutcome::HardUnsat);
            }
            let core = if self.minimize_cores { self.minimize(core)? } else { core };
            if core.is_empty() {
                return Ok(MaxSatOutcome::HardUnsat);
            }

            self.process_core(&core);
        }
    }

    fn process_core(&mut self, core: &[Literal]) {
        self.stats.cores += 1;

        let min_weight = core.iter()
            .filter_map(|lit| self.assumptions.get(lit))
            .copied()
            .min()
            .unwrap_or(0);
        self.cost += min_weight;

        trace!(
            iteration = self.stats.iterations,
            core = core.len(),
            min_weight,
            cost = self.cost,
            "Relaxing core"
        );

        for lit in core {
            if let Some(weight) = self.assumptions.get_mut(lit) {
                *weight -= min_weight;
                if *weight == 0 {
                    self.assumptions.remove(lit);
                }
            }
        }

        for lit in core {
            if let Some(&bound) = self.bounds.get(lit) {
                self.raise_bound(bound);
            }
        }

        if let [lit] = core {
            self.oracle.add_clause(&[-*lit]);
        } else {
            let inputs: Vec<Literal> = core.iter().map(|&lit| -lit).collect();
            let mut totalizer = Totalizer::new(&inputs);
            for clause in totalizer.extend(2, self.pool) {
                self.oracle.add_clause(clause.lits());
            }
            let idx = self.totalizers.len();
            if let Some(bound_lit) = totalizer.at_most(1) {
                self.assume_bound(bound_lit, BoundLit { totalizer: idx, bound: 1, weight: min_weight });
            }
            self.totalizers.push(totalizer);
            self.stats.totalizers += 1;
        }
    }

    /// Replaces the bound `at_most(k)` that was part of a core by `at_most(k + 1)`.
    fn raise_bound(&mut self, bound: BoundLit) {
        let next = bound.bound + 1;
        let totalizer = &mut self.totalizers[bound.totalizer];
        if next >= totalizer.size() {
            return;
        }

        for clause in totalizer.extend(next + 1, self.pool) {
            self.oracle.add_clause(clause.lits());
        }
        if let Some(bound_lit) = self.totalizers[bound.totalizer].at_most(next) {
            self.assume_bound(bound_lit, BoundLit { bound: next, ..bound });
        }
    }

    fn assume_bound(&mut self, lit: Literal, bound: BoundLit) {
        if self.bounds.contains_key(&lit) {
            return;
        }
        self.bounds.insert(lit, bound);
        *self.assumptions.entry(lit).or_insert(0) += bound.weight;
    }

    /// Deletion-based core minimization. Stops early, keeping what it has,
    /// when the budget runs out.
    fn minimize(&mut self, core: Vec<Literal>) -> Result<Vec<Literal>, MaxSatError> {
        if core.len() <= 1 || core.len() > MAX_MINIMIZED_CORE {
            return Ok(core);
        }

        let mut kept = core.clone();
        for lit in core {
            if self.budget.exhausted(self.stats.iterations) {
                break;
            }
            if !kept.contains(&lit) {
                continue;
            }

            let candidate: Vec<Literal> = kept.iter().copied().filter(|&l| l != lit).collect();
            if let OracleOutcome::Unsat(sub) = self.call_oracle(&candidate)? {
                let sub: HashSet<Literal> = sub.into_iter().collect();
                kept = candidate.into_iter().filter(|l| sub.contains(l)).collect();
                if kept.is_empty() {
                    break;
                }
            }
        }
        Ok(kept)
    }

    /// Invokes the oracle and checks that any core is a subset of `assumptions`.
    fn call_oracle(&mut self, assumptions: &[Literal]) -> Result<OracleOutcome, MaxSatError> {
        self.stats.oracle_calls += 1;
        let outcome = self.oracle.solve_assuming(assumptions)?;
        if let OracleOutcome::Unsat(core) = &outcome {
            if let Some(&stray) = core.iter().find(|lit| !assumptions.contains(lit)) {
                return Err(OracleFault::InvalidCore(stray).into());
            }
        }
        Ok(outcome)
    }

    fn model_cost(&self, model: &Model) -> u64 {
        self.base_cost + self.soft.iter()
            .filter(|(clause, _)| !clause.is_empty() && !model.satisfies(clause))
            .map(|(_, weight)| weight)
            .sum::<u64>()
    }
}
