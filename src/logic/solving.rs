use std::fmt::{Debug, Display, Formatter};
use std::ops::Neg;

use thiserror::Error;
use varisat::ExtendFormula;

use super::types::Clause;


/// A propositional literal over a dense variable index (variables start at 1).
///
/// Encoded as `var << 1 | sign`, so negation is a single bit flip.
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Literal {
    id: i32,
}

impl Literal {
    pub const fn from_var(var: i32) -> Self {
        Self { id: var << 1 }
    }

    /// Converts a signed DIMACS literal (`3`, `-3`) into a [Literal].
    pub fn from_dimacs(lit: i32) -> Self {
        let lit_pos = Literal::from_var(lit.abs());
        if lit < 0 { -lit_pos } else { lit_pos }
    }

    pub const fn var(&self) -> i32 {
        self.id >> 1
    }
    pub const fn is_pos(&self) -> bool {
        self.id & 1 == 0
    }
    pub const fn to_dimacs(&self) -> i32 {
        if self.is_pos() { self.var() } else { -self.var() }
    }

    fn to_varisat(self) -> varisat::Lit {
        varisat::Lit::from_dimacs(self.to_dimacs() as isize)
    }

    fn from_varisat(lit: varisat::Lit) -> Self {
        Literal::from_dimacs(lit.to_dimacs() as i32)
    }
}
impl Neg for Literal {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Literal { id: self.id ^ 1 }
    }
}
impl Debug for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Literal: {}", self.to_dimacs())
    }
}
impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", if self.is_pos() { "" } else { "-" }, self.var())
    }
}


/// Total assignment returned by a satisfiable oracle call, indexed by variable.
/// Variables the oracle never saw read as false.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    values: Vec<bool>,
}

impl Model {
    pub fn from_values(values: Vec<bool>) -> Self {
        Self { values }
    }

    /// Builds a model from the literals that are true in it.
    pub fn from_literals<I>(lits: I) -> Self
    where I: IntoIterator<Item = Literal>
    {
        let mut values = Vec::new();
        for lit in lits {
            let var = lit.var() as usize;
            if values.len() <= var {
                values.resize(var + 1, false);
            }
            values[var] = lit.is_pos();
        }
        Self { values }
    }

    pub fn value(&self, lit: Literal) -> bool {
        let assigned = self.values.get(lit.var() as usize).copied().unwrap_or(false);
        assigned == lit.is_pos()
    }

    pub fn satisfies(&self, clause: &Clause) -> bool {
        clause.into_iter().any(|lit| self.value(lit))
    }

    pub fn num_vars(&self) -> usize {
        self.values.len().saturating_sub(1)
    }
}


#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleFault {
    #[error("SAT oracle failed internally: {0}")]
    Internal(String),

    #[error("SAT oracle reported core literal {0} that was never assumed")]
    InvalidCore(Literal),

    #[error("SAT oracle answers contradict each other: {0}")]
    Inconsistent(String),
}

/// Answer of a single oracle invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleOutcome {
    Sat(Model),
    /// Subset of the assumptions that is jointly unsatisfiable with the clauses.
    /// Empty if the clauses alone are unsatisfiable.
    Unsat(Vec<Literal>),
}

impl OracleOutcome {
    pub fn is_sat(&self) -> bool {
        matches!(self, OracleOutcome::Sat(_))
    }
}

/// Incremental SAT engine with assumption-based solving and unsat cores.
///
/// Instances are not shared across threads: every query obtains its own
/// oracles through an [OracleFactory].
pub trait SatOracle {
    fn add_clause(&mut self, clause: &[Literal]);

    fn solve_assuming(&mut self, assumptions: &[Literal]) -> Result<OracleOutcome, OracleFault>;
}

pub trait OracleFactory: Send + Sync {
    fn spawn(&self) -> Box<dyn SatOracle>;
}

impl<F> OracleFactory for F
where F: Fn() -> Box<dyn SatOracle> + Send + Sync
{
    fn spawn(&self) -> Box<dyn SatOracle> {
        self()
    }
}

/// Hands out fresh [Solver] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct VarisatFactory;

impl OracleFactory for VarisatFactory {
    fn spawn(&self) -> Box<dyn SatOracle> {
        Box::new(Solver::new())
    }
}


/// Thin wrapper around the varisat CDCL solver to offer the [SatOracle] interface.
pub struct Solver {
    inner: varisat::Solver<'static>,
    /// Variables mentioned by at least one added clause
    seen: Vec<bool>,
}

impl Solver {
    pub fn new() -> Self {
        Self {
            inner: varisat::Solver::new(),
            seen: Vec::new(),
        }
    }

    pub fn add_clause<L>(&mut self, clause: L)
    where L: AsRef<[Literal]>
    {
        let lits: Vec<varisat::Lit> = clause.as_ref().iter()
            .map(|&lit| {
                self.mark_seen(lit.var());
                lit.to_varisat()
            })
            .collect();
        self.inner.add_clause(&lits);
    }

    pub fn solve(&mut self) -> Result<bool, OracleFault> {
        let no_assumptions: [Literal; 0] = [];
        Ok(self.solve_assuming(no_assumptions)?.is_sat())
    }

    pub fn solve_assuming<L>(&mut self, assumptions: L) -> Result<OracleOutcome, OracleFault>
    where L: AsRef<[Literal]> {
        // Assumptions over variables no clause mentions are trivially satisfiable and
        // can never take part in a core, so they are kept out of the engine.
        let (known, free): (Vec<Literal>, Vec<Literal>) = assumptions.as_ref().iter()
            .copied()
            .partition(|lit| self.is_seen(lit.var()));
        if let Some(&lit) = free.iter().find(|&&lit| free.contains(&-lit)) {
            return Ok(OracleOutcome::Unsat(vec![lit, -lit]));
        }

        let lits: Vec<varisat::Lit> = known.iter().map(|&lit| lit.to_varisat()).collect();
        self.inner.assume(&lits);

        let is_sat = self.inner.solve()
            .map_err(|e| OracleFault::Internal(e.to_string()))?;

        if is_sat {
            let model = self.inner.model()
                .ok_or_else(|| OracleFault::Internal("satisfiable call produced no model".into()))?;
            let lits = model.into_iter().map(Literal::from_varisat).chain(free);
            Ok(OracleOutcome::Sat(Model::from_literals(lits)))
        } else {
            let core = self.inner.failed_core()
                .map(|core| core.iter().copied().map(Literal::from_varisat).collect())
                .unwrap_or_default();
            Ok(OracleOutcome::Unsat(core))
        }
    }

    fn mark_seen(&mut self, var: i32) {
        let var = var as usize;
        if self.seen.len() <= var {
            self.seen.resize(var + 1, false);
        }
        self.seen[var] = true;
    }

    fn is_seen(&self, var: i32) -> bool {
        self.seen.get(var as usize).copied().unwrap_or(false)
    }
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl SatOracle for Solver {
    fn add_clause(&mut self, clause: &[Literal]) {
        Solver::add_clause(self, clause);
    }

    fn solve_assuming(&mut self, assumptions: &[Literal]) -> Result<OracleOutcome, OracleFault> {
        Solver::solve_assuming(self, assumptions)
    }
}
