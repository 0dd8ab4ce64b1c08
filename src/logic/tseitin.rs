//! Structure-preserving CNF compilation.
//!
//! Every compound subformula gets one fresh variable together with the clauses
//! defining it as equivalent to the subformula, so the output is linear in the
//! size of the input. Negation reuses the negated child literal.

use thiserror::Error;

use super::formula::Formula;
use super::solving::Literal;
use super::types::{Clause, CNF, XCNF};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Unknown proposition '{id}' at position {position}")]
    UnknownProposition { id: String, position: usize },
}

/// Source of variables for compilation: resolves proposition names and
/// hands out fresh auxiliary variables.
pub trait VarPool {
    fn resolve(&self, name: &str) -> Option<Literal>;

    fn fresh(&mut self) -> Literal;
}


pub struct Tseitin<'p, P: VarPool + ?Sized> {
    pool: &'p mut P,
    clauses: CNF,
}

impl<'p, P: VarPool + ?Sized> Tseitin<'p, P> {
    pub fn new(pool: &'p mut P) -> Self {
        Self { pool, clauses: CNF::default() }
    }

    /// Compiles `formula` into its defining clauses and output literal.
    ///
    /// All atoms are resolved before any auxiliary variable is allocated, so a
    /// failed compilation leaves the pool untouched.
    pub fn compile(mut self, formula: &Formula) -> Result<XCNF, CompileError> {
        for (name, position) in formula.occurrences() {
            if self.pool.resolve(name).is_none() {
                return Err(CompileError::UnknownProposition { id: name.to_string(), position });
            }
        }

        let out_lit = self.encode(formula)?;
        Ok(XCNF::new(self.clauses, out_lit))
    }

    fn encode(&mut self, formula: &Formula) -> Result<Literal, CompileError> {
        match formula {
            Formula::Atom { name, position } => self.pool.resolve(name)
                .ok_or_else(|| CompileError::UnknownProposition { id: name.clone(), position: *position }),
            Formula::Not(inner) => Ok(-self.encode(inner)?),
            Formula::And(children) => {
                let lits = children.iter().map(|c| self.encode(c)).collect::<Result<Vec<_>, _>>()?;
                Ok(self.tseitin_and(&lits))
            }
            Formula::Or(children) => {
                let lits = children.iter().map(|c| self.encode(c)).collect::<Result<Vec<_>, _>>()?;
                Ok(self.tseitin_or(&lits))
            }
            Formula::Implies(lhs, rhs) => {
                let l = self.encode(lhs)?;
                let r = self.encode(rhs)?;
                Ok(self.tseitin_implies(l, r))
            }
            Formula::Iff(lhs, rhs) => {
                let l = self.encode(lhs)?;
                let r = self.encode(rhs)?;
                Ok(self.tseitin_iff(l, r))
            }
        }
    }

    fn tseitin_and(&mut self, inputs: &[Literal]) -> Literal {
        if let [single] = inputs {
            return *single;
        }

        let t = self.pool.fresh();
        for &lit in inputs {
            self.clauses.push([-t, lit]);
        }
        self.clauses.push(Clause::new(inputs.iter().map(|&lit| -lit).chain([t])));
        t
    }

    fn tseitin_or(&mut self, inputs: &[Literal]) -> Literal {
        if let [single] = inputs {
            return *single;
        }

        let t = self.pool.fresh();
        for &lit in inputs {
            self.clauses.push([-lit, t]);
        }
        self.clauses.push(Clause::new(inputs.iter().copied().chain([-t])));
        t
    }

    fn tseitin_implies(&mut self, lhs: Literal, rhs: Literal) -> Literal {
        let t = self.pool.fresh();
        self.clauses.push([-t, -lhs, rhs]);
        self.clauses.push([lhs, t]);
        self.clauses.push([-rhs, t]);
        t
    }

    fn tseitin_iff(&mut self, lhs: Literal, rhs: Literal) -> Literal {
        let t = self.pool.fresh();
        self.clauses.push([-t, -lhs, rhs]);
        self.clauses.push([-t, lhs, -rhs]);
        self.clauses.push([t, lhs, rhs]);
        self.clauses.push([t, -lhs, -rhs]);
        t
    }
}

pub fn compile<P: VarPool + ?Sized>(formula: &Formula, pool: &mut P) -> Result<XCNF, CompileError> {
    Tseitin::new(pool).compile(formula)
}


#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;

    use super::*;
    use crate::logic::formula::parse_formula;
    use crate::logic::solving::{OracleOutcome, Solver};

    /// Pool over a fixed proposition table, allocating auxiliaries above it.
    struct TablePool {
        names: HashMap<String, i32>,
        next: i32,
    }

    impl TablePool {
        fn new(props: &[&str]) -> Self {
            let names: HashMap<String, i32> = props.iter()
                .enumerate()
                .map(|(i, p)| (p.to_string(), i as i32 + 1))
                .collect();
            Self { next: names.len() as i32, names }
        }
    }

    impl VarPool for TablePool {
        fn resolve(&self, name: &str) -> Option<Literal> {
            self.names.get(name).map(|&v| Literal::from_var(v))
        }

        fn fresh(&mut self) -> Literal {
            self.next += 1;
            Literal::from_var(self.next)
        }
    }

    const PROPS: [&str; 4] = ["a", "b", "c", "d"];

    /// Checks that for every total assignment of the propositions, the compiled
    /// clauses with the root asserted are satisfiable exactly when the formula is true.
    fn assert_equivalent(formula: &Formula) {
        let mut pool = TablePool::new(&PROPS);
        let xcnf = compile(formula, &mut pool).unwrap();

        let mut solver = Solver::new();
        for clause in &xcnf.asserted() {
            solver.add_clause(clause);
        }

        for bits in 0u32..(1 << PROPS.len()) {
            let truth = |name: &str| {
                let idx = PROPS.iter().position(|p| *p == name).unwrap();
                bits & (1 << idx) != 0
            };
            let assumptions: Vec<Literal> = PROPS.iter()
                .map(|p| {
                    let lit = pool.resolve(p).unwrap();
                    if truth(*p) { lit } else { -lit }
                })
                .collect();

            let sat = solver.solve_assuming(&assumptions).unwrap().is_sat();
            assert_eq!(sat, formula.evaluate(&truth), "{} under assignment {:04b}", formula, bits);
        }
    }

    #[test]
    fn truth_table_equivalence() {
        let formulas = [
            "a",
            "¬a",
            "a ∧ b ∧ ¬c",
            "a ∨ ¬b ∨ c",
            "a ⇒ b",
            "a ⇔ ¬b",
            "¬(a ∧ b) ∨ (c ⇔ d)",
            "(a ⇒ b) ⇒ (¬b ⇒ ¬a)",
            "(a ∨ b) ∧ (¬a ∨ c) ∧ (¬b ∨ d) ∧ ¬c",
            "a ⇔ b ⇔ c ⇔ d",
        ];
        for text in formulas {
            assert_equivalent(&parse_formula(text).unwrap());
        }
    }

    #[test]
    fn contradiction_is_unsat() {
        let mut pool = TablePool::new(&PROPS);
        let xcnf = compile(&parse_formula("a ∧ ¬a").unwrap(), &mut pool).unwrap();

        let mut solver = Solver::new();
        for clause in &xcnf.asserted() {
            solver.add_clause(clause);
        }
        assert!(!solver.solve().unwrap());
    }

    #[test]
    fn linear_size() {
        // A chain of n biconditionals would blow up under naive distribution
        let n = 12;
        let text = (0..n).map(|i| format!("x{i}")).collect::<Vec<_>>().join(" ⇔ ");
        let props: Vec<String> = (0..n).map(|i| format!("x{i}")).collect();
        let refs: Vec<&str> = props.iter().map(String::as_str).collect();
        let mut pool = TablePool::new(&refs);

        let xcnf = compile(&parse_formula(&text).unwrap(), &mut pool).unwrap();
        assert_eq!(xcnf.clauses.len(), 4 * (n - 1));
        assert_eq!(pool.next as usize, n + (n - 1));
    }

    #[test]
    fn atoms_need_no_auxiliaries() {
        let mut pool = TablePool::new(&PROPS);
        let xcnf = compile(&parse_formula("¬¬b").unwrap(), &mut pool).unwrap();
        assert!(xcnf.clauses.is_empty());
        assert_eq!(xcnf.out_lit, Literal::from_var(2));
        assert_eq!(pool.next, PROPS.len() as i32);
    }

    #[test]
    fn unknown_proposition_leaves_pool_untouched() {
        let mut pool = TablePool::new(&PROPS);
        let err = compile(&parse_formula("(a ∧ b) ∨ zeta").unwrap(), &mut pool).unwrap_err();
        assert_eq!(err, CompileError::UnknownProposition { id: "zeta".into(), position: 10 });
        assert_eq!(pool.next, PROPS.len() as i32);
    }

    #[test]
    fn unsatisfiable_core_on_root() {
        let mut pool = TablePool::new(&PROPS);
        let xcnf = compile(&parse_formula("a ∧ b").unwrap(), &mut pool).unwrap();
        let mut solver = Solver::new();
        for clause in &xcnf.clauses {
            solver.add_clause(clause);
        }
        solver.add_clause([-Literal::from_var(1)]);

        match solver.solve_assuming([xcnf.out_lit]).unwrap() {
            OracleOutcome::Unsat(core) => assert_eq!(core, vec![xcnf.out_lit]),
            other => panic!("expected UNSAT, got {:?}", other),
        }
    }

    fn arb_formula() -> impl Strategy<Value = Formula> {
        let leaf = prop::sample::select(PROPS.to_vec()).prop_map(Formula::atom);
        leaf.prop_recursive(4, 24, 3, |inner| {
            prop_oneof![
                inner.clone().prop_map(Formula::negated),
                prop::collection::vec(inner.clone(), 2..4).prop_map(Formula::And),
                prop::collection::vec(inner.clone(), 2..4).prop_map(Formula::Or),
                (inner.clone(), inner.clone()).prop_map(|(l, r)| Formula::Implies(Box::new(l), Box::new(r))),
                (inner.clone(), inner).prop_map(|(l, r)| Formula::Iff(Box::new(l), Box::new(r))),
            ]
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn compiled_clauses_are_equisatisfiable(formula in arb_formula()) {
            assert_equivalent(&formula);

            // Satisfiability of the whole clause set matches the truth table
            let mut pool = TablePool::new(&PROPS);
            let xcnf = compile(&formula, &mut pool).unwrap();
            let mut solver = Solver::new();
            for clause in &xcnf.asserted() {
                solver.add_clause(clause);
            }
            let satisfiable = (0u32..16).any(|bits| formula.evaluate(&|name: &str| {
                let idx = PROPS.iter().position(|p| *p == name).unwrap();
                bits & (1 << idx) != 0
            }));
            prop_assert_eq!(solver.solve().unwrap(), satisfiable);
        }

        #[test]
        fn compiled_size_is_linear(formula in arb_formula()) {
            let mut pool = TablePool::new(&PROPS);
            let xcnf = compile(&formula, &mut pool).unwrap();
            let aux = pool.next as usize - PROPS.len();
            prop_assert!(aux <= formula.size());
            prop_assert!(xcnf.clauses.len() <= 4 * formula.size());
        }
    }
}
