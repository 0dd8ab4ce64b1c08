#![allow(clippy::upper_case_acronyms)]

use std::fmt::{Debug, Display, Formatter};
use std::ops::{BitAnd, Index};
use super::solving::Literal;

#[derive(Clone,PartialEq,Eq,Hash)]
pub struct Clause {
    lits: Box<[Literal]>,
}

impl Clause {
    pub fn new<I>(lits: I) -> Self
    where
        I: IntoIterator<Item = Literal>,
    {
        let v: Vec<Literal> = lits.into_iter().collect();
        Clause::from_vec(v)
    }

    #[inline]
    pub fn from_vec(v: Vec<Literal>) -> Self {
        Self { lits: v.into_boxed_slice() }
    }

    pub fn lits(&self) -> &[Literal] {
        &self.lits
    }

    pub fn len(&self) -> usize {
        self.lits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lits.is_empty()
    }

    /// Returns a copy of this clause extended by one literal.
    pub fn with(&self, lit: Literal) -> Clause {
        Clause::new(self.lits.iter().copied().chain([lit]))
    }
}
impl<const N: usize> From<[Literal; N]> for Clause {
    fn from(arr: [Literal; N]) -> Self {
        Self::new(arr)
    }
}
impl From<Literal> for Clause {
    fn from(lit: Literal) -> Self {
        Self::new([lit])
    }
}
impl From<Vec<Literal>> for Clause {
    fn from(v: Vec<Literal>) -> Self {
        Self::from_vec(v)
    }
}
impl AsRef<[Literal]> for Clause {
    fn as_ref(&self) -> &[Literal] {
        &self.lits
    }
}
impl Debug for Clause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Clause: [{}]",
               self.lits.iter()
                   .map(|l| format!("{}", l))
                   .collect::<Vec<_>>()
                   .join(", ")
        )
    }
}
impl Display for Clause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]",
               self.lits.iter()
                   .map(|l| format!("{}", l))
                   .collect::<Vec<_>>()
                   .join(", ")
        )
    }
}
impl<'a> IntoIterator for &'a Clause {
    type Item = Literal;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, Literal>>;

    fn into_iter(self) -> Self::IntoIter {
        self.lits.iter().copied()
    }
}

impl BitAnd<&Clause> for &Clause {
    type Output = CNF;
    fn bitand(self, rhs: &Clause) -> Self::Output {
        CNF::from(vec![self.clone(), rhs.clone()])
    }
}


#[derive(Clone, Default, PartialEq, Eq)]
pub struct CNF {
    pub clauses: Vec<Clause>,
}

impl CNF {
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn push<C: Into<Clause>>(&mut self, clause: C) {
        self.clauses.push(clause.into());
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Clause> {
        self.clauses.iter()
    }
}
impl Index<usize> for CNF {
    type Output = Clause;
    fn index(&self, index: usize) -> &Self::Output {
        &self.clauses[index]
    }
}
impl PartialEq<Literal> for &CNF {
    fn eq(&self, lit: &Literal) -> bool {
        self.clauses.len() == 1
            && self.clauses[0].lits.len() == 1
            && self.clauses[0].lits[0] == *lit
    }
}
impl From<Vec<Clause>> for CNF {
    fn from(clauses: Vec<Clause>) -> Self {
        Self { clauses }
    }
}
impl From<Literal> for CNF {
    fn from(lit: Literal) -> Self {
        CNF::from(vec![Clause::new([lit])])
    }
}
impl From<Clause> for CNF {
    fn from(clause: Clause) -> Self {
        CNF::from(vec![clause])
    }
}
impl<C> FromIterator<C> for CNF
where
    C: Into<Clause>
{
    fn from_iter<T: IntoIterator<Item = C>>(iter: T) -> Self {
        let clauses = iter.into_iter().map(|c| c.into()).collect();
        Self { clauses }
    }
}
impl<'a> IntoIterator for &'a CNF {
    type Item = &'a Clause;
    type IntoIter = std::slice::Iter<'a, Clause>;

    fn into_iter(self) -> Self::IntoIter {
        self.clauses.iter()
    }
}

impl Debug for CNF {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CNF: {{ {} }}",
               self.clauses.iter()
                   .map(|c| format!("{}", c))
                   .collect::<Vec<_>>()
                   .join(", ")
        )
    }
}
#[allow(clippy::suspicious_arithmetic_impl)]
impl BitAnd<&Clause> for CNF {
    type Output = CNF;
    fn bitand(self, rhs: &Clause) -> Self::Output {
        let mut merged_vec = Vec::with_capacity(self.clauses.len() + 1);
        merged_vec.extend_from_slice(&self.clauses);
        merged_vec.push(rhs.clone());
        CNF::from(merged_vec)
    }
}
#[allow(clippy::suspicious_arithmetic_impl)]
impl BitAnd<&CNF> for CNF {
    type Output = CNF;
    fn bitand(self, rhs: &CNF) -> Self::Output {
        let mut merged_vec = Vec::with_capacity(self.clauses.len() + rhs.clauses.len());
        merged_vec.extend_from_slice(&self.clauses);
        merged_vec.extend_from_slice(&rhs.clauses);
        CNF::from(merged_vec)
    }
}
impl BitAnd<&CNF> for &CNF {
    type Output = CNF;
    fn bitand(self, rhs: &CNF) -> Self::Output {
        self.clone() & rhs
    }
}

#[macro_export]
macro_rules! cnf {
    ( $( [ $( $lit:expr ),* ] ),* ) => {
        $crate::logic::CNF::from(vec![
            $( $crate::logic::Clause::from([ $( $lit ),* ]) ),*
        ])
    };
}


/// Short for Extended CNF.</br>
/// Extends a formula in CNF by an output tseitin literal that is equivalent to the formula
/// under every model of the clauses.
#[derive(Clone, PartialEq, Eq)]
pub struct XCNF {
    pub clauses: CNF,
    pub out_lit: Literal
}

impl XCNF {
    pub fn new(clauses: CNF, output_literal: Literal) -> Self {
        Self {
            clauses,
            out_lit: output_literal
        }
    }

    /// Definitional clauses plus the unit clause asserting the output literal.
    pub fn asserted(&self) -> CNF {
        &self.clauses & &CNF::from(self.out_lit)
    }

    /// Definitional clauses plus the unit clause asserting the negated output literal.
    pub fn refuted(&self) -> CNF {
        &self.clauses & &CNF::from(-self.out_lit)
    }
}
impl From<Literal> for XCNF {
    fn from(lit: Literal) -> Self {
        Self::new(CNF::default(), lit)
    }
}
impl Debug for XCNF {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "XCNF {{ clauses: {{ {:?} }}, out_lit: {} }}", self.clauses, self.out_lit)
    }
}


/// Cost of violating a clause. Hard clauses can never be violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Weight {
    Hard,
    Soft(u64),
}

impl Weight {
    pub fn is_hard(&self) -> bool {
        matches!(self, Weight::Hard)
    }

    pub fn soft(&self) -> Option<u64> {
        match self {
            Weight::Hard => None,
            Weight::Soft(w) => Some(*w),
        }
    }
}

impl Display for Weight {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Weight::Hard => write!(f, "∞"),
            Weight::Soft(w) => write!(f, "{w}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedClause {
    pub clause: Clause,
    pub weight: Weight,
    /// Index of the constraint this clause was compiled from
    pub origin: usize,
}

/// The compiled clause collection of a knowledge base.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeightedClauseSet {
    clauses: Vec<WeightedClause>,
}

impl WeightedClauseSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, clause: Clause, weight: Weight, origin: usize) {
        self.clauses.push(WeightedClause { clause, weight, origin });
    }

    pub fn extend_from_cnf(&mut self, cnf: &CNF, weight: Weight, origin: usize) {
        for clause in cnf {
            self.push(clause.clone(), weight, origin);
        }
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WeightedClause> {
        self.clauses.iter()
    }

    pub fn hard(&self) -> impl Iterator<Item = &Clause> {
        self.clauses.iter()
            .filter(|wc| wc.weight.is_hard())
            .map(|wc| &wc.clause)
    }

    pub fn soft(&self) -> impl Iterator<Item = (&Clause, u64)> {
        self.clauses.iter()
            .filter_map(|wc| wc.weight.soft().map(|w| (&wc.clause, w)))
    }

    pub fn total_soft_weight(&self) -> u64 {
        self.soft().map(|(_, w)| w).sum()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cnf_from_clause() {
        let a = Literal::from_var(1);
        let b = Literal::from_var(2);
        let c = Literal::from_var(3);
        let clause: Clause = Clause::new([a, -b, c]);

        let cnf = CNF::from(clause.clone());
        assert_eq!(cnf.clauses.len(), 1);
        assert_eq!(cnf.clauses[0].lits.len(), 3);
        assert_eq!(cnf.clauses[0], clause);
    }

    #[test]
    fn cnf_from_unit() {
        let a = Literal::from_var(1);
        let cnf = CNF::from(-a);
        assert_eq!(cnf.clauses.len(), 1);
        assert!(&cnf == -a);
    }

    #[test]
    fn xcnf_assertion() {
        let a = Literal::from_var(1);
        let b = Literal::from_var(2);
        let t = Literal::from_var(3);
        let xcnf = XCNF::new(cnf![[-t, a], [-t, b], [t, -a, -b]], t);

        let asserted = xcnf.asserted();
        assert_eq!(asserted.len(), 4);
        assert_eq!(asserted[3], Clause::from([t]));

        let refuted = xcnf.refuted();
        assert_eq!(refuted.len(), 4);
        assert_eq!(refuted[3], Clause::from([-t]));

        let atom = XCNF::from(-a);
        assert!(atom.clauses.is_empty());
        assert!(&atom.asserted() == -a);
    }

    #[test]
    fn cnf_and_cnf() {
        let a = Literal::from_var(1);
        let b = Literal::from_var(2);
        let c = Literal::from_var(3);

        let left_cnf = cnf![[-a, b]];
        let right_cnf = cnf![[-b, c], [-c, a]];

        let result: CNF = &left_cnf & &right_cnf;
        assert_eq!(result.clauses.len(), 3);
        assert_eq!(&result.clauses[0], &left_cnf.clauses[0]);
        assert_eq!(&result.clauses[1], &right_cnf.clauses[0]);
        assert_eq!(&result.clauses[2], &right_cnf.clauses[1]);
    }

    #[test]
    fn weighted_partition() {
        let a = Literal::from_var(1);
        let b = Literal::from_var(2);

        let mut set = WeightedClauseSet::new();
        set.push(Clause::from([a]), Weight::Hard, 0);
        set.extend_from_cnf(&cnf![[-a, b], [b]], Weight::Soft(7), 1);

        assert_eq!(set.len(), 3);
        assert_eq!(set.hard().count(), 1);
        assert_eq!(set.soft().map(|(_, w)| w).collect::<Vec<_>>(), vec![7, 7]);
        assert_eq!(set.total_soft_weight(), 14);
        assert_eq!(Clause::from([a]).with(-b), Clause::from([a, -b]));
    }
}
