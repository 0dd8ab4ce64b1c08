use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::debug;
use super::maxsat::{Budget, CoreGuided, MaxSatError, MaxSatOutcome};
use super::QueryError;
use crate::config::ConfigError;
use crate::kb::{KnowledgeBase, PropositionRegistry};
use crate::logic::{self, parse_formula, CompileError, Literal, OracleFactory, OracleFault, SatOracle, VarPool, VarisatFactory, XCNF};


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    True,
    False,
    Uncertain,
}

impl Display for Verdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::True => write!(f, "TRUE"),
            Verdict::False => write!(f, "FALSE"),
            Verdict::Uncertain => write!(f, "UNCERTAIN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Explanation {
    EntailedByHardConstraints,
    RefutedByHardConstraints,
    ConsistentWithHardConstraints,
    InconsistentWithHardConstraints,
    /// Minimal soft-constraint violation when assuming the query and its negation
    CostComparison { cost_query: u64, cost_negation: u64 },
    /// Lower bounds reached before the budget ran out
    BudgetExhausted { cost_query: u64, cost_negation: u64 },
    Degraded { fault: String },
}

impl Display for Explanation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Explanation::EntailedByHardConstraints => write!(f, "entailed by hard constraints alone"),
            Explanation::RefutedByHardConstraints => write!(f, "refuted by hard constraints alone"),
            Explanation::ConsistentWithHardConstraints => write!(f, "consistent with the hard constraints"),
            Explanation::InconsistentWithHardConstraints => write!(f, "inconsistent with the hard constraints"),
            Explanation::CostComparison { cost_query, cost_negation } => {
                write!(f, "violation cost {cost_query} assuming the query, {cost_negation} assuming its negation")
            }
            Explanation::BudgetExhausted { cost_query, cost_negation } => {
                write!(f, "budget exhausted with lower bounds {cost_query} (query) and {cost_negation} (negation)")
            }
            Explanation::Degraded { fault } => write!(f, "degraded to hard constraints only: {fault}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverResult {
    pub verdict: Verdict,
    pub confidence: f64,
    pub explanation: Explanation,
}

impl Display for SolverResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (confidence {:.3}): {}", self.verdict, self.confidence, self.explanation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceReport {
    pub confidence: f64,
    /// `None` when the hard constraints alone decided the query
    pub cost_query: Option<u64>,
    pub cost_negation: Option<u64>,
    pub explanation: Explanation,
}

impl Display for ConfidenceReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "confidence {:.3}: {}", self.confidence, self.explanation)
    }
}


#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown query kind '{0}', expected entailment, consistency or confidence")]
pub struct UnknownQueryKind(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Entailment,
    Consistency,
    Confidence,
}

impl FromStr for QueryKind {
    type Err = UnknownQueryKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "entailment" | "entails" => Ok(QueryKind::Entailment),
            "consistency" | "consistent" => Ok(QueryKind::Consistency),
            "confidence" => Ok(QueryKind::Confidence),
            _ => Err(UnknownQueryKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub formula: String,
    pub kind: QueryKind,
}

impl Query {
    pub fn new(formula: &str, kind: QueryKind) -> Self {
        Self { formula: formula.to_string(), kind }
    }

    pub fn entailment(formula: &str) -> Self {
        Self::new(formula, QueryKind::Entailment)
    }

    pub fn consistency(formula: &str) -> Self {
        Self::new(formula, QueryKind::Consistency)
    }

    pub fn confidence(formula: &str) -> Self {
        Self::new(formula, QueryKind::Confidence)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryAnswer {
    Verdict(SolverResult),
    Confidence(ConfidenceReport),
}

impl QueryAnswer {
    pub fn confidence(&self) -> f64 {
        match self {
            QueryAnswer::Verdict(result) => result.confidence,
            QueryAnswer::Confidence(report) => report.confidence,
        }
    }
}

impl Display for QueryAnswer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryAnswer::Verdict(result) => write!(f, "{result}"),
            QueryAnswer::Confidence(report) => write!(f, "{report}"),
        }
    }
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub uncertainty_margin: f64,
    /// Oracle calls allowed per optimization run
    pub max_iterations: usize,
    /// Wall-clock limit shared by both optimization runs of a query
    pub timeout_ms: Option<u64>,
    pub minimize_cores: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            uncertainty_margin: 0.05,
            max_iterations: 10_000,
            timeout_ms: None,
            minimize_cores: true,
        }
    }
}

impl QueryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..0.5).contains(&self.uncertainty_margin) {
            return Err(ConfigError::invalid("query.uncertainty_margin", "must lie in [0, 0.5)"));
        }
        Ok(())
    }
}


/// Variables of one query: propositions resolve through the frozen registry,
/// auxiliaries are numbered above everything the knowledge base uses.
#[derive(Debug, Clone)]
struct Scope<'kb> {
    registry: &'kb PropositionRegistry,
    next_var: i32,
}

impl<'kb> Scope<'kb> {
    fn new(kb: &'kb KnowledgeBase) -> Self {
        Self { registry: kb.registry(), next_var: kb.num_vars() }
    }
}

impl VarPool for Scope<'_> {
    fn resolve(&self, name: &str) -> Option<Literal> {
        self.registry.resolve(name)
    }

    fn fresh(&mut self) -> Literal {
        self.next_var += 1;
        Literal::from_var(self.next_var)
    }
}


/// Result of weighing a query against its negation.
struct Assessment {
    confidence: f64,
    costs: Option<(u64, u64)>,
    explanation: Explanation,
    /// Set when the answer is definite regardless of the margin
    decided: Option<Verdict>,
}

impl Assessment {
    fn decided(verdict: Verdict, confidence: f64, explanation: Explanation) -> Self {
        Self { confidence, costs: None, explanation, decided: Some(verdict) }
    }
}

fn cost_ratio(cost_query: u64, cost_negation: u64) -> f64 {
    let total = cost_query + cost_negation;
    if total == 0 {
        0.5
    } else {
        cost_negation as f64 / total as f64
    }
}


/// Answers queries against a shared [KnowledgeBase].
///
/// Every query builds its own oracles, so one engine (or clones of it) can
/// serve any number of threads.
#[derive(Clone)]
pub struct QueryEngine {
    kb: Arc<KnowledgeBase>,
    config: QueryConfig,
    oracles: Arc<dyn OracleFactory>,
}

impl QueryEngine {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self {
            kb,
            config: QueryConfig::default(),
            oracles: Arc::new(VarisatFactory),
        }
    }

    pub fn with_config(mut self, config: QueryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn with_oracle_factory(mut self, oracles: Arc<dyn OracleFactory>) -> Self {
        self.oracles = oracles;
        self
    }

    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.kb
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn query(&self, query: &Query) -> Result<QueryAnswer, QueryError> {
        match query.kind {
            QueryKind::Entailment => self.entails(&query.formula).map(QueryAnswer::Verdict),
            QueryKind::Consistency => self.check_consistency(&query.formula).map(QueryAnswer::Verdict),
            QueryKind::Confidence => self.confidence(&query.formula).map(QueryAnswer::Confidence),
        }
    }

    /// Decides whether the knowledge base supports `formula`.
    pub fn entails(&self, formula: &str) -> Result<SolverResult, QueryError> {
        let assessment = self.assess(formula)?;
        let verdict = assessment.decided.unwrap_or_else(|| match assessment.explanation {
            Explanation::CostComparison { .. } => self.verdict(assessment.confidence),
            _ => Verdict::Uncertain,
        });

        debug!(formula, %verdict, confidence = assessment.confidence, "Entailment query answered");
        Ok(SolverResult { verdict, confidence: assessment.confidence, explanation: assessment.explanation })
    }

    /// Checks whether `formula` can hold together with the hard constraints.
    /// Soft constraints play no role.
    pub fn check_consistency(&self, formula: &str) -> Result<SolverResult, QueryError> {
        let (compiled, _) = self.prepare(formula)?;
        let mut oracle = self.hard_oracle(&compiled);

        let result = if oracle.solve_assuming(&[compiled.out_lit])?.is_sat() {
            SolverResult {
                verdict: Verdict::True,
                confidence: 1.0,
                explanation: Explanation::ConsistentWithHardConstraints,
            }
        } else {
            self.ensure_consistent(oracle.as_mut())?;
            SolverResult {
                verdict: Verdict::False,
                confidence: 0.0,
                explanation: Explanation::InconsistentWithHardConstraints,
            }
        };

        debug!(formula, verdict = %result.verdict, "Consistency query answered");
        Ok(result)
    }

    /// Confidence that `formula` holds, without a verdict.
    pub fn confidence(&self, formula: &str) -> Result<ConfidenceReport, QueryError> {
        let assessment = self.assess(formula)?;
        debug!(formula, confidence = assessment.confidence, "Confidence query answered");
        Ok(ConfidenceReport {
            confidence: assessment.confidence,
            cost_query: assessment.costs.map(|(q, _)| q),
            cost_negation: assessment.costs.map(|(_, n)| n),
            explanation: assessment.explanation,
        })
    }

    fn verdict(&self, confidence: f64) -> Verdict {
        let margin = self.config.uncertainty_margin;
        if confidence > 0.5 + margin {
            Verdict::True
        } else if confidence < 0.5 - margin {
            Verdict::False
        } else {
            Verdict::Uncertain
        }
    }

    /// Parses and compiles the query formula into a fresh scope.
    fn prepare(&self, formula: &str) -> Result<(XCNF, Scope<'_>), QueryError> {
        let parsed = parse_formula(formula)?;
        let mut scope = Scope::new(&self.kb);
        let compiled = logic::compile(&parsed, &mut scope).map_err(|e| match e {
            CompileError::UnknownProposition { id, position } => QueryError::UnknownProposition { id, position },
        })?;
        trace!(formula, clauses = compiled.clauses.len(), "Compiled query");
        Ok((compiled, scope))
    }

    /// Oracle over the hard clauses plus the query definitions.
    fn hard_oracle(&self, query: &XCNF) -> Box<dyn SatOracle> {
        let mut oracle = self.oracles.spawn();
        for clause in self.kb.clauses().hard() {
            oracle.add_clause(clause.lits());
        }
        for clause in &query.clauses {
            oracle.add_clause(clause.lits());
        }
        oracle
    }

    fn ensure_consistent(&self, oracle: &mut dyn SatOracle) -> Result<(), QueryError> {
        if oracle.solve_assuming(&[])?.is_sat() {
            Ok(())
        } else {
            warn!("Hard constraints of the knowledge base are contradictory");
            Err(QueryError::InconsistentKnowledgeBase)
        }
    }

    fn assess(&self, formula: &str) -> Result<Assessment, QueryError> {
        let (compiled, scope) = self.prepare(formula)?;
        let q = compiled.out_lit;

        let mut oracle = self.hard_oracle(&compiled);
        if !oracle.solve_assuming(&[-q])?.is_sat() {
            self.ensure_consistent(oracle.as_mut())?;
            return Ok(Assessment::decided(Verdict::True, 1.0, Explanation::EntailedByHardConstraints));
        }
        // The hard clauses are satisfiable from here on
        if !oracle.solve_assuming(&[q])?.is_sat() {
            return Ok(Assessment::decided(Verdict::False, 0.0, Explanation::RefutedByHardConstraints));
        }
        drop(oracle);

        let deadline = self.config.timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
        let outcomes = self.optimize(&compiled, &scope, q, deadline)
            .and_then(|with_query| Ok((with_query, self.optimize(&compiled, &scope, -q, deadline)?)));

        let assessment = match outcomes {
            Ok((MaxSatOutcome::Optimal { cost: cost_query, .. }, MaxSatOutcome::Optimal { cost: cost_negation, .. })) => {
                Assessment {
                    confidence: cost_ratio(cost_query, cost_negation),
                    costs: Some((cost_query, cost_negation)),
                    explanation: Explanation::CostComparison { cost_query, cost_negation },
                    decided: None,
                }
            }
            Ok((MaxSatOutcome::HardUnsat, _)) | Ok((_, MaxSatOutcome::HardUnsat)) => {
                let fault = OracleFault::Inconsistent("optimization found hard clauses unsatisfiable after a satisfiable check".into());
                self.degraded(formula, MaxSatError::Oracle(fault))
            }
            Ok((with_query, with_negation)) => {
                let cost_query = Self::lower_bound(&with_query);
                let cost_negation = Self::lower_bound(&with_negation);
                warn!(formula, cost_query, cost_negation, "Query budget exhausted");
                Assessment {
                    confidence: cost_ratio(cost_query, cost_negation),
                    costs: Some((cost_query, cost_negation)),
                    explanation: Explanation::BudgetExhausted { cost_query, cost_negation },
                    decided: None,
                }
            }
            Err(e) => self.degraded(formula, e),
        };
        Ok(assessment)
    }

    fn degraded(&self, formula: &str, error: MaxSatError) -> Assessment {
        warn!(formula, %error, "Oracle fault during optimization, answering from hard constraints only");
        Assessment {
            confidence: 0.5,
            costs: None,
            explanation: Explanation::Degraded { fault: error.to_string() },
            decided: Some(Verdict::Uncertain),
        }
    }

    fn lower_bound(outcome: &MaxSatOutcome) -> u64 {
        match outcome {
            MaxSatOutcome::Optimal { cost, .. } => *cost,
            MaxSatOutcome::BudgetExhausted { lower_bound } => *lower_bound,
            MaxSatOutcome::HardUnsat => 0,
        }
    }

    /// Minimal soft violation over hard ∪ soft with `assertion` forced true.
    fn optimize(
        &self,
        query: &XCNF,
        scope: &Scope<'_>,
        assertion: Literal,
        deadline: Option<Instant>,
    ) -> Result<MaxSatOutcome, MaxSatError> {
        let mut scope = scope.clone();
        let budget = Budget { max_iterations: Some(self.config.max_iterations), deadline };
        let mut solver = CoreGuided::new(self.oracles.spawn(), &mut scope)
            .with_budget(budget)
            .with_core_minimization(self.config.minimize_cores);

        for clause in self.kb.clauses().hard() {
            solver.add_hard(clause.lits());
        }
        for clause in &query.clauses {
            solver.add_hard(clause.lits());
        }
        solver.add_hard(&[assertion]);
        for (clause, weight) in self.kb.clauses().soft() {
            solver.add_soft(clause.clone(), weight);
        }

        let outcome = solver.solve()?;
        let stats = solver.stats();
        trace!(
            assertion = %assertion,
            iterations = stats.iterations,
            oracle_calls = stats.oracle_calls,
            cores = stats.cores,
            totalizers = stats.totalizers,
            "Optimization finished"
        );

        if let MaxSatOutcome::Optimal { model, .. } = &outcome {
            debug_assert!(
                debug::violated_clauses(model, self.kb.clauses()).iter().all(|wc| !wc.weight.is_hard()),
                "optimal model violates a hard clause"
            );
            trace!(model = %debug::describe_model(model, self.kb.registry()), "Optimal model");
        }
        Ok(outcome)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_ratio_bounds() {
        assert_eq!(cost_ratio(0, 0), 0.5);
        assert_eq!(cost_ratio(0, 10), 1.0);
        assert_eq!(cost_ratio(10, 0), 0.0);
        assert_eq!(cost_ratio(1, 3), 0.75);
    }

    #[test]
    fn margin_around_one_half() {
        let kb = Arc::new(KnowledgeBase::builder().build().unwrap());
        let engine = QueryEngine::new(kb);
        assert_eq!(engine.verdict(0.56), Verdict::True);
        assert_eq!(engine.verdict(0.54), Verdict::Uncertain);
        assert_eq!(engine.verdict(0.5), Verdict::Uncertain);
        assert_eq!(engine.verdict(0.46), Verdict::Uncertain);
        assert_eq!(engine.verdict(0.44), Verdict::False);

        let strict = engine.clone().with_config(QueryConfig { uncertainty_margin: 0.0, ..Default::default() }).unwrap();
        assert_eq!(strict.verdict(0.51), Verdict::True);

        for margin in [0.5, -0.1, f64::NAN] {
            let config = QueryConfig { uncertainty_margin: margin, ..Default::default() };
            assert!(matches!(
                engine.clone().with_config(config),
                Err(ConfigError::Invalid { field: "query.uncertainty_margin", .. })
            ));
        }
    }

    #[test]
    fn query_kind_names() {
        assert_eq!("entailment".parse::<QueryKind>(), Ok(QueryKind::Entailment));
        assert_eq!("Consistency".parse::<QueryKind>(), Ok(QueryKind::Consistency));
        assert_eq!("confidence".parse::<QueryKind>(), Ok(QueryKind::Confidence));
        assert_eq!("probability".parse::<QueryKind>(), Err(UnknownQueryKind("probability".into())));
    }

    #[test]
    fn query_scope_allocates_above_knowledge_base() {
        let kb = KnowledgeBase::builder()
            .propositions(["a", "b"])
            .hard("H_1", "a ∨ b")
            .build()
            .unwrap();
        let mut scope = Scope::new(&kb);
        assert_eq!(scope.resolve("b"), Some(Literal::from_var(2)));
        assert_eq!(scope.fresh(), Literal::from_var(kb.num_vars() + 1));
        assert_eq!(scope.resolve("c"), None);
    }

    #[test]
    fn explanation_text() {
        let result = SolverResult {
            verdict: Verdict::True,
            confidence: 1.0,
            explanation: Explanation::CostComparison { cost_query: 0, cost_negation: 2197 },
        };
        assert_eq!(
            result.to_string(),
            "TRUE (confidence 1.000): violation cost 0 assuming the query, 2197 assuming its negation"
        );
        assert_eq!(Explanation::EntailedByHardConstraints.to_string(), "entailed by hard constraints alone");
    }
}
