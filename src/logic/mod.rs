pub mod solving;
pub mod formula;
pub mod tseitin;
pub mod cardinality;

mod types;

pub use solving::{Literal, Model, OracleFactory, OracleFault, OracleOutcome, SatOracle, Solver, VarisatFactory};
pub use formula::{parse_formula, Formula, ParseError};
pub use tseitin::{compile, CompileError, VarPool};
pub use cardinality::Totalizer;
pub use types::*;
