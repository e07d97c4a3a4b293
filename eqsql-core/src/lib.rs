//! Dialect-independent query-equivalence core for differential database
//! testing.
//!
//! A concrete query is deconstructed into its semiring denotation (the
//! multiplicity function of its output rows), the e-graph saturates that
//! denotation under a rewrite-rule set, and reconstruction pulls
//! syntactically different but denotationally equivalent queries back out
//! for execution and comparison by an external harness.
//!
//! ```
//! use eqsql_core::{
//!     deconstruct::Deconstruct,
//!     egraph::EGraph,
//!     reconstruct::reconstruct,
//!     rules::standard_rules,
//!     sql::{Label, Labelled, Predicate, Query, Relational, Select, Selector, Table},
//!     types::{BaseType, ConstValue, RelType},
//! };
//!
//! let row = RelType::pair(RelType::leaf(BaseType::Int), RelType::leaf(BaseType::Int));
//! let source = Labelled::new(
//!     Label::new("t0", row.clone()),
//!     Relational::Table(Table::new("t", row.clone())),
//! )?;
//! let query = Query::Select(Select {
//!     selectors: vec![Selector::left_proj(Selector::TableProj(Table::new("t0", row.clone())))?],
//!     from: vec![source],
//!     where_clause: Predicate::Gt(
//!         Selector::right_proj(Selector::TableProj(Table::new("t0", row)))?,
//!         Selector::Const(ConstValue::Int(5)),
//!     ),
//! });
//!
//! let lambda = Deconstruct::new().translate(&query)?;
//! let mut egraph = EGraph::new(&lambda.clone().into_expr());
//! egraph.saturate(&standard_rules(), 8)?;
//! // every reconstructable alternative is equivalent to `query`
//! let alternatives = egraph.generate(16);
//! assert!(!alternatives.is_empty());
//! let roundtripped = reconstruct(&lambda.self_applied())?;
//! assert_eq!(roundtripped.render(), query.render());
//! # Ok::<(), eqsql_core::Error>(())
//! ```

mod ids;
mod typed_vec;
mod union_find;

pub mod deconstruct;
pub mod egraph;
pub mod error;
pub mod reconstruct;
pub mod rules;
pub mod sql;
pub mod types;
pub mod usr;

pub use error::{Error, Result, TypeError};
pub use ids::ClassId;

#[cfg(test)]
mod expect_tests;
