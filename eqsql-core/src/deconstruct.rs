//! Reduce SQL queries to semiring expressions.
//!
//! `translate` maps a query to the lambda computing, for an output row, the
//! multiplicity of that row in the result. Total over select, union, join
//! (cartesian), and distinct; `EXCEPT` has no semiring identity here and is
//! refused, as is a join carrying a non-trivial `ON` predicate.

use crate::{
    error::{Error, Result},
    sql::{Labelled, Predicate, Query, Relational, Selector},
    types::{BaseType, RelType},
    usr::{Expr, Lambda, Var, VarSupply},
};

/// SQL → USR translation. Owns its fresh-variable supply, so independent
/// translations compose without shared naming state.
#[derive(Clone, Debug, Default)]
pub struct Deconstruct {
    vars: VarSupply,
}

impl Deconstruct {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translate(&mut self, query: &Query) -> Result<Lambda> {
        tracing::trace!("translating {query}");
        match query {
            Query::Select(select) => {
                let top = self.vars.fresh(query.ty()?);
                let selectors =
                    selector_constraints(&select.selectors, Expr::Var(top.clone()));
                let from = self.from_constraints(&select.from)?;
                let predicate = predicate_constraints(&select.where_clause);
                Ok(Lambda {
                    var: top,
                    body: Expr::mul(Expr::mul(selectors, from), predicate),
                })
            }
            Query::Union(left, right) => {
                let top = self.vars.fresh(query.ty()?);
                let arg = Expr::Var(top.clone());
                let body = Expr::add(
                    self.translate(left)?.eval(&arg),
                    self.translate(right)?.eval(&arg),
                );
                Ok(Lambda { var: top, body })
            }
            Query::Join { left, right, on } => {
                // the translation is an unconditional cartesian product; a
                // join condition would be dropped on the floor, so refuse it
                if !matches!(on, Predicate::True) {
                    return Err(Error::Unsupported("JOIN with a non-trivial ON predicate"));
                }
                let top = self.vars.fresh(query.ty()?);
                let arg = Expr::Var(top.clone());
                let body = Expr::mul(
                    self.translate(left)?.eval(&arg),
                    self.translate(right)?.eval(&arg),
                );
                Ok(Lambda { var: top, body })
            }
            Query::Distinct(inner) => {
                let top = self.vars.fresh(query.ty()?);
                let arg = Expr::Var(top.clone());
                let body = Expr::squash(self.translate(inner)?.eval(&arg));
                Ok(Lambda { var: top, body })
            }
            Query::Except(..) => Err(Error::Unsupported("EXCEPT")),
        }
    }

    /// One factor per source: the base relation applied to its label, or the
    /// sub-query's lambda evaluated at the label. Multiple sources multiply
    /// (cartesian semantics); no sources at all is the unit.
    fn from_constraints(&mut self, from: &[Labelled]) -> Result<Expr> {
        let mut factors = Vec::with_capacity(from.len());
        for labelled in from {
            let label = labelled.label();
            let label_var = Expr::Var(Var::new(label.name.clone(), label.ty.clone()));
            let factor = match labelled.relational() {
                Relational::Table(table) => Expr::Relation {
                    name: table.name.clone(),
                    ty: table.ty.clone(),
                    arg: Box::new(label_var),
                },
                Relational::Query(query) => self.translate(query)?.eval(&label_var),
            };
            factors.push(factor);
        }
        Ok(factors.into_iter().reduce(Expr::mul).unwrap_or(Expr::One))
    }
}

fn selector_to_expr(selector: &Selector) -> Expr {
    match selector {
        Selector::LeftProj(inner) => Expr::left(selector_to_expr(inner)),
        Selector::RightProj(inner) => Expr::right(selector_to_expr(inner)),
        Selector::TableProj(table) => Expr::Var(Var::new(table.name.clone(), table.ty.clone())),
        Selector::Const(value) => Expr::Const(value.clone()),
        Selector::Func { fun, args } => Expr::Function {
            name: fun.name.clone(),
            ty: fun.output.clone(),
            args: args.iter().map(selector_to_expr).collect(),
        },
    }
}

/// Equate the projection chain of the output row against each selector's
/// value. The chain right-nests, mirroring the right-nested row type.
fn selector_constraints(selectors: &[Selector], proj: Expr) -> Expr {
    match selectors {
        [] => Expr::One,
        [only] => Expr::equal(proj, selector_to_expr(only)),
        [head, tail @ ..] => Expr::mul(
            Expr::equal(Expr::left(proj.clone()), selector_to_expr(head)),
            selector_constraints(tail, Expr::right(proj)),
        ),
    }
}

fn predicate_constraints(predicate: &Predicate) -> Expr {
    match predicate {
        Predicate::True => Expr::One,
        Predicate::False => Expr::Zero,
        Predicate::And(left, right) => Expr::mul(
            predicate_constraints(left),
            predicate_constraints(right),
        ),
        Predicate::Or(left, right) => Expr::add(
            predicate_constraints(left),
            predicate_constraints(right),
        ),
        Predicate::Not(inner) => Expr::not(predicate_constraints(inner)),
        Predicate::Eq(left, right) => Expr::equal(selector_to_expr(left), selector_to_expr(right)),
        Predicate::Gt(left, right) => Expr::gt(selector_to_expr(left), selector_to_expr(right)),
        Predicate::Lt(left, right) => Expr::lt(selector_to_expr(left), selector_to_expr(right)),
        Predicate::Uninterpreted { name, args } => Expr::Function {
            name: name.clone(),
            ty: RelType::leaf(BaseType::Bool),
            args: args.iter().map(selector_to_expr).collect(),
        },
    }
}
