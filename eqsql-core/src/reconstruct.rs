//! Reconstruct SQL queries from semiring expressions.
//!
//! The inverse direction of [`crate::deconstruct`], partial by nature: the
//! input must be a lambda applied to an output variable, and its body must be
//! shaped like something a union of selects can express. The traversal
//! carries a polarity flag (flipped by `Not`) and a squash flag; `Mul` under
//! positive polarity accumulates conjunctively into one branch while `Add`
//! forks branches, and the two swap roles under negative polarity
//! (De Morgan). Each surviving branch becomes one `SELECT`; branches fold
//! into `UNION`.

use crate::{
    error::{Error, Result},
    sql,
    types::{BaseType, RelType},
    usr::{Expr, Var},
};
use std::collections::{BTreeMap, BTreeSet};
use std::mem;

pub fn reconstruct(expr: &Expr) -> Result<sql::Query> {
    tracing::trace!("reconstructing {expr}");
    let Expr::App(fun, _arg) = expr else {
        return Err(Error::MalformedTopLevel);
    };
    let Expr::Lambda(var, body) = fun.as_ref() else {
        return Err(Error::MalformedTopLevel);
    };
    let tree = accumulate(
        body,
        Builder::new(var.clone()),
        Flags {
            positive: true,
            squashed: false,
        },
    )?;
    tree.into_query()
}

#[derive(Copy, Clone)]
struct Flags {
    positive: bool,
    squashed: bool,
}

/// The branches of the traversal; each leaf independently becomes a `SELECT`
/// and the tree folds into `UNION`.
enum Branches {
    Leaf(Builder),
    Fork(Box<Branches>, Box<Branches>),
}

impl Branches {
    fn leaf(builder: Builder) -> Result<Branches> {
        Ok(Branches::Leaf(builder))
    }

    /// Continue every leaf of this tree with `f` (conjunctive sequencing).
    fn and_then(self, f: &mut impl FnMut(Builder) -> Result<Branches>) -> Result<Branches> {
        match self {
            Branches::Leaf(builder) => f(builder),
            Branches::Fork(left, right) => Ok(Branches::Fork(
                Box::new(left.and_then(f)?),
                Box::new(right.and_then(f)?),
            )),
        }
    }

    fn into_query(self) -> Result<sql::Query> {
        match self {
            Branches::Leaf(builder) => builder.into_query(),
            Branches::Fork(left, right) => {
                Ok(sql::Query::union(left.into_query()?, right.into_query()?)?)
            }
        }
    }
}

fn accumulate(expr: &Expr, mut ctx: Builder, flags: Flags) -> Result<Branches> {
    match expr {
        Expr::One => Branches::leaf(if flags.positive { ctx } else { ctx.killed() }),
        Expr::Zero => Branches::leaf(if flags.positive { ctx.killed() } else { ctx }),
        Expr::Mul(left, right) => {
            if flags.positive {
                accumulate(left, ctx, flags)?.and_then(&mut |c| accumulate(right, c, flags))
            } else {
                Ok(Branches::Fork(
                    Box::new(accumulate(left, ctx.clone(), flags)?),
                    Box::new(accumulate(right, ctx, flags)?),
                ))
            }
        }
        Expr::Add(left, right) => {
            if flags.positive {
                Ok(Branches::Fork(
                    Box::new(accumulate(left, ctx.clone(), flags)?),
                    Box::new(accumulate(right, ctx, flags)?),
                ))
            } else {
                accumulate(left, ctx, flags)?.and_then(&mut |c| accumulate(right, c, flags))
            }
        }
        Expr::Not(inner) => accumulate(
            inner,
            ctx,
            Flags {
                positive: !flags.positive,
                ..flags
            },
        ),
        Expr::Squash(inner) => accumulate(
            inner,
            ctx,
            Flags {
                squashed: true,
                ..flags
            },
        ),
        // the bound variable does not constrain the accumulation
        Expr::USum(_, inner) => accumulate(inner, ctx, flags),
        Expr::App(_, arg) => {
            if !flags.positive {
                return Err(Error::IllFormedQuery("negated relation source"));
            }
            ctx.assign_source(arg.as_ref().clone(), expr.clone(), flags.squashed);
            Branches::leaf(ctx)
        }
        Expr::Relation { arg, .. } => {
            if !flags.positive {
                return Err(Error::IllFormedQuery("negated relation source"));
            }
            ctx.assign_source(arg.as_ref().clone(), expr.clone(), flags.squashed);
            Branches::leaf(ctx)
        }
        Expr::Predicate { name, args } if name == "=" && args.len() == 2 && flags.positive => {
            // an equality against a projection of the output row is a
            // selector binding, not a WHERE constraint
            if projects(&args[0], &ctx.top_var) {
                ctx.assign_selector(&args[0], args[1].clone())?;
                Branches::leaf(ctx)
            } else if projects(&args[1], &ctx.top_var) {
                ctx.assign_selector(&args[1], args[0].clone())?;
                Branches::leaf(ctx)
            } else {
                ctx.add_constraint(expr.clone(), flags.positive);
                Branches::leaf(ctx)
            }
        }
        Expr::Predicate { .. } => {
            ctx.add_constraint(expr.clone(), flags.positive);
            Branches::leaf(ctx)
        }
        Expr::Function { ty, .. } if *ty == RelType::leaf(BaseType::Bool) => {
            ctx.add_constraint(expr.clone(), flags.positive);
            Branches::leaf(ctx)
        }
        Expr::Var(_)
        | Expr::Const(_)
        | Expr::Left(_)
        | Expr::Right(_)
        | Expr::Lambda(..)
        | Expr::Function { .. } => Err(Error::IllFormedQuery("raw value in constraint position")),
    }
}

/// Does this expression project (a component of) the given output variable?
fn projects(expr: &Expr, var: &Var) -> bool {
    match expr {
        Expr::Var(v) => v.name == var.name,
        Expr::Left(inner) | Expr::Right(inner) => projects(inner, var),
        _ => false,
    }
}

/// Partial assignment of selector values to projection paths of the output
/// row.
#[derive(Clone, Debug)]
enum SelTree {
    Unassigned,
    Assigned(Expr),
    Node(Box<SelTree>, Box<SelTree>),
}

impl SelTree {
    fn intersect(left: SelTree, right: SelTree) -> Result<SelTree> {
        match (left, right) {
            (SelTree::Unassigned, tree) | (tree, SelTree::Unassigned) => Ok(tree),
            (SelTree::Node(ll, lr), SelTree::Node(rl, rr)) => Ok(SelTree::Node(
                Box::new(SelTree::intersect(*ll, *rl)?),
                Box::new(SelTree::intersect(*lr, *rr)?),
            )),
            (SelTree::Assigned(a), SelTree::Assigned(b)) => {
                if a == b {
                    Ok(SelTree::Assigned(a))
                } else {
                    Err(Error::InconsistentSelectors)
                }
            }
            (SelTree::Assigned(_), SelTree::Node(..))
            | (SelTree::Node(..), SelTree::Assigned(_)) => Err(Error::InconsistentSelectors),
        }
    }

    fn collapse(self) -> Vec<Expr> {
        match self {
            SelTree::Unassigned => Vec::new(),
            SelTree::Assigned(expr) => vec![expr],
            SelTree::Node(left, right) => {
                let mut out = left.collapse();
                out.extend(right.collapse());
                out
            }
        }
    }
}

/// Per-branch accumulation state.
#[derive(Clone, Debug)]
struct Builder {
    top_var: Var,
    /// Set when the branch multiplies in an unconditional zero.
    dead: bool,
    selector: SelTree,
    /// Row variable of each source, mapped to the `Relation`/`App` providing
    /// it (`Squash`-wrapped when reached under an active squash).
    sources: BTreeMap<Expr, Expr>,
    constraints: BTreeSet<Expr>,
}

impl Builder {
    fn new(top_var: Var) -> Self {
        Self {
            top_var,
            dead: false,
            selector: SelTree::Unassigned,
            sources: BTreeMap::new(),
            constraints: BTreeSet::new(),
        }
    }

    fn killed(mut self) -> Self {
        self.dead = true;
        self
    }

    fn assign_source(&mut self, at: Expr, provider: Expr, squashed: bool) {
        let provider = if squashed {
            Expr::squash(provider)
        } else {
            provider
        };
        self.sources.insert(at, provider);
    }

    fn assign_selector(&mut self, at: &Expr, value: Expr) -> Result<()> {
        let path = sel_path(at, SelTree::Assigned(value))
            .ok_or(Error::IllFormedQuery("selector path is not a projection chain"))?;
        let current = mem::replace(&mut self.selector, SelTree::Unassigned);
        self.selector = SelTree::intersect(current, path)?;
        Ok(())
    }

    fn add_constraint(&mut self, expr: Expr, positive: bool) {
        let expr = if positive { expr } else { Expr::not(expr) };
        self.constraints.insert(expr);
    }

    fn into_query(self) -> Result<sql::Query> {
        if self.dead {
            return Err(Error::IllFormedQuery("branch with zero multiplicity"));
        }
        let selectors = self
            .selector
            .collapse()
            .into_iter()
            .map(to_sql_selector)
            .collect::<Result<Vec<_>>>()?;

        let squashed = self
            .sources
            .values()
            .filter(|v| matches!(v, Expr::Squash(_)))
            .count();
        let distinct = !self.sources.is_empty() && squashed == self.sources.len();
        if squashed > 0 && !distinct {
            return Err(Error::IllFormedQuery("partially squashed sources"));
        }

        let mut from = Vec::with_capacity(self.sources.len());
        for (at, provider) in &self.sources {
            let Expr::Var(var) = at else {
                return Err(Error::IllFormedQuery("source bound to a non-variable"));
            };
            let label = sql::Label::new(var.name.clone(), var.ty.clone());
            let inner = match provider {
                Expr::Squash(inner) => inner.as_ref(),
                other => other,
            };
            let relational = match inner {
                Expr::Relation { name, ty, .. } => {
                    sql::Relational::Table(sql::Table::new(name.clone(), ty.clone()))
                }
                other => sql::Relational::Query(Box::new(reconstruct(other)?)),
            };
            from.push(sql::Labelled::new(label, relational)?);
        }

        let where_clause = self
            .constraints
            .iter()
            .map(to_sql_pred)
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .reduce(sql::Predicate::and)
            .ok_or(Error::NoConstraints)?;

        let select = sql::Query::Select(sql::Select {
            selectors,
            from,
            where_clause,
        });
        Ok(if distinct {
            sql::Query::distinct(select)
        } else {
            select
        })
    }
}

/// Build the selector-tree path for a projection chain, inside-out: the
/// chain `t.right.left` lands the value at `Node(_, Node(value, _))`.
fn sel_path(at: &Expr, acc: SelTree) -> Option<SelTree> {
    match at {
        Expr::Var(_) => Some(acc),
        Expr::Left(inner) => sel_path(
            inner,
            SelTree::Node(Box::new(acc), Box::new(SelTree::Unassigned)),
        ),
        Expr::Right(inner) => sel_path(
            inner,
            SelTree::Node(Box::new(SelTree::Unassigned), Box::new(acc)),
        ),
        _ => None,
    }
}

fn to_sql_selector(expr: Expr) -> Result<sql::Selector> {
    match expr {
        Expr::Var(var) => Ok(sql::Selector::TableProj(sql::Table::new(var.name, var.ty))),
        Expr::Left(inner) => Ok(sql::Selector::left_proj(to_sql_selector(*inner)?)?),
        Expr::Right(inner) => Ok(sql::Selector::right_proj(to_sql_selector(*inner)?)?),
        Expr::Const(value) => Ok(sql::Selector::Const(value)),
        Expr::Function { name, ty, args } => {
            let args = args
                .into_iter()
                .map(to_sql_selector)
                .collect::<Result<Vec<_>>>()?;
            let inputs = args
                .iter()
                .map(sql::Selector::ty)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let fun = sql::Functional {
                name,
                inputs,
                output: ty,
            };
            Ok(sql::Selector::func(fun, args)?)
        }
        _ => Err(Error::IllFormedQuery("expression is not a selector")),
    }
}

fn to_sql_pred(expr: &Expr) -> Result<sql::Predicate> {
    match expr {
        Expr::Zero => Ok(sql::Predicate::False),
        Expr::One => Ok(sql::Predicate::True),
        Expr::Add(left, right) => Ok(sql::Predicate::or(to_sql_pred(left)?, to_sql_pred(right)?)),
        Expr::Mul(left, right) => Ok(sql::Predicate::and(to_sql_pred(left)?, to_sql_pred(right)?)),
        Expr::Not(inner) => Ok(sql::Predicate::not(to_sql_pred(inner)?)),
        Expr::Predicate { name, args } if args.len() == 2 => {
            let left = to_sql_selector(args[0].clone())?;
            let right = to_sql_selector(args[1].clone())?;
            Ok(match name.as_str() {
                "=" => sql::Predicate::Eq(left, right),
                ">" => sql::Predicate::Gt(left, right),
                "<" => sql::Predicate::Lt(left, right),
                _ => sql::Predicate::Uninterpreted {
                    name: name.clone(),
                    args: vec![left, right],
                },
            })
        }
        Expr::Predicate { name, args } => Ok(sql::Predicate::Uninterpreted {
            name: name.clone(),
            args: args
                .iter()
                .map(|a| to_sql_selector(a.clone()))
                .collect::<Result<Vec<_>>>()?,
        }),
        Expr::Function { name, ty, args } if *ty == RelType::leaf(BaseType::Bool) => {
            Ok(sql::Predicate::Uninterpreted {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| to_sql_selector(a.clone()))
                    .collect::<Result<Vec<_>>>()?,
            })
        }
        _ => Err(Error::IllFormedQuery("expression is not a predicate")),
    }
}
