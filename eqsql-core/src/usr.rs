//! The semiring expression language.
//!
//! A query's meaning is a function from an output row to the multiplicity of
//! that row in the result. The language is point-free apart from explicit
//! tuple variables: a commutative semiring (`One`/`Zero`/`Add`/`Mul`),
//! set-collapse (`Squash`), existential summation (`USum`), lambdas over row
//! variables, and named relations/predicates/functions as semiring-valued
//! atoms.
//!
//! Expressions are immutable value trees. Structural equality is derived and
//! alpha-oblivious: `sum x. R(x)` and `sum y. R(y)` are distinct terms.

use crate::{
    error::{Error, Result},
    types::{ConstValue, RelType},
};
use itertools::Itertools as _;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

/// A named tuple variable.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Var {
    pub name: String,
    pub ty: RelType,
}

impl Var {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: RelType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Substitution from variables to replacement expressions.
pub type Subst = BTreeMap<Var, Expr>;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Expr {
    /// Multiplicative identity; the predicate TRUE.
    One,
    /// Additive identity; the predicate FALSE.
    Zero,
    Var(Var),
    Const(ConstValue),
    /// Left projection of a pair-typed expression.
    Left(Box<Expr>),
    /// Right projection of a pair-typed expression.
    Right(Box<Expr>),
    /// Semiring multiplication: AND, bag join. Order is retained in the
    /// representation; commutativity is a rewrite rule, not a structural fact.
    Mul(Box<Expr>, Box<Expr>),
    /// Semiring addition: OR, bag union.
    Add(Box<Expr>, Box<Expr>),
    /// Negation; defined only on 0/1-valued operands.
    Not(Box<Expr>),
    /// Collapse a bag multiplicity to a set multiplicity (DISTINCT).
    Squash(Box<Expr>),
    /// Bag-sum the body over all bindings of the variable.
    USum(Var, Box<Expr>),
    Lambda(Var, Box<Expr>),
    App(Box<Expr>, Box<Expr>),
    /// Multiplicity of row `arg` in the named base relation.
    Relation {
        name: String,
        ty: RelType,
        arg: Box<Expr>,
    },
    /// Named boolean operator over expressions. The comparisons `=`, `>`,
    /// `<` are predicates with those names.
    Predicate { name: String, args: Vec<Expr> },
    /// Named value-producing operator with a declared result type.
    Function {
        name: String,
        ty: RelType,
        args: Vec<Expr>,
    },
}

impl Expr {
    #[must_use]
    pub fn mul(l: Expr, r: Expr) -> Expr {
        Expr::Mul(Box::new(l), Box::new(r))
    }
    #[must_use]
    pub fn add(l: Expr, r: Expr) -> Expr {
        Expr::Add(Box::new(l), Box::new(r))
    }
    #[must_use]
    pub fn not(e: Expr) -> Expr {
        Expr::Not(Box::new(e))
    }
    #[must_use]
    pub fn squash(e: Expr) -> Expr {
        Expr::Squash(Box::new(e))
    }
    #[must_use]
    pub fn left(e: Expr) -> Expr {
        Expr::Left(Box::new(e))
    }
    #[must_use]
    pub fn right(e: Expr) -> Expr {
        Expr::Right(Box::new(e))
    }
    #[must_use]
    pub fn usum(var: Var, body: Expr) -> Expr {
        Expr::USum(var, Box::new(body))
    }
    #[must_use]
    pub fn equal(l: Expr, r: Expr) -> Expr {
        Expr::Predicate {
            name: "=".to_string(),
            args: vec![l, r],
        }
    }
    #[must_use]
    pub fn gt(l: Expr, r: Expr) -> Expr {
        Expr::Predicate {
            name: ">".to_string(),
            args: vec![l, r],
        }
    }
    #[must_use]
    pub fn lt(l: Expr, r: Expr) -> Expr {
        Expr::Predicate {
            name: "<".to_string(),
            args: vec![l, r],
        }
    }
    #[must_use]
    pub fn le(l: Expr, r: Expr) -> Expr {
        Expr::Predicate {
            name: "<=".to_string(),
            args: vec![l, r],
        }
    }

    /// Immediate children, binder variables included (a `USum`/`Lambda`
    /// counts its variable as a child, which is what lets the e-graph
    /// represent binders as plain labelled nodes).
    #[must_use]
    pub fn children(&self) -> Vec<Expr> {
        match self {
            Expr::One | Expr::Zero | Expr::Var(_) | Expr::Const(_) => Vec::new(),
            Expr::Left(inner)
            | Expr::Right(inner)
            | Expr::Not(inner)
            | Expr::Squash(inner) => vec![inner.as_ref().clone()],
            Expr::Mul(l, r) | Expr::Add(l, r) | Expr::App(l, r) => {
                vec![l.as_ref().clone(), r.as_ref().clone()]
            }
            Expr::USum(var, inner) | Expr::Lambda(var, inner) => {
                vec![Expr::Var(var.clone()), inner.as_ref().clone()]
            }
            Expr::Relation { arg, .. } => vec![arg.as_ref().clone()],
            Expr::Predicate { args, .. } | Expr::Function { args, .. } => args.clone(),
        }
    }

    /// Capture-avoiding substitution. Variables absent from `subst` are left
    /// in place; a binder shadows any incoming binding for its own variable.
    #[must_use]
    pub fn substituted(&self, subst: &Subst) -> Expr {
        match self {
            Expr::One | Expr::Zero | Expr::Const(_) => self.clone(),
            Expr::Var(v) => subst.get(v).cloned().unwrap_or_else(|| self.clone()),
            Expr::Left(inner) => Expr::left(inner.substituted(subst)),
            Expr::Right(inner) => Expr::right(inner.substituted(subst)),
            Expr::Mul(l, r) => Expr::mul(l.substituted(subst), r.substituted(subst)),
            Expr::Add(l, r) => Expr::add(l.substituted(subst), r.substituted(subst)),
            Expr::Not(inner) => Expr::not(inner.substituted(subst)),
            Expr::Squash(inner) => Expr::squash(inner.substituted(subst)),
            Expr::USum(var, inner) => {
                Expr::USum(var.clone(), Box::new(Self::under_binder(var, inner, subst)))
            }
            Expr::Lambda(var, inner) => {
                Expr::Lambda(var.clone(), Box::new(Self::under_binder(var, inner, subst)))
            }
            Expr::App(fun, arg) => Expr::App(
                Box::new(fun.substituted(subst)),
                Box::new(arg.substituted(subst)),
            ),
            Expr::Relation { name, ty, arg } => Expr::Relation {
                name: name.clone(),
                ty: ty.clone(),
                arg: Box::new(arg.substituted(subst)),
            },
            Expr::Predicate { name, args } => Expr::Predicate {
                name: name.clone(),
                args: args.iter().map(|a| a.substituted(subst)).collect(),
            },
            Expr::Function { name, ty, args } => Expr::Function {
                name: name.clone(),
                ty: ty.clone(),
                args: args.iter().map(|a| a.substituted(subst)).collect(),
            },
        }
    }

    fn under_binder(var: &Var, body: &Expr, subst: &Subst) -> Expr {
        if subst.contains_key(var) {
            let mut narrowed = subst.clone();
            narrowed.remove(var);
            body.substituted(&narrowed)
        } else {
            body.substituted(subst)
        }
    }

    /// Strict substitution for rewrite-rule right-hand sides: every free
    /// variable of `self` must be covered by `subst`, otherwise the rule was
    /// applied with an under-covering match.
    pub fn instantiated(&self, subst: &Subst) -> Result<Expr> {
        self.instantiate_inner(subst, &mut BTreeSet::new())
    }

    fn instantiate_inner(&self, subst: &Subst, bound: &mut BTreeSet<Var>) -> Result<Expr> {
        Ok(match self {
            Expr::One | Expr::Zero | Expr::Const(_) => self.clone(),
            Expr::Var(v) => {
                if bound.contains(v) {
                    self.clone()
                } else {
                    subst
                        .get(v)
                        .cloned()
                        .ok_or_else(|| Error::UnboundVariable(v.name.clone()))?
                }
            }
            Expr::Left(inner) => Expr::left(inner.instantiate_inner(subst, bound)?),
            Expr::Right(inner) => Expr::right(inner.instantiate_inner(subst, bound)?),
            Expr::Mul(l, r) => Expr::mul(
                l.instantiate_inner(subst, bound)?,
                r.instantiate_inner(subst, bound)?,
            ),
            Expr::Add(l, r) => Expr::add(
                l.instantiate_inner(subst, bound)?,
                r.instantiate_inner(subst, bound)?,
            ),
            Expr::Not(inner) => Expr::not(inner.instantiate_inner(subst, bound)?),
            Expr::Squash(inner) => Expr::squash(inner.instantiate_inner(subst, bound)?),
            Expr::USum(var, inner) => {
                let fresh = bound.insert(var.clone());
                let body = inner.instantiate_inner(subst, bound)?;
                if fresh {
                    bound.remove(var);
                }
                Expr::USum(var.clone(), Box::new(body))
            }
            Expr::Lambda(var, inner) => {
                let fresh = bound.insert(var.clone());
                let body = inner.instantiate_inner(subst, bound)?;
                if fresh {
                    bound.remove(var);
                }
                Expr::Lambda(var.clone(), Box::new(body))
            }
            Expr::App(fun, arg) => Expr::App(
                Box::new(fun.instantiate_inner(subst, bound)?),
                Box::new(arg.instantiate_inner(subst, bound)?),
            ),
            Expr::Relation { name, ty, arg } => Expr::Relation {
                name: name.clone(),
                ty: ty.clone(),
                arg: Box::new(arg.instantiate_inner(subst, bound)?),
            },
            Expr::Predicate { name, args } => Expr::Predicate {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| a.instantiate_inner(subst, bound))
                    .collect::<Result<_>>()?,
            },
            Expr::Function { name, ty, args } => Expr::Function {
                name: name.clone(),
                ty: ty.clone(),
                args: args
                    .iter()
                    .map(|a| a.instantiate_inner(subst, bound))
                    .collect::<Result<_>>()?,
            },
        })
    }
}

pub(crate) fn is_operator(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| !c.is_alphanumeric() && c != '_')
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::One => f.write_str("1"),
            Expr::Zero => f.write_str("0"),
            Expr::Var(v) => write!(f, "{v}"),
            Expr::Const(c) => write!(f, "{c}"),
            Expr::Left(inner) => write!(f, "{inner}.left"),
            Expr::Right(inner) => write!(f, "{inner}.right"),
            Expr::Mul(l, r) => write!(f, "({l} * {r})"),
            Expr::Add(l, r) => write!(f, "({l} + {r})"),
            Expr::Not(inner) => write!(f, "not({inner})"),
            Expr::Squash(inner) => write!(f, "squash({inner})"),
            Expr::USum(var, inner) => write!(f, "sum {var}. {inner}"),
            Expr::Lambda(var, inner) => write!(f, "fn {var}. {inner}"),
            Expr::App(fun, arg) => write!(f, "({fun})({arg})"),
            Expr::Relation { name, arg, .. } => write!(f, "{name}({arg})"),
            Expr::Predicate { name, args } if args.len() == 2 && is_operator(name) => {
                write!(f, "({} {name} {})", args[0], args[1])
            }
            Expr::Predicate { name, args } | Expr::Function { name, args, .. } => {
                write!(f, "{name}({})", args.iter().join(", "))
            }
        }
    }
}

/// A lambda in callable form. `Deconstruct` returns this so callers can apply
/// the multiplicity function without re-matching the enum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lambda {
    pub var: Var,
    pub body: Expr,
}

impl Lambda {
    /// Beta-reduce: the body with the bound variable replaced by `arg`.
    #[must_use]
    pub fn eval(&self, arg: &Expr) -> Expr {
        let subst = Subst::from([(self.var.clone(), arg.clone())]);
        self.body.substituted(&subst)
    }

    /// The unreduced application `App(self, arg)`.
    #[must_use]
    pub fn applied(&self, arg: Expr) -> Expr {
        Expr::App(Box::new(self.clone().into_expr()), Box::new(arg))
    }

    /// The lambda applied to its own bound variable: the shape `reconstruct`
    /// expects at top level.
    #[must_use]
    pub fn self_applied(&self) -> Expr {
        let arg = Expr::Var(self.var.clone());
        self.applied(arg)
    }

    #[must_use]
    pub fn into_expr(self) -> Expr {
        Expr::Lambda(self.var, Box::new(self.body))
    }

    #[must_use]
    pub fn from_expr(expr: &Expr) -> Option<Lambda> {
        if let Expr::Lambda(var, body) = expr {
            Some(Lambda {
                var: var.clone(),
                body: body.as_ref().clone(),
            })
        } else {
            None
        }
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}. {}", self.var, self.body)
    }
}

/// Fresh-variable supply. Owned by whichever component translates, so
/// independent translations never share naming state.
#[derive(Clone, Debug, Default)]
pub struct VarSupply {
    next: u32,
}

impl VarSupply {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    pub fn fresh(&mut self, ty: RelType) -> Var {
        self.fresh_named("x", ty)
    }
    pub fn fresh_named(&mut self, stem: &str, ty: RelType) -> Var {
        self.next += 1;
        Var::new(format!("{stem}_{}", self.next), ty)
    }
}

#[cfg(test)]
mod tests {
    use super::{Expr, Lambda, Subst, Var, VarSupply};
    use crate::{
        error::Error,
        types::{BaseType, ConstValue, RelType},
    };
    use proptest::prelude::*;

    fn int() -> RelType {
        RelType::leaf(BaseType::Int)
    }
    fn var(name: &str) -> Var {
        Var::new(name, int())
    }
    fn cint(n: i64) -> Expr {
        Expr::Const(ConstValue::Int(n))
    }

    #[test]
    fn substitution_replaces_free_variables_only() {
        let body = Expr::mul(Expr::Var(var("x")), Expr::Var(var("y")));
        let subst = Subst::from([(var("x"), cint(1))]);
        assert_eq!(
            body.substituted(&subst),
            Expr::mul(cint(1), Expr::Var(var("y")))
        );
    }

    #[test]
    fn binders_shadow_the_substitution() {
        let subst = Subst::from([(var("x"), cint(1)), (var("y"), cint(2))]);
        let sum = Expr::usum(var("x"), Expr::mul(Expr::Var(var("x")), Expr::Var(var("y"))));
        assert_eq!(
            sum.substituted(&subst),
            Expr::usum(var("x"), Expr::mul(Expr::Var(var("x")), cint(2)))
        );
        // a lambda stays a lambda under substitution
        let lam = Expr::Lambda(var("x"), Box::new(Expr::Var(var("x"))));
        assert_eq!(lam.substituted(&subst), lam);
    }

    #[test]
    fn eval_beta_reduces() {
        let lam = Lambda {
            var: var("t"),
            body: Expr::equal(Expr::left(Expr::Var(var("t"))), cint(3)),
        };
        assert_eq!(
            lam.eval(&Expr::Var(var("u"))),
            Expr::equal(Expr::left(Expr::Var(var("u"))), cint(3))
        );
    }

    #[test]
    fn strict_instantiation_requires_coverage() {
        let rhs = Expr::mul(Expr::Var(var("x")), Expr::Var(var("y")));
        let subst = Subst::from([(var("x"), Expr::One)]);
        assert_eq!(
            rhs.instantiated(&subst),
            Err(Error::UnboundVariable("y".to_string()))
        );
        // binder-scoped variables are exempt
        let rhs = Expr::usum(var("y"), Expr::mul(Expr::Var(var("x")), Expr::Var(var("y"))));
        assert_eq!(
            rhs.instantiated(&subst),
            Ok(Expr::usum(
                var("y"),
                Expr::mul(Expr::One, Expr::Var(var("y")))
            ))
        );
    }

    #[test]
    fn fresh_variables_are_distinct() {
        let mut supply = VarSupply::new();
        let a = supply.fresh(int());
        let b = supply.fresh(int());
        assert_ne!(a, b);
        assert_eq!(a.name, "x_1");
        assert_eq!(b.name, "x_2");
    }

    #[test]
    fn display_is_compact() {
        let e = Expr::mul(
            Expr::equal(Expr::left(Expr::Var(var("t"))), cint(1)),
            Expr::Relation {
                name: "r".to_string(),
                ty: int(),
                arg: Box::new(Expr::Var(var("t"))),
            },
        );
        assert_eq!(e.to_string(), "((t.left = 1) * r(t))");
    }

    fn arb_expr() -> impl Strategy<Value = Expr> {
        let leaf = prop_oneof![
            Just(Expr::One),
            Just(Expr::Zero),
            prop_oneof![Just("x"), Just("y"), Just("z")]
                .prop_map(|name| Expr::Var(Var::new(name, RelType::leaf(BaseType::Int)))),
            any::<i64>().prop_map(|n| Expr::Const(ConstValue::Int(n))),
        ];
        leaf.prop_recursive(4, 32, 2, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::mul(l, r)),
                (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::add(l, r)),
                inner.clone().prop_map(Expr::not),
                inner.clone().prop_map(Expr::squash),
                (prop_oneof![Just("x"), Just("y")], inner).prop_map(|(name, body)| Expr::usum(
                    Var::new(name, RelType::leaf(BaseType::Int)),
                    body
                )),
            ]
        })
    }

    proptest! {
        #[test]
        fn empty_substitution_is_identity(e in arb_expr()) {
            prop_assert_eq!(e.substituted(&Subst::new()), e);
        }

        #[test]
        fn substitution_never_touches_bound_occurrences(e in arb_expr()) {
            // substituting x for itself is also an identity
            let subst = Subst::from([(
                Var::new("x", RelType::leaf(BaseType::Int)),
                Expr::Var(Var::new("x", RelType::leaf(BaseType::Int))),
            )]);
            prop_assert_eq!(e.substituted(&subst), e);
        }
    }
}
