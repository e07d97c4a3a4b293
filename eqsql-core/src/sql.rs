//! SQL-level query algebra.
//!
//! An abstract, dialect-agnostic representation of relational queries:
//! selects over labelled sources, unions, excepts, joins, and distinct.
//! All algebras here are closed enums, so case analysis is exhaustive at
//! compile time. Type invariants are checked eagerly by the constructors
//! that can violate them; rendering never fails.

use crate::{
    error::TypeError,
    types::{ConstValue, RelType},
    usr::is_operator,
};
use itertools::Itertools as _;
use std::fmt;

/// A name binding a source inside a `FROM` list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub ty: RelType,
}

impl Label {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: RelType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A base relation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub ty: RelType,
}

impl Table {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: RelType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A named function with declared input and output types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Functional {
    pub name: String,
    pub inputs: Vec<RelType>,
    pub output: RelType,
}

/// Something a label can bind: a base table or a sub-query. Nesting a
/// labelled source inside another label is unrepresentable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Relational {
    Table(Table),
    Query(Box<Query>),
}

impl Relational {
    pub fn ty(&self) -> Result<RelType, TypeError> {
        match self {
            Relational::Table(table) => Ok(table.ty.clone()),
            Relational::Query(query) => query.ty(),
        }
    }
}

/// A relation bound to a name; label and relation types must agree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Labelled {
    label: Label,
    relational: Relational,
}

impl Labelled {
    pub fn new(label: Label, relational: Relational) -> Result<Self, TypeError> {
        let found = relational.ty()?;
        if label.ty != found {
            return Err(TypeError::TypeMismatch {
                expected: label.ty,
                found,
            });
        }
        Ok(Self { label, relational })
    }

    #[must_use]
    pub fn label(&self) -> &Label {
        &self.label
    }
    #[must_use]
    pub fn relational(&self) -> &Relational {
        &self.relational
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Select {
    pub selectors: Vec<Selector>,
    pub from: Vec<Labelled>,
    pub where_clause: Predicate,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Query {
    Select(Select),
    Union(Box<Query>, Box<Query>),
    Except(Box<Query>, Box<Query>),
    Join {
        left: Box<Query>,
        right: Box<Query>,
        on: Predicate,
    },
    Distinct(Box<Query>),
}

impl Query {
    pub fn union(left: Query, right: Query) -> Result<Query, TypeError> {
        let expected = left.ty()?;
        let found = right.ty()?;
        if expected != found {
            return Err(TypeError::TypeMismatch { expected, found });
        }
        Ok(Query::Union(Box::new(left), Box::new(right)))
    }

    pub fn except(left: Query, right: Query) -> Result<Query, TypeError> {
        let expected = left.ty()?;
        let found = right.ty()?;
        if expected != found {
            return Err(TypeError::TypeMismatch { expected, found });
        }
        Ok(Query::Except(Box::new(left), Box::new(right)))
    }

    #[must_use]
    pub fn join(left: Query, right: Query, on: Predicate) -> Query {
        Query::Join {
            left: Box::new(left),
            right: Box::new(right),
            on,
        }
    }

    #[must_use]
    pub fn distinct(inner: Query) -> Query {
        Query::Distinct(Box::new(inner))
    }

    /// The row type. Selects fold their selector types into a right-nested
    /// pair, matching the projection chains the translations build.
    pub fn ty(&self) -> Result<RelType, TypeError> {
        match self {
            Query::Select(select) => {
                let tys: Vec<RelType> = select
                    .selectors
                    .iter()
                    .map(Selector::ty)
                    .collect::<Result<_, _>>()?;
                tys.into_iter()
                    .rev()
                    .reduce(|acc, ty| RelType::pair(ty, acc))
                    .ok_or(TypeError::InvalidType)
            }
            Query::Union(left, _) | Query::Except(left, _) => left.ty(),
            Query::Join { left, right, .. } => Ok(RelType::pair(left.ty()?, right.ty()?)),
            Query::Distinct(inner) => inner.ty(),
        }
    }

    /// Canonical dialect-agnostic rendering.
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selector {
    LeftProj(Box<Selector>),
    RightProj(Box<Selector>),
    TableProj(Table),
    Const(ConstValue),
    Func {
        fun: Functional,
        args: Vec<Selector>,
    },
}

impl Selector {
    /// Project the left half of a pair-typed selector.
    pub fn left_proj(inner: Selector) -> Result<Selector, TypeError> {
        inner.ty()?.left()?;
        Ok(Selector::LeftProj(Box::new(inner)))
    }

    /// Project the right half of a pair-typed selector.
    pub fn right_proj(inner: Selector) -> Result<Selector, TypeError> {
        inner.ty()?.right()?;
        Ok(Selector::RightProj(Box::new(inner)))
    }

    /// Apply a named function; argument types must match its declared inputs.
    pub fn func(fun: Functional, args: Vec<Selector>) -> Result<Selector, TypeError> {
        if fun.inputs.len() != args.len() {
            return Err(TypeError::InvalidType);
        }
        for (expected, arg) in fun.inputs.iter().zip(&args) {
            let found = arg.ty()?;
            if *expected != found {
                return Err(TypeError::TypeMismatch {
                    expected: expected.clone(),
                    found,
                });
            }
        }
        Ok(Selector::Func { fun, args })
    }

    pub fn ty(&self) -> Result<RelType, TypeError> {
        match self {
            Selector::LeftProj(inner) => Ok(inner.ty()?.left()?.clone()),
            Selector::RightProj(inner) => Ok(inner.ty()?.right()?.clone()),
            Selector::TableProj(table) => Ok(table.ty.clone()),
            Selector::Const(value) => Ok(value.ty()),
            Selector::Func { fun, .. } => Ok(fun.output.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    True,
    False,
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Eq(Selector, Selector),
    Gt(Selector, Selector),
    Lt(Selector, Selector),
    Uninterpreted { name: String, args: Vec<Selector> },
}

impl Predicate {
    #[must_use]
    pub fn and(left: Predicate, right: Predicate) -> Predicate {
        Predicate::And(Box::new(left), Box::new(right))
    }
    #[must_use]
    pub fn or(left: Predicate, right: Predicate) -> Predicate {
        Predicate::Or(Box::new(left), Box::new(right))
    }
    #[must_use]
    pub fn not(inner: Predicate) -> Predicate {
        Predicate::Not(Box::new(inner))
    }
}

fn fmt_query(query: &Query, f: &mut fmt::Formatter<'_>, distinct: bool) -> fmt::Result {
    match query {
        Query::Select(select) => write!(
            f,
            "SELECT {}{} FROM {} WHERE {}",
            if distinct { "DISTINCT " } else { "" },
            select.selectors.iter().join(", "),
            select.from.iter().join(", "),
            select.where_clause,
        ),
        Query::Union(left, right) => write!(f, "{left} UNION {right}"),
        Query::Except(left, right) => write!(f, "{left} EXCEPT {right}"),
        Query::Join { left, right, on } => write!(f, "{left} JOIN {right} ON {on}"),
        Query::Distinct(inner) => fmt_query(inner, f, true),
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_query(self, f, false)
    }
}

impl fmt::Display for Labelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relational {
            Relational::Table(table) => write!(f, "({} AS {})", table.name, self.label.name),
            Relational::Query(query) => write!(f, "({query} AS {})", self.label.name),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::LeftProj(inner) => write!(f, "{inner}.left"),
            Selector::RightProj(inner) => write!(f, "{inner}.right"),
            Selector::TableProj(table) => f.write_str(&table.name),
            Selector::Const(value) => write!(f, "{value}"),
            Selector::Func { fun, args } => write!(f, "{}({})", fun.name, args.iter().join(", ")),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::True => f.write_str("TRUE"),
            Predicate::False => f.write_str("FALSE"),
            Predicate::And(left, right) => write!(f, "({left} AND {right})"),
            Predicate::Or(left, right) => write!(f, "({left} OR {right})"),
            Predicate::Not(inner) => write!(f, "(NOT {inner})"),
            Predicate::Eq(left, right) => write!(f, "({left} = {right})"),
            Predicate::Gt(left, right) => write!(f, "({left} > {right})"),
            Predicate::Lt(left, right) => write!(f, "({left} < {right})"),
            Predicate::Uninterpreted { name, args } if args.len() == 2 && is_operator(name) => {
                write!(f, "({} {name} {})", args[0], args[1])
            }
            Predicate::Uninterpreted { name, args } => {
                write!(f, "{name}({})", args.iter().join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Label, Labelled, Predicate, Query, Relational, Select, Selector, Table};
    use crate::{
        error::TypeError,
        types::{BaseType, ConstValue, RelType},
    };

    fn int() -> RelType {
        RelType::leaf(BaseType::Int)
    }
    fn pair_int_int() -> RelType {
        RelType::pair(int(), int())
    }

    fn simple_select() -> Query {
        let table = Table::new("t", pair_int_int());
        let labelled = Labelled::new(
            Label::new("t0", pair_int_int()),
            Relational::Table(table.clone()),
        )
        .unwrap();
        let x = Selector::left_proj(Selector::TableProj(Table::new("t0", pair_int_int()))).unwrap();
        let a = Selector::right_proj(Selector::TableProj(Table::new("t0", pair_int_int()))).unwrap();
        Query::Select(Select {
            selectors: vec![x],
            from: vec![labelled],
            where_clause: Predicate::Gt(a, Selector::Const(ConstValue::Int(5))),
        })
    }

    #[test]
    fn labelled_requires_matching_types() {
        let err = Labelled::new(
            Label::new("t0", int()),
            Relational::Table(Table::new("t", pair_int_int())),
        );
        assert_eq!(
            err,
            Err(TypeError::TypeMismatch {
                expected: int(),
                found: pair_int_int(),
            })
        );
    }

    #[test]
    fn projections_require_pair_types() {
        let scalar = Selector::TableProj(Table::new("t0", int()));
        assert_eq!(Selector::left_proj(scalar), Err(TypeError::InvalidType));
    }

    #[test]
    fn union_requires_matching_row_types() {
        let q = simple_select();
        Query::union(q.clone(), q.clone()).unwrap();
        let wider = Query::Select(Select {
            selectors: vec![
                Selector::Const(ConstValue::Int(1)),
                Selector::Const(ConstValue::Int(2)),
            ],
            from: vec![],
            where_clause: Predicate::True,
        });
        assert!(matches!(
            Query::union(q, wider),
            Err(TypeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn select_row_type_is_right_nested() {
        let sel = Query::Select(Select {
            selectors: vec![
                Selector::Const(ConstValue::Int(1)),
                Selector::Const(ConstValue::Bool(true)),
                Selector::Const(ConstValue::Int(2)),
            ],
            from: vec![],
            where_clause: Predicate::True,
        });
        assert_eq!(
            sel.ty().unwrap(),
            RelType::pair(
                int(),
                RelType::pair(RelType::leaf(BaseType::Bool), int())
            )
        );
    }

    #[test]
    fn render_select() {
        assert_eq!(
            simple_select().render(),
            "SELECT t0.left FROM (t AS t0) WHERE (t0.right > 5)"
        );
    }

    #[test]
    fn render_distinct_folds_into_select() {
        let q = Query::distinct(simple_select());
        assert_eq!(
            q.render(),
            "SELECT DISTINCT t0.left FROM (t AS t0) WHERE (t0.right > 5)"
        );
    }

    #[test]
    fn render_union_and_join() {
        let q = simple_select();
        let union = Query::union(q.clone(), q.clone()).unwrap();
        assert_eq!(
            union.render(),
            "SELECT t0.left FROM (t AS t0) WHERE (t0.right > 5) \
             UNION SELECT t0.left FROM (t AS t0) WHERE (t0.right > 5)"
        );
        let join = Query::join(q.clone(), q, Predicate::True);
        assert_eq!(
            join.render(),
            "SELECT t0.left FROM (t AS t0) WHERE (t0.right > 5) \
             JOIN SELECT t0.left FROM (t AS t0) WHERE (t0.right > 5) ON TRUE"
        );
    }
}
