//! Rewrite rules over semiring expressions.
//!
//! A rule is an opaque `(lhs, rhs)` pair; the e-graph imposes no further
//! structure on it. The stock set below covers the semiring laws the
//! language is expected to satisfy plus the predicate-splitting rules the
//! dialect oracles rely on.

use crate::{
    types::{BaseType, RelType},
    usr::{Expr, Var},
};

/// A rewrite rule: wherever `lhs` matches an equivalence class, `rhs` is
/// instantiated with the matched bindings and merged into that class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    pub name: &'static str,
    pub lhs: Expr,
    pub rhs: Expr,
}

impl Rule {
    #[must_use]
    pub fn new(name: &'static str, lhs: Expr, rhs: Expr) -> Self {
        Self { name, lhs, rhs }
    }
}

/// Pattern variables bind whole equivalence classes during matching; the
/// type they carry is a placeholder and never compared.
fn pvar(name: &str) -> Expr {
    Expr::Var(Var::new(name, RelType::leaf(BaseType::Null)))
}

/// The semiring identities: units, commutativity, associativity, squash
/// idempotence, double negation.
#[must_use]
pub fn semiring_rules() -> Vec<Rule> {
    let x = pvar;
    vec![
        Rule::new("mul-unit-left", Expr::mul(Expr::One, x("a")), x("a")),
        Rule::new("mul-unit-right", Expr::mul(x("a"), Expr::One), x("a")),
        Rule::new("add-unit-left", Expr::add(Expr::Zero, x("a")), x("a")),
        Rule::new("add-unit-right", Expr::add(x("a"), Expr::Zero), x("a")),
        Rule::new(
            "mul-commute",
            Expr::mul(x("a"), x("b")),
            Expr::mul(x("b"), x("a")),
        ),
        Rule::new(
            "add-commute",
            Expr::add(x("a"), x("b")),
            Expr::add(x("b"), x("a")),
        ),
        Rule::new(
            "mul-assoc",
            Expr::mul(Expr::mul(x("a"), x("b")), x("c")),
            Expr::mul(x("a"), Expr::mul(x("b"), x("c"))),
        ),
        Rule::new(
            "add-assoc",
            Expr::add(Expr::add(x("a"), x("b")), x("c")),
            Expr::add(x("a"), Expr::add(x("b"), x("c"))),
        ),
        Rule::new(
            "squash-squash",
            Expr::squash(Expr::squash(x("a"))),
            Expr::squash(x("a")),
        ),
        Rule::new("not-not", Expr::not(Expr::not(x("a"))), x("a")),
    ]
}

/// `between(e, lo, hi)` splits into the conjunction `lo <= e AND e <= hi`.
#[must_use]
pub fn between_split() -> Rule {
    let between = Expr::Function {
        name: "between".to_string(),
        ty: RelType::leaf(BaseType::Bool),
        args: vec![pvar("e"), pvar("lo"), pvar("hi")],
    };
    Rule::new(
        "between-split",
        between,
        Expr::mul(
            Expr::le(pvar("lo"), pvar("e")),
            Expr::le(pvar("e"), pvar("hi")),
        ),
    )
}

/// The full stock ruleset.
#[must_use]
pub fn standard_rules() -> Vec<Rule> {
    let mut rules = semiring_rules();
    rules.push(between_split());
    rules
}

#[cfg(test)]
mod tests {
    use super::{between_split, semiring_rules, standard_rules};
    use crate::{
        egraph::EGraph,
        types::{BaseType, ConstValue, RelType},
        usr::{Expr, Var},
    };

    fn v(name: &str) -> Expr {
        Expr::Var(Var::new(name, RelType::leaf(BaseType::Int)))
    }

    #[test]
    fn units_collapse_into_their_operand() {
        let rules = semiring_rules();
        for expr in [
            Expr::mul(Expr::One, v("a")),
            Expr::mul(v("a"), Expr::One),
            Expr::add(Expr::Zero, v("a")),
            Expr::add(v("a"), Expr::Zero),
        ] {
            let mut egraph = EGraph::new(&expr);
            egraph.saturate(&rules, 4).unwrap();
            assert_eq!(
                egraph.find(&expr),
                egraph.find(&v("a")),
                "{expr} should saturate into its operand"
            );
        }
    }

    #[test]
    fn squash_is_idempotent_up_to_saturation() {
        let doubled = Expr::squash(Expr::squash(v("a")));
        let mut egraph = EGraph::new(&doubled);
        egraph.saturate(&semiring_rules(), 4).unwrap();
        assert_eq!(egraph.find(&doubled), egraph.find(&Expr::squash(v("a"))));
    }

    #[test]
    fn double_negation_cancels_up_to_saturation() {
        let doubled = Expr::not(Expr::not(v("a")));
        let mut egraph = EGraph::new(&doubled);
        egraph.saturate(&semiring_rules(), 4).unwrap();
        assert_eq!(egraph.find(&doubled), egraph.find(&v("a")));
    }

    #[test]
    fn between_splits_into_le_conjunction() {
        let between = Expr::Function {
            name: "between".to_string(),
            ty: RelType::leaf(BaseType::Bool),
            args: vec![
                v("a"),
                Expr::Const(ConstValue::Int(1)),
                Expr::Const(ConstValue::Int(5)),
            ],
        };
        let mut egraph = EGraph::new(&between);
        egraph.saturate(&[between_split()], 4).unwrap();
        let split = Expr::mul(
            Expr::le(Expr::Const(ConstValue::Int(1)), v("a")),
            Expr::le(v("a"), Expr::Const(ConstValue::Int(5))),
        );
        assert_eq!(egraph.find(&between), egraph.find(&split));
    }

    #[test]
    fn standard_ruleset_terminates_on_a_small_body() {
        let body = Expr::mul(Expr::mul(Expr::One, v("a")), Expr::squash(v("b")));
        let mut egraph = EGraph::new(&body);
        let merges = egraph.saturate(&standard_rules(), 8).unwrap();
        assert!(merges > 0);
        assert_eq!(egraph.find(&body), egraph.find(&Expr::mul(v("a"), Expr::squash(v("b")))));
    }
}
