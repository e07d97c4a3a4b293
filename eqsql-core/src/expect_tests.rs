//! End-to-end scenarios: deconstruct, saturate, reconstruct, render.

use crate::{
    deconstruct::Deconstruct,
    egraph::EGraph,
    reconstruct::reconstruct,
    rules::{between_split, semiring_rules},
    sql::{Label, Labelled, Predicate, Query, Relational, Select, Selector, Table},
    types::{BaseType, ConstValue, RelType},
    usr::Lambda,
};
use expect_test::expect;
use itertools::Itertools as _;

fn logging() {
    // a second init (from another test) is fine to ignore
    let _init = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn int() -> RelType {
    RelType::leaf(BaseType::Int)
}
fn row() -> RelType {
    RelType::pair(int(), int())
}
fn t0() -> Table {
    Table::new("t0", row())
}
fn source() -> Labelled {
    Labelled::new(Label::new("t0", row()), Relational::Table(Table::new("t", row()))).unwrap()
}
fn col_x() -> Selector {
    Selector::left_proj(Selector::TableProj(t0())).unwrap()
}
fn col_a() -> Selector {
    Selector::right_proj(Selector::TableProj(t0())).unwrap()
}

/// `SELECT x FROM t WHERE a BETWEEN 1 AND 5`, with BETWEEN as the
/// uninterpreted predicate the dialect oracles hand over.
fn between_query() -> Query {
    Query::Select(Select {
        selectors: vec![col_x()],
        from: vec![source()],
        where_clause: Predicate::Uninterpreted {
            name: "between".to_string(),
            args: vec![
                col_a(),
                Selector::Const(ConstValue::Int(1)),
                Selector::Const(ConstValue::Int(5)),
            ],
        },
    })
}

#[test]
fn between_query_deconstructs_to_a_multiplicity_lambda() {
    let lambda = Deconstruct::new().translate(&between_query()).unwrap();
    expect![[r#"fn x_1. (((x_1 = t0.left) * t(t0)) * between(t0.right, 1, 5))"#]]
        .assert_eq(&lambda.to_string());
}

#[test]
fn between_splits_into_a_comparison_conjunction() {
    logging();
    let lambda = Deconstruct::new().translate(&between_query()).unwrap();
    let mut egraph = EGraph::new(&lambda.clone().into_expr());
    egraph.saturate(&[between_split()], 8).unwrap();

    let rendered: Vec<String> = egraph
        .generate(16)
        .iter()
        .filter_map(Lambda::from_expr)
        .map(|alternative| reconstruct(&alternative.self_applied()).unwrap().render())
        .sorted()
        .collect();
    expect![[r#"
        SELECT t0.left FROM (t AS t0) WHERE ((1 <= t0.right) AND (t0.right <= 5))
        SELECT t0.left FROM (t AS t0) WHERE between(t0.right, 1, 5)"#]]
    .assert_eq(&rendered.iter().join("\n"));

    // the split branch is exactly the <= conjunction, structurally
    let split = egraph
        .generate(16)
        .iter()
        .filter_map(Lambda::from_expr)
        .map(|alternative| reconstruct(&alternative.self_applied()).unwrap())
        .find_map(|query| match query {
            Query::Select(select) => match &select.where_clause {
                Predicate::And(..) => Some(select),
                _ => None,
            },
            _ => None,
        })
        .unwrap();
    let expected = Predicate::and(
        Predicate::Uninterpreted {
            name: "<=".to_string(),
            args: vec![Selector::Const(ConstValue::Int(1)), col_a()],
        },
        Predicate::Uninterpreted {
            name: "<=".to_string(),
            args: vec![col_a(), Selector::Const(ConstValue::Int(5))],
        },
    );
    assert_eq!(split.where_clause, expected);
}

#[test]
fn commuted_alternatives_reconstruct_to_the_same_select() {
    let query = Query::Select(Select {
        selectors: vec![col_x()],
        from: vec![source()],
        where_clause: Predicate::Gt(col_a(), Selector::Const(ConstValue::Int(5))),
    });
    let lambda = Deconstruct::new().translate(&query).unwrap();
    let mut egraph = EGraph::new(&lambda.clone().into_expr());
    egraph.saturate(&semiring_rules(), 4).unwrap();

    let rendered: Vec<String> = egraph
        .generate(32)
        .iter()
        .filter_map(Lambda::from_expr)
        .map(|alternative| reconstruct(&alternative.self_applied()).unwrap().render())
        .collect();
    assert!(rendered.len() > 1, "saturation should add alternatives");
    // reordering multiplicative factors never changes the reconstruction
    assert!(
        rendered
            .iter()
            .all(|r| r == "SELECT t0.left FROM (t AS t0) WHERE (t0.right > 5)"),
        "got: {rendered:?}"
    );
}

#[test]
fn union_of_selects_survives_the_full_pipeline() {
    let base = Query::Select(Select {
        selectors: vec![col_x()],
        from: vec![source()],
        where_clause: Predicate::Gt(col_a(), Selector::Const(ConstValue::Int(5))),
    });
    let other = Query::Select(Select {
        selectors: vec![col_x()],
        from: vec![source()],
        where_clause: Predicate::Lt(col_a(), Selector::Const(ConstValue::Int(2))),
    });
    let query = Query::union(base, other).unwrap();
    let lambda = Deconstruct::new().translate(&query).unwrap();
    let roundtripped = reconstruct(&lambda.self_applied()).unwrap();
    expect![[r#"
        SELECT t0.left FROM (t AS t0) WHERE (t0.right > 5) UNION SELECT t0.left FROM (t AS t0) WHERE (t0.right < 2)"#]]
    .assert_eq(&roundtripped.render());
}

#[test]
fn distinct_survives_the_full_pipeline() {
    let query = Query::distinct(Query::Select(Select {
        selectors: vec![col_x()],
        from: vec![source()],
        where_clause: Predicate::Gt(col_a(), Selector::Const(ConstValue::Int(5))),
    }));
    let lambda = Deconstruct::new().translate(&query).unwrap();
    let mut egraph = EGraph::new(&lambda.clone().into_expr());
    egraph.saturate(&semiring_rules(), 4).unwrap();
    let rendered: Vec<String> = egraph
        .generate(16)
        .iter()
        .filter_map(Lambda::from_expr)
        .map(|alternative| reconstruct(&alternative.self_applied()).unwrap().render())
        .collect();
    assert!(!rendered.is_empty());
    assert!(
        rendered.iter().all(|r| *r == query.render()),
        "got: {rendered:?}"
    );
}
