//! Factor-algebra behavior exercised through the public API.

use beliefnet::{EvalMode, FactorTable, InferenceError, TableVar, Value};

fn weather_domain() -> Vec<Value> {
    vec![
        Value::label("sunny"),
        Value::label("cloudy"),
        Value::label("rainy"),
    ]
}

#[test]
fn multiplication_is_associative_up_to_row_order() {
    let bools = [Value::Bool(false), Value::Bool(true)];
    let ab = FactorTable::from_weights(
        vec![TableVar::new("a", &bools), TableVar::new("b", &bools)],
        vec![0.2, 0.8, 0.5, 0.5],
    )
    .expect("ab");
    let bc = FactorTable::from_weights(
        vec![TableVar::new("b", &bools), TableVar::new("c", &bools)],
        vec![0.9, 0.1, 0.4, 0.6],
    )
    .expect("bc");
    let ca = FactorTable::from_weights(
        vec![TableVar::new("c", &bools), TableVar::new("a", &bools)],
        vec![0.3, 0.7, 0.6, 0.4],
    )
    .expect("ca");

    let left_first = ab.multiply(&bc).and_then(|t| t.multiply(&ca)).expect("(ab*bc)*ca");
    let right_first = ab.multiply(&bc.multiply(&ca).expect("bc*ca")).expect("ab*(bc*ca)");

    assert_eq!(left_first.num_rows(), right_first.num_rows());
    for (assignment, weight) in left_first.iter_rows() {
        let lookup: Vec<(&str, Value)> = assignment
            .iter()
            .map(|(n, v)| (n.as_ref(), v.clone()))
            .collect();
        let other = right_first.weight_for(&lookup).expect("row");
        assert!((weight - other).abs() < 1e-12);
    }
}

#[test]
fn label_domains_restrict_and_normalize() {
    let table = FactorTable::from_weights(
        vec![
            TableVar::new("weather", &weather_domain()),
            TableVar::new("umbrella", &[Value::Bool(false), Value::Bool(true)]),
        ],
        vec![0.55, 0.05, 0.25, 0.15, 0.05, 0.45],
    )
    .expect("table");

    let rainy = table
        .sub_table(&[("weather", Value::label("rainy"))])
        .expect("restrict");
    assert_eq!(rainy.vars()[0].domain.len(), 1);
    let dist = rainy
        .marginalize("weather", EvalMode::SumProduct)
        .and_then(|t| t.normalized(&[]))
        .expect("distribution");
    let carries = dist
        .weight_for(&[("umbrella", Value::Bool(true))])
        .expect("weight");
    assert!((carries - 0.9).abs() < 1e-12);
}

#[test]
fn conditional_normalization_survives_multiplication() {
    let bools = [Value::Bool(false), Value::Bool(true)];
    let joint = FactorTable::from_weights(
        vec![TableVar::new("x", &bools), TableVar::new("y", &bools)],
        vec![3.0, 1.0, 2.0, 2.0],
    )
    .expect("table");

    let conditional = joint.normalized(&["x"]).expect("p(y|x)");
    // Multiplying by a prior over x and summing x out reproduces a proper
    // marginal over y.
    let prior = FactorTable::from_weights(vec![TableVar::new("x", &bools)], vec![0.5, 0.5])
        .expect("prior");
    let marginal = prior
        .multiply(&conditional)
        .and_then(|t| t.marginalize("x", EvalMode::SumProduct))
        .expect("marginal");
    assert!((marginal.total() - 1.0).abs() < 1e-12);
    let y_true = marginal
        .weight_for(&[("y", Value::Bool(true))])
        .expect("weight");
    assert!((y_true - (0.5 * 0.25 + 0.5 * 0.5)).abs() < 1e-12);
}

#[test]
fn errors_carry_the_offending_variable() {
    let err = FactorTable::uniform(vec![TableVar::new("empty", &[])]).unwrap_err();
    match err {
        InferenceError::InvalidDomain(name) => assert_eq!(name, "empty"),
        other => panic!("unexpected error: {other}"),
    }
}
