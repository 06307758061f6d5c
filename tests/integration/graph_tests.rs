//! End-to-end network construction, estimation and inference tests.

use beliefnet::{
    DataTable, EvalMode, Graph, InferenceError, NodeConfig, NodeId, Value,
};

/// cloudy feeding rain and sprinkler, both feeding grass: the classic
/// diamond. Its parent DAG is acyclic but its skeleton is not a tree.
fn diamond() -> (Graph, NodeId, NodeId, NodeId, NodeId) {
    let mut g = Graph::new();
    let cloudy = g.add_node("cloudy", NodeConfig::factor()).expect("add");
    let rain = g
        .add_node("rain", NodeConfig::factor().with_parents(&[cloudy]))
        .expect("add");
    let sprinkler = g
        .add_node("sprinkler", NodeConfig::factor().with_parents(&[cloudy]))
        .expect("add");
    let grass = g
        .add_node("grass", NodeConfig::factor().with_parents(&[rain, sprinkler]))
        .expect("add");
    for id in [cloudy, rain, sprinkler, grass] {
        g.define(id).expect("define");
    }

    set_binary_prior(&mut g, cloudy, "cloudy", 0.5);
    set_binary_cpt(&mut g, rain, "rain", "cloudy", &[(false, 0.2), (true, 0.8)]);
    set_binary_cpt(
        &mut g,
        sprinkler,
        "sprinkler",
        "cloudy",
        &[(false, 0.5), (true, 0.1)],
    );

    let mut cpt = g.node(grass).unwrap().table().unwrap().clone();
    for (r, s, p_wet) in [
        (false, false, 0.0),
        (false, true, 0.9),
        (true, false, 0.9),
        (true, true, 0.99),
    ] {
        cpt.set_weight(
            &[
                ("grass", Value::Bool(true)),
                ("rain", Value::Bool(r)),
                ("sprinkler", Value::Bool(s)),
            ],
            p_wet,
        )
        .unwrap();
        cpt.set_weight(
            &[
                ("grass", Value::Bool(false)),
                ("rain", Value::Bool(r)),
                ("sprinkler", Value::Bool(s)),
            ],
            1.0 - p_wet,
        )
        .unwrap();
    }
    g.set_table(grass, cpt).expect("grass cpt");

    (g, cloudy, rain, sprinkler, grass)
}

fn set_binary_prior(g: &mut Graph, id: NodeId, name: &str, p_true: f64) {
    let mut prior = g.node(id).unwrap().table().unwrap().clone();
    prior
        .set_weight(&[(name, Value::Bool(false))], 1.0 - p_true)
        .unwrap();
    prior.set_weight(&[(name, Value::Bool(true))], p_true).unwrap();
    g.set_table(id, prior).expect("prior");
}

fn set_binary_cpt(g: &mut Graph, id: NodeId, name: &str, parent: &str, rows: &[(bool, f64)]) {
    let mut cpt = g.node(id).unwrap().table().unwrap().clone();
    for (parent_value, p_true) in rows {
        cpt.set_weight(
            &[(name, Value::Bool(true)), (parent, Value::Bool(*parent_value))],
            *p_true,
        )
        .unwrap();
        cpt.set_weight(
            &[
                (name, Value::Bool(false)),
                (parent, Value::Bool(*parent_value)),
            ],
            1.0 - *p_true,
        )
        .unwrap();
    }
    g.set_table(id, cpt).expect("cpt");
}

#[test]
fn diamond_posterior_matches_hand_computation() {
    let (g, _cloudy, rain, _sprinkler, grass) = diamond();

    // P(rain=t) = 0.5*0.2 + 0.5*0.8 = 0.5.
    // P(grass=t, rain=t) = sum over cloudy, sprinkler:
    //   cloudy=f: 0.5 * 0.2 * (0.5*0.9 + 0.5*0.99)
    //   cloudy=t: 0.5 * 0.8 * (0.9*0.9 + 0.1*0.99)
    let wet_and_rain = 0.5 * 0.2 * (0.5 * 0.9 + 0.5 * 0.99) + 0.5 * 0.8 * (0.9 * 0.9 + 0.1 * 0.99);
    // P(grass=t, rain=f) analogous with the rain=f emission row.
    let wet_and_dry = 0.5 * 0.8 * (0.5 * 0.0 + 0.5 * 0.9) + 0.5 * 0.2 * (0.9 * 0.0 + 0.1 * 0.9);
    let expected = wet_and_rain / (wet_and_rain + wet_and_dry);

    let posterior = g
        .query(&[rain], &[(grass, Value::Bool(true))])
        .expect("posterior");
    let p = posterior
        .weight_for(&[("rain", Value::Bool(true))])
        .expect("weight");
    assert!((p - expected).abs() < 1e-12, "got {p}, expected {expected}");
}

#[test]
fn elimination_handles_the_diamond_but_propagation_rejects_it() {
    let (mut g, _cloudy, rain, _sprinkler, grass) = diamond();

    assert!(g.query(&[rain], &[(grass, Value::Bool(true))]).is_ok());
    let err = g.solve(EvalMode::SumProduct).unwrap_err();
    assert!(matches!(err, InferenceError::CyclicDependency(_)));
}

#[test]
fn chain_beliefs_match_elimination_marginals_at_every_node() {
    let mut g = Graph::new();
    let a = g.add_node("a", NodeConfig::factor()).expect("add");
    let b = g
        .add_node("b", NodeConfig::factor().with_parents(&[a]))
        .expect("add");
    let c = g
        .add_node("c", NodeConfig::factor().with_parents(&[b]))
        .expect("add");
    for id in [a, b, c] {
        g.define(id).expect("define");
    }
    set_binary_prior(&mut g, a, "a", 0.3);
    set_binary_cpt(&mut g, b, "b", "a", &[(false, 0.25), (true, 0.75)]);
    set_binary_cpt(&mut g, c, "c", "b", &[(false, 0.4), (true, 0.9)]);

    g.observe(c, Value::Bool(true)).expect("observe");
    let report = g.solve(EvalMode::SumProduct).expect("solve");
    assert_eq!(report.components, 1);
    assert_eq!(report.messages_passed, 4);

    for (id, name) in [(a, "a"), (b, "b")] {
        let belief = g.belief(id).expect("belief");
        let marginal = g
            .query(&[id], &[(c, Value::Bool(true))])
            .expect("elimination");
        for value in [false, true] {
            let lookup = [(name, Value::Bool(value))];
            let solved = belief.weight_for(&lookup).unwrap();
            let eliminated = marginal.weight_for(&lookup).unwrap();
            assert!(
                (solved - eliminated).abs() < 1e-12,
                "belief mismatch at {name}={value}"
            );
        }
    }
}

#[test]
fn estimated_conditionals_drive_queries() {
    let mut g = Graph::new();
    let mood = g
        .add_node(
            "mood",
            NodeConfig::factor().with_values(&[Value::label("good"), Value::label("bad")]),
        )
        .expect("add");
    let coffee = g
        .add_node("coffee", NodeConfig::factor().with_parents(&[mood]))
        .expect("add");
    g.define(mood).expect("define");
    g.define(coffee).expect("define");

    let mut data = DataTable::new(&["mood", "coffee"]).expect("data");
    let rows = [
        ("good", true),
        ("good", true),
        ("good", true),
        ("good", false),
        ("bad", true),
        ("bad", false),
        ("bad", false),
        ("bad", false),
    ];
    for (mood_value, had_coffee) in rows {
        data.push_row(vec![Value::label(mood_value), Value::Bool(had_coffee)])
            .expect("row");
    }
    g.set_conditionals_all(&data).expect("estimate");

    // Counting gives P(coffee=t | good) = 3/4 and P(coffee=t | bad) = 1/4;
    // the mood prior estimated from the same data is uniform.
    let posterior = g
        .query(&[mood], &[(coffee, Value::Bool(true))])
        .expect("posterior");
    let good = posterior
        .weight_for(&[("mood", Value::label("good"))])
        .expect("weight");
    assert!((good - 0.75).abs() < 1e-12);
}

#[test]
fn quantized_observations_feed_inference() {
    let mut g = Graph::new();
    let level = g
        .add_node(
            "level",
            NodeConfig::factor().with_values(&[Value::Int(0), Value::Int(1), Value::Int(2)]),
        )
        .expect("add");
    let alarm = g
        .add_node("alarm", NodeConfig::factor().with_parents(&[level]))
        .expect("add");
    g.define(level).expect("define");
    g.define(alarm).expect("define");

    let mut prior = g.node(level).unwrap().table().unwrap().clone();
    for (value, p) in [(0, 0.6), (1, 0.3), (2, 0.1)] {
        prior.set_weight(&[("level", Value::Int(value))], p).unwrap();
    }
    g.set_table(level, prior).expect("prior");

    let mut cpt = g.node(alarm).unwrap().table().unwrap().clone();
    for (value, p_alarm) in [(0, 0.01), (1, 0.2), (2, 0.95)] {
        cpt.set_weight(
            &[("alarm", Value::Bool(true)), ("level", Value::Int(value))],
            p_alarm,
        )
        .unwrap();
        cpt.set_weight(
            &[("alarm", Value::Bool(false)), ("level", Value::Int(value))],
            1.0 - p_alarm,
        )
        .unwrap();
    }
    g.set_table(alarm, cpt).expect("cpt");

    // A raw reading of 1.8 quantizes to level 2 and pins the belief there.
    let snapped = g.quantize(level, 1.8).expect("quantize");
    assert_eq!(snapped, Value::Int(2));
    g.solve(EvalMode::SumProduct).expect("solve");
    let alarm_belief = g.belief(alarm).expect("belief");
    let ringing = alarm_belief
        .weight_for(&[("alarm", Value::Bool(true))])
        .expect("weight");
    assert!((ringing - 0.95).abs() < 1e-12);
}

#[test]
fn results_survive_a_failed_call() {
    let (g, _cloudy, rain, sprinkler, grass) = diamond();

    // A malformed order fails without touching the graph.
    let err = g.eliminate(&[rain], &[], &[sprinkler]).unwrap_err();
    assert!(matches!(err, InferenceError::IncompleteEliminationOrder(_)));

    // The same graph still answers a well-formed query.
    let posterior = g
        .query(&[rain], &[(grass, Value::Bool(true))])
        .expect("query after failure");
    assert!((posterior.total() - 1.0).abs() < 1e-12);
}
