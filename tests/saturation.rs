use circuitry::{parse_rules, CircNode, EGraph, Id, OpKind, Runner, UnionFind};
use log::*;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn union_find_smoke() {
    init();
    let mut uf = UnionFind::default();
    let ids: Vec<Id> = (0..4).map(|_| uf.make_set()).collect();
    assert_eq!(ids, (0..4).map(Id::from).collect::<Vec<_>>());

    uf.merge(ids[0], ids[1]);
    uf.merge(ids[2], ids[3]);
    uf.merge(ids[1], ids[2]);

    assert_eq!(uf.find(ids[0]), uf.find(ids[3]));
    let roots: Vec<Id> = ids.iter().copied().filter(|&i| uf.find(i) == i).collect();
    assert_eq!(roots.len(), 1);
}

#[test]
fn congruence_closes_over_merges() {
    init();
    let mut eg = EGraph::default();
    let a = eg.add(CircNode::leaf(OpKind::InputRegister("rax".into()), 64));
    let b = eg.add(CircNode::leaf(OpKind::InputRegister("rbx".into()), 64));
    let fa = eg.add(CircNode::new(OpKind::Popcount, 64, [a]));
    let fb = eg.add(CircNode::new(OpKind::Popcount, 64, [b]));
    assert_ne!(eg.find(fa), eg.find(fb));

    eg.merge(a, b);
    eg.rebuild();

    assert_eq!(eg.find(fa), eg.find(fb));
    eg.assert_invariants();
}

#[test]
fn constant_folding_keeps_both_forms() {
    init();
    let mut eg = EGraph::default();
    let five = eg.add(CircNode::constant(5, 64));
    let zero = eg.add(CircNode::constant(0, 64));
    let add = eg.add(CircNode::new(OpKind::Add, 64, [five, zero]));

    let rules = parse_rules("(rule (add ?x 0) ?x)").unwrap();
    let runner = Runner::default()
        .with_egraph(eg)
        .with_root(add)
        .with_iter_limit(1)
        .run(&rules);

    let eg = &runner.egraph;
    assert_eq!(eg.find(add), eg.find(five));
    // saturation never discards the left-hand side
    let top = eg.eclass(add);
    let kinds: Vec<&'static str> = top.iter().map(|n| n.kind.name()).collect();
    assert!(kinds.contains(&"add"));
    assert!(kinds.contains(&"const"));
    eg.assert_invariants();
}

#[test]
fn repeated_places_rewrite_to_zero() {
    init();
    let mut eg = EGraph::default();
    let a = eg.add(CircNode::leaf(OpKind::InputRegister("rax".into()), 64));
    let xor = eg.add(CircNode::new(OpKind::Xor, 64, [a, a]));

    let rules = parse_rules("(rule (xor ?x ?x) 0)").unwrap();
    let runner = Runner::default().with_egraph(eg).with_root(xor).run(&rules);
    assert!(runner.is_saturated());

    let eg = &runner.egraph;
    let top = eg.eclass(xor);
    let has_zero = top.iter().any(|n| n.constant_value() == Some(0));
    assert!(has_zero, "root class should contain const 0: {:?}", top);
}

#[test]
fn saturation_is_idempotent() {
    init();
    let mut eg = EGraph::default();
    let five = eg.add(CircNode::constant(5, 64));
    let zero = eg.add(CircNode::constant(0, 64));
    let add = eg.add(CircNode::new(OpKind::Add, 64, [five, zero]));
    let xor = eg.add(CircNode::new(OpKind::Xor, 64, [add, add]));

    let rules = parse_rules(
        "(rule (add ?x 0) ?x)\n\
         (rule (xor ?x ?x) 0)",
    )
    .unwrap();

    let runner = Runner::default().with_egraph(eg).with_root(xor).run(&rules);
    assert!(runner.is_saturated());
    let progress = runner.egraph.progress();

    // one more full run over the saturated graph merges nothing
    let rerun = Runner::default().with_egraph(runner.egraph).run(&rules);
    assert!(rerun.is_saturated());
    assert_eq!(rerun.egraph.progress(), progress);
    info!("saturated twice without new unions");
}

#[test]
fn confluent_rules_ignore_declaration_order() {
    init();
    let forward = "(rule (add ?x 0) ?x)\n(rule (or ?x 0) ?x)";
    let backward = "(rule (or ?x 0) ?x)\n(rule (add ?x 0) ?x)";

    let build = |rules_text: &str| {
        let mut eg = EGraph::default();
        let a = eg.add(CircNode::leaf(OpKind::InputRegister("rax".into()), 64));
        let zero = eg.add(CircNode::constant(0, 64));
        let add = eg.add(CircNode::new(OpKind::Add, 64, [a, zero]));
        let or = eg.add(CircNode::new(OpKind::Or, 64, [add, zero]));
        let rules = parse_rules(rules_text).unwrap();
        let runner = Runner::default().with_egraph(eg).with_root(or).run(&rules);
        assert!(runner.is_saturated());
        let eg = runner.egraph;
        (
            eg.number_of_classes(),
            eg.find(a) == eg.find(add),
            eg.find(a) == eg.find(or),
        )
    };

    assert_eq!(build(forward), build(backward));
}

#[test]
fn budget_exhaustion_returns_a_usable_graph() {
    init();
    let mut eg = EGraph::default();
    let a = eg.add(CircNode::leaf(OpKind::InputRegister("rax".into()), 64));
    let b = eg.add(CircNode::leaf(OpKind::InputRegister("rbx".into()), 64));
    let add = eg.add(CircNode::new(OpKind::Add, 64, [a, b]));

    // associativity-free commutativity saturates in two iterations, so force
    // the budget to trip first
    let rules = parse_rules("(rule (add ?x ?y) (add ?y ?x))").unwrap();
    let runner = Runner::default()
        .with_egraph(eg)
        .with_root(add)
        .with_iter_limit(1)
        .run(&rules);

    assert!(!runner.is_saturated());
    // the graph is still congruence-closed and queryable
    runner.egraph.assert_invariants();
    let flipped = {
        let mut eg = runner.egraph.clone();
        eg.add(CircNode::new(OpKind::Add, 64, [b, a]))
    };
    assert_eq!(runner.egraph.find(add), runner.egraph.find(flipped));
}

#[test]
fn stop_hook_is_honored_between_iterations() {
    init();
    let mut eg = EGraph::default();
    let a = eg.add(CircNode::leaf(OpKind::InputRegister("rax".into()), 64));
    let add = eg.add(CircNode::new(OpKind::Add, 64, [a, a]));
    let _ = add;

    let rules = parse_rules("(rule (add ?x ?y) (add ?y ?x))").unwrap();
    let runner = Runner::default()
        .with_egraph(eg)
        .with_hook(|_| Err("deadline".into()))
        .run(&rules);

    assert_eq!(
        runner.stop_reason,
        Some(circuitry::StopReason::Other("deadline".into()))
    );
    assert!(runner.iterations.is_empty());
}
