mod common;

use circuitry::{decoder, extract, printers, rules, serialize, OpKind, Runner};

use common::decoder_circuit;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The whole middle end, end to end: deserialize, saturate, extract, emit.
#[test]
fn optimize_then_emit() {
    init();
    let circ = decoder_circuit(&[(0x48, 1), (0x49, 1), (0x0f, 2)]);

    let mut bytes = Vec::new();
    serialize::serialize(&circ, &mut bytes).unwrap();
    let circ = serialize::deserialize(&mut bytes.as_slice()).unwrap();

    let (egraph, root) = extract::lower(&circ);
    let runner = Runner::default()
        .with_egraph(egraph)
        .with_root(root)
        .run(&rules::default_rules());
    assert!(runner.stop_reason.is_some());
    runner.egraph.assert_invariants();

    let optimized = extract::Extractor::new(&runner.egraph).extract(runner.egraph.find(root));
    assert_eq!(optimized[optimized.root()].kind, OpKind::Circuit);
    // nothing in a pure decode circuit is rewritable, so the shape survives
    assert_eq!(optimized.verify_instructions().len(), 3);

    let contexts = decoder::extract_contexts(&optimized).unwrap();
    let tree = decoder::build_tree(&contexts);
    let mut input = [0u8; 15];
    input[0] = 0x0f;
    assert_eq!(tree.decode(&contexts, &input), 2);
    input[0] = 0x07;
    assert_eq!(tree.decode(&contexts, &input), -1);

    let surface_printers: [fn(&circuitry::Circuit, &mut dyn std::io::Write) -> std::io::Result<()>;
        4] = [
        printers::print_dot,
        printers::print_smt,
        printers::print_json,
        printers::print_python,
    ];
    for printer in surface_printers {
        let mut out = Vec::new();
        printer(&optimized, &mut out).unwrap();
        assert!(!out.is_empty());
    }
}

/// Rewriting must not disturb what the decoder synthesizer sees.
#[test]
fn saturation_preserves_decode_semantics() {
    init();
    let circ = decoder_circuit(&[(0x90, 1), (0xc3, 1)]);
    let before = decoder::extract_contexts(&circ).unwrap();

    let (egraph, root) = extract::lower(&circ);
    let runner = Runner::default()
        .with_egraph(egraph)
        .with_root(root)
        .run(&rules::default_rules());
    let optimized = extract::Extractor::new(&runner.egraph).extract(runner.egraph.find(root));
    let after = decoder::extract_contexts(&optimized).unwrap();

    assert_eq!(before.len(), after.len());
    for byte in 0u16..=255 {
        let mut input = [0u8; 15];
        input[0] = byte as u8;
        let tree_before = decoder::build_tree(&before);
        let tree_after = decoder::build_tree(&after);
        assert_eq!(
            tree_before.decode(&before, &input),
            tree_after.decode(&after, &input)
        );
    }
}

/// Round-trip the optimized circuit and make sure the bytes are stable.
#[test]
fn serialization_survives_the_pipeline() {
    init();
    let circ = decoder_circuit(&[(0x48, 1), (0x0f, 2)]);
    let (egraph, root) = extract::lower(&circ);
    let runner = Runner::default()
        .with_egraph(egraph)
        .with_root(root)
        .run(&rules::default_rules());
    let optimized = extract::Extractor::new(&runner.egraph).extract(runner.egraph.find(root));

    let mut first = Vec::new();
    serialize::serialize(&optimized, &mut first).unwrap();
    let reread = serialize::deserialize(&mut first.as_slice()).unwrap();
    let mut second = Vec::new();
    serialize::serialize(&reread, &mut second).unwrap();
    assert_eq!(first, second);
}
