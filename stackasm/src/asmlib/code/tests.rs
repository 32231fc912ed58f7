use proptest::prelude::*;
use test_strategy::proptest;

use super::*;
use crate::symtab::Symbol;

fn name(s: &str) -> SymbolName {
    SymbolName::from(s)
}

fn offset_in(table: &Environment, s: &str) -> Option<i16> {
    table.get(&name(s)).and_then(Symbol::offset)
}

#[test]
fn forward_reference_is_resolved() {
    // call later; pop; later: ret
    let tree = CodeNode::sequence(vec![
        CodeNode::seq(CodeNode::bytes([23]), CodeNode::reference("later")),
        CodeNode::bytes([2]),
        CodeNode::label("later"),
        CodeNode::bytes([1]),
    ]);
    let mut table = Environment::new();
    assert_eq!(tree.measure(0, &mut table), Ok(5));
    assert_eq!(offset_in(&table, "later"), Some(4));
    let reduced = tree.reduce(&mut table, 0).expect("later is defined");
    assert_eq!(reduced.size, 5);
    assert_eq!(reduced.code, CodeNode::bytes([23, 4, 0, 2, 1]));
}

#[test]
fn definitions_are_offset_by_base() {
    let tree = CodeNode::seq(CodeNode::bytes([0, 0, 0]), CodeNode::label("x"));
    let mut table = Environment::new();
    assert_eq!(tree.measure(100, &mut table), Ok(3));
    assert_eq!(offset_in(&table, "x"), Some(103));
}

#[test]
fn negative_offsets_are_little_endian() {
    let mut table = Environment::new();
    table.set(name("x"), SymbolState::Defined(-2));
    let reduced = CodeNode::reference("x")
        .reduce(&mut table, 0)
        .expect("x is defined");
    assert_eq!(reduced.code, CodeNode::bytes([0xFE, 0xFF]));
}

#[test]
fn every_unresolved_reference_is_reported() {
    let tree = CodeNode::sequence(vec![
        CodeNode::reference("helper"),
        CodeNode::reference("known"),
        CodeNode::reference("other"),
    ]);
    let mut table = Environment::new();
    table.set(name("known"), SymbolState::Defined(0));
    table.set(name("other"), SymbolState::Undefined);
    assert_eq!(
        tree.reduce(&mut table, 0),
        Err(vec![
            CodeError::UnresolvedSymbol(name("helper")),
            CodeError::UnresolvedSymbol(name("other")),
        ])
    );
}

#[test]
fn definition_beyond_offset_range() {
    let tree = CodeNode::seq(CodeNode::bytes([0]), CodeNode::label("edge"));
    let mut table = Environment::new();
    assert_eq!(
        tree.measure(i16::MAX, &mut table),
        Err(CodeError::OffsetOutOfRange {
            name: name("edge"),
            offset: 32768,
        })
    );
}

#[test]
fn deferred_sequence_survives_reduction() {
    let inner = CodeNode::deferred(CodeNode::reference("a"), CodeNode::bytes([9]));
    let tree = CodeNode::seq(CodeNode::bytes([7]), inner.clone());
    let mut table = Environment::new();
    let reduced = tree.reduce(&mut table, 0).expect("deferred refs are not examined");
    assert_eq!(reduced.size, 4);
    assert_eq!(reduced.code, CodeNode::seq(CodeNode::bytes([7]), inner));
    assert!(reduced.code.is_deferred());
    assert_eq!(reduced.code.as_bytes(), None);
}

#[test]
fn released_tree_reduces_to_bytes() {
    let tree = CodeNode::deferred(
        CodeNode::seq(CodeNode::label("start"), CodeNode::bytes([1])),
        CodeNode::seq(CodeNode::bytes([23]), CodeNode::reference("start")),
    )
    .release_deferred();
    assert!(!tree.is_deferred());
    let mut table = Environment::new();
    tree.measure(0, &mut table).expect("small tree");
    let reduced = tree.reduce(&mut table, 0).expect("start is defined");
    assert_eq!(reduced.code.as_bytes(), Some([1u8, 23, 0, 0].as_slice()));
}

#[test]
fn empty_sequence() {
    assert_eq!(CodeNode::sequence(Vec::new()), CodeNode::bytes([]));
    assert_eq!(CodeNode::sequence(Vec::new()).size(), 0);
}

#[test]
fn sequence_is_balanced() {
    fn depth(node: &CodeNode) -> usize {
        match node {
            CodeNode::Bytes(_) | CodeNode::Ref(_) => 0,
            CodeNode::Def(_, inner) => 1 + depth(inner),
            CodeNode::Seq(a, b) | CodeNode::DeferredSeq(a, b) => 1 + depth(a).max(depth(b)),
        }
    }
    let tree = CodeNode::sequence((0..1024u16).map(|n| CodeNode::bytes([n as u8])).collect());
    assert_eq!(depth(&tree), 10);
    let mut table = Environment::new();
    let reduced = tree.reduce(&mut table, 0).expect("no references");
    let expected: Vec<u8> = (0..1024u16).map(|n| n as u8).collect();
    assert_eq!(reduced.code.as_bytes(), Some(expected.as_slice()));
}

#[test]
fn symbol_names_in_order_of_first_appearance() {
    let tree = CodeNode::sequence(vec![
        CodeNode::reference("b"),
        CodeNode::label("a"),
        CodeNode::reference("a"),
        CodeNode::label("b"),
        CodeNode::reference("c"),
    ]);
    assert_eq!(tree.symbol_names(), vec![name("b"), name("a"), name("c")]);
}

#[test]
fn symbol_names_of_a_large_tree() {
    // Every name is mentioned twice, once by reference and later by
    // definition.
    let count = 20_000;
    let mut leaves: Vec<CodeNode> = (0..count)
        .map(|n| CodeNode::reference(format!("s{n}").as_str()))
        .collect();
    leaves.extend((0..count).map(|n| CodeNode::label(format!("s{n}").as_str())));
    let names = CodeNode::sequence(leaves).symbol_names();
    assert_eq!(names.len(), count);
    assert_eq!(names.first(), Some(&name("s0")));
    assert_eq!(names.last(), Some(&name(&format!("s{}", count - 1))));
}

static NAMES: [&str; 4] = ["a", "b", "c", "d"];

fn code_name() -> impl Strategy<Value = SymbolName> {
    proptest::sample::select(&NAMES[..]).prop_map(SymbolName::from)
}

fn code_tree() -> impl Strategy<Value = CodeNode> {
    let leaf = prop_oneof![
        proptest::collection::vec(any::<u8>(), 0..8).prop_map(CodeNode::Bytes),
        code_name().prop_map(CodeNode::Ref),
    ];
    leaf.prop_recursive(5, 48, 2, |inner| {
        prop_oneof![
            (code_name(), inner.clone()).prop_map(|(n, c)| CodeNode::def(n, c)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| CodeNode::seq(a, b)),
            (inner.clone(), inner).prop_map(|(a, b)| CodeNode::deferred(a, b)),
        ]
    })
}

/// A table in which every name the generated trees can mention is
/// defined, so that reduction always succeeds.
fn full_table() -> Environment {
    let mut table = Environment::new();
    for n in NAMES {
        table.set(name(n), SymbolState::Defined(0));
    }
    table
}

#[proptest]
fn measurement_is_idempotent(
    #[strategy(code_tree())] tree: CodeNode,
    #[strategy(0..1000i16)] base: i16,
) {
    let mut once = Environment::new();
    let first = tree.measure(base, &mut once);
    let mut twice = once.clone();
    let second = tree.measure(base, &mut twice);
    assert_eq!(first, second);
    assert_eq!(once, twice);
}

#[proptest]
fn size_is_stable_across_passes(
    #[strategy(code_tree())] tree: CodeNode,
    #[strategy(0..1000i16)] base: i16,
) {
    let mut table = full_table();
    let measured = tree.measure(base, &mut table).expect("small tree");
    assert_eq!(measured, tree.size());
    let reduced = tree.reduce(&mut table, base).expect("all names are defined");
    assert_eq!(reduced.size, measured);
    assert_eq!(reduced.code.size(), measured);
    if let Some(bytes) = reduced.code.as_bytes() {
        assert_eq!(bytes.len(), measured);
    }
}

#[proptest]
fn released_tree_reduces_fully(#[strategy(code_tree())] tree: CodeNode) {
    let tree = tree.release_deferred();
    let mut table = full_table();
    tree.measure(0, &mut table).expect("small tree");
    let reduced = tree.reduce(&mut table, 0).expect("all names are defined");
    assert_eq!(reduced.code.as_bytes().map(<[u8]>::len), Some(tree.size()));
}

#[proptest]
fn deferred_reduction_is_identity(
    #[strategy(code_tree())] first: CodeNode,
    #[strategy(code_tree())] second: CodeNode,
) {
    let tree = CodeNode::deferred(first, second);
    let mut table = Environment::new();
    let reduced = tree.reduce(&mut table, 0).expect("deferred trees are not examined");
    assert_eq!(reduced.size, tree.size());
    assert_eq!(reduced.code, tree);
}

#[proptest]
fn label_offsets_are_monotonic(
    #[strategy(proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..6), 1..20))]
    chunks: Vec<Vec<u8>>,
    #[strategy(0..1000i16)] base: i16,
) {
    let labels: Vec<String> = (0..chunks.len()).map(|i| format!("l{i}")).collect();
    let tree = CodeNode::sequence(
        labels
            .iter()
            .zip(chunks.iter())
            .map(|(label, chunk)| CodeNode::def(label.as_str(), CodeNode::bytes(chunk.clone())))
            .collect(),
    );
    let mut table = Environment::new();
    tree.measure(base, &mut table).expect("small tree");
    let mut expected = base;
    for (label, chunk) in labels.iter().zip(chunks.iter()) {
        assert_eq!(offset_in(&table, label), Some(expected));
        expected += i16::try_from(chunk.len()).expect("short chunk");
    }
}
