use std::ffi::OsString;
use std::fs;
use std::path::Path;

use super::*;
use crate::code::CodeNode;
use crate::types::LinkPhase;

fn write_module(dir: &Path, file_name: &str, code: CodeNode) -> OsString {
    let path = dir.join(file_name);
    let module = ObjectModule::new(file_name.to_string(), code).expect("small module");
    write_object_file(&module, &path).expect("should be able to write the object file");
    path.into_os_string()
}

fn call(target: &str) -> CodeNode {
    CodeNode::seq(CodeNode::bytes([23]), CodeNode::reference(target))
}

#[test]
fn link_two_object_files() {
    let dir = tempfile::tempdir().expect("should be able to create a temporary directory");
    let inputs = vec![
        write_module(dir.path(), "main.o", CodeNode::sequence(vec![call("helper"), CodeNode::bytes([0])])),
        write_module(dir.path(), "helper.o", CodeNode::seq(CodeNode::label("helper"), CodeNode::bytes([1]))),
    ];
    let output = dir.path().join("prog.bin");
    link_files(&inputs, &output, LinkOptions::default()).expect("link should succeed");
    assert_eq!(
        fs::read(&output).expect("output should exist"),
        vec![23, 4, 0, 0, 1]
    );
}

#[test]
fn module_names_come_from_file_names() {
    let dir = tempfile::tempdir().expect("should be able to create a temporary directory");
    let input = write_module(dir.path(), "lib.o", CodeNode::label("entry"));
    let module = read_object_file(&input).expect("valid object file");
    assert_eq!(module.name(), "lib.o");
}

#[test]
fn failed_link_writes_nothing() {
    let dir = tempfile::tempdir().expect("should be able to create a temporary directory");
    let inputs = vec![
        write_module(dir.path(), "a.o", CodeNode::label("main")),
        write_module(dir.path(), "b.o", CodeNode::label("main")),
    ];
    let output = dir.path().join("prog.bin");
    match link_files(&inputs, &output, LinkOptions::default()) {
        Err(LinkerFailure::Link(failure)) => {
            assert_eq!(failure.phase(), Some(LinkPhase::Merge));
        }
        other => panic!("expected a link failure, got {other:?}"),
    }
    assert!(!output.exists());
}

#[test]
fn malformed_manifests_are_reported_together() {
    let dir = tempfile::tempdir().expect("should be able to create a temporary directory");
    let first = dir.path().join("first.o");
    let second = dir.path().join("second.o");
    fs::write(&first, b"SYMTAB:\n\tx Q 1\n\nB\x00\x00").expect("should be able to write");
    fs::write(&second, b"SYMTAB:\n\tok D 0\n\tnot a symbol\n\nB\x00\x00").expect("should be able to write");
    let inputs = vec![first.into_os_string(), second.into_os_string()];
    match link_files(&inputs, &dir.path().join("out"), LinkOptions::default()) {
        Err(LinkerFailure::Link(failure)) => {
            assert_eq!(failure.phase(), Some(LinkPhase::Load));
            let places: Vec<(&str, usize)> = failure
                .errors()
                .iter()
                .map(|e| match e {
                    LinkError::MalformedManifest {
                        module,
                        line_number,
                        ..
                    } => (module.as_str(), *line_number),
                    other => panic!("unexpected error {other:?}"),
                })
                .collect();
            assert_eq!(places, vec![("first.o", 1), ("second.o", 2)]);
        }
        other => panic!("expected a load failure, got {other:?}"),
    }
}

#[test]
fn missing_input_is_an_io_error() {
    let dir = tempfile::tempdir().expect("should be able to create a temporary directory");
    let missing = dir.path().join("missing.o").into_os_string();
    match link_files(&[missing], &dir.path().join("out"), LinkOptions::default()) {
        Err(LinkerFailure::Io(IoFailed { action, .. })) => {
            assert_eq!(action, IoAction::Read);
        }
        other => panic!("expected an I/O failure, got {other:?}"),
    }
}

#[test]
fn garbage_input_is_not_an_object_file() {
    let dir = tempfile::tempdir().expect("should be able to create a temporary directory");
    let path = dir.path().join("garbage.o");
    fs::write(&path, b"\x7fELF").expect("should be able to write");
    assert!(matches!(
        read_object_file(path.as_os_str()),
        Err(LinkerFailure::BadObjectFile { .. })
    ));
}

#[test]
fn partial_link_writes_an_object_file() {
    let dir = tempfile::tempdir().expect("should be able to create a temporary directory");
    let inputs = vec![
        write_module(dir.path(), "a.o", CodeNode::sequence(vec![call("g"), CodeNode::label("f")])),
        write_module(dir.path(), "b.o", CodeNode::sequence(vec![CodeNode::label("g"), call("f")])),
    ];
    let combined = dir.path().join("ab.o");
    link_files(
        &inputs,
        &combined,
        LinkOptions {
            map: false,
            partial: true,
        },
    )
    .expect("partial link should succeed");
    let module = read_object_file(combined.as_os_str()).expect("valid object file");
    assert_eq!(module.name(), "ab.o");
    assert!(module.code().is_deferred());

    let output = dir.path().join("prog.bin");
    link_files(&[combined.into_os_string()], &output, LinkOptions::default())
        .expect("final link should succeed");
    assert_eq!(
        fs::read(&output).expect("output should exist"),
        vec![23, 3, 0, 23, 3, 0]
    );
}
