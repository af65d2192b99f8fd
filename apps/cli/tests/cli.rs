use std::io::{Cursor, Write};
use std::path::Path;
use std::process::{Command, Output};

use pretty_assertions::assert_eq;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>needle</w:t></w:r></w:p></w:body></w:document>"#;

fn write_fixture(path: &Path) {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
    for (name, bytes) in [
        ("[Content_Types].xml", &b"<?xml version=\"1.0\"?><Types/>"[..]),
        ("word/document.xml", DOCUMENT.as_bytes()),
        ("word/media/image1.png", &b"\x89PNG"[..]),
    ] {
        zip.start_file(name, options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    std::fs::write(path, zip.finish().unwrap().into_inner()).unwrap();
}

fn run(args: &[&str], storage: &Path) -> Output {
    let output = Command::new(env!("CARGO_BIN_EXE_ooxml-viewer"))
        .args(args)
        .arg("--storage-root")
        .arg(storage)
        .output()
        .expect("spawn ooxml-viewer");
    assert!(
        output.status.success(),
        "ooxml-viewer {args:?} failed\nstderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

#[test]
fn inspect_json_lists_parts() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = tmp.path().join("sample.docx");
    write_fixture(&archive);

    let output = run(
        &["inspect", archive.to_str().unwrap(), "--format", "json"],
        &tmp.path().join("storage"),
    );
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let parts: Vec<(&str, &str, &str)> = report["parts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| {
            (
                p["path"].as_str().unwrap(),
                p["status"].as_str().unwrap(),
                p["contentType"].as_str().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        parts,
        [
            (
                "[Content_Types].xml",
                "unchanged",
                "application/vnd.openxmlformats-package.content-types+xml"
            ),
            ("word/document.xml", "unchanged", "application/xml"),
            ("word/media/image1.png", "unchanged", "image/png"),
        ]
    );
}

#[test]
fn inspect_text_prints_the_tree() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = tmp.path().join("sample.docx");
    write_fixture(&archive);

    let output = run(&["inspect", archive.to_str().unwrap()], &tmp.path().join("storage"));
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().skip(1).collect();
    assert_eq!(lines[1], "  word/");
    assert!(lines[2].starts_with("    document.xml  "), "{stdout}");
    assert_eq!(lines[3], "    media/");
}

#[test]
fn extract_prints_the_formatted_part() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = tmp.path().join("sample.docx");
    write_fixture(&archive);

    let output = run(
        &["extract", archive.to_str().unwrap(), "/word/document.xml"],
        &tmp.path().join("storage"),
    );
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("\n  <w:body>\n"), "{stdout}");
    assert!(stdout.contains("<w:t>needle</w:t>"), "{stdout}");
}

#[test]
fn search_reports_part_and_line() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = tmp.path().join("sample.docx");
    write_fixture(&archive);

    let output = run(
        &["search", archive.to_str().unwrap(), "needle"],
        &tmp.path().join("storage"),
    );
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        "word/document.xml:2: <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body><w:p><w:r><w:t>needle</w:t></w:r></w:p></w:body></w:document>\n"
    );
}

#[test]
fn missing_part_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = tmp.path().join("sample.docx");
    write_fixture(&archive);

    let output = Command::new(env!("CARGO_BIN_EXE_ooxml-viewer"))
        .args(["extract", archive.to_str().unwrap(), "word/missing.xml"])
        .arg("--storage-root")
        .arg(tmp.path().join("storage"))
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("word/missing.xml"));
}
