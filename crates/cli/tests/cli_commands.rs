use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

fn write_file(dir: &std::path::Path, name: &str, contents: &[u8]) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path.to_string_lossy().to_string()
}

#[test]
fn targets_lists_registered_pipelines() {
    cargo_bin_cmd!("disasm-facts")
        .arg("targets")
        .assert()
        .success()
        .stdout(predicate::str::contains("ELF/MIPS32/BE/32: disasm_mips32"))
        .stdout(predicate::str::contains("RAW/X64/LE/64: disasm_x64"));
}

#[test]
fn targets_json_is_parseable() {
    let output = cargo_bin_cmd!("disasm-facts")
        .args(["targets", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let body: serde_json::Value = serde_json::from_slice(&output).expect("targets json");
    let entries = body.as_array().expect("array");
    assert_eq!(entries.len(), 9);
    assert!(entries.iter().any(|e| e["program"] == "disasm_arm32"));
}

#[test]
fn facts_summarizes_raw_input() {
    let temp = tempdir().unwrap();
    // addiu sp, sp, -32; nop
    let binary = write_file(temp.path(), "code.bin", &[0x27, 0xBD, 0xFF, 0xE0, 0, 0, 0, 0]);

    let output = cargo_bin_cmd!("disasm-facts")
        .args(["facts", "--binary", &binary, "--raw", "--isa", "mips32", "--endian", "be"])
        .args(["--base", "0x8000", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let body: serde_json::Value = serde_json::from_slice(&output).expect("facts json");
    assert_eq!(body["program"], "disasm_mips32");
    assert_eq!(body["relations"]["instruction"], 2);
    assert_eq!(body["relations"]["binary_format"], 1);
    assert_eq!(body["relations"]["raw_entry"], 1);
    assert_eq!(body["target"]["format"], "Raw");
}

#[test]
fn facts_prints_text_summary() {
    let temp = tempdir().unwrap();
    let binary = write_file(temp.path(), "code.bin", &[0x90, 0xC3]);

    cargo_bin_cmd!("disasm-facts")
        .args(["facts", "--binary", &binary, "--raw", "--isa", "x64"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Program: disasm_x64"))
        .stdout(predicate::str::contains("instruction: 2"));
}

#[test]
fn facts_rejects_unsupported_raw_target() {
    let temp = tempdir().unwrap();
    let binary = write_file(temp.path(), "code.bin", &[0; 4]);

    cargo_bin_cmd!("disasm-facts")
        .args(["facts", "--binary", &binary, "--raw", "--isa", "arm64"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported target"));
}

#[test]
fn facts_rejects_unparseable_binary() {
    let temp = tempdir().unwrap();
    let binary = write_file(temp.path(), "junk.bin", b"definitely not an executable image");

    cargo_bin_cmd!("disasm-facts")
        .args(["facts", "--binary", &binary])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse binary"));
}

#[test]
fn facts_reports_missing_file() {
    cargo_bin_cmd!("disasm-facts")
        .args(["facts", "--binary", "/definitely/missing/binary"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read binary"));
}

#[test]
fn plan_shows_passes_in_order() {
    let temp = tempdir().unwrap();
    let config = write_file(
        temp.path(),
        "pipeline.yaml",
        b"name: full\npasses:\n  - disassembly\n  - no return analysis\n  - function inference\n",
    );

    cargo_bin_cmd!("disasm-facts")
        .args(["plan", "--config", &config])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pipeline: full"))
        .stdout(predicate::str::contains("1. disassembly [disasm]"))
        .stdout(predicate::str::contains(
            "3. function inference [function_inference] after 'no return analysis'",
        ));
}

#[test]
fn plan_json_lists_dependencies() {
    let temp = tempdir().unwrap();
    let config = write_file(
        temp.path(),
        "pipeline.json",
        br#"{"name":"two","passes":["disassembly","no return analysis"]}"#,
    );

    let output = cargo_bin_cmd!("disasm-facts")
        .args(["plan", "--config", &config, "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let body: serde_json::Value = serde_json::from_slice(&output).expect("plan json");
    assert_eq!(body["pipeline"], "two");
    assert_eq!(body["passes"][1]["dependency"], "disassembly");
    assert_eq!(body["passes"][0]["dependency"], serde_json::Value::Null);
}

#[test]
fn plan_fails_on_missing_dependency() {
    let temp = tempdir().unwrap();
    let config = write_file(
        temp.path(),
        "pipeline.json",
        br#"{"name":"bad","passes":["function inference"]}"#,
    );

    cargo_bin_cmd!("disasm-facts")
        .args(["plan", "--config", &config])
        .assert()
        .failure()
        .stderr(predicate::str::contains("depends on 'no return analysis'"));
}

#[test]
fn plan_fails_on_unknown_pass() {
    let temp = tempdir().unwrap();
    let config =
        write_file(temp.path(), "pipeline.json", br#"{"name":"bad","passes":["lifting"]}"#);

    cargo_bin_cmd!("disasm-facts")
        .args(["plan", "--config", &config])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown pass 'lifting'"));
}
