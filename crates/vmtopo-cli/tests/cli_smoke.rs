use std::io::Write;

use assert_cmd::Command;

const SIMPLE_DOC: &str = r#"[{"cores": 2, "threads": 2, "mem": "4G"}]"#;

#[test]
fn help_works() {
    Command::cargo_bin("vmtopo").unwrap()
        .arg("--help")
        .assert()
        .success();
}

#[test]
fn version_works() {
    Command::cargo_bin("vmtopo").unwrap()
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn help_documents_the_group_keys() {
    let out = Command::cargo_bin("vmtopo")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let s = String::from_utf8(out).unwrap();

    for needle in ["mem", "nvmem", "dimm", "cores", "node-dist", "cxl"] {
        assert!(s.contains(needle), "help missing `{needle}`");
    }
}

#[test]
fn compiles_from_stdin() {
    let out = Command::cargo_bin("vmtopo")
        .unwrap()
        .write_stdin(SIMPLE_DOC)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let line = String::from_utf8(out).unwrap();
    assert_eq!(
        line.trim_end(),
        "-machine pc -cpu host -smp cpus=4,threads=2,sockets=1,maxcpus=4 \
         -m size=4G,slots=0,maxmem=4G \
         -numa node,nodeid=0,memdev=membuiltin_0_node_0,cpus=0-3 \
         -object memory-backend-ram,size=4G,id=membuiltin_0_node_0"
    );
}

#[test]
fn file_argument_matches_stdin() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SIMPLE_DOC.as_bytes()).unwrap();

    let from_file = Command::cargo_bin("vmtopo")
        .unwrap()
        .arg(file.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let from_stdin = Command::cargo_bin("vmtopo")
        .unwrap()
        .write_stdin(SIMPLE_DOC)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(from_file, from_stdin);
}

#[test]
fn separated_output_toggle() {
    let out = Command::cargo_bin("vmtopo")
        .unwrap()
        .env("VMTOPO_SEPARATED_OUTPUT", "1")
        .write_stdin(SIMPLE_DOC)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let line = String::from_utf8(out).unwrap();
    assert!(line.starts_with("MACHINE:-machine pc|CPU:-cpu host|SMP:"));
    assert!(line.contains("EXTRA:\"-numa\", "));
}

#[test]
fn invalid_json_fails_with_prefixed_diagnostic() {
    let output = Command::cargo_bin("vmtopo")
        .unwrap()
        .write_stdin("not json")
        .assert()
        .failure()
        .get_output()
        .clone();
    assert!(output.stdout.is_empty(), "stdout must stay clean on failure");
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.starts_with("vmtopo: "), "got: {stderr}");
}

#[test]
fn validation_error_is_a_single_line() {
    let output = Command::cargo_bin("vmtopo")
        .unwrap()
        .write_stdin(r#"[{"threads": 2}]"#)
        .assert()
        .failure()
        .get_output()
        .clone();
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert_eq!(stderr.lines().count(), 1, "got: {stderr}");
    assert!(stderr.contains("threads"));
}

#[test]
fn missing_file_fails() {
    Command::cargo_bin("vmtopo").unwrap()
        .arg("/nonexistent/topology.json")
        .assert()
        .failure();
}
