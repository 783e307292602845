use assert_cmd::Command;

fn version_output() -> String {
    format!("holefill {}\n", env!("CARGO_PKG_VERSION"))
}

fn holefill() -> Command {
    Command::cargo_bin("holefill").expect("binary exists")
}

#[test]
fn version_flag_prints_package_version() {
    let expected = version_output();
    holefill()
        .arg("--version")
        .assert()
        .success()
        .stdout(expected.clone())
        .stderr("");

    holefill()
        .arg("-v")
        .assert()
        .success()
        .stdout(expected)
        .stderr("");
}

#[test]
fn help_flag_prints_usage() {
    let output = holefill().arg("--help").output().expect("help output");

    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Usage:"), "stdout was: {stdout}");
    assert!(
        stdout.contains("-v, --version"),
        "stdout was missing version flag: {stdout}"
    );
    assert!(output.stderr.is_empty(), "stderr was not empty");
}

#[test]
fn running_with_missing_file_returns_error() {
    let output = holefill()
        .arg("tests/does-not-exist.hole")
        .assert()
        .failure()
        .get_output()
        .clone();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("failed to read `tests/does-not-exist.hole`"),
        "stderr was: {stderr}"
    );
}

#[test]
fn listing_actions_names_commands() {
    let output = holefill()
        .arg("tests/fixtures/list.hole")
        .assert()
        .success()
        .get_output()
        .clone();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.starts_with("hole #0 at 8:11: List Int\n"),
        "stdout was: {stdout}"
    );
    assert!(
        stdout.contains("  tacticsAutoCommand: Attempt to fill hole\n"),
        "stdout was: {stdout}"
    );
    assert!(
        stdout.contains("  tacticsHomomorphismCommand: Homomorphic case split on xs\n"),
        "stdout was: {stdout}"
    );
}

#[test]
fn running_auto_prints_extract_and_alternatives() {
    holefill()
        .args(["--timeout", "5000", "--tactic", "auto", "tests/fixtures/list.hole"])
        .assert()
        .success()
        .stdout("xs\n-- 1 other solutions\n-- Nil\n");
}

#[test]
fn running_lambda_case_on_second_hole() {
    holefill()
        .args([
            "-n",
            "1",
            "-t",
            "homomorphism-lambda-case",
            "tests/fixtures/shapes.hole",
        ])
        .assert()
        .success()
        .stdout(
            "\\case { Leaf -> Leaf; Node t i t1 -> Node (mirror t) i (mirror t1) }\n\
             -- 0 other solutions\n",
        );
}

#[test]
fn destruct_without_binding_fails() {
    let output = holefill()
        .args(["--tactic", "destruct", "tests/fixtures/list.hole"])
        .assert()
        .failure()
        .get_output()
        .clone();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("needs --binding NAME"), "stderr was: {stderr}");
}
