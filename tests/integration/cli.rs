use std::io::Write;
use std::process::Command;

fn animscript() -> Command {
    Command::new(env!("CARGO_BIN_EXE_animscript"))
}

#[test]
fn test_cli_demo_prints_json_lines() {
    let output = animscript()
        .args(["demo", "--frames", "3"])
        .output()
        .expect("failed to run animscript");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let frames: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("frame is not JSON"))
        .collect();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[2]["frame"], 2);
    assert_eq!(frames[0]["scope"]["landed"], false);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("3 frames"));
}

#[test]
fn test_cli_reads_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[time]\nend = 0.2\n\n[logging]\nlevel = \"warn\"").unwrap();

    let output = animscript()
        .arg("--config")
        .arg(file.path())
        .arg("config")
        .output()
        .expect("failed to run animscript");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("end = 0.2"));
    assert!(stdout.contains("level = \"warn\""));

    let output = animscript()
        .arg("--config")
        .arg(file.path())
        .arg("demo")
        .output()
        .expect("failed to run animscript");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).lines().count(), 6);
}

#[test]
fn test_cli_rejects_invalid_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[time]\nstep = -1.0").unwrap();

    let output = animscript()
        .arg("--config")
        .arg(file.path())
        .arg("version")
        .output()
        .expect("failed to run animscript");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("time.step must be positive"));
}

#[test]
fn test_cli_version() {
    let output = animscript()
        .arg("version")
        .output()
        .expect("failed to run animscript");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("animscript {}", env!("CARGO_PKG_VERSION")));
}
