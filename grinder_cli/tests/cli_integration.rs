use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Fast bench: cup lands right after the startup tare and grinds at 40 g/s
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[pins]
# pins are unused in sim backend but must be present
hx711_dt = 5
hx711_sck = 6
grinder_relay = 17

[scale]
sensor_read_timeout_ms = 50

[display]
refresh_ms = 20

[simulation]
place_cup_at_ms = 400
flow_gps = 40.0
remove_after_ms = 200
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn grinder(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("grinder").unwrap();
    cmd.arg("--config")
        .arg(cfg)
        .arg("--log-level")
        .arg("error")
        .env_remove("RUST_LOG")
        .env_remove("GRINDER_SIM_TIMEOUT");
    cmd
}

fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect()
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "ok", "stdout")]
#[case(&["run", "--max-ms", "800"], 0, "Weight:", "stdout")]
#[case(&["run", "--max-ms", "nope"], 2, "invalid value", "stderr")]
#[case(&["dose"], 2, "unrecognized subcommand", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let mut cmd = grinder(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn sim_run_grinds_one_dose() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let out = grinder(&cfg)
        .args(["--json", "run", "--max-ms", "4000"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let lines = json_lines(&out);

    let targets: Vec<&str> = lines
        .iter()
        .filter(|v| v["type"] == "transition")
        .filter_map(|v| v["to"].as_str())
        .collect();
    assert_eq!(targets, ["grinding", "finished", "empty"], "{lines:?}");

    let finished = lines
        .iter()
        .find(|v| v["type"] == "status" && v["status"] == "finished")
        .expect("finished snapshot");
    assert_eq!(finished["screen"][0], "Finished!");
    assert!(finished["finished_at_ms"].as_u64() >= finished["started_at_ms"].as_u64());

    let last = lines.last().expect("final line");
    assert_eq!(last["type"], "final");
    assert_eq!(last["status"], "empty");
    assert!(last["last_tared_ms"].is_u64());
}

#[test]
fn sim_timeout_keeps_grinder_idle() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let out = grinder(&cfg)
        .env("GRINDER_SIM_TIMEOUT", "1")
        .args(["--json", "run", "--max-ms", "600"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let lines = json_lines(&out);
    assert!(lines.iter().all(|v| v["type"] != "transition"), "{lines:?}");
    let last = lines.last().expect("final line");
    assert_eq!(last["status"], "empty");
    assert_eq!(last["sensor_ready"], false);
    assert_eq!(last["screen"][0], "Init...");
}

#[test]
fn self_check_reports_sensor_timeout() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    grinder(&cfg)
        .env("GRINDER_SIM_TIMEOUT", "1")
        .arg("self-check")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Scale read timed out"));
}

#[test]
fn json_errors_are_structured() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let out = grinder(&cfg)
        .env("GRINDER_SIM_TIMEOUT", "1")
        .args(["--json", "self-check"])
        .assert()
        .code(3)
        .get_output()
        .stderr
        .clone();
    let v = json_lines(&out)
        .into_iter()
        .find(|v| v.get("reason").is_some())
        .expect("json error line");
    assert_eq!(v["reason"], "Timeout");
    assert_eq!(v["exit_code"], 3);
}

#[test]
fn missing_config_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("nope.toml");
    grinder(&cfg)
        .arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not read the config file"))
        .stderr(predicate::str::contains("nope.toml"));
}

#[test]
fn invalid_config_names_the_key() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("bad.toml");
    fs::write(
        &cfg,
        "[pins]\nhx711_dt = 5\nhx711_sck = 6\ngrinder_relay = 17\n\n[grind]\ndose_g = 0.0\n",
    )
    .unwrap();
    grinder(&cfg)
        .args(["run", "--max-ms", "100"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("grind.dose_g must be > 0"));
}

#[test]
fn log_file_receives_json_lines() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("grinder.log");
    let cfg = dir.path().join("cfg.toml");
    fs::write(
        &cfg,
        format!(
            "[pins]\nhx711_dt = 5\nhx711_sck = 6\ngrinder_relay = 17\n\n[logging]\nfile = {:?}\nlevel = \"info\"\n",
            log.display().to_string()
        ),
    )
    .unwrap();
    Command::cargo_bin("grinder")
        .unwrap()
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--max-ms", "600"])
        .assert()
        .success();
    let text = fs::read_to_string(&log).unwrap();
    let first = text.lines().next().expect("log line");
    let v: serde_json::Value = serde_json::from_str(first).unwrap();
    assert!(v.get("level").is_some());
    assert!(text.contains("controller started"));
}
