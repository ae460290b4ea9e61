#[path = "common/mod.rs"]
mod common;

use std::{
    fs,
    path::{Path, PathBuf},
};

use assert_cmd::Command;
use common::{is_process_alive, unique_name, wait_for_pid_file, wait_for_process_exit, write_script};
use predicates::prelude::*;
use tempfile::{TempDir, tempdir};

struct Sandbox {
    temp: TempDir,
    config: PathBuf,
}

impl Sandbox {
    fn new() -> Self {
        let temp = tempdir().expect("failed to create tempdir");
        let home = temp.path().join("home");
        fs::create_dir_all(&home).expect("failed to create home dir");

        let config = temp.path().join("botpool.yaml");
        fs::write(
            &config,
            format!(
                "slots: 3\nstate_dir: \"{}\"\ntoken_prefix: \"{}\"\nstop_grace: \"500ms\"\nrestart:\n  attempts: 5\n  interval: \"100ms\"\n",
                temp.path().join("state").display(),
                unique_name("cli"),
            ),
        )
        .expect("failed to write config");

        Self { temp, config }
    }

    fn dir(&self) -> &Path {
        self.temp.path()
    }

    fn botpool(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("botpool"));
        cmd.env("HOME", self.dir().join("home"))
            .env("RUST_LOG", "warn")
            .arg("--config")
            .arg(&self.config)
            .arg("--no-color");
        cmd
    }
}

#[test]
fn configure_then_list_shows_the_slot() {
    let sandbox = Sandbox::new();
    let script = write_script(sandbox.dir(), "alpha.sh", "exec sleep 60");

    sandbox
        .botpool()
        .arg("configure")
        .arg("2")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("Bot 2 configured (stopped)"));

    sandbox
        .botpool()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("alpha.sh"))
        .stdout(predicate::str::contains("unconfigured"))
        .stdout(predicate::str::contains("stopped"));

    let store = fs::read_to_string(sandbox.dir().join("state/bot_paths.json")).unwrap();
    assert!(store.contains(script.to_str().unwrap()));
}

#[test]
fn list_can_emit_json() {
    let sandbox = Sandbox::new();
    let script = write_script(sandbox.dir(), "zeta.sh", "exec sleep 60");
    sandbox
        .botpool()
        .args(["configure", "1"])
        .arg(&script)
        .assert()
        .success();

    let output = sandbox.botpool().args(["list", "--json"]).output().unwrap();
    assert!(output.status.success());
    let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(records.as_array().unwrap().len(), 3);
    assert_eq!(records[0]["run_state"], "stopped");
    assert_eq!(records[0]["display_name"], "zeta.sh");
    assert_eq!(records[1]["run_state"], "unconfigured");
}

#[test]
fn rename_persists_between_invocations() {
    let sandbox = Sandbox::new();
    let script = write_script(sandbox.dir(), "beta.sh", "exec sleep 60");

    sandbox
        .botpool()
        .args(["configure", "1"])
        .arg(&script)
        .assert()
        .success();
    sandbox
        .botpool()
        .args(["rename", "1", "Beta Bot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bot 1 renamed to Beta Bot"));

    sandbox
        .botpool()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Beta Bot"));
}

#[test]
fn blank_rename_fails() {
    let sandbox = Sandbox::new();
    let script = write_script(sandbox.dir(), "gamma.sh", "exec sleep 60");
    sandbox
        .botpool()
        .args(["configure", "1"])
        .arg(&script)
        .assert()
        .success();

    sandbox
        .botpool()
        .args(["rename", "1", "   "])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error: "))
        .stderr(predicate::str::contains("name cannot be empty").count(1))
        .stderr(predicate::str::contains("Error: ").not());
}

#[test]
fn slot_numbers_are_validated() {
    let sandbox = Sandbox::new();

    sandbox.botpool().args(["start", "0"]).assert().failure();

    sandbox
        .botpool()
        .args(["start", "4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("slot 4 does not exist"));
}

#[test]
fn stopping_an_idle_slot_is_only_a_warning() {
    let sandbox = Sandbox::new();
    let script = write_script(sandbox.dir(), &format!("{}.sh", unique_name("idle")), "exec sleep 60");
    sandbox
        .botpool()
        .args(["configure", "1"])
        .arg(&script)
        .assert()
        .success();

    sandbox
        .botpool()
        .args(["stop", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "warning: No running process found for bot 1",
        ));

    sandbox
        .botpool()
        .args(["stop", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("warning: Slot 2 has no bot configured"));
}

#[test]
fn start_and_stop_across_invocations() {
    let sandbox = Sandbox::new();
    let name = format!("{}.sh", unique_name("runner"));
    let script = write_script(
        sandbox.dir(),
        &name,
        &format!("echo $$ > {}/root.pid\nexec sleep 60", sandbox.dir().display()),
    );

    sandbox
        .botpool()
        .args(["configure", "1"])
        .arg(&script)
        .assert()
        .success();
    sandbox
        .botpool()
        .args(["start", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bot 1 started"));

    let pid = wait_for_pid_file(&sandbox.dir().join("root.pid"));
    assert!(is_process_alive(pid));

    sandbox
        .botpool()
        .args(["start", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("warning: Bot 1 is already running"));

    sandbox
        .botpool()
        .args(["refresh", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Running"));

    sandbox
        .botpool()
        .args(["stop", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bot 1 stopped"));
    wait_for_process_exit(pid);

    sandbox
        .botpool()
        .args(["log", "--lines", "50"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Started bot 1"))
        .stdout(predicate::str::contains("Stopped bot 1"));
}

#[test]
fn update_outside_a_repository_reports_it() {
    let sandbox = Sandbox::new();
    let script = write_script(sandbox.dir(), "delta.sh", "exec sleep 60");
    sandbox
        .botpool()
        .args(["configure", "1"])
        .arg(&script)
        .assert()
        .success();

    sandbox
        .botpool()
        .args(["update", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is not a git repository"));
}

#[test]
fn empty_log_says_so() {
    let sandbox = Sandbox::new();
    sandbox
        .botpool()
        .arg("log")
        .assert()
        .success()
        .stdout(predicate::str::contains("No activity recorded."));
}

#[test]
fn console_reads_commands_from_stdin() {
    let sandbox = Sandbox::new();
    let script = write_script(sandbox.dir(), "epsilon.sh", "exec sleep 60");

    sandbox
        .botpool()
        .arg("console")
        .write_stdin(format!(
            "configure 3 {}\nrename 3 Eps\nstatus\nquit\n",
            script.display()
        ))
        .assert()
        .success()
        .stdout(predicate::str::contains("Bot 3 configured (stopped)"))
        .stdout(predicate::str::contains("Eps"));
}
