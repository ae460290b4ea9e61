#[path = "common/mod.rs"]
mod common;

use std::{fs, path::Path, process::Command, time::Instant};

use botpool::{
    error::SupervisorError,
    record::RunState,
    scheduler::PollScheduler,
    vcs::UpdateOutcome,
};
use common::{fake_pool, fast_settings};
use tempfile::tempdir;

#[test]
fn configured_bot_without_process_is_stopped() {
    let temp = tempdir().unwrap();
    let fake = fake_pool(&fast_settings(temp.path(), 3), None);

    assert_eq!(
        fake.pool.configure(0, Path::new("/bots/alpha.bat")).unwrap(),
        RunState::Stopped
    );
    let record = fake.pool.snapshot(0).unwrap();
    assert_eq!(record.display_name(), "alpha.bat");
    assert!(record.started_at().is_none());
}

#[test]
fn started_bot_is_running_with_matching_argument() {
    let temp = tempdir().unwrap();
    let fake = fake_pool(&fast_settings(temp.path(), 3), None);
    fake.pool.configure(0, Path::new("/bots/alpha.bat")).unwrap();

    fake.pool.start(0).unwrap();

    assert!(fake.table.entries().iter().any(|entry| {
        entry.argv.iter().any(|arg| arg.ends_with("alpha.bat"))
    }));
    let record = fake.pool.snapshot(0).unwrap();
    assert_eq!(record.run_state(), RunState::Running);
    assert!(record.started_at().is_some());
}

#[test]
fn external_kill_is_picked_up_by_the_status_tick() {
    let temp = tempdir().unwrap();
    let mut settings = fast_settings(temp.path(), 3);
    settings.status_interval = Some(std::time::Duration::from_secs(2));
    let fake = fake_pool(&settings, None);
    fake.pool.configure(0, Path::new("/bots/alpha.bat")).unwrap();
    fake.pool.start(0).unwrap();

    let mut scheduler = PollScheduler::from_settings(&settings);
    let now = Instant::now();
    scheduler.catch_up(&fake.pool, now);

    fake.table.clear();
    scheduler.run_due(&fake.pool, now + std::time::Duration::from_secs(2));

    let record = fake.pool.snapshot(0).unwrap();
    assert_eq!(record.run_state(), RunState::Stopped);
    assert!(record.started_at().is_none());
}

#[test]
fn blank_rename_is_rejected_and_name_kept() {
    let temp = tempdir().unwrap();
    let fake = fake_pool(&fast_settings(temp.path(), 3), None);
    fake.pool.configure(0, Path::new("/bots/alpha.bat")).unwrap();

    assert!(matches!(
        fake.pool.rename(0, ""),
        Err(SupervisorError::InvalidInput(_))
    ));
    assert_eq!(fake.pool.snapshot(0).unwrap().display_name(), "alpha.bat");
}

#[test]
fn refresh_twice_gives_the_same_answer() {
    let temp = tempdir().unwrap();
    let fake = fake_pool(&fast_settings(temp.path(), 3), None);
    fake.pool.configure(2, Path::new("/bots/gamma.sh")).unwrap();
    fake.pool.start(2).unwrap();

    let first = fake.pool.refresh(2).unwrap();
    let second = fake.pool.refresh(2).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, RunState::Running);
}

#[test]
fn restart_gives_up_on_a_process_that_will_not_die() {
    let temp = tempdir().unwrap();
    let fake = fake_pool(&fast_settings(temp.path(), 3), None);
    fake.pool.configure(1, Path::new("/bots/beta.sh")).unwrap();
    fake.pool.start(1).unwrap();
    fake.launcher.set_stubborn(true);

    assert!(matches!(
        fake.pool.restart(1),
        Err(SupervisorError::StopTimeout { slot: 1, attempts: 5 })
    ));
    assert_eq!(fake.pool.snapshot(1).unwrap().run_state(), RunState::Stopped);
    assert_eq!(fake.launcher.spawns().len(), 1);
    assert!(fake.sink.contains("still running"));
}

#[test]
fn operations_on_empty_slots_are_unconfigured_warnings() {
    let temp = tempdir().unwrap();
    let fake = fake_pool(&fast_settings(temp.path(), 3), None);

    for result in [
        fake.pool.start(1).map(|_| ()),
        fake.pool.stop(1).map(|_| ()),
        fake.pool.restart(1).map(|_| ()),
        fake.pool.refresh(1).map(|_| ()),
        fake.pool.update(1).map(|_| ()),
    ] {
        let err = result.unwrap_err();
        assert!(matches!(err, SupervisorError::Unconfigured { slot: 1 }));
        assert!(err.is_warning());
    }
}

#[test]
fn every_lifecycle_event_reaches_the_sink() {
    let temp = tempdir().unwrap();
    let fake = fake_pool(&fast_settings(temp.path(), 3), None);
    fake.pool.configure(0, Path::new("/bots/alpha.bat")).unwrap();
    fake.pool.rename(0, "Alpha").unwrap();
    fake.pool.start(0).unwrap();
    fake.pool.stop(0).unwrap();
    let _ = fake.pool.stop(0);

    let messages = fake.sink.messages();
    assert!(messages[0].starts_with("Added file /bots/alpha.bat for bot 1"));
    assert!(messages.iter().any(|m| m == "Renamed bot 1 to Alpha"));
    assert!(messages.iter().any(|m| m.starts_with("Started bot 1")));
    assert!(messages.iter().any(|m| m == "Stopped bot 1"));
    assert_eq!(
        messages.last().map(String::as_str),
        Some("No running process found for bot 1")
    );
}

fn git(dir: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .args(["-c", "user.name=botpool", "-c", "user.email=botpool@localhost"])
        .args(["-c", "commit.gpgsign=false"])
        .args(args)
        .current_dir(dir)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[test]
fn update_pulls_a_cloned_repository() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    if !git(root, &["--version"]) {
        eprintln!("git not available; skipping");
        return;
    }

    assert!(git(root, &["init", "--bare", "origin.git"]));
    assert!(git(root, &["clone", "origin.git", "seed"]));
    let seed = root.join("seed");
    fs::write(seed.join("bot.sh"), "exec sleep 60\n").unwrap();
    assert!(git(&seed, &["add", "bot.sh"]));
    assert!(git(&seed, &["commit", "-m", "add bot"]));
    assert!(git(&seed, &["push", "origin", "HEAD"]));
    assert!(git(root, &["clone", "origin.git", "work"]));

    let fake = fake_pool(&fast_settings(root, 2), None);
    fake.pool.configure(0, &root.join("work/bot.sh")).unwrap();

    match fake.pool.update(0).unwrap() {
        UpdateOutcome::Pulled { stdout, .. } => {
            assert!(fake.sink.contains(&format!("Update of bot 1 finished: {stdout}")));
        }
        other => panic!("expected a successful pull, got {other:?}"),
    }
}
