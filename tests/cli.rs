use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use yt2mp3::Config;

/// Working directory holding a local config file, so the user's config is never touched
fn workdir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.app.output_dir = Some(dir.path().join("out"));
    config.save_to(&dir.path().join("config.yaml")).unwrap();
    dir
}

fn yt2mp3(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("yt2mp3").unwrap();
    cmd.current_dir(dir.path()).env("RUST_LOG", "off");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = workdir();
    yt2mp3(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("convert"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_invalid_links_fail_without_running() {
    let dir = workdir();
    yt2mp3(&dir)
        .args(["convert", "--quiet", "-l", "https://vimeo.com/1,not-a-link"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("link \"https://vimeo.com/1\" has an issue"))
        .stdout(predicate::str::contains("link \"not-a-link\" has an issue"));

    assert!(!dir.path().join("out").exists());
}

#[test]
fn test_config_show() {
    let dir = workdir();
    yt2mp3(&dir)
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Max Concurrent Tasks: 8"))
        .stdout(predicate::str::contains("Preferred Qualities: 360p, 240p"));
}

#[test]
fn test_convert_requires_links() {
    let dir = workdir();
    yt2mp3(&dir).arg("convert").assert().failure();
}
