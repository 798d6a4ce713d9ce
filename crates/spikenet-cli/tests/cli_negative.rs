use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::error::Error;
use std::fs;
use tempfile::tempdir;
use assert_cmd::Command;

fn spikenet() -> Result<Command, Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("spikenet")?;
    cmd.env_remove("RUST_LOG").env_remove("SPIKENET_CONFIG");
    Ok(cmd)
}

#[test]
fn init_refuses_to_overwrite_without_force() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    let workspace = tmp.path().to_str().expect("temp path to UTF-8");

    let mut first = spikenet()?;
    first.args(["--workspace", workspace, "init"]);
    first.assert().success();
    assert!(tmp.path().join("spikenet.toml").exists());

    let mut second = spikenet()?;
    second.args(["--workspace", workspace, "init"]);
    second.assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    let mut forced = spikenet()?;
    forced.args(["--workspace", workspace, "init", "--force"]);
    forced.assert().success();
    Ok(())
}

#[test]
fn unknown_config_key_fails() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    fs::write(tmp.path().join("bad.toml"), "neurons = 12\n")?;
    let workspace = tmp.path().to_str().expect("temp path to UTF-8");

    let mut cmd = spikenet()?;
    cmd.args(["--workspace", workspace, "--config", "bad.toml", "freq-match", "-i", "1", "--no-progress"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unknown field"));
    Ok(())
}

#[test]
fn zero_iterations_rejected() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    let workspace = tmp.path().to_str().expect("temp path to UTF-8");

    let mut cmd = spikenet()?;
    cmd.args(["--workspace", workspace, "freq-match", "-i", "0", "--no-progress"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("iterations must be positive"));
    Ok(())
}

#[test]
fn missing_config_file_fails() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    let workspace = tmp.path().to_str().expect("temp path to UTF-8");

    let mut cmd = spikenet()?;
    cmd.args(["--workspace", workspace, "--config", "absent.toml", "freq-match", "--no-progress"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("absent.toml"));
    Ok(())
}
