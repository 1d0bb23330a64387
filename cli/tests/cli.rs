//! End-to-end CLI tests

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn write_config(dir: &Path) -> std::path::PathBuf {
    let config_path = dir.join("config.toml");
    let key_dir = dir.join("keys");
    std::fs::write(
        &config_path,
        format!(
            "key_dir = {:?}\n\n[keyserver]\nurl = \"https://keys.example.com\"\n",
            key_dir
        ),
    )
    .unwrap();
    config_path
}

fn sigil(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sigil").unwrap();
    cmd.env_remove("SIGIL_AUTH_TOKEN")
        .arg("--config")
        .arg(config);
    cmd
}

#[test]
fn conflicting_selectors_exit_with_code_2() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let image = dir.path().join("img.sif");
    std::fs::write(&image, b"payload").unwrap();

    sigil(&config)
        .args(["verify", image.to_str().unwrap(), "--groupid", "5", "--id", "3"])
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::contains("Verifying image:"))
        .stderr(predicate::str::contains("only one of -i or -g may be set"));
}

#[test]
fn verifying_an_unsigned_image_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let image = dir.path().join("img.sif");
    std::fs::write(&image, b"payload").unwrap();

    sigil(&config)
        .args(["verify", image.to_str().unwrap()])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("no signatures found"));
}

#[test]
fn newpair_with_all_flags_skips_prompts_and_push() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    sigil(&config)
        .args([
            "key", "newpair", "--name", "Alice", "--email", "a@x.com", "--comment", "",
            "--password", "secret", "--push", "false",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "NOT pushing newly created key to: https://keys.example.com",
        ));
}

#[test]
fn newpair_without_flags_fails_on_closed_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    sigil(&config)
        .args(["key", "newpair"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("interactive input failed"));
}

#[test]
fn empty_keyring_lists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    sigil(&config)
        .args(["key", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No local key pairs."));
}

#[test]
fn newpair_sign_verify_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let image = dir.path().join("img.sif");
    std::fs::write(&image, b"container image payload").unwrap();

    sigil(&config)
        .args([
            "key", "newpair", "--name", "Alice", "--email", "a@x.com", "--comment", "ci",
            "--password", "", "--push", "false",
        ])
        .assert()
        .success();

    sigil(&config)
        .args(["sign", image.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created signature for object 1"));

    sigil(&config)
        .args(["verify", image.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Image is authentic"));

    sigil(&config)
        .args(["verify", image.to_str().unwrap(), "--groupid", "1"])
        .assert()
        .success();
}
