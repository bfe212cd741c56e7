//! Binary-level tests for the chatkv CLI

mod common;

use assert_cmd::Command;
use predicates::prelude::*;

fn chatkv() -> Command {
    Command::cargo_bin("chatkv").unwrap()
}

#[test]
fn test_help_lists_commands() {
    chatkv()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("startup"))
        .stdout(predicate::str::contains("serve"));
}

#[test]
fn test_invalid_limit_rejected() {
    let (_temp_dir, config_path) = common::temp_config_file(
        r#"
limits:
  rate_limit_max: 0
"#,
    );

    chatkv()
        .arg("--config")
        .arg(config_path)
        .arg("stats")
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be greater than 0"));
}

#[test]
fn test_reset_requires_confirm_flag() {
    chatkv()
        .arg("reset")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--confirm"));
}

#[test]
fn test_health_reports_unreachable_store() {
    let (_temp_dir, config_path) = common::temp_config_file("store:\n  timeout_seconds: 2\n");

    chatkv()
        .arg("--config")
        .arg(config_path)
        .arg("--store-url")
        .arg("http://127.0.0.1:9/")
        .arg("health")
        .assert()
        .failure()
        .stdout(predicate::str::contains("unhealthy"));
}

#[test]
fn test_serve_reports_bad_bind_address() {
    let (_temp_dir, config_path) = common::temp_config_file("proxy:\n  bind: 127.0.0.1:0\n");

    chatkv()
        .arg("--config")
        .arg(config_path)
        .arg("serve")
        .arg("--bind")
        .arg("not-an-address")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot bind not-an-address"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_startup_and_users_against_live_proxy() {
    let proxy = common::start_proxy().await;
    let url = proxy.url();
    let (_temp_dir, config_path) = common::temp_config_file("admin:\n  username: root\n");

    let run = move |args: Vec<&'static str>| {
        let url = url.clone();
        let config_path = config_path.clone();
        tokio::task::spawn_blocking(move || {
            chatkv()
                .arg("--config")
                .arg(config_path)
                .arg("--store-url")
                .arg(url)
                .args(args)
                .assert()
        })
    };

    run(vec!["startup"])
        .await
        .unwrap()
        .success()
        .stdout(predicate::str::contains("Startup complete"));

    run(vec!["users", "register", "alice", "--password", "secret1"])
        .await
        .unwrap()
        .success();

    run(vec!["--json", "users", "pending"])
        .await
        .unwrap()
        .success()
        .stdout(predicate::str::contains("\"username\": \"alice\""));

    run(vec!["users", "delete", "admin"])
        .await
        .unwrap()
        .failure()
        .stderr(predicate::str::contains("Cannot delete admin user"));
}
