#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

const SETTINGS: &str = r#"
virtual_machines:
  location: eastus
  resource_group: rg1
  hostname_prefix: pool
  vm_count: 2
  virtual_network:
    name: vnet1
    address_space: 10.0.0.0/16
    subnet_name: default
    subnet_address_prefix: 10.0.0.0/24
  network_security:
    inbound:
      ssh:
        destination_port_range: 22
        source_address_prefix: ["*"]
        protocol: tcp
      web:
        destination_port_range: 8000-8080
        source_address_prefix: ["10.1.0.0/16", "10.2.0.0/16"]
        protocol: tcp
  ssh:
    ssh_public_key_data: ssh-rsa AAAA test
"#;

fn write_settings(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("flotilla.yaml");
    std::fs::write(&path, content).unwrap();
    path
}

/// 設定ファイルの自動検出が手元の環境に左右されないようにする
fn flotilla(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("flotilla").unwrap();
    cmd.env_remove("FLOTILLA_CONFIG_PATH")
        .env_remove("AZURE_SUBSCRIPTION_ID")
        .env_remove("AZURE_ACCESS_TOKEN")
        .env_remove("RUST_LOG")
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"));
    cmd
}

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    let temp = TempDir::new().unwrap();
    flotilla(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("仮想マシン群"))
        .stdout(predicate::str::contains("up"))
        .stdout(predicate::str::contains("down"))
        .stdout(predicate::str::contains("validate"));
}

/// バージョン表示が正しく動作することを確認
#[test]
fn test_cli_version() {
    let temp = TempDir::new().unwrap();
    flotilla(temp.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("flotilla"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

/// downコマンドのヘルプにフラグが表示されることを確認
#[test]
fn test_down_help() {
    let temp = TempDir::new().unwrap();
    flotilla(temp.path())
        .args(["down", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--delete-vnet"))
        .stdout(predicate::str::contains("--no-wait"))
        .stdout(predicate::str::contains("--config"));
}

/// 不正なコマンドでエラーになることを確認
#[test]
fn test_invalid_command() {
    let temp = TempDir::new().unwrap();
    flotilla(temp.path()).arg("invalid-command").assert().failure();
}

/// 生成される名前が表示されることを確認
#[test]
fn test_validate_prints_names() {
    let temp = TempDir::new().unwrap();
    let path = write_settings(temp.path(), SETTINGS);

    flotilla(temp.path())
        .arg("validate")
        .arg("--config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ 設定ファイルは正常です！"))
        .stdout(predicate::str::contains("pool-vm000"))
        .stdout(predicate::str::contains("pool-vm001"))
        .stdout(predicate::str::contains("pool-ni001"))
        .stdout(predicate::str::contains("pool-pip000"))
        .stdout(predicate::str::contains("pool-nsg"))
        .stdout(predicate::str::contains("ssh_in-000"))
        .stdout(predicate::str::contains("web_in-001"))
        .stdout(predicate::str::contains("priority: 102"));
}

/// --verbose でデバッグログが出力されることを確認
#[test]
fn test_validate_verbose_logs_settings_path() {
    let temp = TempDir::new().unwrap();
    let path = write_settings(temp.path(), SETTINGS);

    flotilla(temp.path())
        .args(["validate", "--verbose", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stderr(predicate::str::contains("settings loaded"))
        .stderr(predicate::str::contains("flotilla.yaml"));
}

/// カレントディレクトリの flotilla.yaml が検出されることを確認
#[test]
fn test_validate_discovers_settings() {
    let temp = TempDir::new().unwrap();
    write_settings(temp.path(), SETTINGS);

    flotilla(temp.path())
        .current_dir(temp.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("pool-vm000"));
}

/// 設定ファイルがない場合はエラーになることを確認
#[test]
fn test_validate_without_settings() {
    let temp = TempDir::new().unwrap();
    flotilla(temp.path())
        .current_dir(temp.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("設定ファイルが見つかりません"));
}

/// private_ips の数が合わない設定はエラーになることを確認
#[test]
fn test_validate_rejects_private_ip_count() {
    let temp = TempDir::new().unwrap();
    let content = format!("{}  private_ips: [10.0.0.4]\n", SETTINGS);
    let path = write_settings(temp.path(), &content);

    flotilla(temp.path())
        .args(["validate", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("✗ 設定エラー"));
}

/// 未知のプロトコルはエラーになることを確認
#[test]
fn test_validate_rejects_unknown_protocol() {
    let temp = TempDir::new().unwrap();
    let content = SETTINGS.replace("protocol: tcp", "protocol: icmp");
    let path = write_settings(temp.path(), &content);

    flotilla(temp.path())
        .args(["validate", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown protocol icmp"));
}

/// 資格情報がない場合は API を呼ばずに失敗することを確認
#[test]
fn test_up_without_credentials() {
    let temp = TempDir::new().unwrap();
    let path = write_settings(temp.path(), SETTINGS);

    flotilla(temp.path())
        .args(["up", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("AZURE_SUBSCRIPTION_ID"));
}
