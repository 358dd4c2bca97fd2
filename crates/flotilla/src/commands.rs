pub mod down;
pub mod up;
pub mod validate;

use colored::Colorize;
use flotilla_cloud_azure::{ArmClient, AzureConfig, operation_options_from_settings};
use flotilla_config::Settings;
use std::path::Path;

/// 設定ファイルを決定してロード
pub fn load_settings(config: Option<&Path>) -> anyhow::Result<Settings> {
    let path = match config {
        Some(path) => path.to_path_buf(),
        None => flotilla_config::find_settings_file()?,
    };
    println!("設定ファイル: {}", path.display().to_string().cyan());
    let settings = flotilla_config::load_settings(&path)?;
    tracing::debug!(
        path = %path.display(),
        vm_count = settings.virtual_machines.vm_count,
        "settings loaded"
    );
    Ok(settings)
}

/// 設定から ARM クライアントを構築
pub fn build_client(settings: &Settings) -> anyhow::Result<ArmClient> {
    let client = ArmClient::new(AzureConfig::from_settings(settings)?)?
        .with_operation_options(operation_options_from_settings(settings)?);
    Ok(client)
}
