pub mod error;
pub mod naming;
pub mod settings;

pub use error::*;
pub use settings::*;

use std::path::{Path, PathBuf};

/// Flotilla の設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("flotilla");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// 設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 FLOTILLA_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: flotilla.local.yaml, flotilla.yaml
/// 3. ./.flotilla/ ディレクトリ内: 同様の順序
/// 4. ~/.config/flotilla/flotilla.yaml (グローバル設定)
pub fn find_settings_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var("FLOTILLA_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    let candidates = ["flotilla.local.yaml", "flotilla.yaml"];

    for filename in &candidates {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let local_dir = current_dir.join(".flotilla");
    if local_dir.is_dir() {
        for filename in &candidates {
            let path = local_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("flotilla").join("flotilla.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::SettingsFileNotFound)
}

/// 設定ファイルを読み込んで検証する
pub fn load_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)?;
    Settings::from_yaml(&content)
}
