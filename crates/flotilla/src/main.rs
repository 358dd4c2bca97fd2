mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flotilla")]
#[command(about = "Azure 上の仮想マシン群を構築・撤去する", long_about = None)]
struct Cli {
    /// 設定ファイルのパス (省略時は自動検出)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// デバッグログを出力
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 仮想マシン群を構築
    Up,
    /// 仮想マシン群を撤去
    Down {
        /// サブネットと仮想ネットワークも削除する
        #[arg(long)]
        delete_vnet: bool,
        /// 削除の完了を待たない
        #[arg(long)]
        no_wait: bool,
    },
    /// 設定ファイルを検証
    Validate,
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログはstderrに出力
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Version => {
            println!("flotilla {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Validate => {
            commands::validate::handle(cli.config.as_deref()).await?;
        }
        Commands::Up => {
            commands::up::handle(cli.config.as_deref()).await?;
        }
        Commands::Down {
            delete_vnet,
            no_wait,
        } => {
            commands::down::handle(cli.config.as_deref(), delete_vnet, !no_wait).await?;
        }
    }

    Ok(())
}
