mod commands;
mod utils;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stackflow")]
#[command(about = "宣言したスタックを、そのままクラウドへ。", long_about = None)]
struct Cli {
    /// 詳細なログを出力する (RUST_LOG が優先)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// スタックをデプロイ（作成・更新・変更なし）
    Deploy {
        /// スタックファイル（省略時は stack.local.yml / stack.yml / stack.yaml を探索）
        #[arg(short, long, env = "STACKFLOW_CONFIG_PATH")]
        file: Option<PathBuf>,
        /// 完了待ちのタイムアウト秒数（省略時は無制限）
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// スタックとステージングバケットを削除
    Remove {
        /// スタックファイル（省略時は stack.local.yml / stack.yml / stack.yaml を探索）
        #[arg(short, long, env = "STACKFLOW_CONFIG_PATH")]
        file: Option<PathBuf>,
        /// 完了待ちのタイムアウト秒数（省略時は無制限）
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログはstderrに出力
    utils::init_logging(cli.verbose);

    match cli.command {
        Commands::Version => {
            println!("stackflow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Deploy { file, timeout } => commands::deploy::handle(file, timeout).await,
        Commands::Remove { file, timeout } => commands::remove::handle(file, timeout).await,
    }
}
