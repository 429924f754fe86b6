use colored::Colorize;
use stackflow_cloud::{CompletionPoller, PollerConfig, StackReconciler, StateManager};
use stackflow_cloud_aws::AwsBackends;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// tracing の初期化（RUST_LOG があればそちらを優先）
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// スタックファイルの決定（--file 指定がなければ探索）
pub fn resolve_stack_file(file: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match file {
        Some(path) if path.exists() => Ok(path),
        Some(path) => Err(anyhow::anyhow!(
            "スタックファイルが見つかりません: {}",
            path.display()
        )),
        None => Ok(stackflow_config::find_stack_file()?),
    }
}

pub fn print_stack_file(path: &Path) {
    println!("スタックファイル: {}", path.display().to_string().cyan());
}

/// AWS バックエンドとローカル状態からリコンサイラを組み立てる
pub async fn build_reconciler(
    region: &str,
    project_root: &Path,
    timeout: Option<u64>,
) -> StackReconciler {
    let aws = AwsBackends::load(region).await;
    tracing::debug!(region, "Loaded AWS configuration");
    let poller = CompletionPoller::new(PollerConfig {
        timeout: timeout.map(Duration::from_secs),
        ..Default::default()
    });
    cancel_on_ctrl_c(poller.cancellation_token());

    StackReconciler::new(
        aws.stacks,
        aws.store,
        aws.provisioner,
        Arc::new(StateManager::new(project_root)),
    )
    .with_poller(poller)
}

/// Ctrl-C で完了待ちを中断する
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling the wait");
            token.cancel();
        }
    });
}

pub fn print_outputs(outputs: &BTreeMap<String, String>) {
    if outputs.is_empty() {
        return;
    }
    println!();
    println!("{}", "出力:".bold());
    for (key, value) in outputs {
        println!("  {} = {}", key.cyan(), value);
    }
}
