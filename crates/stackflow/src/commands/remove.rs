use crate::utils;
use colored::Colorize;
use stackflow_cloud::{StateManager, StateStore};
use std::path::PathBuf;

pub async fn handle(file: Option<PathBuf>, timeout: Option<u64>) -> anyhow::Result<()> {
    println!("{}", "削除を開始します...".blue().bold());

    let stack_file = utils::resolve_stack_file(file)?;
    utils::print_stack_file(&stack_file);

    let project_root = stackflow_config::project_root(&stack_file);
    tracing::debug!("Project root: {}", project_root.display());
    let state = StateManager::new(&project_root);

    let Some(current) = state.load().await? else {
        println!("{}", "削除対象のスタックはありません".yellow());
        return Ok(());
    };
    println!(
        "スタック: {} ({})",
        current.stack_name.cyan(),
        current.region
    );
    if !current.external_bucket {
        println!("バケット: {}", current.bucket.cyan());
    }

    let lock = state.acquire_lock().await?;

    let reconciler = utils::build_reconciler(&current.region, &project_root, timeout).await;
    let result = reconciler.remove().await;
    lock.release().await?;
    result?;

    println!();
    println!("{} {}", "✓".green().bold(), "削除しました".green());

    Ok(())
}
