use crate::utils;
use colored::Colorize;
use stackflow_cloud::{ActionType, DEFAULT_REGION, StateManager};
use std::path::PathBuf;

pub async fn handle(file: Option<PathBuf>, timeout: Option<u64>) -> anyhow::Result<()> {
    println!("{}", "デプロイを開始します...".blue().bold());

    let stack_file = utils::resolve_stack_file(file)?;
    utils::print_stack_file(&stack_file);

    let inputs = stackflow_config::load_stack_file(&stack_file)?;
    let project_root = stackflow_config::project_root(&stack_file);
    tracing::debug!("Project root: {}", project_root.display());
    let region = inputs
        .region
        .clone()
        .unwrap_or_else(|| DEFAULT_REGION.to_string());

    if let Some(name) = &inputs.stack_name {
        println!("スタック: {} ({})", name.cyan(), region);
    }

    // 同じ状態ファイルに対する同時実行を防ぐ
    let lock = StateManager::new(&project_root).acquire_lock().await?;

    let reconciler = utils::build_reconciler(&region, &project_root, timeout).await;
    let result = reconciler.deploy(inputs).await;
    lock.release().await?;
    let result = result?;

    let summary = match result.action {
        ActionType::Create => "スタックを作成しました".to_string(),
        ActionType::Update => "スタックを更新しました".to_string(),
        ActionType::NoOp => "変更はありません".to_string(),
    };
    println!();
    println!(
        "{} {} ({}ms)",
        "✓".green().bold(),
        summary.green(),
        result.duration_ms
    );
    utils::print_outputs(&result.outputs);

    Ok(())
}
