use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "スタックファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: stack.local.yml, stack.yml, stack.yaml\n\
        - ./.stackflow/ ディレクトリ\n\
        - ~/.config/stackflow/stack.yml\n\
        または STACKFLOW_CONFIG_PATH 環境変数で直接指定できます"
    )]
    StackFileNotFound,

    #[error("スタックファイルの形式が不正です ({path}): {message}")]
    InvalidStackFile { path: PathBuf, message: String },

    #[error("テンプレートの読み込みに失敗しました: {0}")]
    Template(#[from] stackflow_template::TemplateError),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
