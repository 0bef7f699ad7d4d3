use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("データディレクトリが見つかりません")]
    DataDirNotFound,

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
