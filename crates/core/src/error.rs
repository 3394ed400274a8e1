use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecorderError>;

#[derive(Debug, Error)]
pub enum RecorderError {
	#[error(transparent)]
	Runtime(#[from] wr_runtime::Error),

	#[error("Writer error: {0}")]
	Writer(String),

	#[error("Configuration error: {0}")]
	Config(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	Serde(#[from] serde_json::Error),
}
