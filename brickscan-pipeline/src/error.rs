use brickscan_core::ConfigError;
use brickscan_eye::VisionError;
use thiserror::Error;

/// Failures that end a batch before it reaches `Done`
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Vision error: {0}")]
    Vision(#[from] VisionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    Input(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_from_vision() {
        let err: PipelineError = VisionError::Config("bad band".to_string()).into();
        assert!(matches!(err, PipelineError::Vision(_)));
        assert!(err.to_string().contains("bad band"));
    }

    #[test]
    fn test_pipeline_error_from_config() {
        let err: PipelineError = ConfigError::Validation("top_n".to_string()).into();
        assert!(err.to_string().starts_with("Configuration error"));
    }
}
