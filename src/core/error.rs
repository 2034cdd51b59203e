use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid configuration: {}", .violations.join("; "))]
pub struct ConfigError {
    pub violations: Vec<String>,
}

impl ConfigError {
    pub fn check(violations: Vec<String>) -> Result<(), ConfigError> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { violations })
        }
    }
}

#[derive(Debug, Error)]
pub enum CalcError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

pub type CalcResult<T> = Result<T, CalcError>;
