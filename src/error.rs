use thiserror::Error;

pub type BotResult<T> = Result<T, BotError>;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // 私钥无法推导出地址，附带脱敏后的显示形式
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Invalid proxy format: {0} (must start with http://, https:// or socks5://)")]
    InvalidProxyFormat(String),

    #[error("Connectivity check failed: {0}")]
    ConnectivityFailure(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    #[error("Activity failed: {0}")]
    ActivityFailure(String),

    #[error("Transport error after {attempts} attempts: {message}")]
    TransportError { attempts: u32, message: String },

    #[error("Malformed stream frame: {0}")]
    StreamParseError(String),

    #[error("Failed to generate authentication payload: {0}")]
    Signing(String),

    #[error("Question pool is empty")]
    EmptyQuestionPool,

    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
}

impl From<config::ConfigError> for BotError {
    fn from(err: config::ConfigError) -> Self {
        BotError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BotError::InvalidProxyFormat("ftp://host:21".to_string());
        assert!(err.to_string().contains("ftp://host:21"));

        let err = BotError::TransportError {
            attempts: 5,
            message: "timed out".to_string(),
        };
        assert_eq!(err.to_string(), "Transport error after 5 attempts: timed out");
    }
}
