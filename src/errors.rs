use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("REMOTE_UNAVAILABLE: {table}: {message}")]
    RemoteUnavailable { table: String, message: String },
    #[error("NO_REMOTE_CONFIGURED: tenant {0} has no remote data source")]
    NoRemoteConfigured(String),
    #[error("NO_CHANNEL_CONFIGURED: no messaging channel for tenant {0}")]
    NoChannelConfigured(String),
    #[error("NO_BOT_CREDENTIAL: messaging bot token is not set")]
    NoBotCredential,
    #[error("MESSAGING_FAILED: {0}")]
    Messaging(String),
    #[error("DUPLICATE_KEY: {collection}/{key}")]
    DuplicateKey { collection: String, key: String },
    #[error("STORE_UNAVAILABLE: {0}")]
    StoreUnavailable(String),
    #[error("STORE_FAILURE: {0}")]
    Store(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    pub fn remote(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            table: table.into(),
            message: message.into(),
        }
    }

    /// True for failures caused by missing configuration rather than I/O.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::NoRemoteConfigured(_) | Self::NoChannelConfigured(_) | Self::NoBotCredential
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Store(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::InvalidInput(value.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(value: reqwest::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for AppError {
    fn from(value: rust_xlsxwriter::XlsxError) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn remote_error_names_the_table() {
        let error = AppError::remote("payments", "503 Service Unavailable");
        assert_eq!(
            error.to_string(),
            "REMOTE_UNAVAILABLE: payments: 503 Service Unavailable"
        );
        assert!(!error.is_configuration_error());
    }

    #[test]
    fn missing_channel_is_a_configuration_error() {
        assert!(AppError::NoChannelConfigured("t1".to_string()).is_configuration_error());
        assert!(AppError::NoBotCredential.is_configuration_error());
    }
}
