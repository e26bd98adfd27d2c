use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error: {0}")]
    Anyhow(#[from] anyhow::Error),

    /// Malformed schedule or sound fields, rejected at the store boundary.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Exact wake timers are not granted by the host.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A referenced media file is missing or unreadable at play time.
    #[error("Resource unavailable: {0}")]
    Resource(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl AppError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn permission_denied<S: Into<String>>(msg: S) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn resource<S: Into<String>>(msg: S) -> Self {
        Self::Resource(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn operation_failed<S: Into<String>>(msg: S) -> Self {
        Self::OperationFailed(msg.into())
    }

    /// Whether the message can be logged verbatim (no paths or driver detail).
    pub fn is_log_safe(&self) -> bool {
        match self {
            Self::Database(_) | Self::Io(_) | Self::Anyhow(_) => false,
            Self::Validation(_)
            | Self::PermissionDenied(_)
            | Self::Resource(_)
            | Self::Config(_)
            | Self::OperationFailed(_) => true,
        }
    }

    pub fn to_safe_string(&self) -> String {
        if self.is_log_safe() {
            self.to_string()
        } else {
            match self {
                Self::Database(_) => "Database operation failed".to_string(),
                Self::Io(_) => "File operation failed".to_string(),
                Self::Anyhow(_) => "Operation failed".to_string(),
                _ => self.to_string(),
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_string_hides_driver_detail() {
        let err = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.to_safe_string(), "Database operation failed");
        assert!(!err.is_log_safe());
    }

    #[test]
    fn test_safe_string_keeps_domain_messages() {
        let err = AppError::validation("weekday mask must not be empty");
        assert!(err.is_log_safe());
        assert_eq!(
            err.to_safe_string(),
            "Invalid input: weekday mask must not be empty"
        );
    }
}
