use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 服务错误类型
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ServerError {
    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(String),
    /// 缓存 / Redis 错误
    #[error("Cache error: {0}")]
    Cache(String),
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// 验证错误
    #[error("Validation error: {0}")]
    Validation(String),
    /// 资源未找到
    #[error("Not found: {0}")]
    NotFound(String),
    /// 状态不允许该操作
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),
    /// 配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for ServerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ServerError::NotFound("row not found".to_string()),
            other => ServerError::Database(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for ServerError {
    fn from(err: redis::RedisError) -> Self {
        ServerError::Cache(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ServerError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        ServerError::Timeout(err.to_string())
    }
}

impl From<uuid::Error> for ServerError {
    fn from(err: uuid::Error) -> Self {
        ServerError::Validation(format!("invalid uuid: {}", err))
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: ServerError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[test]
    fn test_display_includes_context() {
        let err = ServerError::InvalidState("report already resolved".to_string());
        assert_eq!(err.to_string(), "Invalid state: report already resolved");
    }
}
