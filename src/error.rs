use thiserror::Error;

use crate::infrastructure::DriverError;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误（启动阶段，致命）
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 页面驱动错误
    #[error("驱动错误: {0}")]
    Driver(#[from] DriverError),

    /// 文件读写错误
    #[error("文件错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 筛选文件不存在
    #[error("筛选文件不存在: {path}，请先创建该文件并写入 job_title / location / job_type")]
    FilterFileMissing { path: String },

    /// 筛选文件无法读取
    #[error("无法读取筛选文件 {path}: {source}")]
    FilterFileUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 缺少必需的筛选项
    #[error("筛选文件缺少必需项: {key}")]
    MissingFilter { key: String },

    /// 启发式配置文件无效
    #[error("启发式配置 {path} 无效: {reason}")]
    HeuristicsInvalid { path: String, reason: String },
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
