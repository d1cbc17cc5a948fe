//! 申请记录服务 - 业务能力层
//!
//! 只负责"把成功的申请追加到日志文件"，不关心流程

use tracing::{debug, warn};

use crate::utils::logging::append_log_line;

/// 申请记录服务
///
/// 职责：
/// - 每成功申请一个职位，追加一行到日志文件
/// - 写失败只记警告，不影响运行
pub struct ApplicationLog {
    log_file_path: String,
}

impl ApplicationLog {
    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            log_file_path: path.into(),
        }
    }

    /// 记录一次成功的申请
    pub async fn record_success(&self, page: usize, listing: usize, title: &str, steps: usize) {
        let line = format!(
            "第 {} 页 | 第 {} 个职位 | {} 步 | {}",
            page, listing, steps, title
        );
        debug!("写入申请记录: {}", self.log_file_path);

        if let Err(e) = append_log_line(&self.log_file_path, &line).await {
            warn!("写入申请记录失败 ({}): {}", self.log_file_path, e);
        }
    }
}
