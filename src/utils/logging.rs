//! 日志工具模块
//!
//! 提供日志初始化、运行日志文件和统计输出的辅助函数

use std::fs;

use anyhow::Result;
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化 tracing 日志
///
/// `RUST_LOG` 优先；否则默认 `info`，`verbose` 时为 `debug`。可以重复调用。
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件（覆盖旧文件，写入表头）
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n职位申请日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 追加一行到日志文件，行首带时间戳
pub async fn append_log_line(log_file_path: &str, line: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .await?;
    let entry = format!(
        "[{}] {}\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        line
    );
    file.write_all(entry.as_bytes()).await?;
    file.flush().await
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 一键申请模式");
    info!("🌐 目标网站: {}", config.target_url);
    info!("📋 筛选文件: {}", config.filter_file);
    info!(
        "🔁 会话丢失重试: 最多 {} 次，退避基数 {}ms",
        config.max_retries, config.retry_base_delay_ms
    );
    info!("🪜 申请流程最多 {} 步", config.max_steps);
    if config.max_pages > 0 {
        info!("📄 最多处理 {} 页", config.max_pages);
    }
    if config.dry_run {
        info!("🧪 DRY_RUN：只识别，不申请");
    }
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `success`: 成功申请数量
/// - `failed`: 申请未完成数量
/// - `total`: 识别为一键申请的数量
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(success: usize, failed: usize, total: usize, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, total);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
