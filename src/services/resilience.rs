//! 重试服务 - 业务能力层
//!
//! 只在"会话丢失"时按指数退避重试，其他失败立即向上返回：
//! 元素找不到 / 超时这类失败，重试同一个操作也不会自愈。

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, warn};

use crate::config::Config;
use crate::infrastructure::{DriverError, DriverResult};

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_retries, config.retry_base_delay())
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// 第 `attempt` 次重试（从 0 开始）前的等待：base × 2^attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// 执行 `op`，会话丢失时最多重试 `max_retries` 次
    ///
    /// 重试用尽后返回最后一次的错误。
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> DriverResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DriverResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_session_loss() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{}: 浏览器会话丢失 (重试 {}/{}), 等待 {:?} 后重试: {}",
                        label,
                        attempt + 1,
                        self.max_retries,
                        delay,
                        e
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if let DriverError::SessionLost(_) = e {
                        error!("{}: 会话丢失，已重试 {} 次仍失败", label, attempt);
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}
