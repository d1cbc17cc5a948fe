//! JS 执行器 - 基础设施层
//!
//! 持有一个标签页的 page 资源，只暴露"执行 JS"的能力

use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::infrastructure::driver::{DriverError, DriverResult};

/// 浏览器返回的、表示会话已经失效的错误信息片段
const SESSION_LOSS_MARKERS: &[&str] = &[
    "invalid session",
    "session closed",
    "target closed",
    "no such window",
    "connection closed",
    "websocket",
];

/// JS 执行器
///
/// 职责：
/// - 持有一个标签页的 Page
/// - 暴露 eval() 能力
/// - 把 CDP 错误归类为 `DriverError`（唯一做字符串判断的地方）
/// - 不认识职位 / 申请流程
#[derive(Clone)]
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 标签页的 target id
    pub fn target_id(&self) -> String {
        self.page.target_id().inner().clone()
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> DriverResult<JsonValue> {
        let result = self
            .page
            .evaluate(js_code.into())
            .await
            .map_err(classify_cdp_error)?;
        result
            .into_value::<JsonValue>()
            .map_err(|e| DriverError::Script(format!("无法解析脚本返回值: {}", e)))
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> DriverResult<T> {
        let json_value = self.eval(js_code).await?;
        serde_json::from_value(json_value)
            .map_err(|e| DriverError::Script(format!("脚本返回值类型不符: {}", e)))
    }

    /// 导航到指定 URL
    pub async fn goto(&self, url: &str) -> DriverResult<()> {
        self.page.goto(url).await.map_err(classify_cdp_error)?;
        Ok(())
    }

    /// 关闭标签页
    pub async fn close(self) -> DriverResult<()> {
        self.page.close().await.map_err(classify_cdp_error)
    }
}

/// 把 CDP 错误归类为驱动层错误
pub fn classify_cdp_error(err: CdpError) -> DriverError {
    match err {
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
            DriverError::SessionLost(err.to_string())
        }
        other => classify_message(other.to_string()),
    }
}

/// 按错误信息归类
pub fn classify_message(message: String) -> DriverError {
    let lower = message.to_lowercase();
    if SESSION_LOSS_MARKERS.iter().any(|m| lower.contains(m)) {
        DriverError::SessionLost(message)
    } else {
        DriverError::Script(message)
    }
}
