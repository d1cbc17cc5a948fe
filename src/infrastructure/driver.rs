//! UI 驱动能力面 - 基础设施层
//!
//! 上层（services / workflow / orchestrator）只通过 `UiDriver` 与页面交互，
//! 不认识 chromiumoxide，也不认识具体的招聘网站。
//!
//! 约定：
//! - `ElementHandle` 只在下一次导航之前有效，过期句柄返回 `DriverError::StaleElement`
//! - 当前交互上下文（标签页 + iframe 路径）是显式的值 `ActiveContext`，
//!   可以读取、保存、再切换回去

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// 轮询等待条件的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// 驱动层结果类型
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// 驱动层错误
#[derive(Debug, Error)]
pub enum DriverError {
    /// 浏览器会话 / 连接已失效
    #[error("浏览器会话已失效: {0}")]
    SessionLost(String),

    /// 元素句柄已过期（页面导航或 DOM 变化之后）
    #[error("元素句柄 {0} 已过期")]
    StaleElement(ElementHandle),

    /// 找不到元素
    #[error("找不到元素: {0}")]
    NotFound(String),

    /// 等待超时
    #[error("等待 {what} 超时 ({timeout:?})")]
    Timeout { what: String, timeout: Duration },

    /// 交互上下文（标签页 / iframe）不可用
    #[error("交互上下文不可用: {0}")]
    ContextUnavailable(String),

    /// 脚本执行失败
    #[error("执行脚本失败: {0}")]
    Script(String),
}

/// 失败分类，重试策略只依据这个分类做决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 会话丢失，等待后可能恢复
    SessionLoss,
    /// 元素不存在 / 过期 / 超时，重试同一个操作不会自愈
    ElementMissing,
    /// 其余逻辑错误
    Logic,
}

impl DriverError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DriverError::SessionLost(_) => FailureKind::SessionLoss,
            DriverError::StaleElement(_)
            | DriverError::NotFound(_)
            | DriverError::Timeout { .. }
            | DriverError::ContextUnavailable(_) => FailureKind::ElementMissing,
            DriverError::Script(_) => FailureKind::Logic,
        }
    }

    pub fn is_session_loss(&self) -> bool {
        self.kind() == FailureKind::SessionLoss
    }
}

/// 元素定位方式（CSS 选择器）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator(String);

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator(selector.into())
    }

    pub fn selector(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "css={}", self.0)
    }
}

/// 指向页面中一个元素的不透明句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(u64);

impl ElementHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 一个标签页 / 窗口
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextHandle(String);

impl ContextHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 当前交互上下文：哪个标签页，以及进入了哪些 iframe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveContext {
    pub window: ContextHandle,
    pub frames: Vec<ElementHandle>,
}

impl ActiveContext {
    /// 某个标签页的顶层文档
    pub fn top_level(window: ContextHandle) -> Self {
        Self {
            window,
            frames: Vec::new(),
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.frames.is_empty()
    }
}

impl fmt::Display for ActiveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.window)?;
        for frame in &self.frames {
            write!(f, " > iframe{}", frame)?;
        }
        Ok(())
    }
}

/// `wait_until` 可以等待的条件
#[derive(Debug, Clone)]
pub enum WaitCondition {
    /// 至少出现一个匹配元素
    Present(Locator),
    /// 元素可见且可用
    Clickable(ElementHandle),
    /// 第一个文本包含 `text`（不区分大小写）且可点击的匹配元素
    ClickableWithText { locator: Locator, text: String },
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitCondition::Present(locator) => write!(f, "出现 {}", locator),
            WaitCondition::Clickable(el) => write!(f, "元素 {} 可点击", el),
            WaitCondition::ClickableWithText { locator, text } => {
                write!(f, "{} 中文本含 '{}' 的可点击元素", locator, text)
            }
        }
    }
}

/// UI 驱动能力
///
/// 所有操作都作用于当前 `ActiveContext`。
#[async_trait]
pub trait UiDriver: Send + Sync {
    /// 查找所有匹配元素（文档顺序）
    async fn find_all(&self, locator: &Locator) -> DriverResult<Vec<ElementHandle>>;

    /// 在某个元素内部查找
    async fn find_within(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> DriverResult<Vec<ElementHandle>>;

    async fn click(&self, element: &ElementHandle) -> DriverResult<()>;

    async fn scroll_into_view(&self, element: &ElementHandle) -> DriverResult<()>;

    /// 计算样式属性值，例如 `background-color`、`display`
    async fn computed_style(&self, element: &ElementHandle, property: &str)
        -> DriverResult<String>;

    /// 元素可见文本（已 trim）
    async fn text(&self, element: &ElementHandle) -> DriverResult<String>;

    async fn attribute(&self, element: &ElementHandle, name: &str)
        -> DriverResult<Option<String>>;

    async fn is_visible(&self, element: &ElementHandle) -> DriverResult<bool>;

    async fn is_enabled(&self, element: &ElementHandle) -> DriverResult<bool>;

    /// 清空输入框后写入文本
    async fn type_text(&self, element: &ElementHandle, text: &str) -> DriverResult<()>;

    /// 在输入框上提交（相当于回车）
    async fn submit(&self, element: &ElementHandle) -> DriverResult<()>;

    /// 执行任意脚本，`args` 在脚本中以 `arguments[i]` 访问
    async fn execute_script(
        &self,
        script: &str,
        args: &[ElementHandle],
    ) -> DriverResult<JsonValue>;

    /// 当前文档的全部文本
    async fn current_page_text(&self) -> DriverResult<String>;

    async fn navigate(&self, url: &str) -> DriverResult<()>;

    /// 所有打开的标签页 / 窗口
    async fn list_contexts(&self) -> DriverResult<Vec<ContextHandle>>;

    async fn active_context(&self) -> DriverResult<ActiveContext>;

    async fn switch_context(&self, target: &ActiveContext) -> DriverResult<()>;

    /// 进入当前文档中的某个 iframe
    async fn enter_frame(&self, frame: &ElementHandle) -> DriverResult<()>;

    /// 关闭当前标签页；之后必须显式切换到其他上下文
    async fn close_context(&self) -> DriverResult<()>;

    /// 轮询等待条件成立，返回满足条件的元素
    ///
    /// 会话丢失立即返回；`Clickable` 等的那个元素过期也立即返回，不会等到超时。
    async fn wait_until(
        &self,
        condition: &WaitCondition,
        timeout: Duration,
    ) -> DriverResult<Vec<ElementHandle>> {
        let deadline = Instant::now() + timeout;
        loop {
            match check_condition(self, condition).await {
                Ok(Some(found)) => return Ok(found),
                Ok(None) => {}
                Err(e @ DriverError::SessionLost(_)) | Err(e @ DriverError::StaleElement(_)) => {
                    return Err(e)
                }
                Err(e) => debug!("等待 {} 时出错（继续等待）: {}", condition, e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(DriverError::Timeout {
                    what: condition.to_string(),
                    timeout,
                });
            }
            sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

/// 把可以跳过的失败变成 `None`，只保留会话丢失
///
/// 用于"逐个检查候选元素"的场景：某个候选过期或找不到时换下一个。
pub fn recoverable<T>(result: DriverResult<T>) -> DriverResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_session_loss() => Err(e),
        Err(e) => {
            debug!("忽略可恢复的驱动错误: {}", e);
            Ok(None)
        }
    }
}

async fn check_condition<D: UiDriver + ?Sized>(
    driver: &D,
    condition: &WaitCondition,
) -> DriverResult<Option<Vec<ElementHandle>>> {
    match condition {
        WaitCondition::Present(locator) => {
            let found = driver.find_all(locator).await?;
            Ok((!found.is_empty()).then_some(found))
        }
        WaitCondition::Clickable(element) => {
            let ready = driver.is_visible(element).await? && driver.is_enabled(element).await?;
            Ok(ready.then(|| vec![*element]))
        }
        WaitCondition::ClickableWithText { locator, text } => {
            // 候选在重新渲染时会过期，跳过它等下一轮
            let needle = text.to_lowercase();
            for element in driver.find_all(locator).await? {
                let Some(label) = recoverable(driver.text(&element).await)? else {
                    continue;
                };
                if !label.to_lowercase().contains(&needle) {
                    continue;
                }
                let visible = recoverable(driver.is_visible(&element).await)?.unwrap_or(false);
                let enabled = recoverable(driver.is_enabled(&element).await)?.unwrap_or(false);
                if visible && enabled {
                    return Ok(Some(vec![element]));
                }
            }
            Ok(None)
        }
    }
}
