//! 一键申请流程 - 流程层
//!
//! 核心职责：把"一个职位的一键申请"从点击申请按钮推进到终态
//!
//! 状态机：
//! 1. Submitting：点击申请按钮；打开了新标签页就切过去，否则进入申请 iframe
//! 2. AwaitingStep：最多 `max_steps` 步
//!    - 页面文本出现成功提示 → Succeeded
//!    - 找到继续按钮（先找 display=flex 的 "Weiter"，再按文案列表兜底）→ 点击，步数 +1
//!    - 找不到 → Exhausted
//! 3. 步数用完仍未成功 → Exhausted
//!
//! 无论哪个分支结束（包括出错），都会关闭新标签页并切回原来的上下文。

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::infrastructure::{
    recoverable, ActiveContext, ContextHandle, DriverResult, ElementHandle, Locator, UiDriver,
};
use crate::models::Heuristics;
use crate::services::highlight;
use crate::workflow::apply_ctx::ApplyCtx;

const CONTEXT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// 申请流程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepperState {
    Submitting,
    AwaitingStep,
    Succeeded,
    Exhausted,
    Failed,
}

impl fmt::Display for StepperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepperState::Submitting => "提交中",
            StepperState::AwaitingStep => "等待下一步",
            StepperState::Succeeded => "申请成功",
            StepperState::Exhausted => "无法继续",
            StepperState::Failed => "失败",
        };
        f.write_str(name)
    }
}

/// 申请结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub state: StepperState,
    /// 点击过的继续按钮个数
    pub steps: usize,
}

impl ApplyOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == StepperState::Succeeded
    }
}

/// 一次申请过程中的可变状态，申请结束即丢弃
struct ApplySession {
    state: StepperState,
    steps: usize,
    /// 申请按钮打开的新标签页
    opened: Option<ContextHandle>,
    /// 当前这一步还没尝试过的兜底文案
    pending_labels: Vec<String>,
}

impl ApplySession {
    fn new() -> Self {
        Self {
            state: StepperState::Submitting,
            steps: 0,
            opened: None,
            pending_labels: Vec::new(),
        }
    }

    fn outcome(&self) -> ApplyOutcome {
        ApplyOutcome {
            state: self.state,
            steps: self.steps,
        }
    }
}

/// 一键申请流程
///
/// - 不持有任何资源（driver 由调用方传入）
/// - 只依赖业务能力（services）和启发式配置
pub struct ApplicationStepper {
    heuristics: Heuristics,
    max_steps: usize,
    success_phrases: Vec<String>,
    continue_labels: Vec<String>,
}

impl ApplicationStepper {
    pub fn new(heuristics: &Heuristics, max_steps: usize) -> Self {
        Self {
            heuristics: heuristics.clone(),
            max_steps,
            success_phrases: lowercase_all(&heuristics.success_phrases),
            continue_labels: lowercase_all(&heuristics.continue_labels),
        }
    }

    /// 从点击 `affordance` 开始完成一次申请
    ///
    /// 会话丢失原样返回（交给重试层），其他失败记为 `Failed`。
    /// 返回前一定已经回到调用时的上下文。
    pub async fn run<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        ctx: &ApplyCtx,
        affordance: &ElementHandle,
    ) -> DriverResult<ApplyOutcome> {
        let original = driver.active_context().await?;
        let mut session = ApplySession::new();

        let result = self.drive(driver, ctx, affordance, &mut session).await;
        let cleanup = self
            .restore_context(driver, ctx, &original, session.opened.as_ref())
            .await;

        match (result, cleanup) {
            (Err(e), _) if e.is_session_loss() => Err(e),
            (_, Err(e)) if e.is_session_loss() => Err(e),
            (Ok(()), Ok(())) => {
                info!(
                    "{} 申请流程结束: {} (共 {} 步)",
                    ctx, session.state, session.steps
                );
                Ok(session.outcome())
            }
            (Err(e), _) | (Ok(()), Err(e)) => {
                warn!(
                    "{} ❌ 申请流程失败 (状态: {}, 已完成 {} 步): {}",
                    ctx, session.state, session.steps, e
                );
                session.state = StepperState::Failed;
                Ok(session.outcome())
            }
        }
    }

    async fn drive<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        ctx: &ApplyCtx,
        affordance: &ElementHandle,
        session: &mut ApplySession,
    ) -> DriverResult<()> {
        let timings = &self.heuristics.timings;

        // ========== Submitting ==========
        let before: HashSet<ContextHandle> = driver.list_contexts().await?.into_iter().collect();
        info!("{} 📝 点击一键申请按钮", ctx);
        highlight(driver, affordance, timings.highlight()).await;
        driver.click(affordance).await?;

        self.enter_application(driver, ctx, &before, session).await?;
        session.state = StepperState::AwaitingStep;

        // ========== AwaitingStep ==========
        while session.steps < self.max_steps {
            if self.page_shows_success(driver).await? {
                info!("{} ✅ 检测到申请成功提示", ctx);
                session.state = StepperState::Succeeded;
                return Ok(());
            }

            let Some(control) = self
                .find_continue_control(driver, ctx, affordance, session)
                .await?
            else {
                info!(
                    "{} ⚠️ 第 {} 步找不到继续按钮，放弃该申请",
                    ctx,
                    session.steps + 1
                );
                session.state = StepperState::Exhausted;
                return Ok(());
            };

            highlight(driver, &control, timings.highlight()).await;
            driver.click(&control).await?;
            session.steps += 1;
            debug!("{} 已完成第 {}/{} 步", ctx, session.steps, self.max_steps);
            sleep(timings.step_settle()).await;
        }

        // 最后一次点击之后可能直接到了成功页
        if self.page_shows_success(driver).await? {
            info!("{} ✅ 检测到申请成功提示", ctx);
            session.state = StepperState::Succeeded;
        } else {
            warn!("{} ⚠️ 已达到最大步数 {}，放弃该申请", ctx, self.max_steps);
            session.state = StepperState::Exhausted;
        }
        Ok(())
    }

    /// 点击申请按钮后切到申请表单所在的上下文
    ///
    /// 先等新标签页，没有的话再等申请 iframe；两者都没有就留在当前页面。
    async fn enter_application<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        ctx: &ApplyCtx,
        before: &HashSet<ContextHandle>,
        session: &mut ApplySession,
    ) -> DriverResult<()> {
        let timings = &self.heuristics.timings;

        let deadline = Instant::now() + timings.new_context_wait();
        loop {
            let opened = driver
                .list_contexts()
                .await?
                .into_iter()
                .find(|c| !before.contains(c));
            if let Some(window) = opened {
                info!("{} 申请表单在新标签页中打开: {}", ctx, window);
                session.opened = Some(window.clone());
                return driver.switch_context(&ActiveContext::top_level(window)).await;
            }
            if !poll_again(deadline).await {
                break;
            }
        }

        let frames = self.heuristics.application_frame_locators();
        let deadline = Instant::now() + timings.frame_wait();
        loop {
            if let Some(frame) = first_visible(driver, &frames).await? {
                info!("{} 申请表单在 iframe{} 中", ctx, frame);
                driver.enter_frame(&frame).await?;
                return Ok(());
            }
            if !poll_again(deadline).await {
                break;
            }
        }

        debug!("{} 没有新标签页或申请 iframe，在当前页面继续", ctx);
        Ok(())
    }

    async fn page_shows_success<D: UiDriver + ?Sized>(&self, driver: &D) -> DriverResult<bool> {
        let text = driver.current_page_text().await?.to_lowercase();
        Ok(self.success_phrases.iter().any(|p| text.contains(p.as_str())))
    }

    /// 找这一步的继续按钮
    ///
    /// 申请按钮本身不算：留在职位页时它的文案也会命中 "apply"。
    async fn find_continue_control<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        ctx: &ApplyCtx,
        affordance: &ElementHandle,
        session: &mut ApplySession,
    ) -> DriverResult<Option<ElementHandle>> {
        if let Some(primary) = self.find_primary_continue(driver, affordance).await? {
            debug!(
                "{} 找到首选按钮 '{}'",
                ctx, self.heuristics.primary_continue_label
            );
            return Ok(Some(primary));
        }

        // 兜底：收集一次所有可交互元素的文案，再按文案列表顺序匹配
        let candidates = self.interactive_candidates(driver, affordance).await?;
        session.pending_labels = self.continue_labels.clone();
        while !session.pending_labels.is_empty() {
            let label = session.pending_labels.remove(0);
            for (element, text) in candidates.iter().filter(|(_, t)| t.contains(label.as_str())) {
                let visible = recoverable(driver.is_visible(element).await)?.unwrap_or(false);
                let enabled = recoverable(driver.is_enabled(element).await)?.unwrap_or(false);
                if visible && enabled {
                    debug!(
                        "{} 按文案 '{}' 找到按钮 {} ('{}')，剩余 {} 个文案未尝试",
                        ctx,
                        label,
                        element,
                        text,
                        session.pending_labels.len()
                    );
                    return Ok(Some(*element));
                }
            }
        }
        Ok(None)
    }

    /// 文案完全等于 "Weiter" 且 display 为 flex 的按钮
    ///
    /// 页面上经常有一个同名但不显示的按钮，只看文案会点错。
    async fn find_primary_continue<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        excluded: &ElementHandle,
    ) -> DriverResult<Option<ElementHandle>> {
        let locator = Locator::css(self.heuristics.primary_continue_selector.as_str());
        let Some(found) = recoverable(driver.find_all(&locator).await)? else {
            return Ok(None);
        };

        for element in found.into_iter().filter(|e| e != excluded) {
            let Some(text) = recoverable(driver.text(&element).await)? else {
                continue;
            };
            if text != self.heuristics.primary_continue_label {
                continue;
            }
            let display = recoverable(driver.computed_style(&element, "display").await)?;
            if display.as_deref() == Some(self.heuristics.primary_continue_display.as_str()) {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    /// 除 `excluded` 外所有可交互元素及其小写文案（文档顺序，去重）
    async fn interactive_candidates<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        excluded: &ElementHandle,
    ) -> DriverResult<Vec<(ElementHandle, String)>> {
        let mut seen = HashSet::from([*excluded]);
        let mut candidates = Vec::new();
        for locator in self.heuristics.interactive_locators() {
            let Some(found) = recoverable(driver.find_all(&locator).await)? else {
                continue;
            };
            for element in found {
                if !seen.insert(element) {
                    continue;
                }
                let Some(mut text) = recoverable(driver.text(&element).await)? else {
                    continue;
                };
                if text.is_empty() {
                    // <input type="submit"> 的文案在 value 上
                    text = recoverable(driver.attribute(&element, "value").await)?
                        .flatten()
                        .unwrap_or_default();
                }
                if !text.is_empty() {
                    candidates.push((element, text.to_lowercase()));
                }
            }
        }
        Ok(candidates)
    }

    /// 关闭新标签页并回到原来的上下文
    async fn restore_context<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        ctx: &ApplyCtx,
        original: &ActiveContext,
        opened: Option<&ContextHandle>,
    ) -> DriverResult<()> {
        if let Some(window) = opened {
            let closed = match driver
                .switch_context(&ActiveContext::top_level(window.clone()))
                .await
            {
                Ok(()) => driver.close_context().await,
                Err(e) => Err(e),
            };
            match closed {
                Ok(()) => debug!("{} 已关闭申请标签页 {}", ctx, window),
                Err(e) if e.is_session_loss() => return Err(e),
                Err(e) => warn!("{} 关闭申请标签页 {} 失败: {}", ctx, window, e),
            }
        }

        let current = driver.active_context().await?;
        if current != *original || opened.is_some() {
            driver.switch_context(original).await?;
            debug!("{} 已切回 {}", ctx, original);
        }
        Ok(())
    }
}

fn lowercase_all(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

/// 还没到截止时间就等一个轮询间隔并返回 true
async fn poll_again(deadline: Instant) -> bool {
    let now = Instant::now();
    if now >= deadline {
        return false;
    }
    sleep(CONTEXT_POLL_INTERVAL.min(deadline - now)).await;
    true
}

async fn first_visible<D: UiDriver + ?Sized>(
    driver: &D,
    locators: &[Locator],
) -> DriverResult<Option<ElementHandle>> {
    for locator in locators {
        let Some(found) = recoverable(driver.find_all(locator).await)? else {
            continue;
        };
        for element in found {
            if recoverable(driver.is_visible(&element).await)?.unwrap_or(false) {
                return Ok(Some(element));
            }
        }
    }
    Ok(None)
}
