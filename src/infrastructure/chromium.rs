//! Chromium 驱动 - 基础设施层
//!
//! 用 chromiumoxide 实现 `UiDriver`。所有元素操作都通过注入 JS 完成：
//! 页面里维护一个元素登记表 `window.__jobpilot`，Rust 侧只持有
//! (标签页, 登记表 epoch, 槽位) 三元组。页面导航后登记表重建、epoch 改变，
//! 旧句柄自然失效并报告为 `StaleElement`。

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chromiumoxide::Browser;
use chromiumoxide::Page;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::infrastructure::driver::{
    ActiveContext, ContextHandle, DriverError, DriverResult, ElementHandle, Locator, UiDriver,
};
use crate::infrastructure::js_executor::{classify_cdp_error, JsExecutor};

/// 每个脚本共享的前置代码
const PRELUDE: &str = r#"
    const reg = (window.__jobpilot = window.__jobpilot || {
        epoch: Math.random().toString(36).slice(2),
        next: 0,
        nodes: new Map(),
        slots: new WeakMap()
    });
    const lookup = (ref) => {
        if (!ref || ref[0] !== reg.epoch) return null;
        const el = reg.nodes.get(ref[1]);
        return el && el.isConnected ? el : null;
    };
    const track = (el) => {
        let i = reg.slots.get(el);
        if (i === undefined) {
            i = reg.next++;
            reg.nodes.set(i, el);
            reg.slots.set(el, i);
        }
        return i;
    };
    // 移除已脱离文档的节点，返回被移除的槽位
    const prune = () => {
        const gone = [];
        for (const [i, el] of reg.nodes) {
            if (!el.isConnected) {
                reg.nodes.delete(i);
                reg.slots.delete(el);
                gone.push(i);
            }
        }
        return gone;
    };
    const activeDoc = (frames) => {
        let doc = document;
        for (const ref of frames) {
            const frame = lookup(ref);
            if (!frame) return null;
            try { doc = frame.contentDocument; } catch (e) { return null; }
            if (!doc) return null;
        }
        return doc;
    };
    const query = (root, selector) => Array.from(root.querySelectorAll(selector));
"#;

/// 脚本统一返回格式
#[derive(Debug, Default, Deserialize)]
struct ScriptReply {
    #[serde(default)]
    ok: JsonValue,
    #[serde(default)]
    epoch: Option<String>,
    #[serde(default)]
    stale: bool,
    /// 本次查询前清理掉的槽位
    #[serde(default)]
    gone: Vec<u64>,
    #[serde(default, rename = "noFrame")]
    no_frame: bool,
    #[serde(default)]
    error: Option<String>,
}

/// 句柄在页面中的位置
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RemoteRef {
    target: String,
    epoch: String,
    slot: u64,
}

impl RemoteRef {
    fn to_js(&self) -> JsonValue {
        json!([self.epoch, self.slot])
    }
}

/// Rust 侧的句柄登记表，同一个页面元素总是得到同一个句柄
///
/// 只保留每个标签页最新 epoch 中仍在文档里的元素。
#[derive(Debug, Default)]
struct HandleRegistry {
    next_id: u64,
    by_id: HashMap<u64, RemoteRef>,
    by_remote: HashMap<RemoteRef, u64>,
    /// 每个标签页最近一次查询看到的 epoch
    epochs: HashMap<String, String>,
}

impl HandleRegistry {
    fn intern(&mut self, remote: RemoteRef) -> ElementHandle {
        if let Some(id) = self.by_remote.get(&remote) {
            return ElementHandle::new(*id);
        }
        self.next_id += 1;
        let id = self.next_id;
        self.by_id.insert(id, remote.clone());
        self.by_remote.insert(remote, id);
        ElementHandle::new(id)
    }

    fn resolve(&self, handle: &ElementHandle) -> Option<&RemoteRef> {
        self.by_id.get(&handle.id())
    }

    /// 记录一次查询的结果：epoch 变了就丢弃该标签页旧 epoch 的句柄，
    /// 再丢弃页面侧已清理的槽位
    fn observe(&mut self, target: &str, epoch: &str, gone: &[u64]) {
        let changed = self
            .epochs
            .get(target)
            .map_or(false, |last| last != epoch);
        if changed {
            let outdated = |r: &RemoteRef| r.target == target && r.epoch != epoch;
            self.by_id.retain(|_, r| !outdated(&*r));
            self.by_remote.retain(|r, _| !outdated(r));
        }
        self.epochs.insert(target.to_string(), epoch.to_string());

        for slot in gone {
            let remote = RemoteRef {
                target: target.to_string(),
                epoch: epoch.to_string(),
                slot: *slot,
            };
            if let Some(id) = self.by_remote.remove(&remote) {
                self.by_id.remove(&id);
            }
        }
    }

    /// 标签页关闭后丢弃它的所有句柄
    fn forget_target(&mut self, target: &str) {
        self.by_id.retain(|_, r| r.target != target);
        self.by_remote.retain(|r, _| r.target != target);
        self.epochs.remove(target);
    }
}

struct ActiveState {
    executor: JsExecutor,
    frames: Vec<ElementHandle>,
}

/// 基于 chromiumoxide 的 UI 驱动
pub struct ChromiumDriver {
    browser: Browser,
    state: Mutex<ActiveState>,
    handles: Mutex<HandleRegistry>,
}

impl ChromiumDriver {
    /// 以 `page` 作为初始交互上下文
    pub fn new(browser: Browser, page: Page) -> Self {
        Self {
            browser,
            state: Mutex::new(ActiveState {
                executor: JsExecutor::new(page),
                frames: Vec::new(),
            }),
            handles: Mutex::new(HandleRegistry::default()),
        }
    }

    /// 关闭浏览器（仅用于由本程序启动的浏览器）
    pub async fn shutdown(mut self) -> DriverResult<()> {
        self.browser.close().await.map_err(classify_cdp_error)?;
        info!("浏览器已关闭");
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, ActiveState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handles(&self) -> MutexGuard<'_, HandleRegistry> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 当前标签页的执行器和 iframe 路径（JS 形式）
    fn snapshot(&self) -> DriverResult<(JsExecutor, JsonValue)> {
        let (executor, frames) = {
            let state = self.state();
            (state.executor.clone(), state.frames.clone())
        };
        let target = executor.target_id();
        let handles = self.handles();
        let mut refs = Vec::with_capacity(frames.len());
        for frame in &frames {
            match handles.resolve(frame) {
                Some(r) if r.target == target => refs.push(r.to_js()),
                _ => {
                    return Err(DriverError::ContextUnavailable(format!(
                        "iframe 句柄 {} 不属于当前标签页",
                        frame
                    )))
                }
            }
        }
        Ok((executor, JsonValue::Array(refs)))
    }

    async fn run(&self, executor: &JsExecutor, frames: &JsonValue, body: &str) -> DriverResult<ScriptReply> {
        let js_code = format!(
            "(() => {{ {} const frames = {}; {} }})()",
            PRELUDE, frames, body
        );
        let reply: ScriptReply = executor.eval_as(js_code).await?;
        if let Some(error) = reply.error.clone() {
            return Err(DriverError::Script(error));
        }
        if reply.no_frame {
            return Err(DriverError::ContextUnavailable(
                "当前 iframe 已不可访问".to_string(),
            ));
        }
        Ok(reply)
    }

    /// 在某个元素上执行脚本片段，片段中以 `el` 访问元素，并返回 `{ ok: ... }`
    async fn run_on(&self, element: &ElementHandle, body: &str) -> DriverResult<JsonValue> {
        let (executor, frames) = self.snapshot()?;
        let remote = self
            .handles()
            .resolve(element)
            .cloned()
            .ok_or(DriverError::StaleElement(*element))?;
        if remote.target != executor.target_id() {
            return Err(DriverError::StaleElement(*element));
        }

        let body = format!(
            "const el = lookup({}); if (!el) return {{ stale: true }}; {}",
            remote.to_js(),
            body
        );
        let reply = self.run(&executor, &frames, &body).await?;
        if reply.stale {
            return Err(DriverError::StaleElement(*element));
        }
        Ok(reply.ok)
    }

    async fn query(&self, parent: Option<&ElementHandle>, locator: &Locator) -> DriverResult<Vec<ElementHandle>> {
        let (executor, frames) = self.snapshot()?;
        let target = executor.target_id();
        let selector_js = json!(locator.selector());

        let root = match parent {
            Some(parent) => {
                let remote = self
                    .handles()
                    .resolve(parent)
                    .cloned()
                    .ok_or(DriverError::StaleElement(*parent))?;
                if remote.target != target {
                    return Err(DriverError::StaleElement(*parent));
                }
                format!(
                    "const root = lookup({}); if (!root) return {{ stale: true }};",
                    remote.to_js()
                )
            }
            None => "const root = activeDoc(frames); if (!root) return { noFrame: true };".to_string(),
        };

        let body = format!(
            "{} try {{ const gone = prune(); return {{ epoch: reg.epoch, gone, ok: query(root, {}).map(track) }}; }} catch (e) {{ return {{ error: String(e) }}; }}",
            root, selector_js
        );
        let reply = self.run(&executor, &frames, &body).await?;
        if reply.stale {
            if let Some(parent) = parent {
                return Err(DriverError::StaleElement(*parent));
            }
        }

        let epoch = reply
            .epoch
            .ok_or_else(|| DriverError::Script("查询结果缺少 epoch".to_string()))?;
        let slots: Vec<u64> = serde_json::from_value(reply.ok)
            .map_err(|e| DriverError::Script(format!("查询结果格式错误: {}", e)))?;

        let mut handles = self.handles();
        handles.observe(&target, &epoch, &reply.gone);
        Ok(slots
            .into_iter()
            .map(|slot| {
                handles.intern(RemoteRef {
                    target: target.clone(),
                    epoch: epoch.clone(),
                    slot,
                })
            })
            .collect())
    }
}

fn as_string(value: JsonValue) -> String {
    match value {
        JsonValue::String(s) => s,
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl UiDriver for ChromiumDriver {
    async fn find_all(&self, locator: &Locator) -> DriverResult<Vec<ElementHandle>> {
        self.query(None, locator).await
    }

    async fn find_within(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> DriverResult<Vec<ElementHandle>> {
        self.query(Some(parent), locator).await
    }

    async fn click(&self, element: &ElementHandle) -> DriverResult<()> {
        self.run_on(element, "el.click(); return { ok: true };").await?;
        Ok(())
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> DriverResult<()> {
        self.run_on(
            element,
            "el.scrollIntoView({ block: 'center', inline: 'nearest' }); return { ok: true };",
        )
        .await?;
        Ok(())
    }

    async fn computed_style(&self, element: &ElementHandle, property: &str) -> DriverResult<String> {
        let body = format!(
            "return {{ ok: el.ownerDocument.defaultView.getComputedStyle(el).getPropertyValue({}) }};",
            json!(property)
        );
        Ok(as_string(self.run_on(element, &body).await?).trim().to_string())
    }

    async fn text(&self, element: &ElementHandle) -> DriverResult<String> {
        let value = self
            .run_on(
                element,
                "return { ok: (el.innerText || el.textContent || el.value || '').trim() };",
            )
            .await?;
        Ok(as_string(value))
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        let body = format!("return {{ ok: el.getAttribute({}) }};", json!(name));
        match self.run_on(element, &body).await? {
            JsonValue::Null => Ok(None),
            value => Ok(Some(as_string(value))),
        }
    }

    async fn is_visible(&self, element: &ElementHandle) -> DriverResult<bool> {
        let value = self
            .run_on(
                element,
                r#"
                const rect = el.getBoundingClientRect();
                const style = el.ownerDocument.defaultView.getComputedStyle(el);
                return { ok: rect.width > 0 && rect.height > 0
                    && style.visibility !== 'hidden' && style.display !== 'none' };
                "#,
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn is_enabled(&self, element: &ElementHandle) -> DriverResult<bool> {
        let value = self
            .run_on(
                element,
                "return { ok: !el.disabled && el.getAttribute('aria-disabled') !== 'true' };",
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        let body = format!(
            r#"
            el.focus();
            const desc = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), 'value');
            if (desc && desc.set) {{ desc.set.call(el, {value}); }} else {{ el.value = {value}; }}
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return {{ ok: true }};
            "#,
            value = json!(text)
        );
        self.run_on(element, &body).await?;
        Ok(())
    }

    async fn submit(&self, element: &ElementHandle) -> DriverResult<()> {
        self.run_on(
            element,
            r#"
            for (const type of ['keydown', 'keypress', 'keyup']) {
                el.dispatchEvent(new KeyboardEvent(type, { key: 'Enter', code: 'Enter', keyCode: 13, which: 13, bubbles: true }));
            }
            if (el.form) {
                if (el.form.requestSubmit) { el.form.requestSubmit(); } else { el.form.submit(); }
            }
            return { ok: true };
            "#,
        )
        .await?;
        Ok(())
    }

    async fn execute_script(&self, script: &str, args: &[ElementHandle]) -> DriverResult<JsonValue> {
        let (executor, frames) = self.snapshot()?;
        let target = executor.target_id();
        let refs = {
            let handles = self.handles();
            let mut refs = Vec::with_capacity(args.len());
            for arg in args {
                match handles.resolve(arg) {
                    Some(r) if r.target == target => refs.push(r.to_js()),
                    _ => return Err(DriverError::StaleElement(*arg)),
                }
            }
            refs
        };

        let body = format!(
            r#"
            const args = {}.map(lookup);
            if (args.some((a) => a === null)) return {{ stale: true }};
            try {{
                const result = (function () {{ {} }}).apply(null, args);
                return {{ ok: result === undefined ? null : result }};
            }} catch (e) {{
                return {{ error: String(e) }};
            }}
            "#,
            JsonValue::Array(refs),
            script
        );
        let reply = self.run(&executor, &frames, &body).await?;
        if reply.stale {
            return Err(DriverError::StaleElement(args.first().copied().unwrap_or(ElementHandle::new(0))));
        }
        Ok(reply.ok)
    }

    async fn current_page_text(&self) -> DriverResult<String> {
        let (executor, frames) = self.snapshot()?;
        let reply = self
            .run(
                &executor,
                &frames,
                "const doc = activeDoc(frames); if (!doc) return { noFrame: true }; return { ok: doc.body ? doc.body.innerText : '' };",
            )
            .await?;
        Ok(as_string(reply.ok))
    }

    async fn navigate(&self, url: &str) -> DriverResult<()> {
        let executor = self.state().executor.clone();
        executor.goto(url).await?;
        self.state().frames.clear();
        debug!("已导航到: {}", url);
        Ok(())
    }

    async fn list_contexts(&self) -> DriverResult<Vec<ContextHandle>> {
        let pages = self.browser.pages().await.map_err(classify_cdp_error)?;
        Ok(pages
            .iter()
            .map(|p| ContextHandle::new(p.target_id().inner().clone()))
            .collect())
    }

    async fn active_context(&self) -> DriverResult<ActiveContext> {
        let state = self.state();
        Ok(ActiveContext {
            window: ContextHandle::new(state.executor.target_id()),
            frames: state.frames.clone(),
        })
    }

    async fn switch_context(&self, target: &ActiveContext) -> DriverResult<()> {
        let pages = self.browser.pages().await.map_err(classify_cdp_error)?;
        let page = pages
            .into_iter()
            .find(|p| p.target_id().inner() == target.window.as_str())
            .ok_or_else(|| DriverError::ContextUnavailable(target.window.to_string()))?;

        let mut state = self.state();
        state.executor = JsExecutor::new(page);
        state.frames = target.frames.clone();
        debug!("切换交互上下文: {}", target);
        Ok(())
    }

    async fn enter_frame(&self, frame: &ElementHandle) -> DriverResult<()> {
        let accessible = self
            .run_on(
                frame,
                r#"
                let doc = null;
                try { doc = el.contentDocument; } catch (e) { doc = null; }
                return { ok: (el.tagName === 'IFRAME' || el.tagName === 'FRAME') && !!doc };
                "#,
            )
            .await?;
        if !accessible.as_bool().unwrap_or(false) {
            return Err(DriverError::ContextUnavailable(format!(
                "iframe {} 不可访问（跨域或不是 iframe）",
                frame
            )));
        }
        self.state().frames.push(*frame);
        debug!("进入 iframe {}", frame);
        Ok(())
    }

    async fn close_context(&self) -> DriverResult<()> {
        let executor = self.state().executor.clone();
        let target = executor.target_id();
        if let Err(e) = executor.close().await {
            warn!("关闭标签页 {} 失败: {}", target, e);
            return Err(e);
        }
        self.handles().forget_target(&target);
        debug!("已关闭标签页 {}", target);
        Ok(())
    }
}
