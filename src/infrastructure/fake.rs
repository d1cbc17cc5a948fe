//! 测试用的内存驱动
//!
//! 用一组带选择器标签的节点模拟页面：每个节点属于一个"文档"，标签页显示某个文档，
//! iframe 节点指向另一个文档。点击可以触发预设效果（打开新标签页、改变页面文本、
//! 导航、显示/隐藏节点），所有交互都记录下来供断言。

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::infrastructure::driver::{
    ActiveContext, ContextHandle, DriverError, DriverResult, ElementHandle, Locator, UiDriver,
};

/// 点击节点后的效果
#[derive(Debug, Clone)]
pub enum Effect {
    /// 打开新标签页并显示 `doc`（不切换）
    OpenWindow { window: String, doc: String },
    /// 改变某个文档的全文
    SetText { doc: String, text: String },
    /// 当前标签页导航到 `doc`，旧文档的节点全部失效
    Navigate(String),
    /// 显示该节点，同组其他节点隐藏
    Reveal(ElementHandle),
    /// 把节点从页面移除
    Detach(ElementHandle),
    Disable(ElementHandle),
}

/// 模拟的页面节点
#[derive(Debug, Clone)]
pub struct FakeNode {
    doc: String,
    selectors: Vec<String>,
    text: String,
    styles: HashMap<String, String>,
    attrs: HashMap<String, String>,
    visible: bool,
    enabled: bool,
    parent: Option<usize>,
    group: Option<String>,
    frame_doc: Option<String>,
    effects: Vec<Effect>,
    detached: bool,
}

impl FakeNode {
    pub fn new(doc: &str, selector: &str) -> Self {
        Self {
            doc: doc.to_string(),
            selectors: vec![selector.to_string()],
            text: String::new(),
            styles: HashMap::new(),
            attrs: HashMap::new(),
            visible: true,
            enabled: true,
            parent: None,
            group: None,
            frame_doc: None,
            effects: Vec::new(),
            detached: false,
        }
    }

    pub fn selector(mut self, selector: &str) -> Self {
        self.selectors.push(selector.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn style(mut self, property: &str, value: &str) -> Self {
        self.styles.insert(property.to_string(), value.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn child_of(mut self, parent: ElementHandle) -> Self {
        self.parent = Some(parent.id() as usize);
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    /// 该节点是显示 `doc` 的 iframe
    pub fn frame(mut self, doc: &str) -> Self {
        self.frame_doc = Some(doc.to_string());
        self
    }

    pub fn on_click(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// 驱动交互记录
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Click(ElementHandle),
    Type(ElementHandle, String),
    Submit(ElementHandle),
    Script(Vec<ElementHandle>),
    Switch(ActiveContext),
    EnterFrame(ElementHandle),
    Close(ContextHandle),
    Navigate(String),
}

#[derive(Debug)]
struct World {
    nodes: Vec<FakeNode>,
    docs: HashMap<String, String>,
    windows: Vec<(String, String)>,
    active: ActiveContext,
    calls: Vec<Call>,
    session_failures: HashMap<&'static str, u32>,
    stale_failures: HashMap<(&'static str, ElementHandle), u32>,
    failing_scripts: bool,
}

impl World {
    fn inject(&mut self, op: &'static str) -> DriverResult<()> {
        if let Some(left) = self.session_failures.get_mut(op) {
            if *left > 0 {
                *left -= 1;
                return Err(DriverError::SessionLost(format!("invalid session id ({})", op)));
            }
        }
        Ok(())
    }

    fn inject_stale(&mut self, op: &'static str, handle: &ElementHandle) -> DriverResult<()> {
        if let Some(left) = self.stale_failures.get_mut(&(op, *handle)) {
            if *left > 0 {
                *left -= 1;
                return Err(DriverError::StaleElement(*handle));
            }
        }
        Ok(())
    }

    fn window_doc(&self, window: &str) -> Option<&str> {
        self.windows
            .iter()
            .find(|(w, _)| w == window)
            .map(|(_, d)| d.as_str())
    }

    fn active_doc(&self) -> DriverResult<String> {
        let mut doc = self
            .window_doc(self.active.window.as_str())
            .ok_or_else(|| DriverError::ContextUnavailable(self.active.window.to_string()))?
            .to_string();
        for frame in &self.active.frames {
            let node = self
                .nodes
                .get(frame.id() as usize)
                .filter(|n| !n.detached && n.doc == doc)
                .ok_or_else(|| DriverError::ContextUnavailable(format!("iframe{}", frame)))?;
            doc = node
                .frame_doc
                .clone()
                .ok_or_else(|| DriverError::ContextUnavailable(format!("iframe{}", frame)))?;
        }
        Ok(doc)
    }

    fn is_attached(&self, idx: usize) -> bool {
        let mut cursor = Some(idx);
        while let Some(i) = cursor {
            match self.nodes.get(i) {
                Some(node) if !node.detached => cursor = node.parent,
                _ => return false,
            }
        }
        true
    }

    fn is_descendant(&self, idx: usize, ancestor: usize) -> bool {
        let mut cursor = self.nodes.get(idx).and_then(|n| n.parent);
        while let Some(i) = cursor {
            if i == ancestor {
                return true;
            }
            cursor = self.nodes.get(i).and_then(|n| n.parent);
        }
        false
    }

    /// 返回仍然有效、且属于当前文档的节点
    fn node(&self, handle: &ElementHandle) -> DriverResult<&FakeNode> {
        let doc = self.active_doc()?;
        let idx = handle.id() as usize;
        match self.nodes.get(idx) {
            Some(node) if node.doc == doc && self.is_attached(idx) => Ok(node),
            _ => Err(DriverError::StaleElement(*handle)),
        }
    }

    fn matches(node: &FakeNode, locator: &Locator) -> bool {
        node.selectors.iter().any(|s| s == locator.selector())
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::OpenWindow { window, doc } => self.windows.push((window, doc)),
            Effect::SetText { doc, text } => {
                self.docs.insert(doc, text);
            }
            Effect::Navigate(to) => {
                let window = self.active.window.as_str().to_string();
                let old = self.window_doc(&window).map(str::to_string);
                if let Some(old) = old {
                    for node in self.nodes.iter_mut().filter(|n| n.doc == old) {
                        node.detached = true;
                    }
                }
                if let Some(entry) = self.windows.iter_mut().find(|(w, _)| *w == window) {
                    entry.1 = to;
                }
                self.active.frames.clear();
            }
            Effect::Reveal(handle) => {
                let idx = handle.id() as usize;
                let group = self.nodes.get(idx).and_then(|n| n.group.clone());
                for (i, node) in self.nodes.iter_mut().enumerate() {
                    if i == idx {
                        node.visible = true;
                    } else if group.is_some() && node.group == group {
                        node.visible = false;
                    }
                }
            }
            Effect::Detach(handle) => {
                if let Some(node) = self.nodes.get_mut(handle.id() as usize) {
                    node.detached = true;
                }
            }
            Effect::Disable(handle) => {
                if let Some(node) = self.nodes.get_mut(handle.id() as usize) {
                    node.enabled = false;
                }
            }
        }
    }
}

/// 内存驱动
#[derive(Debug)]
pub struct FakeDriver {
    world: Mutex<World>,
}

impl FakeDriver {
    /// 一个标签页 `window`，显示文档 `doc`
    pub fn new(window: &str, doc: &str) -> Self {
        Self {
            world: Mutex::new(World {
                nodes: Vec::new(),
                docs: HashMap::new(),
                windows: vec![(window.to_string(), doc.to_string())],
                active: ActiveContext::top_level(ContextHandle::new(window)),
                calls: Vec::new(),
                session_failures: HashMap::new(),
                stale_failures: HashMap::new(),
                failing_scripts: false,
            }),
        }
    }

    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add(&self, node: FakeNode) -> ElementHandle {
        let mut world = self.world();
        world.nodes.push(node);
        ElementHandle::new((world.nodes.len() - 1) as u64)
    }

    /// 给已有节点追加点击效果（用于相互引用的节点）
    pub fn add_effect(&self, handle: ElementHandle, effect: Effect) {
        if let Some(node) = self.world().nodes.get_mut(handle.id() as usize) {
            node.effects.push(effect);
        }
    }

    pub fn set_page_text(&self, doc: &str, text: &str) {
        self.world().docs.insert(doc.to_string(), text.to_string());
    }

    /// 让接下来 `times` 次 `op` 调用报告会话丢失
    pub fn fail_with_session_loss(&self, op: &'static str, times: u32) {
        self.world().session_failures.insert(op, times);
    }

    /// 让接下来 `times` 次对 `handle` 的 `op` 调用报告句柄过期（模拟重新渲染）
    pub fn fail_with_stale(&self, op: &'static str, handle: ElementHandle, times: u32) {
        self.world().stale_failures.insert((op, handle), times);
    }

    pub fn fail_scripts(&self) {
        self.world().failing_scripts = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.world().calls.clone()
    }

    pub fn clicks(&self) -> Vec<ElementHandle> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Click(h) => Some(h),
                _ => None,
            })
            .collect()
    }

    pub fn clicked_texts(&self) -> Vec<String> {
        let world = self.world();
        world
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Click(h) => world.nodes.get(h.id() as usize).map(|n| n.text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn open_windows(&self) -> Vec<String> {
        self.world().windows.iter().map(|(w, _)| w.clone()).collect()
    }

    pub fn current(&self) -> ActiveContext {
        self.world().active.clone()
    }
}

#[async_trait]
impl UiDriver for FakeDriver {
    async fn find_all(&self, locator: &Locator) -> DriverResult<Vec<ElementHandle>> {
        let mut world = self.world();
        world.inject("find_all")?;
        let doc = world.active_doc()?;
        Ok(world
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, n)| n.doc == doc && world.is_attached(*i) && World::matches(n, locator))
            .map(|(i, _)| ElementHandle::new(i as u64))
            .collect())
    }

    async fn find_within(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> DriverResult<Vec<ElementHandle>> {
        let world = self.world();
        world.node(parent)?;
        let ancestor = parent.id() as usize;
        Ok(world
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, n)| {
                world.is_attached(*i) && world.is_descendant(*i, ancestor) && World::matches(n, locator)
            })
            .map(|(i, _)| ElementHandle::new(i as u64))
            .collect())
    }

    async fn click(&self, element: &ElementHandle) -> DriverResult<()> {
        let mut world = self.world();
        world.inject("click")?;
        let effects = world.node(element)?.effects.clone();
        world.calls.push(Call::Click(*element));
        for effect in effects {
            world.apply(effect);
        }
        Ok(())
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> DriverResult<()> {
        self.world().node(element)?;
        Ok(())
    }

    async fn computed_style(&self, element: &ElementHandle, property: &str) -> DriverResult<String> {
        let mut world = self.world();
        world.inject_stale("computed_style", element)?;
        Ok(world
            .node(element)?
            .styles
            .get(property)
            .cloned()
            .unwrap_or_default())
    }

    async fn text(&self, element: &ElementHandle) -> DriverResult<String> {
        let mut world = self.world();
        world.inject_stale("text", element)?;
        Ok(world.node(element)?.text.trim().to_string())
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        Ok(self.world().node(element)?.attrs.get(name).cloned())
    }

    async fn is_visible(&self, element: &ElementHandle) -> DriverResult<bool> {
        Ok(self.world().node(element)?.visible)
    }

    async fn is_enabled(&self, element: &ElementHandle) -> DriverResult<bool> {
        Ok(self.world().node(element)?.enabled)
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        let mut world = self.world();
        world.node(element)?;
        world.calls.push(Call::Type(*element, text.to_string()));
        Ok(())
    }

    async fn submit(&self, element: &ElementHandle) -> DriverResult<()> {
        let mut world = self.world();
        let effects = world.node(element)?.effects.clone();
        world.calls.push(Call::Submit(*element));
        for effect in effects {
            world.apply(effect);
        }
        Ok(())
    }

    async fn execute_script(&self, _script: &str, args: &[ElementHandle]) -> DriverResult<JsonValue> {
        let mut world = self.world();
        for arg in args {
            world.node(arg)?;
        }
        world.calls.push(Call::Script(args.to_vec()));
        if world.failing_scripts {
            return Err(DriverError::Script("scripts disabled".to_string()));
        }
        Ok(JsonValue::Null)
    }

    async fn current_page_text(&self) -> DriverResult<String> {
        let mut world = self.world();
        world.inject("page_text")?;
        let doc = world.active_doc()?;
        Ok(world.docs.get(&doc).cloned().unwrap_or_default())
    }

    async fn navigate(&self, url: &str) -> DriverResult<()> {
        let mut world = self.world();
        world.calls.push(Call::Navigate(url.to_string()));
        Ok(())
    }

    async fn list_contexts(&self) -> DriverResult<Vec<ContextHandle>> {
        let mut world = self.world();
        world.inject("list_contexts")?;
        Ok(world
            .windows
            .iter()
            .map(|(w, _)| ContextHandle::new(w.clone()))
            .collect())
    }

    async fn active_context(&self) -> DriverResult<ActiveContext> {
        Ok(self.world().active.clone())
    }

    async fn switch_context(&self, target: &ActiveContext) -> DriverResult<()> {
        let mut world = self.world();
        if world.window_doc(target.window.as_str()).is_none() {
            return Err(DriverError::ContextUnavailable(target.window.to_string()));
        }
        world.active = target.clone();
        world.calls.push(Call::Switch(target.clone()));
        Ok(())
    }

    async fn enter_frame(&self, frame: &ElementHandle) -> DriverResult<()> {
        let mut world = self.world();
        if world.node(frame)?.frame_doc.is_none() {
            return Err(DriverError::ContextUnavailable(format!("{} 不是 iframe", frame)));
        }
        world.active.frames.push(*frame);
        world.calls.push(Call::EnterFrame(*frame));
        Ok(())
    }

    async fn close_context(&self) -> DriverResult<()> {
        let mut world = self.world();
        let window = world.active.window.clone();
        world.windows.retain(|(w, _)| w != window.as_str());
        world.calls.push(Call::Close(window));
        Ok(())
    }
}
