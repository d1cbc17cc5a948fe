//! 一键申请识别服务 - 业务能力层
//!
//! 判断当前打开的职位详情是否支持一键申请（Easy Apply / Schnellbewerbung）。
//!
//! 候选按钮来自按顺序排列的多个探针（id → class → aria-label → 任意按钮），去重后
//! 逐个检查两个独立信号：
//! 1. 背景色命中品牌色（rgb 与 hex 两种写法都可）
//! 2. 按钮文案（或内部包装元素的文案）包含关键词
//!
//! 任一信号命中即可；第一个命中的候选胜出。除了会话丢失，任何检测失败都当作
//! "不可一键申请"处理，宁可跳过也不误申请。

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::infrastructure::{recoverable, DriverResult, ElementHandle, Locator, UiDriver};
use crate::models::{ApplyProbe, Heuristics};

/// RGB 颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.0, self.1, self.2)
    }
}

fn rgb_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^rgba?\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*(?:,\s*([0-9.]+)\s*)?\)$",
        )
        .expect("rgb 正则有效")
    })
}

fn hex_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#([0-9a-f]{3}|[0-9a-f]{6})$").expect("hex 正则有效"))
}

/// 解析 CSS 颜色（`rgb(...)` / `rgba(...)` / `#rgb` / `#rrggbb`）
///
/// 完全透明的颜色返回 `None`。
pub fn parse_color(value: &str) -> Option<Rgb> {
    let value = value.trim().to_lowercase();

    if let Some(caps) = rgb_regex().captures(&value) {
        if let Some(alpha) = caps.get(4) {
            if alpha.as_str().parse::<f32>().ok()? == 0.0 {
                return None;
            }
        }
        let channel = |i: usize| caps.get(i)?.as_str().parse::<u8>().ok();
        return Some(Rgb(channel(1)?, channel(2)?, channel(3)?));
    }

    let caps = hex_regex().captures(&value)?;
    let hex = caps.get(1)?.as_str();
    let expanded: String = if hex.len() == 3 {
        hex.chars().flat_map(|c| [c, c]).collect()
    } else {
        hex.to_string()
    };
    let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
    Some(Rgb(channel(0)?, channel(2)?, channel(4)?))
}

/// 命中的信号
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    BrandColor { color: Rgb },
    Keyword { keyword: String, text: String },
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::BrandColor { color } => write!(f, "品牌色 {}", color),
            Signal::Keyword { keyword, text } => write!(f, "关键词 '{}' (文案: '{}')", keyword, text),
        }
    }
}

/// 判定依据，仅用于诊断
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evidence {
    pub probe: ApplyProbe,
    pub element: ElementHandle,
    pub signal: Signal,
}

/// 识别结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub applyable: bool,
    pub evidence: Option<Evidence>,
}

impl Classification {
    pub fn rejected() -> Self {
        Self {
            applyable: false,
            evidence: None,
        }
    }

    fn matched(evidence: Evidence) -> Self {
        Self {
            applyable: true,
            evidence: Some(evidence),
        }
    }

    /// 命中的申请按钮
    pub fn affordance(&self) -> Option<ElementHandle> {
        self.evidence.as_ref().map(|e| e.element)
    }
}

/// 一键申请识别
pub struct EasyApplyClassifier {
    probes: Vec<ApplyProbe>,
    palette: Vec<Rgb>,
    keywords: Vec<String>,
    label_wrappers: Locator,
}

impl EasyApplyClassifier {
    pub fn new(heuristics: &Heuristics) -> Self {
        let palette = heuristics
            .brand_colors
            .iter()
            .filter_map(|c| {
                let parsed = parse_color(c);
                if parsed.is_none() {
                    warn!("无法解析品牌色 '{}'，已忽略", c);
                }
                parsed
            })
            .collect();

        Self {
            probes: heuristics.apply_probes.clone(),
            palette,
            keywords: heuristics
                .apply_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            label_wrappers: Locator::css(heuristics.label_wrapper_selector.as_str()),
        }
    }

    /// 识别当前职位详情
    ///
    /// 只有会话丢失会作为错误返回（交给重试层），其余失败一律判为不可申请。
    pub async fn classify<D: UiDriver + ?Sized>(&self, driver: &D) -> DriverResult<Classification> {
        let candidates = self.collect_candidates(driver).await?;
        debug!("共 {} 个申请按钮候选", candidates.len());

        for (probe, element) in candidates {
            match self.inspect(driver, &element).await {
                Ok(Some(signal)) => {
                    debug!("候选 {} ({:?} {}) 命中: {}", element, probe.kind, probe.selector, signal);
                    return Ok(Classification::matched(Evidence {
                        probe: probe.clone(),
                        element,
                        signal,
                    }));
                }
                Ok(None) => {}
                Err(e) if e.is_session_loss() => return Err(e),
                Err(e) => debug!("检查候选 {} 失败（跳过）: {}", element, e),
            }
        }

        Ok(Classification::rejected())
    }

    /// 按探针顺序收集候选，去重
    async fn collect_candidates<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
    ) -> DriverResult<Vec<(&ApplyProbe, ElementHandle)>> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for probe in &self.probes {
            match driver.find_all(&probe.locator()).await {
                Ok(found) => {
                    for element in found {
                        if seen.insert(element) {
                            candidates.push((probe, element));
                        }
                    }
                }
                Err(e) if e.is_session_loss() => return Err(e),
                Err(e) => debug!("探针 {} 失败（跳过）: {}", probe.selector, e),
            }
        }
        Ok(candidates)
    }

    /// 检查一个候选；不可见的候选不参与判断
    async fn inspect<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        element: &ElementHandle,
    ) -> DriverResult<Option<Signal>> {
        if !driver.is_visible(element).await? {
            return Ok(None);
        }

        // 读不到颜色时仍然检查文案
        let background = recoverable(driver.computed_style(element, "background-color").await)?;
        if let Some(color) = background.as_deref().and_then(parse_color) {
            if self.palette.contains(&color) {
                return Ok(Some(Signal::BrandColor { color }));
            }
        }

        let text = self.label_text(driver, element).await?;
        let lower = text.to_lowercase();
        Ok(self
            .keywords
            .iter()
            .find(|k| lower.contains(k.as_str()))
            .map(|keyword| Signal::Keyword {
                keyword: keyword.clone(),
                text,
            }))
    }

    /// 按钮文案：自身文本 → 内部包装元素文本 → aria-label
    async fn label_text<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        element: &ElementHandle,
    ) -> DriverResult<String> {
        let direct = driver.text(element).await?;
        if !direct.is_empty() {
            return Ok(direct);
        }

        let mut parts = Vec::new();
        for inner in driver.find_within(element, &self.label_wrappers).await? {
            let text = driver.text(&inner).await?;
            if !text.is_empty() {
                parts.push(text);
            }
        }
        if !parts.is_empty() {
            return Ok(parts.join(" "));
        }

        Ok(driver
            .attribute(element, "aria-label")
            .await?
            .unwrap_or_default())
    }
}
