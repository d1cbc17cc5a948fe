//! 页面启发式配置
//!
//! 所有依赖目标网站结构的东西（选择器、品牌色、关键词、按钮文案、等待时间）
//! 都集中在这里。网站改版时只需要改这一处（或者用 TOML 文件覆盖），
//! 状态机和重试逻辑不需要动。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::infrastructure::Locator;

/// 申请按钮探针的类别（仅用于日志 / 诊断）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    Id,
    Class,
    AriaLabel,
    AnyButton,
}

/// 一个申请按钮探针
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyProbe {
    pub kind: ProbeKind,
    pub selector: String,
}

impl ApplyProbe {
    fn new(kind: ProbeKind, selector: &str) -> Self {
        Self {
            kind,
            selector: selector.to_string(),
        }
    }

    pub fn locator(&self) -> Locator {
        Locator::css(&self.selector)
    }
}

/// 等待与停顿时间（毫秒）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// 等待元素出现 / 可点击
    pub element_wait_ms: u64,
    /// 点击申请按钮后等待新标签页
    pub new_context_wait_ms: u64,
    /// 点击申请按钮后等待申请 iframe
    pub frame_wait_ms: u64,
    /// 等待下一页按钮
    pub next_page_wait_ms: u64,
    /// 提交搜索后
    pub search_settle_ms: u64,
    /// 点击筛选按钮后
    pub filter_settle_ms: u64,
    /// 点击职位卡片后
    pub card_settle_ms: u64,
    /// 每页开始处理前
    pub page_settle_ms: u64,
    /// 点击下一页后
    pub next_settle_ms: u64,
    /// 申请流程每一步点击后
    pub step_settle_ms: u64,
    /// 关闭弹窗后
    pub popup_settle_ms: u64,
    /// 高亮停留
    pub highlight_ms: u64,
    /// 两个职位之间
    pub between_listings_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            element_wait_ms: 10_000,
            new_context_wait_ms: 3_000,
            frame_wait_ms: 5_000,
            next_page_wait_ms: 5_000,
            search_settle_ms: 3_000,
            filter_settle_ms: 1_000,
            card_settle_ms: 2_000,
            page_settle_ms: 2_000,
            next_settle_ms: 3_000,
            step_settle_ms: 1_500,
            popup_settle_ms: 500,
            highlight_ms: 500,
            between_listings_ms: 1_000,
        }
    }
}

impl Timings {
    /// 全部为零，测试用
    pub fn zero() -> Self {
        Self {
            element_wait_ms: 0,
            new_context_wait_ms: 0,
            frame_wait_ms: 0,
            next_page_wait_ms: 0,
            search_settle_ms: 0,
            filter_settle_ms: 0,
            card_settle_ms: 0,
            page_settle_ms: 0,
            next_settle_ms: 0,
            step_settle_ms: 0,
            popup_settle_ms: 0,
            highlight_ms: 0,
            between_listings_ms: 0,
        }
    }

    pub fn element_wait(&self) -> Duration {
        Duration::from_millis(self.element_wait_ms)
    }

    pub fn new_context_wait(&self) -> Duration {
        Duration::from_millis(self.new_context_wait_ms)
    }

    pub fn frame_wait(&self) -> Duration {
        Duration::from_millis(self.frame_wait_ms)
    }

    pub fn next_page_wait(&self) -> Duration {
        Duration::from_millis(self.next_page_wait_ms)
    }

    pub fn search_settle(&self) -> Duration {
        Duration::from_millis(self.search_settle_ms)
    }

    pub fn filter_settle(&self) -> Duration {
        Duration::from_millis(self.filter_settle_ms)
    }

    pub fn card_settle(&self) -> Duration {
        Duration::from_millis(self.card_settle_ms)
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_millis(self.page_settle_ms)
    }

    pub fn next_settle(&self) -> Duration {
        Duration::from_millis(self.next_settle_ms)
    }

    pub fn step_settle(&self) -> Duration {
        Duration::from_millis(self.step_settle_ms)
    }

    pub fn popup_settle(&self) -> Duration {
        Duration::from_millis(self.popup_settle_ms)
    }

    pub fn highlight(&self) -> Duration {
        Duration::from_millis(self.highlight_ms)
    }

    pub fn between_listings(&self) -> Duration {
        Duration::from_millis(self.between_listings_ms)
    }
}

/// 页面启发式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Heuristics {
    // --- 搜索 ---
    pub search_title_selector: String,
    pub search_location_selector: String,
    /// 筛选按钮（按文案匹配）
    pub filter_button_selector: String,

    // --- 列表与翻页 ---
    pub listing_selector: String,
    /// 下一页按钮，按顺序尝试
    pub next_page_selectors: Vec<String>,

    // --- 一键申请识别 ---
    /// 按声明顺序探测
    pub apply_probes: Vec<ApplyProbe>,
    /// 品牌色，可以写成 `rgb(r, g, b)` 或 `#rrggbb`
    pub brand_colors: Vec<String>,
    /// 按钮文案关键词（小写比较）
    pub apply_keywords: Vec<String>,
    /// 按钮自身文本为空时，在这些子元素中找文案
    pub label_wrapper_selector: String,

    // --- 申请流程 ---
    /// 申请成功的页面文本（小写比较）
    pub success_phrases: Vec<String>,
    /// 首选的"下一步"按钮文案（精确匹配）
    pub primary_continue_label: String,
    /// 首选按钮必须满足的 `display` 计算值
    pub primary_continue_display: String,
    pub primary_continue_selector: String,
    /// 兜底的继续 / 提交按钮文案，按顺序尝试（小写包含匹配）
    pub continue_labels: Vec<String>,
    /// 可交互元素
    pub interactive_selectors: Vec<String>,
    /// 申请表单所在 iframe
    pub application_frame_selectors: Vec<String>,

    // --- 弹窗 ---
    pub popup_selectors: Vec<String>,

    pub timings: Timings,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Heuristics {
    fn default() -> Self {
        Self {
            search_title_selector: "#text-input-what".to_string(),
            search_location_selector: "#text-input-where".to_string(),
            filter_button_selector: "button".to_string(),

            listing_selector: ".job_seen_beacon".to_string(),
            next_page_selectors: strings(&[
                "[aria-label='Next']",
                "[aria-label='Weiter']",
                "[data-testid='pagination-page-next']",
            ]),

            apply_probes: vec![
                ApplyProbe::new(ProbeKind::Id, "#indeedApplyButton"),
                ApplyProbe::new(ProbeKind::Id, "[data-testid='indeedApplyButton']"),
                ApplyProbe::new(ProbeKind::Id, "[data-testid='schnellbewerbung-button']"),
                ApplyProbe::new(ProbeKind::Class, "button[class*='indeed-apply-button']"),
                ApplyProbe::new(ProbeKind::Class, "button[class*='job-apply-button']"),
                ApplyProbe::new(ProbeKind::AriaLabel, "button[aria-label*='apply' i]"),
                ApplyProbe::new(ProbeKind::AriaLabel, "button[aria-label*='bewerb' i]"),
                ApplyProbe::new(ProbeKind::AnyButton, "button"),
            ],
            brand_colors: strings(&["rgb(37, 87, 167)", "#2557a7", "rgb(22, 64, 129)", "#164081"]),
            apply_keywords: strings(&[
                "easy apply",
                "indeed apply",
                "schnellbewerbung",
                "einfach bewerben",
                "sofort bewerben",
            ]),
            label_wrapper_selector: "span, div, label".to_string(),

            success_phrases: strings(&[
                "application submitted",
                "application has been submitted",
                "your application was sent",
                "bewerbung gesendet",
                "bewerbung wurde gesendet",
                "bewerbung wurde übermittelt",
                "bewerbung abgeschickt",
            ]),
            primary_continue_label: "Weiter".to_string(),
            primary_continue_display: "flex".to_string(),
            primary_continue_selector: "button".to_string(),
            continue_labels: strings(&[
                "weiter",
                "continue",
                "next",
                "fortfahren",
                "review your application",
                "bewerbung überprüfen",
                "überprüfen",
                "submit your application",
                "bewerbung absenden",
                "bewerbung einreichen",
                "submit",
                "absenden",
                "apply",
                "bewerben",
            ]),
            interactive_selectors: strings(&[
                "button",
                "button[type='submit']",
                "input[type='submit']",
                "[role='button']",
            ]),
            application_frame_selectors: strings(&[
                ".indeed-apply-iframe",
                "iframe[id*='indeedapply']",
                "iframe[title*='apply' i]",
            ]),

            popup_selectors: strings(&[
                "[class*='popup-close']",
                "[class*='close-button']",
                "[class*='modal-close']",
                "[aria-label='Close']",
                "[class*='newsletter'] button[class*='close']",
                ".icl-CloseButton",
                "#popover-x",
                "#popover-foreground .popover-x-button-close",
            ]),

            timings: Timings::default(),
        }
    }
}

impl Heuristics {
    /// 默认启发式，所有等待为零，测试用
    pub fn instant() -> Self {
        Self {
            timings: Timings::zero(),
            ..Self::default()
        }
    }

    pub fn listing_locator(&self) -> Locator {
        Locator::css(&self.listing_selector)
    }

    pub fn next_page_locators(&self) -> Vec<Locator> {
        self.next_page_selectors.iter().map(|s| Locator::css(s.as_str())).collect()
    }

    pub fn interactive_locators(&self) -> Vec<Locator> {
        self.interactive_selectors.iter().map(|s| Locator::css(s.as_str())).collect()
    }

    pub fn application_frame_locators(&self) -> Vec<Locator> {
        self.application_frame_selectors
            .iter()
            .map(|s| Locator::css(s.as_str()))
            .collect()
    }

    pub fn popup_locators(&self) -> Vec<Locator> {
        self.popup_selectors.iter().map(|s| Locator::css(s.as_str())).collect()
    }
}
