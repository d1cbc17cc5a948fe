//! # JobPilot
//!
//! 在职位网站上自动搜索并完成一键申请的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Browser / Page），只暴露能力
//! - `UiDriver` - 查找、点击、读样式、切换标签页 / iframe 的能力接口
//! - `ChromiumDriver` - 基于 chromiumoxide 的实现，页面逻辑都是注入的 JS
//! - `JsExecutor` - 单个 page 的 owner，提供 eval() 能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理当前页面
//! - `EasyApplyClassifier` - 一键申请识别（品牌色 或 关键词）
//! - `PopupDismisser` - 关闭弹窗
//! - `RetryPolicy` - 会话丢失时指数退避重试
//! - `ApplicationLog` - 写申请记录
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个职位"的完整申请流程
//! - `ApplyCtx` - 上下文封装（页码 + 职位序号）
//! - `ApplicationStepper` - 申请状态机（提交 → 逐步继续 → 成功 / 放弃）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/app` - 应用入口，管理浏览器和启动流程
//! - `orchestrator/crawler` - 搜索、筛选、翻页，逐个职位调度
//!
//! 所有依赖目标网站结构的选择器、颜色、文案都在 `models::Heuristics` 中。
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::{connect_to_browser_and_page, launch_browser};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{ChromiumDriver, JsExecutor, UiDriver};
pub use models::{FilterSet, Heuristics};
pub use orchestrator::{App, ListingCrawler, RunEnd, RunResult};
pub use workflow::{ApplicationStepper, ApplyCtx, ApplyOutcome, StepperState};
