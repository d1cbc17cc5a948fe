//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责一次完整运行的调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 管理应用生命周期（初始化、运行、清理）
//! - 加载筛选文件和启发式配置
//! - 管理浏览器资源（Browser、ChromiumDriver）
//! - 输出全局统计信息
//!
//! ### `crawler` - 职位列表爬取器
//! - 搜索、筛选、逐页遍历职位
//! - 每个职位：识别 → 申请（都经过重试层）
//! - 翻页直到最后一页
//!
//! ## 层次关系
//!
//! ```text
//! app (一次运行)
//!     ↓
//! crawler (所有页 / 所有职位)
//!     ↓
//! workflow::ApplicationStepper (单个职位的申请流程)
//!     ↓
//! services (能力层：识别 / 弹窗 / 高亮 / 重试 / 申请记录)
//!     ↓
//! infrastructure (基础设施：UiDriver / ChromiumDriver)
//! ```

pub mod app;
pub mod crawler;

// 重新导出主要类型
pub use app::App;
pub use crawler::{ListingCrawler, RunEnd, RunResult};
