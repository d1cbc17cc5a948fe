//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **启动**：日志文件 → 筛选文件（缺失即退出）→ 启发式配置 → 浏览器
//! 2. **准备**：打开目标网站，等待用户手动登录
//! 3. **运行**：委托 `ListingCrawler` 完成搜索、筛选和申请
//! 4. **收尾**：输出统计，等待确认后关闭自己启动的浏览器
//!
//! 只有本模块持有浏览器（`ChromiumDriver`）。

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::browser;
use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::{ChromiumDriver, UiDriver};
use crate::models::{load_filter_file, load_heuristics, FilterSet, Heuristics};
use crate::orchestrator::crawler::{ListingCrawler, RunResult};
use crate::utils::logging::{init_log_file, log_startup, print_final_stats};
use crate::utils::prompt::wait_for_enter;

/// 应用主结构
pub struct App {
    config: Config,
    filters: FilterSet,
    heuristics: Heuristics,
    driver: ChromiumDriver,
    /// 浏览器是否由本程序启动（是的话退出时关闭）
    launched: bool,
}

/// 启动阶段需要读取的输入，任何一项出错都在打开浏览器之前退出
pub async fn load_inputs(config: &Config) -> AppResult<(FilterSet, Heuristics)> {
    let filters = load_filter_file(Path::new(&config.filter_file)).await?;
    let heuristics = load_heuristics(config.heuristics_file.as_deref().map(Path::new)).await?;
    Ok((filters, heuristics))
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.output_log_file)
            .with_context(|| format!("无法创建日志文件 {}", config.output_log_file))?;

        log_startup(&config);

        let (filters, heuristics) = load_inputs(&config).await?;

        let (browser, page, launched) = match config.browser_debug_port {
            Some(port) => {
                let (browser, page) =
                    browser::connect_to_browser_and_page(port, Some(config.target_url.as_str())).await?;
                (browser, page, false)
            }
            None => {
                let (browser, page) =
                    browser::launch_browser(config.chrome_executable.as_deref()).await?;
                (browser, page, true)
            }
        };

        Ok(Self {
            config,
            filters,
            heuristics,
            driver: ChromiumDriver::new(browser, page),
            launched,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(self) -> AppResult<RunResult> {
        info!("🌐 打开目标网站: {}", self.config.target_url);
        self.driver.navigate(&self.config.target_url).await?;

        if self.config.pause_for_login {
            wait_for_enter("请在浏览器中完成登录，然后回到这里").await?;
        }

        let crawler = ListingCrawler::new(&self.config, &self.heuristics);
        let result = crawler.run(&self.driver, &self.filters).await;

        print_final_stats(
            result.applied,
            result.failed,
            result.applyable,
            &self.config.output_log_file,
        );
        info!(
            "共处理 {} 页 / {} 个职位，结束原因: {}",
            result.pages, result.listings, result.end
        );

        if self.config.pause_before_exit {
            wait_for_enter("按回车关闭浏览器并退出").await?;
        }

        if self.launched {
            if let Err(e) = self.driver.shutdown().await {
                warn!("关闭浏览器失败: {}", e);
            }
        }

        Ok(result)
    }
}
