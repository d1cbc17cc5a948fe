//! 弹窗清理服务 - 业务能力层
//!
//! 尽力关闭遮挡页面的弹窗，永远不会让调用方失败。

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info};

use crate::infrastructure::{Locator, UiDriver};
use crate::models::Heuristics;
use crate::services::highlight::highlight;

/// 弹窗清理
pub struct PopupDismisser {
    locators: Vec<Locator>,
    settle: Duration,
    highlight_hold: Duration,
}

impl PopupDismisser {
    pub fn new(heuristics: &Heuristics) -> Self {
        Self {
            locators: heuristics.popup_locators(),
            settle: heuristics.timings.popup_settle(),
            highlight_hold: heuristics.timings.highlight(),
        }
    }

    /// 扫描所有弹窗关闭按钮，点击可见的那些，返回关闭的数量
    pub async fn dismiss<D: UiDriver + ?Sized>(&self, driver: &D) -> usize {
        let mut closed = 0;
        for locator in &self.locators {
            let buttons = match driver.find_all(locator).await {
                Ok(buttons) => buttons,
                Err(e) => {
                    debug!("查找弹窗 {} 失败（忽略）: {}", locator, e);
                    continue;
                }
            };

            for button in buttons {
                match driver.is_visible(&button).await {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        debug!("弹窗按钮 {} 状态未知（忽略）: {}", button, e);
                        continue;
                    }
                }

                highlight(driver, &button, self.highlight_hold).await;
                match driver.click(&button).await {
                    Ok(()) => {
                        closed += 1;
                        sleep(self.settle).await;
                    }
                    Err(e) => debug!("关闭弹窗 {} 失败（忽略）: {}", button, e),
                }
            }
        }

        if closed > 0 {
            info!("🧹 关闭了 {} 个弹窗", closed);
        }
        closed
    }
}
