use std::path::Path;

use anyhow::Result;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// 有界面启动时附加的参数
const LAUNCH_ARGS: [&str; 3] = [
    "--disable-blink-features=AutomationControlled",
    "--start-maximized",
    "--no-first-run",
];

/// 启动一个有界面的浏览器
///
/// 需要用户在窗口里手动登录，所以不能用无头模式。
/// `executable` 为空时由 chromiumoxide 自动查找。
pub async fn launch_browser(executable: Option<&str>) -> Result<(Browser, Page)> {
    info!("🚀 启动浏览器...");

    let mut builder = BrowserConfig::builder()
        .with_head()
        .viewport(None)
        .args(LAUNCH_ARGS);
    if let Some(path) = executable {
        debug!("浏览器可执行文件: {}", path);
        builder = builder.chrome_executable(Path::new(path));
    }
    let config = builder.build().map_err(|e| {
        error!("配置浏览器失败: {}", e);
        anyhow::anyhow!("配置浏览器失败: {}", e)
    })?;

    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        anyhow::anyhow!("启动浏览器失败: {}", e)
    })?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("创建页面失败: {}", e);
        anyhow::anyhow!("创建页面失败: {}", e)
    })?;

    info!("✅ 浏览器已启动");
    Ok((browser, page))
}
