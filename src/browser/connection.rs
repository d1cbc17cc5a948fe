use anyhow::{Context, Result};
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// 连接到已运行的浏览器并获取页面
///
/// 优先复用 URL 以 `target_url` 开头的标签页（通常是已经登录好的页面），
/// 没有的话新建一个空白页，由调用方负责导航。
pub async fn connect_to_browser_and_page(
    port: u16,
    target_url: Option<&str>,
) -> Result<(Browser, Page)> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);
    debug!("目标 URL: {:?}", target_url);

    let (browser, mut handler) = Browser::connect(&browser_url)
        .await
        .map_err(|e| {
            error!("连接浏览器失败: {}", e);
            e
        })
        .with_context(|| format!("无法连接到 {}，浏览器是否以 --remote-debugging-port={} 启动？", browser_url, port))?;
    debug!("浏览器连接成功");

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

    let pages = browser.pages().await?;
    debug!("获取到 {} 个页面", pages.len());

    if let Some(url) = target_url {
        for p in pages.iter() {
            if let Ok(Some(page_url)) = p.url().await {
                debug!("检查页面: {}", page_url);
                if page_url.starts_with(url) {
                    info!("✓ 复用已打开的页面: {}", page_url);
                    return Ok((browser, p.clone()));
                }
            }
        }
        debug!("未找到匹配的页面，将创建新页面");
    }

    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("创建空白页面失败: {}", e);
        e
    })?;
    Ok((browser, page))
}
