//! 点击前的高亮提示
//!
//! 纯视觉反馈：任何失败都只记 debug 日志，不影响调用方。

use std::time::Duration;

use serde_json::{json, Value as JsonValue};
use tokio::time::sleep;
use tracing::debug;

use crate::infrastructure::{ElementHandle, UiDriver};

const HIGHLIGHT_ON: &str = r#"
    const el = arguments[0];
    const previous = el.style.backgroundColor;
    el.style.backgroundColor = 'yellow';
    return previous;
"#;

/// 把元素滚动到可见处，短暂标黄后恢复原背景色
pub async fn highlight<D: UiDriver + ?Sized>(driver: &D, element: &ElementHandle, hold: Duration) {
    if let Err(e) = driver.scroll_into_view(element).await {
        debug!("高亮前滚动失败（忽略）: {}", e);
        return;
    }

    let previous = match driver.execute_script(HIGHLIGHT_ON, &[*element]).await {
        Ok(JsonValue::String(previous)) => previous,
        Ok(_) => String::new(),
        Err(e) => {
            debug!("高亮失败（忽略）: {}", e);
            return;
        }
    };

    sleep(hold).await;

    let restore = format!(
        "arguments[0].style.backgroundColor = {};",
        json!(previous)
    );
    if let Err(e) = driver.execute_script(&restore, &[*element]).await {
        debug!("恢复高亮失败（忽略）: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::fake::{Call, FakeDriver, FakeNode};

    #[tokio::test]
    async fn test_highlight_runs_two_scripts() {
        let driver = FakeDriver::new("main", "doc");
        let button = driver.add(FakeNode::new("doc", "button").text("Weiter"));

        highlight(&driver, &button, Duration::ZERO).await;

        let scripts = driver
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Script(_)))
            .count();
        assert_eq!(scripts, 2);
    }

    #[tokio::test]
    async fn test_highlight_failure_is_swallowed() {
        let driver = FakeDriver::new("main", "doc");
        let button = driver.add(FakeNode::new("doc", "button"));
        driver.fail_scripts();

        // 不 panic、不返回错误即可
        highlight(&driver, &button, Duration::ZERO).await;
    }
}
