//! 控制台提示

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// 打印提示并等待用户按回车
///
/// 标准输入已关闭时直接返回。
pub async fn wait_for_enter(message: &str) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(format!("\n👉 {}（按回车继续）", message).as_bytes()).await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(())
}
