use anyhow::Result;
use jobpilot::utils::logging::init_tracing;
use jobpilot::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    init_tracing(config.verbose_logging);

    // 初始化并运行应用
    let _result = App::initialize(config).await?.run().await?;

    Ok(())
}
