use crate::error::ConfigError;
use crate::models::heuristics::Heuristics;
use std::path::Path;
use tokio::fs;

/// 加载启发式配置
///
/// 没有指定文件时使用内置默认值；文件中只需要写要覆盖的字段。
pub async fn load_heuristics(path: Option<&Path>) -> Result<Heuristics, ConfigError> {
    let Some(path) = path else {
        tracing::debug!("未指定启发式配置文件，使用内置默认值");
        return Ok(Heuristics::default());
    };

    let content = fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::HeuristicsInvalid {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    let heuristics: Heuristics =
        toml::from_str(&content).map_err(|e| ConfigError::HeuristicsInvalid {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    tracing::info!(
        "已加载启发式配置: {} ({} 个申请按钮探针, {} 个成功文案)",
        path.display(),
        heuristics.apply_probes.len(),
        heuristics.success_phrases.len()
    );

    Ok(heuristics)
}
