use crate::error::ConfigError;
use crate::models::filter_set::{FilterSet, KEY_JOB_TITLE};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

/// 解析 `key = value` 格式的筛选内容
///
/// - `#` 开头的行是注释
/// - 没有 `=` 的行忽略
/// - 重复的 key 以最后一次为准
pub fn parse_filters(content: &str) -> FilterSet {
    let mut values = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            values.insert(key.to_string(), value.trim().to_string());
        }
    }
    FilterSet::new(values)
}

/// 读取筛选文件
///
/// 文件不存在或缺少 `job_title` 都是启动阶段的致命错误。
pub async fn load_filter_file(path: &Path) -> Result<FilterSet, ConfigError> {
    let content = fs::read_to_string(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => ConfigError::FilterFileMissing {
            path: path.display().to_string(),
        },
        _ => ConfigError::FilterFileUnreadable {
            path: path.display().to_string(),
            source: e,
        },
    })?;

    let filters = parse_filters(&content);
    if filters.job_title().is_empty() {
        return Err(ConfigError::MissingFilter {
            key: KEY_JOB_TITLE.to_string(),
        });
    }

    tracing::info!(
        "已加载筛选条件: 职位 '{}' | 地点 '{}' | 类型 {:?}",
        filters.job_title(),
        filters.location(),
        filters.job_types()
    );

    Ok(filters)
}
