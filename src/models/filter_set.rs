//! 搜索筛选条件

use std::collections::BTreeMap;

use phf::phf_map;

/// 职位类型：英文 → 德文筛选按钮文案
static JOB_TYPE_LABELS: phf::Map<&'static str, &'static str> = phf_map! {
    "full-time" => "vollzeit",
    "part-time" => "teilzeit",
    "contract" => "befristet",
    "temporary" => "befristet",
    "internship" => "praktikum",
    "apprenticeship" => "ausbildung",
    "mini-job" => "minijob",
    "freelance" => "freie mitarbeit",
};

pub const KEY_JOB_TITLE: &str = "job_title";
pub const KEY_LOCATION: &str = "location";
pub const KEY_JOB_TYPE: &str = "job_type";

/// 筛选条件集合，加载后只读
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    values: BTreeMap<String, String>,
}

impl FilterSet {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn job_title(&self) -> &str {
        self.get(KEY_JOB_TITLE).unwrap_or_default()
    }

    pub fn location(&self) -> &str {
        self.get(KEY_LOCATION).unwrap_or_default()
    }

    /// `job_type` 拆分后的原始值
    pub fn job_types(&self) -> Vec<&str> {
        self.get(KEY_JOB_TYPE)
            .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    /// (原始值, 筛选按钮文案)，没有翻译的保留原始值
    pub fn job_type_labels(&self) -> Vec<(String, String)> {
        self.job_types()
            .into_iter()
            .map(|raw| (raw.to_string(), translate_job_type(raw)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 把职位类型翻译成目标语言的筛选文案（不区分大小写）
pub fn translate_job_type(raw: &str) -> String {
    JOB_TYPE_LABELS
        .get(raw.trim().to_lowercase().as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| raw.trim().to_string())
}
