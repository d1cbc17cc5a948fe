//! 申请上下文
//!
//! 封装"我正在处理第几页的第几个职位"这一信息

use std::fmt::Display;

/// 申请上下文，只用于日志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyCtx {
    /// 页码（从1开始）
    pub page: usize,

    /// 职位在当前页中的序号（从1开始）
    pub listing: usize,
}

impl ApplyCtx {
    pub fn new(page: usize, listing: usize) -> Self {
        Self { page, listing }
    }
}

impl Display for ApplyCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[第 {} 页 职位#{}]", self.page, self.listing)
    }
}
