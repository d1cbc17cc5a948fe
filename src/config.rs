use std::time::Duration;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 已运行浏览器的调试端口；为空时自行启动一个有界面的浏览器
    pub browser_debug_port: Option<u16>,
    /// 浏览器可执行文件；为空时自动查找
    pub chrome_executable: Option<String>,
    /// 目标网站
    pub target_url: String,
    /// 筛选文件
    pub filter_file: String,
    /// 启发式覆盖文件（TOML）
    pub heuristics_file: Option<String>,
    /// 会话丢失时的最大重试次数
    pub max_retries: u32,
    /// 退避基数（毫秒），第 n 次重试前等待 base × 2^n
    pub retry_base_delay_ms: u64,
    /// 申请流程的最大步数
    pub max_steps: usize,
    /// 最多处理的页数，0 表示不限
    pub max_pages: usize,
    /// 只识别不申请
    pub dry_run: bool,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    /// 搜索前等待手动登录
    pub pause_for_login: bool,
    /// 关闭浏览器前等待确认
    pub pause_before_exit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: None,
            chrome_executable: None,
            target_url: "https://de.indeed.com/".to_string(),
            filter_file: "job_filters.txt".to_string(),
            heuristics_file: None,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            max_steps: 10,
            max_pages: 0,
            dry_run: false,
            verbose_logging: false,
            output_log_file: "jobpilot.log".to_string(),
            pause_for_login: true,
            pause_before_exit: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT").or(default.browser_debug_port),
            chrome_executable: env_string("CHROME_EXECUTABLE").or(default.chrome_executable),
            target_url: env_string("TARGET_URL").unwrap_or(default.target_url),
            filter_file: env_string("FILTER_FILE").unwrap_or(default.filter_file),
            heuristics_file: env_string("HEURISTICS_FILE").or(default.heuristics_file),
            max_retries: env_parse("MAX_RETRIES").unwrap_or(default.max_retries),
            retry_base_delay_ms: env_parse("RETRY_BASE_DELAY_MS").unwrap_or(default.retry_base_delay_ms),
            max_steps: env_parse("MAX_STEPS").unwrap_or(default.max_steps),
            max_pages: env_parse("MAX_PAGES").unwrap_or(default.max_pages),
            dry_run: env_parse("DRY_RUN").unwrap_or(default.dry_run),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
            output_log_file: env_string("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            pause_for_login: env_parse("PAUSE_FOR_LOGIN").unwrap_or(default.pause_for_login),
            pause_before_exit: env_parse("PAUSE_BEFORE_EXIT").unwrap_or(default.pause_before_exit),
        }
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// 测试用：不暂停、不等待
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            retry_base_delay_ms: 1,
            pause_for_login: false,
            pause_before_exit: false,
            ..Self::default()
        }
    }
}
