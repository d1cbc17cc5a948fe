//! 职位列表爬取器 - 编排层
//!
//! ## 职责
//!
//! 1. **搜索**：填写职位名称和地点并提交
//! 2. **筛选**：逐个点击职位类型筛选按钮，单个失败只记日志
//! 3. **逐页遍历**：每个职位都重新获取列表，点开详情、识别、申请
//! 4. **翻页**：没有下一页按钮或按钮不可用时结束
//! 5. **统计**：累计成功申请数量，出错中止时也照样返回

use std::fmt;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::infrastructure::{
    recoverable, DriverError, DriverResult, ElementHandle, Locator, UiDriver, WaitCondition,
};
use crate::models::{FilterSet, Heuristics};
use crate::services::{highlight, ApplicationLog, EasyApplyClassifier, PopupDismisser, RetryPolicy};
use crate::utils::logging::truncate_text;
use crate::workflow::{ApplicationStepper, ApplyCtx};

const NEXT_PAGE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// 运行结束的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEnd {
    /// 最后一页：没有下一页按钮
    NoNextControl,
    /// 下一页按钮存在但不可用
    NextDisabled,
    /// 达到 `max_pages`
    MaxPages,
    /// 无法恢复的错误
    Aborted(String),
}

impl fmt::Display for RunEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunEnd::NoNextControl => f.write_str("没有下一页"),
            RunEnd::NextDisabled => f.write_str("下一页按钮不可用"),
            RunEnd::MaxPages => f.write_str("达到最大页数"),
            RunEnd::Aborted(reason) => write!(f, "运行中止: {}", reason),
        }
    }
}

/// 运行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// 成功申请数量
    pub applied: usize,
    pub pages: usize,
    /// 点开过的职位数量
    pub listings: usize,
    /// 识别为一键申请的数量
    pub applyable: usize,
    /// 申请未成功（无法继续或失败）的数量
    pub failed: usize,
    pub end: RunEnd,
}

impl Default for RunResult {
    fn default() -> Self {
        Self {
            applied: 0,
            pages: 0,
            listings: 0,
            applyable: 0,
            failed: 0,
            end: RunEnd::NoNextControl,
        }
    }
}

/// 翻页结果
enum NextPage {
    Clicked,
    Missing,
    Disabled,
}

/// 单个职位的处理结果
enum ListingStep {
    Done,
    /// 列表比预期短，本页结束
    OutOfRange,
}

/// 职位列表爬取器
///
/// - 不持有 driver，由调用方传入
/// - 识别和申请都经过重试层
pub struct ListingCrawler {
    heuristics: Heuristics,
    classifier: EasyApplyClassifier,
    popups: PopupDismisser,
    stepper: ApplicationStepper,
    retry: RetryPolicy,
    application_log: ApplicationLog,
    max_pages: usize,
    dry_run: bool,
}

impl ListingCrawler {
    pub fn new(config: &Config, heuristics: &Heuristics) -> Self {
        Self {
            heuristics: heuristics.clone(),
            classifier: EasyApplyClassifier::new(heuristics),
            popups: PopupDismisser::new(heuristics),
            stepper: ApplicationStepper::new(heuristics, config.max_steps),
            retry: RetryPolicy::from_config(config),
            application_log: ApplicationLog::with_path(config.output_log_file.clone()),
            max_pages: config.max_pages,
            dry_run: config.dry_run,
        }
    }

    /// 完整运行一次：搜索 → 筛选 → 逐页处理
    ///
    /// 不返回错误：无法恢复的错误记录在 `RunResult::end` 中，已累计的数量照常返回。
    pub async fn run<D: UiDriver + ?Sized>(&self, driver: &D, filters: &FilterSet) -> RunResult {
        let mut result = RunResult::default();
        match self.crawl(driver, filters, &mut result).await {
            Ok(end) => {
                info!("🏁 运行结束: {}", end);
                result.end = end;
            }
            Err(e) => {
                error!("❌ 运行中止 (已成功申请 {} 个): {}", result.applied, e);
                result.end = RunEnd::Aborted(e.to_string());
            }
        }
        result
    }

    async fn crawl<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        filters: &FilterSet,
        result: &mut RunResult,
    ) -> DriverResult<RunEnd> {
        let timings = &self.heuristics.timings;

        self.retry
            .run("提交搜索", || self.submit_search(driver, filters))
            .await?;
        self.apply_filters(driver, filters).await?;

        loop {
            result.pages += 1;
            let page = result.pages;
            sleep(timings.page_settle()).await;

            info!("\n{}", "=".repeat(60));
            info!("📄 开始处理第 {} 页", page);
            info!("{}", "=".repeat(60));
            self.process_page(driver, page, result).await?;
            info!(
                "✓ 第 {} 页完成，目前已成功申请 {} 个职位",
                page, result.applied
            );

            if self.max_pages > 0 && page >= self.max_pages {
                return Ok(RunEnd::MaxPages);
            }

            match self.next_page(driver).await? {
                NextPage::Clicked => {}
                NextPage::Missing => return Ok(RunEnd::NoNextControl),
                NextPage::Disabled => return Ok(RunEnd::NextDisabled),
            }
        }
    }

    /// 填写职位名称和地点并提交
    async fn submit_search<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        filters: &FilterSet,
    ) -> DriverResult<()> {
        let timings = &self.heuristics.timings;
        let title_field = self
            .wait_for_field(driver, &self.heuristics.search_title_selector)
            .await?;
        let location_field = self
            .wait_for_field(driver, &self.heuristics.search_location_selector)
            .await?;

        info!(
            "🔍 搜索: 职位 '{}' | 地点 '{}'",
            filters.job_title(),
            filters.location()
        );
        driver.type_text(&title_field, filters.job_title()).await?;
        driver.type_text(&location_field, filters.location()).await?;
        driver.submit(&location_field).await?;

        sleep(timings.search_settle()).await;
        Ok(())
    }

    async fn wait_for_field<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        selector: &str,
    ) -> DriverResult<ElementHandle> {
        let found = driver
            .wait_until(
                &WaitCondition::Present(Locator::css(selector)),
                self.heuristics.timings.element_wait(),
            )
            .await?;
        found
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::NotFound(selector.to_string()))
    }

    /// 逐个点击职位类型筛选；单个筛选失败不影响其他筛选
    async fn apply_filters<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        filters: &FilterSet,
    ) -> DriverResult<()> {
        let timings = &self.heuristics.timings;
        let locator = Locator::css(self.heuristics.filter_button_selector.as_str());

        for (raw, label) in filters.job_type_labels() {
            let condition = WaitCondition::ClickableWithText {
                locator: locator.clone(),
                text: label.clone(),
            };

            let clicked = match driver.wait_until(&condition, timings.element_wait()).await {
                Ok(found) => match found.first() {
                    Some(button) => {
                        highlight(driver, button, timings.highlight()).await;
                        driver.click(button).await
                    }
                    None => Err(DriverError::NotFound(label.clone())),
                },
                Err(e) => Err(e),
            };

            match clicked {
                Ok(()) => {
                    info!("✓ 已应用筛选: {} ({})", raw, label);
                    sleep(timings.filter_settle()).await;
                }
                Err(e) if e.is_session_loss() => return Err(e),
                Err(e) => warn!("⚠️ 筛选 {} ({}) 未能应用，继续: {}", raw, label, e),
            }
        }
        Ok(())
    }

    /// 处理当前页的所有职位
    async fn process_page<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        page: usize,
        result: &mut RunResult,
    ) -> DriverResult<()> {
        // 慢页面上职位卡片可能还没渲染出来，等不到才算空页
        let present = WaitCondition::Present(self.heuristics.listing_locator());
        let wait = self.heuristics.timings.element_wait();
        let count = match self
            .retry
            .run("获取职位列表", || driver.wait_until(&present, wait))
            .await
        {
            Ok(found) => found.len(),
            Err(DriverError::Timeout { .. }) => 0,
            Err(e) => return Err(e),
        };
        info!("第 {} 页共 {} 个职位", page, count);

        for index in 0..count {
            let ctx = ApplyCtx::new(page, index + 1);
            match self.process_listing(driver, &ctx, index, result).await? {
                ListingStep::Done => {}
                ListingStep::OutOfRange => {
                    info!("{} 列表已变短，本页结束", ctx);
                    break;
                }
            }
            sleep(self.heuristics.timings.between_listings()).await;
        }
        Ok(())
    }

    /// 处理一个职位：点开 → 识别 → 申请
    ///
    /// 只有重试用尽的会话丢失会返回错误。
    async fn process_listing<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        ctx: &ApplyCtx,
        index: usize,
        result: &mut RunResult,
    ) -> DriverResult<ListingStep> {
        let timings = &self.heuristics.timings;

        // 每次都重新获取，点开详情或关闭弹窗后列表可能已经变了
        let listings = recoverable(driver.find_all(&self.heuristics.listing_locator()).await)?
            .unwrap_or_default();
        let Some(listing) = listings.get(index).copied() else {
            return Ok(ListingStep::OutOfRange);
        };
        result.listings += 1;

        let title = recoverable(driver.text(&listing).await)?
            .map(|t| truncate_text(t.lines().next().unwrap_or_default(), 60))
            .unwrap_or_default();
        info!("{} 👉 {}", ctx, title);

        self.popups.dismiss(driver).await;
        match self.open_listing(driver, &listing).await {
            Ok(()) => {}
            Err(e) if e.is_session_loss() => return Err(e),
            Err(e) => {
                warn!("{} ⚠️ 无法打开职位，跳过: {}", ctx, e);
                return Ok(ListingStep::Done);
            }
        }
        sleep(timings.card_settle()).await;
        self.popups.dismiss(driver).await;

        let classification = self
            .retry
            .run("识别一键申请", || self.classifier.classify(driver))
            .await?;
        let Some(affordance) = classification.affordance() else {
            info!("{} 不支持一键申请，跳过", ctx);
            return Ok(ListingStep::Done);
        };
        result.applyable += 1;
        if let Some(evidence) = &classification.evidence {
            info!("{} ✓ 支持一键申请 ({})", ctx, evidence.signal);
        }

        if self.dry_run {
            info!("{} DRY_RUN 模式，不申请", ctx);
            return Ok(ListingStep::Done);
        }

        let outcome = self
            .retry
            .run("一键申请", || self.stepper.run(driver, ctx, &affordance))
            .await?;
        if outcome.succeeded() {
            result.applied += 1;
            info!(
                "{} 🎉 申请成功 ({} 步)，累计 {} 个",
                ctx, outcome.steps, result.applied
            );
            self.application_log
                .record_success(ctx.page, ctx.listing, &title, outcome.steps)
                .await;
        } else {
            result.failed += 1;
            warn!("{} 申请未完成: {} ({} 步)", ctx, outcome.state, outcome.steps);
        }
        Ok(ListingStep::Done)
    }

    /// 滚动到职位卡片、等待可点击、点击
    async fn open_listing<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        listing: &ElementHandle,
    ) -> DriverResult<()> {
        let timings = &self.heuristics.timings;
        driver.scroll_into_view(listing).await?;
        driver
            .wait_until(&WaitCondition::Clickable(*listing), timings.element_wait())
            .await?;
        highlight(driver, listing, timings.highlight()).await;
        driver.click(listing).await
    }

    /// 找下一页按钮并点击
    async fn next_page<D: UiDriver + ?Sized>(&self, driver: &D) -> DriverResult<NextPage> {
        let timings = &self.heuristics.timings;
        let Some(next) = self.find_next_control(driver).await? else {
            info!("没有找到下一页按钮");
            return Ok(NextPage::Missing);
        };

        let enabled = recoverable(driver.is_enabled(&next).await)?.unwrap_or(false);
        let aria_disabled = recoverable(driver.attribute(&next, "aria-disabled").await)?
            .flatten()
            .is_some_and(|v| v == "true");
        if !enabled || aria_disabled {
            info!("下一页按钮不可用");
            return Ok(NextPage::Disabled);
        }

        info!("➡️ 翻到下一页");
        highlight(driver, &next, timings.highlight()).await;
        driver.click(&next).await?;
        sleep(timings.next_settle()).await;
        Ok(NextPage::Clicked)
    }

    /// 在 `next_page_wait` 内轮询所有下一页选择器
    async fn find_next_control<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
    ) -> DriverResult<Option<ElementHandle>> {
        let locators = self.heuristics.next_page_locators();
        let deadline = Instant::now() + self.heuristics.timings.next_page_wait();
        loop {
            for locator in &locators {
                if let Some(found) = recoverable(driver.find_all(locator).await)? {
                    if let Some(first) = found.first() {
                        debug!("下一页按钮: {} ({})", first, locator);
                        return Ok(Some(*first));
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            sleep(NEXT_PAGE_POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::fake::{Call, Effect, FakeDriver, FakeNode};
    use crate::models::{parse_filters, Timings};

    const RESULTS: &str = "results";
    const FORM: &str = "form";

    fn config(dir: &tempfile::TempDir) -> Config {
        Config {
            output_log_file: dir.path().join("run.log").to_string_lossy().to_string(),
            ..Config::for_tests()
        }
    }

    fn crawler(config: &Config) -> ListingCrawler {
        ListingCrawler::new(config, &Heuristics::instant())
    }

    /// 结果页：搜索框 + 地点框
    fn results_page(driver: &FakeDriver) -> (ElementHandle, ElementHandle) {
        let title_field = driver.add(FakeNode::new(RESULTS, "#text-input-what"));
        let location_field = driver.add(FakeNode::new(RESULTS, "#text-input-where"));
        (title_field, location_field)
    }

    fn listing(text: &str) -> FakeNode {
        FakeNode::new(RESULTS, ".job_seen_beacon").text(text)
    }

    /// 点击 `card` 后显示的一键申请按钮，申请一步就成功
    fn easy_apply_for(driver: &FakeDriver, card: ElementHandle, window: &str) -> ElementHandle {
        let button = driver.add(
            FakeNode::new(RESULTS, "#indeedApplyButton")
                .text("Easy Apply")
                .group("detail")
                .hidden()
                .on_click(Effect::OpenWindow {
                    window: window.to_string(),
                    doc: FORM.to_string(),
                }),
        );
        driver.add_effect(card, Effect::Reveal(button));
        button
    }

    fn success_form(driver: &FakeDriver) {
        driver.add(
            FakeNode::new(FORM, "button")
                .text("Weiter")
                .style("display", "flex")
                .on_click(Effect::SetText {
                    doc: FORM.to_string(),
                    text: "Application submitted".to_string(),
                }),
        );
    }

    #[tokio::test]
    async fn test_search_and_two_filter_clicks() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::new("main", RESULTS);
        let (title_field, location_field) = results_page(&driver);
        driver.add(FakeNode::new(RESULTS, "button").text("Vollzeit"));
        driver.add(FakeNode::new(RESULTS, "button").text("Praktikum"));
        driver.add(FakeNode::new(RESULTS, "button").text("Teilzeit"));

        let filters = parse_filters(
            "job_title = backend engineer\nlocation = berlin\njob_type = full-time, internship\n",
        );
        let result = crawler(&config(&dir)).run(&driver, &filters).await;

        let calls = driver.calls();
        assert!(calls.contains(&Call::Type(title_field, "backend engineer".to_string())));
        assert!(calls.contains(&Call::Type(location_field, "berlin".to_string())));
        assert!(calls.contains(&Call::Submit(location_field)));
        assert_eq!(
            driver.clicked_texts(),
            vec!["Vollzeit".to_string(), "Praktikum".to_string()]
        );
        assert_eq!(result.end, RunEnd::NoNextControl);
        assert_eq!(result.applied, 0);
    }

    #[tokio::test]
    async fn test_missing_filter_does_not_stop_others() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::new("main", RESULTS);
        results_page(&driver);
        driver.add(FakeNode::new(RESULTS, "button").text("Praktikum"));

        let filters = parse_filters("job_title = dev\njob_type = full-time, internship\n");
        let result = crawler(&config(&dir)).run(&driver, &filters).await;

        assert_eq!(driver.clicked_texts(), vec!["Praktikum".to_string()]);
        assert_eq!(result.end, RunEnd::NoNextControl);
    }

    #[tokio::test]
    async fn test_single_page_applies_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let driver = FakeDriver::new("main", RESULTS);
        results_page(&driver);
        let plain = driver.add(listing("Java Developer\nFirma A"));
        let easy = driver.add(listing("Backend Engineer\nFirma B"));
        let apply = easy_apply_for(&driver, easy, "apply");
        success_form(&driver);

        let filters = parse_filters("job_title = backend engineer\nlocation = berlin\n");
        let result = crawler(&config).run(&driver, &filters).await;

        assert_eq!(result.applied, 1);
        assert_eq!(result.listings, 2);
        assert_eq!(result.applyable, 1);
        assert_eq!(result.failed, 0);
        assert_eq!(result.pages, 1);
        assert_eq!(result.end, RunEnd::NoNextControl);

        let clicks = driver.clicks();
        assert_eq!(&clicks[..3], &[plain, easy, apply]);
        assert_eq!(driver.open_windows(), vec!["main".to_string()]);

        let log = std::fs::read_to_string(&config.output_log_file).unwrap();
        assert!(log.contains("Backend Engineer"));
    }

    #[tokio::test]
    async fn test_dry_run_never_clicks_apply() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            dry_run: true,
            ..config(&dir)
        };
        let driver = FakeDriver::new("main", RESULTS);
        results_page(&driver);
        let easy = driver.add(listing("Backend Engineer"));
        let apply = easy_apply_for(&driver, easy, "apply");

        let result = crawler(&config).run(&driver, &parse_filters("job_title = x")).await;

        assert_eq!(result.applyable, 1);
        assert_eq!(result.applied, 0);
        assert!(!driver.clicks().contains(&apply));
    }

    #[tokio::test]
    async fn test_pagination_until_next_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::new("main", RESULTS);
        results_page(&driver);
        driver.add(listing("Job 1"));
        let next = driver.add(
            FakeNode::new(RESULTS, "[aria-label='Next']").on_click(Effect::Navigate("page2".to_string())),
        );
        driver.add(FakeNode::new("page2", ".job_seen_beacon").text("Job 2"));
        driver.add(FakeNode::new("page2", "[aria-label='Next']").disabled());

        let result = crawler(&config(&dir)).run(&driver, &parse_filters("job_title = x")).await;

        assert_eq!(result.pages, 2);
        assert_eq!(result.listings, 2);
        assert_eq!(result.end, RunEnd::NextDisabled);
        assert_eq!(driver.clicks().iter().filter(|c| **c == next).count(), 1);
    }

    #[tokio::test]
    async fn test_aria_disabled_next_ends_run() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::new("main", RESULTS);
        results_page(&driver);
        driver.add(listing("Job 1"));
        let next = driver.add(FakeNode::new(RESULTS, "[aria-label='Next']").attr("aria-disabled", "true"));

        let result = crawler(&config(&dir)).run(&driver, &parse_filters("job_title = x")).await;

        assert_eq!(result.pages, 1);
        assert_eq!(result.end, RunEnd::NextDisabled);
        assert!(!driver.clicks().contains(&next));
    }

    #[tokio::test]
    async fn test_waits_for_slow_listings() {
        let dir = tempfile::tempdir().unwrap();
        let heuristics = Heuristics {
            timings: Timings {
                element_wait_ms: 2_000,
                ..Timings::zero()
            },
            ..Heuristics::default()
        };
        let driver = FakeDriver::new("main", RESULTS);
        results_page(&driver);

        let crawler = ListingCrawler::new(&config(&dir), &heuristics);
        let filters = parse_filters("job_title = x");
        let (result, late) = tokio::join!(crawler.run(&driver, &filters), async {
            sleep(Duration::from_millis(300)).await;
            driver.add(listing("Late Job"))
        });

        assert_eq!(result.listings, 1);
        assert!(driver.clicks().contains(&late));
        assert_eq!(result.end, RunEnd::NoNextControl);
    }

    #[tokio::test]
    async fn test_empty_page_after_wait_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::new("main", RESULTS);
        results_page(&driver);

        let result = crawler(&config(&dir)).run(&driver, &parse_filters("job_title = x")).await;

        assert_eq!(result.listings, 0);
        assert_eq!(result.pages, 1);
        assert_eq!(result.end, RunEnd::NoNextControl);
    }

    #[tokio::test]
    async fn test_max_pages_stops_before_next() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            max_pages: 1,
            ..config(&dir)
        };
        let driver = FakeDriver::new("main", RESULTS);
        results_page(&driver);
        let next = driver.add(FakeNode::new(RESULTS, "[aria-label='Next']"));

        let result = crawler(&config).run(&driver, &parse_filters("job_title = x")).await;

        assert_eq!(result.end, RunEnd::MaxPages);
        assert!(!driver.clicks().contains(&next));
    }

    #[tokio::test]
    async fn test_shrinking_list_ends_page_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::new("main", RESULTS);
        results_page(&driver);
        let first = driver.add(listing("Job 1"));
        let second = driver.add(listing("Job 2"));
        driver.add_effect(first, Effect::Detach(second));

        let result = crawler(&config(&dir)).run(&driver, &parse_filters("job_title = x")).await;

        assert_eq!(result.listings, 1);
        assert_eq!(result.end, RunEnd::NoNextControl);
    }

    #[tokio::test]
    async fn test_unrecoverable_session_loss_aborts_with_count() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            max_retries: 1,
            ..config(&dir)
        };
        let driver = FakeDriver::new("main", RESULTS);
        results_page(&driver);
        driver.fail_with_session_loss("find_all", 100);

        let result = crawler(&config).run(&driver, &parse_filters("job_title = x")).await;

        assert!(matches!(result.end, RunEnd::Aborted(_)));
        assert_eq!(result.applied, 0);
    }
}
