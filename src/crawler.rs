//! Crawl orchestration: drives the portal through search, scan and
//! per-course scraping, streaming progress over a bounded event channel.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::scan::scan_course_rows;
use crate::stats::parse_statistics;
use crate::types::{Course, CourseStatus, FilterCriteria};

/// Pause after a successful scrape before navigating back, letting the
/// client-side rendering settle. A deliberate delay, not a correctness wait.
const COURSE_SETTLE: Duration = Duration::from_secs(1);

/// Navigation operations the orchestrator needs from a live portal session.
///
/// [`crate::session::SessionDriver`] implements this against the real site;
/// tests drive the orchestrator with a fake. The crawl is one sequential
/// task, so portal futures are not required to be `Send`.
#[async_trait(?Send)]
pub trait CoursePortal {
    /// Apply the optional search text and leave the course table rendered.
    async fn search(&self, text: Option<&str>) -> anyhow::Result<()>;

    /// Markup of the page currently showing the course table.
    async fn course_table_html(&self) -> anyhow::Result<String>;

    /// Enter the course at `row_index`, open its summary sub-page, and
    /// return the rendered markup.
    async fn open_course_summary(&self, row_index: usize) -> anyhow::Result<String>;

    /// Navigate back to the course table, preserving server-side state.
    async fn back_to_course_list(&self) -> anyhow::Result<()>;
}

/// Crawl state machine. `Completed`, `Aborted` and `Cancelled` are terminal;
/// partial results are preserved in all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    Idle,
    LoggingIn,
    Searching,
    ScanningList,
    EnteringCourse,
    ScrapingStats,
    ReturningToList,
    Completed,
    Aborted,
    Cancelled,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// An unrecoverable step failed; remaining courses were not attempted.
    Aborted,
    /// Stopped by the user between courses.
    Cancelled,
}

impl RunOutcome {
    fn phase(self) -> CrawlPhase {
        match self {
            Self::Completed => CrawlPhase::Completed,
            Self::Aborted => CrawlPhase::Aborted,
            Self::Cancelled => CrawlPhase::Cancelled,
        }
    }
}

/// Progress notifications streamed to the presentation layer. One-way; the
/// consumer drains them on its own schedule.
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    Phase(CrawlPhase),
    Message(String),
    CourseStarted {
        /// 1-based position within the matching courses.
        index: usize,
        total: usize,
        name: String,
        status: CourseStatus,
        start: String,
    },
    CourseCompleted {
        name: String,
        /// Enrollment summed across all regions.
        total_enrolled: u64,
    },
    /// Snapshot of every course completed so far.
    DataReady(Vec<Course>),
}

/// Sequential crawl driver. One instance per run.
pub struct Crawler {
    events: mpsc::Sender<CrawlEvent>,
    cancel: CancellationToken,
}

impl Crawler {
    pub fn new(events: mpsc::Sender<CrawlEvent>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    /// Emit an event, ignoring a departed consumer.
    async fn emit(&self, event: CrawlEvent) {
        let _ = self.events.send(event).await;
    }

    async fn message(&self, text: impl Into<String>) {
        self.emit(CrawlEvent::Message(text.into())).await;
    }

    pub async fn emit_phase(&self, phase: CrawlPhase) {
        self.emit(CrawlEvent::Phase(phase)).await;
    }

    async fn finish(&self, outcome: RunOutcome, collected: Vec<Course>) -> (Vec<Course>, RunOutcome) {
        self.emit_phase(outcome.phase()).await;
        (collected, outcome)
    }

    /// Run the full search → scan → scrape sequence against `portal`.
    ///
    /// Fail-fast: the first unrecoverable course aborts the remaining batch.
    /// Cancellation is cooperative, checked before each course; partial
    /// results are returned on every termination path.
    pub async fn process_all_courses<P>(
        &self,
        portal: &P,
        criteria: &FilterCriteria,
    ) -> (Vec<Course>, RunOutcome)
    where
        P: CoursePortal,
    {
        let mut collected: Vec<Course> = Vec::new();

        self.emit_phase(CrawlPhase::Searching).await;
        if let Err(e) = portal.search(criteria.search_text.as_deref()).await {
            self.message(format!("search failed: {e}")).await;
            return self.finish(RunOutcome::Aborted, collected).await;
        }

        self.emit_phase(CrawlPhase::ScanningList).await;
        let table_html = match portal.course_table_html().await {
            Ok(html) => html,
            Err(e) => {
                self.message(format!("could not read course table: {e}")).await;
                return self.finish(RunOutcome::Aborted, collected).await;
            }
        };
        let (courses, summary) = scan_course_rows(&table_html, criteria);
        self.message(summary.to_string()).await;

        let total = courses.len();
        self.message(format!("found {total} matching courses")).await;

        for (position, mut course) in courses.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.message("stopped by user").await;
                return self.finish(RunOutcome::Cancelled, collected).await;
            }

            self.emit(CrawlEvent::CourseStarted {
                index: position + 1,
                total,
                name: course.name.clone(),
                status: course.status,
                start: course.start_text.clone(),
            })
            .await;

            self.emit_phase(CrawlPhase::EnteringCourse).await;
            let summary_html = match portal.open_course_summary(course.row_index).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(course = %course.name, "course scrape failed: {e}");
                    self.message(format!("could not scrape {}: {e}", course.name))
                        .await;
                    return self.finish(RunOutcome::Aborted, collected).await;
                }
            };

            self.emit_phase(CrawlPhase::ScrapingStats).await;
            let stats = parse_statistics(&summary_html);
            let total_enrolled = stats.total_enrolled();
            course.stats = Some(stats);
            collected.push(course.clone());

            self.emit(CrawlEvent::CourseCompleted {
                name: course.name,
                total_enrolled,
            })
            .await;
            self.emit(CrawlEvent::DataReady(collected.clone())).await;

            tokio::time::sleep(COURSE_SETTLE).await;

            self.emit_phase(CrawlPhase::ReturningToList).await;
            if let Err(e) = portal.back_to_course_list().await {
                self.message(format!("could not return to course list: {e}"))
                    .await;
                return self.finish(RunOutcome::Aborted, collected).await;
            }
        }

        self.finish(RunOutcome::Completed, collected).await
    }
}
