//! Course table scanning: extract and filter rows from the rendered list.

use chrono::NaiveDate;
use scraper::{Html, Selector};
use tracing::warn;

use crate::types::{Course, CourseStatus, FilterCriteria};

/// Column offsets in the report's course table. The table renders at least
/// eight cells per data row; anything shorter is treated as malformed.
const COL_STATUS: usize = 0;
const COL_NAME: usize = 2;
const COL_START: usize = 3;
const COL_END: usize = 4;
const MIN_CELLS: usize = 8;

/// Counters emitted as a human-readable scan summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Data rows seen in the table, malformed ones included.
    pub total_rows: usize,
    /// Rows whose status matched the status filters.
    pub status_matched: usize,
    /// Rows matching status and date range; equals the result length.
    pub matched: usize,
}

impl std::fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "scanned {} rows, {} matched status, {} matched status and date range",
            self.total_rows, self.status_matched, self.matched
        )
    }
}

/// Parse a date cell. The table shows `YYYY-MM-DD` or `YYYY/MM/DD`, sometimes
/// with a trailing time-of-day; only the date part is kept.
pub fn parse_cell_date(text: &str) -> Option<NaiveDate> {
    let date_part = text.trim().split_whitespace().next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%Y/%m/%d"))
        .ok()
}

/// Scan the rendered course table and return the rows passing `criteria`,
/// in table order, plus the scan summary.
///
/// Malformed rows (fewer than eight cells) are skipped and logged, never
/// fatal. `row_index` on each returned course is the row's position in the
/// unfiltered table render, since re-entry into a course is index-based.
pub fn scan_course_rows(html: &str, criteria: &FilterCriteria) -> (Vec<Course>, ScanSummary) {
    let document = Html::parse_document(html);
    let row_sel = Selector::parse(".table-responsive table tbody tr").unwrap();
    let cell_sel = Selector::parse("td").unwrap();

    let mut courses = Vec::new();
    let mut summary = ScanSummary::default();

    for (row_index, row) in document.select(&row_sel).enumerate() {
        summary.total_rows += 1;

        let cells: Vec<String> = row
            .select(&cell_sel)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .collect();

        if cells.len() < MIN_CELLS {
            warn!(row_index, cells = cells.len(), "skipping malformed course row");
            continue;
        }

        let Some(status) = CourseStatus::from_site_label(&cells[COL_STATUS]) else {
            // Unknown status labels can never match a filter.
            continue;
        };

        if !criteria.status_filters.contains(&status) {
            continue;
        }
        summary.status_matched += 1;

        let start_text = cells[COL_START].clone();
        let end_text = cells[COL_END].clone();
        let start_date = parse_cell_date(&start_text);
        let end_date = parse_cell_date(&end_text);
        if start_date.is_none() {
            warn!(row_index, text = %start_text, "unparsable start date, keeping row");
        }

        if !criteria.matches(status, start_date) {
            continue;
        }
        summary.matched += 1;

        courses.push(Course {
            name: cells[COL_NAME].clone(),
            status,
            start_date,
            end_date,
            start_text,
            end_text,
            row_index,
            stats: None,
        });
    }

    (courses, summary)
}
