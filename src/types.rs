//! Core data types: courses, statistics, filter criteria.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Course status as shown in the first column of the report table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    Open,
    Upcoming,
    Closed,
}

impl CourseStatus {
    /// Map the site's status label to a status. Unknown labels yield `None`
    /// and therefore never match any filter.
    pub fn from_site_label(label: &str) -> Option<Self> {
        match label.trim() {
            "開課中" => Some(Self::Open),
            "即將開課" => Some(Self::Upcoming),
            "已結束" => Some(Self::Closed),
            _ => None,
        }
    }

    /// The label the site (and the exported report) uses for this status.
    pub fn site_label(&self) -> &'static str {
        match self {
            Self::Open => "開課中",
            Self::Upcoming => "即將開課",
            Self::Closed => "已結束",
        }
    }
}

impl std::fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Upcoming => "upcoming",
            Self::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

/// Per-region counts for one metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCounts {
    pub taiwan: u64,
    pub mainland_china: u64,
    pub other: u64,
}

impl RegionCounts {
    pub fn total(&self) -> u64 {
        self.taiwan + self.mainland_china + self.other
    }
}

/// Statistics scraped from a course's summary page.
///
/// Region-partitioned metrics hold one count per region; `discussions` is a
/// plain count and `mobile_video_views` is `None` when the site shows no
/// usable number (rendered as "N/A" downstream).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub enrolled: RegionCounts,
    pub passed: RegionCounts,
    pub video_views: RegionCounts,
    pub assignment_attempts: RegionCounts,
    pub material_views: RegionCounts,
    pub material_viewers: RegionCounts,
    pub discussions: u64,
    pub mobile_video_views: Option<u64>,
}

impl Statistics {
    /// Total enrollment across all regions, as reported in progress messages.
    pub fn total_enrolled(&self) -> u64 {
        self.enrolled.total()
    }
}

/// One row of the course table, optionally enriched with summary statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub name: String,
    pub status: CourseStatus,
    /// Start/end as parsed dates; `None` means the cell text was not a
    /// recognizable date (treated as in-range by the scan filter).
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Literal cell text, preserved for display and export.
    pub start_text: String,
    pub end_text: String,
    /// Position in the *unfiltered* table render. Re-entry is index-based,
    /// so this must track the live table, not the filtered result list.
    pub row_index: usize,
    pub stats: Option<Statistics>,
}

/// Client-side filters applied to the scanned course table. The site does
/// not expose status or date-range filtering as query parameters.
#[derive(Debug, Clone)]
pub struct FilterCriteria {
    pub search_text: Option<String>,
    pub status_filters: BTreeSet<CourseStatus>,
    /// Inclusive range checked against the course start date.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CriteriaError {
    #[error("at least one course status must be selected")]
    NoStatusSelected,
    #[error("date range start {0} is after end {1}")]
    InvalidDateRange(NaiveDate, NaiveDate),
}

impl FilterCriteria {
    pub fn new(
        search_text: Option<String>,
        status_filters: BTreeSet<CourseStatus>,
        date_range: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<Self, CriteriaError> {
        if status_filters.is_empty() {
            return Err(CriteriaError::NoStatusSelected);
        }
        if let Some((start, end)) = date_range {
            if start > end {
                return Err(CriteriaError::InvalidDateRange(start, end));
            }
        }
        Ok(Self {
            search_text,
            status_filters,
            date_range,
        })
    }

    /// Whether a course with the given status and start date passes the
    /// filters. An unparsable (`None`) start date passes permissively.
    pub fn matches(&self, status: CourseStatus, start_date: Option<NaiveDate>) -> bool {
        if !self.status_filters.contains(&status) {
            return false;
        }
        match (self.date_range, start_date) {
            (Some((from, to)), Some(start)) => from <= start && start <= to,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_status_label_roundtrip() {
        for status in [CourseStatus::Open, CourseStatus::Upcoming, CourseStatus::Closed] {
            assert_eq!(CourseStatus::from_site_label(status.site_label()), Some(status));
        }
    }

    #[test]
    fn test_status_label_trims_whitespace() {
        assert_eq!(
            CourseStatus::from_site_label("  開課中 \n"),
            Some(CourseStatus::Open)
        );
    }

    #[test]
    fn test_unknown_status_label() {
        assert_eq!(CourseStatus::from_site_label("報名中"), None);
        assert_eq!(CourseStatus::from_site_label(""), None);
    }

    #[test]
    fn test_region_counts_total() {
        let counts = RegionCounts {
            taiwan: 120,
            mainland_china: 45,
            other: 3,
        };
        assert_eq!(counts.total(), 168);
    }

    #[test]
    fn test_total_enrolled_sums_regions() {
        let stats = Statistics {
            enrolled: RegionCounts {
                taiwan: 10,
                mainland_china: 20,
                other: 30,
            },
            ..Statistics::default()
        };
        assert_eq!(stats.total_enrolled(), 60);
    }

    #[test]
    fn test_criteria_requires_a_status() {
        let err = FilterCriteria::new(None, BTreeSet::new(), None).unwrap_err();
        assert_eq!(err, CriteriaError::NoStatusSelected);
    }

    #[test]
    fn test_criteria_rejects_inverted_range() {
        let statuses = BTreeSet::from([CourseStatus::Open]);
        let err = FilterCriteria::new(
            None,
            statuses,
            Some((date("2025-06-01"), date("2025-01-01"))),
        )
        .unwrap_err();
        assert!(matches!(err, CriteriaError::InvalidDateRange(_, _)));
    }

    #[test]
    fn test_matches_status_and_inclusive_range() {
        let criteria = FilterCriteria::new(
            None,
            BTreeSet::from([CourseStatus::Open]),
            Some((date("2025-01-01"), date("2025-03-01"))),
        )
        .unwrap();

        // Both range endpoints are inclusive.
        assert!(criteria.matches(CourseStatus::Open, Some(date("2025-01-01"))));
        assert!(criteria.matches(CourseStatus::Open, Some(date("2025-03-01"))));
        assert!(criteria.matches(CourseStatus::Open, Some(date("2025-02-10"))));
        assert!(!criteria.matches(CourseStatus::Open, Some(date("2024-12-31"))));
        assert!(!criteria.matches(CourseStatus::Open, Some(date("2025-03-02"))));
        assert!(!criteria.matches(CourseStatus::Closed, Some(date("2025-02-10"))));
    }

    #[test]
    fn test_unparsable_date_passes_permissively() {
        let criteria = FilterCriteria::new(
            None,
            BTreeSet::from([CourseStatus::Open]),
            Some((date("2025-01-01"), date("2025-03-01"))),
        )
        .unwrap();
        assert!(criteria.matches(CourseStatus::Open, None));
    }

    #[test]
    fn test_no_range_matches_any_start() {
        let criteria =
            FilterCriteria::new(None, BTreeSet::from([CourseStatus::Closed]), None).unwrap();
        assert!(criteria.matches(CourseStatus::Closed, Some(date("1999-01-01"))));
        assert!(criteria.matches(CourseStatus::Closed, None));
    }
}
