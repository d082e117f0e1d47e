//! Summary-page statistics parsing.
//!
//! The course summary renders its counters as tables with rowspan'd metric
//! labels: the first row of a group carries `[metric, region, count]`, the
//! following rows only `[region, count]`. Scalar metrics (discussion count,
//! mobile video views) render as plain `[label, count]` rows.

use scraper::{Html, Selector};
use tracing::debug;

use crate::types::{RegionCounts, Statistics};

/// Region labels used by the report. Anything else is ignored.
const REGION_TAIWAN: &str = "台灣";
const REGION_MAINLAND: &str = "中國大陸";
const REGION_OTHER: &str = "其他";

/// Region-partitioned metric labels, matched by substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Metric {
    Enrolled,
    Passed,
    VideoViews,
    AssignmentAttempts,
    MaterialViews,
    MaterialViewers,
}

impl Metric {
    fn from_label(label: &str) -> Option<Self> {
        // 瀏覽人數 must be checked before 瀏覽次數: both share the
        // 講義參考資料 prefix.
        if label.contains("選修人數") {
            Some(Self::Enrolled)
        } else if label.contains("通過人數") {
            Some(Self::Passed)
        } else if label.contains("作業測驗") {
            Some(Self::AssignmentAttempts)
        } else if label.contains("講義參考資料瀏覽人數") {
            Some(Self::MaterialViewers)
        } else if label.contains("講義參考資料瀏覽次數") {
            Some(Self::MaterialViews)
        } else if label.contains("影片瀏覽次數") {
            Some(Self::VideoViews)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Taiwan,
    MainlandChina,
    Other,
}

fn region_of(label: &str) -> Option<Region> {
    let label = label.trim();
    if label.contains(REGION_MAINLAND) {
        Some(Region::MainlandChina)
    } else if label.contains(REGION_TAIWAN) {
        Some(Region::Taiwan)
    } else if label.contains(REGION_OTHER) {
        Some(Region::Other)
    } else {
        None
    }
}

/// Strip every non-digit character and parse what remains. Defaults to 0 so
/// one odd cell never aborts a scrape. Idempotent over its own output.
pub fn parse_count(text: &str) -> u64 {
    parse_count_opt(text).unwrap_or(0)
}

/// Like [`parse_count`] but distinguishes "no digits at all" from zero,
/// which the mobile video views metric renders as N/A.
pub fn parse_count_opt(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    // Saturate rather than fail on absurdly long digit runs.
    Some(digits.parse().unwrap_or(u64::MAX))
}

/// Parse every statistics table on a course summary page.
///
/// A single pass tags each row with the metric context established by the
/// last 3-cell label row, carrying it across the rowspan continuation rows.
/// Unknown labels and regions are skipped; counts degrade to 0 rather than
/// erroring, so parsing itself never fails.
pub fn parse_statistics(html: &str) -> Statistics {
    let document = Html::parse_document(html);
    let table_sel = Selector::parse("table").unwrap();
    let row_sel = Selector::parse("tr").unwrap();
    let cell_sel = Selector::parse("td").unwrap();

    let mut stats = Statistics::default();

    for table in document.select(&table_sel) {
        // Each table starts a fresh rowspan group.
        let mut current: Option<Metric> = None;

        for row in table.select(&row_sel) {
            let cells: Vec<String> = row
                .select(&cell_sel)
                .map(|cell| cell.text().collect::<String>().trim().to_string())
                .collect();

            match cells.len() {
                3 => {
                    // Explicit metric label, present on the first row of a group.
                    current = Metric::from_label(&cells[0]);
                    if current.is_none() {
                        debug!(label = %cells[0], "unrecognized metric label");
                    }
                    record_region(&mut stats, current, &cells[1], &cells[2]);
                }
                2 => {
                    if region_of(&cells[0]).is_some() {
                        // Continuation row under the last-seen metric label.
                        record_region(&mut stats, current, &cells[0], &cells[1]);
                    } else if cells[0].contains("討論") {
                        stats.discussions = parse_count(&cells[1]);
                    } else if cells[0].contains("行動") {
                        stats.mobile_video_views = parse_count_opt(&cells[1]);
                    } else {
                        debug!(label = %cells[0], "unrecognized scalar row");
                    }
                }
                _ => {}
            }
        }
    }

    stats
}

fn record_region(stats: &mut Statistics, metric: Option<Metric>, region: &str, count: &str) {
    let Some(metric) = metric else { return };
    let Some(region) = region_of(region) else {
        debug!(region, "unrecognized region label");
        return;
    };

    let counts: &mut RegionCounts = match metric {
        Metric::Enrolled => &mut stats.enrolled,
        Metric::Passed => &mut stats.passed,
        Metric::VideoViews => &mut stats.video_views,
        Metric::AssignmentAttempts => &mut stats.assignment_attempts,
        Metric::MaterialViews => &mut stats.material_views,
        Metric::MaterialViewers => &mut stats.material_viewers,
    };
    let slot = match region {
        Region::Taiwan => &mut counts.taiwan,
        Region::MainlandChina => &mut counts.mainland_china,
        Region::Other => &mut counts.other,
    };
    *slot = parse_count(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A rowspan group for one region-partitioned metric, as the summary
    /// page renders it.
    fn group(label: &str, taiwan: &str, mainland: &str, other: &str) -> String {
        format!(
            "<tr><td rowspan=\"3\">{label}</td><td>台灣</td><td>{taiwan}</td></tr>\
             <tr><td>中國大陸</td><td>{mainland}</td></tr>\
             <tr><td>其他</td><td>{other}</td></tr>"
        )
    }

    fn page(tables: &[String]) -> String {
        let tables: String = tables
            .iter()
            .map(|body| format!("<table><tbody>{body}</tbody></table>"))
            .collect();
        format!("<html><body><div class=\"panel-body\">{tables}</div></body></html>")
    }

    #[test]
    fn test_parse_count_strips_non_digits() {
        assert_eq!(parse_count("1,234"), 1234);
        assert_eq!(parse_count(" 56 人 "), 56);
        assert_eq!(parse_count("0"), 0);
        assert_eq!(parse_count("N/A"), 0);
        assert_eq!(parse_count(""), 0);
    }

    #[test]
    fn test_parse_count_is_idempotent() {
        for input in ["1,234", "56 人", "N/A", "0", "987654"] {
            let once = parse_count(input);
            assert_eq!(parse_count(&once.to_string()), once);
        }
    }

    #[test]
    fn test_parse_count_opt_distinguishes_missing() {
        assert_eq!(parse_count_opt("N/A"), None);
        assert_eq!(parse_count_opt("-"), None);
        assert_eq!(parse_count_opt("0"), Some(0));
        assert_eq!(parse_count_opt("12 次"), Some(12));
    }

    #[test]
    fn test_rowspan_group_parsing() {
        let html = page(&[group("選修人數", "1,200", "340", "56")]);
        let stats = parse_statistics(&html);
        assert_eq!(
            stats.enrolled,
            RegionCounts {
                taiwan: 1200,
                mainland_china: 340,
                other: 56
            }
        );
        assert_eq!(stats.total_enrolled(), 1596);
    }

    #[test]
    fn test_all_region_metrics_and_scalars() {
        let tables = [
            format!(
                "{}{}",
                group("選修人數", "10", "20", "30"),
                group("通過人數", "1", "2", "3")
            ),
            format!(
                "{}{}{}",
                group("影片瀏覽次數", "100", "200", "300"),
                group("作業測驗作答次數", "11", "22", "33"),
                group("講義參考資料瀏覽次數", "7", "8", "9")
            ),
            "<tr><td>討論次數</td><td>42</td></tr>\
             <tr><td>行動載具影片瀏覽次數</td><td>77</td></tr>"
                .to_string(),
        ];
        let stats = parse_statistics(&page(&tables));

        assert_eq!(stats.enrolled.total(), 60);
        assert_eq!(stats.passed.total(), 6);
        assert_eq!(stats.video_views.taiwan, 100);
        assert_eq!(stats.assignment_attempts.other, 33);
        assert_eq!(stats.material_views.mainland_china, 8);
        assert_eq!(stats.discussions, 42);
        assert_eq!(stats.mobile_video_views, Some(77));
    }

    #[test]
    fn test_material_viewers_vs_views() {
        // Shared 講義參考資料 prefix must not collapse the two metrics.
        let tables = [format!(
            "{}{}",
            group("講義參考資料瀏覽次數", "100", "0", "0"),
            group("講義參考資料瀏覽人數", "40", "0", "0")
        )];
        let stats = parse_statistics(&page(&tables));
        assert_eq!(stats.material_views.taiwan, 100);
        assert_eq!(stats.material_viewers.taiwan, 40);
    }

    #[test]
    fn test_mobile_views_na_sentinel() {
        let tables = ["<tr><td>行動載具影片瀏覽次數</td><td>N/A</td></tr>".to_string()];
        let stats = parse_statistics(&page(&tables));
        assert_eq!(stats.mobile_video_views, None);
    }

    #[test]
    fn test_unknown_region_is_ignored() {
        let tables = [format!(
            "{}<tr><td>香港</td><td>999</td></tr>",
            group("選修人數", "10", "20", "30")
        )];
        let stats = parse_statistics(&page(&tables));
        // The unknown region row neither records nor disturbs the group.
        assert_eq!(stats.enrolled.total(), 60);
    }

    #[test]
    fn test_unparsable_count_degrades_to_zero() {
        let html = page(&[group("通過人數", "—", "12", "")]);
        let stats = parse_statistics(&html);
        assert_eq!(
            stats.passed,
            RegionCounts {
                taiwan: 0,
                mainland_china: 12,
                other: 0
            }
        );
    }

    #[test]
    fn test_context_resets_between_tables() {
        // A continuation-shaped row in a new table has no label context and
        // must not be attributed to the previous table's metric.
        let tables = [
            group("選修人數", "10", "20", "30"),
            "<tr><td>台灣</td><td>999</td></tr>".to_string(),
        ];
        let stats = parse_statistics(&page(&tables));
        assert_eq!(stats.enrolled.taiwan, 10);
    }

    #[test]
    fn test_empty_page() {
        let stats = parse_statistics("<html><body></body></html>");
        assert_eq!(stats, Statistics::default());
    }
}
