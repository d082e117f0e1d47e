//! Styled xlsx export of collected course statistics.

use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, XlsxError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::types::{Course, CourseStatus, Statistics};

/// Fixed 20-column report schema, matching the site's own terminology.
const HEADERS: [&str; 20] = [
    "課程狀態",
    "課程名稱",
    "開始時間",
    "結束時間",
    "選修人數(台灣)",
    "選修人數(中國大陸)",
    "選修人數(其他)",
    "通過人數(台灣)",
    "通過人數(中國大陸)",
    "通過人數(其他)",
    "影片瀏覽次數(台灣)",
    "影片瀏覽次數(中國大陸)",
    "影片瀏覽次數(其他)",
    "作業測驗作答次數(台灣)",
    "作業測驗作答次數(中國大陸)",
    "作業測驗作答次數(其他)",
    "講義參考資料瀏覽次數(台灣)",
    "講義參考資料瀏覽次數(中國大陸)",
    "講義參考資料瀏覽次數(其他)",
    "討論次數",
];

const SHEET_NAME: &str = "課程資料";
const NAME_COL: u16 = 1;
const NAME_COL_WIDTH: f64 = 40.0;
const DEFAULT_COL_WIDTH: f64 = 15.0;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no course rows to export")]
    NoRows,
    #[error("failed to write workbook: {0}")]
    Workbook(#[from] XlsxError),
}

/// Status cell fill colors: green-ish for open, yellow-ish for upcoming,
/// red-ish for closed.
fn status_fill(status: CourseStatus) -> Color {
    match status {
        CourseStatus::Open => Color::RGB(0xC6EFCE),
        CourseStatus::Upcoming => Color::RGB(0xFFEB9C),
        CourseStatus::Closed => Color::RGB(0xFFC7CE),
    }
}

fn with_xlsx_extension(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("xlsx") => path.to_path_buf(),
        _ => {
            let mut owned = path.as_os_str().to_os_string();
            owned.push(".xlsx");
            PathBuf::from(owned)
        }
    }
}

/// The 16 numeric cells of one row, in schema order.
fn numeric_cells(stats: &Statistics) -> [u64; 16] {
    [
        stats.enrolled.taiwan,
        stats.enrolled.mainland_china,
        stats.enrolled.other,
        stats.passed.taiwan,
        stats.passed.mainland_china,
        stats.passed.other,
        stats.video_views.taiwan,
        stats.video_views.mainland_china,
        stats.video_views.other,
        stats.assignment_attempts.taiwan,
        stats.assignment_attempts.mainland_china,
        stats.assignment_attempts.other,
        stats.material_views.taiwan,
        stats.material_views.mainland_china,
        stats.material_views.other,
        stats.discussions,
    ]
}

/// Write the collected courses to `path` (`.xlsx` appended when missing)
/// and return the path actually written.
///
/// Zero rows is an error and creates no file. Courses without statistics
/// export as zeros, the same default the scraped table shows.
pub fn write_report(path: &Path, courses: &[Course]) -> Result<PathBuf, ExportError> {
    if courses.is_empty() {
        return Err(ExportError::NoRows);
    }
    let path = with_xlsx_extension(path);

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xCCCCCC))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_text_wrap();
    let name_format = Format::new()
        .set_align(FormatAlign::Left)
        .set_align(FormatAlign::VerticalCenter);
    let right_format = Format::new()
        .set_align(FormatAlign::Right)
        .set_align(FormatAlign::VerticalCenter);

    for (col, header) in HEADERS.iter().enumerate() {
        let col = col as u16;
        worksheet.write_string_with_format(0, col, *header, &header_format)?;
        let width = if col == NAME_COL {
            NAME_COL_WIDTH
        } else {
            DEFAULT_COL_WIDTH
        };
        worksheet.set_column_width(col, width)?;
    }

    let default_stats = Statistics::default();
    for (index, course) in courses.iter().enumerate() {
        let row = (index + 1) as u32;
        let status_format = Format::new()
            .set_align(FormatAlign::Right)
            .set_align(FormatAlign::VerticalCenter)
            .set_background_color(status_fill(course.status));

        worksheet.write_string_with_format(row, 0, course.status.site_label(), &status_format)?;
        worksheet.write_string_with_format(row, 1, &course.name, &name_format)?;
        worksheet.write_string_with_format(row, 2, &course.start_text, &right_format)?;
        worksheet.write_string_with_format(row, 3, &course.end_text, &right_format)?;

        let stats = course.stats.as_ref().unwrap_or(&default_stats);
        for (offset, value) in numeric_cells(stats).into_iter().enumerate() {
            let col = (4 + offset) as u16;
            worksheet.write_number_with_format(row, col, value as f64, &right_format)?;
        }
    }

    workbook.save(&path)?;
    info!("exported {} courses to {}", courses.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RegionCounts;
    use calamine::{open_workbook, Data, Reader, Xlsx};

    fn course(name: &str, status: CourseStatus, stats: Option<Statistics>) -> Course {
        Course {
            name: name.to_string(),
            status,
            start_date: None,
            end_date: None,
            start_text: "2025-03-01".to_string(),
            end_text: "2025-07-01".to_string(),
            row_index: 0,
            stats,
        }
    }

    fn sample_stats() -> Statistics {
        Statistics {
            enrolled: RegionCounts {
                taiwan: 120,
                mainland_china: 30,
                other: 5,
            },
            passed: RegionCounts {
                taiwan: 60,
                mainland_china: 10,
                other: 1,
            },
            discussions: 42,
            ..Statistics::default()
        }
    }

    #[test]
    fn test_zero_rows_fails_without_creating_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.xlsx");
        let err = write_report(&path, &[]).unwrap_err();
        assert!(matches!(err, ExportError::NoRows));
        assert!(!path.exists());
    }

    #[test]
    fn test_written_sheet_matches_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xlsx");
        let courses = [
            course("資料結構", CourseStatus::Open, Some(sample_stats())),
            course("普通物理", CourseStatus::Closed, None),
        ];
        let written = write_report(&path, &courses).unwrap();
        assert_eq!(written, path);

        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        let range = workbook.worksheet_range(SHEET_NAME).unwrap();
        let rows: Vec<Vec<Data>> = range.rows().map(|r| r.to_vec()).collect();

        // Header row plus one row per course.
        assert_eq!(rows.len(), 3);
        let header: Vec<String> = rows[0].iter().map(|c| c.to_string()).collect();
        assert_eq!(header, HEADERS);

        assert_eq!(rows[1][0], Data::String("開課中".to_string()));
        assert_eq!(rows[1][1], Data::String("資料結構".to_string()));
        assert_eq!(rows[1][4], Data::Float(120.0));
        assert_eq!(rows[1][19], Data::Float(42.0));

        // Missing statistics export as zeros.
        assert_eq!(rows[2][0], Data::String("已結束".to_string()));
        assert_eq!(rows[2][4], Data::Float(0.0));
    }

    #[test]
    fn test_xlsx_extension_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report");
        let courses = [course("A", CourseStatus::Open, Some(sample_stats()))];
        let written = write_report(&path, &courses).unwrap();
        assert_eq!(written.extension().unwrap(), "xlsx");
        assert!(written.exists());
    }

    #[test]
    fn test_status_fill_mapping() {
        assert_eq!(status_fill(CourseStatus::Open), Color::RGB(0xC6EFCE));
        assert_eq!(status_fill(CourseStatus::Upcoming), Color::RGB(0xFFEB9C));
        assert_eq!(status_fill(CourseStatus::Closed), Color::RGB(0xFFC7CE));
    }

    #[test]
    fn test_schema_width_is_stable() {
        assert_eq!(HEADERS.len(), 20);
        // 4 text columns + 5 metrics x 3 regions + discussion count.
        assert_eq!(numeric_cells(&Statistics::default()).len(), 16);
    }
}
