//! rollcall-ledger: attendance records kept in an xlsx sheet.
//!
//! The sheet has exactly three text columns, `Name`, `Date` (`YYYY-MM-DD`)
//! and `Time` (`HH:MM:SS`), with at most one row per (name, date). Every new
//! record reads the whole sheet, appends one row and rewrites the file.
//! Not safe for concurrent writers.

use calamine::{open_workbook, DataType, Reader, Xlsx};
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_xlsxwriter::Workbook;
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column titles, in order.
pub const HEADER: [&str; 3] = ["Name", "Date", "Time"];
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("failed to read ledger {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: calamine::XlsxError,
    },
    #[error("ledger {0} has no worksheet")]
    NoWorksheet(PathBuf),
    #[error("ledger {path} has header {found:?}, expected Name, Date, Time")]
    BadHeader { path: PathBuf, found: Vec<String> },
    #[error("ledger {path} row {row}: {reason}")]
    BadRow { path: PathBuf, row: usize, reason: String },
    #[error("failed to write ledger {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },
    #[error("attendance name is empty")]
    EmptyName,
    #[error("failed to replace ledger {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One attendance row. `time` is the first sighting that day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    pub name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

/// File-backed attendance ledger.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    /// Open the ledger at `path`, creating an empty sheet with the header row
    /// if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let ledger = Self { path: path.into() };
        if !ledger.path.exists() {
            ledger.write_all(&[])?;
            tracing::info!(path = %ledger.path.display(), "created attendance ledger");
        }
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mark `name` present now (local time). Returns `true` if this is the
    /// first record for `name` today.
    pub fn record(&self, name: &str) -> Result<bool, LedgerError> {
        self.record_at(name, Local::now().naive_local())
    }

    /// Mark `name` present at `at`. Returns `false`, without writing, if a row
    /// for `name` on that date already exists.
    ///
    /// Surrounding whitespace is not part of the name; cells are read back
    /// trimmed, so names are stored and compared trimmed too.
    pub fn record_at(&self, name: &str, at: NaiveDateTime) -> Result<bool, LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::EmptyName);
        }
        let mut records = self.records()?;
        let date = at.date();

        if records.iter().any(|r| r.name == name && r.date == date) {
            tracing::debug!(name, %date, "attendance already recorded");
            return Ok(false);
        }

        records.push(AttendanceRecord {
            name: name.to_string(),
            date,
            // Whole seconds only; the sheet stores HH:MM:SS.
            time: at.time().with_nanosecond(0).unwrap_or_else(|| at.time()),
        });
        self.write_all(&records)?;
        tracing::debug!(name, %date, rows = records.len(), "attendance recorded");
        Ok(true)
    }

    /// All rows, in insertion order.
    pub fn records(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let mut workbook: Xlsx<_> = open_workbook(&self.path).map_err(|source| LedgerError::Read {
            path: self.path.clone(),
            source,
        })?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| LedgerError::NoWorksheet(self.path.clone()))?
            .map_err(|source| LedgerError::Read { path: self.path.clone(), source })?;

        let mut rows = range.rows();
        let Some(header) = rows.next() else {
            return Ok(Vec::new());
        };
        let header: Vec<String> = header.iter().map(cell_text).collect();
        if header.len() < HEADER.len() || header.iter().zip(HEADER).any(|(found, want)| found != want) {
            return Err(LedgerError::BadHeader { path: self.path.clone(), found: header });
        }

        let mut records = Vec::new();
        for (i, row) in rows.enumerate() {
            let cells: Vec<String> = row.iter().take(HEADER.len()).map(cell_text).collect();
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            // Row 1 is the header.
            let record = parse_row(&cells).map_err(|reason| LedgerError::BadRow {
                path: self.path.clone(),
                row: i + 2,
                reason,
            })?;
            records.push(record);
        }

        Ok(records)
    }

    /// Rows for one date, in insertion order.
    pub fn records_on(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, LedgerError> {
        Ok(self.records()?.into_iter().filter(|r| r.date == date).collect())
    }

    /// Rewrite the whole sheet, going through a sibling temp file so a
    /// failed save leaves the previous ledger in place.
    fn write_all(&self, records: &[AttendanceRecord]) -> Result<(), LedgerError> {
        let write_err = |source: rust_xlsxwriter::XlsxError| LedgerError::Write { path: self.path.clone(), source };

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, title) in HEADER.iter().enumerate() {
            sheet.write_string(0, col as u16, *title).map_err(write_err)?;
        }
        for (i, record) in records.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_string(row, 0, record.name.as_str()).map_err(write_err)?;
            sheet
                .write_string(row, 1, record.date.format(DATE_FORMAT).to_string())
                .map_err(write_err)?;
            sheet
                .write_string(row, 2, record.time.format(TIME_FORMAT).to_string())
                .map_err(write_err)?;
        }

        let mut tmp = OsString::from(self.path.as_os_str());
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        workbook.save(&tmp).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(|source| LedgerError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Render a cell as the text the sheet is supposed to hold.
///
/// Spreadsheet editors like to turn `2024-05-01` into a date serial; those
/// are converted back so hand-edited ledgers still parse.
fn cell_text(cell: &DataType) -> String {
    match cell {
        DataType::String(s) | DataType::DateTimeIso(s) | DataType::DurationIso(s) => s.trim().to_string(),
        DataType::Int(v) => v.to_string(),
        DataType::Float(v) | DataType::Duration(v) => v.to_string(),
        DataType::Bool(b) => b.to_string(),
        DataType::DateTime(serial) => excel_serial_text(*serial),
        DataType::Error(e) => format!("#{e:?}"),
        DataType::Empty => String::new(),
    }
}

/// Excel serial day number (days since 1899-12-30, fraction = time of day).
fn excel_serial_text(serial: f64) -> String {
    let Some(epoch) = NaiveDate::from_ymd_opt(1899, 12, 30) else {
        return serial.to_string();
    };
    let days = serial.trunc() as i64;
    let seconds = ((serial - serial.trunc()) * 86_400.0).round() as i64;

    match (days, seconds) {
        (0, s) => (NaiveTime::default() + Duration::seconds(s)).format(TIME_FORMAT).to_string(),
        (d, 0) => (epoch + Duration::days(d)).format(DATE_FORMAT).to_string(),
        (d, s) => (epoch.and_time(NaiveTime::default()) + Duration::days(d) + Duration::seconds(s))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
    }
}

fn parse_row(cells: &[String]) -> Result<AttendanceRecord, String> {
    let [name, date, time] = cells else {
        return Err(format!("expected {} cells, found {}", HEADER.len(), cells.len()));
    };
    if name.is_empty() {
        return Err("empty name".into());
    }
    let date = NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|e| format!("bad date {date:?}: {e}"))?;
    let time = NaiveTime::parse_from_str(time, TIME_FORMAT)
        .map_err(|e| format!("bad time {time:?}: {e}"))?;
    Ok(AttendanceRecord { name: name.clone(), date, time })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn fresh() -> (tempfile::TempDir, Ledger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("attendance.xlsx")).unwrap();
        (dir, ledger)
    }

    #[test]
    fn test_open_creates_empty_sheet_with_header() {
        let (_dir, ledger) = fresh();
        assert!(ledger.path().exists());
        assert!(ledger.records().unwrap().is_empty());
    }

    #[test]
    fn test_open_keeps_existing_rows() {
        let (_dir, ledger) = fresh();
        ledger.record_at("Alice", at("2024-05-01", "08:00:00")).unwrap();

        let reopened = Ledger::open(ledger.path()).unwrap();
        assert_eq!(reopened.records().unwrap().len(), 1);
    }

    #[test]
    fn test_same_day_is_recorded_once() {
        let (_dir, ledger) = fresh();
        assert!(ledger.record_at("Alice", at("2024-05-01", "08:00:00")).unwrap());
        let modified = std::fs::metadata(ledger.path()).unwrap().modified().unwrap();

        assert!(!ledger.record_at("Alice", at("2024-05-01", "17:30:00")).unwrap());

        let records = ledger.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].time, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(std::fs::metadata(ledger.path()).unwrap().modified().unwrap(), modified);
    }

    #[test]
    fn test_padded_name_is_recorded_once() {
        let (_dir, ledger) = fresh();
        assert!(ledger.record_at("Alice ", at("2024-05-01", "08:00:00")).unwrap());
        assert!(!ledger.record_at("Alice ", at("2024-05-01", "08:00:00")).unwrap());
        assert!(!ledger.record_at("Alice", at("2024-05-01", "09:00:00")).unwrap());

        let names: Vec<String> = ledger.records().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Alice"]);
    }

    #[test]
    fn test_blank_name_is_rejected() {
        let (_dir, ledger) = fresh();
        assert!(matches!(
            ledger.record_at("  ", at("2024-05-01", "08:00:00")),
            Err(LedgerError::EmptyName)
        ));
        assert!(ledger.records().unwrap().is_empty());
    }

    #[test]
    fn test_different_days_produce_two_rows() {
        let (_dir, ledger) = fresh();
        assert!(ledger.record_at("Alice", at("2024-05-01", "08:00:00")).unwrap());
        assert!(ledger.record_at("Alice", at("2024-05-02", "08:05:00")).unwrap());

        let dates: Vec<String> = ledger
            .records()
            .unwrap()
            .iter()
            .map(|r| r.date.format(DATE_FORMAT).to_string())
            .collect();
        assert_eq!(dates, vec!["2024-05-01", "2024-05-02"]);
    }

    #[test]
    fn test_insertion_order_and_filter_by_date() {
        let (_dir, ledger) = fresh();
        ledger.record_at("Bob", at("2024-05-01", "09:00:00")).unwrap();
        ledger.record_at("Alice", at("2024-05-01", "08:00:00")).unwrap();
        ledger.record_at("Carol", at("2024-05-02", "07:00:00")).unwrap();

        let names: Vec<String> = ledger.records().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Bob", "Alice", "Carol"]);

        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let names: Vec<String> = ledger.records_on(day).unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Bob", "Alice"]);
    }

    #[test]
    fn test_record_uses_today() {
        let (_dir, ledger) = fresh();
        assert!(ledger.record("Alice").unwrap());
        assert!(!ledger.record("Alice").unwrap());

        let records = ledger.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date, Local::now().date_naive());
    }

    #[test]
    fn test_subsecond_time_is_truncated() {
        let (_dir, ledger) = fresh();
        let when = at("2024-05-01", "08:00:00") + Duration::milliseconds(750);
        ledger.record_at("Alice", when).unwrap();
        assert_eq!(ledger.records().unwrap()[0].time, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
    }

    #[test]
    fn test_foreign_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.xlsx");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Employee").unwrap();
        sheet.write_string(0, 1, "Day").unwrap();
        sheet.write_string(0, 2, "Clock").unwrap();
        workbook.save(&path).unwrap();

        let ledger = Ledger::open(&path).unwrap();
        assert!(matches!(ledger.records(), Err(LedgerError::BadHeader { .. })));
    }

    #[test]
    fn test_date_serials_from_editors_are_understood() {
        assert_eq!(excel_serial_text(45413.0), "2024-05-01");
        assert_eq!(excel_serial_text(0.5), "12:00:00");
    }

    #[test]
    fn test_parse_row_rejects_bad_date() {
        let cells = vec!["Alice".to_string(), "01/05/2024".to_string(), "08:00:00".to_string()];
        assert!(parse_row(&cells).unwrap_err().contains("bad date"));
    }
}
