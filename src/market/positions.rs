use super::price_store::normalize_timestamp;
use crate::types::PositionRecord;
use crate::Result;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

pub const CASH: &str = "CASH";

/// An agent's append-only position log (`position.jsonl`).
#[derive(Debug, Clone)]
pub struct PositionLog {
    path: PathBuf,
}

impl PositionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All parsable records; a missing log is empty.
    pub fn records(&self) -> Result<Vec<PositionRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(std::fs::File::open(&self.path)?);
        let mut records = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PositionRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    "Skipping line {} of {}: {}",
                    line_num,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(records)
    }

    /// Holdings carried into `today`: the positions of the latest record
    /// (by date, then id) dated strictly before `today`.
    pub fn init_position(&self, today: &str) -> Result<BTreeMap<String, f64>> {
        let today = normalize_timestamp(today);
        let latest = self
            .records()?
            .into_iter()
            .filter(|r| normalize_timestamp(&r.date) < today)
            .max_by(|a, b| {
                normalize_timestamp(&a.date)
                    .cmp(&normalize_timestamp(&b.date))
                    .then(a.id.cmp(&b.id))
            });

        match latest {
            Some(record) => Ok(record.positions),
            None => {
                tracing::warn!(
                    "No position before {} in {}",
                    today,
                    self.path.display()
                );
                Ok(BTreeMap::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log_with(lines: &[&str]) -> (TempDir, PositionLog) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("position.jsonl");
        std::fs::write(&path, lines.join("\n")).unwrap();
        (dir, PositionLog::new(path))
    }

    #[test]
    fn picks_latest_record_before_today() {
        let (_dir, log) = log_with(&[
            r#"{"date":"2025-10-01","id":0,"positions":{"AAPL":0,"CASH":10000}}"#,
            r#"{"date":"2025-10-02","id":1,"this_action":{"action":"buy","symbol":"AAPL","amount":10},"positions":{"AAPL":10,"CASH":7500}}"#,
            r#"{"date":"2025-10-02","id":2,"positions":{"AAPL":15,"CASH":6250}}"#,
            "broken line",
            r#"{"date":"2025-10-03","id":3,"positions":{"AAPL":5,"CASH":8750}}"#,
        ]);

        let position = log.init_position("2025-10-03").unwrap();
        assert_eq!(position["AAPL"], 15.0);
        assert_eq!(position[CASH], 6250.0);
    }

    #[test]
    fn nothing_before_today_is_empty() {
        let (_dir, log) = log_with(&[r#"{"date":"2025-10-03","id":0,"positions":{"CASH":1}}"#]);
        assert!(log.init_position("2025-10-03").unwrap().is_empty());
    }

    #[test]
    fn missing_log_is_empty() {
        let log = PositionLog::new("/nonexistent/position.jsonl");
        assert!(log.records().unwrap().is_empty());
    }
}
