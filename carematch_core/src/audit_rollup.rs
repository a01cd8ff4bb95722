//! Archiving the audit log into CSV.
//!
//! The rollup holds the audit log's exclusive lock from the first read until
//! the log has been moved to `audit.wal.processed`. Writers open the log only
//! after taking that lock, so an event lands either in this rollup's CSV rows
//! or in a fresh log picked up by the next rollup.

use crate::audit::AuditEvent;
use crate::lock::FileLock;
use crate::wal::parse_log;
use crate::{Error, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// One audit event flattened for spreadsheets
#[derive(Debug, serde::Serialize)]
struct AuditRow<'a> {
    id: String,
    timestamp: String,
    patient_id: &'a str,
    kind: &'static str,
    /// Program ids separated by `;`, in decision order
    program_ids: String,
}

impl<'a> From<&'a AuditEvent> for AuditRow<'a> {
    fn from(event: &'a AuditEvent) -> Self {
        AuditRow {
            id: event.id.to_string(),
            timestamp: event.timestamp.to_rfc3339(),
            patient_id: &event.patient_id,
            kind: event.kind.as_str(),
            program_ids: event.outcome.program_ids().join(";"),
        }
    }
}

/// Move every event in `log_path` into `csv_path`
///
/// Rows are appended (the header is written only for a new CSV) and synced
/// before the log is renamed to `.wal.processed`. Returns how many events
/// were archived; an empty log is left in place.
pub fn audit_to_csv_and_archive(log_path: &Path, csv_path: &Path) -> Result<usize> {
    let _lock = FileLock::exclusive(log_path)?;

    let events = parse_log::<AuditEvent>(log_path)?;
    if events.is_empty() {
        tracing::info!("No audit events to roll up");
        return Ok(0);
    }

    append_rows(csv_path, &events)?;
    tracing::info!("Wrote {} audit events to {:?}", events.len(), csv_path);

    let archived = processed_path(log_path);
    std::fs::rename(log_path, &archived)?;
    tracing::info!("Archived audit log to {:?}", archived);

    Ok(events.len())
}

fn processed_path(log_path: &Path) -> PathBuf {
    log_path.with_extension("wal.processed")
}

fn append_rows(csv_path: &Path, events: &[AuditEvent]) -> Result<()> {
    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;
    let is_new = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(is_new)
        .from_writer(file);
    for event in events {
        writer.serialize(AuditRow::from(event))?;
    }

    let file = writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(())
}

/// Delete archived `.processed` logs in `dir`, returning how many went
pub fn cleanup_processed_logs(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "processed") {
            std::fs::remove_file(&path)?;
            tracing::debug!("Removed processed audit log {:?}", path);
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Cleaned up {} processed audit logs", count);
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditSink, JsonlAuditSink};
    use chrono::Utc;
    use std::fs::File;

    #[test]
    fn test_rollup_creates_csv_and_archives_log() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("audit.wal");
        let csv_path = temp_dir.path().join("audit.csv");

        let mut sink = JsonlAuditSink::new(&log_path);
        sink.record(&AuditEvent::recommendation(
            "PAT-1",
            vec!["PROG-1".into(), "PROG-2".into()],
            Utc::now(),
        ))
        .unwrap();
        sink.record(&AuditEvent::enrollment("PAT-1", "PROG-1", Utc::now()))
            .unwrap();

        let count = audit_to_csv_and_archive(&log_path, &csv_path).unwrap();
        assert_eq!(count, 2);

        assert!(!log_path.exists());
        assert!(log_path.with_extension("wal.processed").exists());

        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["id", "timestamp", "patient_id", "kind", "program_ids"]
        );
        let rows: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(&rows[0][3], "recommendation");
        assert_eq!(&rows[0][4], "PROG-1;PROG-2");
        assert_eq!(&rows[1][3], "enrollment");
    }

    #[test]
    fn test_rollup_appends_without_second_header() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("audit.wal");
        let csv_path = temp_dir.path().join("audit.csv");

        for patient in ["PAT-1", "PAT-2"] {
            let mut sink = JsonlAuditSink::new(&log_path);
            sink.record(&AuditEvent::enrollment(patient, "PROG-1", Utc::now()))
                .unwrap();
            assert_eq!(audit_to_csv_and_archive(&log_path, &csv_path).unwrap(), 1);
        }

        let reader = csv::Reader::from_path(&csv_path).unwrap();
        assert_eq!(reader.into_records().count(), 2);
    }

    #[test]
    fn test_empty_log() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("empty.wal");
        let csv_path = temp_dir.path().join("audit.csv");

        File::create(&log_path).unwrap();

        assert_eq!(audit_to_csv_and_archive(&log_path, &csv_path).unwrap(), 0);
        assert!(!csv_path.exists());
    }

    #[test]
    fn test_cleanup_processed_logs() {
        let temp_dir = tempfile::tempdir().unwrap();

        File::create(temp_dir.path().join("a1.wal.processed")).unwrap();
        File::create(temp_dir.path().join("a2.wal.processed")).unwrap();
        File::create(temp_dir.path().join("audit.wal")).unwrap();

        assert_eq!(cleanup_processed_logs(temp_dir.path()).unwrap(), 2);
        assert!(temp_dir.path().join("audit.wal").exists());
    }

    #[test]
    fn test_events_after_rollup_go_to_fresh_log() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("audit.wal");
        let csv_path = temp_dir.path().join("audit.csv");

        let mut sink = JsonlAuditSink::new(&log_path);
        sink.record(&AuditEvent::enrollment("PAT-1", "PROG-1", Utc::now()))
            .unwrap();
        assert_eq!(audit_to_csv_and_archive(&log_path, &csv_path).unwrap(), 1);

        // Same sink keeps working; it reopens the path for every event
        sink.record(&AuditEvent::enrollment("PAT-2", "PROG-1", Utc::now()))
            .unwrap();
        assert_eq!(crate::audit::read_events(&log_path).unwrap().len(), 1);
        assert_eq!(
            crate::audit::read_events(&processed_path(&log_path))
                .unwrap()
                .len(),
            1
        );

        assert_eq!(audit_to_csv_and_archive(&log_path, &csv_path).unwrap(), 1);
        let reader = csv::Reader::from_path(&csv_path).unwrap();
        assert_eq!(reader.into_records().count(), 2);
    }

    #[test]
    fn test_rollup_waits_for_writer_lock() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("audit.wal");
        let csv_path = temp_dir.path().join("audit.csv");

        let mut sink = JsonlAuditSink::new(&log_path);
        sink.record(&AuditEvent::enrollment("PAT-1", "PROG-1", Utc::now()))
            .unwrap();

        let held = FileLock::exclusive(&log_path).unwrap();
        let (rollup_log, rollup_csv) = (log_path.clone(), csv_path.clone());
        let rollup =
            std::thread::spawn(move || audit_to_csv_and_archive(&rollup_log, &rollup_csv));

        std::thread::sleep(std::time::Duration::from_millis(100));
        assert!(log_path.exists());
        assert!(!csv_path.exists());

        drop(held);
        assert_eq!(rollup.join().unwrap().unwrap(), 1);
        assert!(!log_path.exists());
    }
}
