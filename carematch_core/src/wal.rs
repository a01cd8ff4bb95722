//! Append-only JSONL logs.
//!
//! Enrollment records (and audit events, see [`crate::audit`]) are appended to
//! JSON Lines files. Readers and writers coordinate through the log's sidecar
//! lock (see [`crate::lock`]), and a writer always opens the log after taking
//! the lock, so it never writes into a log that was renamed away meanwhile.

use crate::lock::FileLock;
use crate::{EnrollmentRecord, Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Enrollment sink trait for persisting ledger entries
pub trait EnrollmentSink {
    /// Durably record a new enrollment
    ///
    /// Fails with `AlreadyEnrolled` if the pair is already in durable
    /// storage, including when another process wrote it.
    fn append(&mut self, record: &EnrollmentRecord) -> Result<()>;
}

/// JSONL-based enrollment sink with file locking
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    /// Create a new JSONL sink for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EnrollmentSink for JsonlSink {
    fn append(&mut self, record: &EnrollmentRecord) -> Result<()> {
        append_line_checked(&self.path, record, |existing: &[EnrollmentRecord]| {
            let taken = existing.iter().any(|r| {
                r.patient_id == record.patient_id && r.program_id == record.program_id
            });
            if taken {
                return Err(Error::AlreadyEnrolled {
                    patient_id: record.patient_id.clone(),
                    program_id: record.program_id.clone(),
                });
            }
            Ok(())
        })?;

        tracing::debug!(
            "Appended enrollment {} -> {} to ledger log",
            record.patient_id,
            record.program_id
        );
        Ok(())
    }
}

/// Append one value as a JSON line while holding the log's exclusive lock
pub(crate) fn append_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    // Serialize before touching the file so a bad value never leaves a partial line
    let line = to_line(value)?;

    let _lock = FileLock::exclusive(path)?;
    write_line(path, &line)
}

/// Like [`append_line`], but `check` first sees every record already in the
/// log and can veto the append. Check and append happen under one lock.
pub(crate) fn append_line_checked<T, F>(path: &Path, value: &T, check: F) -> Result<()>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce(&[T]) -> Result<()>,
{
    let line = to_line(value)?;

    let _lock = FileLock::exclusive(path)?;
    let existing = parse_log::<T>(path)?;
    check(&existing)?;
    write_line(path, &line)
}

fn to_line<T: Serialize>(value: &T) -> Result<String> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

/// Write a line to the end of the log; caller holds the exclusive lock
fn write_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;

    if ends_with_torn_line(&mut file)? {
        tracing::warn!("Terminating torn last line of {:?} before appending", path);
        file.write_all(b"\n")?;
    }

    file.write_all(line.as_bytes())?;
    file.sync_data()?;
    Ok(())
}

/// True when the file is non-empty and its last byte is not a newline
fn ends_with_torn_line(file: &mut File) -> Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }

    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Read every parseable JSON line from a log under its shared lock
///
/// Malformed lines are logged and skipped.
pub(crate) fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let _lock = FileLock::shared(path)?;
    parse_log(path)
}

/// Parse a log without locking; caller holds the lock
pub(crate) fn parse_log<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let mut values = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<T>(&line) {
            Ok(value) => values.push(value),
            Err(e) => {
                tracing::warn!(
                    "Failed to parse line {} of {:?}: {}",
                    line_num + 1,
                    path,
                    e
                );
            }
        }
    }

    Ok(values)
}

/// Read all enrollment records from a ledger log
pub fn read_enrollments(path: &Path) -> Result<Vec<EnrollmentRecord>> {
    let records = read_lines::<EnrollmentRecord>(path)?;
    tracing::debug!("Read {} enrollments from {:?}", records.len(), path);
    Ok(records)
}
