//! Enrollment ledger.
//!
//! Tracks which patients belong to which programs. The ledger is append-only
//! and holds at most one record per (patient, program) pair.

use crate::store::RecordStore;
use crate::wal::{read_enrollments, EnrollmentSink, JsonlSink};
use crate::{EnrollmentRecord, Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::Path;

/// Read access to enrollments
pub trait EnrollmentLedger {
    /// Programs the patient is enrolled in, in enrollment order, without
    /// duplicates. Unknown patients simply have none.
    fn programs_of(&self, patient_id: &str) -> Result<Vec<String>>;
}

/// In-memory ledger, optionally backed by a persistent sink
pub struct Ledger {
    records: Vec<EnrollmentRecord>,
    pairs: HashSet<(String, String)>,
    sink: Option<Box<dyn EnrollmentSink>>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Empty ledger with no persistence
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            pairs: HashSet::new(),
            sink: None,
        }
    }

    /// Empty ledger that appends every new enrollment to `sink`
    pub fn with_sink(sink: impl EnrollmentSink + 'static) -> Self {
        Self {
            sink: Some(Box::new(sink)),
            ..Self::new()
        }
    }

    /// Rebuild a ledger from previously recorded enrollments
    ///
    /// Repeated pairs keep their first occurrence.
    pub fn from_records(records: impl IntoIterator<Item = EnrollmentRecord>) -> Self {
        let mut ledger = Self::new();
        for record in records {
            let key = (record.patient_id.clone(), record.program_id.clone());
            if ledger.pairs.contains(&key) {
                tracing::warn!(
                    "Ignoring repeated enrollment {} -> {}",
                    record.patient_id,
                    record.program_id
                );
                continue;
            }
            ledger.pairs.insert(key);
            ledger.records.push(record);
        }
        ledger
    }

    /// Replay a JSONL ledger log and keep appending to it
    pub fn open(path: &Path) -> Result<Self> {
        let records = read_enrollments(path)?;
        let mut ledger = Self::from_records(records);
        ledger.sink = Some(Box::new(JsonlSink::new(path)));
        tracing::debug!("Opened ledger at {:?} with {} enrollments", path, ledger.len());
        Ok(ledger)
    }

    /// Record that a patient joined a program
    ///
    /// Both ids must resolve in `store`. The enrollment is written to the sink
    /// (if any) before it becomes visible; on any failure the ledger is
    /// unchanged. The sink rejects pairs that reached durable storage after
    /// this ledger was opened.
    pub fn enroll<S: RecordStore + ?Sized>(
        &mut self,
        store: &S,
        patient_id: &str,
        program_id: &str,
        now: DateTime<Utc>,
    ) -> Result<EnrollmentRecord> {
        store.get_patient(patient_id)?;
        store.get_program(program_id)?;

        let key = (patient_id.to_string(), program_id.to_string());
        if self.pairs.contains(&key) {
            return Err(Error::AlreadyEnrolled {
                patient_id: key.0,
                program_id: key.1,
            });
        }

        let record = EnrollmentRecord {
            patient_id: key.0.clone(),
            program_id: key.1.clone(),
            enrolled_at: now,
        };

        if let Some(sink) = self.sink.as_mut() {
            sink.append(&record)?;
        }

        self.pairs.insert(key);
        self.records.push(record.clone());

        tracing::info!("Enrolled patient {} in program {}", patient_id, program_id);
        Ok(record)
    }

    pub fn is_enrolled(&self, patient_id: &str, program_id: &str) -> bool {
        self.pairs
            .contains(&(patient_id.to_string(), program_id.to_string()))
    }

    /// Patients enrolled in a program, in enrollment order
    pub fn patients_in(&self, program_id: &str) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.program_id == program_id)
            .map(|r| r.patient_id.clone())
            .collect()
    }

    pub fn records(&self) -> &[EnrollmentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl EnrollmentLedger for Ledger {
    fn programs_of(&self, patient_id: &str) -> Result<Vec<String>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.patient_id == patient_id)
            .map(|r| r.program_id.clone())
            .collect())
    }
}
