//! Record store for patients and programs.
//!
//! The engine only needs key lookups and program enumeration, exposed through
//! [`RecordStore`]. [`MemoryStore`] is the in-process implementation; it keeps
//! insertion order (which the engine uses as a tie-breaker) and can be
//! persisted as a JSON snapshot with file locking.

use crate::error::Entity;
use crate::lock::FileLock;
use crate::types::normalize_tags;
use crate::{Error, NewPatient, NewProgram, Patient, Program, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Read access to stored entities
pub trait RecordStore {
    fn get_patient(&self, patient_id: &str) -> Result<&Patient>;

    fn get_program(&self, program_id: &str) -> Result<&Program>;

    /// All programs in creation order. Calling again restarts the listing.
    fn programs(&self) -> Box<dyn Iterator<Item = &Program> + '_>;
}

/// On-disk layout of a [`MemoryStore`]
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreSnapshot {
    #[serde(default)]
    patients: Vec<Patient>,
    #[serde(default)]
    programs: Vec<Program>,
}

/// In-memory patient and program records, kept in insertion order
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    patients: Vec<Patient>,
    programs: Vec<Program>,
    patient_index: HashMap<String, usize>,
    program_index: HashMap<String, usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut store = Self::new();
        for patient in snapshot.patients {
            if store.patient_index.contains_key(&patient.patient_id) {
                tracing::warn!("Skipping duplicate patient id {} in snapshot", patient.patient_id);
                continue;
            }
            store.insert_patient(patient);
        }
        for program in snapshot.programs {
            if store.program_index.contains_key(&program.program_id) {
                tracing::warn!("Skipping duplicate program id {} in snapshot", program.program_id);
                continue;
            }
            store.insert_program(program);
        }
        store
    }

    fn to_snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            patients: self.patients.clone(),
            programs: self.programs.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Register a patient
    ///
    /// Fails with `Validation` for malformed input and `DuplicateKey` when the
    /// national id is taken. The store is untouched on failure.
    pub fn create_patient(&mut self, new: NewPatient, now: DateTime<Utc>) -> Result<Patient> {
        let errors = new.validate(now.date_naive());
        if !errors.is_empty() {
            return Err(Error::Validation(errors.join("; ")));
        }

        let national_id = new.national_id.trim().to_string();
        if self.patients.iter().any(|p| p.national_id == national_id) {
            return Err(Error::DuplicateKey {
                entity: Entity::Patient,
                key: national_id,
            });
        }

        let patient = Patient {
            patient_id: format!("PAT-{}", Uuid::new_v4().simple()),
            national_id,
            full_name: new.full_name.trim().to_string(),
            date_of_birth: new.date_of_birth,
            blood_type: new.blood_type,
            risk_tags: normalize_tags(&new.risk_tags),
            medical_history: new.medical_history,
            created_at: now,
        };

        self.insert_patient(patient.clone());
        tracing::info!("Registered new patient: {}", patient.patient_id);
        Ok(patient)
    }

    /// Define a program
    ///
    /// Program names are unique ignoring case.
    pub fn create_program(&mut self, new: NewProgram, now: DateTime<Utc>) -> Result<Program> {
        let errors = new.validate();
        if !errors.is_empty() {
            return Err(Error::Validation(errors.join("; ")));
        }

        let name = new.name.trim().to_string();
        if self.has_program_named(&name) {
            return Err(Error::DuplicateKey {
                entity: Entity::Program,
                key: name,
            });
        }

        let program = Program {
            program_id: format!("PROG-{}", Uuid::new_v4().simple()),
            name,
            program_type: new.program_type.trim().to_lowercase(),
            target_age_group: new.target_age_group,
            risk_factors: normalize_tags(&new.risk_factors),
            created_at: now,
        };

        self.insert_program(program.clone());
        tracing::info!("Created new program: {}", program.program_id);
        Ok(program)
    }

    fn insert_patient(&mut self, patient: Patient) {
        self.patient_index
            .insert(patient.patient_id.clone(), self.patients.len());
        self.patients.push(patient);
    }

    fn insert_program(&mut self, program: Program) {
        self.program_index
            .insert(program.program_id.clone(), self.programs.len());
        self.programs.push(program);
    }

    // ------------------------------------------------------------------
    // Query
    // ------------------------------------------------------------------

    pub fn has_program_named(&self, name: &str) -> bool {
        let name = name.trim().to_lowercase();
        self.programs
            .iter()
            .any(|p| p.name.to_lowercase() == name)
    }

    /// All patients in registration order
    pub fn patients(&self) -> impl Iterator<Item = &Patient> + '_ {
        self.patients.iter()
    }

    pub fn list_patients<'a, F>(&'a self, predicate: F) -> impl Iterator<Item = &'a Patient> + 'a
    where
        F: Fn(&Patient) -> bool + 'a,
    {
        self.patients.iter().filter(move |p| predicate(*p))
    }

    pub fn list_programs<'a, F>(&'a self, predicate: F) -> impl Iterator<Item = &'a Program> + 'a
    where
        F: Fn(&Program) -> bool + 'a,
    {
        self.programs.iter().filter(move |p| predicate(*p))
    }

    pub fn patient_count(&self) -> usize {
        self.patients.len()
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Load a store snapshot under the shared snapshot lock
    ///
    /// Returns an empty store if the file doesn't exist. Unlike derived state,
    /// patient records are never replaced by defaults: a snapshot that cannot
    /// be parsed is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No record snapshot at {:?}, starting empty", path);
            return Ok(Self::new());
        }

        let _lock = FileLock::shared(path)?;
        Self::read_snapshot(path)
    }

    /// Save the whole store under the exclusive snapshot lock
    ///
    /// This overwrites whatever other processes saved since this store was
    /// loaded; use [`MemoryStore::update`] to change shared records.
    pub fn save(&self, path: &Path) -> Result<()> {
        let _lock = FileLock::exclusive(path)?;
        self.write_snapshot(path)
    }

    /// Reload the snapshot, apply `f`, and save it back, all under one
    /// exclusive lock
    ///
    /// Returns the store as saved along with `f`'s output. Nothing is written
    /// when `f` fails.
    pub fn update<F, T>(path: &Path, f: F) -> Result<(Self, T)>
    where
        F: FnOnce(&mut MemoryStore) -> Result<T>,
    {
        let _lock = FileLock::exclusive(path)?;
        let mut store = Self::read_snapshot(path)?;
        let out = f(&mut store)?;
        store.write_snapshot(path)?;
        Ok((store, out))
    }

    /// Parse the snapshot; caller holds the lock
    fn read_snapshot(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;

        let snapshot: StoreSnapshot = serde_json::from_str(&contents)?;
        let store = Self::from_snapshot(snapshot);

        tracing::debug!(
            "Loaded {} patients and {} programs from {:?}",
            store.patients.len(),
            store.programs.len(),
            path
        );
        Ok(store)
    }

    /// Write the snapshot atomically; caller holds the lock
    ///
    /// The snapshot goes to a temp file in the same directory, is synced, and
    /// is then renamed over the previous one.
    fn write_snapshot(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::Other(format!("snapshot path {:?} has no parent", path)))?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer(&mut writer, &self.to_snapshot())?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;

        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved record snapshot to {:?}", path);
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn get_patient(&self, patient_id: &str) -> Result<&Patient> {
        self.patient_index
            .get(patient_id)
            .map(|&idx| &self.patients[idx])
            .ok_or_else(|| Error::patient_not_found(patient_id))
    }

    fn get_program(&self, program_id: &str) -> Result<&Program> {
        self.program_index
            .get(program_id)
            .map(|&idx| &self.programs[idx])
            .ok_or_else(|| Error::program_not_found(program_id))
    }

    fn programs(&self) -> Box<dyn Iterator<Item = &Program> + '_> {
        Box::new(self.programs.iter())
    }
}
