//! Service facade over the record store, ledger and audit sink.
//!
//! A [`HealthService`] is built once when the process starts and handed to
//! whatever drives it (CLI, server, tests). It owns all mutable state; there
//! is no global registry. A file-backed service writes every record change
//! through to the snapshot under its lock, so concurrent processes never
//! overwrite each other's records.

use crate::audit::{AuditEvent, AuditSink, JsonlAuditSink};
use crate::config::{Config, EnrollmentConfig};
use crate::ledger::{EnrollmentLedger, Ledger};
use crate::store::{MemoryStore, RecordStore};
use crate::{
    engine, EnrollmentRecord, Error, MatchResult, NewPatient, NewProgram, Patient, PatientView,
    Program, Result,
};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Filters for patient search; unset fields match everything
#[derive(Clone, Debug, Default)]
pub struct PatientQuery {
    /// Case-insensitive substring of the full name
    pub name: Option<String>,
    /// Only patients enrolled in this program
    pub program_id: Option<String>,
}

/// Record counts for a health check
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct HealthSummary {
    pub patients: usize,
    pub programs: usize,
    pub enrollments: usize,
}

pub struct HealthService<A: AuditSink> {
    store: MemoryStore,
    ledger: Ledger,
    audit: A,
    enrollment: EnrollmentConfig,
    /// Snapshot that record changes are written through to, if any
    records_path: Option<PathBuf>,
}

impl<A: AuditSink> HealthService<A> {
    pub fn new(store: MemoryStore, ledger: Ledger, audit: A, enrollment: EnrollmentConfig) -> Self {
        Self {
            store,
            ledger,
            audit,
            enrollment,
            records_path: None,
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn audit(&self) -> &A {
        &self.audit
    }

    pub fn register_patient(&mut self, new: NewPatient) -> Result<Patient> {
        let now = Utc::now();
        self.mutate_store(|store| store.create_patient(new, now))
    }

    pub fn create_program(&mut self, new: NewProgram) -> Result<Program> {
        let now = Utc::now();
        self.mutate_store(|store| store.create_program(new, now))
    }

    /// Apply a record change, against the latest snapshot when file-backed
    fn mutate_store<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut MemoryStore) -> Result<T>,
    {
        match &self.records_path {
            Some(path) => {
                let (store, out) = MemoryStore::update(path, f)?;
                self.store = store;
                Ok(out)
            }
            None => f(&mut self.store),
        }
    }

    /// Enroll a patient in a program
    ///
    /// With `require_age_eligibility` set, patients outside the program's
    /// target age group are turned away with `NotEligible`.
    pub fn enroll(&mut self, patient_id: &str, program_id: &str) -> Result<EnrollmentRecord> {
        let now = Utc::now();

        if self.enrollment.require_age_eligibility {
            let patient = self.store.get_patient(patient_id)?;
            let program = self.store.get_program(program_id)?;
            let age = patient.age_on(now.date_naive());

            if !program.target_age_group.contains(age) {
                tracing::warn!(
                    "Patient {} not eligible for program {} (age {} outside {})",
                    patient_id,
                    program_id,
                    age,
                    program.target_age_group
                );
                return Err(Error::NotEligible {
                    patient_id: patient_id.to_string(),
                    program_id: program_id.to_string(),
                    reason: format!(
                        "age {} outside target age group {}",
                        age, program.target_age_group
                    ),
                });
            }
        }

        let record = self.ledger.enroll(&self.store, patient_id, program_id, now)?;

        let event = AuditEvent::enrollment(patient_id, program_id, now);
        if let Err(e) = self.audit.record(&event) {
            tracing::warn!("Failed to audit enrollment for patient {}: {}", patient_id, e);
        }

        Ok(record)
    }

    /// Recommend programs using today's date
    pub fn recommend(&mut self, patient_id: &str) -> Result<Vec<MatchResult>> {
        self.recommend_on(patient_id, Utc::now().date_naive())
    }

    /// Recommend programs as of a given evaluation date
    pub fn recommend_on(&mut self, patient_id: &str, today: NaiveDate) -> Result<Vec<MatchResult>> {
        engine::recommend(&self.store, &self.ledger, &mut self.audit, patient_id, today)
    }

    pub fn patient_view(&self, patient_id: &str) -> Result<PatientView> {
        let patient = self.store.get_patient(patient_id)?;
        self.view_of(patient)
    }

    fn view_of(&self, patient: &Patient) -> Result<PatientView> {
        let enrolled_programs = self.ledger.programs_of(&patient.patient_id)?;
        Ok(PatientView {
            patient: patient.clone(),
            enrolled_programs,
        })
    }

    /// Every patient with their enrollments, in registration order
    pub fn patient_views(&self) -> Result<Vec<PatientView>> {
        self.store.patients().map(|p| self.view_of(p)).collect()
    }

    pub fn search_patients(&self, query: &PatientQuery) -> Result<Vec<PatientView>> {
        let name = query.name.as_ref().map(|n| n.trim().to_lowercase());

        self.store
            .list_patients(|p| match &name {
                Some(name) => p.full_name.to_lowercase().contains(name.as_str()),
                None => true,
            })
            .filter(|p| match &query.program_id {
                Some(program_id) => self.ledger.is_enrolled(&p.patient_id, program_id),
                None => true,
            })
            .map(|p| self.view_of(p))
            .collect()
    }

    pub fn programs(&self) -> Vec<Program> {
        self.store.programs().cloned().collect()
    }

    pub fn health(&self) -> HealthSummary {
        HealthSummary {
            patients: self.store.patient_count(),
            programs: self.store.program_count(),
            enrollments: self.ledger.len(),
        }
    }

    /// Hand back the store, e.g. to persist it
    pub fn into_store(self) -> MemoryStore {
        self.store
    }
}

impl HealthService<JsonlAuditSink> {
    /// Open the file-backed service under the configured data directory
    ///
    /// Loads the record snapshot, replays the ledger log and attaches the
    /// audit log. When seeding is enabled, missing sample programs are added
    /// under the snapshot lock, so concurrent first runs agree on their ids.
    pub fn open(config: &Config) -> Result<Self> {
        let data = &config.data;
        let records_path = data.records_path();
        let mut store = MemoryStore::load(&records_path)?;

        if config.seed.sample_programs && crate::catalog::missing_sample_programs(&store) {
            let (seeded, _) = MemoryStore::update(&records_path, |store| {
                crate::catalog::seed_sample_programs(store, Utc::now())
            })?;
            store = seeded;
        }

        let ledger = Ledger::open(&data.ledger_path())?;
        let audit = JsonlAuditSink::new(data.audit_log_path());

        tracing::debug!("Opened service at {:?}", data.data_dir);
        let mut service = Self::new(store, ledger, audit, config.enrollment.clone());
        service.records_path = Some(records_path);
        Ok(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditKind, MemoryAuditSink};
    use crate::error::Entity;
    use crate::AgeRange;
    use chrono::Datelike;

    fn service() -> HealthService<MemoryAuditSink> {
        HealthService::new(
            MemoryStore::new(),
            Ledger::new(),
            MemoryAuditSink::new(),
            EnrollmentConfig::default(),
        )
    }

    fn adult(national_id: &str, name: &str, risk_tags: &[&str]) -> NewPatient {
        let today = Utc::now().date_naive();
        NewPatient {
            national_id: national_id.into(),
            full_name: name.into(),
            date_of_birth: NaiveDate::from_ymd_opt(today.year() - 40, 1, 1).unwrap(),
            blood_type: None,
            risk_tags: risk_tags.iter().map(|t| t.to_string()).collect(),
            medical_history: vec![],
        }
    }

    fn program(name: &str, ages: (u32, u32), risks: &[&str]) -> NewProgram {
        NewProgram {
            name: name.into(),
            program_type: "chronic".into(),
            target_age_group: AgeRange::new(ages.0, ages.1),
            risk_factors: risks.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_enroll_then_recommend_excludes_program() {
        let mut service = service();
        let patient = service
            .register_patient(adult("1234567890", "Jane Wanjiru", &["obesity"]))
            .unwrap();
        let diabetes = service
            .create_program(program("Diabetes Management", (30, 80), &["obesity"]))
            .unwrap();
        service
            .create_program(program("General Wellness", (18, 99), &[]))
            .unwrap();

        let before = service.recommend(&patient.patient_id).unwrap();
        assert_eq!(before.len(), 2);
        assert_eq!(before[0].program_id, diabetes.program_id);

        service
            .enroll(&patient.patient_id, &diabetes.program_id)
            .unwrap();

        let after = service.recommend(&patient.patient_id).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].program_name, "General Wellness");
    }

    #[test]
    fn test_enroll_checks_age_when_required() {
        let mut service = service();
        let patient = service
            .register_patient(adult("1234567890", "Jane Wanjiru", &[]))
            .unwrap();
        let kids = service
            .create_program(program("Child Vaccination Program", (0, 12), &[]))
            .unwrap();

        let err = service
            .enroll(&patient.patient_id, &kids.program_id)
            .unwrap_err();
        assert!(matches!(err, Error::NotEligible { .. }));
        assert_eq!(service.health().enrollments, 0);
        assert!(service.audit().events().is_empty());
    }

    #[test]
    fn test_enroll_skips_age_check_when_disabled() {
        let mut service = HealthService::new(
            MemoryStore::new(),
            Ledger::new(),
            MemoryAuditSink::new(),
            EnrollmentConfig {
                require_age_eligibility: false,
            },
        );
        let patient = service
            .register_patient(adult("1234567890", "Jane Wanjiru", &[]))
            .unwrap();
        let kids = service
            .create_program(program("Child Vaccination Program", (0, 12), &[]))
            .unwrap();

        service.enroll(&patient.patient_id, &kids.program_id).unwrap();
        assert_eq!(service.health().enrollments, 1);
    }

    #[test]
    fn test_enroll_errors() {
        let mut service = service();
        let patient = service
            .register_patient(adult("1234567890", "Jane Wanjiru", &[]))
            .unwrap();
        let wellness = service
            .create_program(program("General Wellness", (18, 99), &[]))
            .unwrap();

        assert!(matches!(
            service.enroll("PAT-missing", &wellness.program_id),
            Err(Error::NotFound { entity: Entity::Patient, .. })
        ));
        assert!(matches!(
            service.enroll(&patient.patient_id, "PROG-missing"),
            Err(Error::NotFound { entity: Entity::Program, .. })
        ));

        service.enroll(&patient.patient_id, &wellness.program_id).unwrap();
        assert!(matches!(
            service.enroll(&patient.patient_id, &wellness.program_id),
            Err(Error::AlreadyEnrolled { .. })
        ));
    }

    #[test]
    fn test_enrollment_and_recommendation_audited() {
        let mut service = service();
        let patient = service
            .register_patient(adult("1234567890", "Jane Wanjiru", &[]))
            .unwrap();
        let wellness = service
            .create_program(program("General Wellness", (18, 99), &[]))
            .unwrap();

        service.enroll(&patient.patient_id, &wellness.program_id).unwrap();
        service.recommend(&patient.patient_id).unwrap();

        let kinds: Vec<_> = service.audit().events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![AuditKind::Enrollment, AuditKind::Recommendation]);
    }

    #[test]
    fn test_patient_view_lists_enrollments() {
        let mut service = service();
        let patient = service
            .register_patient(adult("1234567890", "Jane Wanjiru", &[]))
            .unwrap();
        let wellness = service
            .create_program(program("General Wellness", (18, 99), &[]))
            .unwrap();
        service.enroll(&patient.patient_id, &wellness.program_id).unwrap();

        let view = service.patient_view(&patient.patient_id).unwrap();
        assert_eq!(view.enrolled_programs, vec![wellness.program_id]);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["full_name"], "Jane Wanjiru");
        assert!(json["enrolled_programs"].is_array());
    }

    #[test]
    fn test_search_by_name_and_program() {
        let mut service = service();
        let jane = service
            .register_patient(adult("1234567890", "Jane Wanjiru", &[]))
            .unwrap();
        service
            .register_patient(adult("9876543210", "Peter Otieno", &[]))
            .unwrap();
        let wellness = service
            .create_program(program("General Wellness", (18, 99), &[]))
            .unwrap();
        service.enroll(&jane.patient_id, &wellness.program_id).unwrap();

        let by_name = service.search_patients(&PatientQuery {
            name: Some("OTIENO".into()),
            program_id: None,
        })
        .unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].patient.full_name, "Peter Otieno");

        let by_program = service.search_patients(&PatientQuery {
            name: None,
            program_id: Some(wellness.program_id.clone()),
        })
        .unwrap();
        assert_eq!(by_program.len(), 1);
        assert_eq!(by_program[0].patient.patient_id, jane.patient_id);

        let everyone = service.search_patients(&PatientQuery::default()).unwrap();
        assert_eq!(everyone.len(), 2);
        assert_eq!(service.patient_views().unwrap(), everyone);
    }

    #[test]
    fn test_open_persists_across_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data.data_dir = temp_dir.path().to_path_buf();

        let patient_id = {
            let mut service = HealthService::open(&config).unwrap();
            assert_eq!(service.health().programs, 2);

            let patient = service
                .register_patient(adult("1234567890", "Jane Wanjiru", &["obesity"]))
                .unwrap();
            let diabetes = service
                .store()
                .list_programs(|p| p.name == "Diabetes Management")
                .next()
                .unwrap()
                .program_id
                .clone();
            service.enroll(&patient.patient_id, &diabetes).unwrap();
            patient.patient_id
        };

        let mut reopened = HealthService::open(&config).unwrap();
        assert_eq!(
            reopened.health(),
            HealthSummary {
                patients: 1,
                programs: 2,
                enrollments: 1,
            }
        );
        assert!(reopened.recommend(&patient_id).unwrap().is_empty());

        let events = crate::audit::read_events(&config.data.audit_log_path()).unwrap();
        assert_eq!(events.len(), 2);
    }

    fn file_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.data.data_dir = dir.to_path_buf();
        config
    }

    #[test]
    fn test_registrations_from_two_services_both_kept() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = file_config(temp_dir.path());

        // Both opened before either writes, like two CLI processes
        let mut first = HealthService::open(&config).unwrap();
        let mut second = HealthService::open(&config).unwrap();

        first
            .register_patient(adult("1234567890", "Jane Wanjiru", &[]))
            .unwrap();
        second
            .register_patient(adult("9876543210", "Peter Otieno", &[]))
            .unwrap();
        assert_eq!(second.health().patients, 2);

        let err = first
            .register_patient(adult("9876543210", "Peter Again", &[]))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { entity: Entity::Patient, .. }));

        let reopened = HealthService::open(&config).unwrap();
        assert_eq!(reopened.health().patients, 2);
        assert_eq!(reopened.health().programs, 2);
    }

    #[test]
    fn test_seeded_program_ids_stable_across_opens() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = file_config(temp_dir.path());

        let ids = |service: &HealthService<JsonlAuditSink>| -> Vec<String> {
            service.programs().into_iter().map(|p| p.program_id).collect()
        };

        let first = HealthService::open(&config).unwrap();
        let second = HealthService::open(&config).unwrap();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(ids(&first).len(), 2);
    }
}
