#![forbid(unsafe_code)]

//! Core domain model and business logic for the Carematch system.
//!
//! This crate provides:
//! - Domain types (patients, programs, enrollments, match results)
//! - Record store and enrollment ledger
//! - Recommendation engine
//! - Audit events and sinks
//! - Persistence (snapshot, JSONL logs, CSV rollup)
//! - Configuration, logging and the service facade

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod lock;
pub mod wal;
pub mod store;
pub mod ledger;
pub mod audit;
pub mod audit_rollup;
pub mod engine;
pub mod service;

// Re-export commonly used types
pub use error::{Entity, Error, Result};
pub use types::*;
pub use catalog::{missing_sample_programs, sample_programs, seed_sample_programs};
pub use config::Config;
pub use store::{MemoryStore, RecordStore};
pub use ledger::{EnrollmentLedger, Ledger};
pub use wal::{EnrollmentSink, JsonlSink};
pub use audit::{AuditEvent, AuditKind, AuditOutcome, AuditSink, JsonlAuditSink, MemoryAuditSink};
pub use engine::{evaluate, recommend};
pub use service::{HealthService, HealthSummary, PatientQuery};
