//! Built-in sample programs.
//!
//! A fresh installation starts with these programs so recommendations have
//! something to work with. Seeding is explicit: the host decides when (and
//! whether) to call [`seed_sample_programs`].

use crate::store::MemoryStore;
use crate::{AgeRange, NewProgram, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;

/// Cached sample program definitions, built once
static SAMPLE_PROGRAMS: Lazy<Vec<NewProgram>> = Lazy::new(build_sample_programs);

/// Get the sample program definitions
pub fn sample_programs() -> &'static [NewProgram] {
    &SAMPLE_PROGRAMS
}

fn build_sample_programs() -> Vec<NewProgram> {
    vec![
        NewProgram {
            name: "Diabetes Management".into(),
            program_type: "chronic".into(),
            target_age_group: AgeRange::new(30, 80),
            risk_factors: vec!["obesity".into(), "family history".into()],
        },
        NewProgram {
            name: "Child Vaccination Program".into(),
            program_type: "preventive".into(),
            target_age_group: AgeRange::new(0, 12),
            risk_factors: vec!["low birth weight".into()],
        },
    ]
}

/// True when at least one sample program is not in `store` yet
pub fn missing_sample_programs(store: &MemoryStore) -> bool {
    sample_programs()
        .iter()
        .any(|program| !store.has_program_named(&program.name))
}

/// Insert every sample program whose name is not already taken
///
/// Returns the number of programs added; running it again adds nothing.
pub fn seed_sample_programs(store: &mut MemoryStore, now: DateTime<Utc>) -> Result<usize> {
    let mut added = 0;
    for program in sample_programs() {
        if store.has_program_named(&program.name) {
            tracing::debug!("Sample program {:?} already present", program.name);
            continue;
        }
        store.create_program(program.clone(), now)?;
        added += 1;
    }

    if added > 0 {
        tracing::info!("Seeded {} sample programs", added);
    }
    Ok(added)
}
