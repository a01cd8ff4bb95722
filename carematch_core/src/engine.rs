//! Recommendation engine for matching patients to health programs.
//!
//! Selection rules:
//! - Programs the patient is already enrolled in are never returned
//! - The patient's age must fall inside the program's target age group
//! - The patient must share at least one risk tag with the program, unless
//!   the program lists no risk factors (then age alone decides)
//!
//! Results are ranked by number of match reasons, then by program creation
//! order, so identical inputs always produce identical output.

use crate::audit::{AuditEvent, AuditSink};
use crate::ledger::EnrollmentLedger;
use crate::store::RecordStore;
use crate::{MatchResult, Patient, Program, Result};
use chrono::{NaiveDate, Utc};
use std::collections::HashSet;

/// Reason attached when the patient's age is inside the target group
pub const AGE_APPROPRIATE: &str = "Age appropriate";

/// Prefix of the reason attached for each shared risk tag
pub const RISK_FACTOR_MATCH: &str = "Risk factor match: ";

/// Recommend programs for a patient as of `today`
///
/// Fails with `NotFound` if the patient does not exist; store and ledger
/// errors are passed through unchanged. On success one recommendation event
/// is sent to `audit`. A failing audit sink is logged and otherwise ignored.
pub fn recommend<S, L, A>(
    store: &S,
    ledger: &L,
    audit: &mut A,
    patient_id: &str,
    today: NaiveDate,
) -> Result<Vec<MatchResult>>
where
    S: RecordStore + ?Sized,
    L: EnrollmentLedger + ?Sized,
    A: AuditSink + ?Sized,
{
    let patient = store.get_patient(patient_id)?;
    let enrolled = ledger.programs_of(patient_id)?;

    let matches = evaluate(patient, store.programs(), &enrolled, today);

    tracing::info!(
        "Recommended {} programs for patient {} (age {}, {} enrolled)",
        matches.len(),
        patient_id,
        patient.age_on(today),
        enrolled.len()
    );

    let program_ids = matches.iter().map(|m| m.program_id.clone()).collect();
    let event = AuditEvent::recommendation(patient_id, program_ids, Utc::now());
    if let Err(e) = audit.record(&event) {
        tracing::warn!(
            "Failed to audit recommendation for patient {}: {}",
            patient_id,
            e
        );
    }

    Ok(matches)
}

/// Rank eligible programs for a patient without touching any collaborator
///
/// `programs` must be given in creation order; it is the tie-breaker.
pub fn evaluate<'a, I>(
    patient: &Patient,
    programs: I,
    enrolled: &[String],
    today: NaiveDate,
) -> Vec<MatchResult>
where
    I: IntoIterator<Item = &'a Program>,
{
    let age = patient.age_on(today);
    let enrolled: HashSet<&str> = enrolled.iter().map(String::as_str).collect();
    let risk_tags: HashSet<String> = patient.risk_tags.iter().map(|t| tag_key(t)).collect();

    let mut matches: Vec<MatchResult> = programs
        .into_iter()
        .filter(|p| !enrolled.contains(p.program_id.as_str()))
        .filter_map(|p| match_program(p, age, &risk_tags))
        .collect();

    // Stable sort keeps creation order among equal reason counts
    matches.sort_by(|a, b| b.match_reasons.len().cmp(&a.match_reasons.len()));
    matches
}

/// Apply the eligibility rules to one program
fn match_program(program: &Program, age: u32, risk_tags: &HashSet<String>) -> Option<MatchResult> {
    if !program.target_age_group.contains(age) {
        tracing::debug!(
            "Program {} skipped: age {} outside {}",
            program.program_id,
            age,
            program.target_age_group
        );
        return None;
    }

    let shared = shared_risk_factors(program, risk_tags);
    if !program.risk_factors.is_empty() && shared.is_empty() {
        tracing::debug!("Program {} skipped: no shared risk factors", program.program_id);
        return None;
    }

    let mut match_reasons = Vec::with_capacity(1 + shared.len());
    match_reasons.push(AGE_APPROPRIATE.to_string());
    match_reasons.extend(
        shared
            .into_iter()
            .map(|tag| format!("{}{}", RISK_FACTOR_MATCH, tag)),
    );

    Some(MatchResult {
        program_id: program.program_id.clone(),
        program_name: program.name.clone(),
        match_reasons,
    })
}

/// Program risk factors the patient also has, in program order, once each
fn shared_risk_factors<'p>(program: &'p Program, risk_tags: &HashSet<String>) -> Vec<&'p str> {
    let mut seen = HashSet::new();
    program
        .risk_factors
        .iter()
        .map(|tag| tag.trim())
        .filter(|tag| {
            let key = tag_key(tag);
            risk_tags.contains(&key) && seen.insert(key)
        })
        .collect()
}

fn tag_key(tag: &str) -> String {
    tag.trim().to_lowercase()
}
