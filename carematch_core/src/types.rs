//! Core domain types for the Carematch system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Patients and their registration input
//! - Health programs and their eligibility criteria
//! - Enrollment records
//! - Recommendation results

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Blood Type
// ============================================================================

/// ABO/Rh blood group
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BloodType {
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
}

impl BloodType {
    pub const ALL: [BloodType; 8] = [
        BloodType::OPositive,
        BloodType::ONegative,
        BloodType::APositive,
        BloodType::ANegative,
        BloodType::BPositive,
        BloodType::BNegative,
        BloodType::AbPositive,
        BloodType::AbNegative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BloodType::OPositive => "O+",
            BloodType::ONegative => "O-",
            BloodType::APositive => "A+",
            BloodType::ANegative => "A-",
            BloodType::BPositive => "B+",
            BloodType::BNegative => "B-",
            BloodType::AbPositive => "AB+",
            BloodType::AbNegative => "AB-",
        }
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BloodType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_uppercase();
        BloodType::ALL
            .into_iter()
            .find(|bt| bt.as_str() == wanted)
            .ok_or_else(|| Error::Validation(format!("unknown blood type: {}", s)))
    }
}

// ============================================================================
// Age Range
// ============================================================================

/// Inclusive age window in whole years
///
/// A range with `min > max` is representable so that stored data never makes
/// evaluation fail; it simply contains no age.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgeRange {
    pub min: u32,
    pub max: u32,
}

impl AgeRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Range accepting every age
    pub fn any() -> Self {
        Self {
            min: 0,
            max: u32::MAX,
        }
    }

    pub fn contains(&self, age: u32) -> bool {
        self.min <= age && age <= self.max
    }

    pub fn is_degenerate(&self) -> bool {
        self.min > self.max
    }
}

impl Default for AgeRange {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for AgeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == AgeRange::any() {
            f.write_str("any")
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}

/// Parses `"min-max"` (e.g. `"18-65"`) or `"any"`
impl FromStr for AgeRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("any") {
            return Ok(AgeRange::any());
        }

        let (min, max) = s
            .split_once('-')
            .ok_or_else(|| Error::Validation(format!("age range must be 'min-max': {}", s)))?;

        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|e| Error::Validation(format!("invalid age '{}' in range: {}", part, e)))
        };

        Ok(AgeRange::new(parse(min)?, parse(max)?))
    }
}

// ============================================================================
// Patient Types
// ============================================================================

pub const NATIONAL_ID_MIN_LEN: usize = 10;
pub const NATIONAL_ID_MAX_LEN: usize = 15;
pub const NAME_MIN_LEN: usize = 3;
pub const NAME_MAX_LEN: usize = 100;

/// Registration input for a new patient
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewPatient {
    pub national_id: String,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    #[serde(default)]
    pub blood_type: Option<BloodType>,
    /// Precomputed risk tags; free-text history is never parsed for these
    #[serde(default)]
    pub risk_tags: Vec<String>,
    #[serde(default)]
    pub medical_history: Vec<String>,
}

impl NewPatient {
    /// Check registration input, returning every problem found
    pub fn validate(&self, today: NaiveDate) -> Vec<String> {
        let mut errors = Vec::new();

        let national_id = self.national_id.trim();
        let id_len = national_id.chars().count();
        if !(NATIONAL_ID_MIN_LEN..=NATIONAL_ID_MAX_LEN).contains(&id_len) {
            errors.push(format!(
                "national_id must be {}-{} characters, got {}",
                NATIONAL_ID_MIN_LEN, NATIONAL_ID_MAX_LEN, id_len
            ));
        }

        check_name_length("full_name", &self.full_name, &mut errors);

        if self.date_of_birth > today {
            errors.push(format!(
                "date_of_birth {} is in the future",
                self.date_of_birth
            ));
        }

        if self.risk_tags.iter().any(|t| t.trim().is_empty()) {
            errors.push("risk tags cannot be empty".to_string());
        }

        errors
    }
}

/// A registered patient
///
/// Enrolled programs are not stored here; see [`PatientView`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub patient_id: String,
    pub national_id: String,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub blood_type: Option<BloodType>,
    pub risk_tags: Vec<String>,
    pub medical_history: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Patient {
    /// Age in whole years on the given date
    pub fn age_on(&self, today: NaiveDate) -> u32 {
        age_on(self.date_of_birth, today)
    }
}

/// Patient profile together with the ledger-derived enrollment list
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PatientView {
    #[serde(flatten)]
    pub patient: Patient,
    pub enrolled_programs: Vec<String>,
}

/// Whole years elapsed from `date_of_birth` to `today`, truncated
///
/// A birth date after `today` counts as age 0.
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> u32 {
    today.years_since(date_of_birth).unwrap_or(0)
}

// ============================================================================
// Program Types
// ============================================================================

/// Definition input for a new health program
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewProgram {
    pub name: String,
    pub program_type: String,
    #[serde(default)]
    pub target_age_group: AgeRange,
    #[serde(default)]
    pub risk_factors: Vec<String>,
}

impl NewProgram {
    /// Check program definition input, returning every problem found
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        check_name_length("name", &self.name, &mut errors);

        if self.program_type.trim().is_empty() {
            errors.push("program_type cannot be empty".to_string());
        }

        if self.target_age_group.is_degenerate() {
            errors.push(format!(
                "target_age_group min {} exceeds max {}",
                self.target_age_group.min, self.target_age_group.max
            ));
        }

        if self.risk_factors.iter().any(|t| t.trim().is_empty()) {
            errors.push("risk factors cannot be empty".to_string());
        }

        errors
    }
}

/// A health program patients can enroll in
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Program {
    pub program_id: String,
    pub name: String,
    pub program_type: String,
    pub target_age_group: AgeRange,
    pub risk_factors: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Enrollment and Recommendation Types
// ============================================================================

/// A single (patient, program) membership
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EnrollmentRecord {
    pub patient_id: String,
    pub program_id: String,
    pub enrolled_at: DateTime<Utc>,
}

/// One recommended program with the reasons it was selected
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchResult {
    pub program_id: String,
    pub program_name: String,
    pub match_reasons: Vec<String>,
}

// ============================================================================
// Helpers
// ============================================================================

fn check_name_length(field: &str, value: &str, errors: &mut Vec<String>) {
    let len = value.trim().chars().count();
    if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) {
        errors.push(format!(
            "{} must be {}-{} characters, got {}",
            field, NAME_MIN_LEN, NAME_MAX_LEN, len
        ));
    }
}

/// Lowercase, trim and deduplicate tags, keeping first-seen order
pub(crate) fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}
