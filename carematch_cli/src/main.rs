use carematch_core::*;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "carematch")]
#[command(about = "Patient registry and health program recommendations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register and look up patients
    Patient {
        #[command(subcommand)]
        command: PatientCommand,
    },

    /// Define and list health programs
    Program {
        #[command(subcommand)]
        command: ProgramCommand,
    },

    /// Enroll a patient in a program
    Enroll {
        patient_id: String,
        program_id: String,
    },

    /// Recommend programs for a patient
    Recommend {
        patient_id: String,

        /// Evaluate as of this date (YYYY-MM-DD) instead of today
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show record counts
    Status,

    /// Audit log maintenance
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },
}

#[derive(Subcommand)]
enum PatientCommand {
    /// Register a new patient
    Register {
        #[arg(long)]
        national_id: String,

        #[arg(long)]
        name: String,

        /// Date of birth (YYYY-MM-DD)
        #[arg(long)]
        dob: NaiveDate,

        /// Blood type (O+, O-, A+, A-, B+, B-, AB+, AB-)
        #[arg(long)]
        blood_type: Option<BloodType>,

        /// Risk tag (repeatable)
        #[arg(long = "risk-tag")]
        risk_tags: Vec<String>,

        /// Medical history entry (repeatable)
        #[arg(long = "history")]
        history: Vec<String>,

        /// Print the created patient as JSON
        #[arg(long)]
        json: bool,
    },

    /// List all patients
    List,

    /// Show a patient's full profile as JSON
    Show { patient_id: String },

    /// Search patients by name and/or program enrollment
    Search {
        /// Case-insensitive name fragment
        #[arg(long)]
        name: Option<String>,

        /// Only patients enrolled in this program
        #[arg(long)]
        program: Option<String>,
    },
}

#[derive(Subcommand)]
enum ProgramCommand {
    /// Create a new health program
    Create {
        #[arg(long)]
        name: String,

        /// Category, e.g. chronic, preventive, rehabilitation
        #[arg(long = "type")]
        program_type: String,

        /// Target age group as min-max (default: any age)
        #[arg(long)]
        ages: Option<AgeRange>,

        /// Risk factor addressed (repeatable)
        #[arg(long = "risk-factor")]
        risk_factors: Vec<String>,

        /// Print the created program as JSON
        #[arg(long)]
        json: bool,
    },

    /// List all programs
    List,
}

#[derive(Subcommand)]
enum AuditCommand {
    /// Roll up the audit log to CSV
    Rollup {
        /// Clean up processed audit logs after rollup
        #[arg(long)]
        cleanup: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(data_dir) = cli.data_dir {
        config.data.data_dir = data_dir;
    }

    carematch_core::logging::init_with_level(&config.logging.level);
    tracing::debug!("Using data directory {:?}", config.data.data_dir);

    match cli.command {
        Commands::Patient { command } => cmd_patient(command, &config),
        Commands::Program { command } => cmd_program(command, &config),
        Commands::Enroll {
            patient_id,
            program_id,
        } => cmd_enroll(&patient_id, &program_id, &config),
        Commands::Recommend {
            patient_id,
            as_of,
            json,
        } => cmd_recommend(&patient_id, as_of, json, &config),
        Commands::Status => cmd_status(&config),
        Commands::Audit {
            command: AuditCommand::Rollup { cleanup },
        } => cmd_audit_rollup(cleanup, &config),
    }
}

fn cmd_patient(command: PatientCommand, config: &Config) -> Result<()> {
    let mut service = HealthService::open(config)?;

    match command {
        PatientCommand::Register {
            national_id,
            name,
            dob,
            blood_type,
            risk_tags,
            history,
            json,
        } => {
            let patient = service.register_patient(NewPatient {
                national_id,
                full_name: name,
                date_of_birth: dob,
                blood_type,
                risk_tags,
                medical_history: history,
            })?;

            if json {
                println!("{}", serde_json::to_string_pretty(&patient)?);
            } else {
                println!("✓ Registered patient {}", patient.patient_id);
            }
        }

        PatientCommand::List => {
            let views = service.patient_views()?;
            println!("Found {} patients", views.len());
            for view in &views {
                display_patient(view);
            }
        }

        PatientCommand::Show { patient_id } => {
            let view = service.patient_view(&patient_id)?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }

        PatientCommand::Search { name, program } => {
            let views = service.search_patients(&PatientQuery {
                name,
                program_id: program,
            })?;
            println!("Found {} matching patients", views.len());
            for view in &views {
                display_patient(view);
            }
        }
    }

    Ok(())
}

fn cmd_program(command: ProgramCommand, config: &Config) -> Result<()> {
    let mut service = HealthService::open(config)?;

    match command {
        ProgramCommand::Create {
            name,
            program_type,
            ages,
            risk_factors,
            json,
        } => {
            let program = service.create_program(NewProgram {
                name,
                program_type,
                target_age_group: ages.unwrap_or_default(),
                risk_factors,
            })?;

            if json {
                println!("{}", serde_json::to_string_pretty(&program)?);
            } else {
                println!("✓ Created program {}", program.program_id);
            }
        }

        ProgramCommand::List => {
            let programs = service.programs();
            println!("Found {} programs", programs.len());
            for program in &programs {
                display_program(program);
            }
        }
    }

    Ok(())
}

fn cmd_enroll(patient_id: &str, program_id: &str, config: &Config) -> Result<()> {
    let mut service = HealthService::open(config)?;
    let record = service.enroll(patient_id, program_id)?;

    println!(
        "✓ Enrolled patient {} in program {}",
        record.patient_id, record.program_id
    );
    Ok(())
}

fn cmd_recommend(
    patient_id: &str,
    as_of: Option<NaiveDate>,
    json: bool,
    config: &Config,
) -> Result<()> {
    let mut service = HealthService::open(config)?;

    let results = match as_of {
        Some(date) => service.recommend_on(patient_id, date)?,
        None => service.recommend(patient_id)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No program recommendations for {}", patient_id);
        return Ok(());
    }

    println!("\n╭─────────────────────────────────────────╮");
    println!("│  RECOMMENDED PROGRAMS");
    println!("╰─────────────────────────────────────────╯");
    for (rank, result) in results.iter().enumerate() {
        println!();
        println!("  {}. {} ({})", rank + 1, result.program_name, result.program_id);
        for reason in &result.match_reasons {
            println!("     → {}", reason);
        }
    }
    println!();

    Ok(())
}

fn cmd_status(config: &Config) -> Result<()> {
    let service = HealthService::open(config)?;
    let health = service.health();

    println!("Status: healthy");
    println!("  Patients:    {}", health.patients);
    println!("  Programs:    {}", health.programs);
    println!("  Enrollments: {}", health.enrollments);
    Ok(())
}

fn cmd_audit_rollup(cleanup: bool, config: &Config) -> Result<()> {
    let log_path = config.data.audit_log_path();
    let csv_path = config.data.audit_csv_path();

    if !log_path.exists() {
        println!("No audit log found - nothing to roll up.");
        return Ok(());
    }

    let count = carematch_core::audit_rollup::audit_to_csv_and_archive(&log_path, &csv_path)?;

    println!("✓ Rolled up {} audit events to CSV", count);
    println!("  CSV: {}", csv_path.display());

    if cleanup {
        let cleaned =
            carematch_core::audit_rollup::cleanup_processed_logs(&config.data.audit_dir())?;
        if cleaned > 0 {
            println!("✓ Cleaned up {} processed audit logs", cleaned);
        }
    }

    Ok(())
}

fn display_patient(view: &PatientView) {
    let patient = &view.patient;
    let blood_type = patient
        .blood_type
        .map(|bt| bt.to_string())
        .unwrap_or_else(|| "-".into());

    println!(
        "  {}  {}  born {}  blood {}  programs: {}",
        patient.patient_id,
        patient.full_name,
        patient.date_of_birth,
        blood_type,
        view.enrolled_programs.len()
    );
}

fn display_program(program: &Program) {
    let risks = if program.risk_factors.is_empty() {
        "-".to_string()
    } else {
        program.risk_factors.join(", ")
    };

    println!(
        "  {}  {}  [{}]  ages {}  risk factors: {}",
        program.program_id, program.name, program.program_type, program.target_age_group, risks
    );
}
