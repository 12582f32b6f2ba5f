use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use ridgelock::biometric::matcher::CosineMatcher;
use ridgelock::biometric::{Template, UserId};
use ridgelock::capture::replay::{InteractiveSource, ReplaySource};
use ridgelock::capture::simulated::SimulatedReader;
use ridgelock::capture::{CaptureListener, CaptureSource};
use ridgelock::config::AppConfig;
use ridgelock::paths::AppPaths;
use ridgelock::session::{
    EnrollProgress, EnrollmentOutcome, EnrollmentSession, SessionError, VerificationOutcome,
    VerificationSession, VerifyProgress,
};
use ridgelock::store::{FileTemplateStore, StoreError, TemplateStore};
use ridgelock::{validation, GridExtractor};

#[derive(Parser, Debug)]
#[command(
    name = "ridgelock",
    version,
    about = "Local fingerprint enrollment and verification"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enroll a user's fingerprint from repeated scans
    Enroll {
        /// User identifier to enroll
        #[arg(short, long)]
        user: u32,
        /// Scan image files (binary PGM); prompts on stdin when omitted
        scans: Vec<PathBuf>,
        /// Simulate a reader delivering N scans instead of reading files
        #[arg(long, value_name = "N", conflicts_with = "scans")]
        simulate: Option<u32>,
        /// Synthetic finger seed for --simulate (defaults to the user id)
        #[arg(long, requires = "simulate")]
        finger: Option<u64>,
    },
    /// Verify a live scan against a user's stored template
    Verify {
        /// User identifier to verify
        #[arg(short, long)]
        user: u32,
        /// Scan image files (binary PGM); prompts on stdin when omitted
        scans: Vec<PathBuf>,
        /// Simulate a reader delivering one scan instead of reading files
        #[arg(long, conflicts_with = "scans")]
        simulate: bool,
        /// Synthetic finger seed for --simulate (defaults to the user id)
        #[arg(long, requires = "simulate")]
        finger: Option<u64>,
    },
    /// List enrolled users
    List,
    /// Delete a user's stored template
    Delete {
        #[arg(short, long)]
        user: u32,
    },
    /// Store a previously recovered template without rescanning
    Import {
        #[arg(short, long)]
        user: u32,
        /// Serialized template file (as written to the pending directory)
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let paths = AppPaths::new()?;
    paths.ensure_directories()?;

    let config = AppConfig::load_or_create(&paths.config_file())?;
    config.validate().context("invalid configuration")?;

    let store = FileTemplateStore::open(&paths.templates_dir())
        .context("failed to open template store")?;

    match cli.command {
        Command::Enroll {
            user,
            scans,
            simulate,
            finger,
        } => cmd_enroll(user, scans, simulate, finger, &config, &store, &paths),
        Command::Verify {
            user,
            scans,
            simulate,
            finger,
        } => cmd_verify(user, scans, simulate, finger, &config, &store),
        Command::List => cmd_list(&store),
        Command::Delete { user } => cmd_delete(user, &store),
        Command::Import { user, file } => cmd_import(user, &file, &store),
    }
}

/// Pick the capture source: simulation, scan file replay, or stdin prompts.
fn capture_source(
    user: UserId,
    scans: Vec<PathBuf>,
    simulate: Option<u32>,
    finger: Option<u64>,
) -> Result<Box<dyn CaptureSource>> {
    if let Some(count) = simulate {
        let count = validation::validate_scan_count(count)?;
        let seed = finger.unwrap_or(user.0 as u64);
        return Ok(Box::new(SimulatedReader::new(seed, count)));
    }
    if !scans.is_empty() {
        return Ok(Box::new(ReplaySource::from_files(&scans)?));
    }
    println!("Place your finger on the scanner...");
    Ok(Box::new(InteractiveSource::new()))
}

fn cmd_enroll(
    user: u32,
    scans: Vec<PathBuf>,
    simulate: Option<u32>,
    finger: Option<u64>,
    config: &AppConfig,
    store: &FileTemplateStore,
    paths: &AppPaths,
) -> Result<ExitCode> {
    let user = validation::validate_user_id(user)?;
    let source = capture_source(user, scans, simulate, finger)?;

    let extractor = GridExtractor::new(config.extractor.clone());
    let mut session = EnrollmentSession::new(user, &extractor, store, &config.enrollment);
    println!(
        "Enrolling user {}: {} good scan(s) required.",
        user,
        session.features_needed()
    );

    let (_listener, events) = CaptureListener::start(source);
    let outcome = session.run(&events, |progress| match progress {
        EnrollProgress::Rejected(feedback) => {
            println!("Poor quality fingerprint ({feedback}). Please try again.");
        }
        EnrollProgress::NeedMore { remaining } => {
            println!("Keep scanning... {remaining} more sample(s) required.");
        }
        EnrollProgress::RestartRequired => {
            println!("Enrollment failed. Restarting...");
        }
        _ => {}
    })?;

    match outcome {
        EnrollmentOutcome::Enrolled(info) => {
            println!(
                "Fingerprint enrollment complete for user {} ({} samples).",
                info.user, info.samples
            );
            Ok(ExitCode::SUCCESS)
        }
        EnrollmentOutcome::EnrolledUnsaved { template, error } => {
            let pending = paths.pending_dir().join(format!("{user}.tpl"));
            fs::write(&pending, template.to_bytes())
                .with_context(|| format!("failed to write recovery file {}", pending.display()))?;

            eprintln!("Enrollment succeeded but saving failed: {error}");
            eprintln!(
                "Template kept at {}; run `ridgelock import --user {} {}` to retry.",
                pending.display(),
                user,
                pending.display()
            );
            Ok(ExitCode::from(2))
        }
        EnrollmentOutcome::DeviceUnavailable => {
            eprintln!("Scanner unavailable before enrollment completed.");
            Ok(ExitCode::from(3))
        }
    }
}

fn cmd_verify(
    user: u32,
    scans: Vec<PathBuf>,
    simulate: bool,
    finger: Option<u64>,
    config: &AppConfig,
    store: &FileTemplateStore,
) -> Result<ExitCode> {
    let user = validation::validate_user_id(user)?;
    let simulate = simulate.then_some(1);

    let extractor = GridExtractor::new(config.extractor.clone());
    let matcher = CosineMatcher::new(&config.matcher);

    let mut session = match VerificationSession::open(user, store, &extractor, &matcher) {
        Ok(session) => session,
        Err(SessionError::NotEnrolled(user)) => {
            eprintln!("No fingerprint template found for user {user}.");
            return Ok(ExitCode::from(4));
        }
        Err(e) => return Err(e.into()),
    };

    let source = capture_source(user, scans, simulate, finger)?;
    let (_listener, events) = CaptureListener::start(source);
    let outcome = session.run(&events, |progress| {
        if let VerifyProgress::Rejected(feedback) = progress {
            println!("Poor quality fingerprint ({feedback}). Try again.");
        }
    })?;

    match outcome {
        VerificationOutcome::Matched(result) => {
            match result.score {
                Some(score) => println!("Fingerprint matches user {user} (score {score:.3})."),
                None => println!("Fingerprint matches user {user}."),
            }
            Ok(ExitCode::SUCCESS)
        }
        VerificationOutcome::NotMatched(_) => {
            println!("Fingerprint does NOT match.");
            Ok(ExitCode::FAILURE)
        }
        VerificationOutcome::DeviceUnavailable => {
            eprintln!("Scanner unavailable before a decision was made.");
            Ok(ExitCode::from(3))
        }
    }
}

fn cmd_list(store: &FileTemplateStore) -> Result<ExitCode> {
    let profiles = store.list()?;
    if profiles.is_empty() {
        println!("No enrolled users.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("{:>10}  {:<32}  {}", "USER", "ENROLLED", "CHECKSUM");
    for profile in profiles {
        println!(
            "{:>10}  {:<32}  {}",
            profile.user,
            profile.created_at,
            &profile.checksum[..12.min(profile.checksum.len())]
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_delete(user: u32, store: &FileTemplateStore) -> Result<ExitCode> {
    let user = validation::validate_user_id(user)?;
    match store.delete(user) {
        Ok(()) => {
            println!("Deleted template for user {user}.");
            Ok(ExitCode::SUCCESS)
        }
        Err(StoreError::NotFound(user)) => {
            eprintln!("No fingerprint template found for user {user}.");
            Ok(ExitCode::from(4))
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_import(user: u32, file: &PathBuf, store: &FileTemplateStore) -> Result<ExitCode> {
    let user = validation::validate_user_id(user)?;
    let bytes =
        fs::read(file).with_context(|| format!("failed to read template file {}", file.display()))?;

    // Reject garbage before it reaches the store
    Template::from_bytes(&bytes)
        .with_context(|| format!("{} is not a valid template file", file.display()))?;

    store.put(user, &bytes)?;
    println!("Template imported for user {user}.");
    Ok(ExitCode::SUCCESS)
}
