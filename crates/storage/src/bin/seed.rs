use std::fmt;

use chrono::{DateTime, Utc};
use course_core::model::{
    CourseId, CurriculumSnapshot, Enrollment, LearnerId, ModuleId, ModuleOutline, ProgressLedger,
    QuizId, SectionId,
};
use storage::repository::{
    CurriculumRepository, EnrollmentRepository, LedgerRepository, Storage, StorageError,
};

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    course_id: CourseId,
    modules: u32,
    sections: u32,
    final_exam: bool,
    learner: Option<LearnerId>,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidCourseId { raw: String },
    InvalidModules { raw: String },
    InvalidSections { raw: String },
    InvalidFinalExam { raw: String },
    InvalidLearner { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidCourseId { raw } => write!(f, "invalid --course-id value: {raw}"),
            ArgsError::InvalidModules { raw } => write!(f, "invalid --modules value: {raw}"),
            ArgsError::InvalidSections { raw } => write!(f, "invalid --sections value: {raw}"),
            ArgsError::InvalidFinalExam { raw } => {
                write!(f, "invalid --final-exam value (expected true/false): {raw}")
            }
            ArgsError::InvalidLearner { raw } => write!(f, "invalid --learner value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("COURSE_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut course_id = std::env::var("COURSE_SEED_COURSE")
            .ok()
            .and_then(|value| value.parse::<CourseId>().ok())
            .unwrap_or_else(|| CourseId::new("rust-101"));
        let mut modules = std::env::var("COURSE_SEED_MODULES")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(3);
        let mut sections = std::env::var("COURSE_SEED_SECTIONS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(4);
        let mut final_exam = true;
        let mut learner = std::env::var("COURSE_SEED_LEARNER")
            .ok()
            .and_then(|value| value.parse::<LearnerId>().ok());
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--course-id" => {
                    let value = require_value(&mut args, "--course-id")?;
                    course_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidCourseId { raw: value.clone() })?;
                }
                "--modules" => {
                    let value = require_value(&mut args, "--modules")?;
                    modules = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidModules { raw: value.clone() })?;
                }
                "--sections" => {
                    let value = require_value(&mut args, "--sections")?;
                    sections = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidSections { raw: value.clone() })?;
                }
                "--final-exam" => {
                    let value = require_value(&mut args, "--final-exam")?;
                    final_exam = match value.as_str() {
                        "true" => true,
                        "false" => false,
                        _ => return Err(ArgsError::InvalidFinalExam { raw: value }),
                    };
                }
                "--learner" => {
                    let value = require_value(&mut args, "--learner")?;
                    let parsed = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidLearner { raw: value.clone() })?;
                    learner = Some(parsed);
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            course_id,
            modules,
            sections,
            final_exam,
            learner,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --course-id <id>          Course id to replace (default: rust-101)");
    eprintln!("  --modules <n>             Number of modules (default: 3)");
    eprintln!("  --sections <n>            Sections per module (default: 4)");
    eprintln!("  --final-exam <bool>       Include a course-level final exam (default: true)");
    eprintln!("  --learner <id>            Also enroll this learner with an empty ledger");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!(
        "  COURSE_DB_URL, COURSE_SEED_COURSE, COURSE_SEED_MODULES, COURSE_SEED_SECTIONS, COURSE_SEED_LEARNER"
    );
}

fn build_snapshot(args: &Args) -> Result<CurriculumSnapshot, Box<dyn std::error::Error>> {
    let mut modules = Vec::with_capacity(args.modules as usize);
    for m in 1..=args.modules {
        let module_id = ModuleId::new(format!("m{m}"));
        let sections = (1..=args.sections)
            .map(|s| SectionId::new(format!("m{m}-s{s}")))
            .collect();
        let quiz = Some(QuizId::new(format!("m{m}-quiz")));
        modules.push(ModuleOutline::new(module_id, sections, quiz));
    }
    let final_exam = args.final_exam.then(|| QuizId::new("final-exam"));
    Ok(CurriculumSnapshot::new(modules, final_exam)?)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    let snapshot = build_snapshot(&args)?;
    storage.curricula.put_snapshot(&args.course_id, &snapshot).await?;

    if let Some(learner) = &args.learner {
        let enrollment = Enrollment::new(learner.clone(), args.course_id.clone(), now);
        match storage.enrollments.insert_enrollment(&enrollment).await {
            Ok(()) => {
                let ledger = ProgressLedger::new(learner.clone(), args.course_id.clone(), now);
                match storage.ledgers.insert_ledger(&ledger).await {
                    Ok(()) | Err(StorageError::Conflict) => {}
                    Err(e) => return Err(e.into()),
                }
                println!("Enrolled learner {learner} in {}", args.course_id);
            }
            Err(StorageError::Conflict) => {
                println!("Learner {learner} is already enrolled in {}", args.course_id);
            }
            Err(e) => return Err(e.into()),
        }
    }

    println!(
        "Seeded course {} with {} modules, {} completable items into {}",
        args.course_id,
        args.modules,
        snapshot.total_items(),
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
