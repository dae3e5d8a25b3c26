mod config;
mod engine;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rollcall_core::{EuclideanMatcher, ImageInput, PopulationFilter};
use rollcall_store::{NewStudent, SqliteDirectory};
use serde::Serialize;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "rollcall", about = "Face enrollment and photo attendance")]
struct Cli {
    /// TOML config file (overrides ROLLCALL_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a student in the directory
    AddStudent {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        course: String,
        #[arg(long)]
        class_year: String,
        #[arg(long)]
        division: String,
    },
    /// Enroll a student's face from a photo
    Enroll {
        #[arg(long)]
        student: String,
        image: PathBuf,
        /// The file holds base64 text (a data URI header is allowed)
        #[arg(long)]
        base64: bool,
    },
    /// Check a photo against a student's enrolled face
    Verify {
        #[arg(long)]
        student: String,
        image: PathBuf,
        #[arg(long)]
        base64: bool,
    },
    /// Mark everyone recognized in the photos present
    Identify {
        #[arg(long)]
        course: String,
        #[arg(long)]
        class_year: String,
        #[arg(long)]
        division: Option<String>,
        #[arg(long)]
        subject: String,
        /// Attendance date, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(required = true)]
        images: Vec<PathBuf>,
        #[arg(long)]
        base64: bool,
    },
    /// Show a student's enrollment state
    Status {
        #[arg(long)]
        student: String,
    },
    /// List attendance recorded for a subject
    Attendance {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    tracing::debug!(?config, "configuration resolved");

    let directory = open_directory(&config)?;

    match cli.command {
        Commands::AddStudent {
            id,
            name,
            course,
            class_year,
            division,
        } => {
            directory.add_student(&NewStudent {
                student_id: id.clone(),
                name,
                course,
                class_year,
                division,
            })?;
            println!("added student {id}");
        }
        Commands::Status { student } => {
            let record = directory
                .student(&student)?
                .with_context(|| format!("student {student} not found"))?;
            print_json(&record)?;
        }
        Commands::Attendance { subject, date } => {
            let rows = directory.attendance_for(&subject, date.unwrap_or_else(today))?;
            print_json(&rows)?;
        }
        Commands::Enroll {
            student,
            image,
            base64,
        } => {
            let image = read_image(&image, base64)?;
            let engine = start_engine(&config, directory)?;
            let record = engine.enroll(student, image).await?;
            print_json(&record)?;
        }
        Commands::Verify {
            student,
            image,
            base64,
        } => {
            let image = read_image(&image, base64)?;
            let engine = start_engine(&config, directory)?;
            let verification = engine.verify(student, image).await?;
            print_json(&verification)?;
            if !verification.is_verified() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Identify {
            course,
            class_year,
            division,
            subject,
            date,
            images,
            base64,
        } => {
            let images = images
                .iter()
                .map(|path| read_image(path, base64))
                .collect::<Result<Vec<_>>>()?;
            let mut filter = PopulationFilter::new(course, class_year);
            if let Some(division) = division {
                filter = filter.with_division(division);
            }
            let engine = start_engine(&config, directory)?;
            let report = engine
                .mark_present(filter, subject, date.unwrap_or_else(today), images)
                .await?;
            print_json(&report)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn open_directory(config: &Config) -> Result<SqliteDirectory> {
    if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    SqliteDirectory::open(&config.db_path)
        .with_context(|| format!("opening directory {}", config.db_path.display()))
}

fn start_engine(config: &Config, directory: SqliteDirectory) -> Result<engine::EngineHandle> {
    let pipeline = engine::load_pipeline(config)?;
    let handle = engine::spawn_engine(
        pipeline,
        directory,
        EuclideanMatcher::new(config.match_threshold),
    )?;
    Ok(handle)
}

/// Raw image bytes, or base64 text when `base64` is set.
fn read_image(path: &Path, base64: bool) -> Result<ImageInput> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    if base64 {
        let text = String::from_utf8(bytes)
            .with_context(|| format!("{} is not base64 text", path.display()))?;
        Ok(ImageInput::Base64(text))
    } else {
        Ok(ImageInput::Bytes(bytes))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
