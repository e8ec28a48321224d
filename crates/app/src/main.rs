use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use grader_core::model::{PartLabel, Qtag, UnitId};
use services::{
    AppServices, Clock, GradeOptions, GradescopeResults, GradingController, UnitProvider,
    compute_scores, read_submission,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod render;

use config::{Overrides, Settings};

const DEFAULT_LOG_FILTER: &str = "llmgrader=info,services=info,storage=info";

/// Grade engineering homework with an LLM and package the results.
#[derive(Parser, Debug)]
#[command(name = "llmgrader")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, env = "LLMGRADER_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database URL or path
    #[arg(long = "db", global = true, env = "LLMGRADER_DB_URL")]
    db_url: Option<String>,

    /// Keep session state as JSON files in this directory instead of the database
    #[arg(long, global = true, env = "LLMGRADER_SESSION_DIR")]
    session_dir: Option<PathBuf>,

    /// Directory holding one subdirectory per unit
    #[arg(long, global = true, env = "LLMGRADER_UNITS_ROOT")]
    units_root: Option<PathBuf>,

    /// OpenAI-compatible API base URL
    #[arg(long, global = true, env = "LLMGRADER_API_BASE_URL")]
    api_base_url: Option<String>,

    /// API key for the grading service
    #[arg(long, global = true, env = "LLMGRADER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Student file whose solutions fill questions left blank
    #[arg(long, global = true, env = "LLMGRADER_STUDENT_FILE")]
    student_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available units
    Units,
    /// Show a question with its solution and grading state
    Show {
        unit: UnitId,
        #[arg(long)]
        qtag: Option<Qtag>,
        #[arg(long)]
        part: Option<PartLabel>,
    },
    /// Print the points table for a unit
    Status { unit: UnitId },
    /// Save a solution for a question
    Solve {
        unit: UnitId,
        qtag: Qtag,
        /// Solution text
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,
        /// Read the solution from a file
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Grade the saved solution of a question
    Grade {
        unit: UnitId,
        qtag: Qtag,
        /// Part to grade; defaults to the whole question
        #[arg(long)]
        part: Option<PartLabel>,
        #[arg(long, env = "LLMGRADER_MODEL")]
        model: Option<String>,
        /// Grading timeout in seconds
        #[arg(long, env = "LLMGRADER_TIMEOUT_SECS")]
        timeout: Option<u64>,
    },
    /// Replace a unit's stored results with an exported results file
    ImportResults { unit: UnitId, file: PathBuf },
    /// Write a unit's stored results as JSON
    ExportResults {
        unit: UnitId,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Build the submission archive for a unit
    Submit {
        unit: UnitId,
        /// Archive path; defaults to `submission_<unit>.zip`
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Score a submission archive or record and write Gradescope results
    Autograde {
        unit: UnitId,
        /// `submission_<unit>.zip` or `submission_<unit>.json`
        submission: PathBuf,
        #[arg(long, default_value = "results/results.json")]
        out: PathBuf,
    },
    /// Show recent grading calls
    Log {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

impl Cli {
    fn overrides(&self) -> Overrides {
        let (model, timeout_secs) = match &self.command {
            Command::Grade { model, timeout, .. } => (model.clone(), *timeout),
            _ => (None, None),
        };
        Overrides {
            db_url: self.db_url.clone(),
            session_dir: self.session_dir.clone(),
            units_root: self.units_root.clone(),
            api_base_url: self.api_base_url.clone(),
            model,
            timeout_secs,
            api_key: self.api_key.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let config_file = config::config_path(cli.config.as_deref());
    if let Some(path) = &config_file {
        debug!(path = %path.display(), "using config file");
    }
    let file = config::load_file(config_file.as_deref())?;
    let settings = Settings::resolve(cli.overrides(), file, |name| std::env::var(name).ok())?;

    let db_url = normalize_sqlite_url(&settings.db_url);
    prepare_sqlite_file(&db_url)?;
    info!(db = %db_url, units = %settings.units_root.display(), "starting");

    let services = AppServices::new_sqlite(
        &db_url,
        &settings.units_root,
        settings.grader_config(),
        Clock::system(),
    )
    .await
    .context("failed to initialize services")?;
    let services = match &settings.session_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "storing sessions as files");
            services.with_session_dir(dir)
        }
        None => services,
    };
    let mut controller = services.controller().await;
    if let Some(path) = &cli.student_file {
        load_student_file(&mut controller, path).await?;
    }

    match cli.command {
        Command::Units => {
            for id in controller.load_units().await? {
                println!("{id}");
            }
        }
        Command::Show { unit, qtag, part } => {
            open(&mut controller, &unit, qtag.as_ref()).await?;
            if let Some(part) = part {
                controller.select_part(&part)?;
            }
            print_question(&controller)?;
        }
        Command::Status { unit } => {
            controller.select_unit(&unit).await?;
            let table = controller
                .unit_table()
                .ok_or_else(|| anyhow!("unit {unit} is not loaded"))?;
            print!("{}", render::unit_table(&table));
        }
        Command::Solve {
            unit,
            qtag,
            text,
            file,
        } => {
            let solution = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => bail!("either --text or --file is required"),
            };
            open(&mut controller, &unit, Some(&qtag)).await?;
            controller.edit_solution(solution).await?;
            fail_on_inline_error(&controller)?;
            println!("saved solution for {unit}/{qtag}");
        }
        Command::Grade {
            unit, qtag, part, ..
        } => {
            open(&mut controller, &unit, Some(&qtag)).await?;
            if let Some(part) = part {
                controller.select_part(&part)?;
            }
            let options = GradeOptions {
                model: settings.model.clone(),
                api_key: settings.api_key.clone(),
                timeout: Some(settings.http_timeout()),
            };
            let verdict = controller.submit_grade(options).await?;
            print!("{}", render::verdict(&verdict));
            fail_on_inline_error(&controller)?;
        }
        Command::ImportResults { unit, file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            controller.select_unit(&unit).await?;
            let count = controller.import_results(&bytes).await?;
            fail_on_inline_error(&controller)?;
            println!("imported {count} entries into {unit}");
        }
        Command::ExportResults { unit, out } => {
            controller.select_unit(&unit).await?;
            let json = controller.export_results()?;
            match out {
                Some(path) => write_file(&path, json.as_bytes()).await?,
                None => println!("{json}"),
            }
        }
        Command::Submit { unit, out } => {
            controller.select_unit(&unit).await?;
            let submission = controller.export_submission()?;
            let path = out.unwrap_or_else(|| PathBuf::from(submission.archive_name()));
            write_file(&path, &submission.to_archive()?).await?;
            println!(
                "wrote {} ({} questions)",
                path.display(),
                submission.record().len()
            );
        }
        Command::Autograde {
            unit,
            submission,
            out,
        } => {
            let results = autograde(services.units().as_ref(), &unit, &submission).await;
            write_file(&out, results.to_json()?.as_bytes()).await?;
            println!("score {} written to {}", results.score, out.display());
        }
        Command::Log { limit } => {
            let events = services.grade_log().recent(limit).await?;
            print!("{}", render::events(&events));
        }
    }
    Ok(())
}

async fn load_student_file(controller: &mut GradingController, path: &Path) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let count = controller
        .import_student_file(&bytes)
        .with_context(|| format!("invalid student file {}", path.display()))?;
    debug!(path = %path.display(), questions = count, "loaded student file");
    Ok(())
}

/// Score a submission; any failure becomes a zero-score results payload.
async fn autograde(units: &dyn UnitProvider, unit: &UnitId, submission: &Path) -> GradescopeResults {
    let outcome = async {
        let unit = units.get_unit(unit).await?;
        let bytes = tokio::fs::read(submission)
            .await
            .with_context(|| format!("failed to read {}", submission.display()))?;
        let record = read_submission(&bytes)?;
        anyhow::Ok(compute_scores(&unit, &record))
    }
    .await;

    outcome.unwrap_or_else(|err| {
        warn!(error = %err, "autograding failed");
        GradescopeResults::error(err)
    })
}

async fn open(controller: &mut GradingController, unit: &UnitId, qtag: Option<&Qtag>) -> Result<()> {
    controller.select_unit(unit).await?;
    if let Some(qtag) = qtag {
        controller.select_question(qtag)?;
    }
    Ok(())
}

fn print_question(controller: &GradingController) -> Result<()> {
    let view = controller
        .question_view()
        .ok_or_else(|| anyhow!("no question selected"))?;
    print!("{}", render::question(&view));
    Ok(())
}

fn fail_on_inline_error(controller: &GradingController) -> Result<()> {
    match controller.context().last_error() {
        Some(err) => Err(anyhow!("{err}")),
        None => Ok(()),
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}

fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("sqlite://") || trimmed.starts_with("sqlite::memory:") {
        return trimmed.to_string();
    }
    if trimmed.starts_with("sqlite:file:") {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Create the database file and its parent directory so sqlx can open it.
fn prepare_sqlite_file(db_url: &str) -> Result<()> {
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        bail!("invalid database url: {db_url}");
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use grader_core::model::{Part, Question, Unit};
    use grader_core::time::fixed_clock;
    use services::{InMemoryUnitProvider, OpenAiGrader, OpenAiGraderConfig};
    use storage::Storage;

    use super::*;

    fn unit1() -> Unit {
        Unit::new(
            UnitId::new("unit1"),
            vec![
                Question::new("q1", true, vec![Part::new("a", 5), Part::new("b", 5)]).unwrap(),
                Question::new("q2", false, Vec::new()).unwrap().with_points(2),
            ],
        )
        .unwrap()
    }

    fn in_memory_services() -> AppServices {
        let units: Arc<dyn UnitProvider> = Arc::new(InMemoryUnitProvider::new([unit1()]));
        let grader = Arc::new(OpenAiGrader::new(
            OpenAiGraderConfig::default(),
            Arc::clone(&units),
        ));
        AppServices::from_parts(fixed_clock(), Storage::in_memory(), units, grader)
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn grade_flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "llmgrader", "grade", "unit1", "q1", "--part", "a", "--model", "gpt-4o", "--timeout",
            "40",
        ])
        .unwrap();
        let overrides = cli.overrides();
        assert_eq!(overrides.model.as_deref(), Some("gpt-4o"));
        assert_eq!(overrides.timeout_secs, Some(40));
    }

    #[test]
    fn solve_needs_text_or_file() {
        assert!(Cli::try_parse_from(["llmgrader", "solve", "unit1", "q1"]).is_err());
        assert!(
            Cli::try_parse_from(["llmgrader", "solve", "unit1", "q1", "--text", "x", "--file", "f"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["llmgrader", "solve", "unit1", "q1", "--text", "x"]).is_ok());
    }

    #[test]
    fn blank_ids_are_rejected() {
        assert!(Cli::try_parse_from(["llmgrader", "status", "  "]).is_err());
    }

    #[test]
    fn student_file_and_autograde_flags_parse() {
        let cli = Cli::try_parse_from([
            "llmgrader", "show", "unit1", "--student-file", "answers.json",
        ])
        .unwrap();
        assert_eq!(cli.student_file, Some(PathBuf::from("answers.json")));

        let cli = Cli::try_parse_from(["llmgrader", "autograde", "unit1", "submission_unit1.zip"])
            .unwrap();
        match cli.command {
            Command::Autograde {
                submission, out, ..
            } => {
                assert_eq!(submission, PathBuf::from("submission_unit1.zip"));
                assert_eq!(out, PathBuf::from("results/results.json"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[tokio::test]
    async fn student_file_fills_blank_solutions_in_the_view() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answers.json");
        std::fs::write(&path, r#"{"q1": {"solution": "V = IR"}}"#).unwrap();

        let services = in_memory_services();
        let mut controller = services.controller().await;
        load_student_file(&mut controller, &path).await.unwrap();
        open(&mut controller, &UnitId::new("unit1"), Some(&Qtag::new("q1")))
            .await
            .unwrap();

        let view = controller.question_view().unwrap();
        assert_eq!(view.student_solution, "V = IR");
        assert!(render::question(&view).contains("V = IR"));
    }

    #[tokio::test]
    async fn malformed_student_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answers.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let services = in_memory_services();
        let mut controller = services.controller().await;
        assert!(load_student_file(&mut controller, &path).await.is_err());
        assert!(
            load_student_file(&mut controller, &dir.path().join("missing.json"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn autograde_scores_required_questions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("submission_unit1.json");
        std::fs::write(
            &path,
            r#"{"q1": {"parts": {"a": {"grade_status": "pass"}, "b": {"grade_status": "fail"}}},
                "q2": {"parts": {"all": {"grade_status": "pass"}}}}"#,
        )
        .unwrap();

        let services = in_memory_services();
        let results = autograde(services.units().as_ref(), &UnitId::new("unit1"), &path).await;
        assert_eq!(results.score, 5);
        assert_eq!(results.max_score, 10);
        assert_eq!(results.tests.len(), 1);
        assert_eq!(results.tests[0].name, "q1");
    }

    #[tokio::test]
    async fn autograde_failures_write_a_zero_score() {
        let dir = tempfile::tempdir().unwrap();
        let services = in_memory_services();

        let missing = dir.path().join("submission_unit1.json");
        let results = autograde(services.units().as_ref(), &UnitId::new("unit1"), &missing).await;
        assert_eq!(results.score, 0);
        assert!(results.tests.is_empty());
        assert!(results.output.starts_with("Autograder error: "));

        let results = autograde(services.units().as_ref(), &UnitId::new("nope"), &missing).await;
        assert!(results.output.contains("nope"));
    }

    #[test]
    fn relative_paths_become_absolute_urls() {
        let url = normalize_sqlite_url("data/grades.sqlite3");
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/grades.sqlite3"));
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(normalize_sqlite_url("sqlite:///tmp/x.db"), "sqlite:///tmp/x.db");
    }

    #[test]
    fn prepare_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("grades.sqlite3");
        prepare_sqlite_file(&format!("sqlite://{}", path.display())).unwrap();
        assert!(path.exists());
        prepare_sqlite_file("sqlite::memory:").unwrap();
    }
}
