//! labguard command-line interface.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use labguard_core::knowledge::{is_valid_knowledge_base, validate_knowledge_base_schema};
use labguard_core::KnowledgeBase;
use labguard_runtime::{CommandOcrEngine, IngestConfig, IngestError, IngestReport, Ingestor};

#[derive(Debug, Parser)]
#[command(
    name = "labguard",
    version,
    about = "Normalize, validate and summarize laboratory reports"
)]
struct Cli {
    /// Knowledge base file (.yaml, .yml or .json); the built-in one when omitted
    #[arg(long, global = true, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    kb: Option<PathBuf>,

    /// Ingestion/pipeline settings (YAML)
    #[arg(long, global = true, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// More log output on stderr (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only warnings and errors on stderr
    #[arg(short, long, global = true, default_value_t = false)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process report text
    Process {
        /// Literal report text
        #[arg(long = "text", value_name = "TEXT", conflicts_with = "input")]
        text: Option<String>,

        /// Read report text from a file, or `-` for stdin
        #[arg(long = "input", short = 'i', value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
        input: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Process a JSON request body of the form {"text": "..."}
    ProcessJson {
        /// Request file, or `-` for stdin
        #[arg(long = "input", short = 'i', value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
        input: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// OCR an image of a report, then process the recognised text
    Image {
        #[arg(value_name = "IMAGE", value_hint = clap::ValueHint::FilePath)]
        image: PathBuf,

        /// OCR program, run as `<program> [ARGS..] --strategy <s> <image>`
        #[arg(long = "ocr-command", value_name = "PROGRAM")]
        ocr_command: String,

        /// Extra argument for the OCR program (repeatable)
        #[arg(long = "ocr-arg", value_name = "ARG", allow_hyphen_values = true)]
        ocr_args: Vec<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Knowledge base tools
    Kb {
        #[command(subcommand)]
        command: KbCommand,
    },
}

#[derive(Debug, Subcommand)]
enum KbCommand {
    /// Validate a knowledge base file against the schema and structural rules
    Check {
        #[arg(value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,
    },

    /// List the canonical tests of the active knowledge base
    List,
}

#[derive(Debug, Args)]
struct OutputArgs {
    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Text,
}

#[derive(Debug, Default, Deserialize)]
struct TextRequest {
    #[serde(default)]
    text: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Some("labguard=warn"),
        (false, 0) => None,
        (false, 1) => Some("labguard=debug"),
        (false, _) => Some("labguard=trace"),
    };
    let filter = match level {
        Some(directive) => EnvFilter::new(directive),
        None => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("labguard=info"))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Process {
            text,
            input,
            output,
        } => {
            let ingestor = build_ingestor(cli.kb.as_deref(), cli.config.as_deref())?;
            let text = read_input_text(text.as_ref(), input.as_ref())?;
            Ok(emit(ingestor.ingest_text(&text), output.format))
        }
        Command::ProcessJson { input, output } => {
            let ingestor = build_ingestor(cli.kb.as_deref(), cli.config.as_deref())?;
            let body = read_input_text(None, input.as_ref())?;
            let request: TextRequest =
                serde_json::from_str(&body).context("Request body is not valid JSON")?;
            let text = request.text.unwrap_or_default();
            Ok(emit(ingestor.ingest_text(&text), output.format))
        }
        Command::Image {
            image,
            ocr_command,
            ocr_args,
            output,
        } => {
            let engine = CommandOcrEngine::new(ocr_command).with_args(ocr_args);
            let ingestor = build_ingestor(cli.kb.as_deref(), cli.config.as_deref())?
                .with_engine(Arc::new(engine));

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            debug!(image = %image.display(), "starting image ingestion");
            let result = runtime.block_on(ingestor.ingest_image(&image));
            Ok(emit(result, output.format))
        }
        Command::Kb { command } => match command {
            KbCommand::Check { file } => check_kb(&file),
            KbCommand::List => {
                let kb = load_kb(cli.kb.as_deref())?;
                list_kb(&kb);
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}

fn load_kb(path: Option<&Path>) -> Result<KnowledgeBase> {
    match path {
        Some(path) if is_json(path) => KnowledgeBase::from_json_file(path)
            .with_context(|| format!("Failed to load knowledge base {}", path.display())),
        Some(path) => KnowledgeBase::from_yaml_file(path)
            .with_context(|| format!("Failed to load knowledge base {}", path.display())),
        None => {
            debug!("using built-in knowledge base");
            Ok(KnowledgeBase::builtin()?.clone())
        }
    }
}

fn build_ingestor(kb: Option<&Path>, config: Option<&Path>) -> Result<Ingestor> {
    let kb = Arc::new(load_kb(kb)?);
    let config = match config {
        Some(path) => IngestConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => IngestConfig::default(),
    };
    Ok(Ingestor::new(kb, config)?)
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Print a result and map it to the process exit code.
///
/// Success is 0, a request with no usable text is 2, anything else is 1.
fn emit(result: Result<IngestReport, IngestError>, format: Format) -> ExitCode {
    match result {
        Ok(report) => {
            match format {
                Format::Json => match serde_json::to_value(&report) {
                    Ok(mut value) => {
                        if let Some(object) = value.as_object_mut() {
                            object.insert("status".to_string(), json!("ok"));
                        }
                        println!("{}", value);
                    }
                    Err(e) => {
                        eprintln!("error: failed to serialize report: {}", e);
                        return ExitCode::FAILURE;
                    }
                },
                Format::Text => print!("{}", render_text(&report)),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            match format {
                Format::Json => println!(
                    "{}",
                    json!({ "status": "error", "code": e.code(), "reason": e.to_string() })
                ),
                Format::Text => println!("error [{}]: {}", e.code(), e),
            }
            ExitCode::from(failure_code(&e))
        }
    }
}

fn failure_code(error: &IngestError) -> u8 {
    if error.is_input_failure() {
        2
    } else {
        1
    }
}

fn render_text(report: &IngestReport) -> String {
    let outcome = &report.outcome;
    let mut out = String::new();

    for test in &outcome.tests {
        out.push_str(&format!(
            "{}: {} {} [{}] (ref {}-{})\n    {}\n",
            test.name,
            test.value,
            test.unit,
            test.status,
            test.ref_range.low,
            test.ref_range.high,
            test.explanation
        ));
    }

    if !outcome.rejected.is_empty() {
        out.push_str("Rejected:\n");
        for rejection in &outcome.rejected {
            out.push_str(&format!(
                "    {:?} {}: {}\n",
                rejection.text, rejection.reason, rejection.detail
            ));
        }
    }

    out.push_str(&format!(
        "Confidence: {:.2}\n\n{}\n",
        outcome.confidence, outcome.summary
    ));
    out
}

/// Result of checking a knowledge base document.
#[derive(Debug)]
enum KbCheck {
    Valid(KnowledgeBase),
    SchemaErrors(Vec<String>),
    Rejected(String),
}

fn inspect_kb(contents: &str, json: bool) -> Result<KbCheck> {
    let document: serde_json::Value = if json {
        serde_json::from_str(contents).context("Invalid JSON")?
    } else {
        serde_yaml::from_str(contents).context("Invalid YAML")?
    };

    if !is_valid_knowledge_base(&document) {
        let errors = validate_knowledge_base_schema(&document)
            .err()
            .unwrap_or_default();
        return Ok(KbCheck::SchemaErrors(errors));
    }

    let parsed = if json {
        KnowledgeBase::from_json(contents)
    } else {
        KnowledgeBase::from_yaml(contents)
    };

    Ok(match parsed {
        Ok(kb) => KbCheck::Valid(kb),
        Err(e) => KbCheck::Rejected(e.to_string()),
    })
}

fn check_kb(path: &Path) -> Result<ExitCode> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    match inspect_kb(&contents, is_json(path))? {
        KbCheck::Valid(kb) => {
            println!(
                "{}: ok ({} v{}, {} tests)",
                path.display(),
                kb.name,
                kb.kb_version,
                kb.tests().len()
            );
            Ok(ExitCode::SUCCESS)
        }
        KbCheck::SchemaErrors(errors) => {
            for error in &errors {
                println!("schema: {}", error);
            }
            println!("{}: {} schema error(s)", path.display(), errors.len());
            Ok(ExitCode::FAILURE)
        }
        KbCheck::Rejected(reason) => {
            println!("{}: {}", path.display(), reason);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn list_kb(kb: &KnowledgeBase) {
    println!("{} v{}", kb.name, kb.kb_version);
    for test in kb.tests() {
        let units = test.all_units().collect::<Vec<_>>().join(", ");
        println!(
            "  {:<26} {:<28} {:<18} {}-{}",
            test.id, test.name, units, test.range.low, test.range.high
        );
        if !test.aliases.is_empty() {
            println!("  {:<26} aka {}", "", test.aliases.join(", "));
        }
    }
}

fn read_input_text(text: Option<&String>, input: Option<&PathBuf>) -> Result<String> {
    if let Some(literal) = text {
        return Ok(literal.to_string());
    }

    match input {
        Some(path) if path.as_path() == Path::new("-") => read_stdin(),
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file {}", path.display())),
        None => {
            if std::io::stdin().is_terminal() {
                anyhow::bail!("No input provided. Use --text, --input, or pipe text via stdin.");
            }
            read_stdin()
        }
    }
}

// Empty input is passed through; the pipeline reports it as InputEmpty.
fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read stdin")?;
    Ok(buffer)
}
