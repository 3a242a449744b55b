//! Sessionweave CLI - Command-line interface for the session engine
//!
//! Commands:
//! - transform: Reconstruct sessions from a raw event file
//! - validate: Check a raw event file against the input contract
//! - schema: Print input/output schema information

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use sessionweave::schema::{RawEventAdapter, RecordWriter};
use sessionweave::{
    reconstruct_device_stream, EngineError, FilterConfig, RawEvent, TimezoneMode, ENGINE_VERSION,
};

/// Sessionweave - Deterministic session reconstruction for app-usage events
#[derive(Parser)]
#[command(name = "sessionweave")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Reconstruct app-usage sessions from interaction events", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct sessions from a raw event file
    Transform {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "csv")]
        output_format: OutputFormat,

        /// Engine configuration as a JSON file; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the output timezone ("utc", "strip", or an IANA zone)
        #[arg(long)]
        timezone: Option<String>,

        /// Also write surviving interior detail events (NDJSON) to this path
        #[arg(long)]
        detail_output: Option<PathBuf>,
    },

    /// Check a raw event file against the input contract
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Engine configuration as a JSON file; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print schema information
    Schema {
        /// Schema to print
        #[arg(value_enum)]
        schema_type: SchemaType,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
    /// CSV with a header row
    Csv,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// CSV with a header row
    Csv,
    /// Newline-delimited JSON (one record per line)
    Ndjson,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Raw event input schema
    Input,
    /// Session record output schema
    Output,
}

enum CliError {
    Engine(EngineError),
    Io(io::Error),
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        CliError::Engine(e)
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Engine(e) => write!(f, "{e}"),
            CliError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Transform {
            input,
            output,
            input_format,
            output_format,
            config,
            timezone,
            detail_output,
        } => cmd_transform(
            &input,
            &output,
            input_format,
            output_format,
            config.as_deref(),
            timezone.as_deref(),
            detail_output.as_deref(),
        ),
        Commands::Validate {
            input,
            input_format,
            config,
        } => cmd_validate(&input, input_format, config.as_deref()),
        Commands::Schema { schema_type } => cmd_schema(schema_type),
    }
}

fn cmd_transform(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    config: Option<&Path>,
    timezone: Option<&str>,
    detail_output: Option<&Path>,
) -> Result<(), CliError> {
    let config = load_config(config, timezone)?;
    let events = read_events(input, input_format)?;

    let run = reconstruct_device_stream(&events, &config)?;

    let rendered = match output_format {
        OutputFormat::Csv => RecordWriter::write_csv(&run.records)?,
        OutputFormat::Ndjson => RecordWriter::write_ndjson(&run.records)?,
    };
    write_output(output, &rendered)?;

    if let Some(detail_path) = detail_output {
        let detail = RecordWriter::write_events_ndjson(&run.detail_events)?;
        write_output(detail_path, &detail)?;
    }

    eprintln!(
        "{}",
        serde_json::to_string_pretty(&run.summary).map_err(EngineError::from)?
    );
    Ok(())
}

fn cmd_validate(
    input: &Path,
    input_format: InputFormat,
    config: Option<&Path>,
) -> Result<(), CliError> {
    let config = load_config(config, None)?;
    let events = read_events(input, input_format)?;

    // Contract enforcement without running the full pipeline
    let normalized = sessionweave::normalizer::Normalizer::normalize(&events, &config)?;
    println!("{} events, input contract satisfied", normalized.len());
    Ok(())
}

fn cmd_schema(schema_type: SchemaType) -> Result<(), CliError> {
    let schema = match schema_type {
        SchemaType::Input => serde_json::json!({
            "description": "raw interaction event",
            "fields": {
                "device_id": "string, required",
                "app_package": "string, required",
                "app_label": "string, optional",
                "timestamp": "RFC3339 timestamp, required",
                "interaction_type": "snake_case interaction type, required",
                "event_timezone": "IANA zone name, optional",
            }
        }),
        SchemaType::Output => serde_json::json!({
            "description": "assembled usage-session record",
            "ordering": "device_id, app_package, start_time",
            "fields": {
                "device_id": "string",
                "app_package": "string",
                "app_label": "string ('filtered' for filtered apps)",
                "is_filtered_app": "bool",
                "start_time": "timestamp in the configured presentation zone",
                "end_time": "timestamp, empty when unterminated",
                "duration_seconds": "number, empty when unknown",
                "duration_minutes": "number, empty when unknown",
                "termination_reason": "explicit_stop_event | next_event_implicit | device_shutdown | end_of_stream_unterminated",
                "flags": "'; '-joined anomaly flags",
                "preceding_gap_hours": "number",
                "app_session_count": "integer",
                "duration_rank": "integer, 1 = longest for the app",
                "any_app_new_engage_30s": "bool",
                "any_app_new_engage_custom": "bool",
                "any_app_switched_app": "bool",
                "any_app_usage_time_gap_hours": "number",
                "valid_app_new_engage_30s": "bool",
                "valid_app_new_engage_custom": "bool",
                "valid_app_switched_app": "bool",
                "valid_app_usage_time_gap_hours": "number",
            }
        }),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&schema).map_err(EngineError::from)?
    );
    Ok(())
}

fn load_config(path: Option<&Path>, timezone: Option<&str>) -> Result<FilterConfig, CliError> {
    let mut config = match path {
        Some(path) => {
            let data = fs::read_to_string(path)?;
            serde_json::from_str(&data).map_err(EngineError::from)?
        }
        None => FilterConfig::default(),
    };
    if let Some(zone) = timezone {
        config.timezone = parse_timezone(zone)?;
    }
    Ok(config)
}

fn parse_timezone(zone: &str) -> Result<TimezoneMode, CliError> {
    match zone {
        "utc" | "UTC" => Ok(TimezoneMode::Utc),
        "strip" => Ok(TimezoneMode::Strip),
        other => other
            .parse::<chrono_tz::Tz>()
            .map(TimezoneMode::Convert)
            .map_err(|_| CliError::Engine(EngineError::InvalidTimezone(other.to_string()))),
    }
}

fn read_events(input: &Path, input_format: InputFormat) -> Result<Vec<RawEvent>, CliError> {
    let data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let events = match input_format {
        InputFormat::Ndjson => RawEventAdapter::parse_ndjson(&data)?,
        InputFormat::Json => RawEventAdapter::parse_array(&data)?,
        InputFormat::Csv => RawEventAdapter::parse_csv(&data)?,
    };
    Ok(events)
}

fn write_output(output: &Path, rendered: &str) -> Result<(), CliError> {
    if output.to_string_lossy() == "-" {
        io::stdout().write_all(rendered.as_bytes())?;
    } else {
        fs::write(output, rendered)?;
    }
    Ok(())
}
