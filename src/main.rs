//! Command-line entry point for `purpleair`.
//!
//! Startup sequence:
//! - Load `.env` and initialize structured logging (to stderr)
//! - Load configuration from environment variables
//! - Run one subcommand against the PurpleAir API or the sample database
//!
//! API responses are printed to stdout as pretty JSON, or verbatim for
//! non-JSON bodies. `history --csv` streams the export line by line.
//!
//! # Environment Variables
//! See [`purpleair_datautil::config::load_from_env`], plus:
//! - `PURPLEAIR_LOG_LEVEL` (optional): log verbosity (default: `info`)
//! - `PURPLEAIR_SPAN_EVENTS` (optional): span event mode for tracing
use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use chrono::DateTime;
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use purpleair_datautil::api::{
    ApiResponse, Average, FieldGroup, HistoryQuery, PurpleAirClient, SensorsQuery,
};
use purpleair_datautil::config::{self, Config};
use purpleair_datautil::models::{PlatformRecord, SampleModel};
use purpleair_datautil::{schema, store, SchemaConverter};

// ---

#[derive(Debug, Parser)]
#[command(name = "purpleair", version, about = "PurpleAir API client and sample storage tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the organization that owns the API key
    Organization,

    /// Latest data for one sensor
    Sensor {
        sensor_index: u64,
        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Latest data for many sensors
    Sensors {
        /// Sensor indices to include
        #[arg(long = "index", value_delimiter = ',')]
        sensor_indices: Vec<u64>,
        /// Restrict output to these sensor indices
        #[arg(long, value_delimiter = ',')]
        show_only: Vec<u64>,
        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Historical readings for one sensor
    History {
        sensor_index: u64,
        /// Start time, epoch seconds or RFC 3339
        #[arg(long, value_parser = parse_timestamp)]
        start: i64,
        /// End time, epoch seconds or RFC 3339
        #[arg(long, value_parser = parse_timestamp)]
        end: i64,
        /// Averaging window in minutes
        #[arg(long)]
        average: Option<Average>,
        /// Stream the CSV export instead of JSON
        #[arg(long)]
        csv: bool,
        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Manage sensor groups
    #[command(subcommand)]
    Groups(GroupCommand),

    /// Create the sample tables
    InitDb,

    /// Validate samples from a JSON file and store them
    ImportSamples {
        /// A JSON object or array of objects
        file: PathBuf,
    },

    /// Load a stored sample and print it as a record
    ShowSample { row_id: i64 },

    /// Flatten platform records from a JSON file into one line per observation
    Observations {
        /// A JSON platform record or array of them
        file: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum GroupCommand {
    List,
    Create {
        name: String,
    },
    Get {
        group_id: u64,
    },
    Rename {
        group_id: u64,
        #[arg(long)]
        name: Option<String>,
    },
    Delete {
        group_id: u64,
    },
    AddMember {
        group_id: u64,
        sensor_index: u64,
    },
    RemoveMember {
        group_id: u64,
        member_id: u64,
    },
    /// Latest data for every member of a group
    MembersData {
        group_id: u64,
        /// Only members modified since this time
        #[arg(long, value_parser = parse_timestamp)]
        modified_since: Option<i64>,
        #[command(flatten)]
        fields: FieldArgs,
    },
    MemberData {
        group_id: u64,
        member_id: u64,
        #[command(flatten)]
        fields: FieldArgs,
    },
}

#[derive(Debug, Args)]
struct FieldArgs {
    /// Field names to request
    #[arg(long, value_delimiter = ',')]
    fields: Vec<String>,
    /// Named field groups to request (e.g. pm2.5, environment)
    #[arg(long = "field-group", value_delimiter = ',')]
    field_groups: Vec<FieldGroup>,
}

impl FieldArgs {
    fn names(&self) -> Vec<String> {
        // ---
        let mut names = self.fields.clone();
        for group in &self.field_groups {
            names.extend(group.fields().iter().map(|f| f.to_string()));
        }
        names
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_from_env()?;
    cfg.log_config();

    match cli.command {
        Command::InitDb => {
            let pool = connect(&cfg).await?;
            schema::create_schema(&pool).await?;
        }
        Command::ImportSamples { file } => import_samples(&cfg, &file).await?,
        Command::ShowSample { row_id } => show_sample(&cfg, row_id).await?,
        Command::Observations { file } => print_observations(&file)?,
        command => run_api(&cfg, command).await?,
    }
    Ok(())
}

async fn run_api(cfg: &Config, command: Command) -> Result<()> {
    // ---
    let client = PurpleAirClient::new(cfg.require_api_key()?, cfg.client_options())?;

    let response = match command {
        Command::Organization => client.get_organization().await?,
        Command::Sensor {
            sensor_index,
            fields,
        } => {
            let names = fields.names();
            client.get_sensor(sensor_index, &as_strs(&names)).await?
        }
        Command::Sensors {
            sensor_indices,
            show_only,
            fields,
        } => {
            let filter = SensorsQuery {
                sensor_indices,
                show_only,
                fields: fields.names(),
            };
            client.get_sensors(&filter).await?
        }
        Command::History {
            sensor_index,
            start,
            end,
            average,
            csv,
            fields,
        } => {
            let mut history = HistoryQuery::new(start, end).fields(fields.names());
            if let Some(average) = average {
                history = history.average(average);
            }
            if !csv {
                client.get_sensor_history(sensor_index, &history).await?
            } else {
                let mut lines = client.stream_sensor_history_csv(sensor_index, &history).await?;
                while let Some(line) = lines.next_line().await? {
                    println!("{line}");
                }
                return Ok(());
            }
        }
        Command::Groups(group) => run_group(&client, group).await?,
        Command::InitDb
        | Command::ImportSamples { .. }
        | Command::ShowSample { .. }
        | Command::Observations { .. } => {
            return Err(anyhow!("not an API command"));
        }
    };

    print_response(&response)
}

async fn run_group(client: &PurpleAirClient, command: GroupCommand) -> Result<ApiResponse> {
    // ---
    let response = match command {
        GroupCommand::List => client.list_groups().await?,
        GroupCommand::Create { name } => client.create_group(&name).await?,
        GroupCommand::Get { group_id } => client.get_group(group_id).await?,
        GroupCommand::Rename { group_id, name } => {
            client.update_group(group_id, name.as_deref()).await?
        }
        GroupCommand::Delete { group_id } => client.delete_group(group_id).await?,
        GroupCommand::AddMember {
            group_id,
            sensor_index,
        } => client.add_member(group_id, sensor_index).await?,
        GroupCommand::RemoveMember {
            group_id,
            member_id,
        } => client.remove_member(group_id, member_id).await?,
        GroupCommand::MembersData {
            group_id,
            modified_since,
            fields,
        } => {
            let names = fields.names();
            client
                .get_members_data(group_id, &as_strs(&names), modified_since)
                .await?
        }
        GroupCommand::MemberData {
            group_id,
            member_id,
            fields,
        } => {
            let names = fields.names();
            client
                .get_member_data(group_id, member_id, &as_strs(&names))
                .await?
        }
    };
    Ok(response)
}

async fn import_samples(cfg: &Config, file: &Path) -> Result<()> {
    // ---
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let input: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    let items = match input {
        Value::Array(items) => items,
        single => vec![single],
    };
    let samples = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| SampleModel::parse(item).with_context(|| format!("samples[{i}]")))
        .collect::<Result<Vec<_>>>()?;

    let converter = SchemaConverter::new(cfg.field_map.clone());
    let batch = converter.batch_convert(&samples)?;

    let pool = connect(cfg).await?;
    for row_id in store::insert_samples(&pool, &converter, batch).await? {
        println!("{row_id}");
    }
    tracing::info!("Imported {} samples from {}", samples.len(), file.display());
    Ok(())
}

async fn show_sample(cfg: &Config, row_id: i64) -> Result<()> {
    // ---
    let pool = connect(cfg).await?;
    let row = store::load_sample(&pool, row_id)
        .await?
        .ok_or_else(|| anyhow!("No sample with row_id {row_id}"))?;

    let sample = SchemaConverter::new(cfg.field_map.clone()).row_to_domain(&row)?;
    println!("{}", serde_json::to_string_pretty(&sample)?);
    Ok(())
}

fn print_observations(file: &Path) -> Result<()> {
    // ---
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let records: Vec<PlatformRecord> = match serde_json::from_str::<Value>(&text)? {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()?,
        single => vec![serde_json::from_value(single)?],
    };

    for record in &records {
        for observation in record.observations() {
            println!("{}", serde_json::to_string(&observation)?);
        }
    }
    Ok(())
}

async fn connect(cfg: &Config) -> Result<PgPool> {
    // ---
    let db_url = cfg.require_db_url()?;
    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(db_url)
        .await
        .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

    tracing::info!("Successfully connected to database");
    Ok(pool)
}

fn print_response(response: &ApiResponse) -> Result<()> {
    match response {
        ApiResponse::Json(value) => println!("{}", serde_json::to_string_pretty(value)?),
        ApiResponse::Text(text) => print!("{text}"),
    }
    Ok(())
}

fn as_strs(names: &[String]) -> Vec<&str> {
    names.iter().map(String::as_str).collect()
}

/// Accept epoch seconds or an RFC 3339 timestamp.
fn parse_timestamp(raw: &str) -> Result<i64, String> {
    // ---
    if let Ok(secs) = raw.parse::<i64>() {
        return Ok(secs);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.timestamp())
        .map_err(|e| format!("expected epoch seconds or RFC 3339 time: {e}"))
}

// ---

/// Initialize the global tracing subscriber.
///
/// Logs go to stderr so stdout carries only command output.
/// - Color: `FORCE_COLOR=1|true|yes` forces on, `0|false|no` forces off,
///   otherwise colors follow TTY detection on stderr
/// - Span events: `PURPLEAIR_SPAN_EVENTS=full|enter_exit`, default CLOSE only
/// - Level: `RUST_LOG` if set, else `PURPLEAIR_LOG_LEVEL` (default `info`)
fn init_tracing() {
    // ---
    let span_events = match env::var("PURPLEAIR_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stderr().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("PURPLEAIR_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,hyper=warn,reqwest=warn"))
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
