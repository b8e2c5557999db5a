//! Dashboard state reconciliation and time-range derivation for metrics
//! views.
//!
//! - [`time`]: grain arithmetic, named ranges, comparisons, formatting
//! - [`dashboard`]: the state model, reducer store, schema sync, URL state
//! - [`config`] / [`logging`]: ambient setup for the `dashstate` binary

pub mod config;
pub mod dashboard;
pub mod logging;
pub mod time;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use itertools::Itertools;
use serde::Serialize;

use crate::config::{ConfigError, DashboardConfig};
use crate::dashboard::{
    DashboardError, DashboardState, DashboardStore, MetricsViewSchema, ProtoError,
};
use crate::time::range::selectable_time_grains_within;
use crate::time::{
    ObservedRange, TimeRangeName, default_time_grain, parse_timezone, pretty_format_range,
    pretty_time_grain, to_iso,
};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "dashstate",
    version,
    about = "Inspect dashboard state, URL tokens, and time-range derivation"
)]
pub struct Cli {
    /// Emit JSON on stdout (errors as JSON on stderr).
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to $DASHSTATE_CONFIG or the platform config dir).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the ranges selectable for a dataset span.
    Ranges {
        /// Dataset start (RFC 3339).
        #[arg(long)]
        start: String,
        /// Dataset end (RFC 3339).
        #[arg(long)]
        end: String,
        /// IANA zone used for labels.
        #[arg(long)]
        tz: Option<String>,
    },

    /// Show which grains a range can be charted at.
    Grains {
        /// Range name, e.g. LAST_WEEK or ALL_TIME.
        #[arg(long)]
        range: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },

    /// Print the default state for a view.
    Init {
        #[arg(long)]
        view: String,
        /// Schema JSON, or `@path` to read it from a file.
        #[arg(long, value_name = "JSON")]
        schema: String,
        #[arg(long, requires = "end")]
        start: Option<String>,
        #[arg(long, requires = "start")]
        end: Option<String>,
    },

    /// Decode a URL state token (or a query string carrying one).
    Decode {
        /// Schema JSON, or `@path` to read it from a file.
        #[arg(long, value_name = "JSON")]
        schema: String,
        state: String,
    },

    /// Print the leaderboard query a decoded state issues for one dimension.
    Toplist {
        /// Schema JSON, or `@path` to read it from a file.
        #[arg(long, value_name = "JSON")]
        schema: String,
        /// Dimension to rank (defaults to the state's selected dimension).
        #[arg(long)]
        dimension: Option<String>,
        /// Rows to request (defaults to `leaderboard_limit` from config).
        #[arg(long)]
        limit: Option<usize>,
        state: String,
    },
}

pub struct ParsedCli {
    pub cli: Cli,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Process-level error: exit code plus a structured payload for `--json`.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct CliError {
    pub code: i32,
    pub kind: &'static str,
    pub message: String,
    pub hint: Option<String>,
    pub retryable: bool,
}

impl CliError {
    fn new(code: i32, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            kind,
            message: message.into(),
            hint: None,
            retryable: false,
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(2, "usage", message)
    }

    /// Help or version text; not a failure.
    pub fn is_informational(&self) -> bool {
        self.code == 0
    }
}

impl From<DashboardError> for CliError {
    fn from(err: DashboardError) -> Self {
        Self::new(3, "dashboard", err.user_message()).with_hint(err.log_message())
    }
}

impl From<ProtoError> for CliError {
    fn from(err: ProtoError) -> Self {
        Self::new(4, "url-state", "The URL state could not be decoded.")
            .with_hint(err.to_string())
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::new(5, "config", err.to_string())
            .with_hint(format!("check the file named by ${}", config::CONFIG_ENV))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(1, "internal", err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

pub fn parse_cli<I, T>(args: I) -> Result<ParsedCli, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => Ok(ParsedCli { cli }),
        Err(err) => {
            use clap::error::ErrorKind;
            let rendered = err.render().to_string();
            match err.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                    Err(CliError::new(0, "help", rendered))
                }
                _ => Err(CliError::usage(rendered.trim_end().to_string())
                    .with_hint("run `dashstate --help` for usage")),
            }
        }
    }
}

pub fn run_with_parsed(parsed: ParsedCli) -> Result<(), CliError> {
    let cli = parsed.cli;
    logging::init(cli.verbose);

    let config = match &cli.config {
        Some(path) => DashboardConfig::load_from(path)?,
        None => DashboardConfig::load()?,
    };
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Ranges { start, end, tz } => {
            let tz = tz.unwrap_or_else(|| config.default_timezone.clone());
            run_ranges(&start, &end, &tz, cli.json)
        }
        Commands::Grains { range, start, end } => {
            run_grains(&range, &start, &end, &config, cli.json)
        }
        Commands::Init {
            view,
            schema,
            start,
            end,
        } => {
            let observed = match (start, end) {
                (Some(start), Some(end)) => Some(ObservedRange::parse(&start, &end)?),
                _ => None,
            };
            run_init(&view, &schema, observed.as_ref(), &config, cli.json)
        }
        Commands::Decode { schema, state } => run_decode(&schema, &state, &config, cli.json),
        Commands::Toplist {
            schema,
            dimension,
            limit,
            state,
        } => run_toplist(&schema, &state, dimension.as_deref(), limit, &config, cli.json),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct RangeRow {
    name: TimeRangeName,
    label: &'static str,
    start: String,
    end: String,
    interval: &'static str,
    pretty: String,
}

fn run_ranges(start: &str, end: &str, tz: &str, json: bool) -> Result<(), CliError> {
    let observed = ObservedRange::parse(start, end)?;
    let tz = parse_timezone(tz)?;
    let rows: Vec<RangeRow> = time::selectable_time_ranges(Some(&observed))?
        .iter()
        .map(|range| RangeRow {
            name: range.name,
            label: range.name.label(),
            start: to_iso(range.start),
            end: to_iso(range.end),
            interval: range.interval.interval_name(),
            pretty: pretty_format_range(range, tz),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            println!("{:<14} {:<8} {}", row.name.as_str(), row.interval, row.pretty);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct GrainReport {
    range: TimeRangeName,
    default: &'static str,
    grains: Vec<time::TimeGrainOption>,
}

fn run_grains(
    range: &str,
    start: &str,
    end: &str,
    config: &DashboardConfig,
    json: bool,
) -> Result<(), CliError> {
    let name: TimeRangeName = range.parse()?;
    let observed = ObservedRange::parse(start, end)?;
    let grains = selectable_time_grains_within(
        name,
        &observed,
        config.min_chart_points,
        config.max_chart_points,
    )?;
    let default = default_time_grain(name, Some(&observed))?;

    if json {
        let report = GrainReport {
            range: name,
            default: default.interval_name(),
            grains,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} (default: {})", name.label(), pretty_time_grain(default));
        println!(
            "enabled: {}",
            grains
                .iter()
                .filter(|option| option.enabled)
                .map(|option| option.grain.interval_name())
                .join(", ")
        );
    }
    Ok(())
}

fn run_init(
    view: &str,
    schema: &str,
    observed: Option<&ObservedRange>,
    config: &DashboardConfig,
    json: bool,
) -> Result<(), CliError> {
    let schema = read_schema(schema)?;
    let store = DashboardStore::new(config.default_timezone.clone());
    let state = store.init(view, &schema, observed)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        println!("{}={}", config.url_param, state.proto);
    }
    Ok(())
}

const DECODED_VIEW: &str = "decoded";

/// Schema plus the state hydrated from a token or a query string carrying one.
fn hydrate(
    schema: &str,
    token: &str,
    config: &DashboardConfig,
) -> Result<(MetricsViewSchema, DashboardState), CliError> {
    let schema = read_schema(schema)?;
    let token = if token.contains('=') {
        dashboard::proto::token_from_query(token, &config.url_param).ok_or_else(|| {
            CliError::usage(format!("no `{}` parameter in query", config.url_param))
        })?
    } else {
        token.to_string()
    };

    let store = DashboardStore::new(config.default_timezone.clone());
    store.init(DECODED_VIEW, &schema, None)?;
    let state = store
        .sync_from_url(DECODED_VIEW, &token, &schema)?
        .ok_or_else(|| CliError::usage("empty URL state"))?;
    Ok((schema, state))
}

fn run_decode(
    schema: &str,
    token: &str,
    config: &DashboardConfig,
    json: bool,
) -> Result<(), CliError> {
    let (schema, state) = hydrate(schema, token, config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        let selectors = dashboard::DashboardSelectors::new(&state, &schema);
        println!(
            "leaderboard: {}",
            selectors.active_measure_name().unwrap_or("-")
        );
        println!(
            "sort: {} {}",
            state.dashboard_sort_type,
            if selectors.sorted_ascending() { "asc" } else { "desc" }
        );
        println!("context column: {}", state.leaderboard_context_column);
        for (mode, list) in [("include", &state.filters.include), ("exclude", &state.filters.exclude)] {
            for entry in list {
                println!("{mode} {}: {}", entry.name, entry.values.join(", "));
            }
        }
        if let Some(range) = &state.selected_time_range {
            let tz = parse_timezone(&state.selected_timezone)?;
            println!("time: {}", pretty_format_range(range, tz));
        }
    }
    Ok(())
}

fn run_toplist(
    schema: &str,
    token: &str,
    dimension: Option<&str>,
    limit: Option<usize>,
    config: &DashboardConfig,
    json: bool,
) -> Result<(), CliError> {
    let (schema, state) = hydrate(schema, token, config)?;
    let dimension = dimension
        .or(state.selected_dimension_name.as_deref())
        .ok_or_else(|| {
            CliError::usage("no dimension selected").with_hint("pass --dimension <NAME>")
        })?;
    if !schema.has_dimension(dimension) {
        return Err(CliError::new(3, "schema", format!("unknown dimension `{dimension}`")));
    }
    let limit = limit.unwrap_or(config.leaderboard_limit);
    if limit == 0 {
        return Err(CliError::usage("--limit must be positive"));
    }

    let query = dashboard::query::toplist_query(DECODED_VIEW, &state, &schema, dimension, limit)
        .ok_or_else(|| CliError::new(3, "dashboard", "no active measure to rank by"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&query)?);
    } else {
        let sort = query
            .sort
            .iter()
            .map(|s| format!("{} {}", s.name, if s.ascending { "asc" } else { "desc" }))
            .join(", ");
        println!(
            "top {} {} by {} (sort: {sort})",
            query.limit,
            query.dimension_name,
            query.measure_names.join(", ")
        );
    }
    Ok(())
}

/// Schema from inline JSON or `@path`.
fn read_schema(arg: &str) -> Result<MetricsViewSchema, CliError> {
    parse_schema_arg(arg).map_err(|err| {
        CliError::new(3, "schema", format!("{err:#}"))
            .with_hint("expected {\"measures\": [{\"name\": ...}], \"dimensions\": [...]}")
    })
}

fn parse_schema_arg(arg: &str) -> anyhow::Result<MetricsViewSchema> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading schema file {path}"))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&text).context("parsing schema JSON")
}
