use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_WORKSPACE: &str = ".sheet-crud";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Turn spreadsheet columns into a generated CRUD app",
    long_about = None
)]
pub struct Cli {
    /// Directory holding registered apps, layout specs, records, and session state
    #[arg(long, global = true, default_value = DEFAULT_WORKSPACE)]
    pub workspace: PathBuf,
    /// Settings YAML file (defaults to <workspace>/config.yml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Register an app and the table its rows come from
    Connect(ConnectArgs),
    /// Show the first rows of an app's source table
    Preview(PreviewArgs),
    /// Classify every source column and print the suggested field model
    Probe(ProbeArgs),
    /// Edit the field model: choose the primary column and per-column modes
    Map(MapArgs),
    /// Build a new layout spec version and import the source rows into it
    Generate(GenerateArgs),
    /// Inspect, activate, and compare layout spec versions
    #[command(subcommand)]
    Specs(SpecsCommand),
    /// Drive the generated app: navigate, search, add, edit, delete
    App(AppArgs),
    /// Manage persisted runtime session state
    #[command(subcommand)]
    Session(SessionCommand),
}

#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// Display name of the app
    #[arg(short, long)]
    pub name: String,
    /// App slug (defaults to the kebab-cased name)
    #[arg(short, long)]
    pub app: Option<String>,
    /// CSV/TSV file, saved GViz response (with --gviz), or Google Sheet URL/ID
    #[arg(short, long)]
    pub input: String,
    /// Treat --input as a saved `gviz/tq?tqx=out:json` response body
    #[arg(long)]
    pub gviz: bool,
    /// Sheet (tab) name when --input is a Google Sheet
    #[arg(long)]
    pub sheet: Option<String>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// App slug
    #[arg(short, long)]
    pub app: String,
    /// Number of rows to display
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
    /// A1-style range to read, e.g. A1:F100
    #[arg(long)]
    pub range: Option<String>,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// App slug
    #[arg(short, long)]
    pub app: String,
    /// Persist the suggested model as the app's field model
    #[arg(long)]
    pub save: bool,
    /// Also write the model JSON to this path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct MapArgs {
    /// App slug
    #[arg(short, long)]
    pub app: String,
    /// Column to use as the primary (record name) field
    #[arg(long)]
    pub primary: Option<String>,
    /// Column mode assignment `column=mode` (primary, fixed, managed, free-text, ignore)
    #[arg(long = "set", value_parser = parse_assignment, action = clap::ArgAction::Append)]
    pub assignments: Vec<(String, String)>,
    /// Re-capture every FIXED column's options from the current source data
    #[arg(long)]
    pub refresh_options: bool,
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// App slug
    #[arg(short, long)]
    pub app: String,
    /// Leave the new version as DRAFT instead of activating it
    #[arg(long)]
    pub draft: bool,
    /// Rows per import batch (defaults to import.chunk_size)
    #[arg(long)]
    pub chunk_size: Option<usize>,
}

#[derive(Debug, Subcommand)]
pub enum SpecsCommand {
    /// List every retained spec version
    List(SpecsListArgs),
    /// Print a spec version as JSON (defaults to the active one)
    Show(SpecsShowArgs),
    /// Make a retained version the active one (rollback)
    Activate(SpecsActivateArgs),
    /// Unified diff between two spec versions
    Diff(SpecsDiffArgs),
}

#[derive(Debug, Args)]
pub struct SpecsListArgs {
    /// App slug
    #[arg(short, long)]
    pub app: String,
}

#[derive(Debug, Args)]
pub struct SpecsShowArgs {
    /// App slug
    #[arg(short, long)]
    pub app: String,
    /// Version to print
    #[arg(long)]
    pub version: Option<u32>,
}

#[derive(Debug, Args)]
pub struct SpecsActivateArgs {
    /// App slug
    #[arg(short, long)]
    pub app: String,
    /// Version to activate
    #[arg(long)]
    pub version: u32,
}

#[derive(Debug, Args)]
pub struct SpecsDiffArgs {
    /// App slug
    #[arg(short, long)]
    pub app: String,
    /// Older version (defaults to the one before --to)
    #[arg(long)]
    pub from: Option<u32>,
    /// Newer version (defaults to the latest)
    #[arg(long)]
    pub to: Option<u32>,
}

#[derive(Debug, Args)]
pub struct AppArgs {
    /// App slug
    #[arg(short, long)]
    pub app: String,
    /// Page of the main list to load, starting at 1
    #[arg(long)]
    pub page: Option<usize>,
    #[command(subcommand)]
    pub action: Option<AppAction>,
}

#[derive(Debug, Subcommand)]
pub enum AppAction {
    /// Render the current page
    View,
    /// Switch to a sidebar page (overview, main, managed:<column>)
    Nav { key: String },
    /// Search the main list by primary field (empty clears)
    Search {
        #[arg(default_value = "")]
        query: String,
    },
    /// Show the distinct values of a managed column
    Managed { column: String },
    /// Create a record from `field=value` pairs
    Add {
        #[arg(long = "set", value_parser = parse_assignment, action = clap::ArgAction::Append)]
        values: Vec<(String, String)>,
    },
    /// Edit a record (id or unique id prefix) with `field=value` pairs
    Edit {
        id: String,
        #[arg(long = "set", value_parser = parse_assignment, action = clap::ArgAction::Append)]
        values: Vec<(String, String)>,
    },
    /// Soft-delete a record (id or unique id prefix)
    Delete {
        id: String,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// Forget every app's remembered page and search query
    Clear,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => match other.as_bytes() {
            [byte] if byte.is_ascii() => Ok(*byte),
            [] => Err("Delimiter cannot be empty".to_string()),
            _ => Err("Delimiter must be a single ASCII character".to_string()),
        },
    }
}

/// Splits `key=value` at the first `=`; the key must not be blank.
pub fn parse_assignment(value: &str) -> Result<(String, String), String> {
    let (key, rest) = value
        .split_once('=')
        .ok_or_else(|| format!("Expected key=value but got '{value}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Missing key in '{value}'"));
    }
    Ok((key.to_string(), rest.to_string()))
}
