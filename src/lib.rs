pub mod app_cmd;
pub mod classify;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod generate;
pub mod import;
pub mod io_utils;
pub mod layout;
pub mod model;
pub mod render;
pub mod runtime;
pub mod session;
pub mod source;
pub mod specs_cmd;
pub mod store;

use std::{
    env,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use heck::ToKebabCase;
use log::{LevelFilter, debug, info, warn};

use crate::{
    classify::Classifier,
    cli::{Cli, Commands},
    config::Settings,
    generate::{GenerateRequest, Generator},
    model::FieldMode,
    source::{FileTableSource, SourceRef, TableSource},
    store::{AppEntry, JsonStore},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheet_crud", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

/// Settings and stores resolved from the global CLI options.
pub struct Workspace {
    pub dir: PathBuf,
    pub settings: Settings,
    pub store: JsonStore,
}

impl Workspace {
    pub fn open(dir: &Path, config: Option<&Path>) -> Result<Self> {
        let settings = Settings::resolve(config, dir)
            .with_context(|| format!("Loading settings for workspace {dir:?}"))?;
        let store =
            JsonStore::open(dir).with_context(|| format!("Opening workspace {dir:?}"))?;
        debug!("Workspace {dir:?} opened with settings {settings:?}");
        Ok(Self {
            dir: dir.to_path_buf(),
            settings,
            store,
        })
    }

    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.settings.classifier.clone())
    }

    pub fn app(&self, slug: &str) -> Result<AppEntry> {
        Ok(self.store.app(slug)?)
    }
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let workspace = Workspace::open(&cli.workspace, cli.config.as_deref())?;
    match cli.command {
        Commands::Connect(args) => handle_connect(&workspace, &args),
        Commands::Preview(args) => handle_preview(&workspace, &args),
        Commands::Probe(args) => handle_probe(&workspace, &args),
        Commands::Map(args) => handle_map(&workspace, &args),
        Commands::Generate(args) => handle_generate(&workspace, &args),
        Commands::Specs(command) => specs_cmd::execute(&workspace, &command),
        Commands::App(args) => app_cmd::execute(&workspace, &args),
        Commands::Session(command) => app_cmd::execute_session(&workspace, &command),
    }
}

fn source_from_args(args: &cli::ConnectArgs) -> Result<SourceRef> {
    let path = PathBuf::from(&args.input);
    if args.gviz {
        return Ok(SourceRef::GvizFile { path });
    }
    if path.exists() {
        return Ok(SourceRef::CsvFile {
            path,
            delimiter: args.delimiter,
            encoding: args.input_encoding.clone(),
        });
    }
    SourceRef::parse_sheet(&args.input, args.sheet.as_deref()).with_context(|| {
        format!("'{}' is neither an existing file nor a Google Sheet URL/ID", args.input)
    })
}

fn handle_connect(workspace: &Workspace, args: &cli::ConnectArgs) -> Result<()> {
    let slug = match &args.app {
        Some(slug) => slug.trim().to_string(),
        None => args.name.to_kebab_case(),
    };
    if slug.is_empty() {
        bail!("App slug cannot be empty");
    }
    let source_ref = source_from_args(args)?;
    match &source_ref {
        SourceRef::GoogleSheet { .. } => {
            if let Some(url) = source::gviz_url(&source_ref, Some(source::DEFAULT_SHEET_RANGE)) {
                println!("Fetch the sheet from {url} and reconnect with --gviz to import it.");
            }
        }
        _ => {
            let table = FileTableSource
                .fetch_table(&source_ref, None)
                .with_context(|| format!("Reading {}", source_ref.describe()))?;
            info!(
                "Source has {} column(s) and {} row(s)",
                table.headers.len(),
                table.rows.len()
            );
        }
    }
    let entry = workspace.store.upsert_app(&slug, args.name.trim(), source_ref)?;
    info!("Connected app '{}' to {}", entry.slug, entry.source.describe());
    println!("{}", entry.slug);
    Ok(())
}

fn handle_preview(workspace: &Workspace, args: &cli::PreviewArgs) -> Result<()> {
    let entry = workspace.app(&args.app)?;
    let table = FileTableSource
        .fetch_table(&entry.source, args.range.as_deref())
        .with_context(|| format!("Fetching {}", entry.source.describe()))?;
    let shown = table.head(args.rows.min(source::PREVIEW_ROW_LIMIT));
    print!("{}", render::render_source_table(&shown));
    info!(
        "Displayed {} of {} row(s) from {}",
        shown.rows.len(),
        table.rows.len(),
        entry.source.describe()
    );
    Ok(())
}

fn handle_probe(workspace: &Workspace, args: &cli::ProbeArgs) -> Result<()> {
    let entry = workspace.app(&args.app)?;
    let table = FileTableSource
        .fetch_table(&entry.source, None)
        .with_context(|| format!("Fetching {}", entry.source.describe()))?;
    let classifier = workspace.classifier();
    let samples = classifier.sample_columns(&table.headers, &table.rows);
    let mut model = classifier.classify_samples(&samples, entry.model.as_ref());
    model.app_name = entry.name.clone();
    print!("{}", render::render_classification(&model, &samples));

    if let Some(path) = &args.output {
        model
            .save(path)
            .with_context(|| format!("Writing field model to {path:?}"))?;
        info!("Field model written to {path:?}");
    }
    if args.save {
        workspace.store.save_model(&entry.slug, model)?;
        info!("Saved field model for '{}'", entry.slug);
    }
    Ok(())
}

fn handle_map(workspace: &Workspace, args: &cli::MapArgs) -> Result<()> {
    let entry = workspace.app(&args.app)?;
    let table = FileTableSource
        .fetch_table(&entry.source, None)
        .with_context(|| format!("Fetching {}", entry.source.describe()))?;
    let classifier = workspace.classifier();
    let samples = classifier.sample_columns(&table.headers, &table.rows);
    let mut model = classifier.classify_samples(&samples, entry.model.as_ref());
    model.app_name = entry.name.clone();

    if let Some(primary) = &args.primary {
        model.set_primary(primary.trim(), &classifier, &samples)?;
    }
    for (key, mode) in &args.assignments {
        let mode = mode.parse::<FieldMode>().map_err(|err| anyhow!(err))?;
        if mode == FieldMode::Primary {
            model.set_primary(key, &classifier, &samples)?;
        } else {
            model.set_mode(key, mode, &samples)?;
        }
    }
    if args.refresh_options {
        model.snapshot_fixed_options(&samples);
    }
    model.validate(workspace.settings.classifier.fixed_options_cap)?;
    model.validate_against_headers(&table.headers)?;

    let saved = workspace.store.save_model(&entry.slug, model)?;
    print!("{}", render::render_classification(&saved, &samples));
    info!(
        "Saved field model for '{}' with primary '{}'",
        entry.slug, saved.primary_field_key
    );
    Ok(())
}

fn handle_generate(workspace: &Workspace, args: &cli::GenerateArgs) -> Result<()> {
    let entry = workspace.app(&args.app)?;
    let Some(model) = entry.model.as_ref() else {
        bail!(
            "App '{}' has no field model yet; run `probe --save` or `map` first",
            entry.slug
        );
    };
    let table = FileTableSource
        .fetch_table(&entry.source, None)
        .with_context(|| format!("Fetching {}", entry.source.describe()))?;

    let mut generator = Generator::new(&workspace.store, &workspace.store, &workspace.settings);
    if let Some(chunk_size) = args.chunk_size {
        generator = generator.with_chunk_size(chunk_size);
    }
    let report = generator.generate(GenerateRequest {
        app_slug: &entry.slug,
        app_name: &entry.name,
        model,
        rows: table.rows,
        activate: !args.draft,
    })?;

    println!(
        "{} v{} {}: imported {} of {} row(s)",
        entry.slug,
        report.spec.version,
        report.spec.status.as_str(),
        report.import.imported,
        report.import.attempted
    );
    if let Some(warning) = report.import.as_warning() {
        warn!("{warning}");
        println!("warning: {warning}");
    }
    Ok(())
}
