//! CLI entry point for the video search engine.
//!
//! Provides commands for ingesting videos, building the index and running
//! text queries against it.

use anyhow::Context;
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Instant;
use vidsearch::display::{THEME, create_index_table, create_results_table, with_spinner};
use vidsearch::index::INDEX_MANIFEST_FILE;
use vidsearch::io::format::format_utc_timestamp;
use vidsearch::io::{ExitCode, JsonResponse, OutputFormat, ResponseMeta};
use vidsearch::logging::init_logging;
use vidsearch::store::UrlTable;
use vidsearch::vector::{ClipEncoder, parse_clip_model};
use vidsearch::{
    FileVectorStore, IndexBuilder, IndexError, IndexResult, IngestManifest, LoadedIndex,
    RankingPolicy, RepeatPolicy, SearchPipeline, Settings, encode_manifest,
};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Multi-modal video search
#[derive(Parser)]
#[command(
    name = "vidsearch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Search videos by text across frames, descriptions, subtitles and audio",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Quick Start:\n  $ vidsearch init\n  $ vidsearch ingest videos.json\n  $ vidsearch build\n  $ vidsearch search \"a red car at night\""
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Set up .vidsearch directory with default configuration
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// Encode a manifest of videos and add them to the store
    #[command(after_help = "Manifest format:\n  {\"videos\": [{\"url\": \"https://host/video/abc123/watch\", \"frames\": [\"frames/abc123/0001.jpg\"], \"description\": \"...\"}]}")]
    Ingest {
        /// Path to the JSON manifest
        manifest: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Build the similarity index from the store
    Build {
        /// Rebuild even if an index already exists
        #[arg(short, long)]
        force: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Rank videos for a text query
    Search {
        /// Query text
        query: String,

        /// Raw nearest-neighbor hits fetched before aggregation
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        k: Option<u32>,

        /// Number of videos to return
        #[arg(short = 'n', long, value_parser = clap::value_parser!(u32).range(1..))]
        top_n: Option<u32>,

        /// Count only the nearest hit per video and kind
        #[arg(long)]
        nearest_only: bool,

        /// Rank videos by how many raw hits they got instead of by weighted distance
        #[arg(long)]
        most_hits: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show what the current index contains
    Info {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn format(&self) -> OutputFormat {
        let json = match self {
            Commands::Ingest { json, .. }
            | Commands::Build { json, .. }
            | Commands::Search { json, .. }
            | Commands::Info { json } => *json,
            Commands::Init { .. } | Commands::Config => false,
        };
        OutputFormat::from_json_flag(json)
    }
}

fn main() {
    let cli = Cli::parse();
    let format = cli.command.format();

    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => report_error(&err, format),
    };
    std::process::exit(code.into());
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Commands::Init { force } = cli.command {
        return init(force);
    }

    let mut settings = load_settings(cli.config.as_deref())?;
    settings.debug |= cli.debug;
    init_logging(settings.debug);
    settings.validate()?;

    let format = cli.command.format();
    match cli.command {
        Commands::Init { force } => init(force),
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&settings)?);
            Ok(ExitCode::Success)
        }
        Commands::Ingest { manifest, .. } => ingest(&settings, &manifest, format),
        Commands::Build { force, .. } => build(&settings, force, format),
        Commands::Search {
            query,
            k,
            top_n,
            nearest_only,
            most_hits,
            ..
        } => {
            let mut options = settings.search_options();
            if let Some(k) = k {
                options.k = k as usize;
            }
            if let Some(top_n) = top_n {
                options.top_n = top_n as usize;
            }
            if nearest_only {
                options.repeat = RepeatPolicy::NearestOnly;
            }
            if most_hits {
                options.ranking = RankingPolicy::MostHits;
            }
            search(&settings, &query, options, format)
        }
        Commands::Info { .. } => info(&settings, format),
    }
}

fn init(force: bool) -> anyhow::Result<ExitCode> {
    let path = Settings::init_config_file(force).map_err(|e| IndexError::Config {
        reason: e.to_string(),
    })?;
    println!(
        "{}",
        THEME.success_with_icon(&format!("Created configuration file at: {}", path.display()))
    );
    println!("Edit this file to customize your settings.");
    Ok(ExitCode::Success)
}

fn load_settings(path: Option<&Path>) -> IndexResult<Settings> {
    if path.is_none() {
        if let Err(warning) = Settings::check_init() {
            eprintln!("{}", THEME.warning_with_icon(&warning));
            eprintln!("Using default configuration. Run 'vidsearch init' to create one.");
        }
    }

    let loaded = match path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    loaded.map_err(|e| IndexError::Config {
        reason: e.to_string(),
    })
}

fn load_encoder(settings: &Settings, quiet: bool) -> IndexResult<ClipEncoder> {
    let model = parse_clip_model(&settings.encoder.model)?;
    let encoder = with_spinner("Loading encoder model...", quiet, || {
        ClipEncoder::new(
            model,
            settings.model_cache_dir(),
            settings.encoder.show_download_progress && !quiet,
        )
    })?;
    Ok(encoder)
}

fn ingest(settings: &Settings, manifest_path: &Path, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let quiet = format.is_json();
    let manifest = IngestManifest::load(manifest_path)?;
    let base_dir = manifest_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let encoder = load_encoder(settings, quiet)?;
    let (entities, stats) = with_spinner(
        &format!("Encoding {} videos...", manifest.videos.len()),
        quiet,
        || encode_manifest(&manifest, &encoder, base_dir),
    )?;

    let store = FileVectorStore::new(settings.store_dir());
    let summary = store.upsert(entities).map_err(IndexError::from)?;
    tracing::info!(
        "Upserted {} videos into {}",
        stats.videos,
        store.root().display()
    );

    if format.is_json() {
        let data = json!({
            "videos": stats.videos,
            "inserted": summary.inserted,
            "replaced": summary.replaced,
            "vectors_written": summary.vectors_written,
            "frames_encoded": stats.frames_encoded,
            "texts_encoded": stats.texts_encoded,
            "precomputed": stats.precomputed,
        });
        print_json(&JsonResponse::success(data))?;
    } else {
        println!(
            "{}",
            THEME.success_with_icon(&format!(
                "Ingested {} videos ({} new, {} replaced, {} vectors)",
                stats.videos, summary.inserted, summary.replaced, summary.vectors_written
            ))
        );
        println!(
            "  Encoded {} frames and {} texts, {} vectors precomputed",
            stats.frames_encoded, stats.texts_encoded, stats.precomputed
        );
        println!("Run 'vidsearch build' to refresh the index.");
    }
    Ok(ExitCode::Success)
}

fn build(settings: &Settings, force: bool, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let index_dir = settings.index_dir();
    if !force && index_dir.join(INDEX_MANIFEST_FILE).exists() {
        eprintln!(
            "{}",
            THEME.warning_with_icon(&format!(
                "Index already exists at {}. Use --force to rebuild",
                index_dir.display()
            ))
        );
        return Ok(ExitCode::Success);
    }

    let store = FileVectorStore::new(settings.store_dir());
    let options = settings.build_options();
    let mut loaded = with_spinner("Building index...", format.is_json(), || {
        IndexBuilder::build_from_store(&store, &options)
    })?;

    std::fs::create_dir_all(&index_dir).map_err(|source| IndexError::Persistence {
        path: index_dir.clone(),
        source,
    })?;
    loaded.persist(&index_dir)?;

    if format.is_json() {
        print_json(&JsonResponse::success(index_summary(&loaded)))?;
    } else {
        println!(
            "{}",
            THEME.success_with_icon(&format!("Index written to {}", index_dir.display()))
        );
        println!("{}", create_index_table(&loaded.manifest));
    }
    Ok(ExitCode::Success)
}

fn search(
    settings: &Settings,
    query: &str,
    options: vidsearch::SearchOptions,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let start = Instant::now();
    let loaded = LoadedIndex::open(&settings.index_dir())?;
    if loaded.manifest.model_name != settings.encoder.model {
        tracing::warn!(
            "Index was built from '{}' vectors but the configured encoder is '{}'",
            loaded.manifest.model_name,
            settings.encoder.model
        );
    }

    let urls = match FileVectorStore::new(settings.store_dir()).read_catalog() {
        Ok(catalog) => catalog.url_table(),
        Err(e) => {
            tracing::warn!("Store catalog unavailable, results will have no URLs: {e}");
            UrlTable::new()
        }
    };

    let encoder = load_encoder(settings, format.is_json())?;
    let weights = settings.weight_table()?;
    let pipeline = SearchPipeline::new(
        &encoder,
        loaded.index.as_ref(),
        loaded.entries(),
        &urls,
        &weights,
        options,
    );
    let results = pipeline.search(query)?;
    let code = ExitCode::from_results(&results);

    if format.is_json() {
        let meta = ResponseMeta {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Some(format_utc_timestamp()),
            execution_time_ms: Some(start.elapsed().as_millis() as u64),
        };
        if results.is_empty() {
            print_json(&JsonResponse::no_results(query).with_meta(meta))?;
        } else {
            print_json(&JsonResponse::success(&results).with_meta(meta))?;
        }
    } else if results.is_empty() {
        println!("No videos matched '{query}'");
    } else {
        println!("{}", create_results_table(&results));
        println!(
            "{}",
            THEME.apply(
                &THEME.dim,
                format!("{} results in {:?}", results.len(), start.elapsed())
            )
        );
    }
    Ok(code)
}

fn info(settings: &Settings, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let index_dir = settings.index_dir();
    let loaded = LoadedIndex::open(&index_dir)
        .with_context(|| format!("Failed to open index at {}", index_dir.display()))?;

    if format.is_json() {
        print_json(&JsonResponse::success(index_summary(&loaded)))?;
    } else {
        println!(
            "{}",
            THEME.apply(&THEME.header, format!("Index at {}", index_dir.display()))
        );
        println!("{}", create_index_table(&loaded.manifest));
    }
    Ok(ExitCode::Success)
}

#[derive(Debug, Serialize)]
struct IndexSummary<'a> {
    index_kind: &'a str,
    model_name: &'a str,
    dimension: usize,
    vector_count: usize,
    video_count: usize,
    created_at: i64,
    kinds: serde_json::Map<String, serde_json::Value>,
}

fn index_summary(loaded: &LoadedIndex) -> IndexSummary<'_> {
    let manifest = &loaded.manifest;
    let kinds = manifest
        .entries
        .kind_counts()
        .into_iter()
        .map(|(kind, count)| (kind.as_str().to_string(), json!(count)))
        .collect();
    IndexSummary {
        index_kind: manifest.index_kind.as_str(),
        model_name: &manifest.model_name,
        dimension: manifest.dimension,
        vector_count: manifest.vector_count,
        video_count: manifest.entries.entity_count(),
        created_at: manifest.created_at,
        kinds,
    }
}

fn print_json<T: Serialize>(response: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

/// Prints an error and picks the exit code.
///
/// Library errors keep their semantic exit code even when wrapped in
/// context; anything else is a general error.
fn report_error(err: &anyhow::Error, format: OutputFormat) -> ExitCode {
    let index_error = err.downcast_ref::<IndexError>();
    let code = index_error.map_or(ExitCode::GeneralError, ExitCode::from_error);

    if format.is_json() {
        let response = match index_error {
            Some(index_error) => JsonResponse::from_error(index_error),
            None => JsonResponse::error(code, &format!("{err:#}"), vec![]),
        };
        match serde_json::to_string_pretty(&response) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to serialize error response: {e}"),
        }
    } else {
        eprintln!("{}", THEME.error_with_icon(&format!("{err:#}")));
        if let Some(index_error) = index_error {
            for suggestion in index_error.recovery_suggestions() {
                eprintln!("  {suggestion}");
            }
        }
        if code.is_blocking() {
            eprintln!(
                "{}",
                THEME.apply(
                    &THEME.dim,
                    "The index cannot be searched until it is rebuilt: vidsearch build --force"
                )
            );
        }
    }
    code
}
