//! entity-linker - find named entities in a notes folder and turn chosen
//! mentions into wiki links.
//!
//! ```bash
//! # Extract entities (prints PROGRESS:N lines while running)
//! entity-linker extract --notes ~/vault --output entities.json
//!
//! # Review what was found
//! entity-linker list --store entities.json --limit 20
//!
//! # Link every occurrence of an entity, shown under another name
//! entity-linker link --store entities.json --entity Paris --rename "Paris=Paris, France"
//!
//! # Link only some occurrences (FILE:START, as printed by `list --occurrences`)
//! entity-linker link --entity Paris --only trip.md:16 --skip diary.md:0
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use entity_linker_lib::config::{self, ExtractionConfig};
use entity_linker_lib::inference_service::{InferenceService, OperationKind};
use entity_linker_lib::pipeline::extraction::{spawn_extraction, HttpNerClient, NerModel, ProgressEvent};
use entity_linker_lib::pipeline::linking::{
    apply_links, filter_selections, find_entities, select_all, DisplayNames, OccurrenceRef,
};
use entity_linker_lib::pipeline::storage::load_store;

#[derive(Parser)]
#[command(name = "entity-linker", author, version, about = "Entity extraction and wiki-link insertion for note folders")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract entities from every note and write the entity store
    #[command(visible_alias = "x")]
    Extract(ExtractArgs),

    /// List entities in a store, highest score first
    #[command(visible_alias = "ls")]
    List(ListArgs),

    /// Insert links for every occurrence of the chosen entities
    Link(LinkArgs),

    /// Check that the NER server answers
    Check(CheckArgs),
}

#[derive(clap::Args)]
struct ExtractArgs {
    /// Notes folder (searched recursively)
    #[arg(short, long, value_name = "DIR")]
    notes: PathBuf,

    /// Entity store to write
    #[arg(short, long, value_name = "PATH", default_value = config::DEFAULT_STORE_FILE)]
    output: PathBuf,

    /// NER server base URL (default: $ENTITY_LINKER_NER_URL or localhost:8080)
    #[arg(long, value_name = "URL")]
    ner_url: Option<String>,

    /// Largest batch size to try
    #[arg(short, long, default_value_t = config::DEFAULT_INITIAL_BATCH_SIZE)]
    batch_size: usize,

    /// Notes used to probe the batch size
    #[arg(long, default_value_t = config::DEFAULT_PROBE_SAMPLE_SIZE)]
    probe_sample: usize,

    /// Note file extension (repeatable)
    #[arg(short, long = "extension", value_name = "EXT")]
    extensions: Vec<String>,
}

#[derive(clap::Args)]
struct ListArgs {
    /// Entity store to read
    #[arg(short, long, value_name = "PATH", default_value = config::DEFAULT_STORE_FILE)]
    store: PathBuf,

    /// Show at most this many entities
    #[arg(short, long)]
    limit: Option<usize>,

    /// Also print every occurrence
    #[arg(long)]
    occurrences: bool,
}

#[derive(clap::Args)]
struct LinkArgs {
    /// Entity store to read
    #[arg(short, long, value_name = "PATH", default_value = config::DEFAULT_STORE_FILE)]
    store: PathBuf,

    /// Entity word to link (repeatable, case-insensitive)
    #[arg(short, long = "entity", value_name = "WORD", required = true)]
    entities: Vec<String>,

    /// Display name for a word, as WORD=NAME (repeatable)
    #[arg(short, long = "rename", value_name = "WORD=NAME", value_parser = parse_rename)]
    renames: Vec<(String, String)>,

    /// Link only these occurrences, as FILE:START (repeatable)
    #[arg(long, value_name = "FILE:START")]
    only: Vec<OccurrenceRef>,

    /// Leave these occurrences alone, as FILE:START (repeatable)
    #[arg(long, value_name = "FILE:START")]
    skip: Vec<OccurrenceRef>,
}

#[derive(clap::Args)]
struct CheckArgs {
    /// NER server base URL (default: $ENTITY_LINKER_NER_URL or localhost:8080)
    #[arg(long, value_name = "URL")]
    ner_url: Option<String>,
}

fn parse_rename(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((word, name)) if !word.trim().is_empty() => {
            Ok((word.trim().to_string(), name.to_string()))
        }
        _ => Err(format!("expected WORD=NAME, got '{s}'")),
    }
}

fn main() -> ExitCode {
    entity_linker_lib::init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Extract(args) => run_extract(args),
        Commands::List(args) => run_list(args),
        Commands::Link(args) => run_link(args),
        Commands::Check(args) => run_check(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn ner_client(url: Option<&str>) -> Result<HttpNerClient, Box<dyn std::error::Error>> {
    let client = match url {
        Some(url) => HttpNerClient::new(url, 600)?,
        None => HttpNerClient::from_env()?,
    };
    Ok(client)
}

fn run_extract(args: ExtractArgs) -> CliResult {
    let mut config = ExtractionConfig::new(args.notes, args.output);
    config.initial_batch_size = args.batch_size;
    config.probe_sample_size = args.probe_sample;
    if !args.extensions.is_empty() {
        config.extensions = args.extensions;
    }

    let service = Arc::new(InferenceService::new(ner_client(args.ner_url.as_deref())?));
    tracing::info!(model = service.model_name(), "{} v{}", config::APP_NAME, config::APP_VERSION);

    let handle = spawn_extraction(config, service);
    for event in handle.events().iter() {
        if let ProgressEvent::Progress { percent, .. } = event {
            println!("PROGRESS:{percent}");
        }
    }

    let store = handle.join()?;
    println!(
        "Found {} entities ({} occurrences) in {} files",
        store.entities.len(),
        store.occurrence_count(),
        store.processed_files.len()
    );
    Ok(())
}

fn run_list(args: ListArgs) -> CliResult {
    let store = load_store(&args.store)?;
    let limit = args.limit.unwrap_or(store.entities.len());

    for (i, entity) in store.entities.iter().take(limit).enumerate() {
        println!("{:>4}. {}", i + 1, entity.summary());
        if args.occurrences {
            for occ in &entity.occurrences {
                println!(
                    "        {}:{}-{} {:?}",
                    occ.file.display(),
                    occ.span.start,
                    occ.span.end,
                    occ.surface_text
                );
            }
        }
    }
    Ok(())
}

fn run_link(args: LinkArgs) -> CliResult {
    let store = load_store(&args.store)?;
    let entities = find_entities(&store, &args.entities)?;

    let mut names = DisplayNames::new();
    for (word, name) in args.renames {
        // rename keys are matched against canonical words case-insensitively
        let canonical = store
            .find_by_word(&word)
            .first()
            .map(|e| e.canonical_word.clone())
            .unwrap_or(word);
        names.set(canonical, name);
    }

    let selections = filter_selections(select_all(&entities, &names), &args.only, &args.skip);
    tracing::debug!(selected = selections.len(), "Occurrences selected");
    let report = apply_links(&store, &args.store, &selections)?;

    println!(
        "Inserted {} links in {} files; {}",
        report.links_inserted,
        report.files_updated.len(),
        report.summary()
    );
    for failure in &report.failures {
        eprintln!("warning: {}: {}", failure.file.display(), failure.error);
    }
    Ok(())
}

fn run_check(args: CheckArgs) -> CliResult {
    let service = InferenceService::new(ner_client(args.ner_url.as_deref())?);
    let Some(mut session) = service.try_acquire(OperationKind::HealthCheck) else {
        println!("NER model busy");
        return Ok(());
    };

    let mentions = session.infer(&["Ada Lovelace lived in London."], 1)?;
    println!(
        "NER server at {} is up ({} mentions in test sentence)",
        session.base_url(),
        mentions.first().map_or(0, Vec::len)
    );
    Ok(())
}
