use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use citegraph_core::error::ExitCode;
use citegraph_core::{
    AppConfig, CiteGraphError, Label, Paper, RawAuthor, RawPaper, RelKind, normalize,
    normalize_author,
};
use citegraph_ingest::{
    CitationSource, IngestContext, IngestError, PaperExpander, RefreshProgress, UpsertStats,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "citegraph",
    about = "Build a citation graph from Semantic Scholar",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format. Also enabled by setting CITEGRAPH_JSON=1.
    #[arg(long, global = true)]
    json: bool,

    /// More log output on stderr (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Search papers by keyword.
    Search {
        query: String,
        #[arg(long)]
        limit: Option<u32>,
        /// Write the results to the graph.
        #[arg(long)]
        add: bool,
        /// Write the results and their citations and references.
        #[arg(long)]
        expand: bool,
    },

    /// List an author's papers, by name or (with --id) by author id.
    Author {
        name: String,
        #[arg(long)]
        id: bool,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        add: bool,
        #[arg(long)]
        expand: bool,
    },

    /// Look up one paper by Semantic Scholar id (or DOI:..., ArXiv:...).
    Paper {
        id: String,
        #[arg(long)]
        add: bool,
        #[arg(long)]
        expand: bool,
    },

    /// Re-expand every paper already in the graph.
    Refresh {
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Show node and relationship counts.
    Stats,

    /// Show the effective configuration.
    Config,
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let json_output = cli.json || std::env::var("CITEGRAPH_JSON").as_deref() == Ok("1");

    if let Err(err) = run(cli.command, json_output).await {
        let code = exit_code(&err);
        if json_output {
            let _ = print_json(&json!({
                "status": "error",
                "error": code_name(&code),
                "message": format!("{err:#}"),
            }));
        } else {
            eprintln!("error: {err:#}");
        }
        std::process::exit(code as i32);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands, json_output: bool) -> Result<()> {
    let start = Instant::now();
    let config = AppConfig::load().context("loading config")?;
    debug!(
        path = %AppConfig::config_path().display(),
        backend = ?config.graph.backend,
        "config loaded"
    );

    if let Commands::Config = command {
        return show_config(&config, json_output);
    }

    let ctx = IngestContext::connect(config)
        .await
        .context("connecting to graph store")?;

    match command {
        Commands::Search {
            query,
            limit,
            add,
            expand,
        } => {
            let limit = limit.unwrap_or(ctx.config.api.search_limit);
            let raws = ctx.source.search_papers(&query, limit).await?;
            let outcome = ingest(&ctx, &raws, add, expand).await?;
            report_papers(&outcome, json_output, start)?;
        }

        Commands::Author {
            name,
            id,
            limit,
            add,
            expand,
        } => {
            let profile = if id {
                ctx.source.fetch_author(&name).await?
            } else {
                ctx.source
                    .search_authors(&name, 1)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| IngestError::NotFound(format!("author {name}")))?
            };
            let author_id = profile
                .author_id
                .clone()
                .ok_or_else(|| IngestError::NotFound(format!("author {name}")))?;

            let limit = limit.unwrap_or(ctx.config.api.search_limit) as usize;
            let mut raws = ctx.source.author_papers(&author_id).await?;
            raws.truncate(limit);

            if add || expand {
                ctx.upsert
                    .upsert_author(&normalize_author(&RawAuthor::from(&profile)))
                    .await?;
            }
            let outcome = ingest(&ctx, &raws, add, expand).await?;

            if !json_output {
                println!(
                    "{} ({author_id}): {} papers, h-index {}",
                    profile.name.as_deref().unwrap_or("unknown"),
                    profile.paper_count.unwrap_or(0),
                    profile.h_index.unwrap_or(0),
                );
            }
            report_papers(&outcome, json_output, start)?;
        }

        Commands::Paper { id, add, expand } => {
            let raw = ctx.source.fetch_paper(&id).await?;
            let outcome = ingest(&ctx, std::slice::from_ref(&raw), add, expand).await?;
            let paper = outcome
                .papers
                .first()
                .ok_or_else(|| IngestError::InvalidRecord(id.clone()))?;

            let citations = ctx.upsert.citations_of(&paper.id).await?;
            let references = ctx.upsert.references_of(&paper.id).await?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&json!({
                    "status": "ok",
                    "data": {
                        "paper": paper,
                        "stats": outcome.stats,
                        "graph": { "citations": citations, "references": references },
                        "failures": outcome.failures,
                    },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                print_paper(paper);
                println!("  citations in graph:  {}", citations.len());
                println!("  references in graph: {}", references.len());
                print_write_summary(&outcome);
            }
        }

        Commands::Refresh { workers } => {
            let scheduler = ctx.scheduler(workers);
            let summary = scheduler
                .run_with_progress(|p: RefreshProgress<'_>| {
                    if !json_output {
                        let mark = if p.ok { "ok" } else { "FAILED" };
                        eprintln!("[{}/{}] {} {mark}", p.completed, p.total, p.paper_id);
                    }
                })
                .await?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&json!({
                    "status": "ok",
                    "data": summary,
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                println!(
                    "Refreshed {}/{} papers ({} failed, {} incomplete)",
                    summary.succeeded, summary.total, summary.failed, summary.incomplete
                );
                println!(
                    "  created {} nodes, {} relationships",
                    summary.stats.nodes_created, summary.stats.relationships_created
                );
                for (id, error) in &summary.failures {
                    println!("  {id}: {error}");
                }
            }
        }

        Commands::Stats => {
            let counts = ctx.upsert.stats().await?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&json!({
                    "status": "ok",
                    "data": counts,
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                println!("Graph statistics:");
                for label in Label::ALL {
                    println!("  {:<14} {}", label.as_str(), counts.nodes_with(label));
                }
                for kind in RelKind::ALL {
                    println!("  {:<14} {}", kind.as_str(), counts.relationships_of(kind));
                }
            }
        }

        Commands::Config => show_config(&ctx.config, json_output)?,
    }

    Ok(())
}

// ─── Ingestion ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct IngestOutcome {
    papers: Vec<Paper>,
    stats: UpsertStats,
    written: bool,
    failures: Vec<String>,
}

/// Normalize `raws`; with `add` write them, with `expand` also write their neighborhoods.
async fn ingest(
    ctx: &IngestContext,
    raws: &[RawPaper],
    add: bool,
    expand: bool,
) -> Result<IngestOutcome> {
    let mut outcome = IngestOutcome {
        papers: raws.iter().filter_map(normalize).collect(),
        written: add || expand,
        ..IngestOutcome::default()
    };

    if expand {
        let expander = ctx.expander();
        for paper in &outcome.papers {
            match expander.expand(&paper.id).await {
                Ok(report) => {
                    outcome.stats += report.stats;
                    let failures = report.failures.iter();
                    outcome
                        .failures
                        .extend(failures.map(|f| format!("{}: {}", paper.id, f.error)));
                }
                Err(e) => outcome.failures.push(format!("{}: {e}", paper.id)),
            }
        }
    } else if add {
        for paper in &outcome.papers {
            match ctx.upsert.upsert_paper(paper).await {
                Ok(stats) => outcome.stats += stats,
                Err(e) => outcome.failures.push(format!("{}: {e}", paper.id)),
            }
        }
    }

    Ok(outcome)
}

// ─── Output ─────────────────────────────────────────────────────────────────

fn report_papers(outcome: &IngestOutcome, json_output: bool, start: Instant) -> Result<()> {
    let dur = start.elapsed().as_millis();
    if json_output {
        return print_json(&json!({
            "status": "ok",
            "data": {
                "items": outcome.papers,
                "total": outcome.papers.len(),
                "written": outcome.written,
                "stats": outcome.stats,
                "failures": outcome.failures,
            },
            "meta": { "duration_ms": dur }
        }));
    }

    if outcome.papers.is_empty() {
        println!("No papers found.");
    }
    for paper in &outcome.papers {
        print_paper(paper);
    }
    print_write_summary(outcome);
    Ok(())
}

fn print_paper(paper: &Paper) {
    let year = if paper.year > 0 {
        paper.year.to_string()
    } else {
        String::new()
    };
    println!(
        "{id:<40}  {year:<4}  {title}  - {author}",
        id = paper.id,
        title = paper.title,
        author = paper.primary_author,
    );
}

fn print_write_summary(outcome: &IngestOutcome) {
    if !outcome.written {
        return;
    }
    println!(
        "Created {} nodes, {} relationships",
        outcome.stats.nodes_created, outcome.stats.relationships_created
    );
    for failure in &outcome.failures {
        eprintln!("  failed: {failure}");
    }
}

fn show_config(config: &AppConfig, json_output: bool) -> Result<()> {
    let path = AppConfig::config_path();
    let api_key = if config.api.api_key.is_some() {
        "set (redacted)"
    } else {
        "not set"
    };

    if json_output {
        return print_json(&json!({
            "status": "ok",
            "data": {
                "path": path.display().to_string(),
                "config": config,
                "api_key": api_key,
            }
        }));
    }

    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(config)?);
    println!("# api key ({}): {api_key}", config.api.api_key_env);
    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    if let Some(e) = err.downcast_ref::<IngestError>() {
        return match e {
            IngestError::NotFound(_) => ExitCode::NotFound,
            IngestError::Http(_) | IngestError::Api { .. } | IngestError::RateLimited { .. } => {
                ExitCode::NetworkError
            }
            IngestError::Store(CiteGraphError::ConfigError(_)) => ExitCode::ConfigError,
            _ => ExitCode::GeneralError,
        };
    }
    match err.downcast_ref::<CiteGraphError>() {
        Some(CiteGraphError::ConfigError(_) | CiteGraphError::TomlParse(_)) => {
            ExitCode::ConfigError
        }
        _ => ExitCode::GeneralError,
    }
}

fn code_name(code: &ExitCode) -> &'static str {
    match code {
        ExitCode::Success => "ok",
        ExitCode::GeneralError => "error",
        ExitCode::NotFound => "not_found",
        ExitCode::InvalidArgs => "invalid_args",
        ExitCode::ConfigError => "config",
        ExitCode::NetworkError => "network",
    }
}
