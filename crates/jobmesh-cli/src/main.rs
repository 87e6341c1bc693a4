use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use jobmesh_client::SourceCatalog;
use jobmesh_core::{
    AggregationResult, FetchParams, Orchestrator, OrchestratorConfig, SourceRegistry,
};

#[derive(Parser)]
#[command(name = "jobmesh", version, about = "Multi-source job posting aggregator")]
struct Cli {
    /// Path to the JSON source catalog
    #[arg(long, global = true, env = "JOBMESH_CATALOG", default_value = "sources.json")]
    catalog: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, deduplicate, and enrich postings from the catalog's sources
    Fetch {
        /// Search keyword (repeatable)
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,

        #[arg(short, long)]
        location: Option<String>,

        #[arg(short, long)]
        company: Option<String>,

        #[arg(long, default_value_t = 50)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Only postings from the last N days
        #[arg(long)]
        days: Option<u32>,

        /// Restrict to these sources (repeatable); defaults to every enabled source
        #[arg(short, long = "source")]
        sources: Vec<String>,

        /// Also query sources whose last health check failed
        #[arg(long, default_value_t = false)]
        include_unhealthy: bool,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Probe source health
    Health {
        /// Sources to probe (repeatable); defaults to all
        #[arg(short, long = "source")]
        sources: Vec<String>,
    },

    /// List sources and what they support
    Sources,

    /// Show registry and concurrency statistics
    Stats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jobmesh=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = OrchestratorConfig::from_env().context("Invalid JOBMESH_* configuration")?;
    let registry = Arc::new(load_registry(&cli.catalog)?);

    let initialized = registry.initialize_all().await;
    let failed: Vec<&str> = initialized
        .iter()
        .filter(|(_, ok)| !**ok)
        .map(|(name, _)| name.as_str())
        .collect();
    if !failed.is_empty() {
        tracing::warn!(sources = ?failed, "Some sources failed to initialize and will be skipped");
    }

    let orchestrator =
        Orchestrator::new(Arc::clone(&registry), config).context("Invalid orchestrator config")?;

    let outcome = run(cli.command, &orchestrator).await;
    registry.shutdown().await;
    outcome
}

fn load_registry(catalog: &Path) -> Result<SourceRegistry> {
    let catalog = SourceCatalog::load(catalog)
        .with_context(|| format!("Failed to load source catalog: {}", catalog.display()))?;
    catalog
        .build_registry()
        .context("Failed to build sources from catalog")
}

async fn run(command: Commands, orchestrator: &Orchestrator) -> Result<()> {
    match command {
        Commands::Fetch {
            keywords,
            location,
            company,
            limit,
            offset,
            days,
            sources,
            include_unhealthy,
            format,
        } => {
            let mut params = FetchParams::new(keywords)
                .with_limit(limit)
                .with_offset(offset);
            params.location = location;
            params.company = company;
            params.date_range_days = days;

            let names = (!sources.is_empty()).then_some(sources.as_slice());
            let result = orchestrator
                .fetch_all_sources(&params, names, include_unhealthy)
                .await
                .context("Aggregation rejected")?;

            report_failures(&result);
            let stdout = std::io::stdout();
            match format {
                OutputFormat::Json => {
                    let mut out = stdout.lock();
                    serde_json::to_writer_pretty(&mut out, &result)?;
                    writeln!(out)?;
                }
                OutputFormat::Csv => write_csv(&result, stdout.lock())?,
            }
        }
        Commands::Health { sources } => {
            let names = (!sources.is_empty()).then_some(sources.as_slice());
            let reports = orchestrator.health_check_sources(names).await;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Commands::Sources => {
            let capabilities = orchestrator.source_capabilities();
            println!("{}", serde_json::to_string_pretty(&capabilities)?);
        }
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&orchestrator.stats())?);
        }
    }

    Ok(())
}

fn report_failures(result: &AggregationResult) {
    for (source, failure) in &result.errors {
        tracing::warn!(%source, kind = %failure.kind, error = %failure.message, "Source failed");
    }
    tracing::info!(
        jobs = result.total_deduplicated,
        collected = result.total_collected,
        duplicates = result.duplicates_removed,
        successful = result.successful_sources,
        failed = result.failed_sources,
        "Done"
    );
}

const CSV_HEADER: [&str; 11] = [
    "source",
    "id",
    "title",
    "company",
    "location",
    "url",
    "job_type",
    "remote_friendly",
    "keyword_matches",
    "date_posted",
    "aggregated_at",
];

fn write_csv<W: Write>(result: &AggregationResult, out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(CSV_HEADER)?;
    for aggregated in &result.jobs {
        let job = &aggregated.job;
        let matches = aggregated.keyword_matches.to_string();
        let posted = job.date_posted.map(|d| d.to_rfc3339()).unwrap_or_default();
        let stamped = aggregated.aggregated_at.to_rfc3339();
        writer.write_record([
            job.source.as_str(),
            job.id.as_str(),
            job.title.as_str(),
            job.company.as_str(),
            job.location.as_deref().unwrap_or_default(),
            job.url.as_deref().unwrap_or_default(),
            aggregated.job_type.as_str(),
            if aggregated.remote_friendly { "true" } else { "false" },
            matches.as_str(),
            posted.as_str(),
            stamped.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobmesh_core::testutil::{MockSource, job};

    #[test]
    fn test_fetch_args_parse() {
        let cli = Cli::try_parse_from([
            "jobmesh",
            "--catalog",
            "cat.json",
            "fetch",
            "-k",
            "product manager",
            "-k",
            "tpm",
            "--source",
            "feed",
            "--format",
            "csv",
            "--days",
            "7",
        ])
        .unwrap();

        assert_eq!(cli.catalog, PathBuf::from("cat.json"));
        match cli.command {
            Commands::Fetch {
                keywords,
                sources,
                format,
                days,
                limit,
                ..
            } => {
                assert_eq!(keywords, vec!["product manager", "tpm"]);
                assert_eq!(sources, vec!["feed"]);
                assert_eq!(format, OutputFormat::Csv);
                assert_eq!(days, Some(7));
                assert_eq!(limit, 50);
            }
            _ => panic!("expected fetch"),
        }
    }

    #[tokio::test]
    async fn test_csv_output() {
        let registry = Arc::new(SourceRegistry::new());
        registry.register(
            Arc::new(MockSource::new("feed").with_jobs(vec![
                job("feed", "1", "Remote Product Manager", "Acme, Inc."),
            ])),
            None,
        );
        let orchestrator = Orchestrator::new(registry, OrchestratorConfig::default()).unwrap();
        let result = orchestrator
            .fetch_all_sources(&FetchParams::new(["pm"]), None, false)
            .await
            .unwrap();

        let mut buf = Vec::new();
        write_csv(&result, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();

        assert_eq!(lines.next().unwrap(), CSV_HEADER.join(","));
        let row = lines.next().unwrap();
        assert!(row.starts_with("feed,1,Remote Product Manager,\"Acme, Inc.\",,"));
        assert!(row.contains(",executive,true,1,"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_missing_catalog_has_context() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_registry(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to load source catalog"));

        let Err(err) = load_registry(&dir.path().join("also-missing.json")) else {
            panic!("missing catalog should not load");
        };
        assert!(format!("{err:#}").contains("Cannot read catalog"));
    }
}
