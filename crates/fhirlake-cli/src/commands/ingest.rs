use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fhirlake_fetch::{
    ClientSecretCredential, FetcherConfig, ResourceFetcher, StaticToken, Termination,
    TokenProvider,
};
use fhirlake_table::{LakehouseTable, SaveReport, TableSchema, TableSink, flatten_entries};

use crate::config::{AppConfig, ConfigError};
use crate::output::{print_error, print_success, print_warning, truncate};

/// What one ingest run did.
#[derive(Debug)]
pub struct IngestSummary {
    pub fetched: usize,
    pub pages: usize,
    pub rows: usize,
    pub termination: Termination,
    /// `None` for dry runs and failed writes.
    pub saved: Option<SaveReport>,
}

/// Token provider selected by the identity section.
pub fn token_provider(config: &AppConfig) -> Result<Arc<dyn TokenProvider>> {
    let identity = &config.identity;
    if let Some(token) = identity.access_token.as_deref()
        && identity.has_static_token()
    {
        tracing::debug!("using pre-issued access token");
        return Ok(Arc::new(StaticToken::new(token)));
    }

    let field = |value: &Option<String>, name: &str| -> Result<String> {
        value
            .clone()
            .ok_or_else(|| ConfigError(format!("{name} is required")).into())
    };
    let tenant_id = field(&identity.tenant_id, "identity.tenant_id")?;
    let scope = identity
        .resolved_scope(&config.fhir.url)
        .map_err(ConfigError)?;

    let credential = ClientSecretCredential::new(
        &tenant_id,
        field(&identity.client_id, "identity.client_id")?,
        field(&identity.client_secret, "identity.client_secret")?,
        scope,
    )?
    .with_authority_host(&identity.authority_host, &tenant_id)?;

    tracing::debug!(token_url = %credential.token_url(), "using client credentials");
    Ok(Arc::new(credential))
}

fn fetcher_config(config: &AppConfig) -> FetcherConfig {
    let mut fetcher = FetcherConfig::new();
    if let Some(secs) = config.fhir.timeout_secs {
        fetcher = fetcher.with_request_timeout(Duration::from_secs(secs));
    }
    if let Some(pages) = config.fhir.max_pages {
        fetcher = fetcher.with_max_pages(pages);
    }
    fetcher
}

/// The table configured in the lakehouse section.
pub fn lakehouse(config: &AppConfig) -> LakehouseTable {
    LakehouseTable::new(&config.lakehouse.path)
        .with_format(config.lakehouse.format)
        .with_mode(config.lakehouse.mode)
        .with_merge_schema(config.lakehouse.merge_schema)
        .with_compression(config.lakehouse.compression)
}

/// Acquire a token, fetch every page, flatten, and write the table.
///
/// Write failures are reported and logged but do not fail the run.
pub async fn run(config: &AppConfig, sink: &dyn TableSink, dry_run: bool) -> Result<IngestSummary> {
    let tokens = token_provider(config)?;

    // Fail fast on bad credentials before touching the FHIR server.
    let token = tokens
        .token()
        .await
        .context("failed to fetch a new token")?;
    tracing::info!(token = %token.preview(), "access token acquired");

    let fetcher = ResourceFetcher::new(tokens, fetcher_config(config))
        .context("failed to build HTTP client")?;
    let outcome = fetcher
        .fetch_all(&config.fhir.url)
        .await
        .with_context(|| format!("failed to fetch {}", config.fhir.url))?;

    match &outcome.termination {
        Termination::Exhausted => {}
        Termination::HttpStatus { status, body } => {
            tracing::warn!(
                status,
                body = %truncate(body, 500),
                "server stopped pagination early; keeping partial results"
            );
            print_warning(&format!(
                "Pagination stopped with HTTP {status}; results are partial"
            ));
        }
        Termination::PageLimit { pages } => {
            tracing::warn!(pages, "page limit reached; keeping partial results");
            print_warning(&format!("Stopped after {pages} page(s) (fhir.max_pages)"));
        }
    }
    print_success(&format!(
        "Total resources fetched: {} ({} page(s))",
        outcome.entries.len(),
        outcome.pages
    ));

    let schema = TableSchema::patient().context("bundled Patient schema is invalid")?;
    let table = flatten_entries(&outcome.entries, &schema);
    println!("{}", schema.tree_string());
    println!("Rows: {}", table.row_count());

    let saved = if dry_run {
        tracing::info!(rows = table.row_count(), "dry run, table not written");
        None
    } else {
        match sink.save(&table) {
            Ok(report) => {
                print_success(&format!(
                    "Wrote {} row(s) to {}",
                    report.rows,
                    report.data_file.display()
                ));
                Some(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to write table");
                print_error(&format!("Failed to write table: {e}"));
                None
            }
        }
    };

    Ok(IngestSummary {
        fetched: outcome.entries.len(),
        pages: outcome.pages,
        rows: table.row_count(),
        termination: outcome.termination,
        saved,
    })
}
