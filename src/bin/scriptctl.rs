use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use script_backfill::cli;
use script_backfill::database_ops::mapping::SourceLayout;
use script_backfill::database_ops::store::StoreSchema;
use script_backfill::logging::init_tracing;
use script_backfill::normalization::identifier::SchemePreset;
use script_backfill::util::env;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "scriptctl", version, about = "Script URL backfill CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Backfill script URLs into the dialogue store from spreadsheet exports
    Reconcile {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        sources: SourceArgs,
        /// Apply the batch inside a transaction, report, then roll it back
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Print the merged identifier -> URL mapping built from the sources
    Mapping {
        #[command(flatten)]
        sources: SourceArgs,
    },
    /// Report titles still missing a URL, grouped into identifier ranges
    Missing {
        #[command(flatten)]
        store: StoreArgs,
        /// Identifier scheme (defaults to SCRIPT_ID_SCHEME or broad)
        #[arg(long, value_enum)]
        scheme: Option<SchemeArg>,
    },
    /// Print the identifier extracted from each title
    Extract {
        /// Titles to run through the extractor
        #[arg(required = true)]
        titles: Vec<String>,
        /// Identifier scheme (defaults to SCRIPT_ID_SCHEME or broad)
        #[arg(long, value_enum)]
        scheme: Option<SchemeArg>,
    },
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Dialogue store path or http(s) URL (defaults to SCRIPT_DB)
    #[arg(long)]
    db: Option<String>,
    /// Dialogue table name
    #[arg(long, default_value = "dialogues")]
    table: String,
    /// Column holding the script title
    #[arg(long, default_value = "script_name")]
    title_column: String,
    /// Column holding the script URL
    #[arg(long, default_value = "script_url")]
    url_column: String,
}

impl StoreArgs {
    fn schema(&self) -> Result<StoreSchema> {
        StoreSchema::new(&self.table, &self.title_column, &self.url_column)
    }
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Spreadsheet export, highest precedence first. Forms:
    /// name=path:id_col:url_col:skip, name=path:scan:skip,
    /// progress-new=path, archive-2019=path
    #[arg(long = "source", required = true, value_parser = parse_source)]
    sources: Vec<SourceLayout>,
    /// Identifier scheme (defaults to SCRIPT_ID_SCHEME or broad)
    #[arg(long, value_enum)]
    scheme: Option<SchemeArg>,
    /// Accepted URL host; repeatable (defaults to SCRIPT_ALLOWED_HOSTS or docs.google.com)
    #[arg(long = "allow-host")]
    allowed_hosts: Vec<String>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SchemeArg {
    Broad,
    BSeries,
}

impl From<SchemeArg> for SchemePreset {
    fn from(arg: SchemeArg) -> Self {
        match arg {
            SchemeArg::Broad => SchemePreset::Broad,
            SchemeArg::BSeries => SchemePreset::BSeries,
        }
    }
}

fn parse_source(raw: &str) -> Result<SourceLayout, String> {
    raw.parse::<SourceLayout>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    init_tracing("info")?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Reconcile {
            store,
            sources,
            dry_run,
        } => {
            let summary = cli::reconcile::run(cli::reconcile::ReconcileConfig {
                schema: store.schema()?,
                store: store.db,
                sources: sources.sources,
                scheme: sources.scheme.map(Into::into),
                allowed_hosts: sources.allowed_hosts,
                dry_run,
            })
            .await?;
            info!(
                matched = summary.matched,
                updated_rows = summary.updated_rows,
                still_missing = summary.still_missing_count(),
                "reconcile: completed"
            );
        }
        Commands::Mapping { sources } => {
            cli::mapping::run(cli::mapping::MappingConfig {
                sources: sources.sources,
                scheme: sources.scheme.map(Into::into),
                allowed_hosts: sources.allowed_hosts,
            })?;
        }
        Commands::Missing { store, scheme } => {
            cli::missing::run(cli::missing::MissingConfig {
                schema: store.schema()?,
                store: store.db,
                scheme: scheme.map(Into::into),
            })
            .await?;
        }
        Commands::Extract { titles, scheme } => {
            cli::extract::run(cli::extract::ExtractConfig {
                titles,
                scheme: scheme.map(Into::into),
            })?;
        }
    }
    Ok(())
}
