// Catalog Sync - Command Line
// One reconciliation session per invocation: fetch the window, classify,
// optionally run a single confirmed operation, print the result.

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use catalog_sync::{
    logging, parse_date, CatalogAccessor, ClassificationSnapshot, DateRange, Field, ImportDefaults,
    LedgerExport, Operation, OperationReport, ReconciliationSession, SqliteCatalog, SyncConfig,
};

const USAGE: &str = "\
Usage: catalog-sync [--from DATE] [--to DATE] [--yes] <command> [args]

Commands:
  status                           Classify the window (default)
  expand [WEEKS]                   Grow the window WEEKS weeks back (default 1)
  link <LEDGER_ID> <LOCAL_ID>      Link a catalog product to a ledger product
  import <LEDGER_ID> [CATEGORY]    Create a catalog product from a ledger product
  update <LEDGER_ID> <LOCAL_ID>    Copy ledger name/price/status onto the catalog product
  categories                       List catalog categories
  add-category <NAME>              Create a catalog category

Config: $CATALOG_SYNC_CONFIG or ./catalog-sync.json (defaults otherwise)";

struct Options {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    assume_yes: bool,
    command: Vec<String>,
}

fn parse_args(args: Vec<String>) -> Result<Options> {
    let mut options = Options {
        from: None,
        to: None,
        assume_yes: false,
        command: Vec::new(),
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--from" | "--to" => {
                let value = iter.next().with_context(|| format!("{} needs a date", arg))?;
                let date = parse_date(&value).with_context(|| format!("Not a date: {}", value))?;
                if arg == "--from" {
                    options.from = Some(date);
                } else {
                    options.to = Some(date);
                }
            }
            "--yes" | "-y" => options.assume_yes = true,
            _ => options.command.push(arg),
        }
    }

    Ok(options)
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();

    let options = parse_args(env::args().skip(1).collect())?;
    let config = SyncConfig::load()?;

    let command: Vec<&str> = options.command.iter().map(|s| s.as_str()).collect();
    match command.as_slice() {
        [] | ["status"] => run_status(&config, &options).await,
        ["expand"] => run_expand(&config, &options, 1).await,
        ["expand", weeks] => {
            let weeks: u32 = weeks.parse().with_context(|| format!("Not a number: {}", weeks))?;
            run_expand(&config, &options, weeks).await
        }
        ["link", ledger_id, local_id] => {
            let op = Operation::Link {
                ledger_id: ledger_id.to_string(),
                local_id: local_id.to_string(),
            };
            run_operation(&config, &options, op).await
        }
        ["import", ledger_id, rest @ ..] if rest.len() <= 1 => {
            let defaults = ImportDefaults {
                category_id: rest.first().map(|s| s.to_string()),
            };
            let op = Operation::Import {
                ledger_id: ledger_id.to_string(),
                defaults,
            };
            run_operation(&config, &options, op).await
        }
        ["update", ledger_id, local_id] => {
            let op = Operation::Update {
                ledger_id: ledger_id.to_string(),
                local_id: local_id.to_string(),
            };
            run_operation(&config, &options, op).await
        }
        ["categories"] => run_categories(&config).await,
        ["add-category", name @ ..] if !name.is_empty() => run_add_category(&config, &name.join(" ")),
        ["help"] | ["--help"] | ["-h"] => {
            println!("{}", USAGE);
            Ok(())
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

fn open_catalog(config: &SyncConfig) -> Result<SqliteCatalog> {
    Ok(SqliteCatalog::open(&config.database_path)?.with_actor(&config.actor))
}

async fn open_session(config: &SyncConfig, options: &Options) -> Result<ReconciliationSession> {
    let end = options.to.unwrap_or_else(|| Local::now().date_naive());
    let start = options
        .from
        .unwrap_or_else(|| DateRange::trailing_days(end, config.window_days).start);

    println!("🔄 Catalog Sync v{}", catalog_sync::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📂 Ledger export: {:?}", config.ledger_export_path);
    println!("🗄️  Catalog:       {:?}", config.database_path);

    let catalog = open_catalog(config)?;
    let ledger = LedgerExport::from_csv_path(config.ledger_export_path.clone());

    let session = ReconciliationSession::open(
        Arc::new(ledger),
        Arc::new(catalog),
        config,
        start,
        end,
    )
    .await?;
    Ok(session)
}

async fn run_status(config: &SyncConfig, options: &Options) -> Result<()> {
    let session = open_session(config, options).await?;
    print_classification(&session.classification());
    Ok(())
}

async fn run_expand(config: &SyncConfig, options: &Options, weeks: u32) -> Result<()> {
    let mut session = open_session(config, options).await?;

    for _ in 0..weeks {
        let window = session.expand_window().await?;
        println!("⏪ Window now {} → {} ({} records)", window.start, window.end, window.record_count());
        if !window.has_more {
            println!("   (nothing new in the last week fetched)");
        }
    }

    print_classification(&session.classification());
    Ok(())
}

async fn run_operation(config: &SyncConfig, options: &Options, operation: Operation) -> Result<()> {
    let mut session = open_session(config, options).await?;

    let prompt = session.request(operation)?;
    println!("\n❓ {}", prompt.title);
    println!("   {}", prompt.message);

    if !options.assume_yes && !confirm()? {
        session.dismiss();
        println!("↩️  Dismissed, nothing changed");
        return Ok(());
    }

    let report = session.confirm().await;
    print_report(&report);
    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_categories(config: &SyncConfig) -> Result<()> {
    let catalog = open_catalog(config)?;
    let categories = catalog.list_categories().await?;

    if categories.is_empty() {
        println!("No categories yet. Create one with: catalog-sync add-category <NAME>");
        return Ok(());
    }

    println!("🏷️  {} categories", categories.len());
    for category in categories {
        println!("   {}  {}", category.id, category.name);
    }
    Ok(())
}

fn run_add_category(config: &SyncConfig, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Category name must not be empty");
    }
    let catalog = open_catalog(config)?;
    let category = catalog.add_category(name)?;
    println!("✓ Created category {} ({})", category.name, category.id);
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn confirm() -> Result<bool> {
    print!("   Proceed? [y/N] ");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn field_name(field: Field) -> &'static str {
    match field {
        Field::Name => "name",
        Field::Price => "price",
        Field::Status => "status",
    }
}

fn print_classification(snapshot: &ClassificationSnapshot) {
    let window = &snapshot.window;
    println!(
        "\n📅 Window {} → {}: {} ledger records{}",
        window.start,
        window.end,
        window.record_count,
        if window.has_more { "" } else { " (no older records found)" }
    );

    println!("\n🆕 Unlinked ({})", snapshot.unlinked.len());
    for entry in &snapshot.unlinked {
        let record = &entry.record;
        println!("   {}  {}  {}  {}", record.id, record.code, record.name, record.price);
        if let Some(candidate) = &entry.candidate {
            println!(
                "      💡 maybe \"{}\" ({}, score {:.2})",
                candidate.local_name, candidate.local_id, candidate.score
            );
        }
    }

    println!("\n⚠️  Different ({})", snapshot.diff.len());
    for pair in &snapshot.diff {
        println!("   {}  {}  ↔  {}", pair.ledger.id, pair.ledger.name, pair.local.id);
        for difference in &pair.differences {
            println!(
                "      {}: ledger {} / catalog {}",
                field_name(difference.field),
                difference.ledger_value,
                difference.local_value
            );
        }
    }

    println!("\n✅ Synced ({})", snapshot.synced.len());
    for pair in &snapshot.synced {
        println!("   {}  {}  ↔  {}", pair.ledger.id, pair.ledger.name, pair.local.id);
    }
}

fn print_report(report: &OperationReport) {
    match &report.outcome {
        Ok(outcome) => {
            let effect = if outcome.wrote { "applied" } else { "already in place" };
            println!(
                "\n🎉 {} {} ({}): catalog product {} is now {:?}",
                outcome.kind, outcome.ledger_id, effect, outcome.local.id, outcome.to
            );
        }
        Err(err) => {
            eprintln!("\n❌ {}", err.title());
            eprintln!("   {}", err.message());
        }
    }
    print_classification(&report.snapshot);
}
