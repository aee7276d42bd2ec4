use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tierline_core::{Config, Dimension, Layer, MetricCatalog, Report, SchemaDictionary, Severity};
use tierline_engine::{
    build_report, explain, import_metrics, repair_referential_integrity, DatabaseDdlSink, DdlSink, DictionaryStore,
    DirectoryDdlSink, EngineError, ExplainRequest, ImportSource, JsonDictionaryStore, JsonMetricStore, MetricImportRow,
    MetricStore, QualityStatus, SinkStatus, TabularExtract,
};
use tierline_lineage::resolve_formula;
use tierline_schema::{DdlGenerator, DependencyGraph};

/// Tierline - metric and schema lineage for layered risk data
#[derive(Parser)]
#[command(name = "tierline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: tierline.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the dictionary and metric catalog for consistency
    Check {
        /// Output file for report.json
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,

        /// Also output markdown report
        #[arg(short, long)]
        markdown: Option<PathBuf>,
    },

    /// Generate DDL for one or all layers
    Ddl {
        /// Only this layer (L1, L2 or L3)
        #[arg(short, long)]
        layer: Option<String>,

        /// Print to stdout instead of writing files
        #[arg(long)]
        print: bool,

        /// Execute against the configured database
        #[arg(long, conflicts_with = "print")]
        execute: bool,
    },

    /// Show what depends on a table
    Impact {
        /// Table name
        table: String,
    },

    /// Order in which a batch of tables can be dropped
    RemovalOrder {
        /// Tables to remove
        #[arg(required = true)]
        tables: Vec<String>,
    },

    /// Drop relationships whose target no longer exists
    Repair {
        /// Save the repaired dictionary (otherwise only report)
        #[arg(long)]
        write: bool,
    },

    /// Explain a metric value at a dimension
    Explain {
        metric_id: String,

        /// Dimension tag (facility, counterparty, desk, portfolio, lob or L3/L2/L1)
        dimension: String,

        #[arg(short, long, value_enum, default_value_t = Quality::Green)]
        quality: Quality,
    },

    /// Import metrics from a JSON document
    Import {
        /// Metric records, or a two-sheet extract with --tabular
        file: PathBuf,

        /// Treat the file as {"metrics": [...], "sourceFields": [...]}
        #[arg(long)]
        tabular: bool,

        /// Validate only; do not save the catalog
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the formula that applies to a metric at a dimension
    Formula { metric_id: String, dimension: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Quality {
    Green,
    Amber,
    Red,
}

impl From<Quality> for QualityStatus {
    fn from(quality: Quality) -> Self {
        match quality {
            Quality::Green => QualityStatus::Green,
            Quality::Amber => QualityStatus::Amber,
            Quality::Red => QualityStatus::Red,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    init_tracing(cli.verbose);

    // Load config if specified
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else if Path::new("tierline.toml").exists() {
        Config::from_file(Path::new("tierline.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    let result = match cli.command {
        Commands::Check { output, markdown } => check_command(&config, &output, markdown.as_deref()),
        Commands::Ddl { layer, print, execute } => ddl_command(&config, layer.as_deref(), print, execute),
        Commands::Impact { table } => impact_command(&config, &table),
        Commands::RemovalOrder { tables } => removal_order_command(&config, &tables),
        Commands::Repair { write } => repair_command(&config, write),
        Commands::Explain {
            metric_id,
            dimension,
            quality,
        } => explain_command(&config, metric_id, dimension, quality.into()),
        Commands::Import { file, tabular, dry_run } => import_command(&config, &file, tabular, dry_run),
        Commands::Formula { metric_id, dimension } => formula_command(&config, &metric_id, &dimension),
    };

    if let Err(e) = &result {
        if let Some(hint) = e.downcast_ref::<EngineError>().and_then(EngineError::hint) {
            eprintln!("{} {}", "hint:".cyan().bold(), hint);
        }
    }

    result
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_dictionary(config: &Config) -> Result<SchemaDictionary> {
    let path = config.resolve(&config.paths.dictionary);
    JsonDictionaryStore::new(&path)
        .load()
        .map_err(EngineError::from)?
        .ok_or(EngineError::DictionaryNotFound)
        .with_context(|| format!("loading {}", path.display()))
}

fn load_catalog(config: &Config) -> Result<MetricCatalog> {
    let builtins = match &config.paths.builtin_metrics {
        Some(path) => JsonMetricStore::new(config.resolve(path))
            .load()
            .map_err(EngineError::from)?,
        None => Vec::new(),
    };

    let mut catalog = MetricCatalog::with_builtins(builtins);
    catalog.reserve_ids(config.metrics.reserved_ids.iter().cloned());

    let custom = JsonMetricStore::new(config.resolve(&config.paths.metrics))
        .load()
        .map_err(EngineError::from)?;
    for metric in custom {
        catalog.upsert(metric).map_err(EngineError::from)?;
    }

    tracing::debug!(metrics = catalog.len(), "loaded metric catalog");
    Ok(catalog)
}

fn parse_dimension(tag: &str) -> Result<Dimension> {
    Ok(Dimension::from_tag(tag).map_err(EngineError::from)?)
}

fn banner(title: &str) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", title.bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();
}

fn footer() {
    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

/// Check command - integrity, derivation and metric contract checks
fn check_command(config: &Config, output: &Path, markdown: Option<&Path>) -> Result<()> {
    let dictionary = load_dictionary(config)?;
    let catalog = load_catalog(config)?;

    tracing::info!(
        tables = dictionary.tables().len(),
        metrics = catalog.len(),
        "running consistency checks"
    );
    let report = build_report(&dictionary, &catalog, &config.severity);

    report.save_to_file(output)?;
    tracing::info!(path = %output.display(), "report saved");

    if let Some(md_path) = markdown {
        std::fs::write(md_path, generate_markdown_report(&report))?;
        tracing::info!(path = %md_path.display(), "markdown report saved");
    }

    print_report_summary(&report);

    if report.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

/// DDL command - render, write or execute schema statements
fn ddl_command(config: &Config, layer: Option<&str>, print: bool, execute: bool) -> Result<()> {
    let dictionary = load_dictionary(config)?;
    let generator = DdlGenerator::new(config.ddl.clone());

    let layers: Vec<Layer> = match layer {
        Some(tag) => vec![Layer::from_tag(tag).map_err(EngineError::from)?],
        None => Layer::ALL.to_vec(),
    };

    let sink: Box<dyn DdlSink> = if execute {
        Box::new(DatabaseDdlSink::new(config.database.url_env.clone()))
    } else {
        Box::new(DirectoryDdlSink::new(config.resolve(&config.paths.ddl_dir)))
    };

    for layer in layers {
        let ddl = generator.layer_ddl(&dictionary, layer);

        for table in &ddl.empty_tables {
            eprintln!("{} {} has no fields, skipped", "warning:".yellow().bold(), table);
        }

        if print {
            println!("{}", ddl.sql);
            continue;
        }

        let status = sink.apply(&ddl).map_err(EngineError::from)?;
        let label = match status {
            SinkStatus::Written => "written".green(),
            SinkStatus::Unchanged => "unchanged".dimmed(),
        };
        println!("  {} {} ({}) {}", layer, label, sink.name(), &ddl.fingerprint[..12]);
    }

    Ok(())
}

/// Impact command - direct and transitive dependents of a table
fn impact_command(config: &Config, table: &str) -> Result<()> {
    let dictionary = load_dictionary(config)?;
    let table_def = dictionary
        .table(table)
        .ok_or_else(|| anyhow::anyhow!("Table '{}' not found in dictionary", table))?;

    let graph = DependencyGraph::from_dictionary(&dictionary);
    let impact = graph.table_impact(table);
    let downstream = graph.downstream(table);
    let consumers = dictionary.derivation().consumers_of(table);

    banner("Table Impact Analysis");
    println!("{} {}", "Table:".bold(), table_def.qualified_name().green());
    println!("{} {}", "Depends on:".bold(), impact.dependencies.join(", "));
    println!();

    if downstream.is_empty() && consumers.is_empty() {
        println!("{}", "✓ No dependents".green());
        println!("This table can be changed without affecting other tables.");
    } else {
        println!("{}", "Direct dependents:".bold());
        for rel in &impact.incoming_edges {
            println!("  - {}", rel.describe().yellow());
        }
        for consumer in &consumers {
            println!("  - {} {}", consumer.yellow(), "(derivation)".dimmed());
        }

        println!();
        println!("{} {}", "Transitive dependents:".bold(), downstream.len());
        for (i, dep) in downstream.iter().enumerate() {
            println!("  {}. {}", i + 1, dep);
        }

        println!();
        println!("{}", "⚠ Changes to this table may break dependent tables!".yellow().bold());
    }

    footer();
    Ok(())
}

/// Removal order command - safe drop order for a batch of tables
fn removal_order_command(config: &Config, tables: &[String]) -> Result<()> {
    let dictionary = load_dictionary(config)?;
    if let Some(missing) = tables.iter().find(|t| dictionary.table(t).is_none()) {
        anyhow::bail!("Table '{}' not found in dictionary", missing);
    }

    let graph = DependencyGraph::from_dictionary(&dictionary);
    let order = graph.suggested_removal_order(tables);
    let outside: Vec<String> = graph
        .impacted_tables(tables)
        .into_iter()
        .filter(|t| !tables.contains(t))
        .collect();

    banner("Suggested Removal Order");
    for (i, table) in order.iter().enumerate() {
        println!("  {}. {}", i + 1, table);
    }

    if !outside.is_empty() {
        println!();
        println!(
            "{} still referenced by tables outside the batch: {}",
            "⚠".yellow().bold(),
            outside.join(", ").yellow()
        );
    }

    footer();
    Ok(())
}

/// Repair command - remove dangling relationships
fn repair_command(config: &Config, write: bool) -> Result<()> {
    let dictionary = load_dictionary(config)?;
    let (repaired, removed) = repair_referential_integrity(&dictionary);

    if removed.is_empty() {
        println!("{}", "✓ All relationships resolve".green());
        return Ok(());
    }

    println!("{}", "Dangling relationships:".bold());
    for violation in &removed {
        println!("  - {} ({:?})", violation.relationship.describe().red(), violation.kind);
    }

    if write {
        let path = config.resolve(&config.paths.dictionary);
        JsonDictionaryStore::new(&path)
            .save(&repaired)
            .map_err(EngineError::from)?;
        println!("{} {} relationship(s) removed from {}", "✓".green(), removed.len(), path.display());
    } else {
        println!();
        println!("Re-run with {} to save the repaired dictionary.", "--write".bold());
    }

    Ok(())
}

/// Explain command - identity, formula and lineage as JSON
fn explain_command(config: &Config, metric_id: String, dimension: String, quality: QualityStatus) -> Result<()> {
    let catalog = load_catalog(config)?;
    let request = ExplainRequest { metric_id, dimension };
    let response = explain(&catalog, &request, quality)?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Import command - validate and upsert metrics
fn import_command(config: &Config, file: &Path, tabular: bool, dry_run: bool) -> Result<()> {
    let catalog = load_catalog(config)?;
    let contents = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;

    let source = if tabular {
        ImportSource::Tabular(serde_json::from_str::<TabularExtract>(&contents)?)
    } else {
        ImportSource::Records(serde_json::from_str::<Vec<MetricImportRow>>(&contents)?)
    };

    let (next, outcome) = import_metrics(&catalog, source);

    println!("{} {}", "Created:".bold(), outcome.created.len());
    println!("{} {}", "Updated:".bold(), outcome.updated.len());
    println!("{} {}", "Rejected:".bold(), outcome.rejected.len());

    for rejection in &outcome.rejected {
        let id = if rejection.id.is_empty() { "<no id>" } else { rejection.id.as_str() };
        println!("  row {} {}", rejection.row, id.red());
        for error in &rejection.errors {
            println!("    - {}", error);
        }
    }

    for orphan in &outcome.orphaned_source_fields {
        println!(
            "  {} source field row {} ({}.{}.{}) names unknown metric '{}'",
            "warn".yellow(),
            orphan.row,
            orphan.layer,
            orphan.table,
            orphan.field,
            orphan.metric_id
        );
    }

    if !dry_run && outcome.accepted() > 0 {
        let path = config.resolve(&config.paths.metrics);
        JsonMetricStore::new(&path)
            .save(&next.custom_metrics())
            .map_err(EngineError::from)?;
        println!("{} catalog saved to {}", "✓".green(), path.display());
    }

    if !outcome.rejected.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}

/// Formula command - resolved formula for one dimension
fn formula_command(config: &Config, metric_id: &str, dimension: &str) -> Result<()> {
    let catalog = load_catalog(config)?;
    let metric = catalog
        .get(metric_id)
        .ok_or_else(|| EngineError::MetricNotFound(metric_id.to_string()))?;
    let resolved = resolve_formula(metric, parse_dimension(dimension)?).map_err(EngineError::from)?;

    println!("{} {} ({:?})", "Dimension:".bold(), resolved.dimension.label(), resolved.origin);
    println!("{} {}", "Formula:".bold(), resolved.formula);
    if let Some(sql) = &resolved.formula_sql {
        println!("{} {}", "SQL:".bold(), sql);
    }

    Ok(())
}

fn severity_label(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Error => "ERROR".red().bold(),
        Severity::Warn => "WARN".yellow().bold(),
        Severity::Info => "INFO".cyan(),
    }
}

/// Print report summary to stdout
fn print_report_summary(report: &Report) {
    banner("Tierline Consistency Report");

    println!("Version: {}", report.version);
    println!("Timestamp: {}", report.timestamp);
    println!(
        "Checked: {} tables, {} relationships, {} metrics",
        report.summary.tables_checked, report.summary.relationships_checked, report.summary.metrics_checked
    );
    println!();

    println!("{}", "Summary:".bold());
    println!("  Total diagnostics: {}", report.summary.total);

    if report.summary.errors > 0 {
        println!("  Errors:   {}", format!("{}", report.summary.errors).red().bold());
    } else {
        println!("  Errors:   {}", format!("{}", report.summary.errors).green());
    }

    if report.summary.warnings > 0 {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).yellow());
    } else {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).green());
    }

    println!("  Info:     {}", report.summary.info);
    println!();

    if report.diagnostics.is_empty() {
        println!("{}", "✓ No issues found!".green().bold());
    } else {
        println!("{}", "Diagnostics:".bold());
        for diag in &report.diagnostics {
            println!("  [{}] {}: {}", severity_label(diag.severity), diag.code, diag.message);

            if let Some(loc) = &diag.location {
                println!("    at {}", loc);
            }
            if let Some(exp) = &diag.expected {
                println!("    Expected: {}", exp);
            }
            if let Some(act) = &diag.actual {
                println!("    Actual:   {}", act);
            }

            if !diag.impact.is_empty() {
                println!("    Impact: {} table(s)", diag.impact.len());
                for table in &diag.impact {
                    println!("      - {}", table);
                }
            }
        }
    }

    footer();
}

/// Generate markdown report
fn generate_markdown_report(report: &Report) -> String {
    let mut md = String::new();

    md.push_str("# Tierline Consistency Report\n\n");
    md.push_str(&format!("**Version:** {}\n\n", report.version));
    md.push_str(&format!("**Timestamp:** {}\n\n", report.timestamp));

    md.push_str("## Summary\n\n");
    md.push_str(&format!("- Tables checked: {}\n", report.summary.tables_checked));
    md.push_str(&format!("- Relationships checked: {}\n", report.summary.relationships_checked));
    md.push_str(&format!("- Metrics checked: {}\n", report.summary.metrics_checked));
    md.push_str(&format!("- Errors: {}\n", report.summary.errors));
    md.push_str(&format!("- Warnings: {}\n", report.summary.warnings));
    md.push_str(&format!("- Info: {}\n", report.summary.info));
    md.push('\n');

    if report.diagnostics.is_empty() {
        md.push_str("✅ **No issues found!**\n");
        return md;
    }

    md.push_str("## Diagnostics\n\n");
    for diag in &report.diagnostics {
        let severity_emoji = match diag.severity {
            Severity::Error => "❌",
            Severity::Warn => "⚠️",
            Severity::Info => "ℹ️",
        };

        md.push_str(&format!("### {} {} - {}\n\n", severity_emoji, diag.severity, diag.code));
        md.push_str(&format!("{}\n\n", diag.message));

        if let Some(loc) = &diag.location {
            md.push_str(&format!("**Location:** `{}`\n\n", loc));
        }
        if let Some(exp) = &diag.expected {
            md.push_str(&format!("**Expected:** `{}`\n\n", exp));
        }
        if let Some(act) = &diag.actual {
            md.push_str(&format!("**Actual:** `{}`\n\n", act));
        }

        if !diag.impact.is_empty() {
            md.push_str(&format!("**Impact:** {} table(s)\n\n", diag.impact.len()));
            for table in &diag.impact {
                md.push_str(&format!("- {}\n", table));
            }
            md.push('\n');
        }
    }

    md
}
