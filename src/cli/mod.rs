use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::application::{
    BatchOptions, BatchResult, RecognitionService, RecordOutcome, RunReport, process_batch,
};
use crate::domain::{JoinedRecord, format_cents, join_records};
use crate::io::{
    ExportOptions, Exporter, ImportOptions, ImportResult, Importer, read_enrollments_csv,
    read_products_csv,
};

/// Revrec - day-by-day revenue recognition for enrollment fees
#[derive(Parser)]
#[command(name = "revrec")]
#[command(about = "Spreads enrollment fees across the days their course is delivered")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "REVREC_DATABASE", default_value = "revrec.db")]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Import enrollments or products from CSV
    Import {
        /// What to import: enrollments, products
        import_type: String,

        /// Input file (stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,

        /// Preview without importing
        #[arg(long)]
        dry_run: bool,

        /// Validate without importing
        #[arg(long)]
        validate: bool,
    },

    /// Allocate every enrollment and write ledger, trace and summary files
    Run {
        /// Directory for the output files
        #[arg(short, long, env = "REVREC_OUTPUT_DIR", default_value = "output")]
        output_dir: PathBuf,

        /// Read enrollments from this CSV instead of the database
        #[arg(long, requires = "products")]
        enrollments: Option<PathBuf>,

        /// Read products from this CSV instead of the database
        #[arg(long, requires = "enrollments")]
        products: Option<PathBuf>,

        /// Process records on a single thread
        #[arg(long)]
        sequential: bool,

        /// Write a UTF-8 byte-order mark at the start of each CSV
        #[arg(long)]
        bom: bool,

        /// Also write report.json
        #[arg(long)]
        json: bool,

        /// Reconciliation tolerance in cents
        #[arg(long, default_value = "1")]
        tolerance: i64,
    },

    /// Show how a single enrollment is resolved and allocated
    Explain {
        /// Enrollment code
        code: String,
    },

    /// Show input table counts
    Stats,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init => {
                RecognitionService::init(&self.database).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Import {
                import_type,
                input,
                dry_run,
                validate,
            } => {
                let service = RecognitionService::connect(&self.database).await?;
                run_import_command(&service, &import_type, input, dry_run, validate).await?;
            }

            Commands::Run {
                output_dir,
                enrollments,
                products,
                sequential,
                bom,
                json,
                tolerance,
            } => {
                if tolerance < 0 {
                    bail!("Tolerance must not be negative");
                }
                let options = BatchOptions {
                    parallel: !sequential,
                    tolerance_cents: tolerance,
                };
                let export = ExportOptions {
                    excel_bom: bom,
                    json_report: json,
                };

                let (source, batch) = match (enrollments, products) {
                    (Some(enrollments), Some(products)) => {
                        let records = load_csv_records(&enrollments, &products)?;
                        let source = format!("{} + {}", enrollments.display(), products.display());
                        (source, process_batch(&records, &options))
                    }
                    _ => {
                        let service = RecognitionService::connect(&self.database).await?;
                        (self.database.clone(), service.run(&options).await?)
                    }
                };

                let mut report = RunReport::new(source, &options, &batch);
                Exporter::new(&batch, export).write_all(&output_dir, &mut report)?;
                print_run_summary(&batch, &output_dir);
            }

            Commands::Explain { code } => {
                let service = RecognitionService::connect(&self.database).await?;
                let (record, outcome) = service.explain(&code).await?;
                print_explanation(&record, &outcome);
            }

            Commands::Stats => {
                let service = RecognitionService::connect(&self.database).await?;
                let stats = service.stats().await?;
                println!("Enrollments:           {}", stats.enrollments);
                println!("Products:              {}", stats.products);
                println!("Unmatched enrollments: {}", stats.unmatched_enrollments);
            }
        }

        Ok(())
    }
}

fn open_input(input: Option<String>) -> Result<Box<dyn Read>> {
    Ok(match input {
        Some(path) => Box::new(
            File::open(&path).with_context(|| format!("Failed to open input file: {}", path))?,
        ),
        None => Box::new(io::stdin()),
    })
}

async fn run_import_command(
    service: &RecognitionService,
    import_type: &str,
    input: Option<String>,
    dry_run: bool,
    validate: bool,
) -> Result<()> {
    let reader = open_input(input)?;
    let importer = Importer::new(service);
    let options = ImportOptions {
        dry_run,
        validate_only: validate,
    };

    let result = match import_type {
        "enrollments" => importer.import_enrollments_csv(reader, options).await?,
        "products" => importer.import_products_csv(reader, options).await?,
        _ => bail!(
            "Unknown import type: {}. Use: enrollments, products",
            import_type
        ),
    };

    if validate {
        println!("Validation successful");
    } else if dry_run {
        println!("Dry run complete (nothing stored)");
    } else {
        println!("Import complete");
    }
    print_import_result(&result);
    Ok(())
}

fn print_import_result(result: &ImportResult) {
    println!("  Imported: {}", result.imported);
    println!("  Skipped:  {}", result.skipped);
    println!("  Errors:   {}", result.errors.len());

    if !result.errors.is_empty() {
        println!("\nErrors:");
        for error in result.errors.iter().take(10) {
            println!(
                "  Line {}: {} {}",
                error.line,
                error
                    .field
                    .as_ref()
                    .map(|f| format!("[{}]", f))
                    .unwrap_or_default(),
                error.error
            );
        }
        if result.errors.len() > 10 {
            println!("  ... and {} more errors", result.errors.len() - 10);
        }
    }
}

fn load_csv_records(enrollments: &Path, products: &Path) -> Result<Vec<JoinedRecord>> {
    let file = File::open(enrollments)
        .with_context(|| format!("Failed to open {}", enrollments.display()))?;
    let parsed_enrollments = read_enrollments_csv(file)?;

    let file =
        File::open(products).with_context(|| format!("Failed to open {}", products.display()))?;
    let parsed_products = read_products_csv(file)?;

    let errors = parsed_enrollments.errors.len() + parsed_products.errors.len();
    if errors > 0 {
        for error in parsed_enrollments
            .errors
            .iter()
            .chain(&parsed_products.errors)
        {
            eprintln!("  Line {}: {}", error.line, error.error);
        }
        bail!("{} input rows could not be parsed", errors);
    }

    info!(
        enrollments = parsed_enrollments.records.len(),
        products = parsed_products.records.len(),
        "Loaded input files"
    );
    Ok(join_records(
        parsed_enrollments.records,
        &parsed_products.records,
    ))
}

fn print_run_summary(batch: &BatchResult, output_dir: &Path) {
    let rec = &batch.reconciliation;

    println!("Revenue allocation");
    println!("  Enrollments:  {}", rec.record_count);
    println!("  Allocated:    {}", rec.allocated_count);
    println!("  Skipped:      {}", rec.unallocated_count);
    println!("  Ledger rows:  {}", batch.ledger.len());
    println!("  Warnings:     {}", batch.issues.len());
    println!();
    println!("{:<20} {:>14}", "Input total", format_cents(rec.input_total));
    println!("{:<20} {:>14}", "Allocated", format_cents(rec.allocated_total));
    println!("{:<20} {:>14}", "Not allocated", format_cents(rec.unallocated_total));
    println!("{}", "-".repeat(35));
    println!("{:<20} {:>14}", "Difference", format_cents(rec.difference()));

    if rec.is_balanced() {
        println!("\n✓ Ledger reconciles with input fees");
    } else {
        println!("\n✗ Ledger does not reconcile with input fees");
        for mismatch in rec.mismatches.iter().take(10) {
            println!(
                "  {}: expected {}, allocated {}",
                mismatch.enrollment_code,
                format_cents(mismatch.expected),
                format_cents(mismatch.allocated)
            );
        }
    }
    println!("\nOutput written to {}", output_dir.display());
}

fn print_explanation(record: &JoinedRecord, outcome: &RecordOutcome) {
    let trace = &outcome.trace;
    let show = |date: Option<chrono::NaiveDate>| {
        date.map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    println!("Enrollment: {}", trace.enrollment_code);
    println!("  Amount:            {}", format_cents(trace.amount_cents));
    println!("  Enrollment date:   {}", show(trace.enrollment_date));
    println!(
        "  Product:           {}",
        record.enrollment.product_id.as_deref().unwrap_or("-")
    );
    match &record.product {
        Some(_) => {
            println!(
                "  Modality:          {}",
                trace.modality.as_deref().unwrap_or("-")
            );
            println!(
                "  Recognition:       {} .. {}",
                show(trace.recognition_start),
                show(trace.recognition_end)
            );
            println!(
                "  Product window:    {} .. {}",
                show(trace.product_start),
                show(trace.product_end)
            );
            println!(
                "  Duration (months): {}",
                trace
                    .duration_months
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
        }
        None => println!("  (no matching product)"),
    }
    println!();
    println!("  Origin:            {}", trace.origin);
    println!("  Status:            {}", trace.status.as_str());
    println!(
        "  Interval:          {} .. {}",
        show(trace.resolved_start),
        show(trace.resolved_end)
    );
    if let Some(issue) = &outcome.issue {
        println!("  Warning:           {}", issue);
    }

    println!();
    if outcome.entries.is_empty() {
        println!("No allocation possible.");
        return;
    }

    println!("{:<12} {:>12}", "DATE", "AMOUNT");
    println!("{}", "-".repeat(25));
    const MAX_ROWS: usize = 31;
    for entry in outcome.entries.iter().take(MAX_ROWS) {
        println!(
            "{:<12} {:>12}",
            entry.date.to_string(),
            format_cents(entry.amount_cents)
        );
    }
    if outcome.entries.len() > MAX_ROWS {
        println!("... and {} more days", outcome.entries.len() - MAX_ROWS);
    }
    let total: i64 = outcome.entries.iter().map(|e| e.amount_cents).sum();
    println!("{}", "-".repeat(25));
    println!("{:<12} {:>12}", "TOTAL", format_cents(total));
}
