//! repayment-engine CLI
//!
//! # Usage
//!
//! ```bash
//! # Rate table maintenance
//! repayment-engine rates show --store rates.csv
//! repayment-engine rates update --store rates.csv --sheet upload.csv
//! repayment-engine rates export --store rates.csv --sofr sofr.csv --hibor hibor.csv
//!
//! # Recalculate and check one pasted LMS report
//! repayment-engine calc --store rates.csv --input report.txt --maker Alex
//!
//! # Maker row from a settlement email
//! repayment-engine email --input email.txt --maker Alex
//!
//! # Transfer legs from an approval batch, reconciled against the bank export
//! repayment-engine transfers --input approval.tsv --bank-csv dbs.csv --date 2025-06-15
//!
//! # Funder balances, LMS against bank
//! repayment-engine balances --funders funders.csv --bank dbs_balances.csv --lms lms_balances.csv
//! ```
//!
//! Set `RUST_LOG=info` (or `debug`) to follow the calculation.

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use repayment_engine::calculation::allocation::AllocationMode;
use repayment_engine::calculation::classify::{ClassificationOverrides, FunderType, ProductType, RateType};
use repayment_engine::calculation::interest::OpsType;
use repayment_engine::checker::balance::BalanceReport;
use repayment_engine::checker::summary::MakerSummary;
use repayment_engine::config::EngineConfig;
use repayment_engine::core::dates::format_iso;
use repayment_engine::input::email::parse_email_summary;
use repayment_engine::rates::storage::{write_hibor_export, write_sofr_export, RateStore};
use repayment_engine::session::{AppState, ProcessOptions};
use repayment_engine::transfer::reconcile::ReconciliationReport;
use repayment_engine::transfer::routing::TransferLeg;
use serde::Serialize;
use std::error::Error;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Parser, Debug)]
#[command(name = "repayment-engine", version, about = "Loan repayment interest calculation and transfer reconciliation")]
struct Cli {
    /// JSON file overriding engine defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Benchmark rate table maintenance
    #[command(subcommand)]
    Rates(RatesCommand),
    /// Recalculate interest for one LMS report and check it
    Calc(CalcArgs),
    /// Build the maker row from a settlement email
    Email(EmailArgs),
    /// Build transfer legs from an approval batch
    Transfers(TransferArgs),
    /// Compare funder balances between the LMS and the bank
    Balances(BalanceArgs),
}

#[derive(Subcommand, Debug)]
enum RatesCommand {
    /// Row count and last calculation date
    Show {
        #[arg(long)]
        store: PathBuf,
    },
    /// Merge an uploaded rate sheet (CSV) into the store
    Update {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        sheet: PathBuf,
    },
    /// Write the SOFR and HIBOR views
    Export {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        sofr: PathBuf,
        #[arg(long)]
        hibor: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum Format {
    #[default]
    Text,
    Json,
}

#[derive(Args, Debug)]
struct CalcArgs {
    /// Rate table; falls back to `rate_store` from the config
    #[arg(long)]
    store: Option<PathBuf>,
    /// Pasted LMS report
    #[arg(long)]
    input: PathBuf,
    #[arg(long, default_value = "repayment")]
    ops: OpsType,
    /// Small-merchant allocation
    #[arg(long)]
    xdj: bool,
    #[arg(long)]
    product: Option<ProductType>,
    #[arg(long)]
    rate_type: Option<RateType>,
    #[arg(long)]
    funder_type: Option<FunderType>,
    #[arg(long, default_value = "")]
    maker: String,
    /// Summary date, YYYY-MM-DD; today when omitted
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long, value_enum, default_value_t)]
    format: Format,
}

#[derive(Args, Debug)]
struct EmailArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long, default_value = "")]
    maker: String,
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long, value_enum, default_value_t)]
    format: Format,
}

#[derive(Args, Debug)]
struct TransferArgs {
    /// Approval batch, tab- or comma-separated
    #[arg(long)]
    input: PathBuf,
    /// Bank export to reconcile against
    #[arg(long)]
    bank_csv: Option<PathBuf>,
    /// Posting date used in the keys; today when omitted
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long, value_enum, default_value_t)]
    format: Format,
}

#[derive(Args, Debug)]
struct BalanceArgs {
    #[arg(long)]
    funders: PathBuf,
    #[arg(long)]
    bank: PathBuf,
    #[arg(long)]
    lms: PathBuf,
    #[arg(long, value_enum, default_value_t)]
    format: Format,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_text(path: &Path) -> Result<String, Box<dyn Error>> {
    fs::read_to_string(path).map_err(|e| format!("cannot read '{}': {}", path.display(), e).into())
}

fn cmd_rates(command: RatesCommand, config: &EngineConfig) -> CliResult {
    match command {
        RatesCommand::Show { store } => {
            let table = RateStore::new(store).load()?;
            println!("Rows:      {}", table.len());
            println!(
                "Last date: {}",
                table.max_date().map(format_iso).unwrap_or_else(|| "-".to_string())
            );
        }
        RatesCommand::Update { store, sheet } => {
            let mut state = AppState::open(config.clone(), RateStore::new(store))?;
            let update = state.update_rates(File::open(&sheet)?)?;
            println!(
                "Added {} date(s), ignored {} stale row(s); {} rows, last date {}",
                update.added,
                update.skipped,
                update.rows,
                update.last_date.map(format_iso).unwrap_or_else(|| "-".to_string())
            );
        }
        RatesCommand::Export { store, sofr, hibor } => {
            let table = RateStore::new(store).load()?;
            let sofr_rows = write_sofr_export(File::create(&sofr)?, &table)?;
            let hibor_rows = write_hibor_export(File::create(&hibor)?, &table, config.hibor_export_cutoff)?;
            println!("SOFR:  {} rows -> {}", sofr_rows, sofr.display());
            println!("HIBOR: {} rows -> {}", hibor_rows, hibor.display());
        }
    }
    Ok(())
}

fn cmd_calc(args: CalcArgs, config: EngineConfig) -> CliResult {
    let state = match args.store {
        Some(path) => AppState::open(config, RateStore::new(path))?,
        None => AppState::from_config(config)?,
    };
    let text = read_text(&args.input)?;

    let mut options = ProcessOptions::new(args.maker, args.date.unwrap_or_else(today));
    options.calculation.ops = args.ops;
    if args.xdj {
        options.calculation.mode = AllocationMode::Xdj;
    }
    options.overrides = ClassificationOverrides {
        product: args.product,
        rate: args.rate_type,
        funder: args.funder_type,
    };

    let context = state.process_trade(&text, &options)?;
    info!("run {} finished", context.run_id);

    match args.format {
        Format::Json => print_json(&context)?,
        Format::Text => {
            if let Some(result) = &context.result {
                println!("{}\n", result);
            }
            if let Some(report) = &context.report {
                println!("{}\n", report);
            }
            if let Some(summary) = &context.summary {
                println!("{}\n", summary);
                println!("{}", MakerSummary::tsv_header());
                println!("{}", summary.to_tsv_row());
            }
        }
    }
    Ok(())
}

fn cmd_email(args: EmailArgs) -> CliResult {
    let text = read_text(&args.input)?;
    let summary = parse_email_summary(&text, args.date.unwrap_or_else(today), &args.maker)?;
    match args.format {
        Format::Json => print_json(&summary)?,
        Format::Text => {
            println!("{}\n", summary);
            println!("{}", MakerSummary::tsv_header());
            println!("{}", summary.to_tsv_row());
        }
    }
    Ok(())
}

fn cmd_transfers(args: TransferArgs, config: EngineConfig) -> CliResult {
    let state = AppState::new(config);
    let text = read_text(&args.input)?;
    let legs = state.build_transfers(&text, args.date.unwrap_or_else(today))?;

    let report = match &args.bank_csv {
        Some(path) => {
            let rows = state.read_bank_rows(File::open(path)?)?;
            Some(state.reconcile(&legs, &rows))
        }
        None => None,
    };

    match args.format {
        Format::Json => {
            #[derive(Serialize)]
            struct TransferOutput<'a> {
                legs: &'a [TransferLeg],
                reconciliation: Option<&'a ReconciliationReport>,
            }
            print_json(&TransferOutput {
                legs: &legs,
                reconciliation: report.as_ref(),
            })?;
        }
        Format::Text => {
            println!("=== Transfer Legs ===");
            for leg in &legs {
                let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<18} {:<14} {:<4} {:>15} {} -> {} {}",
                    leg.posting_key,
                    leg.trade_code,
                    leg.currency,
                    leg.amount.map(|a| format!("{:.2}", a)).unwrap_or_else(|| "-".to_string()),
                    show(&leg.debit_account),
                    show(&leg.credit_account),
                    if leg.valid { String::new() } else { format!("INVALID: {}", leg.issue) }
                );
            }
            if let Some(report) = &report {
                println!("\n{}", report);
            }
        }
    }
    Ok(())
}

fn cmd_balances(args: BalanceArgs) -> CliResult {
    let report = BalanceReport::from_files(&args.funders, &args.bank, &args.lms)?;
    match args.format {
        Format::Json => print_json(&report)?,
        Format::Text => println!("{}", report),
    }
    Ok(())
}

fn main() -> CliResult {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Rates(command) => cmd_rates(command, &config),
        Command::Calc(args) => cmd_calc(args, config),
        Command::Email(args) => cmd_email(args),
        Command::Transfers(args) => cmd_transfers(args, config),
        Command::Balances(args) => cmd_balances(args),
    }
}
