//! Command surface of the `parish` binary.
//!
//! - [`run_cli`] executes a fully parsed command line: it loads the
//!   configuration, opens and prepares the store, and dispatches.
//! - [`run_command`] executes one command against an existing store and
//!   [`Session`], so a long-lived host can unlock an area once and reuse it.
//!
//! Member registration, member listings and pastoral request submission are
//! public. Pastoral care management, finance and bulk clearing require the
//! passphrase of their protected area.

pub mod config;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use parish_registry_core::{
    bracket_distribution, finance_report, format_date, format_timestamp, hash_passphrase, now_utc,
    parse_date, Baptized, BracketDistribution, Capability, Credentials, Direction, FinanceReport,
    MaritalStatus, Member, NewMember, NewPastoralRequest, NewTransaction, PastoralRequest,
    ProtectedArea, RecordKind, RegistryError, Session, Transaction,
};
use parish_registry_store_sqlite::SqliteRecordStore;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{credentials_snippet, AppConfig, DEFAULT_CONFIG_PATH};

#[derive(Debug, Parser)]
#[command(name = "parish")]
#[command(about = "Parish registry: members, pastoral care and finances")]
pub struct Cli {
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Overrides the database path from the configuration file.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Passphrase for the protected area the command touches.
    #[arg(long, env = "PARISH_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, env = "PARISH_LOG", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    #[must_use]
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Schema {
        #[command(subcommand)]
        command: SchemaCommand,
    },
    Member {
        #[command(subcommand)]
        command: Box<MemberCommand>,
    },
    Pastoral {
        #[command(subcommand)]
        command: Box<PastoralCommand>,
    },
    Finance {
        #[command(subcommand)]
        command: Box<FinanceCommand>,
    },
    Admin {
        #[command(subcommand)]
        command: AdminCommand,
    },
    Credential {
        #[command(subcommand)]
        command: CredentialCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum SchemaCommand {
    /// Creates missing tables and verifies the existing layout.
    Ensure,
}

#[derive(Debug, Subcommand)]
pub enum MemberCommand {
    Add(MemberAddArgs),
    List(OutputArgs),
    Remove(IdArgs),
    /// Member count per age bracket.
    Report(OutputArgs),
}

#[derive(Debug, Args)]
pub struct MemberAddArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    marital_status: MaritalStatusArg,
    #[arg(long)]
    age: u32,
    #[arg(long)]
    residence: String,
    #[arg(long)]
    baptized: BaptizedArg,
    #[arg(long, default_value_t = 0)]
    years_in_congregation: u32,
}

#[derive(Debug, Subcommand)]
pub enum PastoralCommand {
    Submit(PastoralSubmitArgs),
    List(OutputArgs),
    Attend(IdArgs),
    Remove(IdArgs),
}

#[derive(Debug, Args)]
pub struct PastoralSubmitArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    description: String,
}

#[derive(Debug, Subcommand)]
pub enum FinanceCommand {
    Record(FinanceRecordArgs),
    List(OutputArgs),
    Remove(IdArgs),
    /// Totals, monthly flow and income by category.
    Report(OutputArgs),
}

#[derive(Debug, Args)]
pub struct FinanceRecordArgs {
    #[arg(long)]
    direction: DirectionArg,
    /// Income takes tithe, offering or donation; expenses take any label.
    #[arg(long)]
    category: String,
    #[arg(long)]
    amount: f64,
    /// Calendar date (`YYYY-MM-DD`); defaults to today (UTC).
    #[arg(long)]
    date: Option<String>,
    #[arg(long, default_value = "")]
    note: String,
}

#[derive(Debug, Subcommand)]
pub enum AdminCommand {
    /// Removes every record of one store.
    Clear(AdminClearArgs),
}

#[derive(Debug, Args)]
pub struct AdminClearArgs {
    #[arg(long)]
    store: StoreArg,
    #[arg(long)]
    confirm: bool,
}

#[derive(Debug, Subcommand)]
pub enum CredentialCommand {
    /// Prints a salted hash of `--passphrase` as a configuration snippet.
    Hash(CredentialHashArgs),
}

#[derive(Debug, Args)]
pub struct CredentialHashArgs {
    #[arg(long)]
    area: AreaArg,
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct IdArgs {
    #[arg(long)]
    id: i64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MaritalStatusArg {
    Single,
    Married,
    Widowed,
    Divorced,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BaptizedArg {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DirectionArg {
    Income,
    Expense,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StoreArg {
    Members,
    Pastoral,
    Finance,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AreaArg {
    PastoralCare,
    Finance,
    Admin,
}

#[derive(Debug, Serialize)]
struct Created {
    kind: RecordKind,
    id: i64,
}

#[derive(Debug, Serialize)]
struct Removed {
    kind: RecordKind,
    id: i64,
    deleted: bool,
}

#[derive(Debug, Serialize)]
struct Attended {
    id: i64,
    attended: bool,
}

#[derive(Debug, Serialize)]
struct Cleared {
    kind: RecordKind,
    removed: usize,
}

/// Executes the parsed top-level command line.
///
/// # Errors
/// Returns an error when the configuration cannot be loaded, the store cannot
/// be opened or prepared, access is denied, or the command itself fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    let Cli {
        config: config_path,
        db,
        passphrase,
        command,
        ..
    } = cli;

    if let Command::Credential { command } = command {
        return run_credential(&command, passphrase.as_deref());
    }

    let mut config = AppConfig::load_or_default(&config_path)?;
    if let Some(db) = db {
        config.database = db;
    }

    let store = SqliteRecordStore::open(&config.database)?;
    store.ensure_schema().with_context(|| {
        format!(
            "failed to prepare registry at {}",
            config.database.display()
        )
    })?;
    let mut session = Session::new();
    run_command(command, &store, &mut session, &config, passphrase.as_deref())
}

/// Executes one command against an open store.
///
/// Protected commands use a capability already held by `session`, or unlock
/// their area with `passphrase` first.
///
/// # Errors
/// Returns an error when access is denied or validation, persistence or
/// output fails.
pub fn run_command(
    command: Command,
    store: &SqliteRecordStore,
    session: &mut Session,
    config: &AppConfig,
    passphrase: Option<&str>,
) -> Result<()> {
    match command {
        Command::Schema { command } => match command {
            SchemaCommand::Ensure => {
                store.ensure_schema()?;
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "database": store.path().display().to_string(),
                        "schema": "ensured",
                    }))?
                );
                Ok(())
            }
        },
        Command::Member { command } => run_member(*command, store),
        Command::Pastoral { command } => match *command {
            PastoralCommand::Submit(args) => {
                let id = store.insert(&NewPastoralRequest {
                    name: args.name,
                    description: args.description,
                })?;
                print_json(&Created {
                    kind: RecordKind::PastoralRequest,
                    id,
                })
            }
            protected => {
                let capability = unlock(session, ProtectedArea::PastoralCare, config, passphrase)?;
                run_pastoral(protected, store, &capability)
            }
        },
        Command::Finance { command } => {
            let capability = unlock(session, ProtectedArea::Finance, config, passphrase)?;
            run_finance(*command, store, &capability, &config.currency)
        }
        Command::Admin { command } => {
            let capability = unlock(session, ProtectedArea::Admin, config, passphrase)?;
            run_admin(command, store, &capability)
        }
        Command::Credential { command } => run_credential(&command, passphrase),
    }
}

fn unlock(
    session: &mut Session,
    area: ProtectedArea,
    config: &AppConfig,
    passphrase: Option<&str>,
) -> Result<Capability> {
    if let Ok(capability) = session.capability(area) {
        debug!(area = area.as_str(), "reusing unlocked area");
        return Ok(capability);
    }

    let Some(passphrase) = passphrase else {
        return Err(anyhow::Error::new(RegistryError::AccessDenied(format!(
            "{} requires --passphrase or PARISH_PASSPHRASE",
            area.as_str()
        ))));
    };

    let capability = session.unlock(area, passphrase, &config.credentials)?;
    info!(area = area.as_str(), "protected area unlocked");
    Ok(capability)
}

fn run_member(command: MemberCommand, store: &SqliteRecordStore) -> Result<()> {
    match command {
        MemberCommand::Add(args) => {
            let id = store.insert(&NewMember {
                name: args.name,
                marital_status: map_marital_status(args.marital_status),
                age: args.age,
                residence: args.residence,
                baptized: map_baptized(args.baptized),
                years_in_congregation: args.years_in_congregation,
            })?;
            print_json(&Created {
                kind: RecordKind::Member,
                id,
            })
        }
        MemberCommand::List(args) => {
            let members = store.list_all::<Member>()?;
            if args.json {
                print_json(&members)
            } else {
                print_members(&members)
            }
        }
        MemberCommand::Remove(args) => print_json(&Removed {
            kind: RecordKind::Member,
            id: args.id,
            deleted: store.delete(RecordKind::Member, args.id)?,
        }),
        MemberCommand::Report(args) => {
            let distribution = bracket_distribution(&store.list_all::<Member>()?);
            if args.json {
                print_json(&distribution)
            } else {
                print_bracket_distribution(&distribution);
                Ok(())
            }
        }
    }
}

fn run_pastoral(
    command: PastoralCommand,
    store: &SqliteRecordStore,
    capability: &Capability,
) -> Result<()> {
    capability.require(ProtectedArea::PastoralCare)?;

    match command {
        PastoralCommand::List(args) => {
            let requests = store.list_all::<PastoralRequest>()?;
            if args.json {
                print_json(&requests)
            } else {
                print_pastoral_requests(&requests)
            }
        }
        PastoralCommand::Attend(args) => print_json(&Attended {
            id: args.id,
            attended: store.mark_request_attended(args.id)?,
        }),
        PastoralCommand::Remove(args) => print_json(&Removed {
            kind: RecordKind::PastoralRequest,
            id: args.id,
            deleted: store.delete(RecordKind::PastoralRequest, args.id)?,
        }),
        PastoralCommand::Submit(_) => Err(anyhow!(
            "internal dispatch error: submit is public and handled before unlocking"
        )),
    }
}

fn run_finance(
    command: FinanceCommand,
    store: &SqliteRecordStore,
    capability: &Capability,
    currency: &str,
) -> Result<()> {
    capability.require(ProtectedArea::Finance)?;

    match command {
        FinanceCommand::Record(args) => {
            let date = match args.date.as_deref() {
                Some(raw) => parse_date(raw)?,
                None => now_utc().date(),
            };
            let id = store.insert(&NewTransaction {
                direction: map_direction(args.direction),
                category: args.category,
                amount: args.amount,
                date,
                note: args.note,
            })?;
            print_json(&Created {
                kind: RecordKind::Transaction,
                id,
            })
        }
        FinanceCommand::List(args) => {
            let transactions = store.list_all::<Transaction>()?;
            if args.json {
                print_json(&transactions)
            } else {
                print_transactions(&transactions, currency)
            }
        }
        FinanceCommand::Remove(args) => print_json(&Removed {
            kind: RecordKind::Transaction,
            id: args.id,
            deleted: store.delete(RecordKind::Transaction, args.id)?,
        }),
        FinanceCommand::Report(args) => {
            let report = finance_report(&store.list_all::<Transaction>()?);
            if args.json {
                print_json(&report)
            } else {
                print_finance_report(&report, currency);
                Ok(())
            }
        }
    }
}

fn run_admin(
    command: AdminCommand,
    store: &SqliteRecordStore,
    capability: &Capability,
) -> Result<()> {
    capability.require(ProtectedArea::Admin)?;

    match command {
        AdminCommand::Clear(args) => {
            let kind = map_store(args.store);
            if !args.confirm {
                return Err(anyhow::Error::new(RegistryError::Validation(format!(
                    "clearing {} requires --confirm",
                    kind.as_str()
                ))));
            }
            let removed = store.clear(kind)?;
            print_json(&Cleared { kind, removed })
        }
    }
}

fn run_credential(command: &CredentialCommand, passphrase: Option<&str>) -> Result<()> {
    match command {
        CredentialCommand::Hash(args) => {
            let Some(passphrase) = passphrase else {
                return Err(anyhow::Error::new(RegistryError::Validation(
                    "credential hash requires --passphrase or PARISH_PASSPHRASE".to_string(),
                )));
            };
            let hash = hash_passphrase(passphrase)?;

            let mut credentials = Credentials::default();
            match args.area {
                AreaArg::PastoralCare => credentials.pastoral_care = Some(hash),
                AreaArg::Finance => credentials.finance = Some(hash),
                AreaArg::Admin => credentials.admin = Some(hash),
            }
            print!("{}", credentials_snippet(&credentials)?);
            Ok(())
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(value).context("failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}

fn print_members(members: &[Member]) -> Result<()> {
    println!(
        "{:<6} {:<24} {:<9} {:<4} {:<8} {:<20} {:<8} {:<5} registered",
        "id", "name", "marital", "age", "bracket", "residence", "baptized", "years"
    );
    println!("{}", "-".repeat(110));

    for member in members {
        println!(
            "{:<6} {:<24} {:<9} {:<4} {:<8} {:<20} {:<8} {:<5} {}",
            member.id,
            member.name,
            member.marital_status.as_str(),
            member.age,
            member.bracket.as_str(),
            member.residence,
            member.baptized.as_str(),
            member.years_in_congregation,
            format_date(member.created_at.date())?
        );
    }
    Ok(())
}

fn print_bracket_distribution(distribution: &BracketDistribution) {
    if distribution.is_empty() {
        println!("no members registered");
        return;
    }

    println!("{:<10} {:>6} {:>7}", "bracket", "count", "share");
    println!("{}", "-".repeat(25));
    for share in &distribution.shares {
        println!(
            "{:<10} {:>6} {:>6.1}%",
            share.bracket.as_str(),
            share.count,
            share.proportion * 100.0
        );
    }
    println!("total={}", distribution.total);
}

fn print_pastoral_requests(requests: &[PastoralRequest]) -> Result<()> {
    println!(
        "{:<6} {:<9} {:<28} {:<24} description",
        "id", "status", "requested_at", "name"
    );
    println!("{}", "-".repeat(100));

    for request in requests {
        println!(
            "{:<6} {:<9} {:<28} {:<24} {}",
            request.id,
            request.status.as_str(),
            format_timestamp(request.requested_at)?,
            request.name,
            request.description
        );
    }
    Ok(())
}

fn print_transactions(transactions: &[Transaction], currency: &str) -> Result<()> {
    println!(
        "{:<6} {:<10} {:<8} {:<16} {:>18} note",
        "id", "date", "flow", "category", "amount"
    );
    println!("{}", "-".repeat(90));

    for transaction in transactions {
        println!(
            "{:<6} {:<10} {:<8} {:<16} {:>18} {}",
            transaction.id,
            format_date(transaction.date)?,
            transaction.direction.as_str(),
            transaction.category,
            format_amount(currency, transaction.amount),
            transaction.note
        );
    }
    Ok(())
}

fn print_finance_report(report: &FinanceReport, currency: &str) {
    let totals = &report.totals;
    println!("income:  {}", format_amount(currency, totals.income));
    println!("expense: {}", format_amount(currency, totals.expense));
    println!("balance: {}", format_amount(currency, totals.balance));

    if !report.monthly.is_empty() {
        println!();
        println!("{:<8} {:>18} {:>18}", "month", "income", "expense");
        println!("{}", "-".repeat(46));
        for flow in &report.monthly {
            println!(
                "{:<8} {:>18} {:>18}",
                flow.month.to_string(),
                format_amount(currency, flow.income),
                format_amount(currency, flow.expense)
            );
        }
    }

    if !report.income_by_category.is_empty() {
        println!();
        println!("{:<10} {:>18}", "category", "income");
        println!("{}", "-".repeat(29));
        for entry in &report.income_by_category {
            println!(
                "{:<10} {:>18}",
                entry.category,
                format_amount(currency, entry.total)
            );
        }
    }
}

/// Renders `amount` as `<currency> 1,234.56`.
fn format_amount(currency: &str, amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && fixed != "0.00" {
        "-"
    } else {
        ""
    };
    format!("{currency} {sign}{grouped}.{cents}")
}

fn map_marital_status(value: MaritalStatusArg) -> MaritalStatus {
    match value {
        MaritalStatusArg::Single => MaritalStatus::Single,
        MaritalStatusArg::Married => MaritalStatus::Married,
        MaritalStatusArg::Widowed => MaritalStatus::Widowed,
        MaritalStatusArg::Divorced => MaritalStatus::Divorced,
    }
}

fn map_baptized(value: BaptizedArg) -> Baptized {
    match value {
        BaptizedArg::Yes => Baptized::Yes,
        BaptizedArg::No => Baptized::No,
    }
}

fn map_direction(value: DirectionArg) -> Direction {
    match value {
        DirectionArg::Income => Direction::Income,
        DirectionArg::Expense => Direction::Expense,
    }
}

fn map_store(value: StoreArg) -> RecordKind {
    match value {
        StoreArg::Members => RecordKind::Member,
        StoreArg::Pastoral => RecordKind::PastoralRequest,
        StoreArg::Finance => RecordKind::Transaction,
    }
}
