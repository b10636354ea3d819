//! Petstore persistence CLI.
//!
//! # Responsibility
//! - Verify `petstore_core` linkage (`ping`).
//! - Print cascade plans for the sample household (`demo-cascade`).
//! - Walk through REQUIRES_NEW and NESTED scopes and print the transaction
//!   events (`demo-propagation`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use petstore_core::model::petstore::{self, build_household, BREED};
use petstore_core::{
    plan, AttrValue, Attributes, CoreConfig, MemoryDatabase, Operation, PersistError, RecordArena,
    SqliteDatabase, Store, TransactionDefinition, TransactionManager, UnitOfWork, WritePlan,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "petstore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cascade planning and transaction propagation demos", long_about = None)]
struct Cli {
    /// Log level (trace|debug|info|warn|error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; logging is off without one
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print core linkage information
    Ping,

    /// Plan and persist the sample household, then delete it
    DemoCascade {
        /// Persist into this SQLite file instead of memory
        #[arg(long)]
        sqlite: Option<PathBuf>,
    },

    /// Run REQUIRES_NEW and NESTED scenarios in memory
    DemoPropagation,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    petstore_core::logging::init_from_config(&config).context("failed to start logging")?;

    match cli.command {
        Commands::Ping => {
            println!("petstore_core ping={}", petstore_core::ping());
            println!("petstore_core version={}", petstore_core::core_version());
        }
        Commands::DemoCascade { sqlite } => demo_cascade(sqlite)?,
        Commands::DemoPropagation => demo_propagation(&config)?,
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<CoreConfig> {
    let mut config = match &cli.config {
        Some(path) => CoreConfig::load(path)
            .with_context(|| format!("failed to load config `{}`", path.display()))?,
        None => CoreConfig::default(),
    };
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(dir) = &cli.log_dir {
        config.log_dir = Some(dir.clone());
    }
    config.validate()?;
    Ok(config)
}

fn demo_cascade(sqlite: Option<PathBuf>) -> Result<()> {
    match sqlite {
        Some(path) => {
            let db = SqliteDatabase::open(&path)
                .with_context(|| format!("failed to open `{}`", path.display()))?;
            run_cascade(UnitOfWork::new(db.clone(), db))
        }
        None => {
            let session = MemoryDatabase::new().connect();
            run_cascade(UnitOfWork::new(session.clone(), session))
        }
    }
}

fn run_cascade<S, C>(mut uow: UnitOfWork<S, C>) -> Result<()>
where
    S: Store,
    C: petstore_core::Connection,
{
    let schema = Arc::new(petstore::schema()?);
    let mut arena = RecordArena::new(schema);
    let breed_attrs = Attributes::from([("name".to_string(), AttrValue::from("Beagle"))]);
    let breed_id = uow.store().insert(BREED, &breed_attrs)?;
    let breed = uow.load(&mut arena, BREED, breed_id)?;
    let household = build_household(&mut arena, breed)?;

    print_plan("save", &plan(&arena, Operation::CreateOrUpdate, household.owner)?);
    let saved = uow.save(&mut arena, household.owner, TransactionDefinition::required())?;
    println!("saved {} records", saved.executed.len());

    print_plan("delete", &plan(&arena, Operation::Delete, household.owner)?);
    uow.delete(&mut arena, household.owner, TransactionDefinition::required())?;
    println!(
        "remaining pets={} breeds={}",
        uow.count(petstore::PET)?,
        uow.count(BREED)?
    );
    Ok(())
}

fn print_plan(label: &str, plan: &WritePlan) {
    println!("{label} plan ({} entries):", plan.len());
    for (index, entry) in plan.entries.iter().enumerate() {
        println!("  {}. {}", index + 1, entry);
    }
}

fn demo_propagation(config: &CoreConfig) -> Result<()> {
    let db = MemoryDatabase::from_settings(&config.transaction);
    let session = db.connect();
    let mut uow = UnitOfWork::with_manager(
        session.clone(),
        TransactionManager::with_config(session, &config.transaction),
    );
    let schema = Arc::new(petstore::schema()?);

    // REQUIRES_NEW survives the outer rollback.
    let mut arena = RecordArena::new(Arc::clone(&schema));
    let audited = arena.create_with(petstore::OWNER, [("name", "audit")])?;
    let discarded = arena.create_with(petstore::OWNER, [("name", "discarded")])?;
    let outcome: Result<(), PersistError> =
        uow.transactional(TransactionDefinition::required(), |uow| {
            uow.save(&mut arena, discarded, TransactionDefinition::required())?;
            uow.save(&mut arena, audited, TransactionDefinition::requires_new())?;
            Err(PersistError::ReadOnlyViolation { entries: 0 })
        });
    info!(
        "event=cli_demo module=cli status=ok scenario=requires_new outcome_err={}",
        outcome.is_err()
    );
    println!(
        "requires_new: owners after outer rollback = {}",
        uow.count(petstore::OWNER)?
    );
    println!(
        "requires_new: records restored to transient = {}, discarded transient = {}",
        uow.reconcile(&mut arena),
        arena.record(discarded)?.is_transient()
    );

    // NESTED failure only undoes the savepoint.
    let mut arena = RecordArena::new(Arc::clone(&schema));
    let kept = arena.create_with(petstore::OWNER, [("name", "kept")])?;
    let nested = arena.create_with(petstore::OWNER, [("name", "nested")])?;
    uow.transactional(TransactionDefinition::required(), |uow| {
        uow.save(&mut arena, kept, TransactionDefinition::required())?;
        let inner = uow.transactional(TransactionDefinition::nested(), |uow| {
            uow.save(&mut arena, nested, TransactionDefinition::required())?;
            Err::<(), _>(PersistError::ReadOnlyViolation { entries: 0 })
        });
        println!("nested: inner failed = {}", inner.is_err());
        Ok(())
    })?;
    println!("nested: owners = {}", uow.count(petstore::OWNER)?);

    println!("{}", db.tracker().detailed_report());
    Ok(())
}
