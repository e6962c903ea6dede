//! TableKV Demo Driver
//!
//! Walks through the table operations end to end: wipe, insert, batch
//! insert, range query, retrieve, replace, insert-or-replace, projection,
//! delete and table deletion. Expected failures are reported and the run
//! continues with the next step.

use std::ops::Bound;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tablekv::entity::{DynamicEntity, EntityKey, Properties, TableEntity};
use tablekv::{Config, Result, Table, TableBatchOperation, TableCatalog, TableError, TableOperation};
use tracing_subscriber::{fmt, EnvFilter};

/// TableKV demo
#[derive(Parser, Debug)]
#[command(name = "tablekv-demo")]
#[command(about = "Walk through TableKV table operations")]
#[command(version)]
struct Args {
    /// Table to run the walkthrough against
    #[arg(short, long, default_value = "people")]
    table: String,

    /// Snapshot file to load before and save after the run
    #[arg(short, long)]
    snapshot: Option<PathBuf>,

    /// Entities fetched per query page
    #[arg(short, long, default_value = "1000")]
    page_size: usize,
}

// =============================================================================
// Customer Record
// =============================================================================

/// A customer keyed by last name (partition) and first name (row)
#[derive(Debug, Clone)]
struct Customer {
    last_name: String,
    first_name: String,
    email: Option<String>,
    phone_number: Option<String>,
}

impl Customer {
    fn new(last_name: &str, first_name: &str, email: &str, phone_number: &str) -> Self {
        Self {
            last_name: last_name.to_string(),
            first_name: first_name.to_string(),
            email: Some(email.to_string()),
            phone_number: Some(phone_number.to_string()),
        }
    }
}

impl TableEntity for Customer {
    fn key(&self) -> EntityKey {
        EntityKey::new(self.last_name.clone(), self.first_name.clone())
    }

    fn to_properties(&self) -> Properties {
        let mut properties = Properties::new();
        if let Some(email) = &self.email {
            properties.insert("Email".to_string(), email.as_str().into());
        }
        if let Some(phone) = &self.phone_number {
            properties.insert("PhoneNumber".to_string(), phone.as_str().into());
        }
        properties
    }

    fn from_entity(entity: &DynamicEntity) -> Result<Self> {
        Ok(Self {
            last_name: entity.partition_key().to_string(),
            first_name: entity.row_key().to_string(),
            email: entity.string_property("Email").map(str::to_string),
            phone_number: entity.string_property("PhoneNumber").map(str::to_string),
        })
    }
}

fn display(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

// =============================================================================
// Steps
// =============================================================================

fn insert_one_record(table: &Table) -> Result<Customer> {
    let walter = Customer::new("Harp", "Walter", "Walter@contoso.com", "425-555-0101");
    Customer::from_entity(&table.insert(walter.to_entity())?)
}

fn insert_batch_records(table: &Table) -> Result<Vec<Customer>> {
    let mut batch = TableBatchOperation::new();
    batch.insert(Customer::new("Smith", "Jeff", "Jeff@contoso.com", "425-555-0104").to_entity());
    batch.insert(Customer::new("Smith", "Ben", "Ben@contoso.com", "425-555-0102").to_entity());

    table
        .execute_batch(&batch)?
        .into_iter()
        .filter_map(|result| result.into_entity())
        .map(|entity| Customer::from_entity(&entity))
        .collect()
}

fn retrieve_range_in_partition(table: &Table) -> Result<Vec<Customer>> {
    table
        .range_query("Smith", Bound::Unbounded, Bound::Excluded("E"))
        .map(|entity| Customer::from_entity(&entity?))
        .collect()
}

fn retrieve_single(table: &Table) -> Result<Option<Customer>> {
    table
        .try_retrieve("Smith", "Ben")?
        .map(|entity| Customer::from_entity(&entity))
        .transpose()
}

fn replace_entity(table: &Table) -> Result<Option<Customer>> {
    let Some(mut entity) = table.try_retrieve("Smith", "Ben")? else {
        return Ok(None);
    };

    entity.set_property("PhoneNumber", "425-555-0105");
    let replaced = table.execute(TableOperation::replace(entity))?;
    replaced
        .into_entity()
        .map(|entity| Customer::from_entity(&entity))
        .transpose()
}

fn insert_or_replace_entity(table: &Table) -> Result<(Customer, Customer)> {
    let first = Customer::new("Jones", "Fred", "Fred@contoso.com", "425-555-0106");
    let inserted = table.insert(first.to_entity())?;

    let second = Customer::new("Jones", "Fred", "Fred@contoso.com", "425-555-0107");
    let replaced = table.insert_or_replace(second.to_entity())?;

    Ok((Customer::from_entity(&inserted)?, Customer::from_entity(&replaced)?))
}

fn query_email_subset(table: &Table) -> Result<String> {
    let emails = table
        .project(None, Bound::Unbounded, Bound::Unbounded, ["Email"])
        .map(|entity| Ok(entity?.string_property("Email").map(str::to_string)))
        .collect::<Result<Vec<_>>>()?;

    Ok(emails.into_iter().flatten().collect::<Vec<_>>().join(","))
}

fn delete_entity(table: &Table) -> Result<&'static str> {
    match table.try_retrieve("Smith", "Ben")? {
        Some(entity) => {
            table.execute(TableOperation::delete_entity(&entity))?;
            Ok("Entity deleted.")
        }
        None => Ok("Could not retrieve the entity."),
    }
}

/// Not-found, conflict and stale-ETag outcomes are part of the walkthrough
fn is_expected(err: &TableError) -> bool {
    err.is_not_found() || err.is_conflict() || err.is_concurrency()
}

fn report<T>(step: &str, result: Result<T>, on_ok: impl FnOnce(T)) {
    match result {
        Ok(value) => on_ok(value),
        Err(err) if is_expected(&err) => {
            println!("{} did not complete: {}", step, err);
        }
        Err(err) => {
            tracing::error!(step, error = %err, "step failed");
            println!("{} failed: {}", step, err);
        }
    }
    println!();
}

fn run(catalog: &TableCatalog, table_name: &str) {
    let table = catalog.create_if_not_exists(table_name);

    println!("Wiping contents from any previous runs");
    report("Wipe", table.delete_all(), |deleted| {
        println!("Deleted {} entries", deleted);
    });

    println!("Inserting one record...");
    report("Insert", insert_one_record(&table), |customer| {
        println!("Inserted One Record with Partition Key: {}", customer.last_name);
    });

    println!("Inserting batch records...");
    report("Batch insert", insert_batch_records(&table), |customers| {
        println!("Inserted {} records", customers.len());
    });

    println!("Retrieving a range of entities in a partition");
    report("Range query", retrieve_range_in_partition(&table), |customers| {
        println!("Retrieved range results");
        for c in customers {
            println!(
                "\t{}, {}\t{}\t{}",
                c.last_name,
                c.first_name,
                display(&c.email),
                display(&c.phone_number)
            );
        }
    });

    println!("Retrieve a single entity");
    report("Retrieve", retrieve_single(&table), |customer| match customer {
        Some(c) => println!("Retrieved single entity with phone: {}", display(&c.phone_number)),
        None => println!("Could not retrieve single entity"),
    });

    println!("Replacing an entity");
    report("Replace", replace_entity(&table), |customer| match customer {
        Some(c) => println!(
            "Replaced an entity with a new phone number: {}",
            display(&c.phone_number)
        ),
        None => println!("Could not find entity to replace property"),
    });

    println!("Inserting or replacing entity");
    report("Insert or replace", insert_or_replace_entity(&table), |(before, after)| {
        println!(
            "We changed phone: {} to phone: {}",
            display(&before.phone_number),
            display(&after.phone_number)
        );
    });

    println!("Query a subset of entity properties");
    report("Projection", query_email_subset(&table), |emails| {
        println!("Queried Subset and got all these numbers: {}", emails);
    });

    println!("Delete an Entity");
    report("Delete", delete_entity(&table), |message| {
        println!("Response from Entity Deletion: {}", message);
    });

    println!("Delete a table");
    catalog.delete_if_exists(table_name);
    println!("Table exists == true? {}", catalog.exists(table_name));
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tablekv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("TableKV demo v{}", tablekv::VERSION);

    let mut builder = Config::builder().query_page_size(args.page_size);
    if let Some(path) = &args.snapshot {
        tracing::info!("Snapshot file: {}", path.display());
        builder = builder.snapshot_path(path);
    }

    let catalog = match builder.build().and_then(TableCatalog::open) {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::error!("Failed to open catalog: {}", e);
            process::exit(1);
        }
    };

    run(&catalog, &args.table);

    if let Err(e) = catalog.close() {
        tracing::error!("Failed to save snapshot: {}", e);
        process::exit(1);
    }
}
