//! `validate-config` (spec §6): validate property mapping rows, report
//! violations, and optionally disable invalid mappings (`--fix`).

use std::str::FromStr;

use htng_common::PropertyId;
use htng_config::{PropertyMapping, PropertyMappingStore, SqlitePropertyMappingStore};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// One violation found on a mapping. `field` names the offending column;
/// `reason` is a short human-readable explanation.
struct Violation {
    field: &'static str,
    reason: &'static str,
}

fn violations(mapping: &PropertyMapping) -> Vec<Violation> {
    let mut found = Vec::new();

    if mapping.channel_username.trim().is_empty() {
        found.push(Violation { field: "channel_username", reason: "must not be empty" });
    }
    if mapping.channel_password.trim().is_empty() {
        found.push(Violation { field: "channel_password", reason: "must not be empty" });
    }
    if !mapping.wsdl_url.starts_with("http://") && !mapping.wsdl_url.starts_with("https://") {
        found.push(Violation { field: "wsdl_url", reason: "must be an absolute http(s) URL" });
    }

    found
}

pub async fn run(database_url: &str, property: Option<PropertyId>, fix: bool, verbose: bool) -> anyhow::Result<i32> {
    let pool = connect_sqlite(database_url).await?;
    let store = SqlitePropertyMappingStore::new(pool);
    store.init_schema().await?;

    let mappings = match property {
        Some(id) => match store.get(id).await? {
            Some(mapping) => vec![mapping],
            None => {
                eprintln!("no property mapping found for property {id}");
                return Ok(1);
            }
        },
        None => store.list().await?,
    };

    if mappings.is_empty() {
        println!("no property mappings configured");
        return Ok(0);
    }

    let mut invalid_count = 0;
    for mapping in mappings {
        let found = violations(&mapping);

        if found.is_empty() {
            if verbose {
                println!("property {}: OK (hotel_code={})", mapping.property_id, mapping.hotel_code);
            }
            continue;
        }

        invalid_count += 1;
        for v in &found {
            println!("property {}: INVALID {} — {}", mapping.property_id, v.field, v.reason);
        }

        if fix && mapping.enabled {
            let property_id = mapping.property_id;
            store.upsert(PropertyMapping { enabled: false, ..mapping }).await?;
            println!("property {property_id}: disabled (--fix)");
        }
    }

    if invalid_count == 0 {
        println!("all property mappings valid");
        Ok(0)
    } else {
        println!("{invalid_count} property mapping(s) invalid");
        Ok(1)
    }
}

async fn connect_sqlite(url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    Ok(SqlitePoolOptions::new().max_connections(5).connect_with(options).await?)
}
