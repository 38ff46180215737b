//! `cache-config` (spec §6): warm, clear, or report on the schema cache.
//!
//! The cache this command operates on is the same in-process
//! `htng_validation::SchemaCache` a running `htng-server` holds; run from
//! a one-shot CLI process it only demonstrates the cache's behavior
//! against a freshly constructed instance — `warm` followed by `stats` in
//! the same invocation shows the effect, but nothing persists across
//! process boundaries. A deployment that wants a CLI to affect a running
//! server's cache would wire this command to an admin RPC instead; that
//! wiring is host-specific and out of the core's scope.

use clap::Subcommand;
use htng_common::MessageKind;
use htng_validation::{validate_schema, SchemaCache, WellFormednessSchemaSource};

/// Message kinds that actually appear on the wire and so have a schema
/// cache entry; the internal mapping-change kinds never go through the
/// schema pass.
const WIRE_KINDS: [MessageKind; 5] =
    [MessageKind::Inventory, MessageKind::Rates, MessageKind::Reservation, MessageKind::Restrictions, MessageKind::GroupBlock];

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Pre-load the schema cache for every wire message kind.
    Warm,
    /// Drop every cached schema entry.
    Clear,
    /// Print per-kind cache freshness.
    Stats,
}

pub async fn run(action: CacheAction) -> i32 {
    let cache = SchemaCache::default();
    let source = WellFormednessSchemaSource;

    match action {
        CacheAction::Warm => {
            for kind in WIRE_KINDS {
                if let Err(e) = validate_schema(&source, &cache, kind, "<ok/>").await {
                    eprintln!("failed to warm schema cache for {kind}: {e}");
                    return 1;
                }
            }
            println!("warmed schema cache for {} message kinds", WIRE_KINDS.len());
            0
        }
        CacheAction::Clear => {
            cache.invalidate_all();
            println!("cleared schema cache");
            0
        }
        CacheAction::Stats => {
            for kind in WIRE_KINDS {
                println!("{kind}: {}", if cache.is_warm(kind) { "warm" } else { "cold" });
            }
            println!("{} of {} kinds warm", cache.len(), WIRE_KINDS.len());
            0
        }
    }
}
