//! Validation pipeline (spec §4.4): a schema pass and a business-rule
//! pass. Inbound validation policy treats either pass's failure as fatal
//! for the envelope; outbound validation policy halts on either and
//! never retries — both are modeled by the `validation` error kind,
//! which is non-retryable by construction (`htng_errors::ErrorKind`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use htng_common::{HotelCode, MessageKind, PropertyId};
use htng_errors::CoreError;
use htng_repository::PmsRepository;

/// Default TTL for the in-memory schema cache (spec §4.4).
pub const DEFAULT_SCHEMA_CACHE_TTL: Duration = Duration::from_secs(3600);
/// Default TTL for the repository-lookup cache backing the business-rule
/// pass.
pub const DEFAULT_BUSINESS_RULE_CACHE_TTL: Duration = Duration::from_secs(900);
/// Default cap on the number of rule violations collected before the
/// pass gives up and returns what it has (spec §4.4).
pub const DEFAULT_MAX_FAILURES: usize = 50;

/// Supplies (and, in a real deployment, loads) the XSD schema set the
/// schema pass validates against. The default `WellFormednessSchemaSource`
/// only confirms the body parses as XML; a host application that ships
/// the HTNG XSD set plugs in a real implementation here without the rest
/// of the pipeline changing.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn load(&self, kind: MessageKind) -> Result<(), CoreError>;
    fn timeout_for(&self, kind: MessageKind) -> Duration;
}

pub struct WellFormednessSchemaSource;

#[async_trait]
impl SchemaSource for WellFormednessSchemaSource {
    async fn load(&self, _kind: MessageKind) -> Result<(), CoreError> {
        Ok(())
    }

    fn timeout_for(&self, _kind: MessageKind) -> Duration {
        Duration::from_secs(10)
    }
}

/// Process-global, single-writer-many-reader schema cache keyed by
/// message kind (spec §5). Invalidation happens only on an explicit
/// `invalidate` call — in the running system, on mapping events.
pub struct SchemaCache {
    ttl: Duration,
    last_refreshed: DashMap<MessageKind, Instant>,
}

impl SchemaCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, last_refreshed: DashMap::new() }
    }

    fn is_fresh(&self, kind: MessageKind) -> bool {
        self.last_refreshed
            .get(&kind)
            .map(|at| at.elapsed() < self.ttl)
            .unwrap_or(false)
    }

    fn mark_refreshed(&self, kind: MessageKind) {
        self.last_refreshed.insert(kind, Instant::now());
    }

    pub fn invalidate(&self, kind: MessageKind) {
        self.last_refreshed.remove(&kind);
    }

    pub fn invalidate_all(&self) {
        self.last_refreshed.clear();
    }

    /// Whether `kind`'s cache entry is currently fresh. Exposed for the
    /// `cache-config stats` CLI command; internal passes use `is_fresh`.
    pub fn is_warm(&self, kind: MessageKind) -> bool {
        self.is_fresh(kind)
    }

    pub fn len(&self) -> usize {
        self.last_refreshed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_refreshed.is_empty()
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEMA_CACHE_TTL)
    }
}

/// Run the schema pass for a body of the given kind: reload the schema
/// if the cache entry is stale (bounded by the kind's timeout), then
/// confirm the body is well-formed XML.
pub async fn validate_schema(
    source: &dyn SchemaSource,
    cache: &SchemaCache,
    kind: MessageKind,
    body_xml: &str,
) -> Result<(), CoreError> {
    if !cache.is_fresh(kind) {
        let timeout = source.timeout_for(kind);
        match tokio::time::timeout(timeout, source.load(kind)).await {
            Ok(Ok(())) => cache.mark_refreshed(kind),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(CoreError::classify(
                    Some("SYS_SCHEMA_TIMEOUT"),
                    &format!("schema load for {kind} timed out after {timeout:?}"),
                ))
            }
        }
    }

    htng_envelope::xmltree::parse(body_xml)
        .map(|_| ())
        .map_err(|e| CoreError::classify(Some("XML_PARSE_ERROR"), &e.to_string()))
}

/// Accumulates repository-lookup failures up to a configured cap, then
/// folds them into one `validation` error with a multi-line message
/// (spec §4.4).
struct RuleViolations {
    messages: Vec<String>,
    cap: usize,
}

impl RuleViolations {
    fn new(cap: usize) -> Self {
        Self { messages: Vec::new(), cap }
    }

    fn push(&mut self, message: impl Into<String>) {
        if self.messages.len() < self.cap {
            self.messages.push(message.into());
        }
    }

    fn is_full(&self) -> bool {
        self.messages.len() >= self.cap
    }

    fn into_result(self) -> Result<(), CoreError> {
        if self.messages.is_empty() {
            Ok(())
        } else {
            Err(CoreError::classify(Some("BUS_REPO_REF"), &self.messages.join("\n")))
        }
    }
}

/// The business-rule pass's repository-backed lookups: hotel code
/// (property) existence, and existence of any referenced room type or
/// rate plan codes, capped at `max_failures`.
pub async fn validate_repository_references(
    repo: &dyn PmsRepository,
    property_id: PropertyId,
    hotel_code: &HotelCode,
    room_type_codes: &[String],
    rate_plan_codes: &[String],
    max_failures: usize,
) -> Result<(), CoreError> {
    let mut violations = RuleViolations::new(max_failures);

    match repo.property_exists(property_id).await {
        Ok(true) => {}
        Ok(false) => violations.push(format!("property {property_id} (hotel code {hotel_code}) does not exist")),
        Err(e) => violations.push(format!("property existence lookup failed: {e}")),
    }

    for code in room_type_codes {
        if violations.is_full() {
            break;
        }
        match repo.room_type_exists_for_property(property_id, code).await {
            Ok(true) => {}
            Ok(false) => violations.push(format!("room type {code:?} does not exist for property {property_id}")),
            Err(e) => violations.push(format!("room type lookup for {code:?} failed: {e}")),
        }
    }

    for code in rate_plan_codes {
        if violations.is_full() {
            break;
        }
        match repo.rate_plan_exists_for_property(property_id, code).await {
            Ok(true) => {}
            Ok(false) => violations.push(format!("rate plan {code:?} does not exist for property {property_id}")),
            Err(e) => violations.push(format!("rate plan lookup for {code:?} failed: {e}")),
        }
    }

    violations.into_result()
}

/// Bundles a schema cache and a PMS repository behind the two validation
/// passes, so callers (the scheduler for outbound, the inbound
/// dispatcher for inbound) don't wire the pieces themselves.
pub struct ValidationPipeline {
    pub schema_source: Arc<dyn SchemaSource>,
    pub schema_cache: SchemaCache,
    pub repository: Arc<dyn PmsRepository>,
    pub max_failures: usize,
}

impl ValidationPipeline {
    pub fn new(schema_source: Arc<dyn SchemaSource>, repository: Arc<dyn PmsRepository>) -> Self {
        Self {
            schema_source,
            schema_cache: SchemaCache::default(),
            repository,
            max_failures: DEFAULT_MAX_FAILURES,
        }
    }

    /// Outbound validation policy: halt on any schema error, halt on any
    /// business-rule error, never retry either.
    pub async fn validate_outbound(
        &self,
        kind: MessageKind,
        body_xml: &str,
        property_id: PropertyId,
        hotel_code: &HotelCode,
        room_type_codes: &[String],
        rate_plan_codes: &[String],
    ) -> Result<(), CoreError> {
        validate_schema(self.schema_source.as_ref(), &self.schema_cache, kind, body_xml).await?;
        validate_repository_references(
            self.repository.as_ref(),
            property_id,
            hotel_code,
            room_type_codes,
            rate_plan_codes,
            self.max_failures,
        )
        .await
    }

    /// Inbound validation policy: schema failure is fatal for the
    /// envelope (the caller turns this into a SOAP fault); business-rule
    /// failure is also fatal.
    pub async fn validate_inbound(
        &self,
        kind: MessageKind,
        body_xml: &str,
        property_id: PropertyId,
        hotel_code: &HotelCode,
    ) -> Result<(), CoreError> {
        validate_schema(self.schema_source.as_ref(), &self.schema_cache, kind, body_xml).await?;
        validate_repository_references(self.repository.as_ref(), property_id, hotel_code, &[], &[], self.max_failures)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use htng_repository::{ChangeStream, ChangedInventory, ChangedRate, ChangedRestriction, ReservationOperation};

    struct StubRepository {
        known_properties: Vec<PropertyId>,
        known_room_types: Vec<&'static str>,
        known_rate_plans: Vec<&'static str>,
    }

    #[async_trait]
    impl PmsRepository for StubRepository {
        async fn property_exists(&self, property_id: PropertyId) -> Result<bool, CoreError> {
            Ok(self.known_properties.contains(&property_id))
        }

        async fn room_type_exists_for_property(&self, _property_id: PropertyId, code: &str) -> Result<bool, CoreError> {
            Ok(self.known_room_types.contains(&code))
        }

        async fn rate_plan_exists_for_property(&self, _property_id: PropertyId, code: &str) -> Result<bool, CoreError> {
            Ok(self.known_rate_plans.contains(&code))
        }

        async fn apply_inbound_reservation(&self, _operation: ReservationOperation) -> Result<(), CoreError> {
            Ok(())
        }

        async fn iterate_changed_inventory(
            &self,
            _property_id: PropertyId,
            _since: Option<chrono::DateTime<chrono::Utc>>,
        ) -> Result<ChangeStream<'static, ChangedInventory>, CoreError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn iterate_changed_rates(
            &self,
            _property_id: PropertyId,
            _since: Option<chrono::DateTime<chrono::Utc>>,
        ) -> Result<ChangeStream<'static, ChangedRate>, CoreError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn iterate_changed_restrictions(
            &self,
            _property_id: PropertyId,
            _since: Option<chrono::DateTime<chrono::Utc>>,
        ) -> Result<ChangeStream<'static, ChangedRestriction>, CoreError> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    #[tokio::test]
    async fn schema_pass_accepts_well_formed_body() {
        let cache = SchemaCache::default();
        let result = validate_schema(&WellFormednessSchemaSource, &cache, MessageKind::Inventory, "<Root/>").await;
        assert!(result.is_ok());
        assert!(cache.is_fresh(MessageKind::Inventory));
    }

    #[tokio::test]
    async fn schema_pass_rejects_malformed_body() {
        let cache = SchemaCache::default();
        let result = validate_schema(&WellFormednessSchemaSource, &cache, MessageKind::Inventory, "<Root>").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn repository_references_collect_violations_up_to_cap() {
        let repo = StubRepository {
            known_properties: vec![1],
            known_room_types: vec!["KING"],
            known_rate_plans: vec![],
        };
        let hotel_code = HotelCode::parse("001234").unwrap();
        let room_types = vec!["QUEEN".to_string(), "SUITE".to_string()];
        let result = validate_repository_references(&repo, 1, &hotel_code, &room_types, &[], 50).await;
        let err = result.unwrap_err();
        assert!(err.message.contains("QUEEN"));
        assert!(err.message.contains("SUITE"));
    }

    #[tokio::test]
    async fn repository_references_stop_at_cap() {
        let repo = StubRepository { known_properties: vec![1], known_room_types: vec![], known_rate_plans: vec![] };
        let hotel_code = HotelCode::parse("001234").unwrap();
        let room_types: Vec<String> = (0..10).map(|i| format!("RT{i}")).collect();
        let result = validate_repository_references(&repo, 1, &hotel_code, &room_types, &[], 3).await;
        let err = result.unwrap_err();
        assert_eq!(err.message.lines().count(), 3);
    }

    #[tokio::test]
    async fn repository_references_pass_for_known_property() {
        let repo = StubRepository { known_properties: vec![1], known_room_types: vec!["KING"], known_rate_plans: vec!["BAR"] };
        let hotel_code = HotelCode::parse("001234").unwrap();
        let result = validate_repository_references(
            &repo,
            1,
            &hotel_code,
            &["KING".to_string()],
            &["BAR".to_string()],
            50,
        )
        .await;
        assert!(result.is_ok());
    }
}
