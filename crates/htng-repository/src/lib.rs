//! The PMS repository contract (spec §6). The core never owns PMS domain
//! state; it reads and writes through this narrow interface, mapping
//! repository failures into its own error taxonomy (usually
//! `business_logic` or `unknown`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use htng_common::PropertyId;
use htng_errors::CoreError;
use htng_xml::group_block::GroupBlock;
use htng_xml::inventory::{InventoryMessage, InventoryRecord};
use htng_xml::rates::{RateMessage, RateRecord};
use htng_xml::reservation::Reservation;
use htng_xml::restrictions::{RestrictionMessage, RestrictionRecord};

/// A repository-side stream of changed records, typed by kind.
pub type ChangeStream<'a, T> = BoxStream<'a, Result<T, CoreError>>;

/// A property-scoped inventory record as reported by the PMS change feed.
#[derive(Debug, Clone)]
pub struct ChangedInventory {
    pub property_id: PropertyId,
    pub record: InventoryRecord,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChangedRate {
    pub property_id: PropertyId,
    pub plan_code: String,
    pub record: RateRecord,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChangedRestriction {
    pub property_id: PropertyId,
    pub record: RestrictionRecord,
    pub changed_at: DateTime<Utc>,
}

/// The three operations the inbound dispatcher applies against a
/// reservation (spec §4.7 step 5, §6).
#[derive(Debug, Clone)]
pub enum ReservationOperation {
    Create(Reservation),
    Modify(Reservation),
    Cancel { property_id: PropertyId, confirmation_id: String },
}

/// The channel-initiated updates the inbound dispatcher may apply for
/// the four non-reservation OTA roots (spec §4.7 step 2). These are rare
/// in practice — inventory/rates/restrictions/group blocks normally flow
/// PMS → channel — but the classify step recognizes them inbound too,
/// so the repository needs a way to accept them.
#[derive(Debug, Clone)]
pub enum InboundUpdate {
    Inventory { property_id: PropertyId, message: InventoryMessage },
    Rate { property_id: PropertyId, message: RateMessage },
    Restriction { property_id: PropertyId, message: RestrictionMessage },
    GroupBlock { property_id: PropertyId, block: GroupBlock },
}

/// The narrow PMS contract the core consumes. Implementations live
/// outside the core and are supplied by the host application.
#[async_trait]
pub trait PmsRepository: Send + Sync {
    async fn property_exists(&self, property_id: PropertyId) -> Result<bool, CoreError>;

    async fn room_type_exists_for_property(&self, property_id: PropertyId, code: &str) -> Result<bool, CoreError>;

    async fn rate_plan_exists_for_property(&self, property_id: PropertyId, code: &str) -> Result<bool, CoreError>;

    async fn apply_inbound_reservation(&self, operation: ReservationOperation) -> Result<(), CoreError>;

    async fn apply_inbound_update(&self, update: InboundUpdate) -> Result<(), CoreError>;

    async fn iterate_changed_inventory(
        &self,
        property_id: PropertyId,
        since: Option<DateTime<Utc>>,
    ) -> Result<ChangeStream<'static, ChangedInventory>, CoreError>;

    async fn iterate_changed_rates(
        &self,
        property_id: PropertyId,
        since: Option<DateTime<Utc>>,
    ) -> Result<ChangeStream<'static, ChangedRate>, CoreError>;

    async fn iterate_changed_restrictions(
        &self,
        property_id: PropertyId,
        since: Option<DateTime<Utc>>,
    ) -> Result<ChangeStream<'static, ChangedRestriction>, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use htng_common::HotelCode;

    /// A trivial in-memory repository used by the rest of the workspace's
    /// tests (validation, scheduler, inbound) as a stand-in PMS.
    pub struct FakeRepository {
        pub properties: Vec<PropertyId>,
        pub room_types: Vec<(PropertyId, String)>,
        pub rate_plans: Vec<(PropertyId, String)>,
    }

    #[async_trait]
    impl PmsRepository for FakeRepository {
        async fn property_exists(&self, property_id: PropertyId) -> Result<bool, CoreError> {
            Ok(self.properties.contains(&property_id))
        }

        async fn room_type_exists_for_property(&self, property_id: PropertyId, code: &str) -> Result<bool, CoreError> {
            Ok(self.room_types.iter().any(|(p, c)| *p == property_id && c == code))
        }

        async fn rate_plan_exists_for_property(&self, property_id: PropertyId, code: &str) -> Result<bool, CoreError> {
            Ok(self.rate_plans.iter().any(|(p, c)| *p == property_id && c == code))
        }

        async fn apply_inbound_reservation(&self, _operation: ReservationOperation) -> Result<(), CoreError> {
            Ok(())
        }

        async fn apply_inbound_update(&self, _update: InboundUpdate) -> Result<(), CoreError> {
            Ok(())
        }

        async fn iterate_changed_inventory(
            &self,
            _property_id: PropertyId,
            _since: Option<DateTime<Utc>>,
        ) -> Result<ChangeStream<'static, ChangedInventory>, CoreError> {
            Ok(Box::pin(stream::empty()))
        }

        async fn iterate_changed_rates(
            &self,
            _property_id: PropertyId,
            _since: Option<DateTime<Utc>>,
        ) -> Result<ChangeStream<'static, ChangedRate>, CoreError> {
            Ok(Box::pin(stream::empty()))
        }

        async fn iterate_changed_restrictions(
            &self,
            _property_id: PropertyId,
            _since: Option<DateTime<Utc>>,
        ) -> Result<ChangeStream<'static, ChangedRestriction>, CoreError> {
            Ok(Box::pin(stream::empty()))
        }
    }

    #[tokio::test]
    async fn fake_repository_reports_existence() {
        let repo = FakeRepository {
            properties: vec![1],
            room_types: vec![(1, "KING".to_string())],
            rate_plans: vec![(1, "BAR".to_string())],
        };
        assert!(repo.property_exists(1).await.unwrap());
        assert!(!repo.property_exists(2).await.unwrap());
        assert!(repo.room_type_exists_for_property(1, "KING").await.unwrap());
        assert!(!repo.room_type_exists_for_property(1, "QUEEN").await.unwrap());
        let _ = HotelCode::parse("001234").unwrap();
    }
}
