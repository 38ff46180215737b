//! The inbound dispatch orchestration (spec §4.7): the six-step flow from
//! a raw SOAP POST body to a synchronous acknowledgment or fault.

use std::sync::Arc;

use chrono::Utc;
use htng_common::{HotelCode, PropertyId, Truncated};
use htng_errors::CoreError;
use htng_repository::{InboundUpdate, PmsRepository, ReservationOperation};
use htng_scheduler::lease::LeaseRegistry;
use htng_scheduler::{ErrorLogEntry, ErrorLogStore};
use htng_validation::ValidationPipeline;
use htng_xml::reservation::ReservationStatus;
use htng_xml::{group_block, inventory, rates, reservation, restrictions, OtaRoot};
use tracing::{info, warn};
use uuid::Uuid;

use crate::credentials::{authenticate, CredentialVerifier};
use crate::history::{MessageHistoryEntry, MessageHistoryStore};
use crate::work::{InboundWorkItem, InboundWorkStore, ReservationStatusWire};

/// Everything the dispatcher needs, wired once at startup by the host
/// binary. Mirrors the shape of `htng_scheduler::Dispatcher` on the
/// outbound side — one struct holding the stores and collaborators, one
/// entry point method.
pub struct InboundDispatcher {
    pub credentials: Arc<dyn CredentialVerifier>,
    pub history: Arc<dyn MessageHistoryStore>,
    pub work: Arc<dyn InboundWorkStore>,
    pub validation: Arc<ValidationPipeline>,
    pub leases: Arc<LeaseRegistry>,
    pub error_log: Arc<dyn ErrorLogStore>,
}

/// The HTTP-layer-agnostic outcome of a dispatch attempt. The axum handler
/// in `http.rs` maps this onto a status code.
pub enum DispatchOutcome {
    /// Request accepted (fresh or a replayed duplicate) — body is the SOAP
    /// acknowledgment envelope, HTTP 200.
    Ack(String),
    /// Request rejected — body is a SOAP fault envelope. `unauthorized`
    /// distinguishes the 401 case (spec: "HTTP 401 on mismatch") from the
    /// general 400 fault case.
    Fault { body: String, unauthorized: bool },
}

impl InboundDispatcher {
    /// Drive one inbound SOAP request through the full spec §4.7 flow.
    pub async fn dispatch(&self, raw_envelope: &str) -> DispatchOutcome {
        let creds = match htng_envelope::parse_wsse_credentials(raw_envelope) {
            Ok(creds) => creds,
            Err(e) => return self.auth_failure(raw_envelope, e).await,
        };

        let property_id = match authenticate(self.credentials.as_ref(), &creds.username, &creds.password).await {
            Ok(id) => id,
            Err(e) => return self.auth_failure(raw_envelope, e).await,
        };

        let root = match htng_xml::classify_root(raw_envelope) {
            Ok(root) => root,
            Err(e) => {
                return DispatchOutcome::Fault {
                    body: htng_envelope::build_fault(e.code.as_deref().unwrap_or("Client"), &e.message),
                    unauthorized: false,
                }
            }
        };
        let kind = root.message_kind();

        let parsed = match parse_body(root, raw_envelope) {
            Ok(parsed) => parsed,
            Err(e) => {
                return DispatchOutcome::Fault {
                    body: htng_envelope::build_fault(e.code.as_deref().unwrap_or("Client"), &e.message),
                    unauthorized: false,
                }
            }
        };
        let hotel_code = parsed.hotel_code().clone();

        let fingerprint = htng_envelope::content_fingerprint(raw_envelope);
        let echo_token = htng_envelope::extract_message_id(raw_envelope).unwrap_or_else(|| fingerprint.clone());
        let response_root_tag = root.response_root_tag();

        // Step 3: dedup against history. A terminal row for the same
        // fingerprint is replayed verbatim rather than reprocessed.
        match self.history.find_by_fingerprint(&hotel_code, kind, &fingerprint).await {
            Ok(Some(existing)) if existing.status.is_terminal() => {
                if let Some(ack_xml) = existing.ack_xml {
                    info!(fingerprint = %fingerprint, "replaying ack for duplicate inbound message");
                    return DispatchOutcome::Ack(ack_xml);
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "message history lookup failed, proceeding without dedup");
            }
        }

        if let Err(e) = self.validation.validate_inbound(kind, raw_envelope, property_id, &hotel_code).await {
            return DispatchOutcome::Fault {
                body: htng_envelope::build_fault(e.code.as_deref().unwrap_or("Client"), &e.message),
                unauthorized: false,
            };
        }

        // Step 4: persist the pending history row before enqueuing, so a
        // crash between here and the enqueue still leaves a durable trail.
        let history_id = Uuid::new_v4().to_string();
        let history_entry = MessageHistoryEntry::new(
            history_id.clone(),
            property_id,
            hotel_code.clone(),
            kind,
            fingerprint.clone(),
            Truncated::cap(raw_envelope, crate::history::MAX_STORED_BODY_BYTES),
            Utc::now(),
        );
        if let Err(e) = self.history.insert_pending(history_entry).await {
            return DispatchOutcome::Fault {
                body: htng_envelope::build_fault("Server", &e.message),
                unauthorized: false,
            };
        }

        // Step 5: enqueue the typed work item, sub-classifying reservations
        // by ResStatus.
        let reservation_status = match &parsed {
            ParsedBody::Reservation(r) => Some(ReservationStatusWire::from(r.status)),
            _ => None,
        };
        let work_item = InboundWorkItem::new(
            Uuid::new_v4().to_string(),
            property_id,
            hotel_code,
            kind,
            reservation_status,
            raw_envelope.to_string(),
            history_id.clone(),
            Utc::now(),
        );
        if let Err(e) = self.work.enqueue(work_item).await {
            let _ = self.history.mark_failed(&history_id, Utc::now(), &e.message, None).await;
            return DispatchOutcome::Fault {
                body: htng_envelope::build_fault("Server", &e.message),
                unauthorized: false,
            };
        }

        // Step 6: synchronous ack, echoing the inbound message identifier.
        let ack_xml = htng_envelope::build_ack(response_root_tag, &echo_token);
        if let Err(e) = self.history.mark_completed(&history_id, Utc::now(), &ack_xml).await {
            warn!(error = %e, history_id = %history_id, "failed to close history row after successful enqueue");
        }
        DispatchOutcome::Ack(ack_xml)
    }

    /// Record the error log row spec §3/§8 requires for a rejected inbound
    /// login, then build the 401 fault. `raw_envelope` is inspected directly
    /// for a `MessageID` rather than via the full body parse, since neither
    /// auth-failure site has classified the body yet.
    async fn auth_failure(&self, raw_envelope: &str, e: CoreError) -> DispatchOutcome {
        let message_id = htng_envelope::extract_message_id(raw_envelope);
        let entry = ErrorLogEntry::from_error(
            Uuid::new_v4().to_string(),
            message_id,
            Some("inbound authentication".to_string()),
            &e,
            Utc::now(),
        );
        if let Err(log_err) = self.error_log.insert(entry).await {
            warn!(error = %log_err, "failed to write error log row for inbound authentication failure");
        }
        auth_fault(&e)
    }
}

fn auth_fault(e: &CoreError) -> DispatchOutcome {
    DispatchOutcome::Fault {
        body: htng_envelope::build_fault("Client", &e.message),
        unauthorized: true,
    }
}

/// The parsed body for whichever of the five OTA roots was classified,
/// carried only far enough to extract `hotel_code` and (for reservations)
/// the `ResStatus` sub-classification. The processor in `process.rs`
/// re-parses the stored body XML rather than sharing this value, since it
/// runs in a separate task off the durable work item.
enum ParsedBody {
    Reservation(reservation::Reservation),
    Inventory(inventory::InventoryMessage),
    Rate(rates::RateMessage),
    Restriction(restrictions::RestrictionMessage),
    GroupBlock(group_block::GroupBlock),
}

impl ParsedBody {
    fn hotel_code(&self) -> &HotelCode {
        match self {
            Self::Reservation(r) => &r.hotel_code,
            Self::Inventory(m) => &m.hotel_code,
            Self::Rate(m) => &m.hotel_code,
            Self::Restriction(m) => &m.hotel_code,
            Self::GroupBlock(b) => &b.hotel_code,
        }
    }
}

fn parse_body(root: OtaRoot, raw: &str) -> Result<ParsedBody, CoreError> {
    Ok(match root {
        OtaRoot::HotelResNotifRQ => ParsedBody::Reservation(reservation::parse(raw)?),
        OtaRoot::HotelInvBlockNotifRQ => ParsedBody::GroupBlock(group_block::parse(raw)?),
        OtaRoot::HotelInvCountNotifRQ => ParsedBody::Inventory(inventory::parse(raw)?),
        OtaRoot::HotelRateNotifRQ => ParsedBody::Rate(rates::parse(raw)?),
        OtaRoot::HotelAvailNotifRQ => ParsedBody::Restriction(restrictions::parse(raw)?),
    })
}

/// Applies one drained work item against the repository (spec §4.7 step 5
/// continuation — run from the processor in `process.rs`, not inline in
/// `dispatch`, so a slow repository call never blocks the synchronous
/// ack).
pub async fn apply_work_item(repository: &dyn PmsRepository, item: &InboundWorkItem) -> Result<(), CoreError> {
    use htng_common::MessageKind;

    match item.kind {
        MessageKind::Reservation => {
            let reservation = reservation::parse(&item.body_xml)?;
            let operation = match item.reservation_status {
                Some(ReservationStatusWire::Cancelled) => ReservationOperation::Cancel {
                    property_id: item.property_id,
                    confirmation_id: reservation.confirmation_id.clone(),
                },
                Some(ReservationStatusWire::Modified) => ReservationOperation::Modify(reservation),
                _ => ReservationOperation::Create(reservation),
            };
            repository.apply_inbound_reservation(operation).await
        }
        MessageKind::Inventory => {
            let message = inventory::parse(&item.body_xml)?;
            repository
                .apply_inbound_update(InboundUpdate::Inventory { property_id: item.property_id, message })
                .await
        }
        MessageKind::Rates => {
            let message = rates::parse(&item.body_xml)?;
            repository.apply_inbound_update(InboundUpdate::Rate { property_id: item.property_id, message }).await
        }
        MessageKind::Restrictions => {
            let message = restrictions::parse(&item.body_xml)?;
            repository
                .apply_inbound_update(InboundUpdate::Restriction { property_id: item.property_id, message })
                .await
        }
        MessageKind::GroupBlock => {
            let block = group_block::parse(&item.body_xml)?;
            repository.apply_inbound_update(InboundUpdate::GroupBlock { property_id: item.property_id, block }).await
        }
        MessageKind::MappingCreated | MessageKind::MappingUpdated | MessageKind::MappingDeleted => {
            Err(CoreError::classify(None, "internal mapping kinds are never enqueued as inbound work"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history_sqlite::SqliteMessageHistoryStore;
    use crate::work_sqlite::SqliteInboundWorkStore;
    use async_trait::async_trait;
    use htng_repository::{ChangeStream, ChangedInventory, ChangedRate, ChangedRestriction};
    use htng_validation::{SchemaCache, WellFormednessSchemaSource};
    use sqlx::sqlite::SqlitePoolOptions;

    struct StubRepository {
        known_properties: Vec<PropertyId>,
    }

    #[async_trait]
    impl PmsRepository for StubRepository {
        async fn property_exists(&self, property_id: PropertyId) -> Result<bool, CoreError> {
            Ok(self.known_properties.contains(&property_id))
        }

        async fn room_type_exists_for_property(&self, _property_id: PropertyId, _code: &str) -> Result<bool, CoreError> {
            Ok(true)
        }

        async fn rate_plan_exists_for_property(&self, _property_id: PropertyId, _code: &str) -> Result<bool, CoreError> {
            Ok(true)
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
            _since: Option<chrono::DateTime<Utc>>,
        ) -> Result<ChangeStream<'static, ChangedInventory>, CoreError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn iterate_changed_rates(
            &self,
            _property_id: PropertyId,
            _since: Option<chrono::DateTime<Utc>>,
        ) -> Result<ChangeStream<'static, ChangedRate>, CoreError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn iterate_changed_restrictions(
            &self,
            _property_id: PropertyId,
            _since: Option<chrono::DateTime<Utc>>,
        ) -> Result<ChangeStream<'static, ChangedRestriction>, CoreError> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    struct StaticVerifier;

    #[async_trait]
    impl CredentialVerifier for StaticVerifier {
        async fn lookup(&self, username: &str) -> Result<(PropertyId, String), CoreError> {
            if username == "chan_user" {
                Ok((1, "s3cr3t".to_string()))
            } else {
                Err(CoreError::classify(None, "unknown username"))
            }
        }
    }

    async fn dispatcher() -> InboundDispatcher {
        let history_pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        let history = SqliteMessageHistoryStore::new(history_pool);
        history.init_schema().await.unwrap();

        let work_pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        let work = SqliteInboundWorkStore::new(work_pool);
        work.init_schema().await.unwrap();

        let repository = Arc::new(StubRepository { known_properties: vec![1] });
        let validation = ValidationPipeline {
            schema_source: Arc::new(WellFormednessSchemaSource),
            schema_cache: SchemaCache::default(),
            repository,
            max_failures: 10,
        };

        let error_log_pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        let error_log = htng_scheduler::SqliteErrorLogStore::new(error_log_pool);
        error_log.init_schema().await.unwrap();

        InboundDispatcher {
            credentials: Arc::new(StaticVerifier),
            history: Arc::new(history),
            work: Arc::new(work),
            validation: Arc::new(validation),
            leases: Arc::new(LeaseRegistry::new()),
            error_log: Arc::new(error_log),
        }
    }

    fn envelope(body: &str) -> String {
        format!(
            r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Header>
    <wsse:Security xmlns:wsse="x">
      <wsse:UsernameToken>
        <wsse:Username>chan_user</wsse:Username>
        <wsse:Password>s3cr3t</wsse:Password>
      </wsse:UsernameToken>
    </wsse:Security>
    <MessageID>msg-123</MessageID>
  </soap:Header>
  <soap:Body>{body}</soap:Body>
</soap:Envelope>"#
        )
    }

    #[tokio::test]
    async fn accepts_reservation_cancel_and_echoes_message_id() {
        let dispatcher = dispatcher().await;
        let body = r#"<OTA_HotelResNotifRQ HotelCode="001234" ResStatus="Cancel">
            <UniqueID ID="CONF-1"/>
            <ResGuests><ResGuest><GivenName>A</GivenName><Surname>B</Surname></ResGuest></ResGuests>
            <RoomStays><RoomStay><RoomTypeCode>KING</RoomTypeCode><ArrivalDate>2026-08-01</ArrivalDate><DepartureDate>2026-08-02</DepartureDate></RoomStay></RoomStays>
        </OTA_HotelResNotifRQ>"#;
        match dispatcher.dispatch(&envelope(body)).await {
            DispatchOutcome::Ack(xml) => {
                assert!(xml.contains("msg-123"));
                assert!(xml.contains("OTA_HotelResNotifRS"));
            }
            DispatchOutcome::Fault { body, .. } => panic!("expected ack, got fault: {body}"),
        }
    }

    #[tokio::test]
    async fn rejects_bad_credentials_with_unauthorized_fault() {
        let dispatcher = dispatcher().await;
        let raw = envelope(r#"<OTA_HotelResNotifRQ HotelCode="001234" ResStatus="Cancel"/>"#).replace("s3cr3t", "wrong");
        match dispatcher.dispatch(&raw).await {
            DispatchOutcome::Fault { unauthorized, body } => {
                assert!(unauthorized);
                assert!(body.contains("Authentication failed"));
            }
            DispatchOutcome::Ack(_) => panic!("expected fault"),
        }

        let rows = dispatcher.error_log.fetch_unresolved(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].error_kind, htng_errors::ErrorKind::Authentication);
        assert_eq!(rows[0].severity, htng_errors::Severity::Critical);
        assert_eq!(rows[0].message_id.as_deref(), Some("msg-123"));
    }

    #[tokio::test]
    async fn replays_ack_for_duplicate_fingerprint() {
        let dispatcher = dispatcher().await;
        let body = r#"<OTA_HotelResNotifRQ HotelCode="001234" ResStatus="Cancel">
            <UniqueID ID="CONF-2"/>
            <ResGuests><ResGuest><GivenName>A</GivenName><Surname>B</Surname></ResGuest></ResGuests>
            <RoomStays><RoomStay><RoomTypeCode>KING</RoomTypeCode><ArrivalDate>2026-08-01</ArrivalDate><DepartureDate>2026-08-02</DepartureDate></RoomStay></RoomStays>
        </OTA_HotelResNotifRQ>"#;
        let raw = envelope(body);

        let first = match dispatcher.dispatch(&raw).await {
            DispatchOutcome::Ack(xml) => xml,
            DispatchOutcome::Fault { body, .. } => panic!("expected ack, got fault: {body}"),
        };

        let second = match dispatcher.dispatch(&raw).await {
            DispatchOutcome::Ack(xml) => xml,
            DispatchOutcome::Fault { body, .. } => panic!("expected replayed ack, got fault: {body}"),
        };

        assert_eq!(first, second);
    }
}
