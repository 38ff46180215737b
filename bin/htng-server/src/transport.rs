//! `reqwest`-based `Transport`: POSTs the signed SOAP envelope to the
//! channel's endpoint for the property's configured property mapping.

use async_trait::async_trait;
use htng_common::{HotelCode, PropertyId};
use htng_config::PropertyMappingStore;
use htng_errors::CoreError;
use htng_scheduler::Transport;
use reqwest::Client;
use std::sync::Arc;
use tracing::warn;

const SOAP_XML_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

pub struct ReqwestTransport {
    client: Client,
    mappings: Arc<dyn PropertyMappingStore>,
}

impl ReqwestTransport {
    pub fn new(client: Client, mappings: Arc<dyn PropertyMappingStore>) -> Self {
        Self { client, mappings }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, property_id: PropertyId, hotel_code: &HotelCode, envelope_xml: &str) -> Result<String, CoreError> {
        let mapping = self
            .mappings
            .get(property_id)
            .await?
            .ok_or_else(|| CoreError::classify(None, &format!("no property mapping for property {property_id}")))?;

        let response = self
            .client
            .post(mapping.endpoint_url())
            .header(reqwest::header::CONTENT_TYPE, SOAP_XML_CONTENT_TYPE)
            .body(envelope_xml.to_string())
            .send()
            .await
            .map_err(|e| CoreError::classify(None, &format!("channel request failed: {e}")).with_cause(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| CoreError::classify(None, &format!("failed to read channel response body: {e}")))?;

        if !status.is_success() {
            warn!(property_id, hotel_code = %hotel_code, status = status.as_u16(), "channel returned a non-2xx response");
        }
        Ok(body)
    }
}
