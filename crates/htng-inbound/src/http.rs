//! The single SOAP POST endpoint (spec §4.7, §7). Authentication failures
//! map to HTTP 401 with a SOAP fault body; every other fault (malformed
//! XML, unrecognized root, validation failure) to HTTP 500; everything
//! else, including a replayed duplicate, to HTTP 200 with the ack
//! envelope.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tracing::warn;

use crate::dispatch::{DispatchOutcome, InboundDispatcher};

const SOAP_XML_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

pub fn router(dispatcher: Arc<InboundDispatcher>) -> Router {
    Router::new().route("/htng/2011b", post(handle_soap)).with_state(dispatcher)
}

async fn handle_soap(State(dispatcher): State<Arc<InboundDispatcher>>, body: Bytes) -> Response {
    let raw = match std::str::from_utf8(&body) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "inbound SOAP body was not valid UTF-8");
            return soap_response(StatusCode::INTERNAL_SERVER_ERROR, htng_envelope::build_fault("Client", "request body must be UTF-8"));
        }
    };

    match dispatcher.dispatch(raw).await {
        DispatchOutcome::Ack(xml) => soap_response(StatusCode::OK, xml),
        DispatchOutcome::Fault { body, unauthorized: true } => soap_response(StatusCode::UNAUTHORIZED, body),
        DispatchOutcome::Fault { body, unauthorized: false } => soap_response(StatusCode::INTERNAL_SERVER_ERROR, body),
    }
}

fn soap_response(status: StatusCode, body: String) -> Response {
    (status, [(axum::http::header::CONTENT_TYPE, SOAP_XML_CONTENT_TYPE)], body).into_response()
}
