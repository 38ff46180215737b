//! SOAP 1.2 envelope construction and parsing, including the WSSE
//! `UsernameToken` security header HTNG 2011B requires (spec §4.2).

pub mod xmltree;

use chrono::{DateTime, Utc};
use htng_common::MessageId;
use htng_errors::CoreError;
use rand::RngCore;
use sha2::{Digest, Sha256};
use xmltree::XmlNode;

pub const SOAP_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const OTA_NS: &str = "http://www.opentravel.org/OTA/2003/05";
pub const HTNG_NS: &str = "http://htng.org/PWS/2011B/SingleGuestItinerary/Common/Types";
pub const WSSE_NS: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const WSU_NS: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

const DEFAULT_ACTION: &str = "HTNG2011B_SubmitRequest";

/// Credentials carried in the outbound WSSE `UsernameToken`. HTNG 2011B
/// specifies the plain-text password profile; it is not negotiable here
/// (spec §9) — TLS at the transport layer is the control that matters.
#[derive(Debug, Clone)]
pub struct WsseCredentials {
    pub username: String,
    pub password: String,
}

/// Generate a fresh base64-ish nonce for a `UsernameToken`.
fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Build a complete outbound SOAP 1.2 envelope: WSSE security header,
/// `MessageID` header, `Action` header, and exactly one HTNG payload root
/// in the body.
pub fn build_request(
    message_id: &MessageId,
    credentials: &WsseCredentials,
    action: Option<&str>,
    body_xml: &str,
    now: DateTime<Utc>,
) -> String {
    let nonce = generate_nonce();
    let created = now.to_rfc3339();
    let action = action.unwrap_or(DEFAULT_ACTION);

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="{soap_ns}" xmlns:wsse="{wsse_ns}" xmlns:wsu="{wsu_ns}" xmlns:ota="{ota_ns}" xmlns:htng="{htng_ns}">
  <soap:Header>
    <wsse:Security>
      <wsse:UsernameToken>
        <wsse:Username>{username}</wsse:Username>
        <wsse:Password Type="{text_type}">{password}</wsse:Password>
        <wsse:Nonce>{nonce}</wsse:Nonce>
        <wsu:Created>{created}</wsu:Created>
      </wsse:UsernameToken>
    </wsse:Security>
    <MessageID>{message_id}</MessageID>
    <Action>{action}</Action>
  </soap:Header>
  <soap:Body>
{body}
  </soap:Body>
</soap:Envelope>"#,
        soap_ns = SOAP_NS,
        wsse_ns = WSSE_NS,
        wsu_ns = WSU_NS,
        ota_ns = OTA_NS,
        htng_ns = HTNG_NS,
        username = xml_escape(&credentials.username),
        text_type = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText",
        password = xml_escape(&credentials.password),
        nonce = nonce,
        created = created,
        message_id = message_id,
        action = action,
        body = body_xml,
    )
}

/// The structured result of parsing a response envelope (spec §4.2).
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub message_id: Option<String>,
    pub raw: String,
    pub echo_token: Option<String>,
    /// The SOAP header's direct children as `(name, text)` pairs, in
    /// document order (spec §4.2). Empty when the envelope failed to
    /// parse or carried no header.
    pub headers: Vec<(String, String)>,
    pub duration_ms: u64,
    pub success: bool,
    pub warnings: Vec<String>,
    pub error: Option<CoreError>,
}

fn extract_headers(root: &XmlNode) -> Vec<(String, String)> {
    root.find("Header")
        .map(|header| header.children.iter().map(|c| (c.name.clone(), c.text_trimmed().to_string())).collect())
        .unwrap_or_default()
}

/// Parse a response envelope, recognizing `soap:Fault`, `ota:Errors`, and
/// `ota:Warnings` per the precedence in spec §4.2.
pub fn parse_response(raw: &str, duration_ms: u64) -> ParsedResponse {
    let root = match xmltree::parse(raw) {
        Ok(root) => root,
        Err(e) => {
            return ParsedResponse {
                message_id: None,
                raw: raw.to_string(),
                echo_token: None,
                headers: Vec::new(),
                duration_ms,
                success: false,
                warnings: Vec::new(),
                error: Some(CoreError::classify(Some("XML_PARSE_ERROR"), &e.to_string())),
            };
        }
    };

    let message_id = root.find("MessageID").map(|n| n.text_trimmed().to_string());
    let echo_token = root.find("EchoToken").map(|n| n.text_trimmed().to_string());
    let headers = extract_headers(&root);

    if let Some(fault) = root.find("Fault") {
        let (code, reason) = extract_fault(fault);
        return ParsedResponse {
            message_id,
            raw: raw.to_string(),
            echo_token,
            headers,
            duration_ms,
            success: false,
            warnings: Vec::new(),
            error: Some(CoreError::classify(code.as_deref(), &reason)),
        };
    }

    if let Some(errors) = root.find("Errors") {
        let mut nodes = Vec::new();
        errors.find_all("Error", &mut nodes);
        if !nodes.is_empty() {
            let code = nodes[0].attr("Code").or_else(|| nodes[0].attr("Type")).map(str::to_string);
            let message = nodes
                .iter()
                .map(|n| {
                    n.child("ShortText")
                        .map(|c| c.text_trimmed().to_string())
                        .unwrap_or_else(|| n.text_trimmed().to_string())
                })
                .collect::<Vec<_>>()
                .join("; ");
            return ParsedResponse {
                message_id,
                raw: raw.to_string(),
                echo_token,
                headers,
                duration_ms,
                success: false,
                warnings: Vec::new(),
                error: Some(CoreError::classify(code.as_deref(), &message)),
            };
        }
    }

    let mut warnings = Vec::new();
    if let Some(warns) = root.find("Warnings") {
        let mut nodes = Vec::new();
        warns.find_all("Warning", &mut nodes);
        for n in nodes {
            let text = n
                .child("ShortText")
                .map(|c| c.text_trimmed().to_string())
                .unwrap_or_else(|| n.text_trimmed().to_string());
            if !text.is_empty() {
                warnings.push(text);
            }
        }
    }

    let body = root.find("Body").unwrap_or(&root);
    if body_is_empty(body) {
        return ParsedResponse {
            message_id,
            raw: raw.to_string(),
            echo_token,
            headers,
            duration_ms,
            success: false,
            warnings,
            error: Some(CoreError::classify(Some("EMPTY_RESPONSE"), "empty response body")),
        };
    }

    ParsedResponse {
        message_id,
        raw: raw.to_string(),
        echo_token,
        headers,
        duration_ms,
        success: true,
        warnings,
        error: None,
    }
}

fn body_is_empty(body: &XmlNode) -> bool {
    body.children.is_empty() && body.text_trimmed().is_empty()
}

fn extract_fault(fault: &XmlNode) -> (Option<String>, String) {
    // SOAP 1.2 shape: Fault/Code/Value (subcode), Fault/Reason/Text
    if let Some(code_el) = fault.child("Code") {
        let value = code_el
            .child("Subcode")
            .and_then(|s| s.child("Value"))
            .or_else(|| code_el.child("Value"))
            .map(|v| v.text_trimmed().to_string());
        let reason = fault
            .child("Reason")
            .and_then(|r| r.child("Text"))
            .map(|t| t.text_trimmed().to_string())
            .unwrap_or_default();
        return (value, reason);
    }

    // SOAP 1.1 fallback: Fault/faultcode, Fault/faultstring
    let code = fault.child("faultcode").map(|n| n.text_trimmed().to_string());
    let reason = fault
        .child("faultstring")
        .map(|n| n.text_trimmed().to_string())
        .unwrap_or_default();
    (code, reason)
}

/// Extract the `MessageID` header from a raw envelope, if present. Used
/// by the inbound dispatcher to echo the sender's identifier back as the
/// acknowledgment's `EchoToken` (spec §4.7 step 6).
pub fn extract_message_id(raw: &str) -> Option<String> {
    xmltree::parse(raw).ok()?.find("MessageID").map(|n| n.text_trimmed().to_string())
}

/// Extract the WSSE `UsernameToken` from an inbound SOAP envelope (spec
/// §4.7 step 1). Only the plain-text password profile is recognized, as
/// that is the only one HTNG 2011B specifies (spec §9).
pub fn parse_wsse_credentials(raw: &str) -> Result<WsseCredentials, CoreError> {
    let root = xmltree::parse(raw).map_err(|e| CoreError::classify(Some("XML_PARSE_ERROR"), &e.to_string()))?;
    let token = root
        .find("UsernameToken")
        .ok_or_else(|| CoreError::classify(Some("Client"), "missing WSSE UsernameToken"))?;
    let username = token
        .child("Username")
        .map(|n| n.text_trimmed().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CoreError::classify(Some("Client"), "missing WSSE Username"))?;
    let password = token
        .child("Password")
        .map(|n| n.text_trimmed().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CoreError::classify(Some("Client"), "missing WSSE Password"))?;
    Ok(WsseCredentials { username, password })
}

/// Compute the SHA-256 content fingerprint used for inbound deduplication
/// (spec §3, §4.7).
pub fn content_fingerprint(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build a SOAP 1.2 fault envelope for a rejected inbound request.
pub fn build_fault(code: &str, reason: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="{soap_ns}">
  <soap:Body>
    <soap:Fault>
      <soap:Code>
        <soap:Value>soap:{code}</soap:Value>
      </soap:Code>
      <soap:Reason>
        <soap:Text xml:lang="en">{reason}</soap:Text>
      </soap:Reason>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#,
        soap_ns = SOAP_NS,
        code = code,
        reason = xml_escape(reason),
    )
}

/// Build a synchronous acknowledgment envelope: `<root_tag>` with a
/// `<Success/>` element and an `EchoToken` equal to the inbound message
/// identifier (spec §4.7, §6).
pub fn build_ack(root_tag: &str, echo_token: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="{soap_ns}">
  <soap:Body>
    <{root_tag} xmlns="{ota_ns}" EchoToken="{echo_token}">
      <Success/>
    </{root_tag}>
  </soap:Body>
</soap:Envelope>"#,
        soap_ns = SOAP_NS,
        ota_ns = OTA_NS,
        root_tag = root_tag,
        echo_token = xml_escape(echo_token),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> WsseCredentials {
        WsseCredentials {
            username: "chan_user".to_string(),
            password: "s3cr3t".to_string(),
        }
    }

    #[test]
    fn builds_request_with_wsse_and_message_id() {
        let id = MessageId::generate("HTNG", Utc::now());
        let xml = build_request(&id, &creds(), None, "<ota:OTA_HotelAvailNotifRQ/>", Utc::now());
        assert!(xml.contains("UsernameToken"));
        assert!(xml.contains("chan_user"));
        assert!(xml.contains(&id.to_string()));
        assert!(xml.contains("HTNG2011B_SubmitRequest"));
    }

    #[test]
    fn parses_success_response() {
        let xml = format!(
            r#"<soap:Envelope xmlns:soap="{}"><soap:Body><ota:OTA_HotelAvailNotifRS xmlns:ota="{}"><Success/></ota:OTA_HotelAvailNotifRS></soap:Body></soap:Envelope>"#,
            SOAP_NS, OTA_NS
        );
        let parsed = parse_response(&xml, 12);
        assert!(parsed.success);
        assert!(parsed.error.is_none());
    }

    #[test]
    fn parses_response_headers() {
        let xml = format!(
            r#"<soap:Envelope xmlns:soap="{}"><soap:Header><MessageID>HTNG_20250601_120000_ABCD1234</MessageID><Action>HTNG2011B_SubmitRequest</Action></soap:Header><soap:Body><ota:OTA_HotelAvailNotifRS xmlns:ota="{}"><Success/></ota:OTA_HotelAvailNotifRS></soap:Body></soap:Envelope>"#,
            SOAP_NS, OTA_NS
        );
        let parsed = parse_response(&xml, 5);
        assert_eq!(
            parsed.headers,
            vec![
                ("MessageID".to_string(), "HTNG_20250601_120000_ABCD1234".to_string()),
                ("Action".to_string(), "HTNG2011B_SubmitRequest".to_string()),
            ]
        );
    }

    #[test]
    fn parses_soap_12_fault() {
        let xml = format!(
            r#"<soap:Envelope xmlns:soap="{}"><soap:Body><soap:Fault><soap:Code><soap:Value>soap:Sender</soap:Value><soap:Subcode><soap:Value>AUT001</soap:Value></soap:Subcode></soap:Code><soap:Reason><soap:Text>Authentication failed</soap:Text></soap:Reason></soap:Fault></soap:Body></soap:Envelope>"#,
            SOAP_NS
        );
        let parsed = parse_response(&xml, 5);
        assert!(!parsed.success);
        let err = parsed.error.unwrap();
        assert_eq!(err.kind, htng_errors::ErrorKind::Authentication);
    }

    #[test]
    fn parses_ota_errors_and_concatenates() {
        let xml = format!(
            r#"<soap:Envelope xmlns:soap="{}"><soap:Body><ota:OTA_HotelRateNotifRS xmlns:ota="{}"><Errors><Error Code="VAL1">Missing rate plan</Error><Error Code="VAL2">Invalid date range</Error></Errors></ota:OTA_HotelRateNotifRS></soap:Body></soap:Envelope>"#,
            SOAP_NS, OTA_NS
        );
        let parsed = parse_response(&xml, 5);
        assert!(!parsed.success);
        let err = parsed.error.unwrap();
        assert_eq!(err.message, "Missing rate plan; Invalid date range");
    }

    #[test]
    fn parses_warnings_as_non_fatal() {
        let xml = format!(
            r#"<soap:Envelope xmlns:soap="{}"><soap:Body><ota:OTA_HotelRateNotifRS xmlns:ota="{}"><Success/><Warnings><Warning>Rate plan code not found, using default mapping</Warning></Warnings></ota:OTA_HotelRateNotifRS></soap:Body></soap:Envelope>"#,
            SOAP_NS, OTA_NS
        );
        let parsed = parse_response(&xml, 5);
        assert!(parsed.success);
        assert_eq!(parsed.warnings, vec!["Rate plan code not found, using default mapping"]);
    }

    #[test]
    fn empty_body_is_empty_response_error() {
        let xml = format!(r#"<soap:Envelope xmlns:soap="{}"><soap:Body></soap:Body></soap:Envelope>"#, SOAP_NS);
        let parsed = parse_response(&xml, 5);
        assert!(!parsed.success);
        assert_eq!(parsed.error.unwrap().code.as_deref(), Some("EMPTY_RESPONSE"));
    }

    #[test]
    fn parses_wsse_credentials_from_inbound_envelope() {
        let xml = format!(
            r#"<soap:Envelope xmlns:soap="{}"><soap:Header><wsse:Security xmlns:wsse="{}"><wsse:UsernameToken><wsse:Username>chan_user</wsse:Username><wsse:Password Type="...PasswordText">s3cr3t</wsse:Password></wsse:UsernameToken></wsse:Security></soap:Header><soap:Body/></soap:Envelope>"#,
            SOAP_NS, WSSE_NS
        );
        let creds = parse_wsse_credentials(&xml).unwrap();
        assert_eq!(creds.username, "chan_user");
        assert_eq!(creds.password, "s3cr3t");
    }

    #[test]
    fn rejects_envelope_missing_username_token() {
        let xml = format!(r#"<soap:Envelope xmlns:soap="{}"><soap:Body/></soap:Envelope>"#, SOAP_NS);
        assert!(parse_wsse_credentials(&xml).is_err());
    }

    #[test]
    fn extracts_message_id_header() {
        let xml = format!(
            r#"<soap:Envelope xmlns:soap="{}"><soap:Header><MessageID>HTNG_20250601_120000_ABCD1234</MessageID></soap:Header><soap:Body/></soap:Envelope>"#,
            SOAP_NS
        );
        assert_eq!(extract_message_id(&xml).as_deref(), Some("HTNG_20250601_120000_ABCD1234"));
        assert_eq!(extract_message_id("<Body/>"), None);
    }

    #[test]
    fn fingerprint_is_stable() {
        let a = content_fingerprint("<foo/>");
        let b = content_fingerprint("<foo/>");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn builds_ack_envelope_with_echo_token() {
        let xml = build_ack("OTA_HotelResNotifRS", "HTNG_20250601_120000_ABCD1234");
        assert!(xml.contains("EchoToken=\"HTNG_20250601_120000_ABCD1234\""));
        assert!(xml.contains("<Success/>"));
    }
}
