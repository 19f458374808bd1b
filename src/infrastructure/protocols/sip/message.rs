//! SIP message types and parsing
//!
//! rsip does the grammar work in both directions. This module lifts the
//! handful of headers the gateway reads or writes into plain fields, with
//! the Via/From/To parameter chains kept in wire order.

use super::address::{SipAddress, SipUri, Via};
use crate::domain::shared::GatewayError;
use bytes::{BufMut, Bytes, BytesMut};
use rsip::{Header, Headers};
use std::fmt;
use thiserror::Error;

/// MANSCDP body content type, compared case-insensitively
pub const MANSCDP_CONTENT_TYPE: &str = "Application/MANSCDP+xml";

#[derive(Error, Debug)]
pub enum SipError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Transport error: {0}")]
    TransportError(String),
}

impl From<rsip::Error> for SipError {
    fn from(err: rsip::Error) -> Self {
        SipError::ParseError(err.to_string())
    }
}

impl From<SipError> for GatewayError {
    fn from(err: SipError) -> Self {
        match err {
            SipError::ParseError(reason) | SipError::InvalidMessage(reason) => {
                GatewayError::MalformedMessage(reason)
            }
            SipError::TransportError(reason) => GatewayError::Transport(reason),
        }
    }
}

/// SIP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SipMethod {
    Register,
    Invite,
    Ack,
    Cancel,
    Bye,
    Options,
    Info,
    Update,
    Subscribe,
    Notify,
    Refer,
    Message,
    Publish,
    Prack,
}

impl SipMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SipMethod::Register => "REGISTER",
            SipMethod::Invite => "INVITE",
            SipMethod::Ack => "ACK",
            SipMethod::Cancel => "CANCEL",
            SipMethod::Bye => "BYE",
            SipMethod::Options => "OPTIONS",
            SipMethod::Info => "INFO",
            SipMethod::Update => "UPDATE",
            SipMethod::Subscribe => "SUBSCRIBE",
            SipMethod::Notify => "NOTIFY",
            SipMethod::Refer => "REFER",
            SipMethod::Message => "MESSAGE",
            SipMethod::Publish => "PUBLISH",
            SipMethod::Prack => "PRACK",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let method = match name.trim().to_ascii_uppercase().as_str() {
            "REGISTER" => SipMethod::Register,
            "INVITE" => SipMethod::Invite,
            "ACK" => SipMethod::Ack,
            "CANCEL" => SipMethod::Cancel,
            "BYE" => SipMethod::Bye,
            "OPTIONS" => SipMethod::Options,
            "INFO" => SipMethod::Info,
            "UPDATE" => SipMethod::Update,
            "SUBSCRIBE" => SipMethod::Subscribe,
            "NOTIFY" => SipMethod::Notify,
            "REFER" => SipMethod::Refer,
            "MESSAGE" => SipMethod::Message,
            "PUBLISH" => SipMethod::Publish,
            "PRACK" => SipMethod::Prack,
            _ => return None,
        };
        Some(method)
    }

    pub fn to_rsip(&self) -> rsip::Method {
        match self {
            SipMethod::Register => rsip::Method::Register,
            SipMethod::Invite => rsip::Method::Invite,
            SipMethod::Ack => rsip::Method::Ack,
            SipMethod::Cancel => rsip::Method::Cancel,
            SipMethod::Bye => rsip::Method::Bye,
            SipMethod::Options => rsip::Method::Options,
            SipMethod::Info => rsip::Method::Info,
            SipMethod::Update => rsip::Method::Update,
            SipMethod::Subscribe => rsip::Method::Subscribe,
            SipMethod::Notify => rsip::Method::Notify,
            SipMethod::Refer => rsip::Method::Refer,
            SipMethod::Message => rsip::Method::Message,
            SipMethod::Publish => rsip::Method::Publish,
            SipMethod::Prack => rsip::Method::PRack,
        }
    }
}

impl fmt::Display for SipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reason phrase for the status codes the gateway sends or logs
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Trying",
        180 => "Ringing",
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        415 => "Unsupported Media Type",
        481 => "Call/Transaction Does Not Exist",
        486 => "Busy Here",
        500 => "Server Internal Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Message body with its declared content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub content_type: String,
    pub data: Bytes,
}

impl Payload {
    pub fn new(content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    pub fn manscdp(data: impl Into<Bytes>) -> Self {
        Self::new(MANSCDP_CONTENT_TYPE, data)
    }

    pub fn is_manscdp(&self) -> bool {
        self.content_type.trim().eq_ignore_ascii_case(MANSCDP_CONTENT_TYPE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Request {
        method: SipMethod,
        request_target: SipUri,
    },
    Response {
        status: u16,
        phrase: String,
    },
}

/// One signaling datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    /// Topmost Via
    pub via: Via,
    pub from: SipAddress,
    pub to: SipAddress,
    pub call_id: String,
    pub cseq: u32,
    pub cseq_method: SipMethod,
    pub contact: Option<SipAddress>,
    pub max_forwards: Option<u32>,
    pub user_agent: Option<String>,
    pub expires: Option<u32>,
    /// Passed through untouched, never verified
    pub authorization: Option<String>,
    pub payload: Option<Payload>,
}

/// `(name, value)` of any rsip header, typed or not
fn header_parts(header: &Header) -> Option<(String, String)> {
    let line = header.to_string();
    let (name, value) = line.split_once(':')?;
    Some((name.trim().to_string(), value.trim().to_string()))
}

fn is_header(name: &str, full: &str, compact: Option<&str>) -> bool {
    name.eq_ignore_ascii_case(full) || compact.map_or(false, |c| name.eq_ignore_ascii_case(c))
}

fn required<T>(value: Option<T>, header: &str) -> Result<T, SipError> {
    value.ok_or_else(|| SipError::InvalidMessage(format!("missing {} header", header)))
}

fn parse_cseq(raw: &str) -> Result<(u32, SipMethod), SipError> {
    let mut parts = raw.split_whitespace();
    let seq = parts
        .next()
        .and_then(|seq| seq.parse::<u32>().ok())
        .ok_or_else(|| SipError::InvalidMessage(format!("invalid CSeq: {}", raw)))?;
    let method = parts
        .next()
        .and_then(SipMethod::from_name)
        .ok_or_else(|| SipError::InvalidMessage(format!("invalid CSeq method: {}", raw)))?;
    Ok((seq, method))
}

/// `"200 OK"` -> `"OK"`; falls back to the standard phrase
fn status_phrase(rendered: &str, status: u16) -> String {
    let phrase = rendered
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim();
    if phrase.is_empty() {
        reason_phrase(status).to_string()
    } else {
        phrase.to_string()
    }
}

impl Message {
    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let message = rsip::SipMessage::try_from(data)?;

        let (kind, headers, body) = match message {
            rsip::SipMessage::Request(request) => {
                let method = SipMethod::from_name(&request.method.to_string()).ok_or_else(|| {
                    SipError::InvalidMessage(format!("unsupported method {}", request.method))
                })?;
                let kind = MessageKind::Request {
                    method,
                    request_target: SipUri::parse(&request.uri.to_string())?,
                };
                (kind, request.headers, request.body)
            }
            rsip::SipMessage::Response(response) => {
                let status: u16 = response.status_code.clone().into();
                let kind = MessageKind::Response {
                    status,
                    phrase: status_phrase(&response.status_code.to_string(), status),
                };
                (kind, response.headers, response.body)
            }
        };

        Self::from_parts(kind, &headers, body)
    }

    fn from_parts(kind: MessageKind, headers: &Headers, body: Vec<u8>) -> Result<Self, SipError> {
        let mut via = None;
        let mut from = None;
        let mut to = None;
        let mut call_id = None;
        let mut cseq = None;
        let mut contact = None;
        let mut max_forwards = None;
        let mut user_agent = None;
        let mut expires = None;
        let mut authorization = None;
        let mut content_type = None;

        for header in headers.iter() {
            let Some((name, value)) = header_parts(header) else {
                continue;
            };

            if is_header(&name, "Via", Some("v")) {
                if via.is_none() {
                    via = Some(Via::parse(&value)?);
                }
            } else if is_header(&name, "From", Some("f")) {
                from = Some(SipAddress::parse(&value)?);
            } else if is_header(&name, "To", Some("t")) {
                to = Some(SipAddress::parse(&value)?);
            } else if is_header(&name, "Call-ID", Some("i")) {
                call_id = Some(value);
            } else if is_header(&name, "CSeq", None) {
                cseq = Some(parse_cseq(&value)?);
            } else if is_header(&name, "Contact", Some("m")) {
                // `Contact: *` and friends are not addresses the gateway needs
                contact = SipAddress::parse(&value).ok();
            } else if is_header(&name, "Max-Forwards", None) {
                max_forwards = value.parse().ok();
            } else if is_header(&name, "User-Agent", None) {
                user_agent = Some(value);
            } else if is_header(&name, "Expires", None) {
                expires = value.parse().ok();
            } else if is_header(&name, "Authorization", None) {
                authorization = Some(value);
            } else if is_header(&name, "Content-Type", Some("c")) {
                content_type = Some(value);
            }
        }

        let (cseq, cseq_method) = required(cseq, "CSeq")?;
        let payload = if body.is_empty() {
            None
        } else {
            Some(Payload::new(content_type.unwrap_or_default(), body))
        };

        Ok(Self {
            kind,
            via: required(via, "Via")?,
            from: required(from, "From")?,
            to: required(to, "To")?,
            call_id: required(call_id, "Call-ID")?,
            cseq,
            cseq_method,
            contact,
            max_forwards,
            user_agent,
            expires,
            authorization,
            payload,
        })
    }

    pub fn is_request(&self) -> bool {
        matches!(self.kind, MessageKind::Request { .. })
    }

    pub fn is_response(&self) -> bool {
        matches!(self.kind, MessageKind::Response { .. })
    }

    pub fn method(&self) -> Option<SipMethod> {
        match &self.kind {
            MessageKind::Request { method, .. } => Some(*method),
            MessageKind::Response { .. } => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match &self.kind {
            MessageKind::Response { status, .. } => Some(*status),
            MessageKind::Request { .. } => None,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Expiry requested by a REGISTER: the `Expires` header, else the
    /// Contact's `expires` parameter
    pub fn register_expires(&self) -> Option<u32> {
        self.expires.or_else(|| {
            self.contact
                .as_ref()
                .and_then(|contact| contact.params.value("expires"))
                .and_then(|value| value.parse().ok())
        })
    }

    fn headers(&self) -> Headers {
        let mut headers = vec![
            Header::Other("Via".to_string(), self.via.to_string()),
            Header::Other("From".to_string(), self.from.to_string()),
            Header::Other("To".to_string(), self.to.to_string()),
            Header::Other("Call-ID".to_string(), self.call_id.clone()),
            Header::Other(
                "CSeq".to_string(),
                format!("{} {}", self.cseq, self.cseq_method),
            ),
        ];

        if let Some(contact) = &self.contact {
            headers.push(Header::Other("Contact".to_string(), contact.to_string()));
        }
        if let Some(max_forwards) = self.max_forwards {
            headers.push(Header::Other(
                "Max-Forwards".to_string(),
                max_forwards.to_string(),
            ));
        }
        if let Some(user_agent) = &self.user_agent {
            headers.push(Header::Other("User-Agent".to_string(), user_agent.clone()));
        }
        if let Some(expires) = self.expires {
            headers.push(Header::Other("Expires".to_string(), expires.to_string()));
        }
        if let Some(authorization) = &self.authorization {
            headers.push(Header::Other(
                "Authorization".to_string(),
                authorization.clone(),
            ));
        }
        if let Some(payload) = &self.payload {
            headers.push(Header::Other(
                "Content-Type".to_string(),
                payload.content_type.clone(),
            ));
        }
        headers.push(Header::Other(
            "Content-Length".to_string(),
            self.payload
                .as_ref()
                .map_or(0, |payload| payload.data.len())
                .to_string(),
        ));

        Headers::from(headers)
    }

    /// Wire bytes. rsip renders the start line and headers; the body is
    /// appended as-is so non-UTF-8 payloads survive untouched.
    pub fn to_bytes(&self) -> Result<Bytes, SipError> {
        let head = match &self.kind {
            MessageKind::Request {
                method,
                request_target,
            } => rsip::Request {
                method: method.to_rsip(),
                uri: rsip::Uri::try_from(request_target.to_string().as_str())?,
                version: rsip::Version::V2,
                headers: self.headers(),
                body: Vec::new(),
            }
            .to_string(),
            MessageKind::Response { status, .. } => rsip::Response {
                status_code: rsip::StatusCode::from(*status),
                version: rsip::Version::V2,
                headers: self.headers(),
                body: Vec::new(),
            }
            .to_string(),
        };

        let body = self.payload.as_ref().map(|payload| payload.data.as_ref());
        let head = head.trim_end_matches(['\r', '\n']);

        let mut buf = BytesMut::with_capacity(head.len() + 4 + body.map_or(0, <[u8]>::len));
        buf.put_slice(head.as_bytes());
        buf.put_slice(b"\r\n\r\n");
        if let Some(body) = body {
            buf.put_slice(body);
        }
        Ok(buf.freeze())
    }
}
