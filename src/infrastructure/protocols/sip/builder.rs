//! SIP message builder utilities
//!
//! GB28181 responses echo the request's From/To unchanged (no swap, no
//! added To tag). Requests originated by the gateway get a fresh Via branch,
//! a fresh From tag and a fresh Call-ID.

use super::address::{SipAddress, SipUri, Via};
use super::message::{reason_phrase, Message, MessageKind, Payload, SipMethod};
use rand::Rng;
use std::net::SocketAddr;

/// RFC 3261 magic cookie every branch starts with
pub const BRANCH_PREFIX: &str = "z9hG4bK";

pub const DEFAULT_MAX_FORWARDS: u32 = 70;

pub fn generate_branch() -> String {
    format!("{}{:016x}", BRANCH_PREFIX, rand::thread_rng().gen::<u64>())
}

pub fn generate_tag() -> String {
    format!("{:08x}", rand::thread_rng().gen::<u32>())
}

pub fn generate_call_id(host: &str) -> String {
    format!("{}@{}", uuid::Uuid::new_v4().simple(), host)
}

/// Who the gateway claims to be on outbound messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub gb_id: String,
    pub host: String,
    pub port: u16,
}

impl LocalIdentity {
    pub fn new(gb_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            gb_id: gb_id.into(),
            host: host.into(),
            port,
        }
    }

    pub fn uri(&self) -> SipUri {
        SipUri::new(Some(&self.gb_id), self.host.clone(), Some(self.port))
    }
}

/// Build a response to a request, with optional body
pub struct ResponseBuilder {
    status: u16,
    user_agent: Option<String>,
    expires: Option<u32>,
    payload: Option<Payload>,
}

impl ResponseBuilder {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            user_agent: None,
            expires: None,
            payload: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn expires(mut self, expires: u32) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// `source` is the address the request actually arrived from
    pub fn build_for_request(self, request: &Message, source: SocketAddr) -> Message {
        let mut via = request.via.clone();
        via.stamp_received(source);

        Message {
            kind: MessageKind::Response {
                status: self.status,
                phrase: reason_phrase(self.status).to_string(),
            },
            via,
            from: request.from.clone(),
            to: request.to.clone(),
            call_id: request.call_id.clone(),
            cseq: request.cseq,
            cseq_method: request.cseq_method,
            contact: None,
            max_forwards: None,
            user_agent: self.user_agent,
            expires: self.expires,
            authorization: None,
            payload: self.payload,
        }
    }
}

/// Header policy of one gateway instance
#[derive(Debug, Clone)]
pub struct HeaderBuilder {
    identity: LocalIdentity,
    user_agent: String,
    fixed_branch: Option<String>,
    response_expires: u32,
}

impl HeaderBuilder {
    pub fn new(identity: LocalIdentity, user_agent: impl Into<String>) -> Self {
        Self {
            identity,
            user_agent: user_agent.into(),
            fixed_branch: None,
            response_expires: 3600,
        }
    }

    /// Reuse one branch on every request instead of generating one
    pub fn with_fixed_branch(mut self, branch: Option<String>) -> Self {
        self.fixed_branch = branch;
        self
    }

    pub fn with_response_expires(mut self, expires: u32) -> Self {
        self.response_expires = expires;
        self
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn response(&self, request: &Message, source: SocketAddr, status: u16) -> Message {
        ResponseBuilder::new(status)
            .user_agent(self.user_agent.clone())
            .expires(self.response_expires)
            .build_for_request(request, source)
    }

    fn branch(&self) -> String {
        self.fixed_branch.clone().unwrap_or_else(generate_branch)
    }

    fn via(&self) -> Via {
        let mut via = Via::udp(self.identity.host.clone(), self.identity.port);
        via.params.push("branch", Some(self.branch()));
        via.params.push("rport", None);
        via
    }

    /// New request toward `target`, whose tag (if any) is dropped.
    /// The caller supplies the CSeq from the device session.
    pub fn new_request(&self, method: SipMethod, target: &SipAddress, cseq: u32) -> Message {
        let mut from = SipAddress::new(self.identity.uri());
        from.set_tag(generate_tag());

        Message {
            kind: MessageKind::Request {
                method,
                request_target: target.uri.clone(),
            },
            via: self.via(),
            from,
            to: target.without_tag(),
            call_id: generate_call_id(&self.identity.host),
            cseq,
            cseq_method: method,
            contact: None,
            max_forwards: Some(DEFAULT_MAX_FORWARDS),
            user_agent: Some(self.user_agent.clone()),
            expires: None,
            authorization: None,
            payload: None,
        }
    }

    /// ACK for a final response to an INVITE
    pub fn ack(&self, response: &Message) -> Message {
        Message {
            kind: MessageKind::Request {
                method: SipMethod::Ack,
                request_target: response.to.uri.clone(),
            },
            via: self.via(),
            from: response.from.clone(),
            to: response.to.clone(),
            call_id: response.call_id.clone(),
            cseq: response.cseq,
            cseq_method: SipMethod::Ack,
            contact: None,
            max_forwards: Some(DEFAULT_MAX_FORWARDS),
            user_agent: Some(self.user_agent.clone()),
            expires: None,
            authorization: None,
            payload: None,
        }
    }
}
