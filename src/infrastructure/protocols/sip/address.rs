//! SIP URIs, name-addr headers (From/To/Contact) and the Via header

use super::message::SipError;
use super::params::ParamChain;
use std::fmt;
use std::net::SocketAddr;

/// Split `host[:port]`, accepting bracketed IPv6 (`[::1]:5060`)
fn split_host_port(raw: &str) -> Result<(String, Option<u16>), SipError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SipError::ParseError("empty host".to_string()));
    }

    let (host, port) = if let Some(rest) = raw.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| SipError::ParseError(format!("unterminated IPv6 host: {}", raw)))?;
        (host, tail.strip_prefix(':'))
    } else {
        match raw.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (raw, None),
        }
    };

    let port = port
        .map(|p| {
            p.trim()
                .parse::<u16>()
                .map_err(|_| SipError::ParseError(format!("invalid port in {}", raw)))
        })
        .transpose()?;

    Ok((host.to_string(), port))
}

fn fmt_host(f: &mut fmt::Formatter<'_>, host: &str, port: Option<u16>) -> fmt::Result {
    if host.contains(':') {
        write!(f, "[{}]", host)?;
    } else {
        write!(f, "{}", host)?;
    }
    if let Some(port) = port {
        write!(f, ":{}", port)?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipUri {
    pub scheme: String,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub params: ParamChain,
}

impl SipUri {
    pub fn new(user: Option<&str>, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            scheme: "sip".to_string(),
            user: user.map(str::to_string),
            host: host.into(),
            port,
            params: ParamChain::new(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, SipError> {
        let raw = raw.trim();
        let (scheme, rest) = raw
            .split_once(':')
            .ok_or_else(|| SipError::ParseError(format!("URI without scheme: {}", raw)))?;
        if !scheme.eq_ignore_ascii_case("sip") && !scheme.eq_ignore_ascii_case("sips") {
            return Err(SipError::ParseError(format!("unsupported URI scheme: {}", scheme)));
        }

        // URI headers (`?a=b`) are not used by the gateway
        let rest = rest.split('?').next().unwrap_or_default();
        let (hostport, params) = match rest.split_once(';') {
            Some((hostport, params)) => (hostport, ParamChain::parse(params)),
            None => (rest, ParamChain::new()),
        };
        let (user, hostport) = match hostport.split_once('@') {
            Some((user, hostport)) => (Some(user.to_string()), hostport),
            None => (None, hostport),
        };
        let (host, port) = split_host_port(hostport)?;

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            user,
            host,
            port,
            params,
        })
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        fmt_host(f, &self.host, self.port)?;
        write!(f, "{}", self.params)
    }
}

/// A `From`, `To` or `Contact` value: optional display name, URI, header params
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipAddress {
    pub display_name: Option<String>,
    pub uri: SipUri,
    pub params: ParamChain,
}

impl SipAddress {
    pub fn new(uri: SipUri) -> Self {
        Self {
            display_name: None,
            uri,
            params: ParamChain::new(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, SipError> {
        let raw = raw.trim();

        if let Some(open) = raw.find('<') {
            let close = raw[open..]
                .find('>')
                .map(|offset| open + offset)
                .ok_or_else(|| SipError::ParseError(format!("unterminated name-addr: {}", raw)))?;

            let display_name = raw[..open].trim().trim_matches('"').trim();
            return Ok(Self {
                display_name: (!display_name.is_empty()).then(|| display_name.to_string()),
                uri: SipUri::parse(&raw[open + 1..close])?,
                params: ParamChain::parse(&raw[close + 1..]),
            });
        }

        // addr-spec form: everything after the first ';' belongs to the header
        let (uri, params) = match raw.split_once(';') {
            Some((uri, params)) => (uri, ParamChain::parse(params)),
            None => (raw, ParamChain::new()),
        };
        Ok(Self {
            display_name: None,
            uri: SipUri::parse(uri)?,
            params,
        })
    }

    pub fn user(&self) -> Option<&str> {
        self.uri.user.as_deref()
    }

    pub fn tag(&self) -> Option<&str> {
        self.params.value("tag")
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.params.set("tag", Some(tag.into()));
    }

    /// Copy with the `tag` parameter cleared, for reuse in a new request
    pub fn without_tag(&self) -> Self {
        let mut address = self.clone();
        address.params.remove("tag");
        address
    }
}

impl fmt::Display for SipAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.display_name {
            write!(f, "\"{}\" ", name)?;
        }
        write!(f, "<{}>{}", self.uri, self.params)
    }
}

/// The topmost Via of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Via {
    /// `SIP/2.0/UDP`
    pub protocol: String,
    pub host: String,
    pub port: Option<u16>,
    pub params: ParamChain,
}

impl Via {
    pub fn udp(host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: "SIP/2.0/UDP".to_string(),
            host: host.into(),
            port: Some(port),
            params: ParamChain::new(),
        }
    }

    /// Parse a Via value. Only the first entry of a comma-joined list is kept.
    pub fn parse(raw: &str) -> Result<Self, SipError> {
        let first = raw.split(',').next().unwrap_or_default().trim();
        let (protocol, rest) = first
            .split_once(char::is_whitespace)
            .ok_or_else(|| SipError::ParseError(format!("invalid Via: {}", raw)))?;

        let rest = rest.trim();
        let (sent_by, params) = match rest.split_once(';') {
            Some((sent_by, params)) => (sent_by, ParamChain::parse(params)),
            None => (rest, ParamChain::new()),
        };
        let (host, port) = split_host_port(sent_by)?;

        Ok(Self {
            protocol: protocol.to_string(),
            host,
            port,
            params,
        })
    }

    pub fn branch(&self) -> Option<&str> {
        self.params.value("branch")
    }

    /// Record the address a request was actually received from.
    /// Any prior `received`/`rport` is dropped and both are appended last.
    pub fn stamp_received(&mut self, source: SocketAddr) {
        self.params.remove("received");
        self.params.remove("rport");
        self.params.push("received", Some(source.ip().to_string()));
        self.params.push("rport", Some(source.port().to_string()));
    }

    /// Address learned from `received` + `rport`, if the peer filled both in
    pub fn public_address(&self) -> Option<SocketAddr> {
        let ip = self.params.value("received")?.parse().ok()?;
        let port = self.params.value("rport")?.parse().ok()?;
        Some(SocketAddr::new(ip, port))
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.protocol)?;
        fmt_host(f, &self.host, self.port)?;
        write!(f, "{}", self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uri() {
        let uri = SipUri::parse("sip:34020000001320000001@192.168.1.64:5060;transport=udp").unwrap();
        assert_eq!(uri.user.as_deref(), Some("34020000001320000001"));
        assert_eq!(uri.host, "192.168.1.64");
        assert_eq!(uri.port, Some(5060));
        assert_eq!(uri.params.value("transport"), Some("udp"));
        assert_eq!(
            uri.to_string(),
            "sip:34020000001320000001@192.168.1.64:5060;transport=udp"
        );
    }

    #[test]
    fn test_parse_uri_without_user_or_port() {
        let uri = SipUri::parse("sip:3402000000").unwrap();
        assert!(uri.user.is_none());
        assert_eq!(uri.host, "3402000000");
        assert!(uri.port.is_none());
    }

    #[test]
    fn test_parse_ipv6_uri() {
        let uri = SipUri::parse("sip:dev@[2001:db8::1]:5060").unwrap();
        assert_eq!(uri.host, "2001:db8::1");
        assert_eq!(uri.port, Some(5060));
        assert_eq!(uri.to_string(), "sip:dev@[2001:db8::1]:5060");
    }

    #[test]
    fn test_reject_non_sip_uri() {
        assert!(SipUri::parse("http://example.com").is_err());
        assert!(SipUri::parse("no-scheme").is_err());
    }

    #[test]
    fn test_parse_name_addr() {
        let addr = SipAddress::parse(
            "\"Camera\" <sip:34020000001320000001@3402000000>;tag=1928301774",
        )
        .unwrap();
        assert_eq!(addr.display_name.as_deref(), Some("Camera"));
        assert_eq!(addr.user(), Some("34020000001320000001"));
        assert_eq!(addr.tag(), Some("1928301774"));
    }

    #[test]
    fn test_parse_addr_spec_params_belong_to_header() {
        let addr = SipAddress::parse("sip:34020000001320000001@3402000000;tag=abc").unwrap();
        assert_eq!(addr.tag(), Some("abc"));
        assert!(addr.uri.params.is_empty());
    }

    #[test]
    fn test_without_tag() {
        let addr = SipAddress::parse("<sip:34020000001320000001@3402000000>;tag=abc;x=1").unwrap();
        let stripped = addr.without_tag();
        assert!(stripped.tag().is_none());
        assert_eq!(stripped.to_string(), "<sip:34020000001320000001@3402000000>;x=1");
        assert_eq!(addr.tag(), Some("abc"));
    }

    #[test]
    fn test_parse_via() {
        let via = Via::parse("SIP/2.0/UDP 192.168.1.64:5060;rport;branch=z9hG4bK776asdhds").unwrap();
        assert_eq!(via.protocol, "SIP/2.0/UDP");
        assert_eq!(via.host, "192.168.1.64");
        assert_eq!(via.port, Some(5060));
        assert_eq!(via.branch(), Some("z9hG4bK776asdhds"));
    }

    #[test]
    fn test_parse_via_takes_first_of_list() {
        let via = Via::parse(
            "SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bKa, SIP/2.0/UDP 10.0.0.2:5060;branch=z9hG4bKb",
        )
        .unwrap();
        assert_eq!(via.host, "10.0.0.1");
        assert_eq!(via.branch(), Some("z9hG4bKa"));
    }

    #[test]
    fn test_stamp_received() {
        let mut via = Via::parse("SIP/2.0/UDP 192.168.1.64:5060;rport;branch=z9hG4bK776asdhds").unwrap();
        via.stamp_received("10.1.2.3:40000".parse().unwrap());

        assert_eq!(
            via.to_string(),
            "SIP/2.0/UDP 192.168.1.64:5060;branch=z9hG4bK776asdhds;received=10.1.2.3;rport=40000"
        );
        assert_eq!(via.public_address(), Some("10.1.2.3:40000".parse().unwrap()));
    }

    #[test]
    fn test_public_address_needs_both_params() {
        let via = Via::parse("SIP/2.0/UDP 192.168.1.64:5060;branch=z9hG4bK1;rport").unwrap();
        assert!(via.public_address().is_none());
    }
}
