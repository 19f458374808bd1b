//! MANSCDP XML bodies: Keepalive / Catalog / Alarm

use super::charset;
use crate::domain::device::DeviceCatalogItem;
use crate::domain::shared::{GatewayError, Result};
use bytes::Bytes;
use encoding_rs::GBK;
use quick_xml::de::from_str;
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmdType {
    Catalog,
    Keepalive,
    Alarm,
    Other(String),
}

impl CmdType {
    fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("Catalog") {
            CmdType::Catalog
        } else if raw.eq_ignore_ascii_case("Keepalive") {
            CmdType::Keepalive
        } else if raw.eq_ignore_ascii_case("Alarm") {
            CmdType::Alarm
        } else {
            CmdType::Other(raw.to_string())
        }
    }
}

impl fmt::Display for CmdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmdType::Catalog => write!(f, "Catalog"),
            CmdType::Keepalive => write!(f, "Keepalive"),
            CmdType::Alarm => write!(f, "Alarm"),
            CmdType::Other(other) => write!(f, "{}", other),
        }
    }
}

/// Decoded body, whatever the root element (`Notify`, `Response`, `Query`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManscdpMessage {
    pub cmd_type: CmdType,
    pub serial_number: Option<u32>,
    pub device_id: String,
    pub sum_num: Option<u32>,
    pub items: Vec<DeviceCatalogItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawMessage {
    cmd_type: String,
    #[serde(rename = "SN", default)]
    sn: Option<String>,
    #[serde(rename = "DeviceID", default)]
    device_id: String,
    #[serde(default)]
    sum_num: Option<String>,
    #[serde(default)]
    device_list: Option<RawDeviceList>,
}

#[derive(Debug, Deserialize)]
struct RawDeviceList {
    #[serde(rename = "@Num", default)]
    _num: Option<String>,
    #[serde(rename = "Item", default)]
    items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawItem {
    #[serde(rename = "DeviceID", default)]
    device_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    manufacturer: String,
    #[serde(default)]
    model: String,
}

fn lenient_number(raw: Option<String>) -> Option<u32> {
    raw.and_then(|value| value.trim().parse().ok())
}

/// Decode a MANSCDP body, honoring the charset its prolog declares
pub fn decode(data: &[u8]) -> Result<ManscdpMessage> {
    let (text, encoding, had_errors) = charset::decode(data);
    if had_errors {
        tracing::debug!(
            encoding = encoding.name(),
            "MANSCDP body contained malformed sequences"
        );
    }

    let raw: RawMessage = from_str(text.trim())
        .map_err(|e| GatewayError::InvalidCatalogPayload(format!("Failed to parse MANSCDP XML: {}", e)))?;

    let items = raw
        .device_list
        .map(|list| {
            list.items
                .into_iter()
                .map(|item| DeviceCatalogItem {
                    id: item.device_id.trim().to_string(),
                    name: item.name.trim().to_string(),
                    manufacturer: item.manufacturer.trim().to_string(),
                    model: item.model.trim().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ManscdpMessage {
        cmd_type: CmdType::parse(&raw.cmd_type),
        serial_number: lenient_number(raw.sn),
        device_id: raw.device_id.trim().to_string(),
        sum_num: lenient_number(raw.sum_num),
        items,
    })
}

/// Catalog query for `device_id`, GB2312 on the wire
pub fn encode_catalog_query(serial_number: u32, device_id: &str) -> Bytes {
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"GB2312\"?>\r\n\
         <Query>\r\n\
         <CmdType>Catalog</CmdType>\r\n\
         <SN>{}</SN>\r\n\
         <DeviceID>{}</DeviceID>\r\n\
         </Query>\r\n",
        serial_number,
        quick_xml::escape::escape(device_id)
    );
    Bytes::from(charset::encode(&xml, GBK).into_owned())
}
