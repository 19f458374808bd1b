//! MANSCDP - the XML command set carried in GB28181 MESSAGE bodies

pub mod charset;
pub mod codec;

pub use codec::{decode, encode_catalog_query, CmdType, ManscdpMessage};
