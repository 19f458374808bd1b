//! Wire protocols

pub mod manscdp;
pub mod sip;
