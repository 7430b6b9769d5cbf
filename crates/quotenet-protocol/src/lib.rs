//! Wire protocol for quotenet gossip topics.
//!
//! Topic payloads are bare JSON objects with two string fields. There
//! is no envelope, version tag, or signature.
//!
//! # Modules
//!
//! - [`quote`]: the `PriceQuote` domain message
//! - [`codec`]: JSON encoding/decoding with contained failures

pub mod codec;
pub mod quote;
