//! Stanza model and payload codec for the Harmony hub protocol.
//!
//! The hub speaks an XMPP dialect where every command is an `iq` stanza with
//! a single `oa` child. This crate provides:
//!
//! - **Stanza types**: [`OutboundStanza`] for requests, [`InboundStanza`] for
//!   replies and unsolicited notifications
//! - **Request encoding**: [`encode_request`] and [`encode_pair_request`]
//! - **Payload decoding**: colon/equals delimited text via
//!   [`decode_delimited`] and JSON via [`decode_json`]
//! - **[`RequestIds`]**: correlation id allocation in the hub's id space
//!
//! Everything here is pure; the connection and correlation logic live in
//! `harmony-client`.

pub mod codec;
pub mod error;
pub mod ids;
pub mod stanza;

pub use codec::{
    decode_delimited, decode_json, decode_payload, encode_action, encode_pair_request,
    encode_request, DecodedPayload, DelimitedPayload, PayloadFormat,
};
pub use error::DecodeError;
pub use ids::RequestIds;
pub use stanza::*;
