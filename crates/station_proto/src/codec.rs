//! Length-delimited framing for station request and reply bodies.
//!
//! Every body on the wire is a single message prefixed with its varint
//! encoded length, the same framing the station firmware expects.

use bytes::Bytes;
use prost::{DecodeError, Message};

use crate::app::{HttpQuery, HttpReply};

pub fn encode_query(query: &HttpQuery) -> Bytes {
    Bytes::from(query.encode_length_delimited_to_vec())
}

pub fn decode_reply(body: &[u8]) -> Result<HttpReply, DecodeError> {
    HttpReply::decode_length_delimited(body)
}

/// Reply encoding, used by station simulators and tests.
pub fn encode_reply(reply: &HttpReply) -> Bytes {
    Bytes::from(reply.encode_length_delimited_to_vec())
}

pub fn decode_query(body: &[u8]) -> Result<HttpQuery, DecodeError> {
    HttpQuery::decode_length_delimited(body)
}
