//! Codec module - serialization of protocol messages.
//!
//! - [`MsgPackCodec`] - MessagePack via `rmp-serde` (`to_vec_named`, struct-as-map)
//! - [`PduCodec`] - validate/encode/decode for [`ApolloPdu`](crate::pdu::ApolloPdu)
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so the message schema is fixed at compile time.
//!
//! # Example
//!
//! ```
//! use apollo_client::codec::PduCodec;
//! use apollo_client::pdu::{ApolloPdu, Procedure, TableRef, PROTOCOL_VERSION};
//!
//! let pdu = ApolloPdu::new(PROTOCOL_VERSION, Procedure::OpenTable(TableRef::new("people")));
//! let bytes = PduCodec::encode(&pdu).unwrap();
//! assert_eq!(PduCodec::decode(&bytes).unwrap(), pdu);
//! ```

mod msgpack;
mod pdu;

pub use msgpack::MsgPackCodec;
pub use pdu::PduCodec;
