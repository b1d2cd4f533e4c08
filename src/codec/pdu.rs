//! Encoding and decoding of whole protocol messages.

use bytes::Bytes;

use super::MsgPackCodec;
use crate::error::{ApolloError, Result};
use crate::pdu::{ApolloPdu, Procedure, Response, Version};

/// Codec for [`ApolloPdu`] payloads.
pub struct PduCodec;

impl PduCodec {
    /// Check a message before it is encoded.
    #[inline]
    pub fn validate(pdu: &ApolloPdu) -> Result<()> {
        pdu.validate()
    }

    /// Validate and serialize a message.
    ///
    /// # Errors
    ///
    /// [`ApolloError::Validation`] if the message is incomplete; nothing is
    /// produced in that case.
    pub fn encode(pdu: &ApolloPdu) -> Result<Bytes> {
        Self::validate(pdu)?;
        Ok(Bytes::from(MsgPackCodec::encode(pdu)?))
    }

    /// Parse a payload into a message.
    #[inline]
    pub fn decode(bytes: &[u8]) -> Result<ApolloPdu> {
        MsgPackCodec::decode(bytes)
    }

    /// Parse a payload that must carry a server reply.
    pub fn decode_response(bytes: &[u8]) -> Result<Response> {
        match Self::decode(bytes)?.procedure {
            Procedure::Response(response) => Ok(response),
            other => Err(ApolloError::UnexpectedResponse {
                expected: "response",
                actual: other.name(),
            }),
        }
    }

    /// Serialize a server reply. Used by servers and test doubles; no
    /// validation applies to replies.
    pub fn encode_response(version: Version, response: Response) -> Result<Bytes> {
        let pdu = ApolloPdu::new(version, Procedure::Response(response));
        Ok(Bytes::from(MsgPackCodec::encode(&pdu)?))
    }
}
