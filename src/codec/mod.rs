//! Clients for the external service that splits files into redundant
//! fragments and reassembles them.

mod http;

use async_trait::async_trait;

use crate::ServiceError;

pub use http::{
    pack_symbols, unpack_symbols, CodecConfig, DecodeRequest, DecodeResponse, EncodeRequest,
    EncodeResponse, HttpCodecClient,
};

#[async_trait]
pub trait Encoder: Send + Sync {
    /// Returns fragments in the order the decoder expects them back.
    async fn encode(&self, data: &[u8]) -> Result<Vec<Vec<u8>>, ServiceError>;
}

#[async_trait]
pub trait Decoder: Send + Sync {
    async fn decode(&self, fragments: &[Vec<u8>]) -> Result<Vec<u8>, ServiceError>;
}
