use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Decoder, Encoder};
use crate::ServiceError;

pub const DEFAULT_ENCODE_URL: &str = "http://127.0.0.1:5000/encode";
pub const DEFAULT_DECODE_URL: &str = "http://127.0.0.1:5000/decode";

/// Endpoints and limits for the encode/decode service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub encode_url: String,
    pub decode_url: String,
    /// Upper bound for a single encode or decode request, in seconds.
    pub timeout_seconds: u64,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            encode_url: DEFAULT_ENCODE_URL.to_string(),
            decode_url: DEFAULT_DECODE_URL.to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeRequest {
    /// File content, base64 encoded.
    pub text: String,
}

/// Fragment symbols are residues modulo a prime above 255, so they can exceed a byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeResponse {
    pub encoded_fragments: Vec<Vec<u16>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeRequest {
    pub fragments: Vec<Vec<u16>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeResponse {
    pub recovered: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Talks JSON over HTTP to the dispersal service's `/encode` and `/decode` routes.
#[derive(Debug, Clone)]
pub struct HttpCodecClient {
    client: reqwest::Client,
    config: CodecConfig,
}

impl HttpCodecClient {
    pub fn new(config: CodecConfig) -> Result<Self, ServiceError> {
        if config.timeout_seconds == 0 {
            return Err(ServiceError::Configuration(
                "codec timeout must be at least one second".into(),
            ));
        }
        for url in [&config.encode_url, &config.decode_url] {
            reqwest::Url::parse(url)
                .map_err(|e| ServiceError::Configuration(format!("invalid URL {}: {}", url, e)))?;
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ServiceError::Configuration(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    async fn post<B, R>(&self, url: &str, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body = parse_error_body(&text);
            warn!(url, status = %status, "codec service returned error");
            return Err(ServiceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))
    }

    fn transport_error(&self, e: reqwest::Error) -> ServiceError {
        if e.is_timeout() {
            ServiceError::Timeout(self.config.timeout_seconds)
        } else {
            ServiceError::Http(e.to_string())
        }
    }
}

/// Stores each symbol as two big-endian bytes.
pub fn pack_symbols(symbols: &[u16]) -> Vec<u8> {
    symbols.iter().flat_map(|symbol| symbol.to_be_bytes()).collect()
}

pub fn unpack_symbols(blob: &[u8]) -> Result<Vec<u16>, ServiceError> {
    if blob.len() % 2 != 0 {
        return Err(ServiceError::Parse(format!(
            "fragment of {} bytes is not a whole number of symbols",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Prefers the service's `{"error": ...}` message over the raw body.
fn parse_error_body(text: &str) -> String {
    serde_json::from_str::<ErrorBody>(text)
        .map(|body| body.error)
        .unwrap_or_else(|_| text.to_string())
}

#[async_trait]
impl Encoder for HttpCodecClient {
    async fn encode(&self, data: &[u8]) -> Result<Vec<Vec<u8>>, ServiceError> {
        let request = EncodeRequest {
            text: BASE64_STANDARD.encode(data),
        };
        debug!(url = %self.config.encode_url, bytes = data.len(), "sending encode request");

        let response: EncodeResponse = self.post(&self.config.encode_url, &request).await?;
        Ok(response
            .encoded_fragments
            .iter()
            .map(|symbols| pack_symbols(symbols))
            .collect())
    }
}

#[async_trait]
impl Decoder for HttpCodecClient {
    async fn decode(&self, fragments: &[Vec<u8>]) -> Result<Vec<u8>, ServiceError> {
        let request = DecodeRequest {
            fragments: fragments
                .iter()
                .map(|blob| unpack_symbols(blob))
                .collect::<Result<_, _>>()?,
        };
        debug!(url = %self.config.decode_url, fragments = fragments.len(), "sending decode request");

        let response: DecodeResponse = self.post(&self.config.decode_url, &request).await?;
        Ok(response.recovered.into_bytes())
    }
}
