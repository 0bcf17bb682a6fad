//! HTTP fallback for pulling tile payloads.
//!
//! `GET {base}/{endpoint}/{index}/{type}/{z}/{x}/{y}?{params}` returns either a
//! binary body of little-endian f64 bins or a JSON counts object.

use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use crate::config::StreamingConfig;
use crate::error::StreamError;
use crate::key::param_value_string;
use crate::protocol::{TileData, TileRequest};

#[derive(Debug, Clone)]
pub struct HttpTileClient {
    base: Url,
    client: reqwest::Client,
}

impl HttpTileClient {
    pub fn new(base_url: &str, config: &StreamingConfig) -> Result<Self, StreamError> {
        let base = Url::parse(base_url).map_err(|err| StreamError::InvalidAddress {
            address: base_url.to_string(),
            message: err.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(StreamError::InvalidAddress {
                address: base_url.to_string(),
                message: "url cannot be used as a base".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()?;
        Ok(Self { base, client })
    }

    pub fn tile_url(&self, request: &TileRequest) -> Result<Url, StreamError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StreamError::InvalidAddress {
                    address: self.base.to_string(),
                    message: "url cannot be used as a base".to_string(),
                })?;
            segments.pop_if_empty();
            segments.push(&request.endpoint);
            segments.push(&request.index);
            segments.push(&request.tile_type);
            let coord = request.tilecoord.normalized();
            segments.push(&coord.z.to_string());
            segments.push(&coord.x.to_string());
            segments.push(&coord.y.to_string());
        }
        if request.params.is_empty() {
            url.set_query(None);
        } else {
            let mut query = url.query_pairs_mut();
            query.clear();
            for (k, v) in &request.params {
                query.append_pair(k, &param_value_string(v));
            }
        }
        Ok(url)
    }

    pub async fn fetch(&self, request: &TileRequest) -> Result<TileData, StreamError> {
        let url = self.tile_url(request)?;
        debug!(%url, "fetching tile over http");
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "tile fetch failed");
            return Err(StreamError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json"));
        let body = response.bytes().await?;

        if is_json {
            let value: serde_json::Value = serde_json::from_slice(&body)?;
            TileData::from_json(&value)
        } else {
            TileData::from_le_bytes(&body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{TileCoord, TileParams};
    use serde_json::json;

    #[test]
    fn builds_tile_urls() {
        let client =
            HttpTileClient::new("http://localhost:8080/tile/", &StreamingConfig::default()).expect("client");

        let mut params = TileParams::new();
        params.insert("resolution".into(), json!(64));
        params.insert("topics".into(), json!("a,b"));
        let req = TileRequest::new("openstack", "idx", "heatmap", TileCoord::new(5, 3, 4), params);
        assert_eq!(
            client.tile_url(&req).expect("url").as_str(),
            "http://localhost:8080/tile/openstack/idx/heatmap/4/5/3?resolution=64&topics=a%2Cb"
        );

        let bare = TileRequest::new("e", "i", "t", TileCoord::new(0, 0, 0), TileParams::new());
        assert_eq!(
            client.tile_url(&bare).expect("url").as_str(),
            "http://localhost:8080/tile/e/i/t/0/0/0"
        );
    }

    #[test]
    fn tile_urls_use_wrapped_coordinates() {
        let client = HttpTileClient::new("http://localhost:8080/tile", &StreamingConfig::default()).expect("client");
        let mut req = TileRequest::new("e", "i", "heatmap", TileCoord::new(0, 0, 2), TileParams::new());
        req.tilecoord = TileCoord::new(5, 1, 2);
        assert_eq!(
            client.tile_url(&req).expect("url").as_str(),
            "http://localhost:8080/tile/e/i/heatmap/2/1/1"
        );
    }

    #[test]
    fn rejects_unusable_base() {
        assert!(HttpTileClient::new("mailto:someone@example.com", &StreamingConfig::default()).is_err());
        assert!(HttpTileClient::new("::", &StreamingConfig::default()).is_err());
    }
}
