use foundation::Extrema;
use tracing::debug;

use crate::error::StreamError;
use crate::http::HttpTileClient;
use crate::key::TileRequestKey;
use crate::multiplexer::TileRequester;
use crate::protocol::{TileData, TileRequest};

/// Payload and reported value range for one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedTile {
    pub data: TileData,
    pub extrema: Option<Extrema>,
}

/// Tile data source: the shared channel signals readiness (and may carry the
/// payload inline); otherwise the payload is pulled over HTTP.
#[derive(Clone)]
pub struct TileSource {
    requester: TileRequester,
    http: Option<HttpTileClient>,
}

impl TileSource {
    pub fn new(requester: TileRequester, http: Option<HttpTileClient>) -> Self {
        Self { requester, http }
    }

    pub fn requester(&self) -> &TileRequester {
        &self.requester
    }

    pub async fn fetch(&self, request: TileRequest) -> Result<FetchedTile, StreamError> {
        let response = self.requester.request(request.clone()).await?;
        let data = match (&response.data, &self.http) {
            (Some(inline), _) => TileData::from_json(inline)?,
            (None, Some(http)) => http.fetch(&request).await?,
            (None, None) => {
                debug!(key = %TileRequestKey::for_request(&request), "tile ready without payload");
                TileData::Empty
            }
        };
        Ok(FetchedTile {
            data,
            extrema: response.extrema,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamingConfig;
    use crate::protocol::{TileCoord, TileParams, TileResponse};
    use crate::RequestError;
    use serde_json::json;

    #[tokio::test]
    async fn inline_payload_is_decoded() {
        let (requester, _rx) = TileRequester::new(StreamingConfig::default());
        requester.mark_open();
        let source = TileSource::new(requester.clone(), None);
        let req = TileRequest::new("e", "i", "heatmap", TileCoord::new(0, 0, 0), TileParams::new());

        let fetch = tokio::spawn({
            let source = source.clone();
            let req = req.clone();
            async move { source.fetch(req).await }
        });
        while !requester.is_pending(&TileRequestKey::for_request(&req)) {
            tokio::task::yield_now().await;
        }
        let mut resp = TileResponse::answering(&req, true);
        resp.data = Some(json!([0.0, 4.0, 2.0, 1.0]));
        resp.extrema = Some(Extrema::new(0.0, 4.0));
        requester.dispatch(resp);

        let tile = fetch.await.expect("join").expect("fetch");
        assert_eq!(tile.data, TileData::Bins(vec![0.0, 4.0, 2.0, 1.0]));
        assert_eq!(tile.extrema, Some(Extrema::new(0.0, 4.0)));
    }

    #[tokio::test]
    async fn request_failure_propagates() {
        let (requester, _rx) = TileRequester::new(StreamingConfig::default());
        let source = TileSource::new(requester, None);
        let req = TileRequest::new("e", "i", "heatmap", TileCoord::new(0, 0, 0), TileParams::new());
        let err = source.fetch(req).await.expect_err("not open");
        assert!(matches!(err, StreamError::Request(RequestError::ChannelNotOpen)));
    }
}
