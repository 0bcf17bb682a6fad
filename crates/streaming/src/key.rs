use std::fmt;

use serde_json::Value;

use crate::protocol::{TileCoord, TileParams, TileRequest, TileResponse};

const PARAM_SEPARATOR: &str = "&";

/// Identity of a tile request, used to coalesce duplicates and to correlate
/// responses.
///
/// Two requests share a key iff they name the same endpoint, index, type and
/// (wrapped) coordinate, and their parameters normalise to the same string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileRequestKey(String);

impl TileRequestKey {
    pub fn new(
        endpoint: &str,
        index: &str,
        tile_type: &str,
        coord: TileCoord,
        params: &TileParams,
    ) -> Self {
        let coord = coord.normalized();
        Self(format!(
            "{endpoint}/{index}/{tile_type}/{}/{}/{}?{}",
            coord.z,
            coord.x,
            coord.y,
            normalize_params(params)
        ))
    }

    pub fn for_request(req: &TileRequest) -> Self {
        Self::new(
            &req.endpoint,
            &req.index,
            &req.tile_type,
            req.tilecoord,
            &req.params,
        )
    }

    /// Key recomputed from the identity fields a response echoes back.
    pub fn for_response(resp: &TileResponse) -> Self {
        Self::new(
            &resp.endpoint,
            &resp.index,
            &resp.tile_type,
            resp.tilecoord,
            &resp.params,
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TileRequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical, insertion-order independent encoding of request parameters:
/// lower-cased `key=value` pairs sorted by key and joined with `&`.
pub fn normalize_params(params: &TileParams) -> String {
    let mut pairs: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (k.to_lowercase(), param_value_string(v).to_lowercase()))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(PARAM_SEPARATOR)
}

/// Plain-text rendering of a parameter value, as used in keys and query strings.
pub fn param_value_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                let f = n.as_f64().unwrap_or(0.0);
                if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
                    (f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
        }
        Value::Array(items) => items
            .iter()
            .map(param_value_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> TileParams {
        let mut p = TileParams::new();
        for (k, v) in pairs {
            p.insert((*k).to_string(), v.clone());
        }
        p
    }

    #[test]
    fn key_is_independent_of_insertion_order() {
        let a = params(&[
            ("resolution", json!(32)),
            ("from", json!(100)),
            ("to", json!(200)),
        ]);
        let b = params(&[
            ("to", json!(200)),
            ("from", json!(100)),
            ("resolution", json!(32)),
        ]);
        let coord = TileCoord::wrapped(3, 5, 2);
        let ka = TileRequestKey::new("openstack", "isil_twitter_weekly", "heatmap", coord, &a);
        let kb = TileRequestKey::new("openstack", "isil_twitter_weekly", "heatmap", coord, &b);
        assert_eq!(ka, kb);

        let c = params(&[
            ("to", json!(200)),
            ("from", json!(100)),
            ("resolution", json!(64)),
        ]);
        let kc = TileRequestKey::new("openstack", "isil_twitter_weekly", "heatmap", coord, &c);
        assert_ne!(ka, kc);
    }

    #[test]
    fn normalization_lowercases_and_sorts() {
        let p = params(&[
            ("Topics", json!("A,B")),
            ("from", json!(1.0)),
            ("binned", json!(true)),
        ]);
        assert_eq!(normalize_params(&p), "binned=true&from=1&topics=a,b");
        assert_eq!(normalize_params(&TileParams::new()), "");
    }

    #[test]
    fn integral_floats_match_integers() {
        let a = params(&[("resolution", json!(32.0))]);
        let b = params(&[("resolution", json!(32))]);
        assert_eq!(normalize_params(&a), normalize_params(&b));
        assert_eq!(param_value_string(&json!(0.25)), "0.25");
    }

    #[test]
    fn response_key_matches_request_key() {
        let req = TileRequest::new(
            "openstack",
            "idx",
            "topiccount",
            TileCoord::new(1, 1, 4),
            params(&[("topics", json!("a,b"))]),
        );
        let resp = TileResponse::answering(&req, true);
        assert_eq!(TileRequestKey::for_request(&req), TileRequestKey::for_response(&resp));
    }

    #[test]
    fn coordinate_is_part_of_identity() {
        let p = TileParams::new();
        let a = TileRequestKey::new("e", "i", "t", TileCoord::new(1, 2, 3), &p);
        let b = TileRequestKey::new("e", "i", "t", TileCoord::new(2, 1, 3), &p);
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "e/i/t/3/1/2?");
    }

    #[test]
    fn out_of_range_coordinates_share_a_key() {
        let p = TileParams::new();
        let wide = TileRequestKey::new("e", "i", "heatmap", TileCoord::new(5, 1, 2), &p);
        let inside = TileRequestKey::new("e", "i", "heatmap", TileCoord::new(1, 1, 2), &p);
        assert_eq!(wide, inside);
        assert_eq!(wide.as_str(), "e/i/heatmap/2/1/1?");
    }
}
