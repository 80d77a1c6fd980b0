use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::Geocoder;
use crate::fetch::auth::UrlParam;
use crate::fetch::{BasicClient, HttpClient, fetch_json};
use crate::types::Coordinates;

pub const DEFAULT_BASE_URL: &str = "https://api.mapbox.com";

/// Forward geocoder backed by the Mapbox `mapbox.places` endpoint.
pub struct MapboxGeocoder<C> {
    client: C,
    base_url: String,
}

impl MapboxGeocoder<UrlParam<BasicClient>> {
    /// Authenticates every request with `access_token=<token>`.
    pub fn new(access_token: String, base_url: Option<String>) -> Result<Self> {
        let basic = BasicClient::with_timeout(Duration::from_secs(30))?;
        Ok(Self::with_client(
            UrlParam::new(basic, "access_token", access_token),
            base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        ))
    }
}

impl<C: HttpClient> MapboxGeocoder<C> {
    pub fn with_client(client: C, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// `{base}/geocoding/v5/mapbox.places/{query}.json?country={cc}&limit=1`
    pub fn request_url(&self, query: &str, country: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)?;
        let resource = format!("{query}.json");
        url.path_segments_mut()
            .map_err(|_| anyhow!("geocoder base URL '{}' cannot have a path", self.base_url))?
            .pop_if_empty()
            .extend(["geocoding", "v5", "mapbox.places", resource.as_str()]);
        url.query_pairs_mut()
            .append_pair("country", country)
            .append_pair("limit", "1");
        Ok(url)
    }
}

#[async_trait]
impl<C: HttpClient> Geocoder for MapboxGeocoder<C> {
    async fn lookup(&self, query: &str, country: &str) -> Result<Option<Coordinates>> {
        let url = self.request_url(query, country)?;
        let body: Value = fetch_json(&self.client, url).await?;
        let center = parse_center(&body)?;
        debug!(query, found = center.is_some(), "Geocode lookup complete");
        Ok(center)
    }
}

/// Reads the best match from a places response.
///
/// Mapbox orders `center` as `[lon, lat]`. An empty `features` array is a
/// miss; a body without `features`, or a match without a numeric center, is
/// malformed.
pub fn parse_center(body: &Value) -> Result<Option<Coordinates>> {
    let features = body["features"]
        .as_array()
        .ok_or_else(|| anyhow!("geocode response has no 'features' array"))?;

    let Some(best) = features.first() else {
        return Ok(None);
    };

    let center = best["center"]
        .as_array()
        .ok_or_else(|| anyhow!("geocode match has no 'center'"))?;

    match (
        center.first().and_then(Value::as_f64),
        center.get(1).and_then(Value::as_f64),
    ) {
        (Some(lon), Some(lat)) => Ok(Some(Coordinates::new(lat, lon))),
        _ => Err(anyhow!("geocode match has a malformed 'center'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::Enricher;
    use crate::types::DropReason;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Transport that answers every request with one status and body and
    /// records the URLs it was asked for.
    #[derive(Clone)]
    struct CannedClient {
        status: u16,
        body: String,
        urls: Arc<Mutex<Vec<String>>>,
    }

    impl CannedClient {
        fn new(status: u16, body: serde_json::Value) -> Self {
            Self {
                status,
                body: body.to_string(),
                urls: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl HttpClient for CannedClient {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            self.urls.lock().unwrap().push(req.url().to_string());
            let resp = http::Response::builder()
                .status(self.status)
                .body(self.body.clone())
                .unwrap();
            Ok(reqwest::Response::from(resp))
        }
    }

    fn authed(client: &CannedClient) -> MapboxGeocoder<UrlParam<CannedClient>> {
        MapboxGeocoder::with_client(
            UrlParam::new(client.clone(), "access_token", "pk.test"),
            DEFAULT_BASE_URL.to_string(),
        )
    }

    #[tokio::test]
    async fn test_lookup_appends_token_and_reads_center() {
        let client = CannedClient::new(200, json!({ "features": [{ "center": [-97.74, 30.27] }] }));
        let geocoder = authed(&client);

        let found = geocoder.lookup("Austin, TX", "US").await.unwrap();

        assert_eq!(found, Some(Coordinates::new(30.27, -97.74)));
        let expected = "https://api.mapbox.com/geocoding/v5/mapbox.places/Austin,%20TX.json?country=US&limit=1&access_token=pk.test";
        assert_eq!(client.urls.lock().unwrap().as_slice(), [expected]);
    }

    #[tokio::test]
    async fn test_lookup_empty_features_is_miss() {
        let client = CannedClient::new(200, json!({ "features": [] }));
        let mut enricher = Enricher::new(authed(&client));

        let outcome = enricher.resolve(Some("Atlantis"), "NV").await;

        assert_eq!(outcome, Err(DropReason::GeocodeMiss("Atlantis, NV".to_string())));
        assert!(enricher.cache().is_empty());
    }

    #[tokio::test]
    async fn test_error_status_is_geocode_failure() {
        for status in [401, 500] {
            let client = CannedClient::new(status, json!({ "message": "Not Authorized" }));
            let mut enricher = Enricher::new(authed(&client));

            let outcome = enricher.resolve(Some("Austin"), "TX").await;

            match outcome {
                Err(DropReason::GeocodeFailed { key, message }) => {
                    assert_eq!(key, "Austin, TX");
                    assert!(!message.contains("pk.test"), "token leaked: {message}");
                }
                other => panic!("expected GeocodeFailed for {status}, got {other:?}"),
            }
            assert!(enricher.cache().is_empty());
            assert_eq!(client.urls.lock().unwrap().len(), 1);
        }
    }

    #[test]
    fn test_parse_center_best_match() {
        let body = json!({
            "type": "FeatureCollection",
            "features": [
                { "place_name": "Austin, Texas, United States", "center": [-97.7437, 30.2711] },
                { "place_name": "Austin, Minnesota, United States", "center": [-92.97, 43.67] }
            ]
        });
        let center = parse_center(&body).unwrap();
        assert_eq!(center, Some(Coordinates::new(30.2711, -97.7437)));
    }

    #[test]
    fn test_parse_center_no_match() {
        let body = json!({ "features": [] });
        assert_eq!(parse_center(&body).unwrap(), None);
    }

    #[test]
    fn test_parse_center_malformed() {
        assert!(parse_center(&json!({ "message": "Not Authorized" })).is_err());
        assert!(parse_center(&json!({ "features": [{ "center": ["x", 1.0] }] })).is_err());
        assert!(parse_center(&json!({ "features": [{ "id": "place.1" }] })).is_err());
    }

    #[test]
    fn test_request_url_encodes_query() {
        let geocoder =
            MapboxGeocoder::with_client(BasicClient::new(), "https://api.mapbox.com".to_string());
        let url = geocoder.request_url("Austin, TX", "US").unwrap();

        assert_eq!(
            url.as_str(),
            "https://api.mapbox.com/geocoding/v5/mapbox.places/Austin,%20TX.json?country=US&limit=1"
        );
    }

    #[test]
    fn test_request_url_with_base_path() {
        let geocoder = MapboxGeocoder::with_client(
            BasicClient::new(),
            "http://localhost:8080/proxy/".to_string(),
        );
        let url = geocoder.request_url("Reno, NV", "US").unwrap();

        assert!(
            url.as_str()
                .starts_with("http://localhost:8080/proxy/geocoding/v5/mapbox.places/")
        );
    }
}
