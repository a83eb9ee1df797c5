//! The external geocoding provider, abstracted behind a trait so the
//! pipeline can run against either a live HTTP backend or a fixture-backed
//! double in tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::Client;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex as AsyncMutex;

use crate::country::CountryCode;
use crate::errors::GeocodeError;
use crate::model::Point;

/// Build a stable cache key for one `(address, country)` geocode call, the
/// same way the teacher's `cache_prefix` hashes its cache keys.
fn cache_key(address: &str, country: CountryCode) -> String {
    let mut hasher = Sha256::new();
    hasher.update(address.as_bytes());
    hasher.update(b"|");
    hasher.update(country.as_str().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A `hyper` client shared between concurrent geocoder calls, so keep-alive
/// connections are pooled rather than recreated per request.
pub type SharedHttpClient = Arc<Client<HttpsConnector<HttpConnector>>>;

pub fn shared_http_client(concurrency: usize) -> SharedHttpClient {
    Arc::new(
        Client::builder().pool_max_idle_per_host(concurrency).build(
            HttpsConnectorBuilder::new()
                .with_native_roots()
                .https_only()
                .enable_http2()
                .build(),
        ),
    )
}

/// The outcome of one geocode call. Zero results is `Found`'s sibling, not
/// an error.
#[derive(Clone, Debug)]
pub enum GeocodeOutcome {
    Found {
        point: Point,
        geocoded_address: String,
        raw_response: Value,
    },
    NoResults {
        raw_response: Value,
    },
}

/// An external geocoding provider. Implementations never retry internally;
/// retry policy belongs to the pipeline stage that calls them.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(
        &self,
        address: &str,
        country: CountryCode,
    ) -> Result<GeocodeOutcome, GeocodeError>;
}

/// An HTTP-backed geocoder speaking a simple JSON request/response contract
/// against a configured endpoint.
pub struct HttpGeocoder {
    client: SharedHttpClient,
    endpoint: String,
    api_key: String,
}

impl HttpGeocoder {
    pub fn new(client: SharedHttpClient, endpoint: String, api_key: String) -> Self {
        HttpGeocoder {
            client,
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn geocode(
        &self,
        address: &str,
        country: CountryCode,
    ) -> Result<GeocodeOutcome, GeocodeError> {
        let uri = format!(
            "{}?address={}&country={}&key={}",
            self.endpoint,
            urlencoding_encode(address),
            country,
            self.api_key,
        )
        .parse::<hyper::Uri>()
        .map_err(|e| GeocodeError::Provider(e.to_string()))?;

        let response = self
            .client
            .get(uri)
            .await
            .map_err(|e| GeocodeError::Provider(e.to_string()))?;

        let body = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| GeocodeError::Provider(e.to_string()))?;

        let parsed: Value = serde_json::from_slice(&body)
            .map_err(|e| GeocodeError::Provider(e.to_string()))?;

        parse_response(parsed)
    }
}

fn parse_response(raw_response: Value) -> Result<GeocodeOutcome, GeocodeError> {
    let result_count = raw_response
        .get("result_count")
        .and_then(Value::as_u64)
        .unwrap_or(0);

    if result_count == 0 {
        return Ok(GeocodeOutcome::NoResults { raw_response });
    }

    let lat = raw_response
        .pointer("/geocoded_point/lat")
        .and_then(Value::as_f64)
        .ok_or_else(|| GeocodeError::Provider("missing geocoded_point.lat".to_string()))?;
    let lng = raw_response
        .pointer("/geocoded_point/lng")
        .and_then(Value::as_f64)
        .ok_or_else(|| GeocodeError::Provider("missing geocoded_point.lng".to_string()))?;
    let geocoded_address = raw_response
        .get("geocoded_address")
        .and_then(Value::as_str)
        .ok_or_else(|| GeocodeError::Provider("missing geocoded_address".to_string()))?
        .to_string();

    Ok(GeocodeOutcome::Found {
        point: Point { lat, lng },
        geocoded_address,
        raw_response,
    })
}

/// Minimal query-string escaping; we only ever send addresses and ISO
/// country codes through this, never arbitrary user HTML.
fn urlencoding_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// A deterministic in-memory geocoder for tests, keyed on `(address,
/// country)`. Addresses with no matching fixture return `NoResults`.
#[derive(Default)]
pub struct FixtureGeocoder {
    fixtures: HashMap<(String, String), GeocodeOutcome>,
}

impl FixtureGeocoder {
    pub fn new() -> Self {
        FixtureGeocoder::default()
    }

    pub fn with_result(
        mut self,
        address: impl Into<String>,
        country: CountryCode,
        point: Point,
        geocoded_address: impl Into<String>,
    ) -> Self {
        self.fixtures.insert(
            (address.into(), country.to_string()),
            GeocodeOutcome::Found {
                point,
                geocoded_address: geocoded_address.into(),
                raw_response: Value::Null,
            },
        );
        self
    }
}

#[async_trait]
impl Geocoder for FixtureGeocoder {
    async fn geocode(
        &self,
        address: &str,
        country: CountryCode,
    ) -> Result<GeocodeOutcome, GeocodeError> {
        let key = (address.to_string(), country.to_string());
        Ok(self
            .fixtures
            .get(&key)
            .cloned()
            .unwrap_or(GeocodeOutcome::NoResults {
                raw_response: Value::Null,
            }))
    }
}

/// Wraps another geocoder with an in-memory, call-deduplicating cache keyed
/// by `cache_key`. Scoped to one process run; there is no shared
/// key-value store backing it across runs.
pub struct CachingGeocoder<G> {
    inner: G,
    cache: AsyncMutex<HashMap<String, GeocodeOutcome>>,
}

impl<G> CachingGeocoder<G> {
    pub fn new(inner: G) -> Self {
        CachingGeocoder {
            inner,
            cache: AsyncMutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<G: Geocoder> Geocoder for CachingGeocoder<G> {
    async fn geocode(
        &self,
        address: &str,
        country: CountryCode,
    ) -> Result<GeocodeOutcome, GeocodeError> {
        let key = cache_key(address, country);
        if let Some(outcome) = self.cache.lock().await.get(&key).cloned() {
            return Ok(outcome);
        }

        let outcome = self.inner.geocode(address, country).await?;
        self.cache.lock().await.insert(key, outcome.clone());
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::country;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGeocoder {
        inner: FixtureGeocoder,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Geocoder for CountingGeocoder {
        async fn geocode(
            &self,
            address: &str,
            country: CountryCode,
        ) -> Result<GeocodeOutcome, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.geocode(address, country).await
        }
    }

    #[tokio::test]
    async fn caching_geocoder_only_calls_the_inner_geocoder_once() {
        let us = country::resolve("US").unwrap();
        let inner = CountingGeocoder {
            inner: FixtureGeocoder::new().with_result(
                "100 Main St",
                us,
                Point { lat: 1.0, lng: 2.0 },
                "100 Main St, USA",
            ),
            calls: AtomicUsize::new(0),
        };
        let geocoder = CachingGeocoder::new(inner);

        geocoder.geocode("100 Main St", us).await.unwrap();
        geocoder.geocode("100 Main St", us).await.unwrap();

        assert_eq!(geocoder.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fixture_geocoder_returns_registered_results() {
        let geocoder = FixtureGeocoder::new().with_result(
            "100 Main St",
            country::resolve("US").unwrap(),
            Point { lat: 1.0, lng: 2.0 },
            "100 Main St, USA",
        );
        let outcome = geocoder
            .geocode("100 Main St", country::resolve("US").unwrap())
            .await
            .unwrap();
        assert!(matches!(outcome, GeocodeOutcome::Found { .. }));
    }

    #[tokio::test]
    async fn fixture_geocoder_defaults_to_no_results() {
        let geocoder = FixtureGeocoder::new();
        let outcome = geocoder
            .geocode("nowhere", country::resolve("US").unwrap())
            .await
            .unwrap();
        assert!(matches!(outcome, GeocodeOutcome::NoResults { .. }));
    }
}
