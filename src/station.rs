use serde::Deserialize;

use crate::config::NetatmoConfig;
use crate::error::{Error, FetchError};
use crate::types::{DeviceId, SensorReading};

/// Client for the Netatmo weather-station data endpoint.
#[derive(Debug, Clone)]
pub struct StationClient {
    endpoint: String,
    http: reqwest::Client,
}

// ── Vendor payload ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StationDataResponse {
    body: StationDataBody,
}

#[derive(Debug, Deserialize)]
struct StationDataBody {
    #[serde(default)]
    devices: Vec<StationDevice>,
}

#[derive(Debug, Deserialize)]
struct StationDevice {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    module_name: Option<String>,
    #[serde(default)]
    station_name: Option<String>,
    #[serde(default)]
    dashboard_data: Option<DashboardData>,
    /// Epoch seconds.
    #[serde(default)]
    last_status_store: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DashboardData {
    #[serde(rename = "Temperature", default)]
    temperature: Option<f64>,
    #[serde(rename = "Humidity", default)]
    humidity: Option<f64>,
    #[serde(rename = "CO2", default)]
    co2: Option<u32>,
}

impl StationDevice {
    fn into_reading(self) -> Result<SensorReading, FetchError> {
        let malformed = |reason: &str| FetchError::Malformed {
            device: self.id.clone(),
            reason: reason.to_owned(),
        };

        let name = self
            .module_name
            .clone()
            .or_else(|| self.station_name.clone())
            .ok_or_else(|| malformed("missing module_name"))?;
        let data = self
            .dashboard_data
            .as_ref()
            .ok_or_else(|| malformed("missing dashboard_data"))?;
        let temperature_celsius = data
            .temperature
            .ok_or_else(|| malformed("missing Temperature"))?;
        let humidity_percent = data.humidity.ok_or_else(|| malformed("missing Humidity"))?;
        if !(0.0..=100.0).contains(&humidity_percent) {
            return Err(malformed("Humidity outside 0-100"));
        }
        let co2_ppm = data.co2.ok_or_else(|| malformed("missing CO2"))?;
        let last_status_store = self
            .last_status_store
            .ok_or_else(|| malformed("missing last_status_store"))?;

        Ok(SensorReading {
            id: DeviceId(self.id),
            name,
            temperature_celsius,
            humidity_percent,
            co2_ppm,
            last_update: last_status_store.saturating_mul(1000),
        })
    }
}

/// Map a raw `getstationsdata` body to readings, one per device.
///
/// Any device with missing or out-of-range measurements fails the whole batch.
pub(crate) fn parse_readings(raw: &[u8]) -> Result<Vec<SensorReading>, FetchError> {
    let response: StationDataResponse = serde_json::from_slice(raw)?;
    response
        .body
        .devices
        .into_iter()
        .map(StationDevice::into_reading)
        .collect()
}

impl StationClient {
    /// Client with its own HTTP client built from `config` (timeout included).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built.
    pub fn new(config: &NetatmoConfig) -> Result<Self, Error> {
        Ok(Self::with_http_client(config, config.http_client()?))
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(config: &NetatmoConfig, http: reqwest::Client) -> Self {
        let endpoint = format!(
            "{}/getstationsdata",
            config.api_url.as_str().trim_end_matches('/')
        );
        Self { endpoint, http }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch current readings for every station on the account.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Rejected`] on a non-2xx status
    /// - [`FetchError::Http`] on network failure
    /// - [`FetchError::Decode`] / [`FetchError::Malformed`] on an unexpected body
    pub async fn fetch(&self, access_token: &str) -> Result<Vec<SensorReading>, FetchError> {
        let response = self
            .http
            .get(&self.endpoint)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = response.text().await.unwrap_or_default();
            return Err(FetchError::Rejected { status, detail });
        }

        let raw = response.bytes().await?;
        let readings = parse_readings(&raw)?;
        tracing::debug!(count = readings.len(), "Station data fetched");
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn salon_body() -> serde_json::Value {
        serde_json::json!({
            "body": {
                "devices": [{
                    "_id": "d1",
                    "module_name": "Salon",
                    "dashboard_data": { "Temperature": 21.5, "Humidity": 40, "CO2": 600 },
                    "last_status_store": 1_700_000_000
                }]
            },
            "status": "ok"
        })
    }

    fn salon_reading() -> SensorReading {
        SensorReading {
            id: DeviceId::from("d1"),
            name: "Salon".into(),
            temperature_celsius: 21.5,
            humidity_percent: 40.0,
            co2_ppm: 600,
            last_update: 1_700_000_000_000,
        }
    }

    fn parse(value: serde_json::Value) -> Result<Vec<SensorReading>, FetchError> {
        parse_readings(&serde_json::to_vec(&value).unwrap())
    }

    fn client_for(server: &MockServer) -> StationClient {
        let config = NetatmoConfig::new("id", "secret", "https://example.com/cb".parse().unwrap())
            .with_api_url(format!("{}/api", server.uri()).parse().unwrap());
        StationClient::new(&config).unwrap()
    }

    #[test]
    fn maps_single_device() {
        assert_eq!(parse(salon_body()).unwrap(), vec![salon_reading()]);
    }

    #[test]
    fn empty_device_list_is_empty() {
        assert!(parse(serde_json::json!({ "body": { "devices": [] } })).unwrap().is_empty());
    }

    #[test]
    fn falls_back_to_station_name() {
        let mut body = salon_body();
        let device = &mut body["body"]["devices"][0];
        device.as_object_mut().unwrap().remove("module_name");
        device["station_name"] = "Maison".into();

        assert_eq!(parse(body).unwrap()[0].name, "Maison");
    }

    #[test]
    fn missing_dashboard_data_is_malformed() {
        let mut body = salon_body();
        body["body"]["devices"][0]
            .as_object_mut()
            .unwrap()
            .remove("dashboard_data");

        match parse(body).unwrap_err() {
            FetchError::Malformed { device, reason } => {
                assert_eq!(device, "d1");
                assert!(reason.contains("dashboard_data"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_co2_is_malformed() {
        let mut body = salon_body();
        body["body"]["devices"][0]["dashboard_data"]
            .as_object_mut()
            .unwrap()
            .remove("CO2");

        assert!(matches!(parse(body), Err(FetchError::Malformed { .. })));
    }

    #[test]
    fn missing_temperature_is_malformed() {
        let mut body = salon_body();
        body["body"]["devices"][0]["dashboard_data"]
            .as_object_mut()
            .unwrap()
            .remove("Temperature");

        match parse(body).unwrap_err() {
            FetchError::Malformed { device, reason } => {
                assert_eq!(device, "d1");
                assert_eq!(reason, "missing Temperature");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_last_status_store_is_malformed() {
        let mut body = salon_body();
        body["body"]["devices"][0]
            .as_object_mut()
            .unwrap()
            .remove("last_status_store");

        match parse(body).unwrap_err() {
            FetchError::Malformed { reason, .. } => {
                assert_eq!(reason, "missing last_status_store");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn out_of_range_humidity_is_malformed() {
        let mut body = salon_body();
        body["body"]["devices"][0]["dashboard_data"]["Humidity"] = 140.into();

        assert!(matches!(parse(body), Err(FetchError::Malformed { .. })));
    }

    #[test]
    fn negative_co2_fails_to_decode() {
        let mut body = salon_body();
        body["body"]["devices"][0]["dashboard_data"]["CO2"] = (-5).into();

        assert!(matches!(parse(body), Err(FetchError::Decode(_))));
    }

    #[test]
    fn missing_body_fails_to_decode() {
        assert!(matches!(
            parse(serde_json::json!({ "status": "ok" })),
            Err(FetchError::Decode(_))
        ));
    }

    #[test]
    fn endpoint_appends_to_api_base() {
        let config = NetatmoConfig::new("id", "secret", "https://example.com/cb".parse().unwrap());
        assert_eq!(
            StationClient::new(&config).unwrap().endpoint(),
            "https://api.netatmo.com/api/getstationsdata"
        );
    }

    #[tokio::test]
    async fn fetch_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/getstationsdata"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(salon_body()))
            .expect(1)
            .mount(&server)
            .await;

        let readings = client_for(&server).fetch("token-1").await.unwrap();
        assert_eq!(readings, vec![salon_reading()]);
    }

    #[tokio::test]
    async fn fetch_twice_yields_equal_lists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/getstationsdata"))
            .respond_with(ResponseTemplate::new(200).set_body_json(salon_body()))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let first = client.fetch("token").await.unwrap();
        let second = client.fetch("token").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn fetch_non_success_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/getstationsdata"))
            .respond_with(ResponseTemplate::new(403).set_body_string("invalid access token"))
            .mount(&server)
            .await;

        match client_for(&server).fetch("bad").await.unwrap_err() {
            FetchError::Rejected { status, detail } => {
                assert_eq!(status, 403);
                assert_eq!(detail, "invalid access token");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn new_applies_configured_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/getstationsdata"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(salon_body())
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let config = NetatmoConfig::new("id", "secret", "https://example.com/cb".parse().unwrap())
            .with_api_url(format!("{}/api", server.uri()).parse().unwrap())
            .with_http_timeout(Duration::from_millis(100));

        match StationClient::new(&config).unwrap().fetch("token").await.unwrap_err() {
            FetchError::Http(e) => assert!(e.is_timeout()),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
