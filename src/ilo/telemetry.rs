//! Telemetry fetcher for the iLO thermal endpoint.
//!
//! One read-only HTTP query per call against the Redfish-style API,
//! parsed into plain fan/temperature maps. Entries the device did not
//! report are simply absent from the maps; nothing is defaulted.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;

use crate::{config::DeviceCfg, error::TelemetryError};

/// One successful reading of the thermal endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThermalSnapshot {
    /// Fan speed per internal fan name (percent, as reported).
    pub fans: HashMap<String, f64>,
    /// Temperature per internal sensor name (°C).
    pub temperatures: HashMap<String, f64>,
}

/// Read-only source of fan and temperature telemetry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch(&self) -> Result<ThermalSnapshot, TelemetryError>;
}

/// HTTP client for the iLO thermal endpoint.
pub struct RedfishClient {
    http: reqwest::Client,
    url: String,
    username: String,
    password: String,
}

impl RedfishClient {
    /// Builds the client. TLS verification follows `device.verify_tls`;
    /// it is off by default because iLO boards ship self-signed
    /// certificates. `timeout` bounds the whole request.
    pub fn new(device: &DeviceCfg, timeout: Duration) -> Result<Self, TelemetryError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!device.verify_tls)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            url: format!("https://{}/redfish/v1/chassis/1/Thermal/", device.host),
            username: device.username.clone(),
            password: device.password.clone(),
        })
    }
}

#[async_trait]
impl TelemetrySource for RedfishClient {
    async fn fetch(&self) -> Result<ThermalSnapshot, TelemetryError> {
        let response = self
            .http
            .get(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TelemetryError::Http {
                status: status.as_u16(),
                body,
            });
        }

        parse_thermal(&body)
    }
}

#[derive(Debug, Deserialize)]
struct ThermalDocument {
    #[serde(rename = "Fans", default)]
    fans: Vec<FanEntry>,
    #[serde(rename = "Temperatures", default)]
    temperatures: Vec<TemperatureEntry>,
}

#[derive(Debug, Deserialize)]
struct FanEntry {
    #[serde(rename = "FanName")]
    fan_name: String,
    #[serde(rename = "CurrentReading")]
    current_reading: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TemperatureEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "ReadingCelsius")]
    reading_celsius: Option<f64>,
}

/// Parses the thermal JSON document into readings maps. Fans and sensors
/// without a reading are dropped, not zero-filled.
fn parse_thermal(body: &str) -> Result<ThermalSnapshot, TelemetryError> {
    let document: ThermalDocument = serde_json::from_str(body)?;

    let fans = document
        .fans
        .into_iter()
        .filter_map(|fan| fan.current_reading.map(|reading| (fan.fan_name, reading)))
        .collect();

    let temperatures = document
        .temperatures
        .into_iter()
        .filter_map(|temp| temp.reading_celsius.map(|reading| (temp.name, reading)))
        .collect();

    Ok(ThermalSnapshot { fans, temperatures })
}
