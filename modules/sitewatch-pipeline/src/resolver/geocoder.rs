use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sitewatch_common::config::GeocoderConfig;
use sitewatch_common::{BoundingBox, GeocodeConfidence};
use tracing::{debug, info};

use crate::retry::HttpStatusError;
use crate::traits::{GeocodeHit, GeocodeQuery, Geocoder};

/// Confidence tier from the provider's place type.
pub fn classify(place_type: &str) -> GeocodeConfidence {
    match place_type.to_lowercase().as_str() {
        "house" | "building" | "address" | "house_number" | "office" | "commercial" | "industrial_building" => {
            GeocodeConfidence::Address
        }
        "neighbourhood" | "neighborhood" | "suburb" | "quarter" | "city_district" | "borough" => {
            GeocodeConfidence::Neighborhood
        }
        "city" | "town" | "village" | "hamlet" | "municipality" => GeocodeConfidence::City,
        "county" | "parish" => GeocodeConfidence::County,
        _ => GeocodeConfidence::Area,
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
    #[serde(default, rename = "type")]
    place_type: String,
    #[serde(default)]
    addresstype: Option<String>,
}

impl NominatimPlace {
    fn into_hit(self) -> Option<GeocodeHit> {
        Some(GeocodeHit {
            lat: self.lat.parse().ok()?,
            lng: self.lon.parse().ok()?,
            place_type: self.addresstype.unwrap_or(self.place_type),
            display_name: self.display_name,
        })
    }
}

/// Nominatim-compatible search endpoint, biased to the region's viewbox.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    viewbox: String,
    max_results: u32,
    api_key: Option<String>,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig, bbox: &BoundingBox, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(timeout)
            .build()?;
        info!(base_url = %config.base_url, "Geocoder initialized");
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            viewbox: bbox.viewbox(),
            max_results: config.max_results,
            api_key,
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &GeocodeQuery) -> anyhow::Result<Vec<GeocodeHit>> {
        let q = query.query_string();
        let limit = self.max_results.to_string();
        let mut params = vec![
            ("q", q.as_str()),
            ("format", "jsonv2"),
            ("limit", limit.as_str()),
            ("viewbox", self.viewbox.as_str()),
            ("bounded", "1"),
        ];
        if let Some(key) = self.api_key.as_deref() {
            params.push(("key", key));
        }

        debug!(query = %q, "Geocoding");
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpStatusError {
                service: "geocoder",
                status: status.as_u16(),
            }
            .into());
        }

        let places: Vec<NominatimPlace> = response.json().await?;
        Ok(places.into_iter().filter_map(NominatimPlace::into_hit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_types_map_to_tiers() {
        assert_eq!(classify("house"), GeocodeConfidence::Address);
        assert_eq!(classify("suburb"), GeocodeConfidence::Neighborhood);
        assert_eq!(classify("Town"), GeocodeConfidence::City);
        assert_eq!(classify("county"), GeocodeConfidence::County);
        assert_eq!(classify("state"), GeocodeConfidence::Area);
        assert_eq!(classify("road"), GeocodeConfidence::Area);
    }

    #[test]
    fn nominatim_rows_parse() {
        let body = r#"[
            {"lat": "30.5708", "lon": "-97.4094", "display_name": "Taylor, Williamson County, Texas, United States",
             "category": "boundary", "type": "administrative", "addresstype": "city", "place_rank": 16},
            {"lat": "bad", "lon": "-97.0", "display_name": "x", "type": "city"}
        ]"#;
        let places: Vec<NominatimPlace> = serde_json::from_str(body).unwrap();
        let hits: Vec<GeocodeHit> = places.into_iter().filter_map(NominatimPlace::into_hit).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].place_type, "city");
        assert_eq!(classify(&hits[0].place_type), GeocodeConfidence::City);
    }
}
