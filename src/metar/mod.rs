//! METAR records as returned by the aviation weather API
//!
//! The API has shipped several envelopes over time (GeoJSON, `data`/`metar`
//! wrappers, bare arrays) and several names for the same field. Records are
//! deserialized leniently and converted into classified [`Observation`]s.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::classifier::{self, Ceiling};
use crate::models::Observation;
use crate::{MetarMapError, Result};

pub mod aviation_weather;

pub use aviation_weather::AviationWeatherClient;

/// Anything that can produce METAR records for a set of stations
#[async_trait]
pub trait MetarSource: Send + Sync {
    /// Fetch the records reported within the last `lookback_hours` for `stations`.
    async fn fetch(&self, stations: &[String], lookback_hours: u32) -> anyhow::Result<Vec<MetarRecord>>;
}

/// One cloud layer
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudLayer {
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub base: Option<Value>,
}

/// Raw METAR record, only the fields the map consumes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetarRecord {
    #[serde(rename = "icaoId", alias = "station", alias = "station_id", default)]
    pub icao_id: Option<String>,
    #[serde(rename = "reportTime", default)]
    pub report_time: Option<String>,
    #[serde(rename = "obsTime", default)]
    pub obs_time: Option<Value>,
    #[serde(rename = "wspd", alias = "windSpeedKt", default)]
    pub wind_speed: Option<Value>,
    #[serde(
        rename = "wgst",
        alias = "gust",
        alias = "gustKt",
        alias = "windGustKt",
        alias = "wind_gust_kt",
        alias = "gust_kts",
        default
    )]
    pub wind_gust: Option<Value>,
    #[serde(rename = "visib", alias = "visibility_statute_mi", default)]
    pub visibility: Option<Value>,
    #[serde(default)]
    pub clouds: Option<Vec<CloudLayer>>,
    #[serde(rename = "vertVis", default)]
    pub vertical_visibility: Option<Value>,
    #[serde(rename = "fltCat", alias = "flight_category", default)]
    pub flight_category: Option<String>,
    #[serde(rename = "rawOb", alias = "raw_text", default)]
    pub raw_ob: Option<String>,
}

impl MetarRecord {
    /// Upper-cased station id, `None` when blank
    #[must_use]
    pub fn station(&self) -> Option<String> {
        self.icao_id
            .as_deref()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
    }

    /// Observation time: `reportTime`, then `obsTime`, then `fallback`
    #[must_use]
    pub fn observed_at(&self, fallback: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(report_time) = self.report_time.as_deref() {
            return parse_report_time(report_time).unwrap_or(fallback);
        }
        self.obs_time
            .as_ref()
            .and_then(number)
            .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
            .unwrap_or(fallback)
    }

    /// Thunderstorm or lightning in the report body, ignoring remarks
    #[must_use]
    pub fn has_lightning(&self) -> bool {
        let Some(raw) = self.raw_ob.as_deref() else {
            return false;
        };
        let body = raw.split(" RMK").next().unwrap_or_default();
        (body.contains("LTG") || body.contains(" TS")) && !raw.contains(" TSNO")
    }

    #[must_use]
    pub fn ceiling(&self) -> Option<Ceiling> {
        let layers = self.clouds.as_ref().map(|clouds| {
            clouds
                .iter()
                .map(|layer| (layer.cover.as_str(), layer.base.as_ref().and_then(knots_or_feet)))
                .collect::<Vec<_>>()
        });
        let vertical = self.vertical_visibility.as_ref().and_then(knots_or_feet);
        classifier::ceiling_from_layers(layers, vertical)
    }

    #[must_use]
    pub fn visibility_sm(&self) -> Option<f32> {
        self.visibility.as_ref().and_then(number).map(|v| v as f32)
    }

    /// Classify into an [`Observation`]; `None` for records without a station id.
    #[must_use]
    pub fn to_observation(&self, fetched_at: DateTime<Utc>) -> Option<Observation> {
        let airport = self.station()?;
        let category = classifier::classify_or_reported(
            self.ceiling(),
            self.visibility_sm(),
            self.flight_category.as_deref(),
        );
        Some(Observation {
            airport,
            category,
            wind_kt: self.wind_speed.as_ref().and_then(knots_or_feet).unwrap_or(0),
            gust_kt: self.wind_gust.as_ref().and_then(knots_or_feet).unwrap_or(0),
            lightning: self.has_lightning(),
            observed_at: self.observed_at(fetched_at),
        })
    }
}

/// Extract records from any of the known response envelopes.
pub fn parse_response(body: &str) -> Result<Vec<MetarRecord>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let json: Value = serde_json::from_str(body)
        .map_err(|e| MetarMapError::parse(format!("invalid JSON from weather API: {e}")))?;

    let raw_records: Vec<Value> = match json {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            if map.get("type").and_then(Value::as_str) == Some("FeatureCollection") {
                match map.remove("features") {
                    Some(Value::Array(features)) => features
                        .into_iter()
                        .map(|mut feature| feature.get_mut("properties").map(Value::take).unwrap_or_default())
                        .collect(),
                    _ => Vec::new(),
                }
            } else {
                match map.remove("data").or_else(|| map.remove("metar")) {
                    Some(Value::Array(items)) => items,
                    Some(Value::Null) | None => Vec::new(),
                    Some(other) => {
                        return Err(MetarMapError::parse(format!(
                            "unexpected records container: {other}"
                        )));
                    }
                }
            }
        }
        other => {
            return Err(MetarMapError::parse(format!(
                "unexpected weather API response: {other}"
            )));
        }
    };

    let mut records = Vec::with_capacity(raw_records.len());
    for raw in raw_records {
        match serde_json::from_value::<MetarRecord>(raw) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping unreadable METAR record: {}", e),
        }
    }
    Ok(records)
}

/// Latest observation per station
#[must_use]
pub fn latest_by_station(records: &[MetarRecord], fetched_at: DateTime<Utc>) -> HashMap<String, Observation> {
    let mut latest: HashMap<String, Observation> = HashMap::new();
    for record in records {
        let Some(observation) = record.to_observation(fetched_at) else {
            debug!("Record without station id ignored");
            continue;
        };
        match latest.get(&observation.airport) {
            Some(existing) if existing.observed_at >= observation.observed_at => {}
            _ => {
                latest.insert(observation.airport.clone(), observation);
            }
        }
    }
    latest
}

fn parse_report_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    let without_zone = text.trim_end_matches('Z');
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(without_zone, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Numeric value from a number or a string such as `"10+"` or `"+5"`
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.replace('+', "").trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Rounded non-negative integer, as used for knots and feet
fn knots_or_feet(value: &Value) -> Option<u32> {
    number(value).map(|v| v.round().max(0.0).min(f64::from(u32::MAX)) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FlightCategory;
    use rstest::rstest;
    use serde_json::json;

    fn record(value: Value) -> MetarRecord {
        serde_json::from_value(value).unwrap()
    }

    #[rstest]
    #[case(r#"[{"icaoId": "KPDX"}]"#)]
    #[case(r#"{"data": [{"icaoId": "KPDX"}]}"#)]
    #[case(r#"{"metar": [{"station_id": "KPDX"}]}"#)]
    #[case(r#"{"type": "FeatureCollection", "features": [{"properties": {"station": "KPDX"}}]}"#)]
    fn test_parse_response_envelopes(#[case] body: &str) {
        let records = parse_response(body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].station().as_deref(), Some("KPDX"));
    }

    #[test]
    fn test_parse_response_rejects_garbage() {
        assert!(parse_response("<html>oops</html>").is_err());
        assert!(parse_response("42").is_err());
        assert!(parse_response("").unwrap().is_empty());
        assert!(parse_response(r#"{"data": null}"#).unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_record_is_skipped() {
        let records = parse_response(r#"[{"icaoId": 5}, {"icaoId": "KEUG"}]"#).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_record_to_observation() {
        let rec = record(json!({
            "icaoId": " kxyz ",
            "reportTime": "2025-03-01 12:00:00",
            "wspd": 18,
            "wgst": "27",
            "visib": "10+",
            "clouds": [{"cover": "FEW", "base": 2000}, {"cover": "BKN", "base": 600}],
            "fltCat": "VFR",
            "rawOb": "KXYZ 011200Z 18018G27KT 10SM FEW020 BKN006 12/08 A2992"
        }));
        let obs = rec.to_observation(Utc::now()).unwrap();
        assert_eq!(obs.airport, "KXYZ");
        assert_eq!(obs.category, FlightCategory::Ifr);
        assert_eq!(obs.wind_kt, 18);
        assert_eq!(obs.gust_kt, 27);
        assert!(!obs.lightning);
        assert_eq!(obs.observed_at, Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_lifr_scenario_record() {
        let rec = record(json!({
            "icaoId": "KXYZ",
            "visib": 0.5,
            "clouds": [{"cover": "OVC", "base": 600}]
        }));
        assert_eq!(rec.to_observation(Utc::now()).unwrap().category, FlightCategory::Lifr);
    }

    #[test]
    fn test_category_falls_back_to_reported() {
        let rec = record(json!({"icaoId": "KHIO", "fltCat": "MVFR"}));
        assert_eq!(rec.to_observation(Utc::now()).unwrap().category, FlightCategory::Mvfr);

        let rec = record(json!({"icaoId": "KHIO"}));
        assert_eq!(rec.to_observation(Utc::now()).unwrap().category, FlightCategory::NoData);
    }

    #[rstest]
    #[case("KPDX 011200Z 18010KT 10SM TS BKN040CB 20/15 A2992", true)]
    #[case("KPDX 011200Z 18010KT 10SM VCTS BKN040 20/15 A2992", false)]
    #[case("KPDX 011200Z 18010KT 10SM BKN040 20/15 A2992 RMK LTG DSNT W", false)]
    #[case("KPDX 011200Z 18010KT 10SM BKN040 20/15 A2992 LTG", true)]
    #[case("KPDX 011200Z 18010KT 10SM TS BKN040 20/15 A2992 RMK TSNO", false)]
    fn test_lightning_detection(#[case] raw: &str, #[case] expected: bool) {
        let rec = MetarRecord {
            raw_ob: Some(raw.to_string()),
            ..Default::default()
        };
        assert_eq!(rec.has_lightning(), expected);
    }

    #[test]
    fn test_observed_at_sources() {
        let fallback = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let iso = record(json!({"reportTime": "2025-03-01T12:30:00.000Z"}));
        assert_eq!(iso.observed_at(fallback), Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap());

        let epoch = record(json!({"obsTime": 1_740_830_400}));
        assert_eq!(epoch.observed_at(fallback), Utc.timestamp_opt(1_740_830_400, 0).unwrap());

        let none = record(json!({}));
        assert_eq!(none.observed_at(fallback), fallback);
    }

    #[test]
    fn test_latest_by_station() {
        let records = vec![
            record(json!({"icaoId": "KPDX", "obsTime": 1000, "fltCat": "IFR"})),
            record(json!({"icaoId": "KPDX", "obsTime": 2000, "fltCat": "VFR"})),
            record(json!({"icaoId": "KPDX", "obsTime": 1500, "fltCat": "LIFR"})),
            record(json!({"icaoId": "KEUG", "obsTime": 1200, "fltCat": "MVFR"})),
            record(json!({"fltCat": "VFR"})),
        ];
        let latest = latest_by_station(&records, Utc::now());
        assert_eq!(latest.len(), 2);
        assert_eq!(latest["KPDX"].category, FlightCategory::Vfr);
        assert_eq!(latest["KEUG"].category, FlightCategory::Mvfr);
    }
}
