//! Flight category and per-airport observation model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Flight category, in decreasing order of flight visibility conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlightCategory {
    Vfr,
    Mvfr,
    Ifr,
    Lifr,
    NoData,
}

impl FlightCategory {
    /// Parse a category code as reported by the weather API (`"MVFR"`, ...).
    /// Unknown codes yield `None`.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "VFR" => Some(Self::Vfr),
            "MVFR" => Some(Self::Mvfr),
            "IFR" => Some(Self::Ifr),
            "LIFR" => Some(Self::Lifr),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vfr => "VFR",
            Self::Mvfr => "MVFR",
            Self::Ifr => "IFR",
            Self::Lifr => "LIFR",
            Self::NoData => "NODATA",
        }
    }
}

impl fmt::Display for FlightCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified observation for one airport. Replaced wholesale on every fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// ICAO station identifier, upper case
    pub airport: String,
    /// Classified flight category
    pub category: FlightCategory,
    /// Steady wind in knots
    pub wind_kt: u32,
    /// Gust speed in knots (0 when no gusts were reported)
    pub gust_kt: u32,
    /// Lightning or thunderstorm reported in the METAR body
    pub lightning: bool,
    /// Observation time from the report
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    /// Strongest of steady wind and gusts
    #[must_use]
    pub fn peak_wind_kt(&self) -> u32 {
        self.wind_kt.max(self.gust_kt)
    }

    /// Format wind information
    #[must_use]
    pub fn format_wind(&self) -> String {
        if self.gust_kt > 0 {
            format!("{}G{}KT", self.wind_kt, self.gust_kt)
        } else {
            format!("{}KT", self.wind_kt)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_codes() {
        assert_eq!(FlightCategory::from_code("vfr"), Some(FlightCategory::Vfr));
        assert_eq!(FlightCategory::from_code(" LIFR "), Some(FlightCategory::Lifr));
        assert_eq!(FlightCategory::from_code(""), None);
        assert_eq!(FlightCategory::from_code("UNKN"), None);
        assert_eq!(FlightCategory::NoData.to_string(), "NODATA");
    }

    #[test]
    fn test_peak_wind_and_format() {
        let obs = Observation {
            airport: "KPDX".to_string(),
            category: FlightCategory::Vfr,
            wind_kt: 12,
            gust_kt: 28,
            lightning: false,
            observed_at: Utc::now(),
        };
        assert_eq!(obs.peak_wind_kt(), 28);
        assert_eq!(obs.format_wind(), "12G28KT");
    }
}
