//! HTTP client for the aviationweather.gov data API
//!
//! Transient failures (timeouts, connection resets, HTTP 429/5xx) are retried
//! with exponential backoff by the retry middleware before a fetch is given up.

use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use tracing::{debug, instrument, warn};

use super::{MetarRecord, MetarSource, parse_response};
use crate::config::FetchConfig;

/// METAR source backed by `{api_base}/api/data/metar`
pub struct AviationWeatherClient {
    client: ClientWithMiddleware,
    endpoint: Url,
    chunk_size: usize,
}

impl AviationWeatherClient {
    /// Create a new client from the fetch configuration
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .with_context(|| "Failed to create HTTP client")?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        let endpoint = Url::parse(&format!("{}/api/data/metar", config.api_base))
            .with_context(|| format!("Invalid weather API base URL: {}", config.api_base))?;

        Ok(Self {
            client,
            endpoint,
            chunk_size: config.chunk_size.max(1),
        })
    }

    /// Request URL for one chunk of station ids
    pub fn chunk_url(&self, stations: &[String], lookback_hours: u32) -> Result<Url> {
        let ids = stations.join(",");
        let hours = lookback_hours.to_string();
        Url::parse_with_params(
            self.endpoint.as_str(),
            &[("ids", ids.as_str()), ("hours", hours.as_str()), ("format", "json")],
        )
        .with_context(|| "Failed to build METAR request URL")
    }

    async fn fetch_chunk(&self, stations: &[String], lookback_hours: u32) -> Result<Vec<MetarRecord>> {
        let url = self.chunk_url(stations, lookback_hours)?;
        debug!("METAR API request URL: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| "METAR request failed")?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }

        let response = response
            .error_for_status()
            .with_context(|| "METAR API returned an error status")?;
        let body = response
            .text()
            .await
            .with_context(|| "Failed to read METAR response body")?;

        Ok(parse_response(&body)?)
    }
}

#[async_trait]
impl MetarSource for AviationWeatherClient {
    #[instrument(name = "fetch_metars", skip(self, stations), fields(stations = stations.len()))]
    async fn fetch(&self, stations: &[String], lookback_hours: u32) -> Result<Vec<MetarRecord>> {
        let start_time = Instant::now();

        let mut ids: Vec<String> = stations
            .iter()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        ids.sort();
        ids.dedup();

        let mut records = Vec::new();
        for chunk in ids.chunks(self.chunk_size) {
            records.extend(self.fetch_chunk(chunk, lookback_hours).await?);
        }

        let total_duration = start_time.elapsed();
        debug!(
            "Retrieved {} METAR records in {:.3}s",
            records.len(),
            total_duration.as_secs_f64()
        );
        if total_duration.as_secs() > 5 {
            warn!("Slow METAR API response: {:.3}s", total_duration.as_secs_f64());
        }

        Ok(records)
    }
}
