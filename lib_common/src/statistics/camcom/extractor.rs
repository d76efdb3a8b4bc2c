//! # Extraction Pipeline
//!
//! Orchestrates one extraction run end to end: configuration → cache
//! lookup → (on miss) API fetch → cache store → flatten/transform → CSV.
//! Execution is strictly sequential; one request window is in flight at a
//! time and retries happen inside the HTTP client.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::configs::config_app::{AppConfig, ConfigError};
use crate::export::csv_writer::{CsvExporter, ExportError};
use crate::statistics::camcom::apicall::{ApiCall, FetchError, RequestParams};
use crate::statistics::camcom::jsonstat::{JsonStatDataset, JsonStatError};
use crate::statistics::camcom::processor::{self, BusinessRecord, DimensionRoles, ProcessError};
use crate::storage::cache_fs::{CacheError, CacheHandler};

/// Oldest year the portal publishes data for. Ranges reaching further back
/// are rejected before any network activity.
const MIN_YEAR: i32 = 2000;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unknown province `{0}`")]
    UnknownProvince(String),

    #[error("invalid period range {inizio}..{fine}: {reason}")]
    InvalidRange {
        inizio: String,
        fine: String,
        reason: String,
    },

    #[error("no data available for the requested range")]
    NoData,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    JsonStat(#[from] JsonStatError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Outcome of a completed run.
#[derive(Debug)]
pub struct ExtractionReport {
    pub rows_written: usize,
    pub output_path: PathBuf,
    /// How many request windows the period range was split into.
    pub windows: usize,
    /// How many of those windows were served from the cache.
    pub cache_hits: usize,
    pub elapsed: Duration,
    /// The rows as written, for summaries and display.
    pub records: Vec<BusinessRecord>,
}

/// Single-run extraction pipeline.
pub struct Extractor {
    api: ApiCall,
    cache: Option<CacheHandler>,
    exporter: CsvExporter,
    config: AppConfig,
}

impl Extractor {
    /// Builds the pipeline from a validated configuration, creating the
    /// output directory layout on the way.
    pub fn new(config: AppConfig) -> Result<Self, ExtractError> {
        config.ensure_directories()?;

        let api = ApiCall::new(&config.api)?;
        let cache = if config.cache.enabled {
            Some(CacheHandler::new(
                &config.output.cache_directory,
                config.cache.ttl_secs.map(Duration::from_secs),
            )?)
        } else {
            None
        };
        let exporter = CsvExporter::new(&config.output);

        Ok(Self {
            api,
            cache,
            exporter,
            config,
        })
    }

    /// Resolves CLI inputs into request parameters, falling back to the
    /// configured default year range when no explicit periods are given.
    pub fn resolve_params(
        &self,
        provincia: &str,
        inizio: Option<&str>,
        fine: Option<&str>,
        settore: Option<String>,
    ) -> Result<RequestParams, ExtractError> {
        let inizio = match inizio {
            Some(p) => p.to_string(),
            None => format!("{}-01-01", self.config.extraction.default_start_year),
        };
        let fine = match fine {
            Some(p) => p.to_string(),
            None => {
                let year = self
                    .config
                    .extraction
                    .default_end_year
                    .unwrap_or_else(|| Utc::now().year());
                format!("{year}-12-31")
            }
        };

        let params = RequestParams::resolve(provincia, &inizio, &fine, settore)
            .ok_or_else(|| ExtractError::UnknownProvince(provincia.to_string()))?;
        self.validate_range(&params)?;
        Ok(params)
    }

    /// Start ≤ end, both within the years the portal can answer for
    /// (2000 ..= next year).
    fn validate_range(&self, params: &RequestParams) -> Result<(i32, i32), ExtractError> {
        let bad = |reason: String| ExtractError::InvalidRange {
            inizio: params.inizio.clone(),
            fine: params.fine.clone(),
            reason,
        };

        let (start_year, _) = processor::parse_periodo(&params.inizio)
            .map_err(|e| bad(e.to_string()))?;
        let (end_year, _) = processor::parse_periodo(&params.fine).map_err(|e| bad(e.to_string()))?;

        if start_year > end_year {
            return Err(bad("start period is after end period".to_string()));
        }
        let max_year = Utc::now().year() + 1;
        if start_year < MIN_YEAR || end_year > max_year {
            return Err(bad(format!(
                "years must fall within {MIN_YEAR}..={max_year}"
            )));
        }
        Ok((start_year, end_year))
    }

    /// Splits the requested range into windows of `batch_size` years, each
    /// one request/cache unit. The outermost windows keep the caller's
    /// exact period boundaries.
    pub fn split_windows(&self, params: &RequestParams) -> Result<Vec<RequestParams>, ExtractError> {
        let (start_year, end_year) = self.validate_range(params)?;
        let batch = self.config.extraction.batch_size as i32;

        let mut windows = Vec::new();
        let mut year = start_year;
        while year <= end_year {
            let window_end_year = (year + batch - 1).min(end_year);
            let mut window = params.clone();
            if year != start_year {
                window.inizio = format!("{year}-01-01");
            }
            if window_end_year != end_year {
                window.fine = format!("{window_end_year}-12-31");
            }
            windows.push(window);
            year = window_end_year + 1;
        }
        Ok(windows)
    }

    /// Runs the full pipeline for `params`. `output_override` bypasses the
    /// configured filename pattern.
    pub async fn run(
        &self,
        params: &RequestParams,
        output_override: Option<&Path>,
    ) -> Result<ExtractionReport, ExtractError> {
        let started = Instant::now();
        let windows = self.split_windows(params)?;
        info!(
            provincia = %params.provincia,
            inizio = %params.inizio,
            fine = %params.fine,
            windows = windows.len(),
            "extraction started"
        );

        let mut records: Vec<BusinessRecord> = Vec::new();
        let mut cache_hits = 0usize;
        for window in &windows {
            let (payload, from_cache) = self.window_payload(window).await?;
            if from_cache {
                cache_hits += 1;
            }
            let dataset = JsonStatDataset::parse(&payload)?;
            records.extend(processor::build_records(
                &params.provincia,
                &dataset,
                &self.config.extraction,
            )?);
        }

        if let Some(settore) = &params.settore {
            // The API already filters; this keeps the invariant when a
            // cached payload predates the filter.
            records.retain(|r| &r.settore_ateco == settore);
        }
        if records.is_empty() {
            return Err(ExtractError::NoData);
        }

        processor::apply_variation(&mut records);
        processor::sort_records(&mut records);

        let output_path = match output_override {
            Some(path) => path.to_path_buf(),
            None => self
                .exporter
                .resolve_path(&params.provincia, &params.inizio, &params.fine),
        };
        self.exporter.write(&output_path, &records)?;

        let report = ExtractionReport {
            rows_written: records.len(),
            output_path,
            windows: windows.len(),
            cache_hits,
            elapsed: started.elapsed(),
            records,
        };
        info!(
            rows = report.rows_written,
            cache_hits = report.cache_hits,
            elapsed_ms = report.elapsed.as_millis() as u64,
            path = %report.output_path.display(),
            "extraction completed"
        );
        Ok(report)
    }

    /// Lists the time periods the API exposes for the given request,
    /// newest first.
    pub async fn list_periods(&self, params: &RequestParams) -> Result<Vec<String>, ExtractError> {
        let (payload, _) = self.window_payload(params).await?;
        let dataset = JsonStatDataset::parse(&payload)?;
        let roles = DimensionRoles::detect(&dataset, &self.config.extraction)?;
        let mut periods = dataset.category_codes(&roles.time)?;
        periods.sort();
        periods.reverse();
        Ok(periods)
    }

    /// Returns the payload for one request window: from the cache when
    /// possible, otherwise fetched, archived under the raw directory and
    /// stored in the cache.
    async fn window_payload(&self, window: &RequestParams) -> Result<(Vec<u8>, bool), ExtractError> {
        let key = window.cache_key();

        if let Some(cache) = &self.cache {
            if let Some(payload) = cache.get(&key)? {
                info!(key = %key, "serving window from cache");
                return Ok((payload, true));
            }
        }

        let payload = self.api.fetch(window).await?;
        self.store_raw_copy(&key, &payload)?;
        if let Some(cache) = &self.cache {
            cache.put(&key, &payload)?;
        }
        Ok((payload, false))
    }

    /// Archives the payload exactly as fetched, timestamped so repeated
    /// refetches never overwrite each other.
    fn store_raw_copy(&self, key: &str, payload: &[u8]) -> Result<(), ExtractError> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let path = self
            .config
            .output
            .raw_directory
            .join(format!("{key}-{timestamp}.json"));
        if let Err(e) = std::fs::write(&path, payload) {
            warn!(path = %path.display(), error = %e, "raw payload copy failed");
            return Err(ExtractError::Cache(CacheError::Io(e)));
        }
        Ok(())
    }
}
