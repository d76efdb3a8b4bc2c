//! # Dataset Processor
//!
//! Turns a validated JSON-stat dataset into flat business records: one row
//! per (provincia, anno, trimestre, settore, forma giuridica) tuple, with
//! the year-over-year variation computed against the same tuple one year
//! earlier.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::configs::config_app::ExtractionSection;
use crate::statistics::camcom::jsonstat::{JsonStatDataset, JsonStatError};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("cannot identify the {role} dimension among {available:?}")]
    RoleNotFound {
        role: &'static str,
        available: Vec<String>,
    },

    #[error("unrecognized time period code `{0}`")]
    BadPeriod(String),

    #[error(transparent)]
    JsonStat(#[from] JsonStatError),
}

/// One output row. Field names match the CSV column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRecord {
    pub provincia: String,
    pub anno: i32,
    /// Calendar quarter, 1..=4.
    pub trimestre: u8,
    pub settore_ateco: String,
    pub forma_giuridica: String,
    pub num_imprese_attive: i64,
    /// Percentage variation against the same tuple one year earlier.
    /// `None` when there is no prior-year counterpart (or its count is
    /// zero, which leaves the percentage undefined).
    pub variazione_annuale: Option<f64>,
}

/// Which dataset dimension plays which role in the flattening.
#[derive(Debug, Clone)]
pub struct DimensionRoles {
    pub time: String,
    pub sector: String,
    pub legal_form: String,
}

const TIME_CANDIDATES: &[&str] = &["tempo", "periodo", "time", "anno"];
const SECTOR_CANDIDATES: &[&str] = &["settore_ateco", "settore", "ateco"];
const LEGAL_FORM_CANDIDATES: &[&str] = &["forma_giuridica", "forma", "natura_giuridica"];

impl DimensionRoles {
    /// Maps the dataset's dimension ids onto the three roles the pipeline
    /// needs. Configuration overrides win; otherwise the conventional ids
    /// are matched case-insensitively.
    pub fn detect(
        dataset: &JsonStatDataset,
        extraction: &ExtractionSection,
    ) -> Result<Self, ProcessError> {
        let time = Self::pick(dataset, extraction.time_dimension.as_deref(), TIME_CANDIDATES, "time")?;
        let sector = Self::pick(
            dataset,
            extraction.sector_dimension.as_deref(),
            SECTOR_CANDIDATES,
            "sector",
        )?;
        let legal_form = Self::pick(
            dataset,
            extraction.legal_form_dimension.as_deref(),
            LEGAL_FORM_CANDIDATES,
            "legal form",
        )?;
        Ok(Self {
            time,
            sector,
            legal_form,
        })
    }

    fn pick(
        dataset: &JsonStatDataset,
        override_name: Option<&str>,
        candidates: &[&str],
        role: &'static str,
    ) -> Result<String, ProcessError> {
        if let Some(name) = override_name {
            if dataset.dimension_position(name).is_some() {
                return Ok(name.to_string());
            }
        }
        for id in &dataset.id {
            if candidates.iter().any(|c| id.eq_ignore_ascii_case(c)) {
                return Ok(id.clone());
            }
        }
        Err(ProcessError::RoleNotFound {
            role,
            available: dataset.id.clone(),
        })
    }
}

/// Parses a time category code into (anno, trimestre).
///
/// `YYYY-MM-DD` and `YYYY-MM` map the month onto the calendar quarter;
/// a bare `YYYY` means the year-end snapshot (trimestre 4).
pub fn parse_periodo(code: &str) -> Result<(i32, u8), ProcessError> {
    let bad = || ProcessError::BadPeriod(code.to_string());

    let mut parts = code.splitn(3, '-');
    let year_part = parts.next().ok_or_else(bad)?;
    if year_part.len() != 4 {
        return Err(bad());
    }
    let anno: i32 = year_part.parse().map_err(|_| bad())?;

    let trimestre = match parts.next() {
        None => 4,
        Some(month_part) => {
            let month: u8 = month_part.parse().map_err(|_| bad())?;
            if !(1..=12).contains(&month) {
                return Err(bad());
            }
            (month + 2) / 3
        }
    };

    Ok((anno, trimestre))
}

/// Flattens `dataset` into records for `provincia`, skipping cells without
/// a value. Variation is left unset; it is computed over the merged row set
/// once every request window has been processed.
pub fn build_records(
    provincia: &str,
    dataset: &JsonStatDataset,
    extraction: &ExtractionSection,
) -> Result<Vec<BusinessRecord>, ProcessError> {
    let roles = DimensionRoles::detect(dataset, extraction)?;
    let time_pos = dataset.dimension_position(&roles.time).expect("role was detected");
    let sector_pos = dataset.dimension_position(&roles.sector).expect("role was detected");
    let form_pos = dataset
        .dimension_position(&roles.legal_form)
        .expect("role was detected");

    let mut records = Vec::new();
    for obs in dataset.observations()? {
        let Some(value) = obs.value else {
            continue;
        };
        let (anno, trimestre) = parse_periodo(&obs.categories[time_pos])?;
        records.push(BusinessRecord {
            provincia: provincia.to_string(),
            anno,
            trimestre,
            settore_ateco: obs.categories[sector_pos].clone(),
            forma_giuridica: obs.categories[form_pos].clone(),
            num_imprese_attive: value.round() as i64,
            variazione_annuale: None,
        });
    }
    Ok(records)
}

/// Fills `variazione_annuale` for every record that has a counterpart for
/// the same (trimestre, settore, forma giuridica) tuple one anno earlier:
/// `(curr - prev) / prev * 100`.
pub fn apply_variation(records: &mut [BusinessRecord]) {
    let mut counts: HashMap<(i32, u8, String, String), i64> = HashMap::new();
    for record in records.iter() {
        counts.insert(
            (
                record.anno,
                record.trimestre,
                record.settore_ateco.clone(),
                record.forma_giuridica.clone(),
            ),
            record.num_imprese_attive,
        );
    }

    for record in records.iter_mut() {
        let prior = counts.get(&(
            record.anno - 1,
            record.trimestre,
            record.settore_ateco.clone(),
            record.forma_giuridica.clone(),
        ));
        record.variazione_annuale = match prior {
            Some(&prev) if prev != 0 => {
                Some((record.num_imprese_attive - prev) as f64 / prev as f64 * 100.0)
            }
            _ => None,
        };
    }
}

/// Deterministic output order: anno, trimestre, then settore and forma.
pub fn sort_records(records: &mut [BusinessRecord]) {
    records.sort_by(|a, b| {
        a.anno
            .cmp(&b.anno)
            .then(a.trimestre.cmp(&b.trimestre))
            .then_with(|| a.settore_ateco.cmp(&b.settore_ateco))
            .then_with(|| a.forma_giuridica.cmp(&b.forma_giuridica))
    });
}

/// Aggregate summary of an extraction, printed by the CLI on request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsSummary {
    pub totale_record: usize,
    /// First and last anno covered by the rows.
    pub anni: Option<(i32, i32)>,
    pub settori: usize,
    pub totale_imprese: i64,
    pub media_imprese: Option<i64>,
    pub min_imprese: Option<i64>,
    pub max_imprese: Option<i64>,
}

impl StatisticsSummary {
    pub fn from_records(records: &[BusinessRecord]) -> Self {
        let anni = records
            .iter()
            .map(|r| r.anno)
            .min()
            .zip(records.iter().map(|r| r.anno).max());
        let settori: BTreeSet<&str> = records.iter().map(|r| r.settore_ateco.as_str()).collect();
        let totale: i64 = records.iter().map(|r| r.num_imprese_attive).sum();

        Self {
            totale_record: records.len(),
            anni,
            settori: settori.len(),
            totale_imprese: totale,
            media_imprese: (!records.is_empty()).then(|| totale / records.len() as i64),
            min_imprese: records.iter().map(|r| r.num_imprese_attive).min(),
            max_imprese: records.iter().map(|r| r.num_imprese_attive).max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(anno: i32, trimestre: u8, settore: &str, forma: &str, count: i64) -> BusinessRecord {
        BusinessRecord {
            provincia: "Venezia".to_string(),
            anno,
            trimestre,
            settore_ateco: settore.to_string(),
            forma_giuridica: forma.to_string(),
            num_imprese_attive: count,
            variazione_annuale: None,
        }
    }

    #[test]
    fn periodo_codes_map_to_quarters() {
        assert_eq!(parse_periodo("2020-03-31").unwrap(), (2020, 1));
        assert_eq!(parse_periodo("2020-06-30").unwrap(), (2020, 2));
        assert_eq!(parse_periodo("2025-09-30").unwrap(), (2025, 3));
        assert_eq!(parse_periodo("2024-12").unwrap(), (2024, 4));
        assert_eq!(parse_periodo("2019").unwrap(), (2019, 4));
    }

    #[test]
    fn bad_periodo_codes_are_rejected()  {
        assert!(parse_periodo("III trimestre").is_err());
        assert!(parse_periodo("20-03-31").is_err());
        assert!(parse_periodo("2020-13").is_err());
    }

    #[test]
    fn variation_is_relative_to_prior_year_same_tuple() {
        let mut records = vec![
            record(2020, 3, "C", "SRL", 1000),
            record(2021, 3, "C", "SRL", 1100),
            record(2021, 3, "F", "SRL", 500),
        ];
        apply_variation(&mut records);

        // 2020 has no prior year in the set.
        assert_eq!(records[0].variazione_annuale, None);
        // (1100 - 1000) / 1000 * 100 = 10%
        assert_eq!(records[1].variazione_annuale, Some(10.0));
        // Different sector, no counterpart.
        assert_eq!(records[2].variazione_annuale, None);
    }

    #[test]
    fn zero_prior_count_leaves_variation_undefined() {
        let mut records = vec![
            record(2020, 1, "C", "SRL", 0),
            record(2021, 1, "C", "SRL", 10),
        ];
        apply_variation(&mut records);
        assert_eq!(records[1].variazione_annuale, None);
    }

    #[test]
    fn records_sort_by_anno_then_trimestre() {
        let mut records = vec![
            record(2021, 1, "C", "SRL", 1),
            record(2020, 4, "C", "SRL", 1),
            record(2020, 1, "F", "SRL", 1),
            record(2020, 1, "C", "SRL", 1),
        ];
        sort_records(&mut records);
        let order: Vec<(i32, u8, &str)> = records
            .iter()
            .map(|r| (r.anno, r.trimestre, r.settore_ateco.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![(2020, 1, "C"), (2020, 1, "F"), (2020, 4, "C"), (2021, 1, "C")]
        );
    }

    #[test]
    fn builds_records_from_dataset_and_skips_missing_cells() {
        let payload = json!({
            "class": "dataset",
            "id": ["tempo", "settore_ateco", "forma_giuridica"],
            "size": [2, 1, 2],
            "dimension": {
                "tempo": {"category": {"index": ["2020-09-30", "2021-09-30"]}},
                "settore_ateco": {"category": {"index": ["C"]}},
                "forma_giuridica": {"category": {"index": ["SRL", "DI"]}}
            },
            "value": [100.0, 40.0, 110.0, null]
        })
        .to_string()
        .into_bytes();
        let dataset = JsonStatDataset::parse(&payload).unwrap();

        let extraction: ExtractionSection = serde_json::from_value(json!({})).unwrap();
        let records = build_records("Venezia", &dataset, &extraction).unwrap();

        // The null cell (2021, C, DI) is skipped.
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].anno, 2020);
        assert_eq!(records[0].trimestre, 3);
        assert_eq!(records[0].forma_giuridica, "SRL");
        assert_eq!(records[0].num_imprese_attive, 100);
    }

    #[test]
    fn role_detection_honors_overrides_and_fails_loudly() {
        let payload = json!({
            "class": "dataset",
            "id": ["periodo_riferimento", "settore", "forma_giuridica"],
            "size": [1, 1, 1],
            "dimension": {
                "periodo_riferimento": {"category": {"index": ["2020"]}},
                "settore": {"category": {"index": ["C"]}},
                "forma_giuridica": {"category": {"index": ["SRL"]}}
            },
            "value": [1.0]
        })
        .to_string()
        .into_bytes();
        let dataset = JsonStatDataset::parse(&payload).unwrap();

        // Without an override the unconventional time id is not found.
        let plain: ExtractionSection = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(
            DimensionRoles::detect(&dataset, &plain),
            Err(ProcessError::RoleNotFound { role: "time", .. })
        ));

        let with_override: ExtractionSection =
            serde_json::from_value(json!({"time_dimension": "periodo_riferimento"})).unwrap();
        let roles = DimensionRoles::detect(&dataset, &with_override).unwrap();
        assert_eq!(roles.time, "periodo_riferimento");
        assert_eq!(roles.sector, "settore");
    }

    #[test]
    fn summary_aggregates_counts() {
        let records = vec![
            record(2020, 1, "C", "SRL", 1000),
            record(2021, 1, "C", "SRL", 1050),
            record(2022, 1, "F", "SRL", 1100),
        ];
        let stats = StatisticsSummary::from_records(&records);
        assert_eq!(stats.totale_record, 3);
        assert_eq!(stats.anni, Some((2020, 2022)));
        assert_eq!(stats.settori, 2);
        assert_eq!(stats.totale_imprese, 3150);
        assert_eq!(stats.media_imprese, Some(1050));
        assert_eq!(stats.min_imprese, Some(1000));
        assert_eq!(stats.max_imprese, Some(1100));
    }
}
