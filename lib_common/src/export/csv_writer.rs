//! # CSV Export
//!
//! Serializes business records to CSV in a fixed column order. The output
//! path is built from the configured filename pattern by substituting the
//! request parameters; an explicit path from the command line bypasses the
//! pattern entirely.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::configs::config_app::{OutputSection, WriteMode};
use crate::statistics::camcom::processor::BusinessRecord;
use crate::statistics::camcom::provinces;

/// Column order of the output file. Fixed regardless of input ordering.
pub const CSV_HEADER: [&str; 7] = [
    "provincia",
    "anno",
    "trimestre",
    "settore_ateco",
    "forma_giuridica",
    "num_imprese_attive",
    "variazione_annuale",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),
}

/// Writes extraction results under the configured output directory.
pub struct CsvExporter {
    directory: PathBuf,
    pattern: String,
    mode: WriteMode,
}

impl CsvExporter {
    pub fn new(output: &OutputSection) -> Self {
        Self {
            directory: output.csv_directory.clone(),
            pattern: output.filename_pattern.clone(),
            mode: output.write_mode,
        }
    }

    /// Builds the output path from the filename pattern, substituting
    /// `{provincia}` (normalized), `{inizio}` and `{fine}`.
    pub fn resolve_path(&self, provincia: &str, inizio: &str, fine: &str) -> PathBuf {
        let filename = self
            .pattern
            .replace("{provincia}", &provinces::normalize_name(provincia))
            .replace("{inizio}", inizio)
            .replace("{fine}", fine);
        self.directory.join(filename)
    }

    /// Writes `records` to `path` honoring the configured write mode.
    ///
    /// Overwrite mode always emits the header; append mode emits it only
    /// when the file is empty or absent, so repeated runs stack rows under
    /// a single header.
    pub fn write(&self, path: &Path, records: &[BusinessRecord]) -> Result<(), ExportError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let (file, needs_header) = match self.mode {
            WriteMode::Overwrite => (File::create(path)?, true),
            WriteMode::Append => {
                let existing = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                (file, existing == 0)
            }
        };

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            writer.write_record(CSV_HEADER)?;
        }
        for record in records {
            writer.write_record(render(record))?;
        }
        writer.flush()?;

        info!(
            path = %path.display(),
            rows = records.len(),
            mode = %self.mode,
            "CSV written"
        );
        Ok(())
    }
}

/// One CSV row in header order. The variation column is empty when the
/// value is undefined, and carries two decimals otherwise.
fn render(record: &BusinessRecord) -> [String; 7] {
    [
        record.provincia.clone(),
        record.anno.to_string(),
        record.trimestre.to_string(),
        record.settore_ateco.clone(),
        record.forma_giuridica.clone(),
        record.num_imprese_attive.to_string(),
        record
            .variazione_annuale
            .map(|v| format!("{v:.2}"))
            .unwrap_or_default(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_section(dir: &Path, mode: WriteMode) -> OutputSection {
        OutputSection {
            csv_directory: dir.to_path_buf(),
            raw_directory: dir.join("raw"),
            cache_directory: dir.join("cache"),
            filename_pattern: "{provincia}_{inizio}_{fine}.csv".to_string(),
            write_mode: mode,
        }
    }

    fn sample_records() -> Vec<BusinessRecord> {
        vec![
            BusinessRecord {
                provincia: "Venezia".to_string(),
                anno: 2020,
                trimestre: 3,
                settore_ateco: "C".to_string(),
                forma_giuridica: "SRL".to_string(),
                num_imprese_attive: 1000,
                variazione_annuale: None,
            },
            BusinessRecord {
                provincia: "Venezia".to_string(),
                anno: 2021,
                trimestre: 3,
                settore_ateco: "C".to_string(),
                forma_giuridica: "SRL".to_string(),
                num_imprese_attive: 1100,
                variazione_annuale: Some(10.0),
            },
        ]
    }

    #[test]
    fn header_and_column_order_are_fixed() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::new(&output_section(dir.path(), WriteMode::Overwrite));
        let path = dir.path().join("out.csv");
        exporter.write(&path, &sample_records()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "provincia,anno,trimestre,settore_ateco,forma_giuridica,num_imprese_attive,variazione_annuale"
        );
        assert_eq!(lines.next().unwrap(), "Venezia,2020,3,C,SRL,1000,");
        assert_eq!(lines.next().unwrap(), "Venezia,2021,3,C,SRL,1100,10.00");
    }

    #[test]
    fn filename_pattern_substitutes_request_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::new(&output_section(dir.path(), WriteMode::Overwrite));
        let path = exporter.resolve_path("Venezia", "2009-03-31", "2025-09-30");
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "venezia_2009-03-31_2025-09-30.csv"
        );
    }

    #[test]
    fn append_mode_keeps_a_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::new(&output_section(dir.path(), WriteMode::Append));
        let path = dir.path().join("out.csv");
        exporter.write(&path, &sample_records()).unwrap();
        exporter.write(&path, &sample_records()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let headers = content
            .lines()
            .filter(|l| l.starts_with("provincia,"))
            .count();
        assert_eq!(headers, 1);
        assert_eq!(content.lines().count(), 5);
    }

    #[test]
    fn overwrite_mode_replaces_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::new(&output_section(dir.path(), WriteMode::Overwrite));
        let path = dir.path().join("out.csv");
        exporter.write(&path, &sample_records()).unwrap();
        exporter.write(&path, &sample_records()[..1].to_vec()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
