//! Data loading utilities

use crate::error::{HousingError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Tokens read as missing in delimited files, matching the usual CSV NA set
pub const DEFAULT_NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN", "<NA>",
    "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Data loader for the tabular formats the pipeline accepts
#[derive(Debug, Clone)]
pub struct DataLoader {
    /// Rows used for schema inference; `None` scans the whole file
    infer_schema_length: Option<usize>,
    /// Field separator for delimited files
    separator: u8,
    /// Field values read as null in delimited files
    na_values: Vec<String>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self {
            infer_schema_length: None,
            separator: b',',
            na_values: DEFAULT_NA_VALUES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Limit schema inference to the first `n` rows
    pub fn with_infer_schema_length(mut self, n: usize) -> Self {
        self.infer_schema_length = Some(n);
        self
    }

    /// Set the field separator
    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    /// Replace the tokens read as missing; an empty list keeps only empty fields null
    pub fn with_na_values(mut self, na_values: Vec<String>) -> Self {
        self.na_values = na_values;
        self
    }

    fn csv_options(&self) -> CsvReadOptions {
        let mut parse_opts = CsvParseOptions::default().with_separator(self.separator);
        if !self.na_values.is_empty() {
            let tokens: Vec<PlSmallStr> = self.na_values.iter().map(|s| PlSmallStr::from(s.as_str())).collect();
            parse_opts = parse_opts.with_null_values(Some(NullValues::AllColumns(tokens)));
        }

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length)
            .with_parse_options(parse_opts)
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            HousingError::DataError(format!("failed to open {}: {}", path.display(), e))
        })?;

        self.csv_options()
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| HousingError::DataError(e.to_string()))
    }

    /// Load a Parquet file
    pub fn load_parquet(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let file = File::open(path.as_ref())?;

        ParquetReader::new(file)
            .finish()
            .map_err(|e| HousingError::DataError(e.to_string()))
    }

    /// Load a JSON file
    pub fn load_json(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let file = File::open(path.as_ref())?;

        JsonReader::new(file)
            .finish()
            .map_err(|e| HousingError::DataError(e.to_string()))
    }

    /// Detect file format from extension and load
    pub fn load_auto(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let df = match ext.as_str() {
            "tsv" => self.clone().with_separator(b'\t').load_csv(path)?,
            "parquet" | "pq" => self.load_parquet(path)?,
            "json" | "jsonl" => self.load_json(path)?,
            _ => self.load_csv(path)?,
        };

        tracing::debug!(
            path = %path.display(),
            rows = df.height(),
            cols = df.width(),
            "dataset loaded"
        );
        Ok(df)
    }

    /// Get file info without loading the full data
    pub fn get_file_info(&self, path: impl AsRef<Path>) -> Result<FileInfo> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        let file_size = metadata.len();

        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);

        let (n_rows, columns) = if is_csv {
            let header = self
                .csv_options()
                .with_n_rows(Some(0))
                .try_into_reader_with_file_path(Some(path.to_path_buf()))?
                .finish()?;
            let columns: Vec<String> = header.get_column_names().iter().map(|c| c.to_string()).collect();

            // Rows are counted by parsing one column, so quoted newlines are not rows
            let n_rows = match columns.first() {
                Some(first) => self
                    .csv_options()
                    .with_columns(Some(Arc::from(vec![PlSmallStr::from(first.as_str())])))
                    .try_into_reader_with_file_path(Some(path.to_path_buf()))?
                    .finish()?
                    .height(),
                None => 0,
            };
            (Some(n_rows), Some(columns))
        } else {
            (None, None)
        };

        Ok(FileInfo {
            path: path.display().to_string(),
            file_size,
            n_rows,
            n_cols: columns.as_ref().map(|c| c.len()),
            columns,
        })
    }
}

/// File information
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: String,
    pub file_size: u64,
    pub n_rows: Option<usize>,
    pub n_cols: Option<usize>,
    pub columns: Option<Vec<String>>,
}

/// Save a DataFrame to disk
pub struct DataSaver;

impl DataSaver {
    /// Save to CSV
    pub fn save_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path.as_ref())?;

        CsvWriter::new(&mut file)
            .finish(df)
            .map_err(|e| HousingError::DataError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".csv")
            .tempfile()
            .unwrap();
        writeln!(file, "Price (PHP),Bedrooms,Location").unwrap();
        writeln!(file, "\"₱1,500,000\",2,Cebu").unwrap();
        writeln!(file, "\"₱3,200,000\",3,Davao").unwrap();
        writeln!(file, "\"₱2,750,000\",,Cebu").unwrap();
        file
    }

    #[test]
    fn test_load_csv() {
        let file = create_test_csv();
        let loader = DataLoader::new();

        let df = loader.load_csv(file.path()).unwrap();

        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 3);
        // Currency-formatted prices stay as strings for the cleaner
        assert_eq!(df.column("Price (PHP)").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("Bedrooms").unwrap().null_count(), 1);
    }

    #[test]
    fn test_load_auto_defaults_to_csv() {
        let file = create_test_csv();
        let df = DataLoader::new().load_auto(file.path()).unwrap();
        assert_eq!(df.height(), 3);
    }

    #[test]
    fn test_get_file_info() {
        let file = create_test_csv();
        let info = DataLoader::new().get_file_info(file.path()).unwrap();

        assert_eq!(info.n_rows, Some(3));
        assert_eq!(info.n_cols, Some(3));
        assert_eq!(info.columns.as_ref().unwrap()[0], "Price (PHP)");
    }

    #[test]
    fn test_na_tokens_read_as_null() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Floor_area (sqm),Latitude,Location").unwrap();
        writeln!(file, "n/a,14.55,Makati").unwrap();
        writeln!(file, "80,NA,NULL").unwrap();
        writeln!(file, "120,10.31,Cebu").unwrap();

        let df = DataLoader::new().load_csv(file.path()).unwrap();
        let area = df.column("Floor_area (sqm)").unwrap();
        assert!(crate::preprocessing::is_numeric_dtype(area.dtype()));
        assert_eq!(area.null_count(), 1);
        assert_eq!(df.column("Latitude").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("Latitude").unwrap().null_count(), 1);
        assert_eq!(df.column("Location").unwrap().null_count(), 1);

        // Without NA tokens only empty fields are null
        let raw = DataLoader::new().with_na_values(Vec::new()).load_csv(file.path()).unwrap();
        assert_eq!(raw.column("Latitude").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_file_info_handles_quoted_fields() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "\"Price, PHP\",Description").unwrap();
        writeln!(file, "\"₱1,000\",\"two\nlines\"").unwrap();
        writeln!(file, "\"₱2,000\",plain").unwrap();

        let info = DataLoader::new().get_file_info(file.path()).unwrap();
        assert_eq!(info.n_cols, Some(2));
        assert_eq!(info.n_rows, Some(2));
        assert_eq!(info.columns.unwrap()[0], "Price, PHP");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = DataLoader::new().load_csv("/definitely/not/here.csv");
        assert!(matches!(result, Err(HousingError::DataError(_))));
    }

    #[test]
    fn test_save_csv() {
        let mut df = DataFrame::new(vec![
            Column::new("a".into(), &[1.0, 2.0, 3.0]),
            Column::new("b".into(), &[4.0, 5.0, 6.0]),
        ])
        .unwrap();

        let file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        DataSaver::save_csv(&mut df, file.path()).unwrap();

        let loaded = DataLoader::new().load_csv(file.path()).unwrap();
        assert_eq!(loaded.height(), 3);
        assert_eq!(loaded.width(), 2);
    }
}
