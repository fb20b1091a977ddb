//! IO
//!
//! CSV in and out: the prepared modelling table, submission files and
//! feature importance tables.
use chrono::NaiveDate;
use csv::StringRecord;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::MODEL_NAME_PREFIX;
use crate::data::{FeatureTable, ObservationMeta};
use crate::errors::FlucastError;
use crate::submission::QuantileRow;

/// `root/UMass-{model}/[subdir/]{ref_date}-UMass-{model}.csv`
pub fn build_save_path<P: AsRef<Path>>(root: P, model_name: &str, ref_date: NaiveDate, subdir: Option<&str>) -> PathBuf {
    let model = format!("{}{}", MODEL_NAME_PREFIX, model_name);
    let mut dir = root.as_ref().join(&model);
    if let Some(s) = subdir {
        dir = dir.join(s);
    }
    dir.join(format!("{}-{}.csv", ref_date, model))
}

fn create_parent(path: &Path) -> Result<(), FlucastError> {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => {
            fs::create_dir_all(p).map_err(|e| FlucastError::UnableToWrite(format!("{}: {}", p.display(), e)))
        }
        _ => Ok(()),
    }
}

fn writer(path: &Path) -> Result<csv::Writer<fs::File>, FlucastError> {
    create_parent(path)?;
    csv::Writer::from_path(path).map_err(|e| FlucastError::UnableToWrite(format!("{}: {}", path.display(), e)))
}

pub fn write_submission<P: AsRef<Path>>(path: P, rows: &[QuantileRow]) -> Result<(), FlucastError> {
    let path = path.as_ref();
    let mut wtr = writer(path)?;
    for row in rows {
        wtr.serialize(row).map_err(|e| FlucastError::UnableToWrite(e.to_string()))?;
    }
    wtr.flush().map_err(|e| FlucastError::UnableToWrite(e.to_string()))?;
    info!("wrote {} forecast rows to {}", rows.len(), path.display());
    Ok(())
}

/// Read a submission file. Quantile levels are recovered from their labels.
pub fn read_submission<P: AsRef<Path>>(path: P) -> Result<Vec<QuantileRow>, FlucastError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        let mut row: QuantileRow = record?;
        row.quantile_level = parse_f64(&row.output_type_id, "output_type_id")?;
        rows.push(row);
    }
    Ok(rows)
}

/// One row per feature, one column per quantile level.
pub fn write_feature_importance<P: AsRef<Path>>(
    path: P,
    feature_names: &[String],
    q_labels: &[String],
    importance: &[Vec<f64>],
) -> Result<(), FlucastError> {
    if importance.len() != q_labels.len() {
        return Err(FlucastError::ShapeMismatch(format!(
            "importance for {} quantile levels, {} labels",
            importance.len(),
            q_labels.len()
        )));
    }
    let mut wtr = writer(path.as_ref())?;
    let mut header = vec!["feature".to_string()];
    header.extend(q_labels.iter().cloned());
    wtr.write_record(&header).map_err(|e| FlucastError::UnableToWrite(e.to_string()))?;
    for (j, name) in feature_names.iter().enumerate() {
        let mut record = vec![name.clone()];
        for q in importance {
            record.push(q.get(j).copied().unwrap_or(0.0).to_string());
        }
        wtr.write_record(&record).map_err(|e| FlucastError::UnableToWrite(e.to_string()))?;
    }
    wtr.flush().map_err(|e| FlucastError::UnableToWrite(e.to_string()))
}

fn parse_f64(value: &str, column: &str) -> Result<f64, FlucastError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| FlucastError::ParseValue(value.to_string(), column.to_string()))
}

/// Empty cells and `NA` are missing.
fn parse_optional_f64(value: &str, column: &str) -> Result<Option<f64>, FlucastError> {
    match value.trim() {
        "" | "NA" | "NaN" | "nan" => Ok(None),
        v => parse_f64(v, column).map(Some),
    }
}

struct Columns {
    index: Vec<usize>,
}

impl Columns {
    fn locate(headers: &StringRecord, names: &[&str]) -> Result<Self, FlucastError> {
        let index = names
            .iter()
            .map(|n| {
                headers
                    .iter()
                    .position(|h| h == *n)
                    .ok_or_else(|| FlucastError::MissingColumn(n.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Columns { index })
    }

    fn get<'r>(&self, record: &'r StringRecord, i: usize) -> &'r str {
        record.get(self.index[i]).unwrap_or("")
    }
}

const META_COLUMNS: [&str; 11] = [
    "source",
    "location",
    "season",
    "season_week",
    "wk_end_date",
    "pop",
    "horizon",
    "inc_trans_cs",
    "inc_trans_center_factor",
    "inc_trans_scale_factor",
    "delta_target",
];

/// Read a prepared modelling table with the given feature columns.
pub fn read_feature_table<P: AsRef<Path>>(path: P, feature_names: &[&str]) -> Result<FeatureTable, FlucastError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();
    let meta_cols = Columns::locate(&headers, &META_COLUMNS)?;
    let feat_cols = Columns::locate(&headers, feature_names)?;

    let mut meta = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut delta_target = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let field = |i: usize| meta_cols.get(&record, i);
        let season_week = field(3)
            .trim()
            .parse::<u32>()
            .map_err(|_| FlucastError::ParseValue(field(3).to_string(), "season_week".to_string()))?;
        let wk_end_date = NaiveDate::parse_from_str(field(4).trim(), "%Y-%m-%d")
            .map_err(|_| FlucastError::ParseValue(field(4).to_string(), "wk_end_date".to_string()))?;
        let horizon = field(6)
            .trim()
            .parse::<i64>()
            .map_err(|_| FlucastError::ParseValue(field(6).to_string(), "horizon".to_string()))?;
        meta.push(ObservationMeta {
            source: field(0).to_string(),
            location: field(1).to_string(),
            season: field(2).to_string(),
            season_week,
            wk_end_date,
            pop: parse_f64(field(5), "pop")?,
            horizon,
            inc_trans_cs: parse_f64(field(7), "inc_trans_cs")?,
            inc_trans_center_factor: parse_f64(field(8), "inc_trans_center_factor")?,
            inc_trans_scale_factor: parse_f64(field(9), "inc_trans_scale_factor")?,
        });
        delta_target.push(parse_optional_f64(field(10), "delta_target")?);
        let row = feature_names
            .iter()
            .enumerate()
            .map(|(j, name)| parse_optional_f64(feat_cols.get(&record, j), name).map(|v| v.unwrap_or(f64::NAN)))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }

    // Row major records to column major storage.
    let mut features = Vec::with_capacity(rows.len() * feature_names.len());
    for j in 0..feature_names.len() {
        features.extend(rows.iter().map(|r| r[j]));
    }
    info!("read {} rows with {} features", meta.len(), feature_names.len());
    FeatureTable::new(
        feature_names.iter().map(|s| s.to_string()).collect(),
        meta,
        features,
        delta_target,
    )
}
