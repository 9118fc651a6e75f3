//! Bronze-to-silver cleaning: deduplication, critical-column completeness,
//! column-name normalization, canonical id typing, date parsing, and the
//! per-run `cleaned_timestamp` stamp.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::schema::parse_datetime;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CleanConfig {
    /// A null in any of these disqualifies the record from the silver layer.
    pub critical_columns: Vec<String>,
    pub id_column: String,
    pub date_column: Option<String>,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            critical_columns: vec!["id".to_string(), "name".to_string()],
            id_column: "id".to_string(),
            date_column: Some("date".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CleanReport {
    pub rows_in: usize,
    pub duplicates_removed: usize,
    pub critical_dropped: usize,
    pub invalid_dates: usize,
    pub rows_out: usize,
}

#[derive(Debug)]
pub struct Cleaned {
    pub frame: DataFrame,
    pub report: CleanReport,
}

/// Cleans a bronze frame into the silver layer. Malformed values become
/// nulls, never errors; the only rejections are structural (an absent
/// critical column, or two column names colliding after normalization).
pub fn clean(bronze: &DataFrame, config: &CleanConfig, now: DateTime<Utc>) -> Result<Cleaned> {
    let mut report = CleanReport {
        rows_in: bronze.height(),
        ..CleanReport::default()
    };

    if bronze.height() == 0 {
        warn!("received empty bronze dataset for cleaning");
        report.rows_out = 0;
        return Ok(Cleaned {
            frame: bronze.clone(),
            report,
        });
    }

    // Exact duplicates across every column; first occurrence wins.
    let deduped = bronze
        .clone()
        .lazy()
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?;
    report.duplicates_removed = bronze.height() - deduped.height();
    info!(removed = report.duplicates_removed, "dropped duplicate records");

    let mut drop_mask = BooleanChunked::full("drop".into(), false, deduped.height());
    for name in &config.critical_columns {
        let column = deduped.column(name).map_err(|_| {
            PipelineError::Validation(format!(
                "critical column '{name}' is absent from the bronze dataset"
            ))
        })?;
        drop_mask = &drop_mask | &column.is_null();
    }
    let mut frame = deduped.filter(&!drop_mask)?;
    report.critical_dropped = deduped.height() - frame.height();
    info!(
        remaining = frame.height(),
        dropped = report.critical_dropped,
        "removed rows with missing critical values"
    );

    normalize_column_names(&mut frame)?;

    let id_cast = match frame.column(&config.id_column) {
        Ok(column) => match column.dtype() {
            DataType::String => None,
            DataType::Float32 | DataType::Float64 => {
                let values: Vec<Option<String>> = column
                    .cast(&DataType::Float64)?
                    .f64()?
                    .iter()
                    .map(|value| value.map(canonical_id))
                    .collect();
                Some(Series::new(config.id_column.as_str().into(), values))
            }
            _ => Some(column.cast(&DataType::String)?.as_materialized_series().clone()),
        },
        Err(_) => {
            warn!(column = %config.id_column, "id column absent; skipping canonical cast");
            None
        }
    };
    if let Some(series) = id_cast {
        frame.with_column(series)?;
    }

    if let Some(date_name) = config.date_column.as_deref() {
        if frame.column(date_name).is_ok() {
            report.invalid_dates = parse_date_column(&mut frame, date_name)?;
            if report.invalid_dates > 0 {
                warn!(
                    column = date_name,
                    invalid = report.invalid_dates,
                    "rows with invalid dates became null"
                );
            }
        }
    }

    let stamp = Series::new(
        "cleaned_timestamp".into(),
        vec![now.timestamp_micros(); frame.height()],
    )
    .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?;
    frame.with_column(stamp)?;

    report.rows_out = frame.height();
    info!(rows = report.rows_out, "silver layer data prepared");
    Ok(Cleaned { frame, report })
}

/// Integral float ids render without the trailing `.0` so ids that arrived
/// as `1` and `"1"` compare equal in the silver layer.
fn canonical_id(value: f64) -> String {
    if value.is_finite()
        && value.fract() == 0.0
        && value >= i64::MIN as f64
        && value < i64::MAX as f64
    {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

fn canonical_name(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

/// Trims, lowercases, and underscores every column name. Two distinct
/// originals normalizing to the same canonical name reject the run.
fn normalize_column_names(frame: &mut DataFrame) -> Result<()> {
    let originals: Vec<String> = frame
        .get_column_names_owned()
        .iter()
        .map(|name| name.to_string())
        .collect();

    let mut seen: HashMap<String, String> = HashMap::new();
    for original in &originals {
        let canonical = canonical_name(original);
        if let Some(previous) = seen.get(&canonical) {
            return Err(PipelineError::Validation(format!(
                "column names '{previous}' and '{original}' collide after normalization to '{canonical}'"
            )));
        }
        seen.insert(canonical, original.clone());
    }

    for original in originals {
        let canonical = canonical_name(&original);
        if canonical != original {
            frame.rename(&original, canonical.into())?;
        }
    }
    Ok(())
}

/// Parses a string-typed date column to naive datetimes; unparseable values
/// become null. Returns how many non-null values were lost that way.
fn parse_date_column(frame: &mut DataFrame, date_name: &str) -> Result<usize> {
    let column = frame.column(date_name)?.clone();
    match column.dtype() {
        DataType::Datetime(_, _) | DataType::Date => Ok(0),
        DataType::String => {
            let mut invalid = 0usize;
            let values: Vec<Option<i64>> = column
                .str()?
                .iter()
                .map(|cell| match cell {
                    None => None,
                    Some(raw) => match parse_datetime(raw) {
                        Some(parsed) => Some(parsed.and_utc().timestamp_micros()),
                        None => {
                            invalid += 1;
                            None
                        }
                    },
                })
                .collect();
            let series = Series::new(date_name.into(), values)
                .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?;
            frame.with_column(series)?;
            Ok(invalid)
        }
        _ => {
            let before = column.null_count();
            let cast = column.cast(&DataType::Datetime(TimeUnit::Microseconds, None))?;
            let invalid = cast.null_count() - before;
            frame.with_column(cast.as_materialized_series().clone())?;
            Ok(invalid)
        }
    }
}
