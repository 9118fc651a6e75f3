//! Silver-to-gold aggregation: per-key counts, sums, means, most recent
//! date, and the threshold-derived `high_value` flag.

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::schema::parse_datetime;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregateConfig {
    pub group_key: String,
    pub measure: String,
    pub date_field: String,
    /// `high_value` requires the group sum to strictly exceed this.
    pub threshold: f64,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            group_key: "id".to_string(),
            measure: "value".to_string(),
            date_field: "date".to_string(),
            threshold: 100.0,
        }
    }
}

/// Aggregates a silver frame into one gold row per distinct group key.
///
/// Missing preconditions (empty input, absent key or measure column) yield
/// an empty frame with a warning, never an error. Measure values that fail
/// numeric coercion count as zero: they contribute to `total_count` but not
/// to `sum_value`. All rows share one `kpi_generated_at` instant. Output row
/// order is whatever the grouping produces; sort by key when comparing.
pub fn aggregate(
    silver: &DataFrame,
    config: &AggregateConfig,
    now: DateTime<Utc>,
) -> Result<DataFrame> {
    if silver.height() == 0 {
        warn!("input dataset is empty; nothing to aggregate");
        return Ok(DataFrame::default());
    }

    let (has_key, has_measure, has_date) = {
        let names = silver.get_column_names();
        (
            names.iter().any(|c| c.as_str() == config.group_key),
            names.iter().any(|c| c.as_str() == config.measure),
            names.iter().any(|c| c.as_str() == config.date_field),
        )
    };
    if !has_key {
        warn!(column = %config.group_key, "group key column missing; nothing to aggregate");
        return Ok(DataFrame::default());
    }
    if !has_measure {
        warn!(column = %config.measure, "measure column missing; nothing to aggregate");
        return Ok(DataFrame::default());
    }

    let mut working = silver.clone();

    // Non-strict numeric coercion with zero substitution for the failures.
    let zeroed: Vec<f64> = working
        .column(&config.measure)?
        .cast(&DataType::Float64)?
        .f64()?
        .iter()
        .map(|value| value.unwrap_or(0.0))
        .collect();
    working.with_column(Series::new(config.measure.as_str().into(), zeroed))?;

    if has_date {
        coerce_date_field(&mut working, &config.date_field)?;
    }

    let mut aggs = vec![
        len().cast(DataType::Int64).alias("total_count"),
        col(config.measure.as_str()).sum().alias("sum_value"),
        col(config.measure.as_str()).mean().alias("avg_value"),
    ];
    if has_date {
        aggs.push(col(config.date_field.as_str()).max().alias("last_date"));
    }

    let mut gold = working
        .lazy()
        .group_by([col(config.group_key.as_str())])
        .agg(aggs)
        .with_columns([
            col("sum_value").gt(lit(config.threshold)).alias("high_value"),
            lit(Scalar::new_datetime(
                now.timestamp_micros(),
                TimeUnit::Microseconds,
                None,
            ))
            .alias("kpi_generated_at"),
        ])
        .collect()?;

    if !has_date {
        warn!(column = %config.date_field, "date column missing; last_date will be null");
        let filler = Series::full_null(
            "last_date".into(),
            gold.height(),
            &DataType::Datetime(TimeUnit::Microseconds, None),
        );
        gold.insert_column(4, filler)?;
    }

    info!(groups = gold.height(), "aggregated records into gold layer");
    Ok(gold)
}

fn coerce_date_field(frame: &mut DataFrame, date_name: &str) -> Result<()> {
    let column = frame.column(date_name)?.clone();
    let coerced = match column.dtype() {
        DataType::Datetime(_, _) | DataType::Date => return Ok(()),
        DataType::String => {
            let values: Vec<Option<i64>> = column
                .str()?
                .iter()
                .map(|cell| {
                    cell.and_then(parse_datetime)
                        .map(|parsed| parsed.and_utc().timestamp_micros())
                })
                .collect();
            Series::new(date_name.into(), values)
                .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?
        }
        _ => column
            .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?
            .as_materialized_series()
            .clone(),
    };
    frame.with_column(coerced)?;
    Ok(())
}
