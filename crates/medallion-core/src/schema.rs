//! Declarative column schemas and the pure validator applied to every
//! ingested file before it is admitted to the bronze layer.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("column '{column}' is declared non-nullable but contains {nulls} null value(s)")]
    NullViolation { column: String, nulls: usize },

    #[error(transparent)]
    Polars(#[from] PolarsError),
}

/// Closed set of target types a schema can declare. Dispatch happens once at
/// schema-load time, never per row on a type-name string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int,
    Float,
    Date,
    #[serde(rename = "string")]
    Str,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColumnSpec {
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(rename = "type", default)]
    pub dtype: Option<ColumnType>,
}

fn default_nullable() -> bool {
    true
}

/// The `columns` key accepts either a bare list of required names or a
/// mapping with per-column nullability and target type.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SchemaColumns {
    Required(Vec<String>),
    Detailed(BTreeMap<String, ColumnSpec>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableSchema {
    pub columns: SchemaColumns,
}

impl TableSchema {
    pub fn required_names(&self) -> Vec<&str> {
        match &self.columns {
            SchemaColumns::Required(names) => names.iter().map(String::as_str).collect(),
            SchemaColumns::Detailed(map) => map.keys().map(String::as_str).collect(),
        }
    }

    pub fn spec_of(&self, name: &str) -> Option<&ColumnSpec> {
        match &self.columns {
            SchemaColumns::Required(_) => None,
            SchemaColumns::Detailed(map) => map.get(name),
        }
    }
}

/// A validated, coerced copy of the input frame. The caller's frame is never
/// touched; all declared-type coercions land here.
#[derive(Debug)]
pub struct Validated {
    pub frame: DataFrame,
    /// Per-column count of values turned into nulls by failed coercion.
    pub coerced_nulls: Vec<(String, usize)>,
}

/// Checks a frame against a schema and returns a freshly coerced frame.
///
/// Missing required columns and non-nullable columns holding nulls fail
/// validation. A cell that cannot be coerced to the declared type becomes a
/// null instead; those are counted per column, not raised. Row count is
/// never changed.
pub fn validate(frame: &DataFrame, schema: &TableSchema) -> Result<Validated, SchemaError> {
    let column_names = frame.get_column_names();

    let missing: Vec<String> = schema
        .required_names()
        .iter()
        .filter(|required| !column_names.iter().any(|c| c.as_str() == **required))
        .map(|name| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(SchemaError::MissingColumns(missing));
    }

    let mut output = frame.clone();
    let mut coerced_nulls = Vec::new();

    for required in schema.required_names() {
        let Some(spec) = schema.spec_of(required) else {
            continue;
        };

        if let Some(dtype) = spec.dtype {
            let before = output.column(required)?.null_count();
            let coerced = coerce_column(output.column(required)?, dtype)?;
            let after = coerced.null_count();
            output.with_column(coerced)?;
            if after > before {
                coerced_nulls.push((required.to_string(), after - before));
            }
        }

        if !spec.nullable {
            let nulls = output.column(required)?.null_count();
            if nulls > 0 {
                return Err(SchemaError::NullViolation {
                    column: required.to_string(),
                    nulls,
                });
            }
        }
    }

    Ok(Validated {
        frame: output,
        coerced_nulls,
    })
}

fn coerce_column(column: &Column, dtype: ColumnType) -> Result<Series, SchemaError> {
    let name = column.name().clone();
    let series = match dtype {
        ColumnType::Int => match column.dtype() {
            DataType::String => {
                let values: Vec<Option<i64>> =
                    column.str()?.iter().map(|v| v.and_then(parse_int)).collect();
                Series::new(name, values)
            }
            _ => column.cast(&DataType::Int64)?.as_materialized_series().clone(),
        },
        ColumnType::Float => match column.dtype() {
            DataType::String => {
                let values: Vec<Option<f64>> = column
                    .str()?
                    .iter()
                    .map(|v| v.and_then(|raw| raw.trim().parse::<f64>().ok()))
                    .collect();
                Series::new(name, values)
            }
            _ => column.cast(&DataType::Float64)?.as_materialized_series().clone(),
        },
        ColumnType::Date => match column.dtype() {
            DataType::String => {
                let values: Vec<Option<i64>> = column
                    .str()?
                    .iter()
                    .map(|v| v.and_then(parse_datetime).map(|dt| dt.and_utc().timestamp_micros()))
                    .collect();
                Series::new(name, values)
                    .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?
            }
            _ => column
                .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?
                .as_materialized_series()
                .clone(),
        },
        ColumnType::Str => column.cast(&DataType::String)?.as_materialized_series().clone(),
    };
    Ok(series)
}

fn parse_int(raw: &str) -> Option<i64> {
    let value = raw.trim();
    if let Ok(parsed) = value.parse::<i64>() {
        return Some(parsed);
    }
    // Accept integral floats like "3.0"; anything fractional or outside the
    // i64 range stays null.
    match value.parse::<f64>() {
        Ok(parsed)
            if parsed.is_finite()
                && parsed.fract() == 0.0
                && parsed >= i64::MIN as f64
                && parsed < i64::MAX as f64 =>
        {
            Some(parsed as i64)
        }
        _ => None,
    }
}

/// Shared date parsing for schema coercion and the silver/gold layers.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let value = raw.trim();
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed);
        }
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, format) {
            return parsed.and_hms_opt(0, 0, 0);
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_utc());
    }
    None
}
