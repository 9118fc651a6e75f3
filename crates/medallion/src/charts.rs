//! Chart rendering over the public gold-layer shape. Failures here are the
//! orchestrator's problem to log; the persisted layers are already on disk.

use std::path::Path;

use anyhow::{anyhow, Result};
use plotters::prelude::*;
use polars::prelude::*;

const CHART_SIZE: (u32, u32) = (1024, 768);

/// Bar chart of `sum_value` per group key; high-value groups draw in red.
pub fn render_sum_by_key(gold: &DataFrame, group_key: &str, path: &Path) -> Result<()> {
    let keys = gold.column(group_key).map_err(|e| anyhow!(e))?.clone();
    let sums = gold.column("sum_value").map_err(|e| anyhow!(e))?.clone();
    let flags = gold.column("high_value").map_err(|e| anyhow!(e))?.clone();
    let sums = sums.f64().map_err(|e| anyhow!(e))?;
    let flags = flags.bool().map_err(|e| anyhow!(e))?;

    let mut bars: Vec<(String, f64, bool)> = Vec::with_capacity(gold.height());
    for idx in 0..gold.height() {
        let label = match keys.get(idx) {
            Ok(AnyValue::Null) => "<null>".to_string(),
            Ok(AnyValue::String(value)) => value.to_string(),
            Ok(AnyValue::StringOwned(value)) => value.to_string(),
            Ok(other) => other.to_string(),
            Err(_) => continue,
        };
        bars.push((
            label,
            sums.get(idx).unwrap_or(0.0),
            flags.get(idx).unwrap_or(false),
        ));
    }
    if bars.is_empty() {
        return Ok(());
    }

    let max = bars
        .iter()
        .map(|(_, value, _)| *value)
        .fold(0.0f64, f64::max)
        .max(1.0);

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| anyhow!("{e}"))?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Sum of measure by key", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0i32..bars.len() as i32, 0f64..max * 1.1)
        .map_err(|e| anyhow!("{e}"))?;

    let labels: Vec<String> = bars.iter().map(|(label, _, _)| label.clone()).collect();
    chart
        .configure_mesh()
        .x_desc(group_key.to_string())
        .y_desc("sum_value")
        .x_label_formatter(&|x| {
            labels
                .get(*x as usize)
                .cloned()
                .unwrap_or_default()
        })
        .draw()
        .map_err(|e| anyhow!("{e}"))?;

    chart
        .draw_series(bars.iter().enumerate().map(|(idx, (_, value, high))| {
            let style = if *high { RED.filled() } else { BLUE.filled() };
            Rectangle::new([(idx as i32, 0.0), (idx as i32 + 1, *value)], style)
        }))
        .map_err(|e| anyhow!("{e}"))?;

    root.present().map_err(|e| anyhow!("{e}"))?;
    Ok(())
}

/// Bar chart of null counts per column, rendered from the silver frame.
pub fn render_null_counts(frame: &DataFrame, path: &Path) -> Result<()> {
    let counts: Vec<(String, usize)> = frame
        .get_columns()
        .iter()
        .map(|column| (column.name().to_string(), column.null_count()))
        .collect();
    if counts.is_empty() {
        return Ok(());
    }

    let max = counts.iter().map(|(_, count)| *count).max().unwrap_or(0).max(1);

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| anyhow!("{e}"))?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Null values per column", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0i32..counts.len() as i32, 0usize..max + 1)
        .map_err(|e| anyhow!("{e}"))?;

    let labels: Vec<String> = counts.iter().map(|(name, _)| name.clone()).collect();
    chart
        .configure_mesh()
        .x_desc("column")
        .y_desc("null count")
        .x_label_formatter(&|x| {
            labels
                .get(*x as usize)
                .cloned()
                .unwrap_or_default()
        })
        .draw()
        .map_err(|e| anyhow!("{e}"))?;

    chart
        .draw_series(counts.iter().enumerate().map(|(idx, (_, count))| {
            Rectangle::new([(idx as i32, 0), (idx as i32 + 1, *count)], BLUE.filled())
        }))
        .map_err(|e| anyhow!("{e}"))?;

    root.present().map_err(|e| anyhow!("{e}"))?;
    Ok(())
}
