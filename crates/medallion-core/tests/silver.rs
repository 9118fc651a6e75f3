use chrono::{TimeZone, Utc};
use polars::prelude::*;

use medallion_core::error::PipelineError;
use medallion_core::silver::{clean, CleanConfig};

fn string_frame(columns: &[(&str, Vec<Option<&str>>)]) -> DataFrame {
    let series: Vec<Column> = columns
        .iter()
        .map(|(name, values)| Series::new((*name).into(), values.clone()).into())
        .collect();
    DataFrame::new(series).expect("frame")
}

fn no_date_config() -> CleanConfig {
    CleanConfig {
        date_column: None,
        ..CleanConfig::default()
    }
}

#[test]
fn exact_duplicates_are_dropped_keeping_first() {
    let bronze = string_frame(&[
        ("id", vec![Some("1"), Some("1"), Some("2")]),
        ("name", vec![Some("Alice"), Some("Alice"), Some("Bob")]),
    ]);
    let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

    let cleaned = clean(&bronze, &no_date_config(), now).expect("clean");
    assert_eq!(cleaned.frame.height(), 2);
    assert_eq!(cleaned.report.duplicates_removed, 1);

    let ids: Vec<Option<&str>> = cleaned
        .frame
        .column("id")
        .unwrap()
        .str()
        .unwrap()
        .iter()
        .collect();
    assert_eq!(ids, vec![Some("1"), Some("2")]);
}

#[test]
fn rows_missing_critical_values_are_dropped() {
    let bronze = string_frame(&[
        ("id", vec![Some("1"), None, Some("3")]),
        ("name", vec![Some("Alice"), Some("Bob"), None]),
    ]);
    let now = Utc::now();

    let cleaned = clean(&bronze, &no_date_config(), now).expect("clean");
    assert_eq!(cleaned.frame.height(), 1);
    assert_eq!(cleaned.report.critical_dropped, 2);
}

#[test]
fn absent_critical_column_rejects_the_run() {
    let bronze = string_frame(&[("id", vec![Some("1")])]);
    let err = clean(&bronze, &no_date_config(), Utc::now()).expect_err("expected rejection");
    match err {
        PipelineError::Validation(message) => assert!(message.contains("name")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn column_names_are_normalized() {
    let bronze = string_frame(&[(" Customer Name ", vec![Some("Alice")])]);
    let config = CleanConfig {
        critical_columns: Vec::new(),
        id_column: "id".to_string(),
        date_column: None,
    };

    let cleaned = clean(&bronze, &config, Utc::now()).expect("clean");
    assert!(cleaned.frame.column("customer_name").is_ok());
}

#[test]
fn normalization_collisions_are_rejected() {
    let bronze = string_frame(&[
        ("Customer Id", vec![Some("1")]),
        ("customer_id", vec![Some("2")]),
    ]);
    let config = CleanConfig {
        critical_columns: Vec::new(),
        id_column: "id".to_string(),
        date_column: None,
    };

    let err = clean(&bronze, &config, Utc::now()).expect_err("expected collision rejection");
    match err {
        PipelineError::Validation(message) => assert!(message.contains("customer_id")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn numeric_ids_become_canonical_strings() {
    let ids = Series::new("id".into(), vec![Some(1i64), Some(2i64)]);
    let names = Series::new("name".into(), vec![Some("Alice"), Some("Bob")]);
    let bronze = DataFrame::new(vec![ids.into(), names.into()]).expect("frame");

    let cleaned = clean(&bronze, &no_date_config(), Utc::now()).expect("clean");
    let id_column = cleaned.frame.column("id").unwrap();
    assert_eq!(id_column.dtype(), &DataType::String);
    assert_eq!(id_column.str().unwrap().get(0), Some("1"));
}

#[test]
fn float_ids_lose_their_trailing_zero() {
    let ids = Series::new("id".into(), vec![Some(1.0f64), Some(2.5f64)]);
    let names = Series::new("name".into(), vec![Some("Alice"), Some("Bob")]);
    let bronze = DataFrame::new(vec![ids.into(), names.into()]).expect("frame");

    let cleaned = clean(&bronze, &no_date_config(), Utc::now()).expect("clean");
    let id_column = cleaned.frame.column("id").unwrap().str().unwrap();
    assert_eq!(id_column.get(0), Some("1"));
    assert_eq!(id_column.get(1), Some("2.5"));
}

#[test]
fn float_and_string_ids_for_one_entity_compare_equal() {
    // The same entity arriving as a number in one file and a string in
    // another must collapse to a single canonical id.
    let ids = Series::new("id".into(), vec![Some(7.0f64)]);
    let names = Series::new("name".into(), vec![Some("Alice")]);
    let numeric = DataFrame::new(vec![ids.into(), names.into()]).expect("frame");
    let textual = string_frame(&[
        ("id", vec![Some("7")]),
        ("name", vec![Some("Alice")]),
    ]);

    let from_numeric = clean(&numeric, &no_date_config(), Utc::now()).expect("clean");
    let from_textual = clean(&textual, &no_date_config(), Utc::now()).expect("clean");
    assert_eq!(
        from_numeric.frame.column("id").unwrap().str().unwrap().get(0),
        from_textual.frame.column("id").unwrap().str().unwrap().get(0),
    );
}

#[test]
fn invalid_dates_become_nulls_and_are_counted() {
    let bronze = string_frame(&[
        ("id", vec![Some("1"), Some("2"), Some("3")]),
        ("name", vec![Some("a"), Some("b"), Some("c")]),
        ("date", vec![Some("2024-03-01"), Some("garbage"), None]),
    ]);

    let cleaned = clean(&bronze, &CleanConfig::default(), Utc::now()).expect("clean");
    assert_eq!(cleaned.report.invalid_dates, 1);
    let dates = cleaned.frame.column("date").unwrap();
    assert!(matches!(dates.dtype(), DataType::Datetime(_, _)));
    assert_eq!(dates.null_count(), 2);
}

#[test]
fn every_row_is_stamped_with_the_same_cleaning_instant() {
    let bronze = string_frame(&[
        ("id", vec![Some("1"), Some("2")]),
        ("name", vec![Some("a"), Some("b")]),
    ]);
    let now = Utc.with_ymd_and_hms(2025, 2, 3, 4, 5, 6).unwrap();

    let cleaned = clean(&bronze, &no_date_config(), now).expect("clean");
    let stamps = cleaned
        .frame
        .column("cleaned_timestamp")
        .unwrap()
        .datetime()
        .unwrap();
    assert_eq!(stamps.get(0), Some(now.timestamp_micros()));
    assert_eq!(stamps.get(0), stamps.get(1));
}

#[test]
fn cleaning_is_idempotent_up_to_the_timestamp() {
    let bronze = string_frame(&[
        ("id", vec![Some("1"), Some("1"), Some("2"), None]),
        (
            "name",
            vec![Some("Alice"), Some("Alice"), Some("Bob"), Some("Ghost")],
        ),
        (
            "date",
            vec![Some("2024-01-01"), Some("2024-01-01"), Some("bad"), None],
        ),
    ]);
    let config = CleanConfig::default();

    let first = clean(&bronze, &config, Utc::now()).expect("first clean");
    let second = clean(&first.frame, &config, Utc::now()).expect("second clean");

    assert_eq!(second.report.duplicates_removed, 0);
    assert_eq!(second.report.critical_dropped, 0);
    assert_eq!(second.report.invalid_dates, 0);

    let a = first.frame.drop("cleaned_timestamp").expect("drop stamp");
    let b = second.frame.drop("cleaned_timestamp").expect("drop stamp");
    assert!(a.equals_missing(&b));
}

#[test]
fn empty_input_is_a_no_op() {
    let cleaned = clean(&DataFrame::default(), &CleanConfig::default(), Utc::now())
        .expect("clean");
    assert_eq!(cleaned.frame.height(), 0);
    assert_eq!(cleaned.report.rows_out, 0);
}
