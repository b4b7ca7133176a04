use delimited_ingestion::ingestion::{
    read_delim_str, Dialect, FieldLayout, HeaderMode, MalformedRowPolicy, ReadOptions, WideningPolicy,
};
use delimited_ingestion::types::{ColumnType, Value};

#[test]
fn read_options_load_from_json_with_defaults() {
    let json = r##"{
        "dialect": { "delimiter": ";", "comment": "#", "ignore_empty_lines": true },
        "header": { "Explicit": ["code", "amount"] },
        "column_types": { "code": "String" },
        "parser_options": { "locale": { "decimal_separator": ",", "grouping_separator": "." } },
        "inference": { "sample_rows": 50, "widening": "FallbackToString" },
        "on_malformed": "Skip",
        "parse_parallel": false
    }"##;
    let opts: ReadOptions = serde_json::from_str(json).unwrap();

    assert_eq!(opts.dialect.layout(), &FieldLayout::Delimited { delimiter: ';' });
    assert_eq!(opts.dialect.comment(), Some('#'));
    assert!(opts.dialect.ignore_empty_lines());
    assert_eq!(opts.dialect.quote(), '"');
    assert_eq!(opts.header, HeaderMode::Explicit(vec!["code".into(), "amount".into()]));
    assert_eq!(opts.inference.widening, WideningPolicy::FallbackToString);
    assert_eq!(opts.on_malformed, MalformedRowPolicy::Skip);
    assert!(opts.allow_missing_columns);
    assert!(opts.observer.is_none());

    let table = read_delim_str("# totals\n007;1.234,5\n\n008;2\n", &opts).unwrap();
    assert_eq!(table.column("code").unwrap().get(0), Some(&Value::String("007".into())));
    assert_eq!(table.column("amount").unwrap().data_type(), ColumnType::Double);
    assert_eq!(table.column("amount").unwrap().get(0), Some(&Value::Double(1234.5)));
}

#[test]
fn fixed_width_dialect_from_json() {
    let dialect: Dialect = serde_json::from_str(r#"{ "fixed_boundaries": [0, 4, 9] }"#).unwrap();
    assert_eq!(dialect.boundaries(), Some(&[0usize, 4, 9][..]));
}

#[test]
fn invalid_dialect_is_rejected_on_deserialize() {
    let err = serde_json::from_str::<Dialect>(r#"{ "delimiter": "\"" }"#).unwrap_err();
    assert!(err.to_string().contains("delimiter and quote character must differ"));
}

#[test]
fn options_round_trip_through_json() {
    let mut opts = ReadOptions::tsv();
    opts.column_types.insert("id".into(), ColumnType::Long);
    opts.read_lines = Some(10);

    let json = serde_json::to_string(&opts).unwrap();
    let back: ReadOptions = serde_json::from_str(&json).unwrap();
    assert_eq!(back.dialect, opts.dialect);
    assert_eq!(back.column_types, opts.column_types);
    assert_eq!(back.read_lines, Some(10));
    assert_eq!(back.inference, opts.inference);
}
