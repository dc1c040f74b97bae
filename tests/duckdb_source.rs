use std::time::Duration;

use anyhow::Result;
use duckbridge::{
    add_limit, CanonicalType, ConnectionState, DataSource, DataSourceError, FieldInfo,
    FileReference, InMemoryFile, QueryParams, SourceConfig, StructuredQuery, Value,
};

const PEOPLE_CSV: &str = "id,name,born\n1,ada,1815-12-10\n2,grace,1906-12-09\n3,edsger,1930-05-11\n4,barbara,1939-11-07\n";

async fn source_with_people() -> Result<DataSource> {
    let source = DataSource::duckdb("people", SourceConfig::default());
    source.connect().await?;
    let report = source
        .import_file(&FileReference::folder(
            "data",
            "data",
            vec![
                FileReference::file("people.csv", "data/people.csv", InMemoryFile::new(PEOPLE_CSV)),
                FileReference::file("readme.md", "data/readme.md", InMemoryFile::new("# hi")),
            ],
        ))
        .await?;
    assert_eq!(report.registered, vec!["data/people.csv"]);
    assert_eq!(report.skipped.len(), 1);
    Ok(source)
}

#[tokio::test]
async fn registered_csv_is_queryable() -> Result<()> {
    let source = source_with_people().await?;
    assert_eq!(source.state().await, ConnectionState::Ready);
    assert_eq!(source.list_files().await?, vec!["data/people.csv"]);

    let result = source
        .query_native(
            "SELECT id, name, born FROM read_csv_auto('data/people.csv') ORDER BY id",
            None,
        )
        .await?;
    assert_eq!(
        result.columns,
        vec![
            FieldInfo::new("id", CanonicalType::Number),
            FieldInfo::new("name", CanonicalType::String),
            FieldInfo::new("born", CanonicalType::Datetime),
        ]
    );
    assert_eq!(result.len(), 4);
    assert_eq!(result.value(0, "id"), Some(&Value::Int(1)));
    assert_eq!(result.value(3, "name"), Some(&Value::from("barbara")));

    let json = result.to_json()?;
    assert_eq!(json["values"][1]["_index"], 1);
    assert_eq!(json["values"][1]["name"], "grace");
    Ok(())
}

#[tokio::test]
async fn limits_truncate_across_batches() -> Result<()> {
    let source = DataSource::duckdb("range", SourceConfig::default());
    let sql = "SELECT range AS n FROM range(10000)";

    let all = source.query_native(sql, None).await?;
    assert_eq!(all.len(), 10_000);

    let limited = source.query_native(sql, Some(2_500)).await?;
    assert_eq!(limited.len(), 2_500);

    let none = source.query_native(sql, Some(0)).await?;
    assert!(none.is_empty());
    assert_eq!(none.columns, vec![FieldInfo::new("n", CanonicalType::Number)]);
    Ok(())
}

#[tokio::test]
async fn empty_result_reports_declared_columns() -> Result<()> {
    let source = DataSource::duckdb("empty", SourceConfig::default());
    let result = source
        .query_native("SELECT 1::INTEGER AS a, 'x' AS b WHERE false", None)
        .await?;
    assert!(result.is_empty());
    assert_eq!(
        result.columns,
        vec![
            FieldInfo::new("a", CanonicalType::Number),
            FieldInfo::new("b", CanonicalType::String),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn pagination_wrapper_runs_against_engine() -> Result<()> {
    let source = DataSource::duckdb("paged", SourceConfig::default());
    let sql = add_limit("  SELECT range AS n FROM range(10) ORDER BY n;  ", 3, 4);
    assert_eq!(
        sql,
        "select * from (SELECT range AS n FROM range(10) ORDER BY n) offset 4 limit 3;"
    );

    let result = source.query_native(&sql, None).await?;
    let values: Vec<_> = (0..result.len())
        .filter_map(|row| result.value(row, "n").and_then(Value::as_i64))
        .collect();
    assert_eq!(values, vec![4, 5, 6]);
    Ok(())
}

#[tokio::test]
async fn views_show_up_in_datasets() -> Result<()> {
    let source = source_with_people().await?;
    source
        .query_native(
            "CREATE TABLE people AS SELECT * FROM read_csv_auto('data/people.csv')",
            None,
        )
        .await?;
    source
        .create_view("people_view", &StructuredQuery::select_all("people", None))
        .await?;

    let rows = source
        .query(&QueryParams::raw("SELECT * FROM people_view"), None, None)
        .await?;
    assert_eq!(rows.len(), 4);

    let structured = source
        .query(
            &QueryParams::structured(StructuredQuery::select_all("people", Some("main".into()))),
            Some(2),
            Some(1),
        )
        .await?;
    assert_eq!(structured.len(), 2);

    let datasets = source.get_datasets().await?;
    let view = datasets
        .iter()
        .find(|table| table.name == "people_view")
        .ok_or_else(|| anyhow::anyhow!("view missing from catalog"))?;
    assert_eq!(view.namespace, vec!["main".to_string()]);
    let columns: Vec<_> = view.schema.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(columns, vec!["id", "name", "born"]);
    assert_eq!(view.schema[0].data_type, CanonicalType::Number);
    assert_eq!(view.schema[2].data_type, CanonicalType::Datetime);
    Ok(())
}

#[tokio::test]
async fn dropped_stream_releases_the_connection() -> Result<()> {
    let source = DataSource::duckdb("stream", SourceConfig::default());
    let mut stream = source
        .stream_raw("SELECT range AS n FROM range(1000000)")
        .await?;
    let first = stream.next_batch().await?;
    assert!(first.is_some_and(|batch| !batch.is_empty()));
    drop(stream);

    let follow_up = tokio::time::timeout(
        Duration::from_secs(30),
        source.query_native("SELECT 42 AS answer", None),
    )
    .await??;
    assert_eq!(follow_up.value(0, "answer"), Some(&Value::Int(42)));
    Ok(())
}

#[tokio::test]
async fn idle_stream_does_not_block_other_statements() -> Result<()> {
    let source = source_with_people().await?;
    let mut idle = source
        .stream_raw("SELECT range AS n FROM range(1000000)")
        .await?;
    let first = idle.next_batch().await?;
    assert!(first.is_some_and(|batch| !batch.is_empty()));

    let answer = tokio::time::timeout(
        Duration::from_secs(10),
        source.query_native("SELECT 42 AS answer", None),
    )
    .await??;
    assert_eq!(answer.value(0, "answer"), Some(&Value::Int(42)));
    tokio::time::timeout(Duration::from_secs(5), source.test()).await??;

    // registered files stay visible to statements issued meanwhile
    let rows = tokio::time::timeout(
        Duration::from_secs(10),
        source.query_native("SELECT * FROM read_csv_auto('data/people.csv')", None),
    )
    .await??;
    assert_eq!(rows.len(), 4);

    let second = idle.next_batch().await?;
    assert!(second.is_some_and(|batch| !batch.is_empty()));
    Ok(())
}

#[tokio::test]
async fn files_can_be_dropped_and_reset() -> Result<()> {
    let source = source_with_people().await?;
    source.import_remote_file("https://example.com/remote.parquet").await?;
    assert_eq!(source.list_files().await?.len(), 2);

    source
        .drop_file(&FileReference::placeholder("people.csv", "data/people.csv"))
        .await?;
    assert_eq!(
        source.list_files().await?,
        vec!["https://example.com/remote.parquet"]
    );

    source.reset().await?;
    assert!(source.list_files().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn engine_errors_surface_as_query_errors() -> Result<()> {
    let source = DataSource::duckdb("broken", SourceConfig::default());
    let err = source.query_native("SELECT * FROM missing_table", None).await;
    assert!(matches!(err, Err(DataSourceError::Query(_))));

    let unconnected = DataSource::duckdb("cold", SourceConfig::default());
    assert!(matches!(
        unconnected.list_files().await,
        Err(DataSourceError::Initialization(_))
    ));
    unconnected.reset().await?;
    Ok(())
}
