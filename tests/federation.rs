mod common;

use common::{relation, relation_on, row_id, runtime, server_with, MockRemote};
use fdw_core::{ColumnDescriptor, FdwError, LocalType, RemoteValue, RemoteVersion, Row, RowId, Value};
use fdw_sql::{catalog, Expr, Operator};
use firebird_fdw_lib::engine::{RemoteError, RemoteResult};
use firebird_fdw_lib::federation::{
    EstimateSource, ImportFilter, ImportOptions, ModifyKind, ModifyRequest, ScanRequest, ScanState, TruncateRequest,
};

fn int(v: &RemoteValue) -> i64 {
    match v {
        RemoteValue::Integer(i) => *i,
        other => panic!("expected an integer parameter, got {other:?}"),
    }
}

fn rows(columns: &[&str], data: Vec<Vec<RemoteValue>>) -> RemoteResult {
    RemoteResult::with_rows(columns.iter().map(|c| c.to_string()).collect(), data)
}

#[tokio::test]
async fn test_generated_columns_are_read_back_not_written() {
    let remote = MockRemote::new(RemoteVersion::V3_0);
    remote.respond(|sql, params| {
        if sql.starts_with("INSERT INTO T (A)") {
            let a = int(&params[0]);
            Ok(rows(&["A", "B"], vec![vec![RemoteValue::Integer(a), RemoteValue::Integer(a * 2)]]))
        } else {
            Err(RemoteError::statement(format!("unexpected statement: {sql}")))
        }
    });
    let rt = runtime(&remote);
    let rel = relation(
        "t",
        &[],
        vec![
            ColumnDescriptor::new("a", LocalType::Int4),
            ColumnDescriptor::new("b", LocalType::Int4).generated(),
        ],
    );

    let request = ModifyRequest::new(ModifyKind::Insert, vec![0, 1]).returning(vec![0]);
    let mut modify = rt.modify(rel, request).await.unwrap();
    assert_eq!(modify.batch_size(), 1);

    let first = modify.insert(Row::new(vec![Value::Int(1), Value::Null])).await.unwrap();
    let second = modify.insert(Row::new(vec![Value::Int(22), Value::Int(999)])).await.unwrap();
    assert_eq!(first.unwrap().values, vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(second.unwrap().values, vec![Value::Int(22), Value::Int(44)]);
    assert_eq!(modify.finish().await.unwrap(), 2);

    let inserts = remote.data_statements();
    assert_eq!(inserts.len(), 2);
    assert_eq!(inserts[0].sql, "INSERT INTO T (A)\n VALUES (?)\n RETURNING A, B");
    // The generated column's value never leaves the host.
    assert_eq!(inserts[1].params, vec![RemoteValue::Integer(22)]);
}

#[tokio::test]
async fn test_rescan_reexecutes_with_current_parameters() {
    let remote = MockRemote::new(RemoteVersion::V3_0);
    remote.respond(|sql, params| {
        assert_eq!(sql, "SELECT ID\n  FROM BIG\n WHERE (ID >= ?)");
        let from = int(&params[0]);
        let data = (from..=1500).map(|i| vec![RemoteValue::Integer(i)]).collect();
        Ok(rows(&["ID"], data))
    });
    let rt = runtime(&remote);
    let rel = relation("big", &[], vec![ColumnDescriptor::new("id", LocalType::Int4)]);

    let mut scan = rt.scan(
        rel,
        ScanRequest {
            columns: vec![0],
            quals: vec![Expr::op(Operator::GtEq, Expr::col(0), Expr::param(0, LocalType::Int4))],
            ..ScanRequest::default()
        },
    );
    scan.begin(vec![Value::Int(1)]).await.unwrap();
    assert!(scan.local_quals().is_empty());

    let mut seen = 0;
    while scan.next().await.unwrap().is_some() {
        seen += 1;
    }
    assert_eq!(seen, 1500);

    // Rescan part way through a second pass.
    scan.rescan(None).unwrap();
    for _ in 0..10 {
        assert!(scan.next().await.unwrap().is_some());
    }
    scan.rescan(Some(vec![Value::Int(1001)])).unwrap();
    assert_eq!(scan.state(), ScanState::Rescanning);
    let mut tail = Vec::new();
    while let Some(row) = scan.next().await.unwrap() {
        tail.push(row.values[0].clone());
    }
    assert_eq!(tail.len(), 500);
    assert_eq!(tail.first(), Some(&Value::Int(1001)));

    assert_eq!(scan.executions(), 3);
    assert_eq!(remote.count_starting_with("SELECT"), 3);
    scan.end();
    assert_eq!(scan.state(), ScanState::Closed);
    assert!(scan.next().await.is_err());
}

#[tokio::test]
async fn test_insert_batches_by_configured_size() {
    let remote = MockRemote::new(RemoteVersion::V3_0);
    remote.respond(|sql, params| {
        let arms = sql.matches("SELECT ? FROM RDB$DATABASE").count().max(1);
        assert_eq!(params.len(), arms);
        Ok(RemoteResult::affected(arms as u64))
    });
    let rt = runtime(&remote);
    let rel = relation("log", &[("batch_size", "10")], vec![ColumnDescriptor::new("n", LocalType::Int8)]);

    let mut modify = rt.modify(rel, ModifyRequest::new(ModifyKind::Insert, vec![0])).await.unwrap();
    assert_eq!(modify.batch_size(), 10);
    for n in 0..25 {
        assert!(modify.insert(Row::new(vec![Value::Int(n)])).await.unwrap().is_none());
    }
    assert_eq!(modify.round_trips(), 2);
    assert_eq!(modify.finish().await.unwrap(), 25);

    let inserts = remote.data_statements();
    assert_eq!(inserts.len(), 3);
    assert!(inserts[0].sql.starts_with("INSERT INTO LOG (N)\n SELECT ? FROM RDB$DATABASE\n UNION ALL SELECT ?"));
    assert_eq!(inserts[0].sql.matches("UNION ALL").count(), 9);
    assert_eq!(inserts[2].params.len(), 5);
    assert_eq!(inserts[2].params[4], RemoteValue::Integer(24));
}

#[tokio::test]
async fn test_returning_forces_one_row_per_round_trip() {
    let remote = MockRemote::new(RemoteVersion::V3_0);
    remote.respond(|_, params| Ok(rows(&["N"], vec![vec![params[0].clone()]])));
    let rt = runtime(&remote);
    let rel = relation("log", &[("batch_size", "10")], vec![ColumnDescriptor::new("n", LocalType::Int8)]);

    let request = ModifyRequest::new(ModifyKind::Insert, vec![0]).returning(vec![0]);
    let mut modify = rt.modify(rel, request).await.unwrap();
    assert_eq!(modify.batch_size(), 1);
    for n in 0..4 {
        let row = modify.insert(Row::new(vec![Value::Int(n)])).await.unwrap().unwrap();
        assert_eq!(row.values, vec![Value::Int(n)]);
    }
    assert_eq!(modify.round_trips(), 4);
}

#[tokio::test]
async fn test_short_returning_row_is_an_error() {
    let remote = MockRemote::new(RemoteVersion::V3_0);
    // Omits the generated column B from the RETURNING row.
    remote.respond(|_, params| Ok(rows(&["A"], vec![vec![params[0].clone()]])));
    let rt = runtime(&remote);
    let rel = relation(
        "t",
        &[],
        vec![
            ColumnDescriptor::new("a", LocalType::Int4),
            ColumnDescriptor::new("b", LocalType::Int4).generated(),
        ],
    );

    let request = ModifyRequest::new(ModifyKind::Insert, vec![0]).returning(vec![0]);
    let mut modify = rt.modify(rel, request).await.unwrap();
    let err = modify.insert(Row::new(vec![Value::Int(1), Value::Null])).await.unwrap_err();
    assert!(matches!(err, FdwError::Internal { .. }), "{err}");
}

#[tokio::test]
async fn test_update_and_delete_address_rows_by_identifier() {
    let remote = MockRemote::new(RemoteVersion::V3_0);
    remote.respond(|sql, _| {
        if sql.starts_with("SELECT") {
            Ok(rows(
                &["ID", "NOTE", "RDB$DB_KEY"],
                vec![vec![RemoteValue::Integer(7), RemoteValue::Text("old".into()), row_id(7)]],
            ))
        } else {
            Ok(RemoteResult::affected(1))
        }
    });
    let rt = runtime(&remote);
    let rel = relation(
        "notes",
        &[],
        vec![ColumnDescriptor::new("id", LocalType::Int4), ColumnDescriptor::new("note", LocalType::Text)],
    );

    let mut scan = rt.scan(
        rel.clone(),
        ScanRequest {
            columns: vec![0, 1],
            for_modify: true,
            ..ScanRequest::default()
        },
    );
    scan.begin(Vec::new()).await.unwrap();
    assert_eq!(scan.remote_sql(), Some("SELECT ID, NOTE, RDB$DB_KEY\n  FROM NOTES"));
    let mut row = scan.next().await.unwrap().unwrap();
    assert_eq!(row.row_id, RowId::from_bytes(vec![0, 0, 0, 0, 0, 0, 0, 7]));

    row.values[1] = Value::Text("new".into());
    let mut update = rt.modify(rel.clone(), ModifyRequest::new(ModifyKind::Update, vec![1])).await.unwrap();
    assert!(update.update(row.clone()).await.unwrap().is_none());
    assert_eq!(update.finish().await.unwrap(), 1);

    let mut delete = rt.modify(rel.clone(), ModifyRequest::new(ModifyKind::Delete, vec![])).await.unwrap();
    delete.delete(row).await.unwrap();
    let missing = delete.delete(Row::new(vec![Value::Int(1), Value::Null])).await;
    assert!(matches!(missing, Err(FdwError::InvalidState { .. })));

    let data = remote.data_statements();
    assert_eq!(data[1].sql, "UPDATE NOTES SET NOTE = ?\n WHERE RDB$DB_KEY = ?");
    assert_eq!(data[1].params, vec![RemoteValue::Text("new".into()), row_id(7)]);
    assert_eq!(data[2].sql, "DELETE FROM NOTES\n WHERE RDB$DB_KEY = ?");
}

#[tokio::test]
async fn test_modifications_rejected_on_query_and_read_only_tables() {
    let remote = MockRemote::new(RemoteVersion::V3_0);
    let rt = runtime(&remote);
    let columns = vec![ColumnDescriptor::new("id", LocalType::Int4)];

    let query = relation("q", &[("query", "SELECT id FROM t")], columns.clone());
    let err = rt.modify(query, ModifyRequest::new(ModifyKind::Insert, vec![0])).await.unwrap_err();
    assert!(matches!(err, FdwError::UnsupportedOperation { .. }));

    let read_only = relation_on(server_with(&[("updatable", "false")]), "t", &[], columns);
    let err = rt.modify(read_only, ModifyRequest::new(ModifyKind::Delete, vec![])).await.unwrap_err();
    assert!(matches!(err, FdwError::UnsupportedOperation { .. }));

    assert_eq!(remote.connects(), 0);
}

#[tokio::test]
async fn test_truncate_rejections_make_no_remote_calls() {
    let remote = MockRemote::new(RemoteVersion::V3_0);
    let rt = runtime(&remote);
    let columns = vec![ColumnDescriptor::new("id", LocalType::Int4)];
    let ok = relation("a", &[], columns.clone());
    let locked = relation("b", &[("truncatable", "false")], columns.clone());

    let err = rt.truncate(&[ok.clone(), locked], TruncateRequest::default()).await.unwrap_err();
    assert!(matches!(err, FdwError::UnsupportedOperation { .. }));

    let cascade = TruncateRequest {
        cascade: true,
        ..TruncateRequest::default()
    };
    assert!(rt.truncate(&[ok.clone()], cascade).await.is_err());

    let restart = TruncateRequest {
        restart_identity: true,
        ..TruncateRequest::default()
    };
    assert!(rt.truncate(&[ok], restart).await.is_err());

    assert_eq!(remote.connects(), 0);
    assert!(remote.statements().is_empty());
}

#[tokio::test]
async fn test_truncate_checks_remote_foreign_keys_before_deleting() {
    let remote = MockRemote::new(RemoteVersion::V3_0);
    remote.respond(|sql, params| {
        if sql == catalog::FK_DEPENDENTS_QUERY {
            let referenced = params[0] == RemoteValue::Text("PARENT".into());
            Ok(rows(&["COUNT"], vec![vec![RemoteValue::Integer(i64::from(referenced) * 2)]]))
        } else {
            Ok(RemoteResult::affected(3))
        }
    });
    let rt = runtime(&remote);
    let columns = vec![ColumnDescriptor::new("id", LocalType::Int4)];
    let parent = relation("parent", &[], columns.clone());
    let a = relation("a", &[], columns.clone());
    let b = relation("b", &[], columns);

    let err = rt.truncate(&[a.clone(), parent], TruncateRequest::default()).await.unwrap_err();
    assert!(matches!(err, FdwError::UnsupportedOperation { .. }));
    assert_eq!(remote.count_starting_with("DELETE"), 0);

    let deleted = rt.truncate(&[a, b], TruncateRequest::default()).await.unwrap();
    assert_eq!(deleted, 6);
    assert_eq!(remote.count_starting_with("DELETE FROM A"), 1);
    assert_eq!(remote.count_starting_with("DELETE FROM B"), 1);
}

fn dataset() -> Vec<Vec<RemoteValue>> {
    (1..=20)
        .map(|i| {
            let note = if i % 2 == 0 { format!("alpha{i}") } else { format!("beta{i}") };
            vec![RemoteValue::Integer(i), RemoteValue::Text(note)]
        })
        .collect()
}

async fn filtered_ids(disable_pushdowns: bool) -> (Vec<Value>, usize) {
    let remote = MockRemote::new(RemoteVersion::V3_0);
    remote.respond(|sql, params| {
        let mut data = dataset();
        if sql.contains("WHERE") {
            let from = int(&params[0]);
            data.retain(|r| int(&r[0]) >= from && matches!(&r[1], RemoteValue::Text(s) if s.starts_with('a')));
        }
        if sql.starts_with("SELECT ID, NOTE") {
            Ok(rows(&["ID", "NOTE"], data))
        } else {
            Ok(rows(&["ID"], data.into_iter().map(|r| vec![r[0].clone()]).collect()))
        }
    });
    let rt = runtime(&remote);
    let server = server_with(&[("disable_pushdowns", if disable_pushdowns { "true" } else { "false" })]);
    let rel = relation_on(
        server,
        "items",
        &[],
        vec![ColumnDescriptor::new("id", LocalType::Int4), ColumnDescriptor::new("note", LocalType::Text)],
    );

    let mut scan = rt.scan(
        rel,
        ScanRequest {
            columns: vec![0],
            quals: vec![
                Expr::op(Operator::GtEq, Expr::col(0), Expr::param(0, LocalType::Int4)),
                Expr::op(Operator::Like, Expr::col(1), Expr::lit("a%")),
            ],
            ..ScanRequest::default()
        },
    );
    scan.begin(vec![Value::Int(5)]).await.unwrap();
    let local = scan.local_quals().len();
    let mut ids = Vec::new();
    while let Some(row) = scan.next().await.unwrap() {
        ids.push(row.values[0].clone());
    }
    (ids, local)
}

#[tokio::test]
async fn test_pushdown_matches_local_evaluation() {
    let (pushed, pushed_local) = filtered_ids(false).await;
    let (local, local_quals) = filtered_ids(true).await;

    assert_eq!(pushed_local, 0);
    assert_eq!(local_quals, 2);
    assert_eq!(pushed, local);
    assert_eq!(pushed, (6..=20).step_by(2).map(Value::Int).collect::<Vec<_>>());
}

struct FunctionScan {
    ids: Vec<Value>,
    local: usize,
    recheck: usize,
    sql: String,
}

async fn scan_with_function(version: RemoteVersion, disable_pushdowns: bool, qual: Expr) -> FunctionScan {
    let remote = MockRemote::new(version);
    remote.respond(|sql, _| {
        let mut data = dataset();
        if sql.contains("POWER(ID, 2)") {
            data.retain(|r| int(&r[0]) * int(&r[0]) == 16);
        }
        if sql.contains("LPAD(NOTE, 8)") {
            data.retain(|r| matches!(&r[1], RemoteValue::Text(s) if s == "alpha2"));
        }
        Ok(rows(&["ID", "NOTE"], data))
    });
    let rt = runtime(&remote);
    let server = server_with(&[("disable_pushdowns", if disable_pushdowns { "true" } else { "false" })]);
    let rel = relation_on(
        server,
        "items",
        &[],
        vec![ColumnDescriptor::new("id", LocalType::Int4), ColumnDescriptor::new("note", LocalType::Text)],
    );

    let mut scan = rt.scan(
        rel,
        ScanRequest {
            columns: vec![0, 1],
            quals: vec![qual],
            ..ScanRequest::default()
        },
    );
    scan.begin(Vec::new()).await.unwrap();
    let mut ids = Vec::new();
    while let Some(row) = scan.next().await.unwrap() {
        ids.push(row.values[0].clone());
    }
    FunctionScan {
        ids,
        local: scan.local_quals().len(),
        recheck: scan.recheck_quals().len(),
        sql: scan.remote_sql().unwrap_or_default().to_string(),
    }
}

#[tokio::test]
async fn test_function_qualifiers_agree_with_and_without_pushdown() {
    let power = Expr::eq(Expr::func("power", vec![Expr::col(0), Expr::lit(2)]), Expr::lit(16));
    let pushed = scan_with_function(RemoteVersion::V3_0, false, power.clone()).await;
    let local = scan_with_function(RemoteVersion::V3_0, true, power).await;
    assert!(pushed.sql.contains("WHERE (POWER(ID, 2) = 16)"), "{}", pushed.sql);
    assert_eq!((pushed.local, local.local), (0, 1));
    assert!(!local.sql.contains("WHERE"));
    assert_eq!(pushed.ids, vec![Value::Int(4)]);
    assert_eq!(local.ids, pushed.ids);

    // lpad() is only pushed from 2.5 on; older remotes filter locally.
    let pad = Expr::eq(Expr::func("lpad", vec![Expr::col(1), Expr::lit(8)]), Expr::lit("  alpha2"));
    let pushed = scan_with_function(RemoteVersion::V3_0, false, pad.clone()).await;
    let old = scan_with_function(RemoteVersion::V2_1, false, pad).await;
    assert_eq!((pushed.local, old.local), (0, 1));
    assert_eq!(pushed.ids, vec![Value::Int(2)]);
    assert_eq!(old.ids, pushed.ids);
}

#[tokio::test]
async fn test_unknown_functions_are_left_for_the_host() {
    let digest = Expr::eq(Expr::func("md5", vec![Expr::col(1)]), Expr::lit("x"));
    let scan = scan_with_function(RemoteVersion::V3_0, false, digest).await;
    assert_eq!((scan.local, scan.recheck), (0, 1));
    assert!(!scan.sql.contains("WHERE"), "{}", scan.sql);
    assert_eq!(scan.ids.len(), 20);
}

#[tokio::test]
async fn test_analyze_feeds_estimates() {
    let remote = MockRemote::new(RemoteVersion::V3_0);
    remote.respond(|sql, _| {
        if sql.starts_with("SELECT COUNT(*)") {
            Ok(rows(&["COUNT"], vec![vec![RemoteValue::Integer(42)]]))
        } else {
            Ok(rows(&["ID"], (0..100).map(|i| vec![RemoteValue::Integer(i)]).collect()))
        }
    });
    let rt = runtime(&remote);
    let rel = relation("facts", &[], vec![ColumnDescriptor::new("id", LocalType::Int4)]);

    let before = rt.estimate(&rel, 1).await.unwrap();
    assert_eq!(before.source, EstimateSource::RemoteCount);
    assert_eq!(before.rows, 42.0);
    assert_eq!(before.startup_cost, 10.0);

    let stats = rt.analyze(rel.clone(), 10, 1).await.unwrap().unwrap();
    assert_eq!(stats.total_rows, 100);
    assert_eq!(stats.sample.len(), 10);

    let after = rt.estimate(&rel, 1).await.unwrap();
    assert_eq!(after.source, EstimateSource::Analyze);
    assert_eq!(after.total_cost, 110.0);

    let fixed = relation("facts", &[("estimated_row_count", "7")], vec![ColumnDescriptor::new("id", LocalType::Int4)]);
    remote.clear_log();
    let estimate = rt.estimate(&fixed, 1).await.unwrap();
    assert_eq!(estimate.source, EstimateSource::TableOption);
    assert_eq!(estimate.rows, 7.0);
    assert!(remote.data_statements().is_empty());

    let query = relation("q", &[("query", "SELECT id FROM facts")], vec![ColumnDescriptor::new("id", LocalType::Int4)]);
    assert!(rt.analyze(query, 10, 1).await.unwrap().is_none());
}

fn catalog_row(name: &str, field_type: i64, sub_type: i64, len: Option<i64>, not_null: bool) -> Vec<RemoteValue> {
    vec![
        RemoteValue::Text(name.into()),
        RemoteValue::Integer(field_type),
        RemoteValue::Integer(sub_type),
        len.map_or(RemoteValue::Null, RemoteValue::Integer),
        RemoteValue::Null,
        RemoteValue::Integer(0),
        RemoteValue::Null,
        RemoteValue::Null,
        RemoteValue::Integer(i64::from(not_null)),
        RemoteValue::Null,
        RemoteValue::Integer(0),
    ]
}

#[tokio::test]
async fn test_import_is_deterministic_and_skips_unsupported_relations() {
    let remote = MockRemote::new(RemoteVersion::V4_0);
    remote.respond(|sql, params| {
        if sql == catalog::RELATIONS_QUERY {
            let names = ["ORDERS", "EVENTS", "MixedT"];
            return Ok(rows(&["NAME"], names.iter().map(|n| vec![RemoteValue::Text(n.to_string())]).collect()));
        }
        assert_eq!(sql, catalog::COLUMNS_QUERY);
        let data = match &params[0] {
            RemoteValue::Text(t) if t == "ORDERS" => vec![
                catalog_row("ID", 8, 0, None, true),
                catalog_row("NOTE", 37, 0, Some(80), false),
            ],
            RemoteValue::Text(t) if t == "EVENTS" => vec![catalog_row("AT", 28, 0, None, false)],
            _ => vec![catalog_row("Flag", 23, 0, None, false)],
        };
        Ok(rows(&[], data))
    });
    let rt = runtime(&remote);
    let (server, user) = (common::server(), common::user());

    let options = ImportOptions::default();
    let first = rt.import_schema(&server, &user, &ImportFilter::All, &options, 1).await.unwrap();
    let second = rt.import_schema(&server, &user, &ImportFilter::All, &options, 1).await.unwrap();
    assert_eq!(first, second);

    let names: Vec<_> = first.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["MixedT", "orders"]);
    assert_eq!(first.skipped.len(), 1);
    assert_eq!(first.skipped[0].remote_name, "EVENTS");

    let orders = &first.tables[1];
    assert_eq!(
        orders.to_ddl("public", "fb"),
        "CREATE FOREIGN TABLE public.orders (\n\tid integer NOT NULL,\n\tnote varchar(80)\n) SERVER fb"
    );
    let table = orders.to_foreign_table().unwrap();
    assert_eq!(table.columns.len(), 2);
    assert!(!table.columns[0].nullable);

    let limited = rt
        .import_schema(&server, &user, &ImportFilter::LimitTo(vec!["orders".into()]), &options, 1)
        .await
        .unwrap();
    assert_eq!(limited.tables.len(), 1);
    assert!(limited.skipped.is_empty());
}
