use super::*;
use crate::mock::{MockConnection, MockRoutine};
use pretty_assertions::assert_eq;

fn connection() -> MockConnection {
    MockConnection::new(vec![
        MockRoutine::scalar("test_returns_integer", "int4", vec![Value::Int32(42)]),
        MockRoutine::scalar("test_returns_setof_integer", "int4", vec![]).setof(),
        MockRoutine::scalar("add", "int8", vec![]).nargs(2),
        MockRoutine::composite(
            "test_returns_composite",
            vec![("a", "int4"), ("b", "text")],
            vec![],
        ),
    ])
}

#[tokio::test]
async fn test_scalar_routine_needs_one_lookup() {
    let conn = connection();
    let shape = classify(&conn, "tests", "test_returns_integer", 0).await.unwrap();

    assert!(shape.is_scalar());
    assert!(!shape.is_set());
    assert_eq!(shape.scalar_type_name(), Some("int4"));
    assert!(shape.field_names().is_empty());
    assert_eq!(conn.statements(), vec![SCALAR_RETURN_QUERY.to_string()]);
}

#[tokio::test]
async fn test_setof_scalar() {
    let conn = connection();
    let shape = classify(&conn, "tests", "test_returns_setof_integer", 0).await.unwrap();
    assert!(shape.is_scalar() && shape.is_set());
    assert_eq!(shape.describe(), "a set of scalars");
}

#[tokio::test]
async fn test_composite_falls_through_to_second_lookup() {
    let conn = connection();
    let shape = classify(&conn, "tests", "test_returns_composite", 0).await.unwrap();

    assert!(!shape.is_scalar());
    assert_eq!(shape.scalar_type_name(), None);
    assert_eq!(shape.field_names(), vec!["a", "b"]);
    assert_eq!(shape.field_type_names(), vec!["int4", "text"]);
    assert_eq!(
        conn.statements(),
        vec![
            SCALAR_RETURN_QUERY.to_string(),
            COMPOSITE_RETURN_QUERY.to_string()
        ]
    );
}

#[tokio::test]
async fn test_argument_count_must_match() {
    let conn = connection();
    assert!(classify(&conn, "tests", "add", 2).await.is_ok());

    let err = classify(&conn, "tests", "add", 1).await.unwrap_err();
    match err {
        PgProcError::ProcedureNotFound {
            schema,
            name,
            nargs,
        } => {
            assert_eq!(schema, "tests");
            assert_eq!(name, "add");
            assert_eq!(nargs, 1);
        }
        other => panic!("expected ProcedureNotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_routine_runs_both_lookups() {
    let conn = connection();
    let err = classify(&conn, "tests", "unknown_function", 0).await.unwrap_err();
    assert!(matches!(err, PgProcError::ProcedureNotFound { .. }));
    assert_eq!(conn.statement_count(), 2);
}

#[tokio::test]
async fn test_failed_lookup_is_reported_as_not_found() {
    let conn = MockConnection::failing_catalog();
    let err = classify(&conn, "tests", "test_returns_integer", 0).await.unwrap_err();
    assert!(matches!(err, PgProcError::ProcedureNotFound { .. }));
    assert_eq!(conn.statement_count(), 1);
}

#[test]
fn test_lookups_filter_on_type_kind_and_arity() {
    assert!(SCALAR_RETURN_QUERY.contains("typtype IN ('b', 'p', 'e')"));
    assert!(COMPOSITE_RETURN_QUERY.contains("typtype IN ('c')"));
    for query in [SCALAR_RETURN_QUERY, COMPOSITE_RETURN_QUERY] {
        assert!(query.contains("pronargs = $3"));
        assert!(query.contains("proretset"));
    }
    assert!(COMPOSITE_RETURN_QUERY.contains("ORDER BY attnum"));
}

#[test]
fn test_shape_describe() {
    let record = RoutineShape {
        returns_set: true,
        kind: ReturnKind::Composite { fields: vec![] },
    };
    assert_eq!(record.describe(), "a set of records");
    assert!(record.field_type_names().is_empty());
}
