//! IR documents as the planner hands them over: JSON in, typed tree out.

use relq_ir::{DataType, Expr, InValues, Projection, Select, Table, TableId, Value};

const USERS_BY_AGE: &str = include_str!("../../../demos/users_by_age.json");

#[test]
fn test_parse_demo_query() {
    let select: Select = serde_json::from_str(USERS_BY_AGE).unwrap();

    match &select.table {
        Some(Table::Base { id, name, alias, .. }) => {
            assert_eq!(*id, TableId(0));
            assert_eq!(name, "Users");
            assert_eq!(alias, "u");
        }
        other => panic!("unexpected table {:?}", other),
    }

    match &select.predicate {
        Some(Expr::In {
            values: InValues::Dynamic { expr },
            ..
        }) => assert_eq!(
            expr.ty(),
            DataType::Collection(Box::new(DataType::Int32))
        ),
        other => panic!("unexpected predicate {:?}", other),
    }

    assert!(select.offset.is_some());
    assert!(select.limit.is_none());
    assert!(!select.distinct);
}

#[test]
fn test_projection_type_from_json() {
    let select: Select = serde_json::from_str(USERS_BY_AGE).unwrap();
    let ty = select.projection.ty();

    assert_eq!(ty.find_field("Name").map(|f| &f.data_type), Some(&DataType::String));
    assert_eq!(ty.find_field("IsAdult").map(|f| &f.data_type), Some(&DataType::Bool));
}

#[test]
fn test_constant_value_encoding() {
    let json = r#"{ "type": "Constant", "value": { "string": "O'Brien" }, "ty": "String" }"#;
    let expr: Expr = serde_json::from_str(json).unwrap();
    assert_eq!(expr, Expr::string("O'Brien"));

    let null = r#"{ "type": "Constant", "value": "null", "ty": "Int32" }"#;
    let expr: Expr = serde_json::from_str(null).unwrap();
    assert!(matches!(expr, Expr::Constant { value: Value::Null, .. }));
}

#[test]
fn test_fingerprint_ignores_formatting() {
    let select: Select = serde_json::from_str(USERS_BY_AGE).unwrap();
    let compact = serde_json::to_string(&select).unwrap();
    let reparsed: Select = serde_json::from_str(&compact).unwrap();

    assert_eq!(select.fingerprint(), reparsed.fingerprint());
    assert!(matches!(reparsed.projection, Projection::Server { .. }));
}
