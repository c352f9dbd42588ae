//! Property tests for metadata flattening and query bounds

use forest_store::{
    flatten_json, LocalProvider, MetadataValue, QueryOptions, VectorProvider,
};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-z ]{0,12}".prop_map(Value::String),
    ]
}

fn field_value() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(2, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn object() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map("[a-z]{1,6}", field_value(), 0..8)
        .prop_map(|m| m.into_iter().collect())
}

fn vector() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-1.0f32..1.0, 3)
        .prop_filter("non-zero", |v| v.iter().any(|x| x.abs() > 1e-3))
}

proptest! {
    #[test]
    fn flattening_drops_nulls_and_stringifies_composites(input in object()) {
        let flat = flatten_json(&Value::Object(input.clone()));

        for (key, value) in &input {
            match value {
                Value::Null => prop_assert!(!flat.contains_key(key)),
                Value::Array(_) | Value::Object(_) => {
                    let Some(MetadataValue::Composite(text)) = flat.get(key) else {
                        return Err(TestCaseError::fail(format!("{} not composite", key)));
                    };
                    prop_assert_eq!(&serde_json::from_str::<Value>(text).unwrap(), value);
                }
                other => prop_assert_eq!(&flat[key].to_json(), other),
            }
        }
        prop_assert_eq!(
            flat.len(),
            input.values().filter(|v| !v.is_null()).count()
        );
    }

    #[test]
    fn query_respects_limit_threshold_and_order(
        records in prop::collection::vec(vector(), 1..20),
        query in vector(),
        limit in 0usize..8,
        threshold in -1.0f32..1.0,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let results = runtime.block_on(async {
            let provider = LocalProvider::in_memory();
            provider.initialize("props").await.unwrap();
            for (i, v) in records.iter().enumerate() {
                provider
                    .upsert_vector(&format!("p:{}", i), v, Default::default())
                    .await
                    .unwrap();
            }
            let options = QueryOptions::new().with_limit(limit).with_threshold(threshold);
            provider.query_vectors(&query, &options).await.unwrap()
        });

        prop_assert!(results.len() <= limit);
        prop_assert!(results.iter().all(|m| m.similarity >= threshold));
        prop_assert!(results
            .windows(2)
            .all(|w| w[0].similarity >= w[1].similarity));
    }
}

#[test]
fn flattening_matches_the_documented_example() {
    let flat = flatten_json(&json!({
        "a": [1, 2, 3],
        "b": {"k": "v"},
        "c": null,
        "d": "x"
    }));
    assert_eq!(flat.len(), 3);
    assert_eq!(flat["a"], MetadataValue::Composite("[1,2,3]".to_string()));
    assert_eq!(flat["b"], MetadataValue::Composite(r#"{"k":"v"}"#.to_string()));
    assert_eq!(flat["d"], MetadataValue::String("x".to_string()));
}
