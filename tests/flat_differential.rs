//! Differential properties: the flat evaluator must agree with the native
//! evaluator on every document, for `$` and every path that starts with a
//! key.
use jsonpath_engine::flat_eval::{FlatField, FlatSchema, FlatType, JsonFlattener};
use jsonpath_engine::functions;
use jsonpath_engine::{FragmentContext, FunctionStateScope, JsonColumn, PathArg, Value, compile};
use proptest::prelude::*;

const KEYS: &[&str] = &["a", "b", "c", "k.1", "name"];

fn key() -> impl Strategy<Value = String> {
    prop::sample::select(KEYS).prop_map(str::to_string)
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        (-1_000_000i32..1_000_000, 1u8..4).prop_map(|(n, d)| Value::Double(n as f64 / d as f64)),
        prop::collection::vec(any::<char>(), 0..6)
            .prop_map(|chars| Value::String(chars.into_iter().collect())),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::vec((key(), inner), 0..4).prop_map(Value::Object),
        ]
    })
}

fn document() -> impl Strategy<Value = Value> {
    prop::collection::vec((key(), value()), 0..6).prop_map(Value::Object)
}

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => key().prop_map(|k| if k.contains('.') { format!(".\"{k}\"") } else { format!(".{k}") }),
        2 => (0usize..3).prop_map(|i| format!("[{i}]")),
        1 => Just("[*]".to_string()),
        1 => (0usize..3, 0usize..4).prop_map(|(s, e)| format!("[{s}:{e}]")),
    ]
}

/// A key-first path or the whole document.
fn flat_path() -> impl Strategy<Value = String> {
    prop_oneof![
        1 => Just("$".to_string()),
        4 => key_first_path(),
    ]
}

/// `$.<key>` followed by up to three arbitrary segments.
fn key_first_path() -> impl Strategy<Value = String> {
    (key(), prop::collection::vec(segment(), 0..4)).prop_map(|(first, rest)| {
        let mut path = String::from("$");
        if first.contains('.') {
            path.push_str(&format!(".\"{first}\""));
        } else {
            path.push_str(&format!(".{first}"));
        }
        rest.iter().for_each(|s| path.push_str(s));
        path
    })
}

fn flat_type() -> impl Strategy<Value = FlatType> {
    prop::sample::select(vec![
        FlatType::Json,
        FlatType::Bigint,
        FlatType::Double,
        FlatType::Varchar,
        FlatType::Boolean,
    ])
}

fn schema() -> impl Strategy<Value = Vec<FlatField>> {
    prop::collection::btree_map(key(), flat_type(), 0..4)
        .prop_map(|fields| fields.into_iter().map(|(k, t)| FlatField::new(k, t)).collect())
}

fn query_all(json: &JsonColumn, path: &str) -> Vec<Option<Value>> {
    let mut ctx = FragmentContext::default();
    let path = PathArg::path(path);
    ctx.prepare(FunctionStateScope::FragmentLocal, &path).unwrap();
    let out = functions::json_query(&mut ctx, json, &path).unwrap();
    ctx.close(FunctionStateScope::FragmentLocal).unwrap();
    out
}

fn columns(docs: &[Value], fields: Vec<FlatField>) -> (JsonColumn, JsonColumn) {
    let flat = JsonFlattener::new(FlatSchema::new(fields, true).unwrap())
        .flatten(docs.iter().map(Some));
    let native = JsonColumn::Native(docs.iter().cloned().map(Some).collect());
    (JsonColumn::Flat(flat), native)
}

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: 512,
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

proptest! {
    #![proptest_config(config())]

    #[test]
    fn flat_matches_native(
        docs in prop::collection::vec(document(), 1..6),
        fields in schema(),
        path in flat_path(),
    ) {
        let (flat, native) = columns(&docs, fields);
        prop_assert_eq!(query_all(&flat, &path), query_all(&native, &path), "path {}", path);
    }

    #[test]
    fn flat_root_is_the_document(
        docs in prop::collection::vec(document(), 1..4),
        fields in schema(),
    ) {
        let (flat, native) = columns(&docs, fields);
        let expected: Vec<Option<Value>> = docs.iter().cloned().map(Some).collect();
        prop_assert_eq!(query_all(&flat, "$"), expected);

        let mut ctx = FragmentContext::default();
        prop_assert_eq!(
            functions::json_keys(&mut ctx, &flat, None).unwrap(),
            functions::json_keys(&mut ctx, &native, None).unwrap()
        );
        prop_assert_eq!(
            functions::json_length(&mut ctx, &flat, None).unwrap(),
            functions::json_length(&mut ctx, &native, None).unwrap()
        );
        prop_assert_eq!(
            functions::get_json_string(&mut ctx, &flat, &PathArg::path("$")).unwrap(),
            functions::get_json_string(&mut ctx, &native, &PathArg::path("$")).unwrap()
        );
    }

    #[test]
    fn canonical_text_parses_back(v in value()) {
        let text = v.to_string();
        prop_assert_eq!(Value::parse(&text).unwrap(), v, "text {}", text);
    }

    #[test]
    fn program_display_compiles_to_the_same_tokens(path in key_first_path()) {
        let program = compile(&path).unwrap();
        let again = compile(&program.to_string()).unwrap();
        prop_assert_eq!(again.tokens(), program.tokens());
    }
}
