#![no_main]
use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use jsonpath_engine::eval::evaluate;
use jsonpath_engine::flat_eval::{FlatField, FlatPlan, FlatSchema, FlatType, JsonFlattener, evaluate_flat};
use jsonpath_engine::{EngineConfig, PathToken, Value};

const KEYS: &[&str] = &["a", "b", "c", "name", "x.y", ""];

const TYPES: &[FlatType] = &[
    FlatType::Json,
    FlatType::Bigint,
    FlatType::Double,
    FlatType::Varchar,
    FlatType::Boolean,
];

fn key(u: &mut Unstructured<'_>) -> arbitrary::Result<String> {
    Ok(KEYS[u.choose_index(KEYS.len())?].to_string())
}

fn value(u: &mut Unstructured<'_>, depth: usize) -> arbitrary::Result<Value> {
    let choice = if depth == 0 {
        u.int_in_range(0u8..=4)?
    } else {
        u.int_in_range(0u8..=6)?
    };
    Ok(match choice {
        0 => Value::Null,
        1 => Value::Bool(u.arbitrary()?),
        2 => Value::Int(u.arbitrary()?),
        3 => Value::Double(f64::from(u.arbitrary::<i16>()?) / 4.0),
        4 => Value::String(u.arbitrary()?),
        5 => {
            let len = u.int_in_range(0u8..=4)? as usize;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(value(u, depth - 1)?);
            }
            Value::Array(items)
        }
        _ => Value::Object(members(u, depth - 1)?),
    })
}

fn members(u: &mut Unstructured<'_>, depth: usize) -> arbitrary::Result<Vec<(String, Value)>> {
    let len = u.int_in_range(0u8..=5)? as usize;
    let mut entries = Vec::with_capacity(len);
    for _ in 0..len {
        entries.push((key(u)?, value(u, depth)?));
    }
    Ok(entries)
}

fn token(u: &mut Unstructured<'_>) -> arbitrary::Result<PathToken> {
    Ok(match u.int_in_range(0u8..=3)? {
        0 => PathToken::Key(key(u)?),
        1 => PathToken::Index(u.int_in_range(0usize..=4)?),
        2 => PathToken::Wildcard,
        _ => PathToken::Slice {
            start: u.arbitrary::<Option<u8>>()?.map(|n| usize::from(n % 5)),
            end: u.arbitrary::<Option<u8>>()?.map(|n| usize::from(n % 6)),
        },
    })
}

/// A batch of object rows, a schema with remainder, and either `$` or a
/// key-first path.
#[derive(Debug)]
struct FuzzInput {
    rows: Vec<Value>,
    fields: Vec<FlatField>,
    path: String,
}

impl<'a> Arbitrary<'a> for FuzzInput {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let count = u.int_in_range(1u8..=4)? as usize;
        let mut rows = Vec::with_capacity(count);
        for _ in 0..count {
            rows.push(Value::Object(members(u, 2)?));
        }

        let mut fields: Vec<FlatField> = Vec::new();
        for name in KEYS {
            if u.arbitrary()? {
                let ty = TYPES[u.choose_index(TYPES.len())?];
                fields.push(FlatField::new(*name, ty));
            }
        }

        let mut path = String::from("$");
        if u.ratio(4, 5)? {
            path.push_str(&PathToken::Key(key(u)?).to_string());
            for _ in 0..u.int_in_range(0u8..=3)? {
                path.push_str(&token(u)?.to_string());
            }
        }
        Ok(FuzzInput { rows, fields, path })
    }
}

fuzz_target!(|input: FuzzInput| {
    let Ok(program) = jsonpath_engine::compile(&input.path) else {
        return;
    };
    let Ok(schema) = FlatSchema::new(input.fields, true) else {
        return;
    };
    let column = JsonFlattener::new(schema).flatten(input.rows.iter().map(Some));
    let plan = FlatPlan::new(column.schema(), &program, &EngineConfig::default())
        .expect("`$` and key-first paths resolve against a schema with remainder");

    let mut scratch = Vec::new();
    for (row, doc) in input.rows.iter().enumerate() {
        let native = evaluate(&program, doc).map(|e| e.to_value());
        let flat = evaluate_flat(&column, &plan, row, &mut scratch).map(|e| e.to_value());
        assert_eq!(
            flat, native,
            "path={} row={row} doc={doc}",
            input.path
        );
    }
});
