//! Stable serialization.
//!
//! Produces one canonical string per logical JSON value: object keys are
//! sorted at every depth, arrays keep their order, `null` stays `null`.
//! Absent values never reach this layer; `Option::None` fields are
//! skipped at serialization time, so they are omitted rather than
//! written as `null`.
//!
//! Fingerprints and the structural diff both compare values through this
//! function, so its output must not depend on map implementation or key
//! insertion order. Numbers compare by value: an integral float such as
//! `1.0` is written as `1`.

use crate::error::Result;
use serde::Serialize;
use serde_json::{Number, Value};

/// Largest magnitude at which every integer is exactly representable as f64.
const MAX_EXACT_F64_INT: f64 = 9_007_199_254_740_992.0;

/// Canonical string for a JSON value.
pub fn stable_serialize(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Canonical string for any serializable value.
pub fn stable_serialize_of<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    Ok(stable_serialize(&value))
}

/// Canonical form of an optional value. `None` is the absent marker and
/// is distinct from every serialized value, `null` included.
pub(crate) fn stable_serialize_opt(value: Option<&Value>) -> Option<String> {
    value.map(stable_serialize)
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::String(s) => write_string(s, out),
        Value::Number(n) => write_number(n, out),
        // null and booleans have a single compact rendering
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_number(n: &Number, out: &mut String) {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < MAX_EXACT_F64_INT => {
            out.push_str(&(f as i64).to_string());
        }
        _ => out.push_str(&n.to_string()),
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push_str(&Value::from(s).to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn test_orders_object_keys_at_every_depth() {
        let value = json!({
            "z": 1,
            "a": {"d": 4, "b": 2},
            "arr": [{"k2": 2, "k1": 1}],
        });
        assert_eq!(
            stable_serialize(&value),
            r#"{"a":{"b":2,"d":4},"arr":[{"k1":1,"k2":2}],"z":1}"#
        );
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let mut a = Map::new();
        a.insert("title".into(), json!("Widget"));
        a.insert("price".into(), json!(19.99));
        a.insert("meta".into(), json!({"y": [3, 2, 1], "x": null}));

        let mut b = Map::new();
        b.insert("meta".into(), json!({"x": null, "y": [3, 2, 1]}));
        b.insert("price".into(), json!(19.99));
        b.insert("title".into(), json!("Widget"));

        assert_eq!(
            stable_serialize(&Value::Object(a)),
            stable_serialize(&Value::Object(b))
        );
    }

    #[test]
    fn test_arrays_keep_order_and_null_is_kept() {
        assert_eq!(stable_serialize(&json!([2, 1, null])), "[2,1,null]");
        assert_ne!(
            stable_serialize(&json!(["a", "b"])),
            stable_serialize(&json!(["b", "a"]))
        );
    }

    #[test]
    fn test_none_fields_are_omitted() {
        #[derive(Serialize)]
        struct Partial {
            #[serde(skip_serializing_if = "Option::is_none")]
            missing: Option<u32>,
            present: Option<u32>,
        }
        let s = stable_serialize_of(&Partial {
            missing: None,
            present: None,
        })
        .unwrap();
        assert_eq!(s, r#"{"present":null}"#);
    }

    #[test]
    fn test_integral_floats_match_integers() {
        assert_eq!(stable_serialize(&json!({"n": 1.0})), stable_serialize(&json!({"n": 1})));
        assert_eq!(stable_serialize(&json!([-0.0, 20.0, 19.99])), "[0,20,19.99]");
        assert_eq!(stable_serialize(&json!(1e300)), json!(1e300).to_string());
        assert_ne!(stable_serialize(&json!(1.5)), stable_serialize(&json!(1)));
    }

    #[test]
    fn test_strings_are_escaped() {
        assert_eq!(stable_serialize(&json!({"q\"k": "a\nb"})), r#"{"q\"k":"a\nb"}"#);
    }
}
