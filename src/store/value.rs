//! Firestore REST typed values.
//!
//! Firestore does not take plain JSON: every value is wrapped in an object
//! naming its type, and 64-bit integers travel as decimal strings.

use serde_json::{json, Map, Value};

use super::Fields;

pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or(0.0) })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({ "mapValue": { "fields": encode_map(map) } }),
    }
}

fn encode_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect()
}

/// Request body for a document write.
pub fn encode_document(fields: &Fields) -> Value {
    json!({ "fields": encode_map(fields) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars() {
        assert_eq!(encode_value(&json!(null)), json!({"nullValue": null}));
        assert_eq!(encode_value(&json!(true)), json!({"booleanValue": true}));
        assert_eq!(encode_value(&json!(2020)), json!({"integerValue": "2020"}));
        assert_eq!(encode_value(&json!(-15)), json!({"integerValue": "-15"}));
        assert_eq!(encode_value(&json!(0.25)), json!({"doubleValue": 0.25}));
        assert_eq!(encode_value(&json!("SP")), json!({"stringValue": "SP"}));
    }

    #[test]
    fn test_document_body() {
        let fields = json!({"uf": "São Paulo", "saldo": 10})
            .as_object()
            .cloned()
            .unwrap();
        let body = encode_document(&fields);
        assert_eq!(body["fields"]["uf"], json!({"stringValue": "São Paulo"}));
        assert_eq!(body["fields"]["saldo"], json!({"integerValue": "10"}));
    }

    #[test]
    fn test_nested_values() {
        let v = encode_value(&json!({"faixas": [1, "a"]}));
        assert_eq!(
            v["mapValue"]["fields"]["faixas"]["arrayValue"]["values"][1],
            json!({"stringValue": "a"})
        );
    }
}
