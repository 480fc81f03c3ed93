//! Prints a schema value as a TypeScript object-literal expression.
use serde_json::Value;

/// `{ "$ref": "root#/definitions/A" }`. Keys are always quoted so `$ref`
/// and arbitrary property names survive as-is.
pub fn expression(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&string_literal(s)),
        Value::Array(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            if map.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push_str("{ ");
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&string_literal(key));
                out.push_str(": ");
                write_value(item, out);
            }
            out.push_str(" }");
        }
    }
}

/// JSON string syntax, minus the two line terminators JS string literals reject.
fn string_literal(s: &str) -> String {
    Value::from(s).to_string().replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029")
}
