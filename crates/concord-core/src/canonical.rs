//! Deterministic JSON emission.
//!
//! Hashes in this crate are only reproducible given a stable serializer, so
//! canonical bytes are produced by an explicit writer rather than whatever a
//! generic serializer happens to emit:
//!
//! - no insignificant whitespace;
//! - strings use minimal escaping (only `"`, `\`, and control characters
//!   below U+0020);
//! - numbers render through `serde_json`'s shortest-round-trip formatter;
//! - *fixed-order* objects ([`CanonicalObject`]) emit fields in the order
//!   the protocol defines them, while any nested free-form values emit
//!   object keys sorted lexicographically.
//!
//! Absent optional fields are emitted as `null` so the field count of a
//! canonical object never varies.

use std::fmt::Write as _;

use serde_json::{Map, Value};

/// Builder for a canonical JSON object with caller-defined field order.
///
/// Field order is the call order; nested objects inside field values are
/// emitted with sorted keys.
#[derive(Debug)]
pub struct CanonicalObject {
    buf: String,
    any: bool,
}

impl Default for CanonicalObject {
    fn default() -> Self {
        Self::new()
    }
}

impl CanonicalObject {
    /// Starts an empty object.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: String::from("{"),
            any: false,
        }
    }

    /// Appends a field holding an arbitrary JSON value.
    #[must_use]
    pub fn field(mut self, name: &str, value: &Value) -> Self {
        self.separator();
        emit_string(name, &mut self.buf);
        self.buf.push(':');
        emit_value(value, &mut self.buf);
        self
    }

    /// Appends a string field.
    #[must_use]
    pub fn str_field(self, name: &str, value: &str) -> Self {
        self.field(name, &Value::String(value.to_owned()))
    }

    /// Appends an optional string field, `null` when absent.
    #[must_use]
    pub fn opt_str_field(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(s) => self.str_field(name, s),
            None => self.field(name, &Value::Null),
        }
    }

    /// Appends an unsigned integer field.
    #[must_use]
    pub fn u64_field(self, name: &str, value: u64) -> Self {
        self.field(name, &Value::Number(value.into()))
    }

    /// Appends a float field.
    ///
    /// Non-finite values degrade to `null`; the core clamps confidences to
    /// `[0, 1]` before they reach this point.
    #[must_use]
    pub fn f64_field(self, name: &str, value: f64) -> Self {
        let number = serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number);
        self.field(name, &number)
    }

    /// Appends a field whose value is already canonical JSON text.
    #[must_use]
    pub fn raw_field(mut self, name: &str, canonical: &str) -> Self {
        self.separator();
        emit_string(name, &mut self.buf);
        self.buf.push(':');
        self.buf.push_str(canonical);
        self
    }

    /// Finishes the object and returns its canonical text.
    #[must_use]
    pub fn finish(mut self) -> String {
        self.buf.push('}');
        self.buf
    }

    fn separator(&mut self) {
        if self.any {
            self.buf.push(',');
        }
        self.any = true;
    }
}

/// Emits an arbitrary value in canonical form (sorted object keys).
#[must_use]
pub fn canonical_value(value: &Value) -> String {
    let mut buf = String::new();
    emit_value(value, &mut buf);
    buf
}

fn emit_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        },
        Value::String(s) => emit_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                emit_value(item, out);
            }
            out.push(']');
        },
        Value::Object(map) => emit_object(map, out),
    }
}

fn emit_object(map: &Map<String, Value>, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    out.push('{');
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        emit_string(key, out);
        out.push(':');
        emit_value(&map[key.as_str()], out);
    }
    out.push('}');
}

/// Minimal escaping: `"`, `\`, short escapes for common controls, `\uXXXX`
/// for the rest of U+0000..U+001F.
fn emit_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c < '\u{0020}' => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            },
            c => out.push(c),
        }
    }
    out.push('"');
}
