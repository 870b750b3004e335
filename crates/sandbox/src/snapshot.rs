//! Snapshot of host bindings into self-contained program text.
//!
//! Nothing crosses the isolation boundary except source code, so every
//! binding is re-materialized: callables by their definition source, plain
//! values as Python literals. Only JSON-shaped values are accepted; anything
//! that cannot be rendered fails the whole snapshot instead of producing a
//! half-built namespace.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// Literals nested deeper than this are rejected before they reach the parser.
pub const MAX_LITERAL_DEPTH: usize = 64;

/// Prefix reserved for names the wrapper itself defines.
pub const RESERVED_PREFIX: &str = "__agentflow";

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise",
    "return", "try", "while", "with", "yield",
];

/// A name made available inside the sandbox.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// A plain value, rendered as a literal.
    Value(Value),
    /// A callable, rendered from its definition source.
    Callable { source: String },
}

/// Ordered bindings keyed by name.
pub type Bindings = BTreeMap<String, Binding>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SnapshotError {
    #[error("'{0}' is not a valid binding name")]
    InvalidName(String),

    #[error("binding '{name}' nests too deeply to render")]
    TooDeep { name: String },

    #[error("callable '{name}' has no source definition")]
    MissingSource { name: String },
}

/// Whether `name` can be bound at the top level of a program.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !PYTHON_KEYWORDS.contains(&name)
        && !name.starts_with(RESERVED_PREFIX)
}

/// Render every binding as program text: callables first, then values.
pub fn render(bindings: &Bindings) -> Result<String, SnapshotError> {
    let mut callables = String::new();
    let mut values = String::new();

    for (name, binding) in bindings {
        if !is_valid_identifier(name) {
            return Err(SnapshotError::InvalidName(name.clone()));
        }
        match binding {
            Binding::Callable { source } => {
                if source.trim().is_empty() {
                    return Err(SnapshotError::MissingSource { name: name.clone() });
                }
                callables.push_str(source.trim_end());
                callables.push_str("\n\n");
            }
            Binding::Value(value) => {
                let mut literal = String::new();
                write_literal(name, value, 0, &mut literal)?;
                values.push_str(name);
                values.push_str(" = ");
                values.push_str(&literal);
                values.push('\n');
            }
        }
    }

    callables.push_str(&values);
    Ok(callables)
}

/// Render one JSON value as a Python literal.
pub fn literal(value: &Value) -> Result<String, SnapshotError> {
    let mut out = String::new();
    write_literal("<value>", value, 0, &mut out)?;
    Ok(out)
}

fn write_literal(
    name: &str,
    value: &Value,
    depth: usize,
    out: &mut String,
) -> Result<(), SnapshotError> {
    if depth > MAX_LITERAL_DEPTH {
        return Err(SnapshotError::TooDeep { name: name.to_string() });
    }
    match value {
        Value::Null => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Number(n) => out.push_str(&n.to_string()),
        // A JSON string literal is also a valid Python string literal.
        Value::String(s) => out.push_str(&Value::String(s.clone()).to_string()),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_literal(name, item, depth + 1, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push_str(": ");
                write_literal(name, item, depth + 1, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_render_as_python() {
        assert_eq!(literal(&json!(null)).unwrap(), "None");
        assert_eq!(literal(&json!(true)).unwrap(), "True");
        assert_eq!(literal(&json!(false)).unwrap(), "False");
        assert_eq!(literal(&json!(42)).unwrap(), "42");
        assert_eq!(literal(&json!(-1.5)).unwrap(), "-1.5");
    }

    #[test]
    fn strings_are_escaped() {
        let rendered = literal(&json!("line \"one\"\nline\\two")).unwrap();
        assert_eq!(rendered, r#""line \"one\"\nline\\two""#);
    }

    #[test]
    fn containers_render_recursively() {
        let rendered = literal(&json!({"city": "Tokyo", "temps": [21, 22.5, null], "ok": true})).unwrap();
        assert_eq!(rendered, r#"{"city": "Tokyo", "temps": [21, 22.5, None], "ok": True}"#);
    }

    #[test]
    fn callables_precede_values() {
        let mut bindings = Bindings::new();
        bindings.insert("answer".into(), Binding::Value(json!(42)));
        bindings.insert(
            "double".into(),
            Binding::Callable { source: "def double(x):\n    return x * 2\n".into() },
        );
        let program = render(&bindings).unwrap();
        assert!(program.starts_with("def double(x):"));
        assert!(program.ends_with("answer = 42\n"));
    }

    #[test]
    fn invalid_names_fail_fast() {
        for bad in ["1st", "with space", "class", "", "__agentflow_execute", "naïve"] {
            let mut bindings = Bindings::new();
            bindings.insert(bad.into(), Binding::Value(json!(1)));
            assert_eq!(render(&bindings), Err(SnapshotError::InvalidName(bad.into())), "{bad}");
        }
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("city_2"));
    }

    #[test]
    fn overly_deep_values_fail_fast() {
        let mut value = json!(0);
        for _ in 0..=MAX_LITERAL_DEPTH + 1 {
            value = json!([value]);
        }
        let mut bindings = Bindings::new();
        bindings.insert("deep".into(), Binding::Value(value));
        assert!(matches!(render(&bindings), Err(SnapshotError::TooDeep { .. })));
    }

    #[test]
    fn empty_callable_source_is_rejected() {
        let mut bindings = Bindings::new();
        bindings.insert("ghost".into(), Binding::Callable { source: "  ".into() });
        assert!(matches!(render(&bindings), Err(SnapshotError::MissingSource { .. })));
    }
}
