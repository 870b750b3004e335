//! Program wrapper.
//!
//! The submitted script runs as the body of a function so its top-level
//! bindings can be read back with `locals()`, and any exception it raises is
//! caught and reported in the result envelope instead of killing the
//! interpreter. The envelope is written to stdout after a marker line:
//!
//! ```text
//! {"locals": {...}}            # the script ran to completion
//! {"error": "message"}         # the script raised
//! ```
//!
//! Names carried over from earlier runs are declared `global` in that
//! function, so a script can update them (`total += 1`) as well as read them.
//!
//! Locals that are not JSON-shaped (modules, functions, sets, ...) come back
//! as `{"__agentflow_unsupported__": "<type name>"}`.

/// Marker line separating the script's own stdout from the result envelope.
pub const RESULT_MARKER: &str = "__AGENTFLOW_RESULT__";

/// Key tagging a local that could not be encoded.
pub const UNSUPPORTED_TAG: &str = "__agentflow_unsupported__";

const INDENT: &str = "        ";

/// Wrap `script` so it runs inside the capture function, with `shared`
/// names bound at module level.
pub fn wrap(script: &str, shared: &[&str]) -> String {
    let globals = if shared.is_empty() {
        String::new()
    } else {
        format!("    global {}\n", shared.join(", "))
    };

    let mut body = String::new();
    for line in script.trim().lines() {
        if line.trim().is_empty() {
            body.push('\n');
        } else {
            body.push_str(INDENT);
            body.push_str(line);
            body.push('\n');
        }
    }

    format!(
        r#"
def __agentflow_execute():
{globals}    try:
{body}        return {{"locals": locals()}}
    except Exception as e:
        return {{"error": str(e)}}


def __agentflow_plain(value, depth=0):
    if depth > 32:
        raise TypeError("nested too deeply")
    if value is None or isinstance(value, (bool, int, str)):
        return value
    if isinstance(value, float):
        if value != value or value in (float("inf"), float("-inf")):
            raise TypeError("float")
        return value
    if isinstance(value, (list, tuple)):
        return [__agentflow_plain(v, depth + 1) for v in value]
    if isinstance(value, dict):
        out = {{}}
        for k, v in value.items():
            if not isinstance(k, str):
                raise TypeError("dict")
            out[k] = __agentflow_plain(v, depth + 1)
        return out
    raise TypeError(type(value).__name__)


def __agentflow_encode(envelope):
    if "error" in envelope:
        return envelope
    encoded = {{}}
    for name, value in envelope["locals"].items():
        try:
            encoded[name] = __agentflow_plain(value)
        except TypeError:
            encoded[name] = {{"{UNSUPPORTED_TAG}": type(value).__name__}}
    return {{"locals": encoded}}


import json as __agentflow_json
import sys as __agentflow_sys

__agentflow_envelope = __agentflow_encode(__agentflow_execute())
__agentflow_sys.stdout.write("\n{RESULT_MARKER}\n")
__agentflow_sys.stdout.write(__agentflow_json.dumps(__agentflow_envelope))
__agentflow_sys.stdout.write("\n")
__agentflow_sys.stdout.flush()
"#
    )
}

/// Assemble the full program: snapshot prelude followed by the wrapped script.
pub fn program(prelude: &str, script: &str, shared: &[&str]) -> String {
    format!("{prelude}\n{}", wrap(script, shared))
}

/// Split captured stdout into the script's own output and the envelope text.
pub fn split_output(stdout: &str) -> (&str, Option<&str>) {
    let marker = format!("\n{RESULT_MARKER}\n");
    match stdout.rfind(&marker) {
        Some(at) => (&stdout[..at], Some(stdout[at + marker.len()..].trim())),
        None => (stdout, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_is_indented_into_function_body() {
        let wrapped = wrap("x = 1\nprint(x)", &[]);
        assert!(wrapped.contains("    try:\n        x = 1\n        print(x)\n        return {\"locals\": locals()}"));
        assert!(wrapped.contains("except Exception as e:"));
    }

    #[test]
    fn shared_names_are_declared_global() {
        let wrapped = wrap("total += 2", &["lookup", "total"]);
        assert!(wrapped.contains(
            "def __agentflow_execute():\n    global lookup, total\n    try:\n        total += 2\n"
        ));
    }

    #[test]
    fn no_global_statement_without_shared_names() {
        assert!(!wrap("x = 1", &[]).contains("global"));
    }

    #[test]
    fn blank_lines_stay_blank() {
        let wrapped = wrap("a = 1\n\nb = 2", &[]);
        assert!(wrapped.contains("        a = 1\n\n        b = 2\n"));
    }

    #[test]
    fn empty_script_still_returns_locals() {
        let wrapped = wrap("   ", &[]);
        assert!(wrapped.contains("    try:\n        return {\"locals\": locals()}"));
    }

    #[test]
    fn split_finds_last_marker() {
        let stdout = format!("hello\nworld\n{RESULT_MARKER}\n{{\"locals\": {{}}}}\n");
        let (out, envelope) = split_output(&stdout);
        assert_eq!(out, "hello\nworld");
        assert_eq!(envelope, Some("{\"locals\": {}}"));
    }

    #[test]
    fn split_without_marker_returns_everything() {
        let (out, envelope) = split_output("partial output");
        assert_eq!(out, "partial output");
        assert!(envelope.is_none());
    }

    #[test]
    fn program_places_prelude_first() {
        let full = program("city = \"Tokyo\"\n", "print(city)", &["city"]);
        assert!(full.starts_with("city = \"Tokyo\"\n"));
        assert!(full.find("def __agentflow_execute").unwrap() > full.find("city =").unwrap());
    }
}
