// Copyright (c) 2019 King's College London created by the Software Development Team
// <http://soft-dev.org/>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, or the UPL-1.0 license <http://opensource.org/licenses/UPL>
// at your option. This file may not be copied, modified, or distributed except according to those
// terms.

//! The recipe variable store and `${name}` interpolation.

use std::collections::HashMap;

/// Recipe variables for one harness run. Names are lowercased on the way in
/// and on lookup, so `${DIR}` and `${dir}` refer to the same value.
pub(crate) struct VarStore {
    map: HashMap<String, String>,
}

impl VarStore {
    pub fn new() -> Self {
        let mut map = HashMap::new();
        map.insert("dir".to_owned(), ".emperfect".to_owned());
        map.insert("debug".to_owned(), "false".to_owned());
        map.insert("log".to_owned(), "Log.txt".to_owned());
        VarStore { map }
    }

    pub fn set(&mut self, key: &str, val: &str) {
        self.map.insert(key.to_lowercase(), val.to_owned());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(&key.to_lowercase()).map(|x| x.as_str())
    }

    /// Parse a comma-separated `key=value` argument tail, assigning each pair
    /// into the store. Returns the keys set by this call, in order, so that
    /// callers can validate them against a directive's recognized set.
    pub fn load_vars(&mut self, args: &str) -> Vec<String> {
        let mut set_keys = Vec::new();
        for (key, val) in parse_arg_list(args) {
            self.map.insert(key.clone(), val);
            set_keys.push(key);
        }
        set_keys
    }

    /// Replace every `${name}` in `line` with the stored value,
    /// concatenating surrounding text verbatim.
    pub fn apply_vars(&self, line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let mut rest = line;
        while let Some(idx) = rest.find("${") {
            out.push_str(&rest[..idx]);
            let after = &rest[idx + 2..];
            let close = after.find('}').unwrap_or_else(|| {
                panic!("Variable use without a closing '}}' on line:\n  {}", line)
            });
            let name = after[..close].to_lowercase();
            match self.map.get(&name) {
                Some(val) => out.push_str(val),
                None => panic!("Unknown variable '${{{}}}' on line:\n  {}", name, line),
            }
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        out
    }
}

/// Split a directive's argument tail into `(key, value)` pairs. Keys are
/// lowercased; values may be bare or double-quoted, and commas inside quotes
/// do not split.
pub(crate) fn parse_arg_list(args: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for field in split_commas(args) {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        let eq = field.find('=').unwrap_or_else(|| {
            panic!("Malformed argument '{}' (expected key=value).", field)
        });
        let key = field[..eq].trim().to_lowercase();
        let val = unquote(field[eq + 1..].trim());
        pairs.push((key, val));
    }
    pairs
}

/// Split at commas which are not inside a double-quoted string.
fn split_commas(args: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut start = 0;
    let mut in_str = false;
    let mut escaped = false;
    for (i, c) in args.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_str => escaped = true,
            '"' => in_str = !in_str,
            ',' if !in_str => {
                fields.push(&args[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(&args[start..]);
    fields
}

/// Strip surrounding double quotes, processing the standard escapes. Bare
/// values are returned as-is.
fn unquote(raw: &str) -> String {
    if raw.len() < 2 || !raw.starts_with('"') || !raw.ends_with('"') {
        return raw.to_owned();
    }
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_value_round_trip() {
        let mut vars = VarStore::new();
        let keys = vars.load_vars("k=\"v, w\"");
        assert_eq!(keys, vec!["k"]);
        assert_eq!(vars.apply_vars("${k}"), "v, w");
    }

    #[test]
    fn test_load_vars_multiple() {
        let mut vars = VarStore::new();
        let keys = vars.load_vars("Name=\"Test one\", points=5, args=\"a b\"");
        assert_eq!(keys, vec!["name", "points", "args"]);
        assert_eq!(vars.get("name"), Some("Test one"));
        assert_eq!(vars.get("points"), Some("5"));
    }

    #[test]
    fn test_apply_vars_mixed_text() {
        let mut vars = VarStore::new();
        vars.set("exe", "out/Test3.exe");
        assert_eq!(
            vars.apply_vars("timeout 5 ${exe} > ${dir}/x"),
            "timeout 5 out/Test3.exe > .emperfect/x"
        );
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let vars = VarStore::new();
        assert_eq!(vars.apply_vars("${DIR}"), ".emperfect");
    }

    #[test]
    fn test_escapes_in_quoted_values() {
        let mut vars = VarStore::new();
        vars.load_vars("msg=\"a \\\"b\\\"\\n\"");
        assert_eq!(vars.get("msg"), Some("a \"b\"\n"));
    }

    #[test]
    #[should_panic(expected = "Unknown variable")]
    fn test_unknown_variable_is_fatal() {
        VarStore::new().apply_vars("x ${nosuch} y");
    }

    #[test]
    #[should_panic(expected = "closing '}'")]
    fn test_unterminated_use_is_fatal() {
        VarStore::new().apply_vars("x ${dir");
    }

    #[test]
    #[should_panic(expected = "expected key=value")]
    fn test_malformed_argument_is_fatal() {
        VarStore::new().load_vars("just_a_key");
    }
}
