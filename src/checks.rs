// Copyright (c) 2019 King's College London created by the Software Development Team
// <http://soft-dev.org/>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, or the UPL-1.0 license <http://opensource.org/licenses/UPL>
// at your option. This file may not be copied, modified, or distributed except according to those
// terms.

//! The check rewriter: find `CHECK(...)` / `CHECK_TYPE(...)` occurrences in
//! a test body and replace each with instrumented C++ that reports a
//! structured record at runtime. This is deliberately a shallow, textual
//! transformation: balanced-paren matching with string awareness and a
//! single operator scan, not a C++ parser.

use crate::codegen;
use crate::testcase::{Check, CheckKind};

/// The relational operators a `CHECK` may use, two-character forms first so
/// that e.g. `<=` is never seen as `<`.
const OPERATORS: &[&str] = &["==", "!=", "<=", ">=", "<", ">"];

/// Replace every check macro in `body` (already interpolated and joined)
/// with its instrumented form. Non-macro text is preserved byte-for-byte.
/// Returns the new body and the check records, ids contiguous in source
/// order.
pub(crate) fn rewrite_checks(body: &str, test_name: &str) -> (String, Vec<Check>) {
    let mut out = String::with_capacity(body.len() * 2);
    let mut checks: Vec<Check> = Vec::new();
    let mut pos = 0;
    while let Some((start, kind)) = find_macro(body, pos) {
        out.push_str(&body[pos..start]);
        let name_len = match kind {
            CheckKind::Assert => "CHECK".len(),
            CheckKind::TypeCompare => "CHECK_TYPE".len(),
        };
        let open = start + name_len + ws_len(&body[start + name_len..]);
        let close = find_close(body, open).unwrap_or_else(|| {
            panic!(
                "Unterminated check in test '{}' (body line {}).",
                test_name,
                line_of(body, start)
            )
        });
        let args = split_macro_args(&body[open + 1..close]);
        let check = build_check(checks.len(), kind, args, test_name, line_of(body, start));
        out.push_str(&codegen::emit_check(&check));
        checks.push(check);
        pos = close + 1;
    }
    out.push_str(&body[pos..]);
    (out, checks)
}

fn build_check(
    id: usize,
    kind: CheckKind,
    args: Vec<String>,
    test_name: &str,
    line: usize,
) -> Check {
    match kind {
        CheckKind::Assert => {
            let expr = args.first().map(|x| x.trim().to_owned()).unwrap_or_default();
            if expr.is_empty() {
                panic!("Empty CHECK in test '{}' (body line {}).", test_name, line);
            }
            if expr.contains("&&") || expr.contains("||") {
                panic!(
                    "CHECK in test '{}' (body line {}) may not contain '&&' or '||': {}",
                    test_name, line, expr
                );
            }
            let mut check = Check::new(id, kind, expr.clone());
            match find_operator(&expr, test_name, line) {
                Some((at, op)) => {
                    check.lhs = expr[..at].trim().to_owned();
                    check.comparator = op.to_owned();
                    check.rhs = expr[at + op.len()..].trim().to_owned();
                }
                None => check.lhs = expr,
            }
            check.msg_args = args[1..].iter().map(|x| x.trim().to_owned()).collect();
            check
        }
        CheckKind::TypeCompare => {
            if args.len() < 2 {
                panic!(
                    "CHECK_TYPE in test '{}' (body line {}) needs an expression and a type.",
                    test_name, line
                );
            }
            let lhs = args[0].trim().to_owned();
            // Re-join the tail so template types keep their commas.
            let rhs = args[1..]
                .iter()
                .map(|x| x.trim())
                .collect::<Vec<_>>()
                .join(", ");
            let mut check = Check::new(id, kind, format!("CHECK_TYPE({}, {})", lhs, rhs));
            check.lhs = lhs;
            check.comparator = "TYPE".to_owned();
            check.rhs = rhs;
            check
        }
    }
}

/// The next check macro at or after `from`: its start offset and kind.
/// An occurrence only counts when it sits at an identifier boundary and is
/// followed (modulo whitespace) by `(`.
fn find_macro(body: &str, from: usize) -> Option<(usize, CheckKind)> {
    let bytes = body.as_bytes();
    let mut search = from;
    while let Some(rel) = body[search..].find("CHECK") {
        let start = search + rel;
        search = start + 1;
        if start > 0 && is_ident_byte(bytes[start - 1]) {
            continue;
        }
        let after_name = start + "CHECK".len();
        let (kind, name_end) = if body[after_name..].starts_with("_TYPE") {
            (CheckKind::TypeCompare, after_name + "_TYPE".len())
        } else {
            (CheckKind::Assert, after_name)
        };
        let open = name_end + ws_len(&body[name_end..]);
        if bytes.get(open) == Some(&b'(') {
            return Some((start, kind));
        }
    }
    None
}

/// Index of the `)` matching the `(` at `open`. Depth counts `()` and `{}`;
/// double-quoted strings and character literals are opaque.
fn find_close(body: &str, open: usize) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => i = skip_literal(bytes, i, b'"')?,
            b'\'' => i = skip_literal(bytes, i, b'\'')?,
            b'(' | b'{' => depth += 1,
            b')' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return if bytes[i] == b')' { Some(i) } else { None };
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split the text between a macro's parens at top-level commas.
fn split_macro_args(inner: &str) -> Vec<String> {
    let bytes = inner.as_bytes();
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => i = skip_literal(bytes, i, b'"').unwrap_or(bytes.len()),
            b'\'' => i = skip_literal(bytes, i, b'\'').unwrap_or(bytes.len()),
            b'(' | b'{' => depth += 1,
            b')' | b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                args.push(inner[start..i].to_owned());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    args.push(inner[start..].to_owned());
    args
}

/// Scan `expr` for the one permitted relational operator, skipping string
/// and character literals. Two operators are fatal; none means truthiness.
fn find_operator(expr: &str, test_name: &str, line: usize) -> Option<(usize, &'static str)> {
    let bytes = expr.as_bytes();
    let mut found: Option<(usize, &'static str)> = None;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'"' || bytes[i] == b'\'' {
            i = match skip_literal(bytes, i, bytes[i]) {
                Some(x) => x + 1,
                None => break,
            };
            continue;
        }
        let mut matched = None;
        for op in OPERATORS {
            if bytes[i..].starts_with(op.as_bytes()) {
                matched = Some(*op);
                break;
            }
        }
        match matched {
            Some(op) => {
                if let Some((_, prev)) = found {
                    panic!(
                        "CHECK in test '{}' (body line {}) has more than one relational \
                         operator ('{}' and '{}'): {}",
                        test_name, line, prev, op, expr
                    );
                }
                found = Some((i, op));
                i += op.len();
            }
            None => i += 1,
        }
    }
    found
}

/// Given the index of an opening quote, the index of its closing quote.
fn skip_literal(bytes: &[u8], open: usize, quote: u8) -> Option<usize> {
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            c if c == quote => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn is_ident_byte(b: u8) -> bool {
    b == b'_' || (b as char).is_ascii_alphanumeric()
}

fn ws_len(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

fn line_of(body: &str, offset: usize) -> usize {
    body[..offset].matches('\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(body: &str) -> (String, Vec<Check>) {
        rewrite_checks(body, "t")
    }

    #[test]
    fn test_relational_check_is_split() {
        let (_, checks) = rewrite("CHECK(1+1 == 2);");
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].lhs, "1+1");
        assert_eq!(checks[0].comparator, "==");
        assert_eq!(checks[0].rhs, "2");
        assert!(checks[0].msg_args.is_empty());
    }

    #[test]
    fn test_truthiness_check() {
        let (_, checks) = rewrite("CHECK(IsReady());");
        assert_eq!(checks[0].lhs, "IsReady()");
        assert_eq!(checks[0].comparator, "");
    }

    #[test]
    fn test_message_fragments() {
        let (_, checks) = rewrite("CHECK(s == \"b\", \"got \", s);");
        assert_eq!(checks[0].lhs, "s");
        assert_eq!(checks[0].rhs, "\"b\"");
        assert_eq!(checks[0].msg_args, vec!["\"got \"", "s"]);
    }

    #[test]
    fn test_operator_inside_string_is_ignored() {
        let (_, checks) = rewrite("CHECK(s == \"a<b\");");
        assert_eq!(checks[0].comparator, "==");
        assert_eq!(checks[0].rhs, "\"a<b\"");
    }

    #[test]
    fn test_comma_inside_groups_is_literal() {
        let (_, checks) = rewrite("CHECK(Sum(1, 2) == 3, \"a, b\", x);");
        assert_eq!(checks[0].lhs, "Sum(1, 2)");
        assert_eq!(checks[0].msg_args, vec!["\"a, b\"", "x"]);
    }

    #[test]
    fn test_surrounding_text_is_preserved() {
        let (body, checks) = rewrite("int x = 5;\nCHECK(x > 4);\nreturn;");
        assert_eq!(checks.len(), 1);
        assert!(body.starts_with("int x = 5;\n"));
        assert!(body.ends_with(";\nreturn;"));
    }

    #[test]
    fn test_ids_are_contiguous() {
        let (_, checks) = rewrite("CHECK(a == 1); CHECK(b); CHECK_TYPE(c, int);");
        let ids = checks.iter().map(|c| c.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_other_identifiers_are_not_macros() {
        let (body, checks) = rewrite("MY_CHECK(x); CHECKS(y); recheck(z); CHECK(w);");
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].lhs, "w");
        assert!(body.starts_with("MY_CHECK(x); CHECKS(y); recheck(z); "));
    }

    #[test]
    fn test_check_type_rejoins_template_commas() {
        let (_, checks) = rewrite("CHECK_TYPE(m, std::map<int, int>);");
        assert_eq!(checks[0].lhs, "m");
        assert_eq!(checks[0].comparator, "TYPE");
        assert_eq!(checks[0].rhs, "std::map<int, int>");
    }

    #[test]
    #[should_panic(expected = "may not contain '&&' or '||'")]
    fn test_boolean_combinators_are_fatal() {
        rewrite("CHECK(x && y);");
    }

    #[test]
    #[should_panic(expected = "more than one relational operator")]
    fn test_two_operators_are_fatal() {
        rewrite("CHECK(a < b < c);");
    }

    #[test]
    #[should_panic(expected = "Empty CHECK")]
    fn test_empty_check_is_fatal() {
        rewrite("CHECK();");
    }

    #[test]
    #[should_panic(expected = "needs an expression and a type")]
    fn test_check_type_arity_is_fatal() {
        rewrite("CHECK_TYPE(x);");
    }

    #[test]
    fn test_emitted_block_reports_protocol() {
        let (body, _) = rewrite("CHECK(1+1 == 2);");
        assert!(body.contains(":CHECK: \" << 0"));
        assert!(body.contains(":RESULT: "));
        assert!(body.contains(":LHS: "));
        assert!(body.contains(":MSG: "));
    }
}
