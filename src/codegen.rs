// Copyright (c) 2019 King's College London created by the Software Development Team
// <http://soft-dev.org/>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, or the UPL-1.0 license <http://opensource.org/licenses/UPL>
// at your option. This file may not be copied, modified, or distributed except according to those
// terms.

//! C++ synthesis: the fixed per-test boilerplate, the instrumented
//! replacement block for each check, and the pre-`main` runner object.

use crate::testcase::{Check, CheckKind, TestCase};

/// Fixed preamble of every generated translation unit: protocol string
/// helpers plus the type-name prettifier used by `CHECK_TYPE`.
const PREAMBLE: &str = r#"// Generated by Emperfect; overwritten on every run.
#include <cstddef>
#include <cstdint>
#include <cstdlib>
#include <fstream>
#include <iostream>
#include <map>
#include <sstream>
#include <string>
#include <type_traits>
#include <typeinfo>
#include <vector>

namespace emperfect {

// Protocol values must stay on one line.
inline std::string Escape(const std::string & in) {
  std::string out;
  out.reserve(in.size());
  for (char c : in) {
    switch (c) {
      case '\n': out += "\\n"; break;
      case '\r': out += "\\r"; break;
      case '\t': out += "\\t"; break;
      default: out += c;
    }
  }
  return out;
}

template <typename T>
inline std::string ToString(const T & value) {
  std::stringstream ss;
  ss << value;
  return Escape(ss.str());
}

// Map the implementation-provided identifiers of the common types back to
// their canonical spellings.
inline const std::map<std::string, std::string> & TypeRegistry() {
  static const std::map<std::string, std::string> registry = {
    { typeid(bool).name(), "bool" },
    { typeid(char).name(), "char" },
    { typeid(float).name(), "float" },
    { typeid(double).name(), "double" },
    { typeid(int8_t).name(), "int8_t" },
    { typeid(int16_t).name(), "int16_t" },
    { typeid(int32_t).name(), "int32_t" },
    { typeid(int64_t).name(), "int64_t" },
    { typeid(uint8_t).name(), "uint8_t" },
    { typeid(uint16_t).name(), "uint16_t" },
    { typeid(uint32_t).name(), "uint32_t" },
    { typeid(uint64_t).name(), "uint64_t" },
    { typeid(size_t).name(), "size_t" },
    { typeid(std::string).name(), "string" },
  };
  return registry;
}

template <typename T> struct TypeName {
  static std::string Get() {
    auto it = TypeRegistry().find(typeid(T).name());
    if (it != TypeRegistry().end()) return it->second;
    return typeid(T).name();
  }
};
template <typename T> struct TypeName<const T> {
  static std::string Get() { return TypeName<T>::Get() + " const"; }
};
template <typename T> struct TypeName<T &> {
  static std::string Get() { return TypeName<T>::Get() + " &"; }
};
template <typename T> struct TypeName<std::vector<T>> {
  static std::string Get() { return "vector<" + TypeName<T>::Get() + ">"; }
};
template <typename R> struct TypeName<R()> {
  static std::string Get() { return TypeName<R>::Get() + "()"; }
};
template <typename R, typename A1> struct TypeName<R(A1)> {
  static std::string Get() {
    return TypeName<R>::Get() + "(" + TypeName<A1>::Get() + ")";
  }
};
template <typename R, typename A1, typename A2> struct TypeName<R(A1, A2)> {
  static std::string Get() {
    return TypeName<R>::Get() + "(" + TypeName<A1>::Get() + "," + TypeName<A2>::Get() + ")";
  }
};
template <typename R, typename A1, typename A2, typename A3>
struct TypeName<R(A1, A2, A3)> {
  static std::string Get() {
    return TypeName<R>::Get() + "(" + TypeName<A1>::Get() + "," + TypeName<A2>::Get() + ","
      + TypeName<A3>::Get() + ")";
  }
};
template <typename R, typename A1, typename A2, typename A3, typename A4>
struct TypeName<R(A1, A2, A3, A4)> {
  static std::string Get() {
    return TypeName<R>::Get() + "(" + TypeName<A1>::Get() + "," + TypeName<A2>::Get() + ","
      + TypeName<A3>::Get() + "," + TypeName<A4>::Get() + ")";
  }
};
template <typename R, typename A1, typename A2, typename A3, typename A4, typename A5>
struct TypeName<R(A1, A2, A3, A4, A5)> {
  static std::string Get() {
    return TypeName<R>::Get() + "(" + TypeName<A1>::Get() + "," + TypeName<A2>::Get() + ","
      + TypeName<A3>::Get() + "," + TypeName<A4>::Get() + "," + TypeName<A5>::Get() + ")";
  }
};
template <typename R, typename A1, typename A2, typename A3, typename A4, typename A5,
          typename A6>
struct TypeName<R(A1, A2, A3, A4, A5, A6)> {
  static std::string Get() {
    return TypeName<R>::Get() + "(" + TypeName<A1>::Get() + "," + TypeName<A2>::Get() + ","
      + TypeName<A3>::Get() + "," + TypeName<A4>::Get() + "," + TypeName<A5>::Get() + ","
      + TypeName<A6>::Get() + ")";
  }
};

} // namespace emperfect
"#;

/// The complete translation unit for one test: preamble, shared header,
/// rewritten body inside a runner function, and a file-scope object whose
/// constructor runs it before `main`.
pub(crate) fn generate_source(test: &TestCase, header: &[String], body: &str) -> String {
    let mut src = String::with_capacity(PREAMBLE.len() + body.len() + 2048);
    src.push_str(PREAMBLE);
    src.push_str("\n// Shared header from the recipe.\n");
    for line in header {
        src.push_str(line);
        src.push('\n');
    }
    src.push_str("\nnamespace emperfect {\n\n");
    src.push_str("void RunChecks() {\n");
    src.push_str(&format!(
        "  std::ofstream emperfect_results({});\n",
        cpp_string_literal(&test.result_filename)
    ));
    src.push_str("  bool emperfect_passed = true;\n");
    src.push_str("  {\n");
    src.push_str(body);
    src.push_str("\n  }\n");
    src.push_str(&format!(
        "  emperfect_results << \"SCORE \" << (emperfect_passed ? {} : 0.0) << \"\\n\";\n",
        test.points
    ));
    src.push_str("}\n\n");
    src.push_str("struct Runner {\n");
    src.push_str("  Runner() {\n");
    src.push_str("    RunChecks();\n");
    if !test.call_main {
        src.push_str("    std::exit(0);\n");
    }
    src.push_str("  }\n");
    src.push_str("};\n\n");
    src.push_str("Runner runner;\n\n");
    src.push_str("} // namespace emperfect\n");
    src
}

/// The instrumented replacement for one check occurrence. The surrounding
/// `{}` keeps the bindings out of the test body's scope; the names are
/// prefixed so student code cannot collide with them.
pub(crate) fn emit_check(check: &Check) -> String {
    match check.kind {
        CheckKind::Assert => emit_assert(check),
        CheckKind::TypeCompare => emit_type_compare(check),
    }
}

fn emit_assert(check: &Check) -> String {
    let mut out = String::from("{\n");
    out.push_str(&format!(
        "  const auto & emperfect_lhs = ({});\n",
        check.lhs
    ));
    if check.comparator.is_empty() {
        out.push_str("  const bool emperfect_success = static_cast<bool>(emperfect_lhs);\n");
    } else {
        out.push_str(&format!(
            "  const auto & emperfect_rhs = ({});\n",
            check.rhs
        ));
        out.push_str(&format!(
            "  const bool emperfect_success = (emperfect_lhs {} emperfect_rhs);\n",
            check.comparator
        ));
    }
    out.push_str("  if (!emperfect_success) emperfect_passed = false;\n");
    out.push_str("  std::stringstream emperfect_msg;\n");
    if !check.msg_args.is_empty() {
        out.push_str(&format!(
            "  if (!emperfect_success) {{ emperfect_msg << {}; }}\n",
            check.msg_args.join(" << ")
        ));
    }
    out.push_str(&protocol_lines(check.id, &check.expr));
    out.push_str(
        "  emperfect_results << \":LHS: \" << emperfect::ToString(emperfect_lhs) << \"\\n\";\n",
    );
    if check.comparator.is_empty() {
        out.push_str("  emperfect_results << \":RHS: \" << \"\\n\";\n");
    } else {
        out.push_str(
            "  emperfect_results << \":RHS: \" << emperfect::ToString(emperfect_rhs) << \"\\n\";\n",
        );
    }
    out.push_str(
        "  emperfect_results << \":MSG: \" << emperfect::Escape(emperfect_msg.str()) << \"\\n\";\n",
    );
    out.push('}');
    out
}

fn emit_type_compare(check: &Check) -> String {
    let mut out = String::from("{\n");
    out.push_str(&format!(
        "  const bool emperfect_success = std::is_same<decltype({}), {}>::value;\n",
        check.lhs, check.rhs
    ));
    out.push_str("  if (!emperfect_success) emperfect_passed = false;\n");
    out.push_str(&protocol_lines(check.id, &check.expr));
    out.push_str(&format!(
        "  emperfect_results << \":LHS: \" << emperfect::TypeName<decltype({})>::Get() << \"\\n\";\n",
        check.lhs
    ));
    out.push_str(&format!(
        "  emperfect_results << \":RHS: \" << emperfect::TypeName<{}>::Get() << \"\\n\";\n",
        check.rhs
    ));
    out.push_str("  emperfect_results << \":MSG: \" << \"\\n\";\n");
    out.push('}');
    out
}

fn protocol_lines(id: usize, expr: &str) -> String {
    format!(
        "  emperfect_results << \":CHECK: \" << {} << \"\\n\";\n  \
         emperfect_results << \":TEST: \" << {} << \"\\n\";\n  \
         emperfect_results << \":RESULT: \" << emperfect_success << \"\\n\";\n",
        id,
        cpp_string_literal(expr)
    )
}

/// Render `s` as a C++ string literal.
fn cpp_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcase::TestCase;

    fn check(kind: CheckKind) -> Check {
        let mut c = Check::new(0, kind, "x == 2".to_owned());
        c.lhs = "x".to_owned();
        c.comparator = "==".to_owned();
        c.rhs = "2".to_owned();
        c
    }

    #[test]
    fn test_assert_block_shape() {
        let mut c = check(CheckKind::Assert);
        c.msg_args = vec!["\"got \"".to_owned(), "x".to_owned()];
        let block = emit_check(&c);
        assert!(block.contains("const auto & emperfect_lhs = (x);"));
        assert!(block.contains("(emperfect_lhs == emperfect_rhs)"));
        assert!(block.contains("emperfect_msg << \"got \" << x;"));
        assert!(block.contains("\":TEST: \" << \"x == 2\""));
        assert!(block.starts_with('{') && block.ends_with('}'));
    }

    #[test]
    fn test_truthiness_block_has_empty_rhs() {
        let mut c = check(CheckKind::Assert);
        c.comparator = String::new();
        let block = emit_check(&c);
        assert!(block.contains("static_cast<bool>(emperfect_lhs)"));
        assert!(block.contains("\":RHS: \" << \"\\n\""));
        assert!(!block.contains("emperfect_rhs ="));
    }

    #[test]
    fn test_type_compare_block() {
        let mut c = check(CheckKind::TypeCompare);
        c.rhs = "std::map<int, int>".to_owned();
        let block = emit_check(&c);
        assert!(block.contains("std::is_same<decltype(x), std::map<int, int>>::value"));
        assert!(block.contains("TypeName<decltype(x)>::Get()"));
        assert!(block.contains("TypeName<std::map<int, int>>::Get()"));
    }

    #[test]
    fn test_generated_source_shape() {
        let mut test = TestCase::new(3, "scratch");
        test.points = 5.0;
        let src = generate_source(&test, &["#include \"student.hpp\"".to_owned()], "CHECKS;");
        assert!(src.starts_with("// Generated by Emperfect"));
        assert!(src.contains("#include <fstream>"));
        assert!(src.contains("#include \"student.hpp\""));
        assert!(src.contains("std::ofstream emperfect_results(\"scratch/Test3-result.txt\");"));
        assert!(src.contains("emperfect_passed ? 5 : 0.0"));
        assert!(src.contains("Runner runner;"));
        // main runs by default
        assert!(!src.contains("std::exit(0)"));
    }

    #[test]
    fn test_skip_main_exits_before_main() {
        let mut test = TestCase::new(0, "scratch");
        test.call_main = false;
        let src = generate_source(&test, &[], "");
        assert!(src.contains("std::exit(0);"));
    }

    #[test]
    fn test_string_literal_escaping() {
        assert_eq!(cpp_string_literal("a\"b\\c\nd"), "\"a\\\"b\\\\c\\nd\"");
    }
}
