// Copyright (c) 2019 King's College London created by the Software Development Team
// <http://soft-dev.org/>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, or the UPL-1.0 license <http://opensource.org/licenses/UPL>
// at your option. This file may not be copied, modified, or distributed except according to those
// terms.

//! Per-test records: configuration, check results, status derivation and
//! the results-file protocol.

use std::fs::read_to_string;

/// The overall outcome of one test case, derived on demand from the fields
/// the pipeline filled in. Variants are ordered by derivation precedence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestStatus {
    FailedCompile,
    FailedTime,
    MissedError,
    FailedRun,
    FailedCheck,
    FailedOutput,
    Passed,
}

impl TestStatus {
    pub fn label(self) -> &'static str {
        match self {
            TestStatus::FailedCompile => "failed-compile",
            TestStatus::FailedTime => "failed-time",
            TestStatus::MissedError => "missed-error",
            TestStatus::FailedRun => "failed-run",
            TestStatus::FailedCheck => "failed-check",
            TestStatus::FailedOutput => "failed-output",
            TestStatus::Passed => "passed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckKind {
    Assert,
    TypeCompare,
}

/// One `CHECK` or `CHECK_TYPE` occurrence in a test body. A check may
/// execute many times in one run (e.g. inside a loop), so the result fields
/// are parallel vectors with one slot per execution.
pub struct Check {
    pub id: usize,
    pub kind: CheckKind,
    /// The test expression as written (for `CHECK_TYPE`, the whole macro).
    pub expr: String,
    pub lhs: String,
    /// `==`, `!=`, `<`, `<=`, `>`, `>=`, `TYPE`, or empty for truthiness.
    pub comparator: String,
    pub rhs: String,
    /// Extra comma-separated message fragments, streamed on failure.
    pub msg_args: Vec<String>,
    pub passed: Vec<bool>,
    pub lhs_values: Vec<String>,
    pub rhs_values: Vec<String>,
    pub messages: Vec<String>,
}

impl Check {
    pub fn new(id: usize, kind: CheckKind, expr: String) -> Self {
        Check {
            id,
            kind,
            expr,
            lhs: String::new(),
            comparator: String::new(),
            rhs: String::new(),
            msg_args: Vec::new(),
            passed: Vec::new(),
            lhs_values: Vec::new(),
            rhs_values: Vec::new(),
            messages: Vec::new(),
        }
    }

    /// A check passed iff it executed at least once and every execution
    /// succeeded.
    pub fn passed(&self) -> bool {
        !self.passed.is_empty() && self.passed.iter().all(|&x| x)
    }

    /// The index of the first failing execution, if any.
    pub fn first_failure(&self) -> Option<usize> {
        self.passed.iter().position(|&x| !x)
    }
}

/// One `:TestCase` from the recipe, together with everything the pipeline
/// learned by running it.
pub struct TestCase {
    pub id: usize,
    pub name: String,
    pub points: f64,
    pub args: String,
    pub hidden: bool,
    pub match_case: bool,
    pub match_space: bool,
    pub call_main: bool,
    pub timeout: f64,
    pub expect_exit_code: i32,
    pub input_filename: Option<String>,
    pub expect_filename: Option<String>,
    pub code_filename: Option<String>,
    pub cpp_filename: String,
    pub exe_filename: String,
    pub compile_filename: String,
    pub output_filename: String,
    pub error_filename: String,
    pub result_filename: String,
    /// The raw code block, as captured from the recipe (or `code_file`).
    pub code: Vec<String>,
    pub checks: Vec<Check>,
    pub compile_exit_code: i32,
    pub run_exit_code: i32,
    pub hit_timeout: bool,
    pub output_match: bool,
    /// The value of the `SCORE` line in the results file.
    pub score: f64,
}

impl TestCase {
    pub fn new(id: usize, dir: &str) -> Self {
        TestCase {
            id,
            name: format!("Test #{}", id),
            points: 0.0,
            args: String::new(),
            hidden: false,
            match_case: true,
            match_space: true,
            call_main: true,
            timeout: 5.0,
            expect_exit_code: 0,
            input_filename: None,
            expect_filename: None,
            code_filename: None,
            cpp_filename: format!("{}/Test{}.cpp", dir, id),
            exe_filename: format!("{}/Test{}.exe", dir, id),
            compile_filename: format!("{}/Test{}-compile.txt", dir, id),
            output_filename: format!("{}/Test{}-output.txt", dir, id),
            error_filename: format!("{}/Test{}-errors.txt", dir, id),
            result_filename: format!("{}/Test{}-result.txt", dir, id),
            code: Vec::new(),
            checks: Vec::new(),
            compile_exit_code: 0,
            run_exit_code: 0,
            hit_timeout: false,
            output_match: true,
            score: 0.0,
        }
    }

    /// Apply one `key=value` argument from the `:TestCase` directive line.
    pub fn set_arg(&mut self, key: &str, val: &str) {
        match key {
            "name" => self.name = val.to_owned(),
            "points" => self.points = parse_num(key, val),
            "args" => self.args = val.to_owned(),
            "hidden" => self.hidden = parse_bool(key, val),
            "match_case" => self.match_case = parse_bool(key, val),
            "match_space" => self.match_space = parse_bool(key, val),
            "run_main" => self.call_main = parse_bool(key, val),
            "timeout" => self.timeout = parse_num(key, val),
            "exit_code" => {
                self.expect_exit_code = val.parse().unwrap_or_else(|_| {
                    panic!("Argument '{}' expects an integer, not '{}'.", key, val)
                })
            }
            "input" => self.input_filename = Some(val.to_owned()),
            "expect" => self.expect_filename = Some(val.to_owned()),
            "code_file" => self.code_filename = Some(val.to_owned()),
            "cpp" => self.cpp_filename = val.to_owned(),
            "exe" => self.exe_filename = val.to_owned(),
            "compile" => self.compile_filename = val.to_owned(),
            "output" => self.output_filename = val.to_owned(),
            "error" => self.error_filename = val.to_owned(),
            "result" => self.result_filename = val.to_owned(),
            _ => panic!("Unknown :TestCase argument '{}'.", key),
        }
    }

    /// First matching row of the status table.
    pub fn status(&self) -> TestStatus {
        if self.compile_exit_code != 0 {
            TestStatus::FailedCompile
        } else if self.hit_timeout {
            TestStatus::FailedTime
        } else if self.run_exit_code != self.expect_exit_code && self.expect_exit_code != 0 {
            TestStatus::MissedError
        } else if self.run_exit_code != 0 && self.expect_exit_code == 0 {
            TestStatus::FailedRun
        } else if self.checks.iter().any(|c| !c.passed()) {
            TestStatus::FailedCheck
        } else if !self.output_match {
            TestStatus::FailedOutput
        } else {
            TestStatus::Passed
        }
    }

    pub fn passed(&self) -> bool {
        self.status() == TestStatus::Passed
    }

    pub fn earned(&self) -> f64 {
        if self.passed() {
            self.points
        } else {
            0.0
        }
    }

    pub fn count_passed(&self) -> usize {
        self.checks.iter().filter(|c| c.passed()).count()
    }

    pub fn count_failed(&self) -> usize {
        self.checks.len() - self.count_passed()
    }

    /// Read the results file the generated program wrote. A missing file
    /// means the program never reached its checks; that is per-test data,
    /// not a harness error.
    pub(crate) fn load_results(&mut self) {
        let text = match read_to_string(&self.result_filename) {
            Ok(x) => x,
            Err(_) => return,
        };
        self.parse_results(&text);
    }

    /// Parse the line-oriented results protocol: the first whitespace token
    /// selects the field, the remainder is the value.
    fn parse_results(&mut self, text: &str) {
        let mut cur: Option<usize> = None;
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, ' ');
            let token = parts.next().unwrap();
            let value = parts.next().unwrap_or("");
            match token {
                ":CHECK:" => {
                    let id = value.trim().parse::<usize>().ok().filter(|&x| x < self.checks.len());
                    match id {
                        Some(id) => cur = Some(id),
                        None => panic!(
                            "Bad check id '{}' in results file '{}'.",
                            value, self.result_filename
                        ),
                    }
                }
                ":TEST:" => {} // the expression is already known from the rewriter
                ":RESULT:" => self.cur_check(cur, token).passed.push(value.trim() == "1"),
                ":LHS:" => self.cur_check(cur, token).lhs_values.push(value.to_owned()),
                ":RHS:" => self.cur_check(cur, token).rhs_values.push(value.to_owned()),
                ":MSG:" => self.cur_check(cur, token).messages.push(value.to_owned()),
                "SCORE" => {
                    self.score = value.trim().parse().unwrap_or_else(|_| {
                        panic!("Bad SCORE value '{}' in results file '{}'.", value, self.result_filename)
                    })
                }
                _ => panic!(
                    "Unknown field '{}' in results file '{}'.",
                    token, self.result_filename
                ),
            }
        }
    }

    fn cur_check(&mut self, cur: Option<usize>, token: &str) -> &mut Check {
        let id = cur.unwrap_or_else(|| {
            panic!(
                "Field '{}' before any :CHECK: in results file '{}'.",
                token, self.result_filename
            )
        });
        &mut self.checks[id]
    }
}

fn parse_num(key: &str, val: &str) -> f64 {
    val.parse().unwrap_or_else(|_| {
        panic!("Argument '{}' expects a number, not '{}'.", key, val)
    })
}

fn parse_bool(key: &str, val: &str) -> bool {
    match val.to_lowercase().as_str() {
        "true" => true,
        "false" => false,
        _ => panic!("Argument '{}' expects true or false, not '{}'.", key, val),
    }
}

/// Compare the program's output against the expected file under the
/// per-test case/space policy.
pub(crate) fn outputs_match(
    actual: &str,
    expected: &str,
    match_case: bool,
    match_space: bool,
) -> bool {
    normalise(actual, match_case, match_space) == normalise(expected, match_case, match_space)
}

fn normalise(s: &str, match_case: bool, match_space: bool) -> Vec<String> {
    let s = if match_case {
        s.to_owned()
    } else {
        s.to_ascii_lowercase()
    };
    if match_space {
        // Only blank lines are forgiven.
        s.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.to_owned())
            .collect()
    } else {
        vec![s.chars().filter(|c| !c.is_whitespace()).collect()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ran_test() -> TestCase {
        TestCase::new(0, ".emperfect")
    }

    fn passing_check(id: usize) -> Check {
        let mut c = Check::new(id, CheckKind::Assert, "1 == 1".to_owned());
        c.passed.push(true);
        c
    }

    #[test]
    fn test_status_precedence() {
        let mut t = ran_test();
        t.compile_exit_code = 1;
        t.hit_timeout = true;
        assert_eq!(t.status(), TestStatus::FailedCompile);
        t.compile_exit_code = 0;
        assert_eq!(t.status(), TestStatus::FailedTime);
        t.hit_timeout = false;
        t.expect_exit_code = 2;
        t.run_exit_code = 1;
        assert_eq!(t.status(), TestStatus::MissedError);
        t.expect_exit_code = 0;
        assert_eq!(t.status(), TestStatus::FailedRun);
        t.run_exit_code = 0;
        t.checks.push(Check::new(0, CheckKind::Assert, "x".to_owned()));
        assert_eq!(t.status(), TestStatus::FailedCheck);
        t.checks[0].passed.push(true);
        t.output_match = false;
        assert_eq!(t.status(), TestStatus::FailedOutput);
        t.output_match = true;
        assert_eq!(t.status(), TestStatus::Passed);
    }

    #[test]
    fn test_matching_nonzero_exit_passes() {
        let mut t = ran_test();
        t.expect_exit_code = 1;
        t.run_exit_code = 1;
        assert_eq!(t.status(), TestStatus::Passed);
    }

    #[test]
    fn test_check_never_executed_fails() {
        let c = Check::new(0, CheckKind::Assert, "x".to_owned());
        assert!(!c.passed());
        let mut c = passing_check(0);
        c.passed.push(false);
        assert!(!c.passed());
        assert_eq!(c.first_failure(), Some(1));
    }

    #[test]
    fn test_earned_follows_status() {
        let mut t = ran_test();
        t.points = 5.0;
        t.checks.push(passing_check(0));
        assert_eq!(t.earned(), 5.0);
        t.checks[0].passed.push(false);
        assert_eq!(t.earned(), 0.0);
    }

    #[test]
    fn test_parse_results() {
        let mut t = ran_test();
        t.checks.push(Check::new(0, CheckKind::Assert, "s == \"b\"".to_owned()));
        t.parse_results(
            ":CHECK: 0\n:TEST: s == \"b\"\n:RESULT: 0\n:LHS: a\n:RHS: b\n:MSG: got a\nSCORE 0\n",
        );
        assert_eq!(t.checks[0].passed, vec![false]);
        assert_eq!(t.checks[0].lhs_values, vec!["a"]);
        assert_eq!(t.checks[0].rhs_values, vec!["b"]);
        assert_eq!(t.checks[0].messages, vec!["got a"]);
        assert_eq!(t.score, 0.0);
    }

    #[test]
    fn test_parse_results_multiple_executions() {
        let mut t = ran_test();
        t.checks.push(Check::new(0, CheckKind::Assert, "i < 3".to_owned()));
        t.parse_results(
            ":CHECK: 0\n:TEST: i < 3\n:RESULT: 1\n:LHS: 0\n:RHS: 3\n:MSG: \n\
             :CHECK: 0\n:TEST: i < 3\n:RESULT: 1\n:LHS: 1\n:RHS: 3\n:MSG: \nSCORE 5\n",
        );
        assert_eq!(t.checks[0].passed, vec![true, true]);
        assert!(t.checks[0].passed());
        assert_eq!(t.score, 5.0);
    }

    #[test]
    #[should_panic(expected = "Unknown field")]
    fn test_unknown_protocol_field_is_fatal() {
        ran_test().parse_results(":BOGUS: 1\n");
    }

    #[test]
    fn test_output_policies() {
        assert!(outputs_match("HELLO\n", "hello\n", false, true));
        assert!(!outputs_match("HELLO\n", "hello\n", true, true));
        assert!(outputs_match("a b\n\nc\n", "ab   c", true, false));
        assert!(!outputs_match("a b", "ab", true, true));
        assert!(outputs_match("x\n\n\ny\n", "x\ny", true, true));
    }

    #[test]
    #[should_panic(expected = "Unknown :TestCase argument")]
    fn test_unknown_argument_is_fatal() {
        ran_test().set_arg("bogus", "1");
    }
}
