// Copyright (c) 2019 King's College London created by the Software Development Team
// <http://soft-dev.org/>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, or the UPL-1.0 license <http://opensource.org/licenses/UPL>
// at your option. This file may not be copied, modified, or distributed except according to those
// terms.

//! Report sinks: each has a detail level and an encoding, opens its target
//! lazily on first write, renders per-test blocks as tests finish and a
//! summary at the end of the run.

use std::fs::{read_to_string, File};
use std::io::Write;

use termcolor::{Color, ColorChoice, ColorSpec, NoColor, StandardStream, WriteColor};

use crate::diff::render_inline_diff;
use crate::fatal;
use crate::testcase::{CheckKind, TestCase, TestStatus};

/// How much a sink reports. The predicates below are pure functions of this
/// ordinal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DetailLevel {
    None,
    Percent,
    Score,
    Summary,
    Student,
    Teacher,
    Full,
    Debug,
}

impl DetailLevel {
    pub fn from_name(name: &str) -> DetailLevel {
        match name.to_lowercase().as_str() {
            "none" => DetailLevel::None,
            "percent" => DetailLevel::Percent,
            "score" => DetailLevel::Score,
            "summary" => DetailLevel::Summary,
            "student" => DetailLevel::Student,
            "teacher" => DetailLevel::Teacher,
            "full" => DetailLevel::Full,
            "debug" => DetailLevel::Debug,
            _ => panic!("Unknown detail level '{}'.", name),
        }
    }

    pub fn has_percent(self) -> bool {
        self >= DetailLevel::Percent
    }

    pub fn has_score(self) -> bool {
        self >= DetailLevel::Score
    }

    pub fn has_summary(self) -> bool {
        self >= DetailLevel::Summary
    }

    pub fn has_results(self) -> bool {
        self >= DetailLevel::Student
    }

    pub fn has_failed_details(self) -> bool {
        self >= DetailLevel::Student
    }

    pub fn has_hidden_details(self) -> bool {
        self >= DetailLevel::Teacher
    }

    pub fn has_passed_details(self) -> bool {
        self >= DetailLevel::Full
    }

    pub fn has_debug(self) -> bool {
        self == DetailLevel::Debug
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Encoding {
    Text,
    Html,
}

impl Encoding {
    pub fn from_name(name: &str) -> Encoding {
        match name.to_lowercase().as_str() {
            "text" => Encoding::Text,
            "html" => Encoding::Html,
            _ => panic!("Unknown output type '{}'.", name),
        }
    }

    /// The default encoding for a target: `.htm`/`.html` files are HTML,
    /// everything else (including stdout) is text.
    pub fn from_filename(filename: Option<&str>) -> Encoding {
        match filename {
            Some(f) if f.ends_with(".htm") || f.ends_with(".html") => Encoding::Html,
            _ => Encoding::Text,
        }
    }
}

pub(crate) struct OutputSink {
    filename: Option<String>,
    encoding: Encoding,
    detail: DetailLevel,
    writer: Option<Box<dyn WriteColor>>,
}

impl OutputSink {
    pub fn new(detail: DetailLevel, filename: Option<String>, encoding: Option<Encoding>) -> Self {
        let encoding =
            encoding.unwrap_or_else(|| Encoding::from_filename(filename.as_deref()));
        OutputSink {
            filename,
            encoding,
            detail,
            writer: None,
        }
    }

    /// Open the target and emit the once-only header. The filename is fixed
    /// for the sink's lifetime, so repeated calls reuse the same writer.
    fn ensure_open(&mut self) {
        if self.writer.is_some() {
            return;
        }
        let writer: Box<dyn WriteColor> = match &self.filename {
            Some(f) => {
                let file = File::create(f)
                    .unwrap_or_else(|_| fatal(&format!("Couldn't create output file '{}'.", f)));
                Box::new(NoColor::new(file))
            }
            None => Box::new(StandardStream::stdout(ColorChoice::Always)),
        };
        self.writer = Some(writer);
        if self.detail.has_summary() {
            match self.encoding {
                Encoding::Html => {
                    self.raw(
                        "<!DOCTYPE html>\n<html>\n<head><title>Autograde Results</title></head>\n\
                         <body>\n<h1>Autograde Results</h1>\n",
                    );
                }
                Encoding::Text => self.raw("Autograde Results\n=================\n"),
            }
        }
    }

    /// Render one finished test. Sinks below student detail say nothing
    /// per-test; hidden tests stop after the status line unless the sink is
    /// allowed hidden details.
    pub fn write_test(&mut self, test: &TestCase) {
        if !self.detail.has_results() {
            return;
        }
        self.ensure_open();
        let status = test.status();
        let mut title = format!("Test Case {}: {}", test.id, test.name);
        if test.hidden {
            title.push_str(" [HIDDEN]");
        }
        self.heading(&title);
        self.status_line(status);
        if test.hidden && !self.detail.has_hidden_details() {
            self.blank();
            return;
        }
        let failed = status != TestStatus::Passed;
        if status == TestStatus::FailedCheck || self.detail.has_passed_details() {
            self.render_checks(test);
        }
        if failed || self.detail.has_passed_details() {
            self.section("Test code");
            self.pre_block(&test.code.join("\n"));
        }
        if status == TestStatus::FailedCompile {
            self.section("Compiler output");
            self.pre_block(read(&test.compile_filename).trim_end());
        }
        if status == TestStatus::FailedRun {
            self.section("Standard error");
            self.pre_block(read(&test.error_filename).trim_end());
        }
        if matches!(status, TestStatus::MissedError | TestStatus::FailedOutput)
            || self.detail.has_passed_details()
        {
            self.render_invocation(test);
        }
        if matches!(status, TestStatus::FailedRun | TestStatus::FailedOutput) {
            self.render_output_compare(test);
        }
        self.blank();
    }

    /// The end-of-run summary. Score and percent sinks reduce to a single
    /// line; everything from summary detail up gets the full table.
    pub fn write_summary(&mut self, tests: &[TestCase]) {
        if self.detail == DetailLevel::None {
            return;
        }
        let earned: f64 = tests.iter().map(|t| t.earned()).sum();
        let total: f64 = tests.iter().map(|t| t.points).sum();
        let pct = if total > 0.0 {
            (100.0 * earned / total).round() as i64
        } else {
            0
        };
        self.ensure_open();
        if !self.detail.has_summary() {
            if self.detail.has_score() {
                self.line(&format!("{} of {}", earned, total));
            } else {
                self.line(&format!("{}%", pct));
            }
            return;
        }
        self.heading("Summary");
        match self.encoding {
            Encoding::Html => {
                self.raw(
                    "<table border=\"1\">\n<tr><th>Test</th><th>Status</th><th>Checks</th>\
                     <th>Passed</th><th>Failed</th><th>Score</th></tr>\n",
                );
                for test in tests {
                    let status = test.status();
                    self.raw(&format!(
                        "<tr><td>{}</td><td><span style=\"color: {}\">{}</span></td>\
                         <td>{}</td><td>{}</td><td>{}</td><td>{} / {}</td></tr>\n",
                        html_escape(&test.name),
                        html_colour(status),
                        status.label(),
                        test.checks.len(),
                        test.count_passed(),
                        test.count_failed(),
                        test.earned(),
                        test.points
                    ));
                }
                self.raw(&format!(
                    "<tr><td><b>Total</b></td><td></td><td></td><td></td><td></td>\
                     <td><b>{} / {}</b></td></tr>\n</table>\n",
                    earned, total
                ));
                self.raw(&format!("<p>Final score: <b>{}%</b></p>\n", pct));
            }
            Encoding::Text => {
                for test in tests {
                    self.line(&format!(
                        "{}: {}, {} checks ({} passed, {} failed), {} / {} points",
                        test.name,
                        test.status().label(),
                        test.checks.len(),
                        test.count_passed(),
                        test.count_failed(),
                        test.earned(),
                        test.points
                    ));
                }
                self.line(&format!("Total: {} / {} points", earned, total));
                self.line(&format!("Final score: {}%", pct));
            }
        }
    }

    /// Flush, closing the HTML document if one was started.
    pub fn finish(&mut self) {
        if self.writer.is_none() {
            return;
        }
        if self.encoding == Encoding::Html && self.detail.has_summary() {
            self.raw("</body>\n</html>\n");
        }
        self.w().flush().ok();
    }

    fn render_checks(&mut self, test: &TestCase) {
        self.section("Checks");
        for check in &test.checks {
            let shown = match check.kind {
                CheckKind::Assert => format!("CHECK({})", check.expr),
                CheckKind::TypeCompare => check.expr.clone(),
            };
            let runs = check.passed.len();
            if check.passed() {
                let verdict = if runs > 1 {
                    format!("passed ({} runs)", runs)
                } else {
                    "passed".to_owned()
                };
                self.check_line(&shown, &verdict, true, &[]);
            } else if runs == 0 {
                self.check_line(&shown, "never executed", false, &[]);
            } else {
                let i = check.first_failure().unwrap();
                let mut extra = vec![
                    format!("lhs: {}", check.lhs_values.get(i).map(|x| x.as_str()).unwrap_or("")),
                    format!("rhs: {}", check.rhs_values.get(i).map(|x| x.as_str()).unwrap_or("")),
                ];
                if let Some(msg) = check.messages.get(i).filter(|m| !m.is_empty()) {
                    extra.push(format!("message: {}", msg));
                }
                self.check_line(&shown, "FAILED", false, &extra);
            }
        }
    }

    fn check_line(&mut self, shown: &str, verdict: &str, passed: bool, extra: &[String]) {
        match self.encoding {
            Encoding::Html => {
                let colour = if passed { "green" } else { "red" };
                self.raw(&format!(
                    "<p><code>{}</code> &mdash; <span style=\"color: {}\">{}</span>",
                    html_escape(shown),
                    colour,
                    verdict
                ));
                for line in extra {
                    self.raw(&format!("<br>&nbsp;&nbsp;{}", html_escape(line)));
                }
                self.raw("</p>\n");
            }
            Encoding::Text => {
                self.line(&format!("{} ... {}", shown, verdict));
                for line in extra {
                    self.line(&format!("  {}", line));
                }
            }
        }
    }

    fn render_invocation(&mut self, test: &TestCase) {
        self.section("Invocation");
        let args = if test.args.is_empty() {
            "(none)".to_owned()
        } else {
            test.args.clone()
        };
        self.line(&format!("Command-line arguments: {}", args));
        if let Some(input) = &test.input_filename {
            self.line(&format!("Input file: {}", input));
            self.pre_block(read(input).trim_end());
        }
    }

    fn render_output_compare(&mut self, test: &TestCase) {
        let expect_file = match &test.expect_filename {
            Some(f) => f.clone(),
            None => return,
        };
        let actual = read(&test.output_filename);
        let expected = read(&expect_file);
        self.section("Output");
        match self.encoding {
            Encoding::Html => {
                self.raw(&format!(
                    "<table border=\"1\"><tr><th>Your output</th><th>Expected output</th></tr>\n\
                     <tr><td><pre>{}</pre></td><td><pre>{}</pre></td></tr></table>\n",
                    html_escape(&actual),
                    html_escape(&expected)
                ));
                self.raw("<p>Differences:</p>\n");
                self.raw(&render_inline_diff(&expected, &actual));
            }
            Encoding::Text => {
                self.line("-- Your output --");
                self.pre_block(actual.trim_end());
                self.line("-- Expected output --");
                self.pre_block(expected.trim_end());
            }
        }
    }

    fn heading(&mut self, text: &str) {
        match self.encoding {
            Encoding::Html => self.raw(&format!("<h2>{}</h2>\n", html_escape(text))),
            Encoding::Text => self.raw(&format!("\n== {} ==\n", text)),
        }
    }

    fn section(&mut self, text: &str) {
        match self.encoding {
            Encoding::Html => self.raw(&format!("<h3>{}</h3>\n", html_escape(text))),
            Encoding::Text => self.raw(&format!("-- {} --\n", text)),
        }
    }

    fn status_line(&mut self, status: TestStatus) {
        match self.encoding {
            Encoding::Html => {
                self.raw(&format!(
                    "<p>Status: <span style=\"color: {}\">{}</span></p>\n",
                    html_colour(status),
                    status.label()
                ));
            }
            Encoding::Text => {
                let colour = term_colour(status);
                let w = self.w();
                write!(w, "Status: ").ok();
                w.set_color(ColorSpec::new().set_fg(Some(colour))).ok();
                write!(w, "{}", status.label()).ok();
                w.reset().ok();
                writeln!(w).ok();
            }
        }
    }

    fn pre_block(&mut self, text: &str) {
        match self.encoding {
            Encoding::Html => self.raw(&format!("<pre>{}</pre>\n", html_escape(text))),
            Encoding::Text => {
                for line in text.lines() {
                    self.raw(&format!("    {}\n", line));
                }
            }
        }
    }

    fn line(&mut self, text: &str) {
        match self.encoding {
            Encoding::Html => self.raw(&format!("<p>{}</p>\n", html_escape(text))),
            Encoding::Text => self.raw(&format!("{}\n", text)),
        }
    }

    fn blank(&mut self) {
        if self.encoding == Encoding::Text {
            self.raw("\n");
        }
    }

    fn raw(&mut self, text: &str) {
        self.w().write_all(text.as_bytes()).ok();
    }

    fn w(&mut self) -> &mut dyn WriteColor {
        self.writer.as_mut().unwrap().as_mut()
    }
}

fn term_colour(status: TestStatus) -> Color {
    match status {
        TestStatus::Passed => Color::Green,
        TestStatus::FailedCheck => Color::Red,
        TestStatus::FailedCompile => Color::Ansi256(88), // dark red
        TestStatus::FailedTime => Color::Magenta,
        TestStatus::FailedRun | TestStatus::FailedOutput | TestStatus::MissedError => {
            Color::Ansi256(202) // orange-red
        }
    }
}

fn html_colour(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Passed => "green",
        TestStatus::FailedCheck => "red",
        TestStatus::FailedCompile => "darkred",
        TestStatus::FailedTime => "purple",
        TestStatus::FailedRun | TestStatus::FailedOutput | TestStatus::MissedError => "orangered",
    }
}

pub(crate) fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn read(filename: &str) -> String {
    read_to_string(filename).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_levels_are_ordered() {
        assert!(DetailLevel::None < DetailLevel::Percent);
        assert!(DetailLevel::Percent < DetailLevel::Score);
        assert!(DetailLevel::Score < DetailLevel::Summary);
        assert!(DetailLevel::Summary < DetailLevel::Student);
        assert!(DetailLevel::Student < DetailLevel::Teacher);
        assert!(DetailLevel::Teacher < DetailLevel::Full);
        assert!(DetailLevel::Full < DetailLevel::Debug);
    }

    #[test]
    fn test_predicates_follow_the_ordinal() {
        assert!(!DetailLevel::Percent.has_score());
        assert!(DetailLevel::Score.has_percent());
        assert!(!DetailLevel::Summary.has_results());
        assert!(DetailLevel::Student.has_results());
        assert!(DetailLevel::Student.has_failed_details());
        assert!(!DetailLevel::Student.has_hidden_details());
        assert!(DetailLevel::Teacher.has_hidden_details());
        assert!(!DetailLevel::Teacher.has_passed_details());
        assert!(DetailLevel::Full.has_passed_details());
        assert!(!DetailLevel::Full.has_debug());
        assert!(DetailLevel::Debug.has_debug());
    }

    #[test]
    fn test_detail_names() {
        assert_eq!(DetailLevel::from_name("Teacher"), DetailLevel::Teacher);
        assert_eq!(DetailLevel::from_name("percent"), DetailLevel::Percent);
    }

    #[test]
    #[should_panic(expected = "Unknown detail level")]
    fn test_unknown_detail_is_fatal() {
        DetailLevel::from_name("verbose");
    }

    #[test]
    fn test_encoding_from_filename() {
        assert_eq!(Encoding::from_filename(Some("a.html")), Encoding::Html);
        assert_eq!(Encoding::from_filename(Some("a.htm")), Encoding::Html);
        assert_eq!(Encoding::from_filename(Some("a.txt")), Encoding::Text);
        assert_eq!(Encoding::from_filename(None), Encoding::Text);
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("a < b && c > d"), "a &lt; b &amp;&amp; c &gt; d");
    }
}
