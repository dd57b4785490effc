// Copyright (c) 2019 King's College London created by the Software Development Team
// <http://soft-dev.org/>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, or the UPL-1.0 license <http://opensource.org/licenses/UPL>
// at your option. This file may not be copied, modified, or distributed except according to those
// terms.

//! Directive dispatch and the per-test pipeline: generate, compile,
//! execute, compare, record.

use std::fs::{self, File};
use std::io::Write;
use std::os::unix::process::ExitStatusExt;
use std::process::Command;
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::checks::rewrite_checks;
use crate::codegen::generate_source;
use crate::fatal;
use crate::output::{DetailLevel, Encoding, OutputSink};
use crate::recipe::Recipe;
use crate::testcase::{outputs_match, TestCase};
use crate::vars::{parse_arg_list, VarStore};

/// Wall-clock cap on a single compile command. Student binaries get the
/// per-test `timeout` instead.
const COMPILE_TIMEOUT: u64 = 60; // seconds

/// One harness run: the variable store, the accumulated recipe state, and
/// every test run so far. Tests execute as their `:TestCase` directives are
/// parsed; call [`finalize`](#method.finalize) once the recipe is exhausted
/// to emit summaries and flush the sinks.
pub struct Emperfect {
    vars: VarStore,
    compile_recipe: Vec<String>,
    header: Vec<String>,
    sinks: Vec<OutputSink>,
    tests: Vec<TestCase>,
    init_done: bool,
    log_file: Option<File>,
}

impl Emperfect {
    pub fn new() -> Self {
        Emperfect {
            vars: VarStore::new(),
            compile_recipe: Vec::new(),
            header: Vec::new(),
            sinks: Vec::new(),
            tests: Vec::new(),
            init_done: false,
            log_file: None,
        }
    }

    /// Load and run a recipe file.
    pub fn load_file(&mut self, path: &str) {
        let src = fs::read_to_string(path)
            .unwrap_or_else(|_| fatal(&format!("Couldn't read recipe file '{}'.", path)));
        self.load_str(&src);
    }

    /// Load and run a recipe from a string.
    pub fn load_str(&mut self, src: &str) {
        let mut recipe = Recipe::new(src);
        while let Some(raw) = recipe.next_line() {
            let line_num = recipe.line_num() - 1;
            let line = self.vars.apply_vars(&raw);
            if line.trim().is_empty() {
                continue;
            }
            if !line.starts_with(':') {
                panic!("Expected a directive on line {}:\n  {}", line_num, line);
            }
            let (token, args) = match line.find(char::is_whitespace) {
                Some(i) => (line[..i].to_lowercase(), line[i + 1..].to_owned()),
                None => (line.to_lowercase(), String::new()),
            };
            match token.as_str() {
                ":init" => {
                    if self.init_done {
                        panic!("Second :Init directive on line {}.", line_num);
                    }
                    self.init(&args);
                    // :Init has no block; anything before the next directive
                    // is discarded.
                    recipe.read_block(false);
                }
                ":compile" => {
                    self.ensure_init();
                    self.vars.load_vars(&args);
                    self.compile_recipe = recipe.read_block(false);
                }
                ":header" => {
                    self.ensure_init();
                    self.vars.load_vars(&args);
                    self.header = recipe.read_block(false);
                }
                ":output" => {
                    self.ensure_init();
                    self.add_output(&args);
                    recipe.read_block(false);
                }
                ":testcase" => {
                    self.ensure_init();
                    self.run_testcase(&args, &mut recipe, line_num);
                }
                _ => panic!("Unknown directive '{}' on line {}.", token, line_num),
            }
        }
    }

    /// Emit the summary to every sink and flush them. Call once, after the
    /// whole recipe has been loaded.
    pub fn finalize(&mut self) {
        for sink in &mut self.sinks {
            sink.write_summary(&self.tests);
            sink.finish();
        }
        self.log("Run complete.");
    }

    pub fn tests(&self) -> &[TestCase] {
        &self.tests
    }

    /// The integer-rounded percent grade over all tests run so far.
    pub fn percent(&self) -> i64 {
        let earned: f64 = self.tests.iter().map(|t| t.earned()).sum();
        let total: f64 = self.tests.iter().map(|t| t.points).sum();
        if total > 0.0 {
            (100.0 * earned / total).round() as i64
        } else {
            0
        }
    }

    fn ensure_init(&mut self) {
        if !self.init_done {
            self.init("");
        }
    }

    fn init(&mut self, args: &str) {
        for key in self.vars.load_vars(args) {
            if key != "dir" {
                panic!("Unknown :Init argument '{}'.", key);
            }
        }
        let dir = self.vars.get("dir").unwrap().to_owned();
        fs::create_dir_all(&dir)
            .unwrap_or_else(|_| fatal(&format!("Couldn't create working directory '{}'.", dir)));
        let log_path = format!("{}/{}", dir, self.vars.get("log").unwrap());
        let mut log_file = File::create(&log_path)
            .unwrap_or_else(|_| fatal(&format!("Couldn't create log file '{}'.", log_path)));
        writeln!(log_file, "== EMPERFECT TEST LOG ==").ok();
        self.log_file = Some(log_file);
        self.init_done = true;
    }

    fn add_output(&mut self, args: &str) {
        let mut detail = DetailLevel::Student;
        let mut filename = None;
        let mut encoding = None;
        for (key, val) in parse_arg_list(args) {
            match key.as_str() {
                "detail" => detail = DetailLevel::from_name(&val),
                "filename" => filename = Some(val),
                "type" => encoding = Some(Encoding::from_name(&val)),
                _ => panic!("Unknown :Output argument '{}'.", key),
            }
        }
        self.sinks.push(OutputSink::new(detail, filename, encoding));
    }

    fn run_testcase(&mut self, args: &str, recipe: &mut Recipe, line_num: usize) {
        if self.compile_recipe.is_empty() {
            panic!(
                ":TestCase on line {} before any :Compile recipe was registered.",
                line_num
            );
        }
        let id = self.tests.len();
        let mut test = TestCase::new(id, self.vars.get("dir").unwrap());
        for (key, val) in parse_arg_list(args) {
            test.set_arg(&key, &val);
        }
        let block = recipe.read_block(true);
        if test.code_filename.is_some() {
            if !block.is_empty() {
                panic!(
                    "Test '{}' has both code_file and an inline code block.",
                    test.name
                );
            }
        } else {
            test.code = block;
        }
        self.run_pipeline(&mut test);
        for sink in &mut self.sinks {
            sink.write_test(&test);
        }
        self.tests.push(test);
    }

    fn run_pipeline(&mut self, test: &mut TestCase) {
        self.generate(test);
        self.compile(test);
        if test.compile_exit_code == 0 {
            self.execute(test);
            self.compare(test);
            test.load_results();
        }
        self.log(&format!(
            "Test {}: status {}.",
            test.id,
            test.status().label()
        ));
    }

    /// Phase 1: refresh the per-test variables and write the complete C++
    /// source for this test.
    fn generate(&mut self, test: &mut TestCase) {
        self.vars.set("#test", &test.id.to_string());
        self.vars.set("cpp", &test.cpp_filename);
        self.vars.set("exe", &test.exe_filename);
        self.vars.set("out", &test.output_filename);
        self.vars.set("compile", &test.compile_filename);
        self.vars.set("error", &test.error_filename);
        self.vars.set("result", &test.result_filename);
        if let Some(code_file) = &test.code_filename {
            let src = fs::read_to_string(code_file)
                .unwrap_or_else(|_| fatal(&format!("Couldn't read code file '{}'.", code_file)));
            test.code = src.lines().map(|x| x.to_owned()).collect();
        }
        let body_src = test
            .code
            .iter()
            .map(|l| self.vars.apply_vars(l))
            .collect::<Vec<_>>()
            .join("\n");
        let (body, checks) = rewrite_checks(&body_src, &test.name);
        test.checks = checks;
        let header = self
            .header
            .iter()
            .map(|l| self.vars.apply_vars(l))
            .collect::<Vec<_>>();
        let source = generate_source(test, &header, &body);
        fs::write(&test.cpp_filename, source).unwrap_or_else(|_| {
            fatal(&format!("Couldn't write test source '{}'.", test.cpp_filename))
        });
        self.log(&format!("Test {}: generated {}.", test.id, test.cpp_filename));
    }

    /// Phase 2: replay the compile recipe; the last command's exit code is
    /// the test's compile status.
    fn compile(&mut self, test: &mut TestCase) {
        let cmds = self
            .compile_recipe
            .iter()
            .map(|l| self.vars.apply_vars(l))
            .collect::<Vec<_>>();
        for cmd in cmds {
            let code = self.run_guarded(&cmd);
            test.compile_exit_code = code;
            self.log(&format!("Test {}: compile '{}' -> {}.", test.id, cmd.trim(), code));
        }
    }

    /// Phase 3: run the binary under `timeout` with stdio redirected, then
    /// pick the timeout marker (124) out of either byte of the raw status.
    fn execute(&mut self, test: &mut TestCase) {
        let mut cmd = format!("timeout {} {}", test.timeout, exe_invocation(&test.exe_filename));
        if !test.args.is_empty() {
            cmd.push(' ');
            cmd.push_str(&test.args);
        }
        if let Some(input) = &test.input_filename {
            cmd.push_str(&format!(" < {}", input));
        }
        cmd.push_str(&format!(
            " > {} 2> {}",
            test.output_filename, test.error_filename
        ));
        let status = Command::new("sh")
            .arg("-c")
            .arg(&cmd)
            .status()
            .unwrap_or_else(|_| fatal(&format!("Couldn't run command '{}'.", cmd)));
        let raw = status.into_raw();
        test.hit_timeout = (raw & 0xff) == 124 || ((raw >> 8) & 0xff) == 124;
        test.run_exit_code = status.code().unwrap_or(raw);
        self.log(&format!("Test {}: run '{}' -> {}.", test.id, cmd, test.run_exit_code));
    }

    /// Phase 4: compare output with the expected file under the test's
    /// case/space policy. No expected file means a vacuous match.
    fn compare(&mut self, test: &mut TestCase) {
        let expect_file = match &test.expect_filename {
            Some(f) => f.clone(),
            None => return,
        };
        let expected = fs::read_to_string(&expect_file)
            .unwrap_or_else(|_| fatal(&format!("Couldn't read expected output '{}'.", expect_file)));
        let actual = fs::read_to_string(&test.output_filename).unwrap_or_default();
        test.output_match = outputs_match(&actual, &expected, test.match_case, test.match_space);
    }

    /// Run one shell command, killing it if it exceeds the compile cap.
    fn run_guarded(&mut self, cmd: &str) -> i32 {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .spawn()
            .unwrap_or_else(|_| fatal(&format!("Couldn't run command '{}'.", cmd)));
        match child.wait_timeout(Duration::from_secs(COMPILE_TIMEOUT)) {
            Ok(Some(status)) => status.code().unwrap_or(-1),
            Ok(None) => {
                child.kill().ok();
                child.wait().ok();
                self.log(&format!("Command '{}' exceeded {}s; killed.", cmd, COMPILE_TIMEOUT));
                124
            }
            Err(_) => fatal(&format!("Couldn't wait on command '{}'.", cmd)),
        }
    }

    fn log(&mut self, msg: &str) {
        if let Some(file) = &mut self.log_file {
            writeln!(file, "{}", msg).ok();
        }
        if self.vars.get("debug") == Some("true") {
            eprintln!("{}", msg);
        }
    }
}

/// `sh` needs a path, not a bare word, to run a binary in the working
/// directory.
fn exe_invocation(exe: &str) -> String {
    if exe.contains('/') {
        exe.to_owned()
    } else {
        format!("./{}", exe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exe_invocation() {
        assert_eq!(exe_invocation(".emperfect/Test0.exe"), ".emperfect/Test0.exe");
        assert_eq!(exe_invocation("a.out"), "./a.out");
    }
}
