//! Emperfect is an autograding harness for classroom C++ assignments. A
//! course-configured *recipe* file declares a compile pipeline and a set of
//! test cases; for each test the harness synthesizes a self-contained C++
//! source file splicing the instructor header with the per-test code,
//! compiles and executes it under a time limit, captures structured results
//! from in-program `CHECK(...)` / `CHECK_TYPE(...)` assertions plus an
//! external output comparison, and renders reports for one or more
//! audiences (student HTML, instructor HTML, a bare percent grade, ...).
//!
//! A small recipe looks as follows:
//!
//! ```text
//! :Init dir=".emperfect"
//!
//! :Compile cppflags="-std=c++17 -Wall"
//!   g++ ${cppflags} ${cpp} -o ${exe} 2> ${compile}
//!
//! :Header
//!   #include "student_code.hpp"
//!
//! :Output filename="student.html", detail="student"
//! :Output detail="percent"
//!
//! :TestCase name="Addition", points=5
//!   CHECK(Add(2, 2) == 4, "Add(2, 2) returned ", Add(2, 2));
//!   CHECK_TYPE(Add(1, 1), int);
//! ```
//!
//! Lines starting with `:` are directives; everything between a directive
//! and the next `:`-line forms that directive's block. `///` starts a line
//! comment, and `${name}` interpolates a recipe variable anywhere on a
//! line. Each `:TestCase` runs as soon as it is parsed: its code block is
//! rewritten so that every `CHECK` reports a structured record into a
//! per-test results file, the compile recipe is replayed with the per-test
//! variables (`${cpp}`, `${exe}`, `${compile}`, ...) filled in, and the
//! resulting binary runs under `timeout` with stdio redirected. Test
//! failures of any kind (compile error, timeout, wrong exit code, failed
//! check, output mismatch) are captured on the test record and reported;
//! only harness-internal errors (malformed recipes, unwritable
//! directories, ...) abort the run.
//!
//! The harness is driven from the command line:
//!
//! ```sh
//! $ emperfect grading.emp
//! ```
//!
//! or embedded:
//!
//! ```no_run
//! use emperfect::Emperfect;
//!
//! let mut harness = Emperfect::new();
//! harness.load_file("grading.emp");
//! harness.finalize();
//! ```

#![allow(clippy::new_without_default)]

mod checks;
mod codegen;
mod diff;
mod harness;
mod output;
mod recipe;
mod testcase;
mod vars;

pub use harness::Emperfect;
pub use output::DetailLevel;
pub use testcase::{Check, CheckKind, TestCase, TestStatus};

pub(crate) fn fatal(msg: &str) -> ! {
    eprintln!("\nFatal exception:\n  {}", msg);
    std::process::exit(1);
}
