// Copyright (c) 2019 King's College London created by the Software Development Team
// <http://soft-dev.org/>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, or the UPL-1.0 license <http://opensource.org/licenses/UPL>
// at your option. This file may not be copied, modified, or distributed except according to those
// terms.

//! Recipe scanning: comment stripping, a line cursor, and block reads.

/// Everything from this marker to the end of a line is a comment.
const COMMENT_MARKER: &str = "///";

/// A recipe source, pre-split into comment-stripped lines with a cursor over
/// them. Whitespace inside and around surviving content is preserved; it may
/// end up inside generated C++ source.
pub(crate) struct Recipe {
    lines: Vec<String>,
    pos: usize,
}

impl Recipe {
    pub fn new(src: &str) -> Self {
        let lines = src.lines().map(strip_comment).collect();
        Recipe { lines, pos: 0 }
    }

    /// The (1-based) number of the line the cursor is about to read; used in
    /// error reports.
    pub fn line_num(&self) -> usize {
        self.pos + 1
    }

    pub fn next_line(&mut self) -> Option<String> {
        let line = self.lines.get(self.pos).cloned();
        if line.is_some() {
            self.pos += 1;
        }
        line
    }

    /// Read all subsequent non-empty lines up to, but not including, the
    /// next line whose first character is `:`. With `skip_whitespace`,
    /// all-whitespace lines are discarded too (used for code blocks).
    pub fn read_block(&mut self, skip_whitespace: bool) -> Vec<String> {
        let mut block = Vec::new();
        while let Some(line) = self.lines.get(self.pos) {
            if line.starts_with(':') {
                break;
            }
            if !line.is_empty() && !(skip_whitespace && line.trim().is_empty()) {
                block.push(line.clone());
            }
            self.pos += 1;
        }
        block
    }
}

fn strip_comment(line: &str) -> String {
    match line.find(COMMENT_MARKER) {
        Some(idx) => line[..idx].to_owned(),
        None => line.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comments_are_stripped() {
        let mut r = Recipe::new("a /// trailing\n/// whole line\nb");
        assert_eq!(r.next_line(), Some("a ".to_owned()));
        assert_eq!(r.next_line(), Some("".to_owned()));
        assert_eq!(r.next_line(), Some("b".to_owned()));
        assert_eq!(r.next_line(), None);
    }

    #[test]
    fn test_block_stops_at_directive() {
        let mut r = Recipe::new(":Compile\n  g++ x\n  strip y\n:TestCase\n  body");
        assert_eq!(r.next_line(), Some(":Compile".to_owned()));
        assert_eq!(r.read_block(false), vec!["  g++ x", "  strip y"]);
        assert_eq!(r.next_line(), Some(":TestCase".to_owned()));
    }

    #[test]
    fn test_indented_colon_is_content() {
        let mut r = Recipe::new(":Header\n  label: x\n:Output");
        r.next_line();
        assert_eq!(r.read_block(false), vec!["  label: x"]);
    }

    #[test]
    fn test_whitespace_line_handling() {
        let mut r = Recipe::new(":X\n  a\n   \n  b\n");
        r.next_line();
        assert_eq!(r.read_block(true), vec!["  a", "  b"]);
        let mut r = Recipe::new(":X\n  a\n   \n  b\n");
        r.next_line();
        assert_eq!(r.read_block(false), vec!["  a", "   ", "  b"]);
    }
}
