// Copyright (c) 2019 King's College London created by the Software Development Team
// <http://soft-dev.org/>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, or the UPL-1.0 license <http://opensource.org/licenses/UPL>
// at your option. This file may not be copied, modified, or distributed except according to those
// terms.

//! HTML inline diff rendering over a character-level edit script.

use similar::{ChangeTag, TextDiff};

use crate::output::html_escape;

/// Render the differences between what was expected and what the program
/// produced as a single-cell HTML table. Characters missing from the actual
/// output show coral, unexpected characters green, everything else
/// light-gray.
pub(crate) fn render_inline_diff(expected: &str, actual: &str) -> String {
    let diff = TextDiff::from_chars(expected, actual);
    let mut html = String::from("<table><tr><td><pre>");
    let mut open: Option<ChangeTag> = None;
    for change in diff.iter_all_changes() {
        let tag = change.tag();
        if open != Some(tag) {
            if open.is_some() {
                html.push_str("</span>");
            }
            html.push_str(&format!("<span style=\"color: {}\">", colour(tag)));
            open = Some(tag);
        }
        let value = change.value();
        if tag == ChangeTag::Delete && value == "\0" {
            html.push_str("[NULL]");
        } else {
            html.push_str(&html_escape(value));
        }
    }
    if open.is_some() {
        html.push_str("</span>");
    }
    html.push_str("</pre></td></tr></table>\n");
    html
}

fn colour(tag: ChangeTag) -> &'static str {
    match tag {
        ChangeTag::Insert => "green",
        ChangeTag::Delete => "coral",
        ChangeTag::Equal => "lightgray",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_text_is_one_span() {
        let html = render_inline_diff("abc", "abc");
        assert_eq!(html.matches("<span").count(), 1);
        assert!(html.contains("lightgray"));
    }

    #[test]
    fn test_insert_and_delete_colours() {
        let html = render_inline_diff("hello", "HELLO");
        assert!(html.contains("color: coral"));
        assert!(html.contains("color: green"));
    }

    #[test]
    fn test_span_closes_on_type_change() {
        let html = render_inline_diff("ab", "ax");
        assert_eq!(html.matches("<span").count(), html.matches("</span>").count());
    }

    #[test]
    fn test_deleted_null_byte_is_literal() {
        let html = render_inline_diff("a\0b", "ab");
        assert!(html.contains("[NULL]"));
    }

    #[test]
    fn test_markup_in_input_is_escaped() {
        let html = render_inline_diff("<b>", "<b>");
        assert!(html.contains("&lt;b&gt;"));
    }
}
