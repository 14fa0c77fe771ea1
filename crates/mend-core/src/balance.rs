//! Structural-imbalance repair for brace-delimited sources.
//!
//! A line-level patch cannot safely fix a file whose `{`/`}` nesting is
//! broken, and this crate does not parse the language. What it can do is
//! restore gross count parity:
//!
//! 1. Blank out `//` line comments, `/* */` block comments, and the bodies
//!    of string and character literals (`"a{b"` becomes `""`, `'{'` becomes
//!    `''`), so grouping characters inside them are not counted.
//! 2. Count the remaining opening and closing characters.
//! 3. If there are more opens than closes, append the deficit as closing
//!    characters at the end of the file, one per line, under a marked
//!    comment.
//!
//! The reinsertion point is always the end of the file. The counts are
//! recomputed from the text passed in on every call, so running the rule
//! on its own output is a no-op.

use serde::{Deserialize, Serialize};

/// Text of the comment line written above appended closers.
pub const APPENDED_NOTE: &str = "Appended by mend to close unbalanced braces";

/// Parameters of the balance rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSpec {
    pub open: char,
    pub close: char,
    /// Line-comment prefix used for the appended note.
    pub comment: String,
}

impl Default for BalanceSpec {
    fn default() -> Self {
        Self {
            open: '{',
            close: '}',
            comment: "//".to_string(),
        }
    }
}

/// Result of one balance pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceOutcome {
    pub content: String,
    pub opens: usize,
    pub closes: usize,
    /// Number of closing characters appended (0 when already balanced).
    pub appended: usize,
}

/// Remove comments and literal bodies, keeping line structure.
///
/// Unterminated string literals end at the next newline so that a stray
/// quote cannot swallow the rest of the file.
pub fn strip_comments_and_strings(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match (c, next) {
            ('/', Some('/')) => {
                i += 2;
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    if chars[i] == '\n' {
                        out.push('\n');
                    }
                    i += 1;
                }
                // Skip the closing "*/" if present.
                i = (i + 2).min(chars.len());
                out.push(' ');
            }
            ('"', _) => {
                out.push_str("\"\"");
                i += 1;
                while i < chars.len() {
                    match chars[i] {
                        '\\' => i += 2,
                        '"' => {
                            i += 1;
                            break;
                        }
                        '\n' => break,
                        _ => i += 1,
                    }
                }
            }
            ('\'', _) => match char_literal_len(&chars[i..]) {
                Some(len) => {
                    out.push_str("''");
                    i += len;
                }
                None => {
                    out.push(c);
                    i += 1;
                }
            },
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Length of a character literal starting at `s[0] == '\''`, if it is one.
///
/// Accepts `'x'` and short escapes such as `'\n'`, `'\''`, `'\x7b'`.
/// A lone apostrophe (digit separators, prose) is not a literal.
fn char_literal_len(s: &[char]) -> Option<usize> {
    match s.get(1)? {
        '\\' => {
            // Closing quote must follow within a short escape sequence.
            (3..s.len().min(12))
                .take_while(|&j| s[j - 1] != '\n')
                .find(|&j| s[j] == '\'')
                .map(|j| j + 1)
        }
        '\n' | '\'' => None,
        _ => (s.get(2) == Some(&'\'')).then_some(3),
    }
}

/// Count `(opens, closes)` of `spec`'s grouping characters outside
/// comments and literals.
pub fn count_groups(text: &str, spec: &BalanceSpec) -> (usize, usize) {
    let stripped = strip_comments_and_strings(text);
    stripped.chars().fold((0, 0), |(o, c), ch| {
        if ch == spec.open {
            (o + 1, c)
        } else if ch == spec.close {
            (o, c + 1)
        } else {
            (o, c)
        }
    })
}

/// Append the missing closers, or return the input untouched.
pub fn balance(text: &str, spec: &BalanceSpec) -> BalanceOutcome {
    let (opens, closes) = count_groups(text, spec);

    if opens <= closes {
        return BalanceOutcome {
            content: text.to_string(),
            opens,
            closes,
            appended: 0,
        };
    }

    let missing = opens - closes;
    let mut content = String::with_capacity(text.len() + 64 + missing * 2);
    content.push_str(text);
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&format!("{} {}\n", spec.comment, APPENDED_NOTE));
    for _ in 0..missing {
        content.push(spec.close);
        content.push('\n');
    }

    BalanceOutcome {
        content,
        opens,
        closes,
        appended: missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> BalanceSpec {
        BalanceSpec::default()
    }

    #[test]
    fn strips_line_and_block_comments() {
        let src = "int a; // {\n/* { { */ int b;\n";
        let stripped = strip_comments_and_strings(src);
        assert!(!stripped.contains('{'));
        assert!(stripped.contains("int a;"));
        assert!(stripped.contains("int b;"));
    }

    #[test]
    fn strips_string_bodies_to_empty_placeholder() {
        let stripped = strip_comments_and_strings(r#"auto s = "a{b\"}"; f();"#);
        assert_eq!(stripped, r#"auto s = ""; f();"#);
    }

    #[test]
    fn strips_char_literals() {
        let stripped = strip_comments_and_strings("if (c == '{' || c == '\\'') {");
        assert_eq!(stripped, "if (c == '' || c == '') {");
    }

    #[test]
    fn lone_apostrophe_is_kept() {
        let stripped = strip_comments_and_strings("int n = 1'000; {");
        assert_eq!(stripped, "int n = 1'000; {");
    }

    #[test]
    fn comment_markers_inside_strings_are_not_comments() {
        let src = "auto url = \"http://x\"; {\n";
        assert_eq!(count_groups(src, &spec()), (1, 0));
    }

    #[test]
    fn unterminated_string_stops_at_newline() {
        let src = "auto s = \"oops\n{\n";
        assert_eq!(count_groups(src, &spec()), (1, 0));
    }

    #[test]
    fn balanced_input_is_unchanged() {
        let src = "namespace a {\nvoid f() { }\n}\n";
        let out = balance(src, &spec());
        assert_eq!(out.content, src);
        assert_eq!(out.appended, 0);
    }

    #[test]
    fn extra_closers_are_left_alone() {
        let src = "}\n}\n";
        let out = balance(src, &spec());
        assert_eq!(out.content, src);
        assert_eq!((out.opens, out.closes), (0, 2));
    }

    #[test]
    fn appends_exactly_the_deficit() {
        let src = "namespace a {\nnamespace b {\nvoid f() {\n  g(\"}\"); // }\n";
        let out = balance(src, &spec());
        assert_eq!(out.appended, 3);
        let expected = format!("{}// {}\n}}\n}}\n}}\n", src, APPENDED_NOTE);
        assert_eq!(out.content, expected);
    }

    #[test]
    fn adds_newline_before_note_when_missing() {
        let out = balance("{", &spec());
        assert_eq!(out.content, format!("{{\n// {}\n}}\n", APPENDED_NOTE));
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let src = "struct A {\n  int x;\n";
        let once = balance(src, &spec());
        let twice = balance(&once.content, &spec());
        assert_eq!(once.appended, 1);
        assert_eq!(twice.appended, 0);
        assert_eq!(twice.content, once.content);
    }

    #[test]
    fn custom_grouping_characters() {
        let spec = BalanceSpec {
            open: '[',
            close: ']',
            comment: "#".to_string(),
        };
        let out = balance("xs = [[1, 2]\n", &spec);
        assert_eq!(out.appended, 1);
        assert!(out.content.ends_with(&format!("# {}\n]\n", APPENDED_NOTE)));
    }
}
