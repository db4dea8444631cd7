// src/transform/literals.rs

//! Keeps string literals, regex literals and comments out of reach of the
//! regex passes in [`builtin`](super::builtin).
//!
//! [`shield`] swaps every literal for a `\0N\0` placeholder. The passes then
//! only ever see code, and [`Shielded::restore`] puts the literals back.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x00(\d+)\x00").expect("valid regex"));

/// Words after which a `/` starts a regex literal rather than a division.
const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "do", "else", "in", "of", "new", "delete", "void", "throw",
    "instanceof", "yield", "await",
];

/// Punctuation after which a `/` starts a regex literal.
const REGEX_PRECEDERS: &[u8] = b"(,=:[!&|?{};+-*%<>~^";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// `'` and `"` strings, `/* */` comments.
    Css,
    /// Adds template literals, regex literals and `//` comments.
    Js,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comments {
    /// Replace each comment with a space, or a newline if it spans lines.
    Drop,
    /// Shield comments like any other literal.
    Keep,
}

#[derive(Debug)]
pub struct Shielded {
    /// The source with every literal replaced by its placeholder.
    pub code: String,
    literals: Vec<String>,
}

impl Shielded {
    /// Substitute the original literals back into (transformed) `code`.
    pub fn restore(&self, code: &str) -> String {
        PLACEHOLDER
            .replace_all(code, |caps: &Captures<'_>| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| self.literals.get(i))
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Split `src` into code and shielded literals.
///
/// Fails on an unterminated string, template or block comment, and on
/// sources that already contain a NUL byte.
pub fn shield(src: &str, syntax: Syntax, comments: Comments) -> Result<Shielded, String> {
    if src.contains('\0') {
        return Err("source contains a NUL byte".to_string());
    }
    Scanner {
        src,
        syntax,
        comments,
        code: String::with_capacity(src.len()),
        literals: Vec::new(),
        last_significant: None,
    }
    .run()
}

enum Span {
    Literal(usize),
    Comment(usize),
}

struct Scanner<'a> {
    src: &'a str,
    syntax: Syntax,
    comments: Comments,
    code: String,
    literals: Vec<String>,
    /// Byte index of the last non-whitespace byte outside comments.
    last_significant: Option<usize>,
}

impl Scanner<'_> {
    fn run(mut self) -> Result<Shielded, String> {
        let src = self.src;
        let bytes = src.as_bytes();
        let js = self.syntax == Syntax::Js;

        let mut pos = 0;
        let mut code_start = 0;
        while pos < bytes.len() {
            let span = match bytes[pos] {
                b'"' | b'\'' => Some(Span::Literal(self.string_end(pos)?)),
                b'`' if js => Some(Span::Literal(self.template_end(pos)?)),
                b'/' => match bytes.get(pos + 1) {
                    Some(b'*') => Some(Span::Comment(self.block_comment_end(pos)?)),
                    Some(b'/') if js => Some(Span::Comment(
                        src[pos..].find('\n').map_or(src.len(), |i| pos + i),
                    )),
                    _ if js && self.regex_allowed() => self.regex_end(pos).map(Span::Literal),
                    _ => None,
                },
                _ => None,
            };

            let Some(span) = span else {
                if !bytes[pos].is_ascii_whitespace() {
                    self.last_significant = Some(pos);
                }
                pos += 1;
                continue;
            };

            self.code.push_str(&src[code_start..pos]);
            let end = match span {
                Span::Literal(end) => {
                    self.hide(&src[pos..end]);
                    self.last_significant = Some(end - 1);
                    end
                }
                Span::Comment(end) => {
                    let text = &src[pos..end];
                    match self.comments {
                        Comments::Keep => self.hide(text),
                        Comments::Drop if text.contains('\n') => self.code.push('\n'),
                        Comments::Drop => self.code.push(' '),
                    }
                    end
                }
            };
            pos = end;
            code_start = end;
        }
        self.code.push_str(&src[code_start..]);

        Ok(Shielded {
            code: self.code,
            literals: self.literals,
        })
    }

    fn hide(&mut self, literal: &str) {
        self.code.push_str(&format!("\0{}\0", self.literals.len()));
        self.literals.push(literal.to_string());
    }

    fn line_at(&self, pos: usize) -> usize {
        self.src[..pos].matches('\n').count() + 1
    }

    fn string_end(&self, start: usize) -> Result<usize, String> {
        let bytes = self.src.as_bytes();
        let quote = bytes[start];
        let mut i = start + 1;
        loop {
            match bytes.get(i) {
                Some(b'\\') => i += 2,
                Some(&b) if b == quote => return Ok(i + 1),
                None | Some(b'\n') => {
                    return Err(format!(
                        "unterminated string starting on line {}",
                        self.line_at(start)
                    ));
                }
                Some(_) => i += 1,
            }
        }
    }

    fn template_end(&self, start: usize) -> Result<usize, String> {
        let bytes = self.src.as_bytes();
        let mut i = start + 1;
        loop {
            match bytes.get(i) {
                Some(b'\\') => i += 2,
                Some(b'`') => return Ok(i + 1),
                Some(b'$') if bytes.get(i + 1) == Some(&b'{') => {
                    i = self.substitution_end(i + 2, start)?;
                }
                Some(_) => i += 1,
                None => {
                    return Err(format!(
                        "unterminated template literal starting on line {}",
                        self.line_at(start)
                    ));
                }
            }
        }
    }

    /// End of a `${ ... }` substitution whose body starts at `body`.
    fn substitution_end(&self, body: usize, template: usize) -> Result<usize, String> {
        let bytes = self.src.as_bytes();
        let mut depth = 1usize;
        let mut i = body;
        loop {
            match bytes.get(i) {
                Some(b'{') => {
                    depth += 1;
                    i += 1;
                }
                Some(b'}') => {
                    depth -= 1;
                    i += 1;
                    if depth == 0 {
                        return Ok(i);
                    }
                }
                Some(b'"' | b'\'') => i = self.string_end(i)?,
                Some(b'`') => i = self.template_end(i)?,
                Some(b'/') if bytes.get(i + 1) == Some(&b'*') => {
                    i = self.block_comment_end(i)?;
                }
                Some(_) => i += 1,
                None => {
                    return Err(format!(
                        "unterminated template literal starting on line {}",
                        self.line_at(template)
                    ));
                }
            }
        }
    }

    fn block_comment_end(&self, start: usize) -> Result<usize, String> {
        self.src[start + 2..]
            .find("*/")
            .map(|i| start + 2 + i + 2)
            .ok_or_else(|| {
                format!(
                    "unterminated comment starting on line {}",
                    self.line_at(start)
                )
            })
    }

    /// Whether a `/` here begins a regex literal, judged by the token
    /// before it.
    fn regex_allowed(&self) -> bool {
        let bytes = self.src.as_bytes();
        let Some(last) = self.last_significant else {
            return true;
        };
        let b = bytes[last];
        if is_ident_byte(b) {
            let word_start = bytes[..=last]
                .iter()
                .rposition(|c| !is_ident_byte(*c))
                .map_or(0, |p| p + 1);
            return REGEX_KEYWORDS.contains(&&self.src[word_start..=last]);
        }
        REGEX_PRECEDERS.contains(&b)
    }

    /// `None` when the literal does not close on the same line, in which
    /// case the `/` is treated as code.
    fn regex_end(&self, start: usize) -> Option<usize> {
        let bytes = self.src.as_bytes();
        let mut in_class = false;
        let mut i = start + 1;
        loop {
            match bytes.get(i) {
                None | Some(b'\n') => return None,
                Some(b'\\') => i += 2,
                Some(b'[') => {
                    in_class = true;
                    i += 1;
                }
                Some(b']') => {
                    in_class = false;
                    i += 1;
                }
                Some(b'/') if !in_class => {
                    i += 1;
                    while bytes.get(i).is_some_and(u8::is_ascii_alphabetic) {
                        i += 1;
                    }
                    return Some(i);
                }
                Some(_) => i += 1,
            }
        }
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_and_comments_are_shielded_then_restored() {
        let src = "a = \"/* x */\"; /* gone */ b = '//';";
        let shielded = shield(src, Syntax::Js, Comments::Drop).unwrap();

        assert_eq!(shielded.code, "a = \00\0;   b = \01\0;");
        assert_eq!(
            shielded.restore(&shielded.code),
            "a = \"/* x */\";   b = '//';"
        );
    }

    #[test]
    fn slash_after_operand_is_division() {
        let shielded = shield("x = a / b / c;", Syntax::Js, Comments::Drop).unwrap();
        assert_eq!(shielded.code, "x = a / b / c;");

        let shielded = shield("return /a*b/g.test(s);", Syntax::Js, Comments::Drop).unwrap();
        assert_eq!(shielded.code, "return \00\0.test(s);");
    }

    #[test]
    fn template_substitutions_may_nest_strings_and_braces() {
        let src = "t = `a ${f({ k: \"`\" })} b`; c();";
        let shielded = shield(src, Syntax::Js, Comments::Drop).unwrap();
        assert_eq!(shielded.code, "t = \00\0; c();");
    }

    #[test]
    fn kept_comments_survive_restore() {
        let src = "// head\nrun(); /* tail */";
        let shielded = shield(src, Syntax::Js, Comments::Keep).unwrap();
        assert_eq!(shielded.code, "\00\0\nrun(); \01\0");
        assert_eq!(shielded.restore(&shielded.code), src);
    }

    #[test]
    fn css_has_no_line_comments_or_templates() {
        let shielded = shield("a{b:url(//x/`y`)}", Syntax::Css, Comments::Drop).unwrap();
        assert_eq!(shielded.code, "a{b:url(//x/`y`)}");
    }

    #[test]
    fn unterminated_literals_are_errors() {
        let err = shield("a;\nb = 'open;\n", Syntax::Js, Comments::Drop).unwrap_err();
        assert!(err.contains("line 2"), "{err}");
        assert!(shield("x = `open", Syntax::Js, Comments::Drop).is_err());
        assert!(shield(".a{} /* open", Syntax::Css, Comments::Drop).is_err());
        assert!(shield("a\0b", Syntax::Css, Comments::Drop).is_err());
    }
}
