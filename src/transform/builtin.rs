// src/transform/builtin.rs

//! In-process text transforms.
//!
//! None of them parse the language. String literals, regex literals and
//! comments are shielded first (see [`literals`](super::literals)), so the
//! regex passes below only rewrite code.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::TransformError;
use crate::pipeline::step::StepKind;

use super::literals::{Comments, Syntax, shield};
use super::{Asset, Transform, TransformFuture};

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static CSS_PUNCT_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*([{};,>])\s*").expect("valid regex"));
static CSS_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^{};]+").expect("valid regex"));
static CSS_DECL_COLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*:\s*").expect("valid regex"));
static CONSOLE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bconsole\s*\.\s*[A-Za-z_$][\w$]*\s*\(").expect("valid regex")
});
static DEBUGGER_STMT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^.\w$])debugger\b[ \t]*;?").expect("valid regex")
});
static HTML_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static HTML_INTERTAG_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s+<").expect("valid regex"));

/// Which built-in operation to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltinOp {
    MinifyCss,
    MinifyJs,
    StripDebug,
    StripHtmlComments,
    MinifyHtml { collapse_whitespace: bool },
    RenameFile(String),
    RenameExt(String),
}

#[derive(Debug, Clone)]
pub struct Builtin {
    name: &'static str,
    op: BuiltinOp,
}

impl Builtin {
    pub fn new(name: &'static str, op: BuiltinOp) -> Self {
        Self { name, op }
    }

    pub fn from_kind(kind: &StepKind) -> Result<Self, String> {
        let op = match kind {
            StepKind::MinifyCss => BuiltinOp::MinifyCss,
            StepKind::MinifyJs => BuiltinOp::MinifyJs,
            StepKind::StripDebug => BuiltinOp::StripDebug,
            StepKind::StripHtmlComments => BuiltinOp::StripHtmlComments,
            StepKind::MinifyHtml {
                collapse_whitespace,
            } => BuiltinOp::MinifyHtml {
                collapse_whitespace: *collapse_whitespace,
            },
            StepKind::Rename {
                file: Some(file), ..
            } => BuiltinOp::RenameFile(file.clone()),
            StepKind::Rename {
                extname: Some(ext), ..
            } => BuiltinOp::RenameExt(ext.clone()),
            other => return Err(format!("'{}' is not a built-in step", other.name())),
        };
        Ok(Self::new(kind.name(), op))
    }

    /// Synchronous core of [`Transform::apply`].
    pub fn run(&self, asset: Asset) -> Result<Asset, TransformError> {
        match &self.op {
            BuiltinOp::MinifyCss => self.rewrite_text(asset, minify_css),
            BuiltinOp::MinifyJs => self.rewrite_text(asset, minify_js),
            BuiltinOp::StripDebug => self.rewrite_text(asset, strip_debug),
            BuiltinOp::StripHtmlComments => {
                let out = HTML_COMMENT.replace_all(asset.text(self.name)?, "").into_owned();
                Ok(asset.with_contents(out))
            }
            BuiltinOp::MinifyHtml {
                collapse_whitespace,
            } => {
                let out = minify_html(asset.text(self.name)?, *collapse_whitespace);
                Ok(asset.with_contents(out))
            }
            BuiltinOp::RenameFile(file) => Ok(Asset {
                rel_path: asset.rel_path.with_file_name(file),
                contents: asset.contents,
            }),
            BuiltinOp::RenameExt(ext) => Ok(Asset {
                rel_path: replace_extension(&asset.rel_path, ext),
                contents: asset.contents,
            }),
        }
    }

    fn rewrite_text(
        &self,
        asset: Asset,
        op: fn(&str) -> Result<String, String>,
    ) -> Result<Asset, TransformError> {
        let out = op(asset.text(self.name)?).map_err(|msg| {
            TransformError::new(self.name, format!("{}: {msg}", asset.rel_path.display()))
        })?;
        Ok(asset.with_contents(out))
    }
}

impl Transform for Builtin {
    fn name(&self) -> &str {
        self.name
    }

    fn apply(&self, asset: Asset) -> TransformFuture<'_> {
        Box::pin(async move { self.run(asset) })
    }
}

/// Strip comments and redundant whitespace from a stylesheet.
///
/// Fails on unbalanced braces, which is the one structural error that would
/// otherwise produce silently broken output.
pub fn minify_css(src: &str) -> Result<String, String> {
    let shielded = shield(src, Syntax::Css, Comments::Drop)?;

    let mut depth: i64 = 0;
    for (line_no, line) in shielded.code.lines().enumerate() {
        for c in line.chars() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(format!("unexpected '}}' on line {}", line_no + 1));
                    }
                }
                _ => {}
            }
        }
    }
    if depth != 0 {
        return Err(format!("{depth} unclosed '{{'"));
    }

    let collapsed = WHITESPACE_RUN.replace_all(&shielded.code, " ");
    let tight = CSS_PUNCT_SPACE.replace_all(&collapsed, "$1");
    let tight = tighten_declarations(&tight);
    Ok(shielded.restore(tight.replace(";}", "}").trim()))
}

/// Drop the space around the first `:` of every declaration. Selectors keep
/// theirs, since `a :hover` and `a:hover` select different elements.
fn tighten_declarations(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut last = 0;
    for segment in CSS_SEGMENT.find_iter(css) {
        out.push_str(&css[last..segment.start()]);
        if css[segment.end()..].starts_with('{') {
            out.push_str(segment.as_str());
        } else {
            out.push_str(&CSS_DECL_COLON.replacen(segment.as_str(), 1, ":"));
        }
        last = segment.end();
    }
    out.push_str(&css[last..]);
    out
}

/// Drop comments, indentation and blank lines. Statements are never
/// joined, so ASI-dependent code stays intact.
pub fn minify_js(src: &str) -> Result<String, String> {
    let shielded = shield(src, Syntax::Js, Comments::Drop)?;
    let code = shielded
        .code
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    Ok(shielded.restore(&code))
}

/// Replace `console.*(...)` calls with `void 0` and `debugger` statements
/// with an empty statement.
///
/// Both keep the surrounding statement well formed, so a guarded
/// `if (x) console.log(y);` stays a guarded no-op.
pub fn strip_debug(src: &str) -> Result<String, String> {
    let shielded = shield(src, Syntax::Js, Comments::Keep)?;
    let code = &shielded.code;

    let mut out = String::with_capacity(code.len());
    let mut last = 0;
    for call in CONSOLE_CALL.find_iter(code) {
        // Nested inside a call that was already replaced.
        if call.start() < last {
            continue;
        }
        if code[..call.start()].trim_end().ends_with('.') {
            continue;
        }
        let Some(close) = closing_paren(code, call.end() - 1) else {
            continue;
        };
        out.push_str(&code[last..call.start()]);
        out.push_str("void 0");
        last = close + 1;
    }
    out.push_str(&code[last..]);

    let out = DEBUGGER_STMT.replace_all(&out, "${1};");
    Ok(shielded.restore(&out))
}

/// Index of the `)` matching the `(` at `open`. Literals are already
/// shielded, so every paren left is code.
fn closing_paren(code: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in code.bytes().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn minify_html(src: &str, collapse_whitespace: bool) -> String {
    if !collapse_whitespace {
        return src.trim().to_string();
    }
    let tight = HTML_INTERTAG_SPACE.replace_all(src, "><");
    WHITESPACE_RUN.replace_all(&tight, " ").trim().to_string()
}

fn replace_extension(path: &std::path::Path, ext: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{ext}")
    };
    path.with_file_name(format!("{stem}{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minify_css_collapses_whitespace_and_comments() {
        let src = "/* header */\n.a  {\n  color: red;\n  margin : 0 ;\n}\n\n.b > .c { top: 1px; }\n";
        assert_eq!(
            minify_css(src).unwrap(),
            ".a{color:red;margin:0}.b>.c{top:1px}"
        );
    }

    #[test]
    fn minify_css_leaves_quoted_values_alone() {
        let src = ".a::after {\n  content: \"a, b > c }\";\n  font-family: 'x , y';\n}\n";
        assert_eq!(
            minify_css(src).unwrap(),
            ".a::after{content:\"a, b > c }\";font-family:'x , y'}"
        );

        let src = "a { background: url(\"img/*.png\") ; } /* tail */";
        assert_eq!(minify_css(src).unwrap(), "a{background:url(\"img/*.png\")}");
    }

    #[test]
    fn minify_css_keeps_selector_spacing_before_colons() {
        let src = "nav :hover { color : blue }";
        assert_eq!(minify_css(src).unwrap(), "nav :hover{color:blue}");
    }

    #[test]
    fn minify_css_rejects_broken_input() {
        assert!(minify_css(".a { color: red;").is_err());
        assert!(minify_css(".a { color: red; }}").is_err());
        assert!(minify_css(".a { color: red; } /* open").is_err());
    }

    #[test]
    fn minify_js_keeps_statements_on_separate_lines() {
        let src = "/** doc */\nfunction f() {\n    // note\n    return 1;\n}\n\n\nf();\n";
        assert_eq!(minify_js(src).unwrap(), "function f() {\nreturn 1;\n}\nf();");
    }

    #[test]
    fn minify_js_never_touches_string_contents() {
        let src = "var glob = \"src/**/*.js\";\nvar url = 'https://api.vk.com/method/*';\nvar e = '*/';";
        assert_eq!(minify_js(src).unwrap(), src);
    }

    #[test]
    fn minify_js_keeps_template_lines_and_regex_literals() {
        let src = "const t = `a\n    /* keep */\n`;  // trailing\nvar re = /\\/*[a-z]+/g;\nx = a / b / c;\n";
        assert_eq!(
            minify_js(src).unwrap(),
            "const t = `a\n    /* keep */\n`;\nvar re = /\\/*[a-z]+/g;\nx = a / b / c;"
        );
    }

    #[test]
    fn minify_js_fails_on_unterminated_literal() {
        assert!(minify_js("let s = 'open;\nrun();\n").is_err());
    }

    #[test]
    fn strip_debug_replaces_console_calls_and_debugger() {
        let src = "a();\nconsole.log(foo(1), 'x');\ndebugger;\nconsole.warn('y')\nb();";
        assert_eq!(
            strip_debug(src).unwrap(),
            "a();\nvoid 0;\n;\nvoid 0\nb();"
        );
    }

    #[test]
    fn strip_debug_keeps_guarded_statements_well_formed() {
        assert_eq!(
            strip_debug("if (debug) console.log(state);\nsave();").unwrap(),
            "if (debug) void 0;\nsave();"
        );
        assert_eq!(
            strip_debug("if (x) debugger\nrun();").unwrap(),
            "if (x) ;\nrun();"
        );
    }

    #[test]
    fn strip_debug_balances_nested_calls() {
        assert_eq!(
            strip_debug("load().catch(e => console.error(e));\nnext();").unwrap(),
            "load().catch(e => void 0);\nnext();"
        );
        assert_eq!(
            strip_debug("console.log(\")\", console.count(), f(g()));").unwrap(),
            "void 0;"
        );
    }

    #[test]
    fn strip_debug_ignores_strings_comments_and_references() {
        let src = "const msg = \"console.log(x)\"; // console.warn(y)\nlog('debugger');\nconst out = console.log;\nthis.debugger = 1;";
        assert_eq!(strip_debug(src).unwrap(), src);
    }

    #[test]
    fn strip_debug_leaves_an_unclosed_call() {
        assert_eq!(strip_debug("console.log(a").unwrap(), "console.log(a");
    }

    #[test]
    fn html_comments_and_whitespace() {
        let html = "<div>\n  <!-- remove me -->\n  <p>hi   there</p>\n</div>\n";
        let stripped = HTML_COMMENT.replace_all(html, "");
        assert_eq!(minify_html(&stripped, true), "<div><p>hi there</p></div>");
        assert_eq!(minify_html("  <p> x </p>\n", false), "<p> x </p>");
    }

    #[test]
    fn html_comments_are_removed_one_at_a_time() {
        let t = Builtin::new("strip-html-comments", BuiltinOp::StripHtmlComments);
        let out = t
            .run(Asset::new("a.html", "<a><!-- x\n y --><b></b><!-- z --></a>"))
            .unwrap();
        assert_eq!(out.contents, b"<a><b></b></a>");
    }

    #[test]
    fn collapsing_html_keeps_inline_text_spacing() {
        assert_eq!(
            minify_html("<p>\n  a <b>bold</b>\n  c\n</p>", true),
            "<p> a <b>bold</b> c </p>"
        );
    }

    #[test]
    fn rename_variants() {
        let ext = Builtin::new("rename", BuiltinOp::RenameExt(".min.css".into()));
        let out = ext.run(Asset::new("nested/site.scss", b"".to_vec())).unwrap();
        assert_eq!(out.rel_path, PathBuf::from("nested/site.min.css"));

        let file = Builtin::new("rename", BuiltinOp::RenameFile("index.html".into()));
        let out = file
            .run(Asset::new("index_uncompressed.html", b"".to_vec()))
            .unwrap();
        assert_eq!(out.rel_path, PathBuf::from("index.html"));
    }

    #[test]
    fn rename_ext_replaces_only_the_last_extension() {
        let ext = Builtin::new("rename", BuiltinOp::RenameExt("zip".into()));
        let out = ext.run(Asset::new("archive.tar.gz", b"".to_vec())).unwrap();
        assert_eq!(out.rel_path, PathBuf::from("archive.tar.zip"));

        let out = ext.run(Asset::new("LICENSE", b"".to_vec())).unwrap();
        assert_eq!(out.rel_path, PathBuf::from("LICENSE.zip"));
    }

    #[test]
    fn transform_errors_name_the_step_and_file() {
        let t = Builtin::new("minify-js", BuiltinOp::MinifyJs);
        let err = t.run(Asset::new("bad.js", vec![0xff, 0xfe])).unwrap_err();
        assert_eq!(err.step, "minify-js");

        let t = Builtin::new("minify-css", BuiltinOp::MinifyCss);
        let err = t.run(Asset::new("site.css", ".a {")).unwrap_err();
        assert_eq!(err.step, "minify-css");
        assert!(err.message.starts_with("site.css:"), "{}", err.message);
    }
}
