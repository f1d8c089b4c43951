//! Magic-directive extraction and program classification.
//!
//! Snippets opt into run-control behavior through line comments of the
//! form `//playground:<tag> [args...]` placed in the leading comment
//! region of the file, before the package clause. This module scans the
//! source just far enough to find those comments and the package name,
//! then walks the top-level declarations to decide whether the snippet is
//! a program (has `func main()`) or a test suite (has `TestXxx` or
//! `BenchmarkXxx` functions).
//!
//! The scan is deliberately forgiving: when the source does not parse as a
//! sequence of Go declarations at all, classification succeeds with empty
//! directives and the compiler reports the syntax errors later, where they
//! come with line numbers the client can mark.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// Prefix that marks a run-control line comment.
pub const MAGIC_PREFIX: &str = "//playground:";

const TAG_VERSIONS: &str = "goversions";
const TAG_BUILD_ARGS: &str = "buildargs";
const TAG_EXEC_ARGS: &str = "execargs";
const TAG_PROFILE: &str = "pprof";

/// Run-control settings extracted from a snippet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    /// Whether the snippet declares `func main()`; otherwise it is built
    /// and executed as a test suite.
    pub has_main: bool,
    /// Toolchain aliases requested via `goversions`.
    pub versions: Vec<String>,
    /// Extra compiler flags from `buildargs`.
    pub build_args: Vec<String>,
    /// Extra binary flags from `execargs`.
    pub exec_args: Vec<String>,
    /// Profile modes from `pprof`.
    pub profile_modes: Vec<String>,
}

impl Directives {
    /// Whether any directive was present at all.
    pub fn any(&self) -> bool {
        !self.versions.is_empty()
            || !self.build_args.is_empty()
            || !self.exec_args.is_empty()
            || !self.profile_modes.is_empty()
    }
}

/// Why a snippet was rejected before any build was attempted.
///
/// The `Display` text is sent to the client verbatim as a status update,
/// so wording and trailing newlines are part of the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The package clause names something other than `main`.
    NotMainPackage,
    /// Neither a main function nor test functions (or both at once).
    NoEntryPoint,
    /// A magic comment that could not be tokenized; carries the literal.
    BadDirective(String),
    /// A magic comment with an unrecognized tag; carries the literal.
    UnknownDirective(String),
    /// `pprof` was requested on a snippet that is not a test suite.
    ProfileNeedsTests,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotMainPackage => write!(f, "Program must be in 'package main'.\n"),
            Rejection::NoEntryPoint => write!(
                f,
                "Program must have either a main function or a set of test functions.\n"
            ),
            Rejection::BadDirective(c) => {
                write!(f, "Unable to parse magic comment: {}", quote(c))
            }
            Rejection::UnknownDirective(c) => {
                write!(f, "Unknown magic comment: {}", quote(c))
            }
            Rejection::ProfileNeedsTests => write!(f, "Profiling is only available on test suites"),
        }
    }
}

/// Parse the snippet at `path`. The outer error is an IO failure reading
/// the file; the inner result separates usable directives from a rejection
/// the client should see.
pub fn parse_file(path: &Path) -> io::Result<Result<Directives, Rejection>> {
    let raw = fs::read(path)?;
    Ok(parse_source(&String::from_utf8_lossy(&raw)))
}

/// Parse snippet source.
pub fn parse_source(src: &str) -> Result<Directives, Rejection> {
    let mut directives = Directives::default();

    let Some(header) = scan_header(src) else {
        // No package clause found; the build will report the real error.
        return Ok(directives);
    };
    if header.package != "main" {
        return Err(Rejection::NotMainPackage);
    }

    let Some(funcs) = scan_functions(src) else {
        return Ok(directives);
    };
    let has_main = funcs
        .iter()
        .any(|f| !f.has_receiver && f.name == "main" && f.params == 0 && f.results == 0);
    let has_tests = funcs.iter().any(|f| {
        !f.has_receiver
            && (f.name.starts_with("Test") || f.name.starts_with("Benchmark"))
            && f.params == 1
            && f.results == 0
    });
    if has_main == has_tests {
        return Err(Rejection::NoEntryPoint);
    }
    directives.has_main = has_main;

    for comment in &header.comments {
        let Some(rest) = comment.strip_prefix(MAGIC_PREFIX) else {
            continue;
        };
        let Some(args) = split_args(rest) else {
            return Err(Rejection::BadDirective(comment.clone()));
        };
        match args[0].as_str() {
            TAG_VERSIONS => directives.versions = args[1..].to_vec(),
            TAG_BUILD_ARGS => directives.build_args = args[1..].to_vec(),
            TAG_EXEC_ARGS => directives.exec_args = args[1..].to_vec(),
            TAG_PROFILE => directives.profile_modes = args[1..].to_vec(),
            _ => return Err(Rejection::UnknownDirective(comment.clone())),
        }
    }
    if !has_tests && !directives.profile_modes.is_empty() {
        return Err(Rejection::ProfileNeedsTests);
    }
    Ok(directives)
}

/// Comments and package name of the leading region of the file.
struct Header {
    package: String,
    comments: Vec<String>,
}

/// Scan whitespace and comments up to the package clause.
///
/// Returns `None` when anything other than a comment precedes `package`,
/// or when the clause is missing entirely.
fn scan_header(src: &str) -> Option<Header> {
    let mut comments = Vec::new();
    let mut rest = src;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("//") {
            let end = after.find('\n').unwrap_or(after.len());
            comments.push(format!("//{}", &after[..end]));
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix("/*") {
            let end = after.find("*/")?;
            comments.push(format!("/*{}*/", &after[..end]));
            rest = &after[end + 2..];
        } else {
            let end = rest
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            if &rest[..end] != "package" {
                return None;
            }
            rest = rest[end..].trim_start();
            let end = rest
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            if end == 0 {
                return None;
            }
            return Some(Header {
                package: rest[..end].to_string(),
                comments,
            });
        }
    }
}

/// Signature facts about one top-level function declaration.
struct FuncSig {
    name: String,
    has_receiver: bool,
    params: usize,
    results: usize,
}

/// Walk the top-level declarations of the file and collect function
/// signatures. Returns `None` when the source is not a plausible sequence
/// of Go declarations, deferring diagnostics to the build.
fn scan_functions(src: &str) -> Option<Vec<FuncSig>> {
    let mut lx = Lexer::new(src);
    let mut funcs = Vec::new();

    if !lx.eat_ident("package") {
        return None;
    }
    match lx.next()? {
        Tok::Ident(_) => {}
        _ => return None,
    }

    loop {
        let tok = match lx.next() {
            None => return Some(funcs),
            Some(t) => t,
        };
        match tok {
            Tok::Ident(ref kw) if kw == "import" => skip_import(&mut lx)?,
            Tok::Ident(ref kw) if kw == "var" || kw == "const" || kw == "type" => {
                if lx.eat_punct('(') {
                    skip_group(&mut lx, '(', ')')?;
                } else {
                    skip_simple_decl(&mut lx)?;
                }
            }
            Tok::Ident(ref kw) if kw == "func" => funcs.push(parse_func(&mut lx)?),
            Tok::Punct(';') => {}
            _ => return None,
        }
    }
}

fn skip_import(lx: &mut Lexer) -> Option<()> {
    match lx.next()? {
        Tok::Punct('(') => skip_group(lx, '(', ')'),
        Tok::Literal => Some(()),
        // Aliased import: `alias "path"` or `. "path"` or `_ "path"`.
        Tok::Ident(_) | Tok::Punct('.') => match lx.next()? {
            Tok::Literal => Some(()),
            _ => None,
        },
        _ => None,
    }
}

/// Consume a single (unparenthesized) var/const/type declaration: tokens
/// until a newline or semicolon at bracket depth zero.
fn skip_simple_decl(lx: &mut Lexer) -> Option<()> {
    let mut depth = 0i32;
    let mut consumed = false;
    loop {
        let Some(spanned) = lx.peek() else {
            return if depth == 0 { Some(()) } else { None };
        };
        if depth == 0 && consumed && (spanned.nl_before || spanned.tok == Tok::Punct(';')) {
            if spanned.tok == Tok::Punct(';') {
                lx.next();
            }
            return Some(());
        }
        let spanned = lx.next_spanned()?;
        consumed = true;
        match spanned.tok {
            Tok::Punct('(') | Tok::Punct('[') | Tok::Punct('{') => depth += 1,
            Tok::Punct(')') | Tok::Punct(']') | Tok::Punct('}') => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
}

/// Consume tokens until the close bracket matching an already-consumed
/// open bracket.
fn skip_group(lx: &mut Lexer, open: char, close: char) -> Option<()> {
    let mut depth = 1i32;
    loop {
        match lx.next()? {
            Tok::Punct(c) if c == open => depth += 1,
            Tok::Punct(c) if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(());
                }
            }
            _ => {}
        }
    }
}

/// Parse one function declaration, the `func` keyword already consumed.
fn parse_func(lx: &mut Lexer) -> Option<FuncSig> {
    let mut has_receiver = false;
    let mut tok = lx.next()?;
    if tok == Tok::Punct('(') {
        has_receiver = true;
        skip_group(lx, '(', ')')?;
        tok = lx.next()?;
    }
    let name = match tok {
        Tok::Ident(name) => name,
        _ => return None,
    };
    // Type parameter list, if any.
    if lx.eat_punct('[') {
        skip_group(lx, '[', ']')?;
    }
    if !lx.eat_punct('(') {
        return None;
    }
    let params = count_fields(lx)?;
    let results = match lx.peek().map(|s| s.tok.clone()) {
        Some(Tok::Punct('{')) | None => 0,
        Some(Tok::Punct('(')) => {
            lx.next();
            count_fields(lx)?
        }
        Some(_) => {
            skip_result_type(lx)?;
            1
        }
    };
    if lx.eat_punct('{') {
        skip_group(lx, '{', '}')?;
    }
    Some(FuncSig {
        name,
        has_receiver,
        params,
        results,
    })
}

/// Count the comma-separated fields of a parameter or result group whose
/// opening parenthesis is already consumed. Grouped names (`a, b int`)
/// count once per name, matching how the toolchain counts fields.
fn count_fields(lx: &mut Lexer) -> Option<usize> {
    let mut depth = 1i32;
    let mut commas = 0usize;
    let mut any = false;
    loop {
        match lx.next()? {
            Tok::Punct('(') | Tok::Punct('[') | Tok::Punct('{') => {
                depth += 1;
                any = true;
            }
            Tok::Punct(')') | Tok::Punct(']') | Tok::Punct('}') => {
                depth -= 1;
                if depth == 0 {
                    return Some(if any { commas + 1 } else { 0 });
                }
                any = true;
            }
            Tok::Punct(',') => {
                if depth == 1 {
                    commas += 1;
                }
                any = true;
            }
            _ => any = true,
        }
    }
}

/// Consume a single unparenthesized result type, stopping in front of the
/// function body (or at a declaration boundary for bodyless functions).
fn skip_result_type(lx: &mut Lexer) -> Option<()> {
    let mut depth = 0i32;
    let mut consumed = false;
    loop {
        let Some(spanned) = lx.peek() else {
            return Some(());
        };
        if depth == 0 && spanned.tok == Tok::Punct('{') {
            return Some(());
        }
        if depth == 0 && consumed && spanned.nl_before {
            return Some(());
        }
        let spanned = lx.next_spanned()?;
        consumed = true;
        match spanned.tok {
            Tok::Punct('(') | Tok::Punct('[') => depth += 1,
            Tok::Punct(')') | Tok::Punct(']') => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Ident(String),
    Punct(char),
    /// String, rune, or numeric literal; the value is never needed.
    Literal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Spanned {
    tok: Tok,
    /// Whether a newline separated this token from the previous one.
    nl_before: bool,
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    peeked: Option<Option<Spanned>>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            peeked: None,
        }
    }

    fn peek(&mut self) -> Option<&Spanned> {
        if self.peeked.is_none() {
            let next = self.scan();
            self.peeked = Some(next);
        }
        self.peeked.as_ref().unwrap().as_ref()
    }

    fn next_spanned(&mut self) -> Option<Spanned> {
        match self.peeked.take() {
            Some(t) => t,
            None => self.scan(),
        }
    }

    fn next(&mut self) -> Option<Tok> {
        self.next_spanned().map(|s| s.tok)
    }

    /// Consume the next token if it is the given identifier.
    fn eat_ident(&mut self, ident: &str) -> bool {
        if matches!(self.peek(), Some(s) if s.tok == Tok::Ident(ident.to_string())) {
            self.next();
            true
        } else {
            false
        }
    }

    /// Consume the next token if it is the given punctuation.
    fn eat_punct(&mut self, punct: char) -> bool {
        if matches!(self.peek(), Some(s) if s.tok == Tok::Punct(punct)) {
            self.next();
            true
        } else {
            false
        }
    }

    fn scan(&mut self) -> Option<Spanned> {
        let mut nl_before = false;
        let bytes = self.src.as_bytes();
        loop {
            // Whitespace and comments.
            while self.pos < bytes.len() {
                match bytes[self.pos] {
                    b'\n' => {
                        nl_before = true;
                        self.pos += 1;
                    }
                    b' ' | b'\t' | b'\r' => self.pos += 1,
                    _ => break,
                }
            }
            if self.src[self.pos..].starts_with("//") {
                match self.src[self.pos..].find('\n') {
                    Some(i) => self.pos += i,
                    None => self.pos = self.src.len(),
                }
                continue;
            }
            if self.src[self.pos..].starts_with("/*") {
                let i = self.src[self.pos + 2..].find("*/")?;
                if self.src[self.pos..self.pos + 2 + i].contains('\n') {
                    nl_before = true;
                }
                self.pos += i + 4;
                continue;
            }
            break;
        }
        if self.pos >= self.src.len() {
            return None;
        }

        let rest = &self.src[self.pos..];
        let c = rest.chars().next()?;
        let tok = if c.is_alphabetic() || c == '_' {
            let end = rest
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            self.pos += end;
            Tok::Ident(rest[..end].to_string())
        } else if c.is_ascii_digit() {
            let end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '.' || c == '_'))
                .unwrap_or(rest.len());
            self.pos += end;
            Tok::Literal
        } else if c == '"' || c == '\'' {
            let mut iter = rest.char_indices().skip(1);
            loop {
                let (i, ch) = iter.next()?;
                match ch {
                    '\\' => {
                        iter.next()?;
                    }
                    '\n' => return None,
                    _ if ch == c => {
                        self.pos += i + 1;
                        break;
                    }
                    _ => {}
                }
            }
            Tok::Literal
        } else if c == '`' {
            let end = rest[1..].find('`')?;
            self.pos += end + 2;
            Tok::Literal
        } else {
            self.pos += c.len_utf8();
            Tok::Punct(c)
        };
        Some(Spanned { tok, nl_before })
    }
}

// ---------------------------------------------------------------------------
// Directive argument tokenization
// ---------------------------------------------------------------------------

/// Split directive text across whitespace, understanding double-quoted
/// tokens with standard string-literal escapes. Returns `None` when the
/// text is empty, starts with whitespace (the tag must touch the prefix),
/// begins with a quoted token, or contains a malformed quoted token.
fn split_args(s: &str) -> Option<Vec<String>> {
    if s.starts_with(|c: char| c.is_whitespace()) || s.starts_with('"') {
        return None;
    }
    let mut args = Vec::new();
    let mut rest = s;
    while !rest.is_empty() {
        if rest.starts_with('"') {
            let (value, remainder) = unquote(rest)?;
            args.push(value);
            rest = remainder.trim_start();
        } else {
            let end = rest
                .find(|c: char| c.is_whitespace())
                .unwrap_or(rest.len());
            args.push(rest[..end].to_string());
            rest = rest[end..].trim_start();
        }
    }
    if args.is_empty() {
        return None;
    }
    Some(args)
}

/// Parse a double-quoted string literal at the start of `s`, returning the
/// decoded value and the remainder after the closing quote.
fn unquote(s: &str) -> Option<(String, &str)> {
    let mut out = String::new();
    let mut iter = s.char_indices().skip(1);
    loop {
        let (i, c) = iter.next()?;
        match c {
            '"' => return Some((out, &s[i + 1..])),
            '\n' => return None,
            '\\' => {
                let (_, esc) = iter.next()?;
                match esc {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'a' => out.push('\x07'),
                    'b' => out.push('\x08'),
                    'f' => out.push('\x0c'),
                    'v' => out.push('\x0b'),
                    '\\' => out.push('\\'),
                    '"' => out.push('"'),
                    '\'' => out.push('\''),
                    'x' => {
                        let hi = iter.next()?.1.to_digit(16)?;
                        let lo = iter.next()?.1.to_digit(16)?;
                        out.push(char::from_u32(hi * 16 + lo)?);
                    }
                    'u' => {
                        let mut v = 0u32;
                        for _ in 0..4 {
                            v = v * 16 + iter.next()?.1.to_digit(16)?;
                        }
                        out.push(char::from_u32(v)?);
                    }
                    _ => return None,
                }
            }
            c => out.push(c),
        }
    }
}

/// Quote a string the way the diagnostics render literals: wrapped in
/// double quotes with backslash escapes for specials and control bytes.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
