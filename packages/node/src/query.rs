//! SPARQL query templates.
//!
//! A template is ordinary SPARQL whose free variables double as named
//! parameters. [`QueryTemplate::bind`] never splices text into the query
//! body: bound values are RDF terms, written in their N-Triples form into a
//! `VALUES` block that is injected at the start of the query's WHERE group.
//! An unbound parameter stays a free variable, so templates test for it
//! with `!BOUND(?from) || ...` where needed.
//!
//! ```sparql
//! SELECT ?identifier ?datestamp WHERE {
//!   VALUES (?identifier) { ("record1") }      # injected
//!   ?resource dc:identifier ?identifier .
//! }
//! ```
//!
//! Templates are loaded once at startup with [`QueryTemplates::load_dir`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use oxigraph::model::Term;
use regex::Regex;

use crate::graph::Namespaces;

/// Header selection for exactly one identifier.
pub const IDENTIFIED_HEADER_SELECT: &str = "identifiedHeaderSelect";
/// Header selection bounded by `?from`/`?until`.
pub const DATE_RANGE_HEADERS_SELECT: &str = "dateRangeHeadersSelect";
/// Header selection without any bound.
pub const ALL_HEADERS_SELECT: &str = "allHeadersSelect";
/// Metadata graph of one `?identifier`.
pub const RECORD_CONSTRUCT: &str = "recordConstruct";

/// Every template a query-backed store needs.
pub const REQUIRED_TEMPLATES: [&str; 4] = [
    IDENTIFIED_HEADER_SELECT,
    DATE_RANGE_HEADERS_SELECT,
    ALL_HEADERS_SELECT,
    RECORD_CONSTRUCT,
];

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("no query template named {0:?}")]
    Unknown(String),

    #[error("template {template:?}: {message}")]
    Malformed { template: String, message: String },

    #[error("{0:?} is not a valid SPARQL variable name")]
    InvalidVariable(String),

    #[error("cannot read templates from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// Named values for one template call.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: Vec<(String, Term)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `?name` to `value`, replacing an earlier binding of the same name.
    pub fn with(mut self, name: &str, value: impl Into<Term>) -> Self {
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name.to_string(), value)),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn values_clause(&self) -> Result<String, TemplateError> {
        let mut vars = Vec::with_capacity(self.values.len());
        let mut terms = Vec::with_capacity(self.values.len());
        for (name, term) in &self.values {
            if !VARIABLE_RE.is_match(name) {
                return Err(TemplateError::InvalidVariable(name.clone()));
            }
            vars.push(format!("?{name}"));
            terms.push(term.to_string());
        }
        Ok(format!(
            " VALUES ({}) {{ ({}) }} ",
            vars.join(" "),
            terms.join(" ")
        ))
    }
}

static VARIABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("invalid variable name regex")
});

// ---------------------------------------------------------------------------
// QueryTemplate / PreparedQuery
// ---------------------------------------------------------------------------

/// One named query with the namespace bindings it is executed under.
#[derive(Debug, Clone)]
pub struct QueryTemplate {
    name: String,
    text: String,
    namespaces: Arc<Namespaces>,
}

/// A bound query, ready to send to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedQuery {
    pub template: String,
    pub text: String,
}

impl fmt::Display for PreparedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl QueryTemplate {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            namespaces: Arc::new(Namespaces::new()),
        }
    }

    pub fn with_namespaces(mut self, namespaces: Arc<Namespaces>) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Produce the executable query for these bindings.
    ///
    /// Namespaces the template does not declare itself are prepended as
    /// `PREFIX` lines. The short `CONSTRUCT WHERE { ... }` form is expanded
    /// to the long form first, because the injected `VALUES` block must not
    /// end up in the construct template.
    pub fn bind(&self, bindings: &Bindings) -> Result<PreparedQuery, TemplateError> {
        let malformed = |message: &str| TemplateError::Malformed {
            template: self.name.clone(),
            message: message.to_string(),
        };

        let tokens = scan(&self.text).map_err(|m| malformed(&m))?;
        let mut body = self.text.clone();

        if !bindings.is_empty() {
            let values = bindings.values_clause()?;
            match locate_where_group(&tokens).ok_or_else(|| malformed("no WHERE group"))? {
                WhereGroup::Brace(pos) => body.insert_str(pos + 1, &values),
                WhereGroup::ShortConstruct { open, close } => {
                    let pattern = &self.text[open + 1..close];
                    body = format!(
                        "{}{{{pattern}}} WHERE {{{values}{pattern}}}{}",
                        &self.text[..where_keyword_start(&tokens, open)],
                        &self.text[close + 1..],
                    );
                }
            }
        }

        let declared = Namespaces::scan_declarations(&self.text);
        let mut prologue = String::new();
        for (prefix, iri) in self.namespaces.iter() {
            if declared.get(prefix).is_none() {
                prologue.push_str(&format!("PREFIX {prefix}: <{iri}>\n"));
            }
        }

        Ok(PreparedQuery {
            template: self.name.clone(),
            text: prologue + &body,
        })
    }
}

// ---------------------------------------------------------------------------
// QueryTemplates
// ---------------------------------------------------------------------------

/// All templates known to a store, by name.
#[derive(Debug, Clone, Default)]
pub struct QueryTemplates {
    templates: BTreeMap<String, QueryTemplate>,
    namespaces: Arc<Namespaces>,
}

impl QueryTemplates {
    /// An empty collection whose templates run under `namespaces`.
    pub fn new(namespaces: Arc<Namespaces>) -> Self {
        Self {
            templates: BTreeMap::new(),
            namespaces,
        }
    }

    /// Add or replace a template.
    pub fn register(&mut self, name: impl Into<String>, text: impl Into<String>) {
        let name = name.into();
        let template =
            QueryTemplate::new(name.clone(), text).with_namespaces(Arc::clone(&self.namespaces));
        self.templates.insert(name, template);
    }

    pub fn get(&self, name: &str) -> Result<&QueryTemplate, TemplateError> {
        self.templates
            .get(name)
            .ok_or_else(|| TemplateError::Unknown(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Fail with the first of `names` that is not registered.
    pub fn require(&self, names: &[&str]) -> Result<(), TemplateError> {
        for name in names {
            self.get(name)?;
        }
        Ok(())
    }

    /// Register every `*.rq` and `*.sparql` file in `dir` under its file stem.
    pub fn load_dir(dir: &Path, namespaces: Arc<Namespaces>) -> Result<Self, TemplateError> {
        let io = |source| TemplateError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io)? {
            let path = entry.map_err(io)?.path();
            let is_query = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("rq" | "sparql")
            );
            if is_query && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut templates = Self::new(namespaces);
        for path in paths {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let text = std::fs::read_to_string(&path).map_err(|source| TemplateError::Io {
                path: path.clone(),
                source,
            })?;
            tracing::debug!(template = stem, path = %path.display(), "loaded query template");
            templates.register(stem, text);
        }
        Ok(templates)
    }
}

// ---------------------------------------------------------------------------
// Structural scan
// ---------------------------------------------------------------------------

/// A syntactically significant position in a query: a keyword-like word or
/// a brace, with the group nesting depth it occurs at. Strings, IRIs,
/// variables, prefixed names and comments never produce tokens.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word { start: usize, upper: String, depth: usize },
    Open { pos: usize, depth: usize },
    Close { pos: usize, depth: usize },
}

fn scan(text: &str) -> Result<Vec<Token>, String> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            quote @ (b'"' | b'\'') => {
                i = skip_string(bytes, i, quote)?;
                continue;
            }
            b'<' => {
                if let Some(end) = iri_end(bytes, i) {
                    i = end + 1;
                    continue;
                }
            }
            b'?' | b'$' => {
                i += 1;
                while i < bytes.len() && is_name_byte(bytes[i]) {
                    i += 1;
                }
                continue;
            }
            b'{' => {
                tokens.push(Token::Open { pos: i, depth });
                depth += 1;
            }
            b'}' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| format!("unbalanced '}}' at byte {i}"))?;
                tokens.push(Token::Close { pos: i, depth });
            }
            b if b.is_ascii_alphabetic() => {
                let start = i;
                while i < bytes.len() && (is_name_byte(bytes[i]) || bytes[i] == b':') {
                    i += 1;
                }
                let word = &text[start..i];
                // prefixed names (dc:title, wdrs:describedby) are not keywords
                if !word.contains(':') {
                    tokens.push(Token::Word {
                        start,
                        upper: word.to_ascii_uppercase(),
                        depth,
                    });
                }
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    if depth != 0 {
        return Err("unbalanced '{'".into());
    }
    Ok(tokens)
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

/// Index just past the closing quote of the string starting at `start`.
fn skip_string(bytes: &[u8], start: usize, quote: u8) -> Result<usize, String> {
    let long = bytes.len() >= start + 3 && bytes[start + 1] == quote && bytes[start + 2] == quote;
    let mut i = if long { start + 3 } else { start + 1 };
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => {
                if !long {
                    return Ok(i + 1);
                }
                if bytes.len() >= i + 3 && bytes[i + 1] == quote && bytes[i + 2] == quote {
                    return Ok(i + 3);
                }
                i += 1;
            }
            b'\n' if !long => break,
            _ => i += 1,
        }
    }
    Err(format!("unterminated string starting at byte {start}"))
}

/// Position of the `>` closing an IRI reference at `start`, or `None` when
/// the `<` is a comparison operator.
///
/// The body must use only IRIREF characters and look like a reference: empty,
/// a fragment or path (`#`, `/`, `.`), or an absolute IRI with a scheme.
fn iri_end(bytes: &[u8], start: usize) -> Option<usize> {
    let body_start = start + 1;
    let len = bytes[body_start..].iter().position(|&b| {
        b == b'>'
            || b <= b' '
            || matches!(b, b'<' | b'"' | b'{' | b'}' | b'|' | b'^' | b'`' | b'\\')
    })?;
    let end = body_start + len;
    if bytes[end] != b'>' {
        return None;
    }

    let body = &bytes[body_start..end];
    let reference = match body.first() {
        None | Some(b'#' | b'/' | b'.') => true,
        Some(_) => has_scheme(body),
    };
    reference.then_some(end)
}

/// `scheme ":"` with `scheme = ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )`.
fn has_scheme(body: &[u8]) -> bool {
    let Some(colon) = body.iter().position(|&b| b == b':') else {
        return false;
    };
    let scheme = &body[..colon];
    scheme.first().is_some_and(u8::is_ascii_alphabetic)
        && scheme
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'))
}

enum WhereGroup {
    /// Position of the `{` opening the WHERE group.
    Brace(usize),
    /// `CONSTRUCT WHERE { ... }`, with the positions of its braces.
    ShortConstruct { open: usize, close: usize },
}

fn locate_where_group(tokens: &[Token]) -> Option<WhereGroup> {
    let top_words: Vec<(usize, &str)> = tokens
        .iter()
        .filter_map(|t| match t {
            Token::Word { start, upper, depth: 0 } => Some((*start, upper.as_str())),
            _ => None,
        })
        .collect();
    let top_opens: Vec<usize> = tokens
        .iter()
        .filter_map(|t| match t {
            Token::Open { pos, depth: 0 } => Some(*pos),
            _ => None,
        })
        .collect();

    let is_construct = top_words.iter().any(|(_, w)| *w == "CONSTRUCT");

    if let Some(&(where_at, _)) = top_words.iter().find(|(_, w)| *w == "WHERE") {
        let open = *top_opens.iter().find(|&&p| p > where_at)?;
        let construct_template_before = top_opens.iter().any(|&p| p < where_at);
        if is_construct && !construct_template_before {
            let close = tokens.iter().find_map(|t| match t {
                Token::Close { pos, depth: 0 } if *pos > open => Some(*pos),
                _ => None,
            })?;
            return Some(WhereGroup::ShortConstruct { open, close });
        }
        return Some(WhereGroup::Brace(open));
    }

    // `WHERE` is optional before the group pattern; a CONSTRUCT query's
    // first top-level group is its template.
    let index = usize::from(is_construct);
    top_opens.get(index).copied().map(WhereGroup::Brace)
}

fn where_keyword_start(tokens: &[Token], before: usize) -> usize {
    tokens
        .iter()
        .filter_map(|t| match t {
            Token::Word { start, upper, depth: 0 } if upper == "WHERE" && *start < before => {
                Some(*start)
            }
            _ => None,
        })
        .last()
        .unwrap_or(before)
}
