//! Route pattern compilation and matching
//!
//! A pattern is parsed into [`Segment`]s and rendered into one anchored,
//! case-insensitive regular expression.
//!
//! Supported syntax:
//! - literal text, where any run of `/` also matches repeated slashes
//! - `:name` captures one non-slash segment
//! - `:name?` optional parameter (its leading slash is optional too)
//! - `:name(regex)` parameter with a custom capture expression
//! - `(...)` optional group, with `a|b` alternation inside
//! - `*` or `*name` captures the remainder of the path (named `splat` by default)
//!
//! The same segments drive [`RoutePattern::build`], the inverse operation used
//! to generate URLs.

use crate::error::RouteError;
use crate::params::{decode_uri_component, encode_uri_component, RouteParams};
use crate::trace_log;
use regex::Regex;

/// Name given to a bare `*` wildcard
pub const SPLAT: &str = "splat";

/// A single segment in a route pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text that must match (case-insensitively)
    Static(String),
    /// Parameter that captures a value
    Param {
        name: String,
        constraint: Option<String>,
        optional: bool,
        /// The parameter owns the `/` in front of it
        slash: bool,
    },
    /// Optional group; each inner vector is one alternative
    Optional(Vec<Vec<Segment>>),
    /// Captures the rest of the path
    Wildcard(String),
}

/// A compiled route pattern
#[derive(Debug, Clone)]
pub struct RoutePattern {
    source: String,
    segments: Vec<Segment>,
    regex: Regex,
    /// Regex group name -> parameter name, in pattern order
    captures: Vec<(String, String)>,
}

impl RoutePattern {
    /// Compile a pattern string
    ///
    /// # Example
    ///
    /// ```
    /// use route_pilot::RoutePattern;
    ///
    /// let pattern = RoutePattern::compile("/users/:id(\\d+)/:tab?").unwrap();
    ///
    /// let params = pattern.matches("/users/42").unwrap();
    /// assert_eq!(params.get("id"), Some("42"));
    /// assert!(!params.contains("tab"));
    ///
    /// assert!(pattern.matches("/users/abc").is_none());
    /// ```
    pub fn compile(pattern: &str) -> Result<Self, RouteError> {
        let segments = Parser::new(pattern).parse()?;

        let mut captures = Vec::new();
        let mut body = String::new();
        render(&segments, &mut captures, &mut body);

        let source = format!("(?i)^{body}/*$");
        let regex = Regex::new(&source).map_err(|e| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        trace_log!("compiled pattern '{}' into '{}'", pattern, source);

        Ok(Self {
            source: pattern.to_string(),
            segments,
            regex,
            captures,
        })
    }

    /// The pattern as written
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Parameter names in pattern order
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.captures.iter().map(|(_, name)| name.as_str())
    }

    /// Match a path and extract URI-decoded parameters
    ///
    /// Returns `None` when the path does not match. Optional parameters that
    /// did not participate are absent from the result.
    pub fn matches(&self, path: &str) -> Option<RouteParams> {
        let caps = self.regex.captures(path)?;
        let mut params = RouteParams::new();

        for (group, name) in &self.captures {
            if let Some(value) = caps.name(group) {
                if !value.as_str().is_empty() {
                    params.insert(name.clone(), decode_uri_component(value.as_str()));
                }
            }
        }

        Some(params)
    }

    /// Build a path from parameters
    ///
    /// Optional parameters and groups without values are dropped; a missing
    /// required parameter is a [`RouteError::PatternBuild`].
    pub fn build(&self, params: &RouteParams) -> Result<String, RouteError> {
        let mut path = String::new();
        build_segments(&self.segments, params, &mut path).map_err(|param| {
            RouteError::PatternBuild {
                pattern: self.source.clone(),
                param,
            }
        })?;

        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Ok(path)
    }
}

// ============================================================================
// Parsing
// ============================================================================

struct Parser<'a> {
    pattern: &'a str,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Parser<'a> {
    fn new(pattern: &'a str) -> Self {
        Self {
            pattern,
            chars: pattern.chars().peekable(),
        }
    }

    fn error(&self, message: impl Into<String>) -> RouteError {
        RouteError::InvalidPattern {
            pattern: self.pattern.to_string(),
            message: message.into(),
        }
    }

    fn parse(mut self) -> Result<Vec<Segment>, RouteError> {
        let mut alternatives = self.parse_alternatives(0)?;
        Ok(alternatives.pop().unwrap_or_default())
    }

    fn parse_alternatives(&mut self, depth: usize) -> Result<Vec<Vec<Segment>>, RouteError> {
        let mut alternatives = Vec::new();
        let mut current = Vec::new();
        let mut literal = String::new();

        while let Some(&c) = self.chars.peek() {
            match c {
                ':' => {
                    self.chars.next();
                    let name = self.read_name();
                    if name.is_empty() {
                        return Err(self.error("parameter name cannot be empty"));
                    }
                    let constraint = if self.chars.peek() == Some(&'(') {
                        self.chars.next();
                        Some(self.read_constraint()?)
                    } else {
                        None
                    };
                    let optional = self.chars.next_if_eq(&'?').is_some();
                    let slash = optional && literal.ends_with('/');
                    if slash {
                        literal.pop();
                    }
                    flush(&mut literal, &mut current);
                    current.push(Segment::Param {
                        name,
                        constraint,
                        optional,
                        slash,
                    });
                }
                '*' => {
                    self.chars.next();
                    flush(&mut literal, &mut current);
                    let name = self.read_name();
                    current.push(Segment::Wildcard(if name.is_empty() {
                        SPLAT.to_string()
                    } else {
                        name
                    }));
                }
                '(' => {
                    self.chars.next();
                    flush(&mut literal, &mut current);
                    let group = self.parse_alternatives(depth + 1)?;
                    current.push(Segment::Optional(group));
                }
                ')' => {
                    if depth == 0 {
                        return Err(self.error("unbalanced ')'"));
                    }
                    self.chars.next();
                    flush(&mut literal, &mut current);
                    alternatives.push(current);
                    return Ok(alternatives);
                }
                '|' if depth > 0 => {
                    self.chars.next();
                    flush(&mut literal, &mut current);
                    alternatives.push(std::mem::take(&mut current));
                }
                _ => {
                    self.chars.next();
                    literal.push(c);
                }
            }
        }

        if depth > 0 {
            return Err(self.error("unclosed '('"));
        }

        flush(&mut literal, &mut current);
        alternatives.push(current);
        Ok(alternatives)
    }

    fn read_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.chars.next_if(|c| c.is_alphanumeric() || *c == '_') {
            name.push(c);
        }
        name
    }

    /// Reads up to the matching `)`; the opening one is already consumed
    fn read_constraint(&mut self) -> Result<String, RouteError> {
        let mut depth = 1;
        let mut constraint = String::new();

        while let Some(c) = self.chars.next() {
            match c {
                '\\' => {
                    constraint.push(c);
                    if let Some(escaped) = self.chars.next() {
                        constraint.push(escaped);
                    }
                }
                '(' => {
                    depth += 1;
                    constraint.push(c);
                }
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        if constraint.is_empty() {
                            return Err(self.error("empty parameter expression"));
                        }
                        return Ok(constraint);
                    }
                    constraint.push(c);
                }
                _ => constraint.push(c),
            }
        }

        Err(self.error("unclosed parameter expression"))
    }
}

fn flush(literal: &mut String, segments: &mut Vec<Segment>) {
    if !literal.is_empty() {
        segments.push(Segment::Static(std::mem::take(literal)));
    }
}

// ============================================================================
// Rendering
// ============================================================================

fn render(segments: &[Segment], captures: &mut Vec<(String, String)>, out: &mut String) {
    for segment in segments {
        match segment {
            Segment::Static(text) => {
                let mut previous_slash = false;
                for c in text.chars() {
                    if c == '/' {
                        if !previous_slash {
                            out.push_str("/+");
                        }
                        previous_slash = true;
                    } else {
                        out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
                        previous_slash = false;
                    }
                }
            }
            Segment::Param {
                name,
                constraint,
                optional,
                slash,
            } => {
                let group = format!("p{}", captures.len());
                let capture = format!(
                    "(?P<{group}>{})",
                    constraint.as_deref().unwrap_or("[^/]+")
                );
                captures.push((group, name.clone()));
                match (optional, slash) {
                    (true, true) => out.push_str(&format!("(?:/+{capture})?")),
                    (true, false) => out.push_str(&format!("{capture}?")),
                    (false, _) => out.push_str(&capture),
                }
            }
            Segment::Optional(alternatives) => {
                out.push_str("(?:");
                for (i, alternative) in alternatives.iter().enumerate() {
                    if i > 0 {
                        out.push('|');
                    }
                    render(alternative, captures, out);
                }
                out.push_str(")?");
            }
            Segment::Wildcard(name) => {
                let group = format!("p{}", captures.len());
                out.push_str(&format!("(?P<{group}>.*)"));
                captures.push((group, name.clone()));
            }
        }
    }
}

// ============================================================================
// Building
// ============================================================================

/// Appends the path for `segments`; `Err` carries the missing parameter name
fn build_segments(
    segments: &[Segment],
    params: &RouteParams,
    out: &mut String,
) -> Result<(), String> {
    for segment in segments {
        match segment {
            Segment::Static(text) => out.push_str(text),
            Segment::Param {
                name,
                optional,
                slash,
                ..
            } => match params.get(name).filter(|v| !v.is_empty()) {
                Some(value) => {
                    if *slash {
                        out.push('/');
                    }
                    out.push_str(&encode_uri_component(value));
                }
                None if *optional => {}
                None => return Err(name.clone()),
            },
            Segment::Optional(alternatives) => {
                for alternative in alternatives {
                    if !mentions_param(alternative, params) {
                        continue;
                    }
                    let mut candidate = String::new();
                    if build_segments(alternative, params, &mut candidate).is_ok() {
                        out.push_str(&candidate);
                        break;
                    }
                }
            }
            Segment::Wildcard(name) => {
                if let Some(value) = params.get(name) {
                    let encoded: Vec<String> =
                        value.split('/').map(encode_uri_component).collect();
                    out.push_str(&encoded.join("/"));
                }
            }
        }
    }
    Ok(())
}

fn mentions_param(segments: &[Segment], params: &RouteParams) -> bool {
    segments.iter().any(|segment| match segment {
        Segment::Static(_) => false,
        Segment::Param { name, .. } | Segment::Wildcard(name) => {
            params.get(name).is_some_and(|v| !v.is_empty())
        }
        Segment::Optional(alternatives) => alternatives
            .iter()
            .any(|alternative| mentions_param(alternative, params)),
    })
}
