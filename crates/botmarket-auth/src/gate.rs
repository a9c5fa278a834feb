//! Protected-route gate.

use crate::identity::{Identity, IdentityResolver};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`: exactly one segment.
    One,
    /// `**` or `:name*`: zero or more trailing segments.
    Rest,
}

#[derive(Debug, Clone)]
struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

/// Glob-style path matcher.
///
/// - `/dashboard` matches only `/dashboard`
/// - `/dashboard/*` matches `/dashboard/<one segment>`
/// - `/dashboard/**` (or `/dashboard/:path*`) matches `/dashboard` and everything below it
///
/// Matching is per segment, so `/dashboardx` never matches `/dashboard/**`.
/// Trailing and repeated slashes are ignored on both sides.
#[derive(Debug, Clone, Default)]
pub struct RouteMatcher {
    patterns: Vec<Pattern>,
}

impl RouteMatcher {
    /// Parse `patterns`. Each must start with `/`; a rest wildcard may only be last.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| parse_pattern(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// True if any pattern matches `path`. Query strings are ignored.
    pub fn matches(&self, path: &str) -> bool {
        let path = path.split(['?', '#']).next().unwrap_or("");
        let segs: Vec<&str> = split_segments(path).collect();
        self.patterns.iter().any(|p| match_segments(&p.segments, &segs))
    }

    /// The patterns as configured.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.source.as_str())
    }
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn parse_pattern(raw: &str) -> Result<Pattern> {
    let bad = |reason: &str| Error::Pattern {
        pattern: raw.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = raw.trim();
    if !trimmed.starts_with('/') {
        return Err(bad("must start with '/'"));
    }

    let mut segments = Vec::new();
    for seg in split_segments(trimmed) {
        if matches!(segments.last(), Some(Segment::Rest)) {
            return Err(bad("a rest wildcard must be the last segment"));
        }
        let parsed = match seg {
            "**" => Segment::Rest,
            "*" => Segment::One,
            s if s.starts_with(':') && s.ends_with('*') => Segment::Rest,
            s if s.contains('*') => return Err(bad("'*' must stand alone in a segment")),
            s => Segment::Literal(s.to_string()),
        };
        segments.push(parsed);
    }

    Ok(Pattern {
        source: trimmed.to_string(),
        segments,
    })
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match (pattern.first(), path.first()) {
        (None, None) | (Some(Segment::Rest), _) => true,
        (Some(Segment::One), Some(_)) => match_segments(&pattern[1..], &path[1..]),
        (Some(Segment::Literal(l)), Some(s)) if l.as_str() == *s => {
            match_segments(&pattern[1..], &path[1..])
        }
        _ => false,
    }
}

/// What to do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Let it through unchanged.
    Pass,
    /// Send the browser here instead.
    Redirect(String),
}

/// Admits or redirects requests based on the session cookie.
#[derive(Debug, Clone)]
pub struct SessionGate {
    matcher: RouteMatcher,
    resolver: IdentityResolver,
    login_path: String,
}

impl SessionGate {
    /// Build a gate that redirects to `login_path`.
    pub fn new(
        matcher: RouteMatcher,
        resolver: IdentityResolver,
        login_path: impl Into<String>,
    ) -> Self {
        Self {
            matcher,
            resolver,
            login_path: login_path.into(),
        }
    }

    /// Decide for a request to `path` carrying `cookie_header`.
    ///
    /// Unprotected paths pass without looking at the cookie.
    pub fn decide(&self, path: &str, cookie_header: Option<&str>) -> GateDecision {
        if !self.matcher.matches(path) {
            return GateDecision::Pass;
        }
        match self.resolver.resolve_header(cookie_header) {
            Identity::Authenticated(_) => GateDecision::Pass,
            Identity::Anonymous => GateDecision::Redirect(self.login_path.clone()),
        }
    }

    /// Resolver used for cookie checks.
    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }
}
