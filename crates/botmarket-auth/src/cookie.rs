//! Cookie helpers.

use crate::{Error, Result};
use httpdate::fmt_http_date;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// SameSite attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// SameSite=Strict
    Strict,
    /// SameSite=Lax
    Lax,
    /// SameSite=None
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Options used to build a session cookie.
#[derive(Debug, Clone)]
pub struct CookieOptions {
    /// Cookie name (without any prefix).
    pub name: String,

    /// Cookie path.
    pub path: String,

    /// Optional cookie domain.
    pub domain: Option<String>,

    /// Send on HTTPS only.
    pub secure: bool,

    /// Not accessible to JS.
    pub http_only: bool,

    /// SameSite attribute.
    pub same_site: SameSite,

    /// Max-Age in seconds.
    pub max_age_seconds: Option<u64>,

    /// If true and `domain` is None, the cookie name will be prefixed with `__Host-`
    /// and the function will enforce `path=/` and `secure=true`.
    pub use_host_prefix: bool,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            name: "botmarket_session".to_string(),
            path: "/".to_string(),
            domain: None,
            secure: false,
            http_only: true,
            same_site: SameSite::Lax,
            max_age_seconds: Some(7 * 24 * 60 * 60),
            use_host_prefix: false,
        }
    }
}

impl CookieOptions {
    /// Name the cookie is sent and read under, including any `__Host-` prefix.
    pub fn effective_name(&self) -> Result<String> {
        cookie_name(self)
    }
}

fn cookie_name(opts: &CookieOptions) -> Result<String> {
    if opts.use_host_prefix && opts.domain.is_none() {
        // Enforce __Host- cookie requirements.
        if opts.path != "/" {
            return Err(Error::Cookie("__Host- cookies must have Path=/".to_string()));
        }
        if !opts.secure {
            return Err(Error::Cookie("__Host- cookies must be Secure".to_string()));
        }
        Ok(format!(
            "__Host-{}",
            opts.name.trim_start_matches("__Host-")
        ))
    } else {
        Ok(opts.name.clone())
    }
}

fn base_parts(name: &str, value: &str, opts: &CookieOptions) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    parts.push(format!("{name}={value}"));
    parts.push(format!("Path={}", opts.path));

    if let Some(domain) = &opts.domain {
        parts.push(format!("Domain={domain}"));
    }

    if opts.secure {
        parts.push("Secure".to_string());
    }
    if opts.http_only {
        parts.push("HttpOnly".to_string());
    }

    parts.push(format!("SameSite={}", opts.same_site.as_str()));
    parts
}

/// Build a `Set-Cookie` header value.
pub fn build_set_cookie(value: &str, opts: &CookieOptions) -> Result<String> {
    let name = cookie_name(opts)?;
    let mut parts = base_parts(&name, value, opts);

    if let Some(max_age) = opts.max_age_seconds {
        parts.push(format!("Max-Age={max_age}"));
        // Expires for older clients.
        let expires = SystemTime::now() + Duration::from_secs(max_age);
        parts.push(format!("Expires={}", fmt_http_date(expires)));
    }

    Ok(parts.join("; "))
}

/// Build a `Set-Cookie` header value that clears the cookie.
pub fn build_clear_cookie(opts: &CookieOptions) -> Result<String> {
    let name = cookie_name(opts)?;
    let mut parts = base_parts(&name, "", opts);
    parts.push("Max-Age=0".to_string());
    parts.push(format!("Expires={}", fmt_http_date(UNIX_EPOCH)));
    Ok(parts.join("; "))
}

/// Find `name` in a request `Cookie` header. The first occurrence wins.
pub fn read_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        if k.trim() == name {
            Some(v.trim().trim_matches('"'))
        } else {
            None
        }
    })
}
