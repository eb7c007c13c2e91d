//! Gemtext post parsing: extracts author, title, and summary from a
//! retrieved page, honoring in-page directives that override the inferred
//! fields or opt the page out of inclusion entirely.

use std::error::Error;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Text,
    Blank,
    Heading1,
    Heading2,
    Heading3,
    Preformatted,
    Link,
    Quote,
    Bullet,
}

pub fn classify_line(line: &str) -> LineKind {
    if line.trim().is_empty() {
        return LineKind::Blank;
    }
    if line.starts_with("###") {
        return LineKind::Heading3;
    }
    if line.starts_with("##") {
        return LineKind::Heading2;
    }
    if line.starts_with('#') {
        return LineKind::Heading1;
    }
    if line.starts_with("```") {
        return LineKind::Preformatted;
    }
    if line.starts_with("=>") {
        return LineKind::Link;
    }
    if line.starts_with('>') {
        return LineKind::Quote;
    }
    if line.starts_with("* ") {
        return LineKind::Bullet;
    }
    LineKind::Text
}

fn tilde_user_rx() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| Regex::new(r"~([^/?]+)").expect("hard-coded regex should compile"))
}

fn user_path_rx() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| {
        Regex::new(r"(?i)/user[s]?/([^/?]+)").expect("hard-coded regex should compile")
    })
}

fn prohibit_rx() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| {
        Regex::new(r"(?i)^gemloom[-_\.:]prohibit").expect("hard-coded regex should compile")
    })
}

fn author_rx() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| {
        Regex::new(r"(?i)^gemloom[-_\.:]author:[\s]*([\S]+.+)").expect("hard-coded regex should compile")
    })
}

fn title_rx() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| {
        Regex::new(r"(?i)^gemloom[-_\.:]title:[\s]*([\S]+.+)").expect("hard-coded regex should compile")
    })
}

fn summary_rx() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| {
        Regex::new(r"(?i)^gemloom[-_\.:]summary:[\s]*([\S]+.+)").expect("hard-coded regex should compile")
    })
}

/// Author inferred from the URL itself: a `~user` segment (kept with the
/// tilde), or a `/users/<name>` path component.
pub fn scan_author(url: &str) -> Option<String> {
    if let Some(found) = tilde_user_rx().find(url) {
        let author = found.as_str().trim();
        if !author.is_empty() {
            return Some(author.to_string());
        }
    }
    if let Some(captures) = user_path_rx().captures(url) {
        let author = captures[1].trim();
        if !author.is_empty() {
            return Some(author.to_string());
        }
    }
    None
}

/// What the parse step hands to reconciliation. `allowed = false` means the
/// page opted out of inclusion and must not be persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPost {
    pub author: String,
    pub title: String,
    pub summary: Option<String>,
    pub allowed: bool,
}

#[derive(Debug)]
pub enum ParseError {
    InvalidUrl(url::ParseError),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::InvalidUrl(err) => write!(f, "invalid post URL: {}", err),
        }
    }
}

impl Error for ParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ParseError::InvalidUrl(err) => Some(err),
        }
    }
}

impl From<url::ParseError> for ParseError {
    fn from(value: url::ParseError) -> Self {
        ParseError::InvalidUrl(value)
    }
}

/// Parses a retrieved post.
///
/// The author defaults to a user name scanned from the URL, then the URL
/// host; a `gemloom:author:` line overrides it. The title is the first
/// heading (default "Untitled") unless a `gemloom:title:` line names one.
/// The summary is the first plain-text line outside preformatted blocks
/// unless a `gemloom:summary:` line names one. Preformatted blocks are
/// skipped entirely, so directives inside them have no effect. A
/// `gemloom:prohibit` line clears all fields and marks the post disallowed.
pub fn parse_post(raw_url: &str, body: &str) -> Result<ParsedPost, ParseError> {
    let url = Url::parse(raw_url)?;

    let mut post = ParsedPost {
        author: scan_author(raw_url)
            .or_else(|| url.host_str().map(str::to_string))
            .unwrap_or_default(),
        allowed: true,
        ..ParsedPost::default()
    };

    let mut in_pre_block = false;
    let mut first_text_found = false;

    for line in body.lines() {
        let kind = classify_line(line);

        if kind == LineKind::Preformatted {
            in_pre_block = !in_pre_block;
            continue;
        }
        if in_pre_block {
            continue;
        }

        match kind {
            LineKind::Text => {
                if prohibit_rx().is_match(line) {
                    return Ok(ParsedPost {
                        allowed: false,
                        ..ParsedPost::default()
                    });
                }
                if let Some(captures) = author_rx().captures(line) {
                    let author = captures[1].trim();
                    if !author.is_empty() {
                        post.author = author.to_string();
                    }
                    continue;
                }
                if let Some(captures) = summary_rx().captures(line) {
                    let summary = captures[1].trim();
                    if !summary.is_empty() {
                        post.summary = Some(summary.to_string());
                    }
                    continue;
                }
                if let Some(captures) = title_rx().captures(line) {
                    let title = captures[1].trim();
                    if !title.is_empty() {
                        post.title = title.to_string();
                    }
                    continue;
                }
                if !first_text_found {
                    post.summary = Some(line.trim().to_string());
                    first_text_found = true;
                }
            }
            LineKind::Heading1 | LineKind::Heading2 | LineKind::Heading3 => {
                if post.title.is_empty() {
                    post.title = line.trim_start_matches('#').trim().to_string();
                }
            }
            _ => {}
        }
    }

    if post.title.is_empty() {
        post.title = "Untitled".to_string();
    }

    Ok(post)
}

#[cfg(test)]
mod tests;
