// src/version/mod.rs

//! Canonical version handling for cross-ecosystem comparison
//!
//! All version comparisons in Conflux happen on one canonical grammar:
//! `[epoch!]N(.N)*[{a|b|rc}N][.postN][.devN]`. Native conda version strings
//! are rewritten into this grammar by the translator before parsing, so the
//! parser here only needs to understand numeric segments plus the
//! pre/post/dev release tokens the grammar assigns ordering to.

pub mod translator;

pub use translator::{normalize_wildcard, to_canonical, to_native, VersionMapping};

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// Pre-release kind, ordered alpha < beta < release candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreRelease {
    Alpha,
    Beta,
    Rc,
}

impl PreRelease {
    /// Recognize a pre-release token; `pre` and `preview` collapse into `rc`
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "a" | "alpha" => Some(PreRelease::Alpha),
            "b" | "beta" => Some(PreRelease::Beta),
            "c" | "rc" | "pre" | "preview" => Some(PreRelease::Rc),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            PreRelease::Alpha => "a",
            PreRelease::Beta => "b",
            PreRelease::Rc => "rc",
        }
    }
}

/// A parsed canonical version
///
/// Examples:
/// - "1.2.3" → release=[1, 2, 3]
/// - "2!1.0" → epoch=2, release=[1, 0]
/// - "1.2.3rc1" → release=[1, 2, 3], pre=(Rc, 1)
/// - "1.2.post4" → release=[1, 2], post=4
/// - "1.2.dev0" → release=[1, 2], dev=0
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalVersion {
    pub epoch: u64,
    pub release: Vec<u64>,
    pub pre: Option<(PreRelease, u64)>,
    pub post: Option<u64>,
    pub dev: Option<u64>,
}

/// Comparison bound used to order optional suffix components the way the
/// canonical grammar requires: a dev-only suffix sorts below any pre-release,
/// a missing pre-release sorts above any present one, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Bound<T: Ord> {
    NegInf,
    Value(T),
    Inf,
}

impl CanonicalVersion {
    /// Parse a canonical version string
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        if s.is_empty() {
            return Err(Error::ParseError("Empty version string".to_string()));
        }

        // Split off the epoch
        let (epoch, rest) = if let Some(pos) = s.find('!') {
            let epoch = s[..pos].parse::<u64>().map_err(|e| {
                Error::ParseError(format!("Invalid epoch in version '{}': {}", s, e))
            })?;
            (epoch, &s[pos + 1..])
        } else {
            (0, s.as_str())
        };

        // Local version labels do not participate in ordering
        let rest = rest.split('+').next().unwrap_or(rest);
        let rest = rest.strip_prefix('v').unwrap_or(rest);

        let tokens = tokenize(rest);
        if tokens.is_empty() {
            return Err(Error::ParseError(format!("Empty version component in '{}'", s)));
        }

        let mut release = Vec::new();
        let mut pre = None;
        let mut post = None;
        let mut dev = None;

        let mut iter = tokens.into_iter().peekable();

        // Leading numeric tokens form the release segments
        while let Some(Token::Number(n)) = iter.peek().copied() {
            release.push(n);
            iter.next();
        }
        if release.is_empty() {
            return Err(Error::ParseError(format!(
                "Version '{}' does not start with a numeric segment",
                s
            )));
        }

        // Suffix tokens: pre-release, post-release, dev — each at most once
        while let Some(token) = iter.next() {
            let word = match token {
                Token::Word(w) => w,
                Token::Number(n) => {
                    return Err(Error::ParseError(format!(
                        "Unexpected numeric segment '{}' after release suffix in '{}'",
                        n, s
                    )));
                }
            };

            let number = match iter.peek() {
                Some(Token::Number(n)) => {
                    let n = *n;
                    iter.next();
                    n
                }
                _ => 0,
            };

            if let Some(kind) = PreRelease::from_token(word) {
                if pre.is_some() {
                    return Err(Error::ParseError(format!(
                        "Duplicate pre-release token in '{}'",
                        s
                    )));
                }
                pre = Some((kind, number));
            } else if word == "post" || word == "rev" || word == "r" {
                if post.is_some() {
                    return Err(Error::ParseError(format!(
                        "Duplicate post-release token in '{}'",
                        s
                    )));
                }
                post = Some(number);
            } else if word == "dev" {
                if dev.is_some() {
                    return Err(Error::ParseError(format!("Duplicate dev token in '{}'", s)));
                }
                dev = Some(number);
            } else {
                return Err(Error::ParseError(format!(
                    "Unrecognized version token '{}' in '{}'",
                    word, s
                )));
            }
        }

        Ok(Self {
            epoch,
            release,
            pre,
            post,
            dev,
        })
    }

    /// Compare release segments with implicit zero padding, so 1.2 == 1.2.0
    fn compare_release(a: &[u64], b: &[u64]) -> Ordering {
        let len = a.len().max(b.len());
        for i in 0..len {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            match x.cmp(&y) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        Ordering::Equal
    }

    /// Whether the release segments start with `prefix`, padding the release
    /// with zeros when it is shorter — so a `1.2.*` prefix accepts both
    /// `1.2` and `1.2.0`.
    pub fn release_starts_with(&self, prefix: &[u64]) -> bool {
        prefix
            .iter()
            .enumerate()
            .all(|(i, &p)| self.release.get(i).copied().unwrap_or(0) == p)
    }

    /// Whether this is a final release (no pre/dev suffix)
    pub fn is_final(&self) -> bool {
        self.pre.is_none() && self.dev.is_none()
    }

    fn suffix_key(&self) -> (Bound<(PreRelease, u64)>, Bound<u64>, Bound<u64>) {
        let pre = match self.pre {
            Some(p) => Bound::Value(p),
            // A bare dev release sorts below every pre-release of the same
            // release segments; a plain final release sorts above them.
            None if self.post.is_none() && self.dev.is_some() => Bound::NegInf,
            None => Bound::Inf,
        };
        let post = match self.post {
            Some(n) => Bound::Value(n),
            None => Bound::NegInf,
        };
        let dev = match self.dev {
            Some(n) => Bound::Value(n),
            None => Bound::Inf,
        };
        (pre, post, dev)
    }

    /// Compare two canonical versions
    pub fn compare(&self, other: &CanonicalVersion) -> Ordering {
        match self.epoch.cmp(&other.epoch) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match Self::compare_release(&self.release, &other.release) {
            Ordering::Equal => {}
            ord => return ord,
        }
        self.suffix_key().cmp(&other.suffix_key())
    }
}

impl fmt::Display for CanonicalVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(|n| n.to_string()).collect();
        write!(f, "{}", release.join("."))?;
        if let Some((kind, n)) = self.pre {
            write!(f, "{}{}", kind.as_str(), n)?;
        }
        if let Some(n) = self.post {
            write!(f, ".post{}", n)?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{}", n)?;
        }
        Ok(())
    }
}

impl Ord for CanonicalVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for CanonicalVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::str::FromStr for CanonicalVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A version token: a digit run or a letter run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Number(u64),
    Word(&'a str),
}

/// Split a version body into alternating digit and letter runs.
/// Separators ('.', '-', '_') only delimit; they carry no meaning.
fn tokenize<'a>(s: &'a str) -> Vec<Token<'a>> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let bytes = s.as_bytes();

    let flush = |start: usize, end: usize, tokens: &mut Vec<Token<'a>>| {
        if start < end {
            let run = &s[start..end];
            if run.as_bytes()[0].is_ascii_digit() {
                // Digit runs longer than u64 saturate rather than fail;
                // such versions do not occur in practice.
                tokens.push(Token::Number(run.parse::<u64>().unwrap_or(u64::MAX)));
            } else {
                tokens.push(Token::Word(run));
            }
        }
    };

    for (i, &b) in bytes.iter().enumerate() {
        if b == b'.' || b == b'-' || b == b'_' {
            flush(start, i, &mut tokens);
            start = i + 1;
        } else if i > start {
            let prev = bytes[i - 1];
            if prev.is_ascii_digit() != b.is_ascii_digit() {
                flush(start, i, &mut tokens);
                start = i;
            }
        }
    }
    flush(start, bytes.len(), &mut tokens);
    tokens
}
