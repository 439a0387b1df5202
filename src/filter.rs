//! Shell-style glob filters over namespace names and payload keys.
//!
//! `*` matches any run of characters, `?` a single character and `[...]` a
//! character class (`[!...]` or `[^...]` negated, `a-z` ranges, `\` escapes).
//! There is no path-separator special-casing: `*` happily crosses `/` and `.`.

use std::fmt;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("unterminated character class in pattern {0:?}")]
    UnterminatedClass(String),
    #[error("empty character class in pattern {0:?}")]
    EmptyClass(String),
    #[error("invalid range {lo:?}-{hi:?} in pattern {pattern:?}")]
    InvalidRange { pattern: String, lo: char, hi: char },
    #[error("unescaped '-' or ']' in character class of pattern {0:?}")]
    BadClassMember(String),
    #[error("trailing escape in pattern {0:?}")]
    TrailingEscape(String),
    #[error("unable to compile pattern {pattern:?}: {source}")]
    Compile {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A single compiled glob.
#[derive(Clone)]
pub struct Pattern {
    raw: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(raw: &str) -> Result<Self, PatternError> {
        let translated = translate(raw)?;
        let regex = Regex::new(&translated).map_err(|source| PatternError::Compile {
            pattern: raw.to_owned(),
            source,
        })?;

        Ok(Self {
            raw: raw.to_owned(),
            regex,
        })
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.raw).finish()
    }
}

/// A list of globs where a candidate passes if any glob matches.
/// An empty list lets everything through.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    patterns: Vec<Pattern>,
}

impl Filter {
    pub fn match_all() -> Self {
        Self::default()
    }

    /// Parses a comma separated annotation value. Only an absent or empty value
    /// yields the match-all filter; empty elements inside a list are kept as
    /// literal empty patterns. Any malformed element fails the whole list.
    pub fn parse(raw: Option<&str>) -> Result<Self, PatternError> {
        let Some(raw) = raw.filter(|r| !r.is_empty()) else {
            return Ok(Self::match_all());
        };

        let patterns = raw
            .split(',')
            .map(Pattern::new)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(candidate))
    }

    pub fn is_match_all(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }
}

fn translate(pattern: &str) -> Result<String, PatternError> {
    let mut out = String::with_capacity(pattern.len() * 2 + 8);
    out.push_str("^(?s:");

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| PatternError::TrailingEscape(pattern.to_owned()))?;
                out.push_str(&regex::escape(escaped.encode_utf8(&mut [0; 4])));
            }
            '[' => {
                out.push('[');
                if matches!(chars.peek(), Some('!' | '^')) {
                    chars.next();
                    out.push('^');
                }

                let mut members = 0;
                loop {
                    let lo = match chars.next() {
                        None => return Err(PatternError::UnterminatedClass(pattern.to_owned())),
                        Some(']') if members == 0 => {
                            return Err(PatternError::EmptyClass(pattern.to_owned()));
                        }
                        Some(']') => break,
                        Some('-') => {
                            return Err(PatternError::BadClassMember(pattern.to_owned()));
                        }
                        Some('\\') => chars
                            .next()
                            .ok_or_else(|| PatternError::TrailingEscape(pattern.to_owned()))?,
                        Some(other) => other,
                    };

                    members += 1;

                    if chars.peek() == Some(&'-') {
                        chars.next();
                        let hi = match chars.next() {
                            None => {
                                return Err(PatternError::UnterminatedClass(pattern.to_owned()));
                            }
                            Some('-' | ']') => {
                                return Err(PatternError::BadClassMember(pattern.to_owned()));
                            }
                            Some('\\') => chars
                                .next()
                                .ok_or_else(|| PatternError::TrailingEscape(pattern.to_owned()))?,
                            Some(other) => other,
                        };

                        if lo > hi {
                            return Err(PatternError::InvalidRange {
                                pattern: pattern.to_owned(),
                                lo,
                                hi,
                            });
                        }

                        push_class_char(&mut out, lo);
                        out.push('-');
                        push_class_char(&mut out, hi);
                    } else {
                        push_class_char(&mut out, lo);
                    }
                }

                out.push(']');
            }
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }

    out.push_str(")$");
    Ok(out)
}

fn push_class_char(out: &mut String, c: char) {
    if matches!(c, '\\' | '[' | ']' | '^' | '-' | '&' | '~') {
        out.push('\\');
    }
    out.push(c);
}
