use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use serde::Serialize;

/// Letter-class prefix (optionally `K` and a `-`/`_` separator) followed by digits.
/// Covers B1234, A01, E01, F002, H001, PK-002.
const LETTER_CLASS_PATTERN: &str = r"^([ABEFHP]K?[-_]?\d+)";
/// Any run of uppercase letters followed by digits.
const UPPERCASE_RUN_PATTERN: &str = r"^([A-Z]+\d+)";
/// Narrow shape used by the older progress sheets: `B` then digits.
const B_SERIES_PATTERN: &str = r"^(B\d+)";

/// Canonical management identifier extracted from the start of a script title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

/// Identifier split into its alphabetic prefix and numeric tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericParts<'a> {
    pub prefix: &'a str,
    pub number: u64,
    /// Digit count as written, so `E01` keeps its zero padding when displayed.
    pub width: usize,
}

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split `B1234` into `("B", 1234)` and `PK-002` into `("PK-", 2)`.
    ///
    /// Returns `None` when the identifier has no trailing digits, no prefix,
    /// or a number too large for `u64`.
    pub fn split_numeric(&self) -> Option<NumericParts<'_>> {
        let digits_start = self
            .0
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i)?;
        let (prefix, digits) = self.0.split_at(digits_start);
        if prefix.is_empty() {
            return None;
        }
        let number = digits.parse::<u64>().ok()?;
        Some(NumericParts {
            prefix,
            number,
            width: digits.len(),
        })
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Named pattern sets that have been used for management identifiers over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemePreset {
    /// Letter-class shapes first, then any uppercase run + digits.
    #[default]
    Broad,
    /// Only `B` + digits.
    BSeries,
}

impl SchemePreset {
    pub fn patterns(self) -> &'static [&'static str] {
        match self {
            SchemePreset::Broad => &[LETTER_CLASS_PATTERN, UPPERCASE_RUN_PATTERN],
            SchemePreset::BSeries => &[B_SERIES_PATTERN],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SchemePreset::Broad => "broad",
            SchemePreset::BSeries => "b-series",
        }
    }
}

impl FromStr for SchemePreset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "broad" => Ok(SchemePreset::Broad),
            "b-series" | "bseries" | "b_series" => Ok(SchemePreset::BSeries),
            other => Err(anyhow!(
                "unknown identifier scheme '{other}' (expected broad | b-series)"
            )),
        }
    }
}

/// Ordered list of start-anchored patterns; the first one that captures a
/// non-empty identifier wins.
#[derive(Debug, Clone)]
pub struct IdentifierScheme {
    patterns: Vec<Regex>,
}

impl IdentifierScheme {
    pub fn preset(preset: SchemePreset) -> Result<Self> {
        Self::from_patterns(preset.patterns().iter().copied())
    }

    /// Compile caller-supplied patterns in priority order.
    ///
    /// Patterns that do not start with `^` are wrapped so they only match at
    /// position 0. Each pattern needs at least one capture group; group 1 is
    /// the identifier.
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut compiled = Vec::new();
        for raw in patterns {
            let raw = raw.as_ref();
            let anchored = if raw.starts_with('^') {
                raw.to_string()
            } else {
                format!("^(?:{raw})")
            };
            let re = Regex::new(&anchored)
                .with_context(|| format!("invalid identifier pattern '{raw}'"))?;
            if re.captures_len() < 2 {
                bail!("identifier pattern '{raw}' has no capture group");
            }
            compiled.push(re);
        }
        if compiled.is_empty() {
            bail!("identifier scheme needs at least one pattern");
        }
        Ok(Self { patterns: compiled })
    }

    pub fn extract(&self, title: &str) -> Option<Identifier> {
        self.patterns.iter().find_map(|re| {
            let caps = re.captures(title)?;
            let id = caps.get(1)?.as_str().trim();
            (!id.is_empty()).then(|| Identifier(id.to_string()))
        })
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Regex::as_str)
    }
}
