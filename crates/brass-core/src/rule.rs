//! Rule compiler.
//!
//! A [`RuleSpec`] describes what text a command reacts to:
//!
//! - [`RuleSpec::Unset`] does not look at text at all (content-independent
//!   trigger) and is distinct from
//! - [`RuleSpec::Any`], which requires a `text` field but accepts any value.
//! - [`RuleSpec::Pattern`] is a single regular expression.
//! - [`RuleSpec::Fragments`] is an ordered list of pattern fragments joined by
//!   mandatory whitespace (`\s+`), so rules can be assembled from reusable
//!   pieces.
//!
//! Compilation expands placeholders (see [`PlaceholderTable`]), anchors the
//! pattern at the start of the text and enables multi-line and
//! dot-matches-newline mode. A
//! [`Rule`] caches its compiled form and recompiles only when the table
//! version moves.

use std::fmt;

use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use tracing::trace;

use crate::error::{RuleError, RuleResult};
use crate::placeholder::PlaceholderTable;

const MATCH_ANY: &str = ".*";
const FRAGMENT_SEPARATOR: &str = r"\s+";

// =============================================================================
// RuleSpec
// =============================================================================

/// Uncompiled rule specification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RuleSpec {
    /// No text rule: the command matches regardless of content.
    #[default]
    Unset,
    /// Any text (the event must still carry a `text` field).
    Any,
    /// A single pattern.
    Pattern(String),
    /// Fragments joined with `\s+`.
    Fragments(Vec<String>),
}

impl RuleSpec {
    /// Builds a spec from its JSON shape: `null` is [`Any`](Self::Any), a
    /// string is a pattern, an array of strings is a fragment list.
    ///
    /// Any other shape is a configuration error.
    pub fn from_value(command: &str, value: &Value) -> RuleResult<Self> {
        match value {
            Value::Null => Ok(Self::Any),
            Value::String(pattern) => Ok(Self::Pattern(pattern.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        RuleError::configuration(command, "rule fragments must be strings")
                    })
                })
                .collect::<RuleResult<Vec<_>>>()
                .map(Self::Fragments),
            other => Err(RuleError::configuration(
                command,
                format!("invalid rule format: {other}"),
            )),
        }
    }

    /// Returns `true` for [`RuleSpec::Unset`].
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// The pattern source before placeholder expansion, or `None` when unset.
    pub fn source(&self) -> Option<String> {
        match self {
            Self::Unset => None,
            Self::Any => Some(MATCH_ANY.to_string()),
            Self::Pattern(pattern) if pattern.is_empty() => Some(MATCH_ANY.to_string()),
            Self::Pattern(pattern) => Some(pattern.clone()),
            Self::Fragments(fragments) if fragments.is_empty() => Some(MATCH_ANY.to_string()),
            Self::Fragments(fragments) => Some(fragments.join(FRAGMENT_SEPARATOR)),
        }
    }
}

impl From<&str> for RuleSpec {
    fn from(pattern: &str) -> Self {
        Self::Pattern(pattern.to_string())
    }
}

impl From<String> for RuleSpec {
    fn from(pattern: String) -> Self {
        Self::Pattern(pattern)
    }
}

impl From<Vec<String>> for RuleSpec {
    fn from(fragments: Vec<String>) -> Self {
        Self::Fragments(fragments)
    }
}

impl From<Vec<&str>> for RuleSpec {
    fn from(fragments: Vec<&str>) -> Self {
        Self::Fragments(fragments.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for RuleSpec {
    fn from(fragments: [&str; N]) -> Self {
        Self::Fragments(fragments.iter().map(|s| s.to_string()).collect())
    }
}

// =============================================================================
// Compilation
// =============================================================================

/// A compiled rule.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// The rule was never set; every event is a content match.
    Unset,
    /// An anchored pattern.
    Pattern(Regex),
}

impl Matcher {
    /// Matches `text` from its start, returning the captured groups.
    pub fn captures(&self, text: &str) -> Option<Captures> {
        match self {
            Self::Unset => Some(Captures::default()),
            Self::Pattern(regex) => regex.captures(text).map(|caps| Captures::from_regex(&caps)),
        }
    }
}

/// Compiles a spec against the table's current expansion.
///
/// Returns the matcher and the table version it was compiled against.
pub fn compile(spec: &RuleSpec, table: &PlaceholderTable) -> RuleResult<(Matcher, u64)> {
    let Some(source) = spec.source() else {
        return Ok((Matcher::Unset, table.version()));
    };
    let (expanded, version) = table.expand(&source);
    let regex = anchored(&expanded)?;
    Ok((Matcher::Pattern(regex), version))
}

fn anchored(pattern: &str) -> RuleResult<Regex> {
    RegexBuilder::new(&format!(r"\A(?:{pattern})"))
        .dot_matches_new_line(true)
        .multi_line(true)
        .build()
        .map_err(|e| RuleError::pattern(pattern, &e))
}

/// A rule together with its compile cache.
pub struct Rule {
    spec: RuleSpec,
    cache: Mutex<Option<(u64, Regex)>>,
}

impl Rule {
    /// Creates an uncompiled rule.
    pub fn new(spec: RuleSpec) -> Self {
        Self {
            spec,
            cache: Mutex::new(None),
        }
    }

    /// The specification this rule was built from.
    pub fn spec(&self) -> &RuleSpec {
        &self.spec
    }

    /// Returns `true` if this rule never looks at text.
    pub fn is_unset(&self) -> bool {
        self.spec.is_unset()
    }

    /// Returns the compiled matcher, recompiling if the table version moved.
    pub fn matcher(&self, table: &PlaceholderTable) -> RuleResult<Matcher> {
        if self.spec.is_unset() {
            return Ok(Matcher::Unset);
        }

        let mut cache = self.cache.lock();
        if let Some((version, regex)) = cache.as_ref()
            && *version == table.version()
        {
            return Ok(Matcher::Pattern(regex.clone()));
        }

        let (matcher, version) = compile(&self.spec, table)?;
        if let Matcher::Pattern(regex) = &matcher {
            trace!(pattern = %regex.as_str(), version, "Compiled rule");
            *cache = Some((version, regex.clone()));
        }
        Ok(matcher)
    }

    /// Version of the cached compilation, if any.
    pub fn compiled_version(&self) -> Option<u64> {
        self.cache.lock().as_ref().map(|(version, _)| *version)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("spec", &self.spec)
            .field("compiled_version", &self.compiled_version())
            .finish()
    }
}

// =============================================================================
// Captures
// =============================================================================

/// Groups captured by a successful rule match (group 0 excluded).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    groups: Vec<Option<String>>,
}

impl Captures {
    /// Creates captures from explicit group values.
    pub fn new(groups: Vec<Option<String>>) -> Self {
        Self { groups }
    }

    fn from_regex(caps: &regex::Captures<'_>) -> Self {
        Self {
            groups: caps
                .iter()
                .skip(1)
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect(),
        }
    }

    /// Returns group `index` (0-based, first capture group is 0).
    pub fn get(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|g| g.as_deref())
    }

    /// Number of capture groups in the rule.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns `true` if the rule has no capture groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Iterates over all groups; non-participating groups are `None`.
    pub fn iter(&self) -> impl Iterator<Item = Option<&str>> {
        self.groups.iter().map(|g| g.as_deref())
    }
}

// =============================================================================
// Sender filter
// =============================================================================

/// Uncompiled sender filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SenderSpec {
    /// Any sender, including events without one.
    #[default]
    Any,
    /// A pattern matched from the start of the sender name.
    Pattern(String),
    /// One of several patterns, each matching the whole sender name.
    OneOf(Vec<String>),
}

/// A compiled sender filter.
#[derive(Debug, Clone, Default)]
pub struct SenderFilter {
    regex: Option<Regex>,
}

impl SenderFilter {
    /// Compiles a sender spec for `command`.
    pub fn compile(command: &str, spec: &SenderSpec) -> RuleResult<Self> {
        let regex = match spec {
            SenderSpec::Any => None,
            SenderSpec::Pattern(pattern) => Some(anchored(pattern)?),
            SenderSpec::OneOf(names) => {
                if names.is_empty() {
                    return Err(RuleError::configuration(command, "sender list is empty"));
                }
                if names.iter().any(|name| Regex::new(name).is_err()) {
                    return Err(RuleError::configuration(
                        command,
                        "all elements in sender list must be valid regex",
                    ));
                }
                let alternatives = names
                    .iter()
                    .map(|name| format!("(?:{name})"))
                    .collect::<Vec<_>>()
                    .join("|");
                Some(anchored(&format!(r"(?:{alternatives})\z"))?)
            }
        };
        Ok(Self { regex })
    }

    /// Returns `true` if this filter accepts every sender.
    pub fn is_any(&self) -> bool {
        self.regex.is_none()
    }

    /// Checks a sender name. `None` (no sender) only passes an open filter.
    pub fn accepts(&self, sender: Option<&str>) -> bool {
        match (&self.regex, sender) {
            (None, _) => true,
            (Some(regex), Some(sender)) => regex.is_match(sender),
            (Some(_), None) => false,
        }
    }
}
