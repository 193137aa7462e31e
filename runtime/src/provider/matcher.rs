use std::fmt;

use regex::Regex;
use strum::{Display, EnumString};

use crate::runtime_error::{RuntimeError, RuntimeResult};
use crate::types::Labels;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum MatchOp {
    #[strum(serialize = "=")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = "=~")]
    RegexEqual,
    #[strum(serialize = "!~")]
    RegexNotEqual,
}

impl MatchOp {
    pub fn is_regex(&self) -> bool {
        matches!(self, MatchOp::RegexEqual | MatchOp::RegexNotEqual)
    }
}

/// A single label filter of a series selector, e.g. `job=~"api|db"`.
///
/// A label missing from a series is matched as the empty string. Regular
/// expressions are fully anchored.
#[derive(Debug, Clone)]
pub struct LabelMatcher {
    pub name: String,
    pub op: MatchOp,
    pub value: String,
    regex: Option<Regex>,
}

impl LabelMatcher {
    pub fn new(op: MatchOp, name: &str, value: &str) -> RuntimeResult<Self> {
        let regex = if op.is_regex() {
            let anchored = format!("^(?:{value})$");
            let re = Regex::new(&anchored)
                .map_err(|e| RuntimeError::InvalidRegex(format!("{value}: {e}")))?;
            Some(re)
        } else {
            None
        };
        Ok(Self {
            name: name.to_string(),
            op,
            value: value.to_string(),
            regex,
        })
    }

    pub fn equal(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            op: MatchOp::Equal,
            value: value.to_string(),
            regex: None,
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match (self.op, &self.regex) {
            (MatchOp::Equal, _) => value == self.value,
            (MatchOp::NotEqual, _) => value != self.value,
            (MatchOp::RegexEqual, Some(re)) => re.is_match(value),
            (MatchOp::RegexNotEqual, Some(re)) => !re.is_match(value),
            // regex ops are always compiled by the constructor
            (_, None) => false,
        }
    }

    pub fn matches_labels(&self, labels: &Labels) -> bool {
        self.matches(labels.get(&self.name).unwrap_or(""))
    }
}

impl PartialEq for LabelMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.op == other.op && self.value == other.value
    }
}

impl fmt::Display for LabelMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:?}", self.name, self.op, self.value)
    }
}
