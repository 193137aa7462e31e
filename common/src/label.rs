use std::cmp::Ordering;
use std::fmt;
use std::fmt::Display;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::hash::new_stable_hasher;

pub const METRIC_NAME_LABEL: &str = "__name__";

const SEP: u8 = 0xff;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new<S: Into<String>, V: Into<String>>(name: S, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        let cmp = self.name.cmp(&other.name);
        if cmp != Ordering::Equal {
            cmp
        } else {
            self.value.cmp(&other.value)
        }
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{name}={value:?}", name = self.name, value = self.value)
    }
}

impl Hash for Label {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(self.name.as_bytes());
        state.write_u8(SEP);
        state.write(self.value.as_bytes());
    }
}

/// An immutable label set, sorted by name. Label names are unique.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Labels(Vec<Label>);

impl Labels {
    pub fn new(mut labels: Vec<Label>) -> Self {
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        // later duplicates win
        labels.reverse();
        labels.dedup_by(|a, b| a.name == b.name);
        labels.reverse();
        labels.retain(|l| !l.value.is_empty());
        Labels(labels)
    }

    pub fn empty() -> Self {
        Labels(vec![])
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let labels = pairs
            .into_iter()
            .map(|(name, value)| Label::new(name, value))
            .collect();
        Self::new(labels)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.0.iter()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .binary_search_by(|l| l.name.as_str().cmp(name))
            .ok()
            .map(|idx| self.0[idx].value.as_str())
    }

    pub fn metric_name(&self) -> Option<&str> {
        self.get(METRIC_NAME_LABEL)
    }

    /// Hash of the labels whose names appear in `names`. The order of `names`
    /// does not affect the result.
    pub fn hash_for_labels<S: AsRef<str>>(&self, names: &[S]) -> u64 {
        self.hash_matching(|name| names.iter().any(|n| n.as_ref() == name))
    }

    /// Hash of all labels except those named in `names` and the metric name.
    pub fn hash_without_labels<S: AsRef<str>>(&self, names: &[S]) -> u64 {
        self.hash_matching(|name| {
            name != METRIC_NAME_LABEL && !names.iter().any(|n| n.as_ref() == name)
        })
    }

    fn hash_matching(&self, mut include: impl FnMut(&str) -> bool) -> u64 {
        let mut hasher = new_stable_hasher();
        for label in self.0.iter().filter(|l| include(&l.name)) {
            hasher.update(label.name.as_bytes());
            hasher.update(&[SEP]);
            hasher.update(label.value.as_bytes());
            hasher.update(&[SEP]);
        }
        hasher.digest()
    }

    pub fn drop_metric_name(&self) -> Labels {
        if self.metric_name().is_none() {
            return self.clone();
        }
        Labels(
            self.0
                .iter()
                .filter(|l| l.name != METRIC_NAME_LABEL)
                .cloned()
                .collect(),
        )
    }
}

impl Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, label) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{label}")?;
        }
        write!(f, "}}")
    }
}

impl From<Vec<Label>> for Labels {
    fn from(labels: Vec<Label>) -> Self {
        Labels::new(labels)
    }
}

/// Derives a new label set from an existing one.
#[derive(Debug, Default, Clone)]
pub struct LabelsBuilder {
    labels: Vec<Label>,
}

impl LabelsBuilder {
    pub fn new(base: &Labels) -> Self {
        let mut builder = Self::default();
        builder.reset(base);
        builder
    }

    pub fn reset(&mut self, base: &Labels) -> &mut Self {
        self.labels.clear();
        self.labels.extend(base.iter().cloned());
        self
    }

    /// Removes every label not named in `names`.
    pub fn keep<S: AsRef<str>>(&mut self, names: &[S]) -> &mut Self {
        self.labels
            .retain(|l| names.iter().any(|n| n.as_ref() == l.name));
        self
    }

    pub fn del<S: AsRef<str>>(&mut self, names: &[S]) -> &mut Self {
        self.labels
            .retain(|l| !names.iter().any(|n| n.as_ref() == l.name));
        self
    }

    pub fn labels(&self) -> Labels {
        Labels::new(self.labels.clone())
    }
}
