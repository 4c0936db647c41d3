// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Labels and label sets.
//!
//! A [`Label`] is a name/value pair. A [`Labels`] set identifies a metric series and is kept
//! sorted by `(name, value)`, which makes equality between two sets a plain element-wise
//! comparison.
//!
//! Query-side predicates may use [`WILDCARD`] in either the name or the value to match any
//! counterpart.

use std::{fmt, ops::Deref, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

use crate::ParseError;

/// Matches any name or value during containment tests.
pub const WILDCARD: &str = "*";

/// A single name/value pair attached to a metric.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Label {
    /// The label name, e.g. `path`.
    pub name: String,
    /// The label value, e.g. `/users`.
    pub value: String,
}

impl Label {
    /// Creates a new label.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns `true` if `self` matches `probe`, treating [`WILDCARD`] on either side as a match
    /// for that component.
    pub fn matches(&self, probe: &Label) -> bool {
        fn component(a: &str, b: &str) -> bool {
            a == b || a == WILDCARD || b == WILDCARD
        }

        component(&self.name, &probe.name) && component(&self.value, &probe.value)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.value)
    }
}

/// Parses `name:value`. The value may contain further colons; the name may not be empty.
impl FromStr for Label {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s
            .split_once(':')
            .ok_or_else(|| ParseError::Label(s.to_owned()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ParseError::Label(s.to_owned()));
        }
        Ok(Label::new(name, value.trim()))
    }
}

/// An ordered set of labels identifying a metric series.
///
/// Construction sorts by `(name, value)` and removes exact duplicates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Labels(SmallVec<[Label; 4]>);

impl Labels {
    /// Creates a sorted label set.
    pub fn new(labels: impl IntoIterator<Item = Label>) -> Self {
        let mut labels: SmallVec<[Label; 4]> = labels.into_iter().collect();
        labels.sort();
        labels.dedup();
        Self(labels)
    }

    /// Returns the value of the first label named `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|label| label.name == name)
            .map(|label| label.value.as_str())
    }

    /// Returns `true` if some label in this set matches `probe` under wildcard rules.
    pub fn contains_label(&self, probe: &Label) -> bool {
        self.0.iter().any(|label| label.matches(probe))
    }

    /// Disjunctive filter: returns `false` only when none of `required` is contained in this set.
    ///
    /// This is not a superset test. Filtering by `[path:/a, path:/b]` keeps series
    /// for either path.
    ///
    /// ```
    /// use daystat_core::{Label, labels};
    ///
    /// let set = labels!["path" => "/a"];
    /// assert!(!set.more(&[Label::new("path", "/b"), Label::new("path", "/c")]));
    /// assert!(set.more(&[Label::new("path", "/a"), Label::new("path", "/c")]));
    /// ```
    pub fn more(&self, required: &[Label]) -> bool {
        required.iter().any(|probe| self.contains_label(probe))
    }

    /// Returns a new set where `overlay` replaces any label of the same name.
    pub fn with(&self, overlay: &[Label]) -> Labels {
        Labels::new(merge_labels(self, overlay))
    }
}

impl Deref for Labels {
    type Target = [Label];

    fn deref(&self) -> &[Label] {
        &self.0
    }
}

impl FromIterator<Label> for Labels {
    fn from_iter<T: IntoIterator<Item = Label>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl From<Vec<Label>> for Labels {
    fn from(labels: Vec<Label>) -> Self {
        Self::new(labels)
    }
}

impl<'a> IntoIterator for &'a Labels {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, label) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{label}")?;
        }
        f.write_str("}")
    }
}

impl Serialize for Labels {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl<'de> Deserialize<'de> for Labels {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Label>::deserialize(deserializer).map(Labels::from)
    }
}

/// Merges two label lists by name.
///
/// Entries from `overlay` win on a name collision. The result lists the overlay entries first,
/// followed by the base entries whose names were not overridden; every name appears at most once.
pub fn merge_labels(base: &[Label], overlay: &[Label]) -> Vec<Label> {
    let mut merged: Vec<Label> = Vec::with_capacity(base.len() + overlay.len());
    for label in overlay.iter().chain(base) {
        if !merged.iter().any(|seen| seen.name == label.name) {
            merged.push(label.clone());
        }
    }
    merged
}

/// Builds a [`Labels`] set from `name => value` pairs.
///
/// ```
/// let labels = daystat_core::labels!["path" => "/x", "method" => "GET"];
/// assert_eq!(labels.get("method"), Some("GET"));
/// ```
#[macro_export]
macro_rules! labels {
    ($($name:expr => $value:expr),* $(,)?) => {
        $crate::Labels::new([$($crate::Label::new($name, $value)),*])
    };
}
