// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Query parameters as they arrive from an HTTP query string.
//!
//! Everything is validated here, so malformed input never reaches the stores.

use std::str::FromStr;

use daystat_aggregation::{DaySelector, query::RankBy};
use daystat_core::{Label, ParseError};

/// A parsed `days=..&labels=..&rank_by=..&n=..` query.
///
/// `days` and `labels` are comma separated lists. Omitted keys fall back to today, no label
/// filter, ranking by count and no truncation. Unknown keys are ignored.
///
/// ```
/// use daystat::{DaySelector, QueryParams, RankBy};
///
/// let params: QueryParams = "days=1,lifetime&labels=path:/a&rank_by=avg&n=5".parse().unwrap();
/// assert_eq!(params.days, [DaySelector::DaysAgo(1), DaySelector::Lifetime]);
/// assert_eq!(params.rank_by, RankBy::Average);
/// assert_eq!(params.n, 5);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryParams {
    /// Families to read.
    pub days: Vec<DaySelector>,
    /// Label predicates; an entry is kept if it matches any of them.
    pub labels: Vec<Label>,
    /// The statistic to rank by.
    pub rank_by: RankBy,
    /// Number of results to keep, 0 for all.
    pub n: usize,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            days: vec![DaySelector::TODAY],
            labels: Vec::new(),
            rank_by: RankBy::Count,
            n: 0,
        }
    }
}

fn list<T: FromStr>(value: &str) -> Result<Vec<T>, T::Err> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::parse)
        .collect()
}

impl FromStr for QueryParams {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut params = QueryParams::default();
        for pair in s.trim_start_matches('?').split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "days" | "day" => {
                    let days = list::<DaySelector>(value)?;
                    if !days.is_empty() {
                        params.days = days;
                    }
                }
                "labels" | "label" => params.labels.extend(list::<Label>(value)?),
                "rank_by" | "sort" => params.rank_by = value.parse()?,
                "n" | "top" => {
                    params.n = value
                        .trim()
                        .parse()
                        .map_err(|_| ParseError::TopN(value.to_owned()))?
                }
                _ => {}
            }
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;
    use rstest::rstest;

    use super::*;

    #[test]
    fn empty_query_is_default() {
        check!("".parse::<QueryParams>() == Ok(QueryParams::default()));
        check!("?".parse::<QueryParams>() == Ok(QueryParams::default()));
    }

    #[test]
    fn repeated_labels_accumulate() {
        let params: QueryParams = "label=path:/a&label=path:/b,method:*".parse().unwrap();
        check!(
            params.labels
                == [
                    Label::new("path", "/a"),
                    Label::new("path", "/b"),
                    Label::new("method", "*"),
                ]
        );
    }

    #[rstest]
    #[case("days=yesterday")]
    #[case("days=1,-2")]
    #[case("labels=nocolon")]
    #[case("rank_by=p50")]
    #[case("n=ten")]
    fn malformed_input_is_rejected(#[case] query: &str) {
        check!(query.parse::<QueryParams>().is_err());
    }
}
