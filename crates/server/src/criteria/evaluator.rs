//! Pure mapping from a check result and a tenant-configured criteria set to
//! a match outcome.
//!
//! Groups are tried in declaration order and the first matching group wins.
//! Inside a group every filter is evaluated (no short-circuiting), so the
//! result is independent of filter order, including when a filter is
//! misconfigured. A group with an invalid filter is treated as unmatched and
//! logged; the remaining groups still get their turn. Expression faults are
//! narrower: they fail closed to a false filter without invalidating the
//! group.

use pulsegate_common::check::CheckResult;
use pulsegate_common::criteria::{
    CheckOn, CriteriaFilter, CriteriaGroup, CriteriaSet, FilterCondition, FilterKind, FilterValue,
};
use thiserror::Error;
use tracing::warn;

/// Which criteria group, if any, matched a check result. `None` means the
/// resource is considered healthy.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub matched: Option<MatchedGroup>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchedGroup {
    pub index: usize,
    pub description: String,
    pub debounce_threshold: u32,
}

impl MatchOutcome {
    pub fn no_match() -> Self {
        Self { matched: None }
    }

    pub fn is_match(&self) -> bool {
        self.matched.is_some()
    }
}

/// Tenant misconfiguration: a filter whose declared value cannot be applied
/// to the inspected property. Never silently coerced.
#[derive(Debug, Error, PartialEq)]
pub enum InvalidCriteriaError {
    #[error("filter on {property} expects a {expected} value, got {found}")]
    TypeMismatch {
        property: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("comparison {kind:?} is not applicable to {property}")]
    UnsupportedComparison {
        property: String,
        kind: FilterKind,
    },
}

pub fn evaluate(result: &CheckResult, criteria: &CriteriaSet) -> MatchOutcome {
    for (index, group) in criteria.groups.iter().enumerate() {
        match evaluate_group(result, group) {
            Ok(true) => {
                return MatchOutcome {
                    matched: Some(MatchedGroup {
                        index,
                        description: group.description.clone(),
                        debounce_threshold: group.debounce_threshold.max(1),
                    }),
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(
                    monitor_id = result.monitor_id,
                    group = %group.description,
                    error = %e,
                    "Criteria group has an invalid filter; treating it as unmatched."
                );
            }
        }
    }
    MatchOutcome::no_match()
}

fn evaluate_group(result: &CheckResult, group: &CriteriaGroup) -> Result<bool, InvalidCriteriaError> {
    // A group without filters matches nothing rather than everything.
    if group.filters.is_empty() {
        return Ok(false);
    }

    let mut verdicts = Vec::with_capacity(group.filters.len());
    for filter in &group.filters {
        verdicts.push(evaluate_filter(result, filter)?);
    }

    Ok(match group.condition {
        FilterCondition::All => verdicts.iter().all(|v| *v),
        FilterCondition::Any => verdicts.iter().any(|v| *v),
    })
}

fn evaluate_filter(
    result: &CheckResult,
    filter: &CriteriaFilter,
) -> Result<bool, InvalidCriteriaError> {
    match &filter.check_on {
        CheckOn::Online => eval_online(result.is_online, filter),
        CheckOn::ResponseTime => eval_numeric(
            "responseTime",
            result.response_time_ms.map(|ms| ms as f64),
            filter,
        ),
        CheckOn::StatusCode => eval_numeric(
            "statusCode",
            result.status_code.map(|code| code as f64),
            filter,
        ),
        CheckOn::ResponseBody => eval_text(result.body_excerpt.as_deref().unwrap_or(""), filter),
        CheckOn::Measurement { name } => eval_numeric(
            &format!("measurements.{name}"),
            result.measurements.get(name).copied(),
            filter,
        ),
        CheckOn::Expression => eval_expression(result, filter),
    }
}

fn eval_online(is_online: bool, filter: &CriteriaFilter) -> Result<bool, InvalidCriteriaError> {
    match filter.filter_kind {
        FilterKind::IsTrue => Ok(is_online),
        FilterKind::IsFalse => Ok(!is_online),
        FilterKind::Equals | FilterKind::NotEquals => match &filter.value {
            FilterValue::Bool(expected) => {
                let equal = is_online == *expected;
                Ok(if filter.filter_kind == FilterKind::Equals {
                    equal
                } else {
                    !equal
                })
            }
            other => Err(InvalidCriteriaError::TypeMismatch {
                property: "online".to_string(),
                expected: "boolean",
                found: other.type_name(),
            }),
        },
        kind => Err(InvalidCriteriaError::UnsupportedComparison {
            property: "online".to_string(),
            kind,
        }),
    }
}

/// A result that lacks the inspected property (e.g. no latency because the
/// target never answered) matches no numeric filter.
fn eval_numeric(
    property: &str,
    actual: Option<f64>,
    filter: &CriteriaFilter,
) -> Result<bool, InvalidCriteriaError> {
    let expected = match &filter.value {
        FilterValue::Number(n) => *n,
        other => {
            return Err(InvalidCriteriaError::TypeMismatch {
                property: property.to_string(),
                expected: "number",
                found: other.type_name(),
            })
        }
    };

    let Some(actual) = actual else {
        return Ok(false);
    };

    match filter.filter_kind {
        FilterKind::Equals => Ok((actual - expected).abs() < f64::EPSILON),
        FilterKind::NotEquals => Ok((actual - expected).abs() >= f64::EPSILON),
        FilterKind::GreaterThan => Ok(actual > expected),
        FilterKind::LessThan => Ok(actual < expected),
        kind => Err(InvalidCriteriaError::UnsupportedComparison {
            property: property.to_string(),
            kind,
        }),
    }
}

fn eval_text(actual: &str, filter: &CriteriaFilter) -> Result<bool, InvalidCriteriaError> {
    let expected = match &filter.value {
        FilterValue::Text(s) => s.as_str(),
        other => {
            return Err(InvalidCriteriaError::TypeMismatch {
                property: "responseBody".to_string(),
                expected: "text",
                found: other.type_name(),
            })
        }
    };

    match filter.filter_kind {
        FilterKind::Equals => Ok(actual == expected),
        FilterKind::NotEquals => Ok(actual != expected),
        FilterKind::Contains => Ok(actual.contains(expected)),
        FilterKind::NotContains => Ok(!actual.contains(expected)),
        kind => Err(InvalidCriteriaError::UnsupportedComparison {
            property: "responseBody".to_string(),
            kind,
        }),
    }
}

/// The stored expression is evaluated, not compared; any evaluation fault
/// fails closed to a false filter.
fn eval_expression(
    result: &CheckResult,
    filter: &CriteriaFilter,
) -> Result<bool, InvalidCriteriaError> {
    let expression = match &filter.value {
        FilterValue::Text(s) => s.as_str(),
        other => {
            return Err(InvalidCriteriaError::TypeMismatch {
                property: "expression".to_string(),
                expected: "text",
                found: other.type_name(),
            })
        }
    };

    match super::expression::evaluate(expression, result) {
        Ok(verdict) => Ok(verdict),
        Err(e) => {
            warn!(
                monitor_id = result.monitor_id,
                expression = expression,
                error = %e,
                "Expression filter failed to evaluate; treating filter as false."
            );
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn check_result(is_online: bool, response_time_ms: Option<i64>) -> CheckResult {
        CheckResult {
            monitor_id: 9,
            probe_id: "probe-1".to_string(),
            checked_at: Utc::now(),
            is_online,
            response_time_ms,
            status_code: if is_online { Some(200) } else { None },
            body_excerpt: Some("ok".to_string()),
            measurements: HashMap::new(),
            error: None,
        }
    }

    fn online_filter(expected: bool) -> CriteriaFilter {
        CriteriaFilter {
            check_on: CheckOn::Online,
            filter_kind: if expected {
                FilterKind::IsTrue
            } else {
                FilterKind::IsFalse
            },
            value: FilterValue::Bool(expected),
        }
    }

    fn latency_filter(kind: FilterKind, threshold: f64) -> CriteriaFilter {
        CriteriaFilter {
            check_on: CheckOn::ResponseTime,
            filter_kind: kind,
            value: FilterValue::Number(threshold),
        }
    }

    fn group(condition: FilterCondition, filters: Vec<CriteriaFilter>) -> CriteriaGroup {
        CriteriaGroup {
            description: "test group".to_string(),
            condition,
            filters,
            debounce_threshold: 1,
        }
    }

    #[test]
    fn all_matches_iff_every_filter_is_true() {
        let result = check_result(true, Some(2500));
        let criteria = CriteriaSet {
            groups: vec![group(
                FilterCondition::All,
                vec![
                    online_filter(true),
                    latency_filter(FilterKind::GreaterThan, 2000.0),
                ],
            )],
        };
        assert!(evaluate(&result, &criteria).is_match());

        let fast = check_result(true, Some(1500));
        assert!(!evaluate(&fast, &criteria).is_match());
    }

    #[test]
    fn any_matches_iff_at_least_one_filter_is_true() {
        let result = check_result(true, Some(1500));
        let criteria = CriteriaSet {
            groups: vec![group(
                FilterCondition::Any,
                vec![
                    online_filter(false),
                    latency_filter(FilterKind::GreaterThan, 1000.0),
                ],
            )],
        };
        assert!(evaluate(&result, &criteria).is_match());

        let quick = check_result(true, Some(500));
        assert!(!evaluate(&quick, &criteria).is_match());
    }

    #[test]
    fn offline_result_fails_an_online_expectation() {
        let result = check_result(false, None);
        let criteria = CriteriaSet {
            groups: vec![group(FilterCondition::All, vec![online_filter(true)])],
        };
        assert!(!evaluate(&result, &criteria).is_match());
    }

    #[test]
    fn first_matching_group_wins() {
        let result = check_result(true, Some(3000));
        let mut first = group(
            FilterCondition::All,
            vec![latency_filter(FilterKind::GreaterThan, 2000.0)],
        );
        first.description = "slow".to_string();
        let mut second = group(
            FilterCondition::All,
            vec![latency_filter(FilterKind::GreaterThan, 1000.0)],
        );
        second.description = "slower than usual".to_string();

        let criteria = CriteriaSet {
            groups: vec![first, second],
        };
        let outcome = evaluate(&result, &criteria);
        let matched = outcome.matched.expect("a group should match");
        assert_eq!(matched.index, 0);
        assert_eq!(matched.description, "slow");
    }

    #[test]
    fn threshold_scenario_from_latency() {
        let criteria = CriteriaSet {
            groups: vec![group(
                FilterCondition::All,
                vec![latency_filter(FilterKind::GreaterThan, 2000.0)],
            )],
        };
        assert!(evaluate(&check_result(true, Some(2500)), &criteria).is_match());
        assert!(!evaluate(&check_result(true, Some(1500)), &criteria).is_match());
    }

    #[test]
    fn missing_latency_matches_no_numeric_filter() {
        let criteria = CriteriaSet {
            groups: vec![group(
                FilterCondition::All,
                vec![latency_filter(FilterKind::LessThan, 2000.0)],
            )],
        };
        assert!(!evaluate(&check_result(false, None), &criteria).is_match());
    }

    #[test]
    fn invalid_group_is_skipped_and_later_groups_still_match() {
        let result = check_result(true, Some(2500));
        let broken = group(
            FilterCondition::All,
            vec![CriteriaFilter {
                check_on: CheckOn::ResponseTime,
                filter_kind: FilterKind::GreaterThan,
                value: FilterValue::Text("fast".to_string()),
            }],
        );
        let valid = group(
            FilterCondition::All,
            vec![latency_filter(FilterKind::GreaterThan, 2000.0)],
        );

        let criteria = CriteriaSet {
            groups: vec![broken, valid],
        };
        let outcome = evaluate(&result, &criteria);
        assert_eq!(outcome.matched.map(|m| m.index), Some(1));
    }

    #[test]
    fn body_contains_filter() {
        let mut result = check_result(true, Some(100));
        result.body_excerpt = Some("internal error".to_string());
        let criteria = CriteriaSet {
            groups: vec![group(
                FilterCondition::All,
                vec![CriteriaFilter {
                    check_on: CheckOn::ResponseBody,
                    filter_kind: FilterKind::Contains,
                    value: FilterValue::Text("error".to_string()),
                }],
            )],
        };
        assert!(evaluate(&result, &criteria).is_match());

        result.body_excerpt = Some("ok".to_string());
        assert!(!evaluate(&result, &criteria).is_match());
    }

    #[test]
    fn expression_faults_fail_closed_without_invalidating_the_group() {
        let result = check_result(true, Some(100));
        let criteria = CriteriaSet {
            groups: vec![group(
                FilterCondition::Any,
                vec![
                    CriteriaFilter {
                        check_on: CheckOn::Expression,
                        filter_kind: FilterKind::IsTrue,
                        value: FilterValue::Text("no_such_field > 1".to_string()),
                    },
                    latency_filter(FilterKind::GreaterThan, 50.0),
                ],
            )],
        };
        // The broken expression is false, the latency filter still matches.
        assert!(evaluate(&result, &criteria).is_match());
    }

    #[test]
    fn empty_group_never_matches() {
        let result = check_result(true, Some(100));
        let criteria = CriteriaSet {
            groups: vec![group(FilterCondition::All, vec![])],
        };
        assert!(!evaluate(&result, &criteria).is_match());
    }
}
