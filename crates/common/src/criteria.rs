//! Tenant-authored rule tree deciding a monitor's health.
//!
//! A `CriteriaSet` is an ordered sequence of groups; the first group whose
//! combined filters hold wins. Order inside a group only matters for
//! short-circuiting, never for the boolean result.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaSet {
    #[serde(default)]
    pub groups: Vec<CriteriaGroup>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaGroup {
    /// Human-readable description, used verbatim as incident text.
    pub description: String,
    pub condition: FilterCondition,
    pub filters: Vec<CriteriaFilter>,
    /// Consecutive matching evaluations required before the group acts.
    #[serde(default = "default_debounce_threshold")]
    pub debounce_threshold: u32,
}

fn default_debounce_threshold() -> u32 {
    1
}

/// How a group's filter results combine.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FilterCondition {
    /// Every filter must hold.
    All,
    /// At least one filter must hold.
    Any,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaFilter {
    pub check_on: CheckOn,
    pub filter_kind: FilterKind,
    pub value: FilterValue,
}

/// Which property of a `CheckResult` a filter inspects.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "property")]
pub enum CheckOn {
    Online,
    ResponseTime,
    StatusCode,
    ResponseBody,
    Measurement { name: String },
    /// A sandboxed expression; the filter's `value` holds the expression
    /// string and is evaluated, not compared.
    Expression,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FilterKind {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    IsTrue,
    IsFalse,
}

/// The declared comparison value, typed to match `check_on`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FilterValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FilterValue::Bool(_) => "boolean",
            FilterValue::Number(_) => "number",
            FilterValue::Text(_) => "text",
        }
    }
}
