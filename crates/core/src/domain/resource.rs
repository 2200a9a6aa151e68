use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A flat field-value CRM record, as returned by both the live gateway and the simulated store.
pub type Record = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Lead,
    Task,
    Opportunity,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [Self::Lead, Self::Task, Self::Opportunity];

    pub fn doctype(&self) -> &'static str {
        match self {
            Self::Lead => "Lead",
            Self::Task => "Task",
            Self::Opportunity => "Opportunity",
        }
    }

    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Lead => "LEAD",
            Self::Task => "TASK",
            Self::Opportunity => "OPTY",
        }
    }

    /// Resolves a doctype name coming from outside the process (assistant output, HTTP bodies).
    pub fn parse(doctype: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.doctype().eq_ignore_ascii_case(doctype.trim()))
    }

    pub fn record_name(&self, sequence: u64) -> String {
        format!("{}-{:05}", self.id_prefix(), sequence)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.doctype())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Equals,
    #[serde(rename = "like")]
    Like,
    #[serde(rename = ">")]
    After,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::Like => "like",
            Self::After => ">",
        }
    }

    /// Exact spelling only. `"LIKE"` or `" = "` are unknown operators.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "=" => Some(Self::Equals),
            "like" => Some(Self::Like),
            ">" => Some(Self::After),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self { field: field.into(), operator, value: value.into() }
    }

    /// Reads a `[field, operator, value]` triple. Anything else, including an operator outside
    /// the supported set, yields `None` so the entry places no restriction on the result.
    pub fn from_triple(raw: &Value) -> Option<Self> {
        let [field, operator, value] = raw.as_array()?.as_slice() else {
            return None;
        };
        let field = field.as_str()?;
        let operator = FilterOperator::parse(operator.as_str()?)?;
        Some(Self::new(field, operator, value.clone()))
    }

    pub fn list_from_value(raw: &Value) -> Vec<Self> {
        raw.as_array()
            .map(|entries| entries.iter().filter_map(Self::from_triple).collect())
            .unwrap_or_default()
    }

    /// Whether this filter restricts records of `kind` at all.
    pub fn applies_to(&self, kind: ResourceKind) -> bool {
        match self.operator {
            FilterOperator::Equals | FilterOperator::Like => true,
            FilterOperator::After => kind == ResourceKind::Lead && self.field == "creation",
        }
    }

    pub fn admits(&self, kind: ResourceKind, record: &Record) -> bool {
        if !self.applies_to(kind) {
            return true;
        }

        let Some(actual) = record.get(&self.field) else {
            return false;
        };

        match self.operator {
            FilterOperator::Equals => actual == &self.value,
            FilterOperator::Like => {
                let haystack = stringify(actual).to_lowercase();
                let needle = stringify(&self.value).to_lowercase();
                haystack.contains(&needle)
            }
            FilterOperator::After => match (parse_timestamp(actual), parse_timestamp(&self.value)) {
                (Some(actual), Some(threshold)) => actual > threshold,
                _ => false,
            },
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Accepts RFC 3339, naive date-times (read as UTC), plain dates (UTC midnight) and epoch millis.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => {
            let raw = raw.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
                return Some(parsed.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(Utc.from_utc_datetime(&naive));
            }
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Number(number) => {
            number.as_i64().and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        }
        _ => None,
    }
}
