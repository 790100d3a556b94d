use std::str::FromStr;

/// A global `label=value` pair attached to every exported metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelValue {
    pub label: String,
    pub value: String,
}

impl LabelValue {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

impl FromStr for LabelValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((label, value)) if !label.is_empty() => Ok(Self::new(label, value)),
            _ => Err(format!("LabelValue {s} is not a valid label=value")),
        }
    }
}
