//! Output format hints and deterministic value formatting.
//!
//! Hints: `int`, `float`, `str`, `{key:type, ...}` for one object and
//! `list[...]` for a list of anything else. Unknown hints are treated as `str`.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};

use crate::planning::Metric;
use crate::storage::RowSet;

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d[\d,]*(?:\.\d+)?").expect("number regex should be valid"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FormatHint {
    Int,
    Float,
    #[default]
    Str,
    Object(Vec<(String, FormatHint)>),
    List(Box<FormatHint>),
}

impl FromStr for FormatHint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let lower = s.to_lowercase();
        match lower.as_str() {
            "int" | "integer" => return Ok(Self::Int),
            "float" | "number" | "double" => return Ok(Self::Float),
            "str" | "string" | "text" => return Ok(Self::Str),
            _ => {}
        }

        if lower.starts_with("list[") && s.ends_with(']') {
            return Ok(Self::List(Box::new(s[5..s.len() - 1].parse()?)));
        }
        if s.starts_with('{') && s.ends_with('}') {
            let inner = &s[1..s.len() - 1];
            let mut fields = Vec::new();
            for field in split_top_level(inner) {
                let (key, kind) = field
                    .split_once(':')
                    .ok_or_else(|| format!("field '{}' has no type", field.trim()))?;
                let key = key.trim().trim_matches(|c| c == '"' || c == '\'');
                if key.is_empty() {
                    return Err("empty field name".to_string());
                }
                fields.push((key.to_string(), kind.parse()?));
            }
            return Ok(Self::Object(fields));
        }
        Err(format!("unknown format hint '{s}'"))
    }
}

impl fmt::Display for FormatHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Str => f.write_str("str"),
            Self::Object(fields) => {
                f.write_str("{")?;
                for (idx, (key, kind)) in fields.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}:{kind}")?;
                }
                f.write_str("}")
            }
            Self::List(inner) => write!(f, "list[{inner}]"),
        }
    }
}

/// Splits on commas that are not nested inside brackets or braces.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (idx, c) in s.char_indices() {
        match c {
            '[' | '{' => depth += 1,
            ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&s[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

impl FormatHint {
    /// Lenient parse: anything unrecognised becomes `Str`.
    pub fn parse_lenient(hint: Option<&str>) -> Self {
        hint.and_then(|h| h.parse().ok()).unwrap_or_default()
    }

    /// Value used when the evidence cannot fill the hint.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Int => Value::from(0),
            Self::Float => Value::from(0.0),
            Self::Str => Value::String(String::new()),
            Self::Object(_) => Value::Object(Map::new()),
            Self::List(_) => Value::Array(Vec::new()),
        }
    }

    /// Shapes query rows into this hint. `sentence` fills `str`.
    pub fn fill_rows(&self, rows: &RowSet, sentence: &str) -> Option<Value> {
        match self {
            Self::Str => Some(Value::String(sentence.to_string())),
            Self::Int | Self::Float => self.cast(rows.scalar()?),
            Self::Object(_) => self.fill_row(rows.rows.first()?),
            Self::List(inner) => {
                if rows.is_empty() {
                    return None;
                }
                rows.rows.iter().map(|row| inner.fill_row(row)).collect::<Option<Vec<_>>>().map(Value::Array)
            }
        }
    }

    /// Shapes passage text into this hint: numbers are read from `text`.
    pub fn fill_text(&self, text: &str) -> Option<Value> {
        match self {
            Self::Str => Some(Value::String(text.to_string())),
            Self::Int | Self::Float => {
                let found = NUMBER.find(text)?;
                self.cast(&Value::String(found.as_str().to_string()))
            }
            Self::Object(_) | Self::List(_) => None,
        }
    }

    fn fill_row(&self, row: &[Value]) -> Option<Value> {
        match self {
            Self::Object(fields) => {
                if row.len() < fields.len() {
                    return None;
                }
                let mut map = Map::new();
                for ((key, kind), cell) in fields.iter().zip(row) {
                    map.insert(key.clone(), kind.cast(cell)?);
                }
                Some(Value::Object(map))
            }
            Self::List(_) => None,
            scalar => scalar.cast(row.first()?),
        }
    }

    /// Converts one cell to this scalar type.
    fn cast(&self, cell: &Value) -> Option<Value> {
        let number = || match cell {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.replace(',', "").trim().parse::<f64>().ok(),
            Value::Bool(b) => Some(f64::from(u8::from(*b))),
            _ => None,
        };
        match self {
            Self::Int => number().map(|v| Value::from(v.round() as i64)),
            Self::Float => number().and_then(|v| Number::from_f64(round_to(v, 2))).map(Value::Number),
            Self::Str => match cell {
                Value::Null => None,
                Value::String(s) => Some(Value::String(s.clone())),
                other => Some(Value::String(other.to_string())),
            },
            Self::Object(_) | Self::List(_) => None,
        }
    }
}

pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

/// `1234567` -> `"1,234,567"`.
pub fn with_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (idx, c) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if value < 0 {
        out.insert(0, '-');
    }
    out
}

/// `1234.5` -> `"$1,234.50"`.
pub fn format_currency(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as i64;
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${}.{:02}", with_thousands(cents / 100), cents % 100)
}

/// Formats a metric value the way answers present it.
pub fn format_metric(metric: Metric, value: f64) -> String {
    if metric.is_monetary() {
        format_currency(value)
    } else {
        with_thousands(value.round() as i64)
    }
}

/// Display text for a cell that is not a metric value.
pub fn cell_text(cell: &Value) -> String {
    match cell {
        Value::Null => "n/a".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Truncates to at most `max` characters, preferring the last sentence end
/// that fits. Falls back to a word boundary with an ellipsis.
pub fn truncate_at_sentence(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut = text.char_indices().nth(max).map_or(text.len(), |(idx, _)| idx);
    let head = &text[..cut];

    if let Some(end) = head.rfind(['.', '!', '?']).filter(|end| *end > 0) {
        return head[..=end].to_string();
    }
    let budget = max.saturating_sub(3);
    let cut = text.char_indices().nth(budget).map_or(text.len(), |(idx, _)| idx);
    let head = &text[..cut];
    let head = head.rfind(' ').map_or(head, |space| &head[..space]);
    format!("{}...", head.trim_end())
}
