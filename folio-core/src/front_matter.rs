//! Front matter values and typed access to them.
//!
//! Front matter is an open mapping: every key a content file declares is
//! kept and handed to templates, whether or not Folio knows what it means.
//! The keys Folio does interpret are validated into a [`PageMeta`].

use std::collections::BTreeMap;
use std::path::{Component, Path};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

/// A single front matter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Table(BTreeMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "a boolean",
            Value::Integer(_) => "an integer",
            Value::Float(_) => "a float",
            Value::String(_) => "a string",
            Value::Array(_) => "an array",
            Value::Table(_) => "a table",
        }
    }

    pub(crate) fn from_yaml(value: serde_yaml::Value) -> Result<Self, String> {
        use serde_yaml::Value as Yaml;

        Ok(match value {
            Yaml::Null => Value::Null,
            Yaml::Bool(b) => Value::Bool(b),
            Yaml::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Yaml::String(s) => Value::String(s),
            Yaml::Sequence(items) => Value::Array(
                items
                    .into_iter()
                    .map(Value::from_yaml)
                    .collect::<Result<_, _>>()?,
            ),
            Yaml::Mapping(mapping) => {
                let mut table = BTreeMap::new();
                for (key, value) in mapping {
                    let key = match key {
                        Yaml::String(s) => s,
                        Yaml::Number(n) => n.to_string(),
                        Yaml::Bool(b) => b.to_string(),
                        other => return Err(format!("unsupported key {other:?}")),
                    };
                    table.insert(key, Value::from_yaml(value)?);
                }
                Value::Table(table)
            }
            Yaml::Tagged(tagged) => Value::from_yaml(tagged.value)?,
        })
    }

    pub(crate) fn from_toml(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Integer(i),
            toml::Value::Float(f) => Value::Float(f),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(dt) => Value::String(dt.to_string()),
            toml::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_toml).collect())
            }
            toml::Value::Table(table) => Value::Table(
                table
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_toml(v)))
                    .collect(),
            ),
        }
    }
}

/// A known front matter key holding a value of the wrong type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("field `{key}` should be {expected}, found {found}")]
pub struct FieldError {
    pub key: String,
    pub expected: &'static str,
    pub found: String,
}

impl FieldError {
    fn new(key: &str, expected: &'static str, found: &Value) -> Self {
        Self {
            key: key.to_string(),
            expected,
            found: found.type_name().to_string(),
        }
    }
}

/// The metadata block at the head of a content file.
///
/// `null` values count as absent for every typed accessor, so `draft:` with
/// nothing after it behaves like no `draft` key at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FrontMatter {
    fields: BTreeMap<String, Value>,
}

impl FrontMatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }

    pub fn insert<K: Into<String>>(&mut self, key: K, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self.fields.get(key) {
            Some(Value::Null) | None => None,
            Some(value) => Some(value),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn str(&self, key: &str) -> Result<Option<&str>, FieldError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(FieldError::new(key, "a string", other)),
        }
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>, FieldError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(FieldError::new(key, "a boolean", other)),
        }
    }

    pub fn integer(&self, key: &str) -> Result<Option<i64>, FieldError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Integer(i)) => Ok(Some(*i)),
            Some(other) => Err(FieldError::new(key, "an integer", other)),
        }
    }

    /// An array whose elements are all strings.
    pub fn string_list(&self, key: &str) -> Result<Option<Vec<String>>, FieldError> {
        const EXPECTED: &str = "an array of strings";

        match self.get(key) {
            None => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(FieldError::new(key, EXPECTED, other)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(other) => Err(FieldError::new(key, EXPECTED, other)),
        }
    }

    /// A date written as `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or RFC 3339.
    pub fn date(&self, key: &str) -> Result<Option<DateTime<Utc>>, FieldError> {
        const EXPECTED: &str = "a date (YYYY-MM-DD or RFC 3339)";

        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let Value::String(raw) = value else {
            return Err(FieldError::new(key, EXPECTED, value));
        };

        parse_date(raw).map(Some).ok_or_else(|| FieldError {
            key: key.to_string(),
            expected: EXPECTED,
            found: format!("\"{raw}\""),
        })
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// The front matter keys Folio interprets, validated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub draft: bool,
    pub template: Option<String>,
    pub slug: Option<String>,
    pub order: Option<i64>,
}

impl PageMeta {
    pub fn from_front_matter(fm: &FrontMatter) -> Result<Self, FieldError> {
        let template = match fm.str("template")? {
            Some(name) => Some(name),
            None => fm.str("layout")?,
        };
        let order = match fm.integer("order")? {
            Some(order) => Some(order),
            None => fm.integer("weight")?,
        };

        Ok(Self {
            title: fm.str("title")?.map(str::to_string),
            description: fm.str("description")?.map(str::to_string),
            date: fm.date("date")?,
            tags: fm.string_list("tags")?.unwrap_or_default(),
            draft: fm.bool("draft")?.unwrap_or(false),
            template: template.map(str::to_string),
            slug: slug(fm)?,
            order,
        })
    }
}

/// `slug` may name nested directories but never climb out of its own.
fn slug(fm: &FrontMatter) -> Result<Option<String>, FieldError> {
    let Some(raw) = fm.str("slug")? else {
        return Ok(None);
    };
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(None);
    }

    if !trimmed.split('/').all(is_plain_segment) {
        return Err(FieldError {
            key: "slug".to_string(),
            expected: "a relative path without `.` or `..` segments",
            found: format!("\"{raw}\""),
        });
    }
    Ok(Some(trimmed.to_string()))
}

fn is_plain_segment(part: &str) -> bool {
    let mut components = Path::new(part).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !part.contains('\\')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fm(pairs: &[(&str, Value)]) -> FrontMatter {
        let mut fm = FrontMatter::new();
        for (k, v) in pairs {
            fm.insert(*k, v.clone());
        }
        fm
    }

    #[test]
    fn accessors_reject_wrong_types() {
        let fm = fm(&[("draft", Value::String("yes".into()))]);
        let err = fm.bool("draft").unwrap_err();
        assert_eq!(err.key, "draft");
        assert_eq!(err.expected, "a boolean");
        assert_eq!(err.found, "a string");
    }

    #[test]
    fn null_counts_as_absent() {
        let fm = fm(&[("draft", Value::Null)]);
        assert_eq!(fm.bool("draft").unwrap(), None);
        assert!(fm.get("draft").is_none());
    }

    #[test]
    fn string_list_checks_every_element() {
        let fm = fm(&[(
            "tags",
            Value::Array(vec![Value::String("rust".into()), Value::Integer(3)]),
        )]);
        let err = fm.string_list("tags").unwrap_err();
        assert_eq!(err.expected, "an array of strings");
        assert_eq!(err.found, "an integer");
    }

    #[test]
    fn dates_accept_common_formats() {
        for raw in ["2024-03-01", "2024-03-01 00:00:00", "2024-03-01T00:00:00Z"] {
            let fm = fm(&[("date", Value::String(raw.into()))]);
            let date = fm.date("date").unwrap().unwrap();
            assert_eq!(date.format("%Y-%m-%d").to_string(), "2024-03-01", "{raw}");
        }

        let fm = fm(&[("date", Value::String("yesterday".into()))]);
        assert!(fm.date("date").is_err());
    }

    #[test]
    fn meta_reads_aliases() {
        let fm = fm(&[
            ("layout", Value::String("wide".into())),
            ("weight", Value::Integer(4)),
            ("slug", Value::String("/hello/".into())),
        ]);
        let meta = PageMeta::from_front_matter(&fm).unwrap();
        assert_eq!(meta.template.as_deref(), Some("wide"));
        assert_eq!(meta.order, Some(4));
        assert_eq!(meta.slug.as_deref(), Some("hello"));
        assert!(!meta.draft);
    }

    #[test]
    fn slugs_cannot_leave_their_directory() {
        for raw in ["../../escaped", "a/../b", "./here", "a//b", "..", "a\\..\\b"] {
            let fm = fm(&[("slug", Value::String(raw.into()))]);
            let err = PageMeta::from_front_matter(&fm).unwrap_err();
            assert_eq!(err.key, "slug", "{raw}");
        }

        let fm = fm(&[("slug", Value::String("guides/setup".into()))]);
        let meta = PageMeta::from_front_matter(&fm).unwrap();
        assert_eq!(meta.slug.as_deref(), Some("guides/setup"));
    }

    #[test]
    fn yaml_values_convert() {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str("a: 1\nb: 2.5\nc: [x, true]\nd: {e: null}").unwrap();
        let Value::Table(table) = Value::from_yaml(yaml).unwrap() else {
            panic!("expected a table");
        };
        assert_eq!(table["a"], Value::Integer(1));
        assert_eq!(table["b"], Value::Float(2.5));
        assert_eq!(
            table["c"],
            Value::Array(vec![Value::String("x".into()), Value::Bool(true)])
        );
        let mut inner = BTreeMap::new();
        inner.insert("e".to_string(), Value::Null);
        assert_eq!(table["d"], Value::Table(inner));
    }

    #[test]
    fn serializes_untagged() {
        let fm = fm(&[("n", Value::Integer(1)), ("s", Value::String("x".into()))]);
        let json = serde_json::to_string(&fm).unwrap();
        assert_eq!(json, r#"{"n":1,"s":"x"}"#);
    }
}
