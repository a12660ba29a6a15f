//! Schema-driven decoding of CMS property bags.
//!
//! Each domain object declares a table of [`FieldSpec`]s. [`decode`] walks the
//! table once, extracting every property into a [`FieldValue`] or a
//! [`FieldError`]. Optional fields never fail a record; a single failing
//! required field turns the whole record into [`Invalid`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;
use time::{
    Date, OffsetDateTime, format_description::FormatItem, format_description::well_known::Rfc3339,
    macros::format_description,
};

use crate::application::store::RawRecord;
use crate::domain::types::Locale;

/// Property every CMS database uses for the record title.
pub const TITLE_PROPERTY: &str = "Name";

/// Pseudo property name used when the record metadata timestamp is broken.
pub const LAST_EDITED_FIELD: &str = "last_edited_time";

const DATE_ONLY_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// Concatenated plain text of a `title` or `rich_text` property.
    Text,
    Select,
    /// A select whose value must be a supported [`Locale`] code.
    Locale,
    MultiSelect,
    Number,
    /// A number where `0` counts as unset.
    NonZeroNumber,
    Date,
    Checkbox,
    /// A `url` property or the first entry of a `files` property.
    Url,
}

impl PropertyKind {
    fn accepts(self, property_type: &str) -> bool {
        match self {
            PropertyKind::Text => matches!(property_type, "title" | "rich_text"),
            PropertyKind::Select | PropertyKind::Locale => property_type == "select",
            PropertyKind::MultiSelect => property_type == "multi_select",
            PropertyKind::Number | PropertyKind::NonZeroNumber => property_type == "number",
            PropertyKind::Date => property_type == "date",
            PropertyKind::Checkbox => property_type == "checkbox",
            PropertyKind::Url => matches!(property_type, "url" | "files"),
        }
    }

    fn name(self) -> &'static str {
        match self {
            PropertyKind::Text => "text",
            PropertyKind::Select => "select",
            PropertyKind::Locale => "locale",
            PropertyKind::MultiSelect => "multi_select",
            PropertyKind::Number => "number",
            PropertyKind::NonZeroNumber => "non_zero_number",
            PropertyKind::Date => "date",
            PropertyKind::Checkbox => "checkbox",
            PropertyKind::Url => "url",
        }
    }
}

/// One row of a record schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub property: &'static str,
    pub kind: PropertyKind,
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(property: &'static str, kind: PropertyKind) -> Self {
        Self {
            property,
            kind,
            required: true,
        }
    }

    pub const fn optional(property: &'static str, kind: PropertyKind) -> Self {
        Self {
            property,
            kind,
            required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Locale(Locale),
    Set(BTreeSet<String>),
    Number(f64),
    Date(OffsetDateTime),
    Flag(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("missing")]
    Missing,
    #[error("expected {expected}, found `{found}`")]
    WrongType {
        expected: &'static str,
        found: String,
    },
    #[error("unrecognized locale `{0}`")]
    UnknownLocale(String),
    #[error("unparsable value `{0}`")]
    Unparsable(String),
}

/// A record that failed validation and must be skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record `{record_id}` with title {title:?} has invalid properties: {}", FailureList(.failures))]
pub struct Invalid {
    pub record_id: String,
    pub title: Option<String>,
    pub failures: Vec<(&'static str, FieldError)>,
}

struct FailureList<'a>(&'a [(&'static str, FieldError)]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (property, error)) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{property} ({error})")?;
        }
        Ok(())
    }
}

/// Successfully extracted fields of one record.
#[derive(Debug, Clone)]
pub struct DecodedRecord {
    pub id: String,
    pub last_edited: OffsetDateTime,
    values: HashMap<&'static str, FieldValue>,
}

impl DecodedRecord {
    /// Move a text value out of the record.
    pub fn take_text(&mut self, property: &str) -> Option<String> {
        match self.values.remove(property) {
            Some(FieldValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Move a multi-select value out of the record; absent sets are empty.
    pub fn take_set(&mut self, property: &str) -> BTreeSet<String> {
        match self.values.remove(property) {
            Some(FieldValue::Set(set)) => set,
            _ => BTreeSet::new(),
        }
    }

    pub fn locale(&self, property: &str) -> Option<Locale> {
        match self.values.get(property) {
            Some(FieldValue::Locale(locale)) => Some(*locale),
            _ => None,
        }
    }

    pub fn number(&self, property: &str) -> Option<f64> {
        match self.values.get(property) {
            Some(FieldValue::Number(number)) => Some(*number),
            _ => None,
        }
    }

    pub fn date(&self, property: &str) -> Option<OffsetDateTime> {
        match self.values.get(property) {
            Some(FieldValue::Date(date)) => Some(*date),
            _ => None,
        }
    }

    pub fn flag(&self, property: &str) -> Option<bool> {
        match self.values.get(property) {
            Some(FieldValue::Flag(flag)) => Some(*flag),
            _ => None,
        }
    }
}

/// Decode `record` against `schema`.
pub fn decode(record: &RawRecord, schema: &[FieldSpec]) -> Result<DecodedRecord, Invalid> {
    let mut values = HashMap::with_capacity(schema.len());
    let mut failures = Vec::new();

    let last_edited = match record.last_edited_time.as_deref() {
        Some(raw) => parse_timestamp(raw),
        None => Err(FieldError::Missing),
    };
    if let Err(error) = &last_edited {
        failures.push((LAST_EDITED_FIELD, error.clone()));
    }

    for spec in schema {
        match extract(&record.properties, spec) {
            Ok(value) => {
                values.insert(spec.property, value);
            }
            Err(error) if spec.required => failures.push((spec.property, error)),
            Err(_) => {}
        }
    }

    match last_edited {
        Ok(last_edited) if failures.is_empty() => Ok(DecodedRecord {
            id: record.id.clone(),
            last_edited,
            values,
        }),
        _ => Err(Invalid {
            record_id: record.id.clone(),
            title: plain_text(&record.properties, TITLE_PROPERTY).ok(),
            failures,
        }),
    }
}

fn extract(properties: &Map<String, Value>, spec: &FieldSpec) -> Result<FieldValue, FieldError> {
    match spec.kind {
        PropertyKind::Text => plain_text(properties, spec.property).map(FieldValue::Text),
        PropertyKind::Select => select(properties, spec.property, spec.kind).map(FieldValue::Text),
        PropertyKind::Locale => {
            let code = select(properties, spec.property, spec.kind)?;
            Locale::from_code(&code)
                .map(FieldValue::Locale)
                .ok_or(FieldError::UnknownLocale(code))
        }
        PropertyKind::MultiSelect => {
            let items = typed_body(properties, spec.property, spec.kind)?;
            let names = items
                .as_array()
                .ok_or_else(|| FieldError::Unparsable(items.to_string()))?
                .iter()
                .filter_map(|item| item.get("name").and_then(Value::as_str))
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
            Ok(FieldValue::Set(names))
        }
        PropertyKind::Number => number(properties, spec).map(FieldValue::Number),
        PropertyKind::NonZeroNumber => {
            let value = number(properties, spec)?;
            if value == 0.0 {
                return Err(FieldError::Missing);
            }
            Ok(FieldValue::Number(value))
        }
        PropertyKind::Date => {
            let date = typed_body(properties, spec.property, spec.kind)?;
            let start = date
                .get("start")
                .and_then(Value::as_str)
                .ok_or(FieldError::Missing)?;
            parse_timestamp(start).map(FieldValue::Date)
        }
        PropertyKind::Checkbox => {
            let flag = typed_body(properties, spec.property, spec.kind)?;
            flag.as_bool()
                .map(FieldValue::Flag)
                .ok_or_else(|| FieldError::Unparsable(flag.to_string()))
        }
        PropertyKind::Url => url(properties, spec.property).map(FieldValue::Text),
    }
}

fn number(properties: &Map<String, Value>, spec: &FieldSpec) -> Result<f64, FieldError> {
    let number = typed_body(properties, spec.property, spec.kind)?;
    number
        .as_f64()
        .filter(|value| value.is_finite())
        .ok_or_else(|| FieldError::Unparsable(number.to_string()))
}

/// Look up a property, check its declared type and return its type-keyed body.
/// A JSON `null` body counts as missing.
fn typed_body<'a>(
    properties: &'a Map<String, Value>,
    property: &str,
    kind: PropertyKind,
) -> Result<&'a Value, FieldError> {
    let value = properties.get(property).ok_or(FieldError::Missing)?;
    let property_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(FieldError::Missing)?;
    if !kind.accepts(property_type) {
        return Err(FieldError::WrongType {
            expected: kind.name(),
            found: property_type.to_string(),
        });
    }
    match value.get(property_type) {
        None | Some(Value::Null) => Err(FieldError::Missing),
        Some(body) => Ok(body),
    }
}

fn plain_text(properties: &Map<String, Value>, property: &str) -> Result<String, FieldError> {
    let runs = typed_body(properties, property, PropertyKind::Text)?;
    let text: String = runs
        .as_array()
        .ok_or_else(|| FieldError::Unparsable(runs.to_string()))?
        .iter()
        .filter_map(|run| run.get("plain_text").and_then(Value::as_str))
        .collect();
    let text = text.trim();
    if text.is_empty() {
        return Err(FieldError::Missing);
    }
    Ok(text.to_string())
}

fn select(
    properties: &Map<String, Value>,
    property: &str,
    kind: PropertyKind,
) -> Result<String, FieldError> {
    let option = typed_body(properties, property, kind)?;
    option
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or(FieldError::Missing)
}

fn url(properties: &Map<String, Value>, property: &str) -> Result<String, FieldError> {
    let body = typed_body(properties, property, PropertyKind::Url)?;
    let found = match body {
        Value::String(url) => Some(url.as_str()),
        Value::Array(files) => files.first().and_then(|file| {
            let source = file.get("type").and_then(Value::as_str)?;
            file.get(source)?.get("url")?.as_str()
        }),
        _ => None,
    };
    found
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .ok_or(FieldError::Missing)
}

fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, FieldError> {
    if let Ok(timestamp) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(timestamp);
    }
    Date::parse(raw, DATE_ONLY_FORMAT)
        .map(|date| date.midnight().assume_utc())
        .map_err(|_| FieldError::Unparsable(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;

    use super::*;

    const SCHEMA: &[FieldSpec] = &[
        FieldSpec::required(TITLE_PROPERTY, PropertyKind::Text),
        FieldSpec::required("lang", PropertyKind::Locale),
        FieldSpec::required("priority", PropertyKind::Number),
        FieldSpec::optional("subtitle", PropertyKind::Text),
        FieldSpec::optional("tags", PropertyKind::MultiSelect),
        FieldSpec::optional("cover", PropertyKind::Url),
        FieldSpec::optional("published", PropertyKind::Date),
        FieldSpec::optional("public", PropertyKind::Checkbox),
    ];

    fn record(properties: Value) -> RawRecord {
        RawRecord {
            id: "rec-1".to_string(),
            last_edited_time: Some("2024-03-01T12:30:00.000Z".to_string()),
            properties: properties.as_object().cloned().unwrap_or_default(),
        }
    }

    fn valid_properties() -> Value {
        json!({
            "Name": { "type": "title", "title": [{ "plain_text": "Hello " }, { "plain_text": "World" }] },
            "lang": { "type": "select", "select": { "name": "de" } },
            "priority": { "type": "number", "number": 0.8 }
        })
    }

    #[test]
    fn decodes_required_fields() {
        let mut decoded = decode(&record(valid_properties()), SCHEMA).expect("valid record");

        assert_eq!(decoded.take_text(TITLE_PROPERTY).as_deref(), Some("Hello World"));
        assert_eq!(decoded.locale("lang"), Some(Locale::De));
        assert_eq!(decoded.number("priority"), Some(0.8));
        assert_eq!(decoded.last_edited, datetime!(2024-03-01 12:30:00 UTC));
    }

    #[test]
    fn absent_optional_fields_default_to_empty() {
        let mut decoded = decode(&record(valid_properties()), SCHEMA).expect("valid record");

        assert_eq!(decoded.take_text("subtitle"), None);
        assert!(decoded.take_set("tags").is_empty());
        assert_eq!(decoded.date("published"), None);
        assert_eq!(decoded.flag("public"), None);
    }

    #[test]
    fn optional_fields_are_preserved() {
        let mut properties = valid_properties();
        let map = properties.as_object_mut().unwrap();
        map.insert(
            "subtitle".into(),
            json!({ "type": "rich_text", "rich_text": [{ "plain_text": "sub" }] }),
        );
        map.insert(
            "tags".into(),
            json!({ "type": "multi_select", "multi_select": [{ "name": "b" }, { "name": "a" }] }),
        );
        map.insert(
            "cover".into(),
            json!({ "type": "files", "files": [{ "type": "external", "external": { "url": "https://img/x.png" } }] }),
        );
        map.insert(
            "published".into(),
            json!({ "type": "date", "date": { "start": "2023-12-24" } }),
        );
        map.insert("public".into(), json!({ "type": "checkbox", "checkbox": true }));

        let mut decoded = decode(&record(properties), SCHEMA).expect("valid record");

        assert_eq!(decoded.take_text("subtitle").as_deref(), Some("sub"));
        assert_eq!(
            decoded.take_set("tags").into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(decoded.take_text("cover").as_deref(), Some("https://img/x.png"));
        assert_eq!(decoded.date("published"), Some(datetime!(2023-12-24 0:00 UTC)));
        assert_eq!(decoded.flag("public"), Some(true));
    }

    #[test]
    fn missing_required_field_is_invalid() {
        let mut properties = valid_properties();
        properties.as_object_mut().unwrap().remove("priority");

        let invalid = decode(&record(properties), SCHEMA).expect_err("invalid record");

        assert_eq!(invalid.record_id, "rec-1");
        assert_eq!(invalid.title.as_deref(), Some("Hello World"));
        assert_eq!(invalid.failures, vec![("priority", FieldError::Missing)]);
    }

    #[test]
    fn empty_text_counts_as_missing() {
        let mut properties = valid_properties();
        properties.as_object_mut().unwrap().insert(
            "Name".into(),
            json!({ "type": "title", "title": [{ "plain_text": "  " }] }),
        );

        let invalid = decode(&record(properties), SCHEMA).expect_err("invalid record");
        assert_eq!(invalid.title, None);
        assert_eq!(invalid.failures, vec![("Name", FieldError::Missing)]);
    }

    #[test]
    fn unknown_locale_is_invalid() {
        let mut properties = valid_properties();
        properties.as_object_mut().unwrap().insert(
            "lang".into(),
            json!({ "type": "select", "select": { "name": "fr" } }),
        );

        let invalid = decode(&record(properties), SCHEMA).expect_err("invalid record");
        assert_eq!(
            invalid.failures,
            vec![("lang", FieldError::UnknownLocale("fr".to_string()))]
        );
    }

    #[test]
    fn wrong_property_type_is_reported() {
        let mut properties = valid_properties();
        properties.as_object_mut().unwrap().insert(
            "priority".into(),
            json!({ "type": "rich_text", "rich_text": [{ "plain_text": "high" }] }),
        );

        let invalid = decode(&record(properties), SCHEMA).expect_err("invalid record");
        assert_eq!(
            invalid.failures,
            vec![(
                "priority",
                FieldError::WrongType {
                    expected: "number",
                    found: "rich_text".to_string()
                }
            )]
        );
    }

    #[test]
    fn broken_optional_field_is_ignored() {
        let mut properties = valid_properties();
        properties.as_object_mut().unwrap().insert(
            "published".into(),
            json!({ "type": "date", "date": { "start": "not a date" } }),
        );

        let decoded = decode(&record(properties), SCHEMA).expect("valid record");
        assert_eq!(decoded.date("published"), None);
    }

    #[test]
    fn invalid_last_edited_timestamp_is_invalid() {
        let mut raw = record(valid_properties());
        raw.last_edited_time = Some("yesterday".to_string());

        let invalid = decode(&raw, SCHEMA).expect_err("invalid record");
        assert_eq!(
            invalid.failures,
            vec![(
                LAST_EDITED_FIELD,
                FieldError::Unparsable("yesterday".to_string())
            )]
        );
        assert!(invalid.to_string().contains("last_edited_time (unparsable"));
    }

    #[test]
    fn null_select_counts_as_missing() {
        let mut properties = valid_properties();
        properties
            .as_object_mut()
            .unwrap()
            .insert("lang".into(), json!({ "type": "select", "select": null }));

        let invalid = decode(&record(properties), SCHEMA).expect_err("invalid record");
        assert_eq!(invalid.failures, vec![("lang", FieldError::Missing)]);
    }
}
