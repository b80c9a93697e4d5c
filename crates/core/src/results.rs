//! Extracted records produced by the pipeline.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One completion answer for one template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Raw response text.
    pub text: String,
    /// JSON object found in the response, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<serde_json::Value>,
}

impl Answer {
    pub fn new(text: impl Into<String>, fields: Option<serde_json::Value>) -> Self {
        Self { text: text.into(), fields }
    }
}

/// All answers for one URL of one project.
///
/// `answers[i]` is the answer to template `i`; `None` marks a failed completion
/// or a page that could not be fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub project: String,
    pub url: String,
    pub fetched: bool,
    pub answers: Vec<Option<Answer>>,
}

/// Ordered rows of extracted records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultTable {
    rows: Vec<UrlRecord>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<UrlRecord>) -> Self {
        Self { rows }
    }

    pub fn push(&mut self, row: UrlRecord) {
        self.rows.push(row);
    }

    /// Append every row of `other`, keeping order.
    pub fn merge(&mut self, other: ResultTable) {
        self.rows.extend(other.rows);
    }

    pub fn rows(&self) -> &[UrlRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of answered (non-`None`) cells across all rows.
    pub fn answered(&self) -> usize {
        self.rows.iter().flat_map(|r| r.answers.iter()).filter(|a| a.is_some()).count()
    }
}

/// Every field value reported for one URL, merged across templates.
///
/// Values are cleaned, deduplicated and sorted per field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidatedRow {
    pub project: String,
    pub url: String,
    pub fields: BTreeMap<String, BTreeSet<String>>,
}

impl ConsolidatedRow {
    /// Values of `field` joined with `", "`; empty when the field was never reported.
    pub fn joined(&self, field: &str) -> String {
        self.fields
            .get(field)
            .map(|values| values.iter().map(String::as_str).collect::<Vec<_>>().join(", "))
            .unwrap_or_default()
    }
}

impl ResultTable {
    /// Merge the answer fields of every row into one row per (project, URL).
    ///
    /// Rows keep first-seen order. Pages without a single usable value still
    /// get a row with no fields.
    pub fn consolidate(&self) -> Vec<ConsolidatedRow> {
        let mut merged: Vec<ConsolidatedRow> = Vec::new();
        for record in &self.rows {
            let index = match merged.iter().position(|r| r.project == record.project && r.url == record.url) {
                Some(index) => index,
                None => {
                    merged.push(ConsolidatedRow {
                        project: record.project.clone(),
                        url: record.url.clone(),
                        ..Default::default()
                    });
                    merged.len() - 1
                }
            };
            let row = &mut merged[index];

            let objects = record.answers.iter().flatten().filter_map(|a| a.fields.as_ref()?.as_object());
            for object in objects {
                for (key, value) in object {
                    let values = clean_values(value);
                    if !values.is_empty() {
                        row.fields.entry(key.clone()).or_default().extend(values);
                    }
                }
            }
        }
        merged
    }

    /// Sorted union of the field names of `rows`.
    pub fn field_names(rows: &[ConsolidatedRow]) -> Vec<String> {
        let names: BTreeSet<&String> = rows.iter().flat_map(|r| r.fields.keys()).collect();
        names.into_iter().cloned().collect()
    }
}

/// Flatten one reported value into clean strings.
///
/// Strings are split on commas, array elements are taken one by one, nested
/// objects are kept as JSON text. Blank, `nan` and `none` entries are dropped.
pub fn clean_values(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    match value {
        Value::Null => {}
        Value::String(s) => out.extend(s.split(',').map(str::to_string)),
        Value::Array(items) => out.extend(items.iter().filter_map(|item| match item {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })),
        Value::Bool(_) | Value::Number(_) | Value::Object(_) => out.push(value.to_string()),
    }

    out.into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("nan") && !v.eq_ignore_ascii_case("none"))
        .collect()
}

impl FromIterator<UrlRecord> for ResultTable {
    fn from_iter<I: IntoIterator<Item = UrlRecord>>(iter: I) -> Self {
        Self { rows: iter.into_iter().collect() }
    }
}

impl IntoIterator for ResultTable {
    type Item = UrlRecord;
    type IntoIter = std::vec::IntoIter<UrlRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(project: &str, url: &str, answers: Vec<Option<Answer>>) -> UrlRecord {
        UrlRecord { project: project.into(), url: url.into(), fetched: true, answers }
    }

    #[test]
    fn test_merge_keeps_order() {
        let mut table = ResultTable::from_rows(vec![row("A", "https://a.example/1", vec![])]);
        table.merge(ResultTable::from_rows(vec![
            row("B", "https://b.example/1", vec![]),
            row("B", "https://b.example/2", vec![]),
        ]));
        let urls: Vec<&str> = table.rows().iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, ["https://a.example/1", "https://b.example/1", "https://b.example/2"]);
    }

    #[test]
    fn test_answered_counts_some() {
        let table = ResultTable::from_rows(vec![row(
            "A",
            "https://a.example/",
            vec![Some(Answer::new("yes", None)), None, Some(Answer::new("no", None))],
        )]);
        assert_eq!(table.answered(), 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_serializes_as_array() {
        let answer = Answer::new("{\"mw\": 5}", Some(serde_json::json!({"mw": 5})));
        let table = ResultTable::from_rows(vec![row("A", "https://a.example/", vec![Some(answer), None])]);
        let json = serde_json::to_value(&table).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["answers"][1], serde_json::Value::Null);
        assert_eq!(json[0]["answers"][0]["fields"]["mw"], 5);

        let back: ResultTable = serde_json::from_value(json).unwrap();
        assert_eq!(back, table);
    }

    fn answer(fields: Value) -> Option<Answer> {
        Some(Answer::new(fields.to_string(), Some(fields)))
    }

    #[test]
    fn test_clean_values() {
        assert_eq!(clean_values(&serde_json::json!(" Acme Corp, Beta LLC ,, none ")), ["Acme Corp", "Beta LLC"]);
        assert_eq!(clean_values(&serde_json::json!(["NaN", "x", null, 3, ""])), ["x", "3"]);
        assert_eq!(clean_values(&serde_json::json!(120.5)), ["120.5"]);
        assert_eq!(clean_values(&serde_json::json!(true)), ["true"]);
        assert_eq!(clean_values(&serde_json::json!({"a": 1})), [r#"{"a":1}"#]);
        assert!(clean_values(&Value::Null).is_empty());
        assert!(clean_values(&serde_json::json!("None")).is_empty());
    }

    #[test]
    fn test_consolidate_merges_per_url() {
        let table = ResultTable::from_rows(vec![
            row("A", "https://a.example/1", vec![
                answer(serde_json::json!({"owner": "Beta, Acme", "mw": 120})),
                None,
                answer(serde_json::json!({"owner": ["Acme"], "status": "nan"})),
                Some(Answer::new("no json here", None)),
            ]),
            row("B", "https://b.example/1", vec![None]),
            row("A", "https://a.example/1", vec![answer(serde_json::json!({"mw": "120", "county": "Kern"}))]),
        ]);

        let rows = table.consolidate();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].project.as_str(), rows[0].url.as_str()), ("A", "https://a.example/1"));
        assert_eq!(rows[0].joined("owner"), "Acme, Beta");
        assert_eq!(rows[0].joined("mw"), "120");
        assert_eq!(rows[0].joined("county"), "Kern");
        assert!(!rows[0].fields.contains_key("status"));
        assert!(rows[1].fields.is_empty());
        assert_eq!(rows[1].joined("owner"), "");

        assert_eq!(ResultTable::field_names(&rows), ["county", "mw", "owner"]);
    }
}
