//! Raw records and list queries as the tabular service understands them.
//!
//! `Record` is the untyped wire shape (`id` + a string-keyed field map). It
//! never travels past the `schema` boundary; resolvers turn it into DTOs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Fields = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(rename = "createdTime", default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
    #[serde(default)]
    pub fields: Fields,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            created_time: None,
            fields,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// Structured filter. The HTTP backend renders it into a filter formula;
/// the memory backend evaluates it directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals the given text (numbers and booleans compare by their text form).
    Eq(String, String),
    /// Multi-value field (linked ids, lookups) contains the value.
    Contains(String, String),
    /// Case-insensitive substring match on a text field.
    TextSearch(String, String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<String>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn contains(field: &str, value: impl Into<String>) -> Self {
        Filter::Contains(field.to_string(), value.into())
    }

    pub fn search(field: &str, query: impl Into<String>) -> Self {
        Filter::TextSearch(field.to_string(), query.into())
    }

    /// Render as a filter formula.
    pub fn to_formula(&self) -> String {
        match self {
            Filter::Eq(field, value) => format!("{{{}}} = '{}'", field, escape(value)),
            // Delimit both sides so `rec1` does not match inside `rec10`.
            Filter::Contains(field, value) => format!(
                "FIND(',{},', ',' & ARRAYJOIN({{{}}}, ',') & ',')",
                escape(value),
                field
            ),
            Filter::TextSearch(field, query) => format!(
                "SEARCH(LOWER('{}'), LOWER({{{}}}))",
                escape(query),
                field
            ),
            Filter::And(parts) => join_formula("AND", parts),
            Filter::Or(parts) => join_formula("OR", parts),
        }
    }

    /// Evaluate against a field map.
    pub fn matches(&self, fields: &Fields) -> bool {
        match self {
            Filter::Eq(field, value) => fields
                .get(field)
                .map(|v| scalar_text(v).as_deref() == Some(value.as_str()))
                .unwrap_or(false),
            Filter::Contains(field, value) => match fields.get(field) {
                Some(Value::Array(items)) => items
                    .iter()
                    .any(|item| scalar_text(item).as_deref() == Some(value.as_str())),
                Some(other) => scalar_text(other).as_deref() == Some(value.as_str()),
                None => false,
            },
            Filter::TextSearch(field, query) => fields
                .get(field)
                .and_then(scalar_text)
                .map(|text| text.to_lowercase().contains(&query.to_lowercase()))
                .unwrap_or(false),
            Filter::And(parts) => parts.iter().all(|p| p.matches(fields)),
            Filter::Or(parts) => parts.iter().any(|p| p.matches(fields)),
        }
    }
}

fn join_formula(op: &str, parts: &[Filter]) -> String {
    let rendered: Vec<String> = parts.iter().map(Filter::to_formula).collect();
    format!("{}({})", op, rendered.join(", "))
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filter: Option<Filter>,
    pub sort: Vec<Sort>,
    pub max_records: Option<u32>,
}

impl ListQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }

    pub fn sort_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.sort.push(Sort {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, max_records: u32) -> Self {
        self.max_records = Some(max_records);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_formula_rendering() {
        let filter = Filter::And(vec![
            Filter::eq("Status", "Active"),
            Filter::contains("Contact ID", "rec123"),
        ]);
        assert_eq!(
            filter.to_formula(),
            "AND({Status} = 'Active', FIND(',rec123,', ',' & ARRAYJOIN({Contact ID}, ',') & ','))"
        );
    }

    #[test]
    fn test_contains_formula_matches_whole_elements() {
        let formula = Filter::contains("Team ID", "rec1").to_formula();
        assert_eq!(formula, "FIND(',rec1,', ',' & ARRAYJOIN({Team ID}, ',') & ',')");
        // `rec1` would be found inside the undelimited join "rec10,rec2"
        assert!(!",rec10,rec2,".contains(",rec1,"));
    }

    #[test]
    fn test_formula_escapes_quotes() {
        let filter = Filter::eq("Name", "O'Brien");
        assert_eq!(filter.to_formula(), "{Name} = 'O\\'Brien'");
    }

    #[test]
    fn test_filter_matches_arrays_and_scalars() {
        let row = fields(json!({
            "Status": "Active",
            "Contact ID": ["u1", "u2"],
            "Points": 40,
            "Name": "Robotics Club"
        }));
        assert!(Filter::eq("Status", "Active").matches(&row));
        assert!(Filter::eq("Points", "40").matches(&row));
        assert!(Filter::contains("Contact ID", "u2").matches(&row));
        assert!(!Filter::contains("Contact ID", "u3").matches(&row));
        assert!(!Filter::contains("Contact ID", "u").matches(&row));
        assert!(Filter::search("Name", "robot").matches(&row));
        assert!(!Filter::eq("Missing", "x").matches(&row));
        assert!(Filter::Or(vec![Filter::eq("Status", "Inactive"), Filter::eq("Points", "40")]).matches(&row));
    }
}
