//! Record types carried between stages
//!
//! - [`Candidate`]: one posting or company page found by discovery
//! - [`ExtractedRecord`]: the four-key output record

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const COMPANY_WEBSITE: &str = "Company Website";
pub const ROLE: &str = "Role";
pub const POSITION_TITLE: &str = "Position Title";
pub const DEADLINE: &str = "Deadline";

/// Output keys, in column order
pub const RECORD_KEYS: [&str; 4] = [COMPANY_WEBSITE, ROLE, POSITION_TITLE, DEADLINE];

/// A job posting or company page found during discovery
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Candidate {
    /// Posting or page title
    #[serde(default, alias = "position", alias = "job_title")]
    pub title: String,
    #[serde(default, alias = "company_name")]
    pub company: Option<String>,
    /// Link to the posting or company careers page
    #[serde(default, alias = "link", alias = "website")]
    pub url: String,
    #[serde(default)]
    pub location: Option<String>,
    /// Short reason this matches the criteria
    #[serde(default, alias = "description")]
    pub snippet: Option<String>,
}

/// Discovery artifact: `{"candidates": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DiscoveryArtifact {
    pub candidates: Vec<Candidate>,
}

impl DiscoveryArtifact {
    /// Accept the wrapped object form or a bare array of candidates
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::Array(_) => Ok(Self {
                candidates: serde_json::from_value(value)?,
            }),
            other => serde_json::from_value(other),
        }
    }

    pub fn json_schema() -> Value {
        serde_json::to_value(schemars::schema_for!(DiscoveryArtifact)).unwrap_or(Value::Null)
    }
}

/// The validated output record. Every key is always present; absent values are `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ExtractedRecord {
    #[serde(rename = "Company Website")]
    pub company_website: Option<String>,
    #[serde(rename = "Role")]
    pub role: Option<String>,
    #[serde(rename = "Position Title")]
    pub position_title: Option<String>,
    #[serde(rename = "Deadline")]
    pub deadline: Option<String>,
}

impl ExtractedRecord {
    /// JSON Schema with all four keys required and nothing else allowed
    pub fn json_schema() -> Value {
        let mut schema =
            serde_json::to_value(schemars::schema_for!(ExtractedRecord)).unwrap_or(Value::Null);
        if let Some(object) = schema.as_object_mut() {
            object.insert("required".to_string(), serde_json::json!(RECORD_KEYS));
        }
        schema
    }

    pub fn is_empty(&self) -> bool {
        self.company_website.is_none()
            && self.role.is_none()
            && self.position_title.is_none()
            && self.deadline.is_none()
    }

    pub(crate) fn slot_mut(&mut self, key: &str) -> Option<&mut Option<String>> {
        match key {
            COMPANY_WEBSITE => Some(&mut self.company_website),
            ROLE => Some(&mut self.role),
            POSITION_TITLE => Some(&mut self.position_title),
            DEADLINE => Some(&mut self.deadline),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_serializes_all_keys_in_order() {
        let record = ExtractedRecord {
            company_website: Some("a.com".to_string()),
            role: Some("Eng".to_string()),
            position_title: Some("Intern".to_string()),
            deadline: None,
        };

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"Company Website":"a.com","Role":"Eng","Position Title":"Intern","Deadline":null}"#
        );
    }

    #[test]
    fn test_record_rejects_unknown_keys() {
        let result: Result<ExtractedRecord, _> = serde_json::from_value(json!({
            "Company Website": "a.com", "Role": null, "Position Title": null,
            "Deadline": null, "Salary": "100k"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_record_schema_requires_all_keys() {
        let schema = ExtractedRecord::json_schema();
        let validator = jsonschema::validator_for(&schema).unwrap();

        assert!(validator.is_valid(&json!({
            "Company Website": "a.com", "Role": "Eng", "Position Title": "Intern", "Deadline": null
        })));
        assert!(!validator.is_valid(&json!({
            "Company Website": "a.com", "Role": "Eng", "Position Title": "Intern"
        })));
        assert!(!validator.is_valid(&json!({
            "Company Website": "a.com", "Role": "Eng", "Position Title": "Intern",
            "Deadline": null, "Extra": 1
        })));
    }

    #[test]
    fn test_is_empty() {
        assert!(ExtractedRecord::default().is_empty());
        let record = ExtractedRecord {
            deadline: Some("2024-01-01".to_string()),
            ..Default::default()
        };
        assert!(!record.is_empty());
    }

    #[test]
    fn test_discovery_artifact_accepts_bare_array_and_aliases() {
        let artifact = DiscoveryArtifact::from_value(json!([
            {"title": "Quant Intern", "link": "https://jobs.example.com/1"},
            {"position": "Data Analyst", "website": "https://corp.example.com"}
        ]))
        .unwrap();

        assert_eq!(artifact.candidates.len(), 2);
        assert_eq!(artifact.candidates[0].url, "https://jobs.example.com/1");
        assert_eq!(artifact.candidates[1].title, "Data Analyst");
    }

    #[test]
    fn test_discovery_artifact_wrapped_form() {
        let artifact = DiscoveryArtifact::from_value(json!({"candidates": []})).unwrap();
        assert!(artifact.candidates.is_empty());
        assert!(DiscoveryArtifact::from_value(json!({"jobs": []})).is_err());
    }

    #[test]
    fn test_discovery_schema_names_candidates() {
        let schema = DiscoveryArtifact::json_schema();
        assert!(schema["properties"]["candidates"].is_object());
    }
}
