// Agent registration metadata.
// Typed view of the CIP-25 style metadata minted with each agent token, plus validation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::Result;

/// Top-level fields every registration must carry.
const REQUIRED_FIELDS: [&str; 9] = [
    "name",
    "description",
    "api_url",
    "version",
    "payment_address",
    "author",
    "requests_per_hour",
    "tags",
    "legal",
];

static NULL: Value = Value::Null;

const REQUIRED_AUTHOR_FIELDS: [&str; 3] = ["name", "contact", "organization"];
const REQUIRED_LEGAL_FIELDS: [&str; 2] = ["privacy policy", "terms"];

/// Why a metadata document was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataIssue {
    #[error("no on-chain metadata")]
    Missing,

    #[error("metadata is not an object")]
    NotAnObject,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("missing author field `{0}`")]
    MissingAuthorField(&'static str),

    #[error("missing legal field `{0}`")]
    MissingLegalField(&'static str),

    #[error("field `{field}` must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

/// Text that may have been split into chunks to fit the 64 byte metadata
/// string limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SplitText {
    Whole(String),
    Parts(Vec<String>),
}

impl SplitText {
    /// The text with any parts concatenated.
    pub fn joined(&self) -> String {
        match self {
            SplitText::Whole(s) => s.clone(),
            SplitText::Parts(parts) => parts.concat(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub contact: String,
    pub organization: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Legal {
    #[serde(rename = "privacy policy")]
    pub privacy_policy: String,
    pub terms: String,
    /// Free-form extra terms; non-string values are ignored.
    #[serde(
        default,
        deserialize_with = "text_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub other: Option<String>,
}

fn text_or_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_str().map(str::to_string)))
}

/// Registration metadata of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub name: String,
    pub description: SplitText,
    pub api_url: String,
    pub example_output: String,
    pub version: String,
    pub author: Author,
    pub requests_per_hour: u64,
    pub tags: Vec<String>,
    pub legal: Legal,
    pub image: String,
    pub payment_address: SplitText,
}

impl AgentMetadata {
    /// Validate and convert raw on-chain metadata.
    pub fn from_value(value: &Value) -> Result<Self> {
        validate_metadata(value)?;
        Ok(Self::deserialize(value)?)
    }

    pub fn description_text(&self) -> String {
        self.description.joined()
    }

    /// Payment address reassembled from its parts.
    pub fn payment_address_text(&self) -> String {
        self.payment_address.joined()
    }
}

fn require_object<'a>(
    value: &'a Value,
    field: &'static str,
) -> std::result::Result<&'a Map<String, Value>, MetadataIssue> {
    value.as_object().ok_or(MetadataIssue::WrongType {
        field,
        expected: "an object",
    })
}

fn is_string_list(value: &Value) -> bool {
    value
        .as_array()
        .is_some_and(|items| items.iter().all(Value::is_string))
}

fn expect(
    ok: bool,
    field: &'static str,
    expected: &'static str,
) -> std::result::Result<(), MetadataIssue> {
    if ok {
        Ok(())
    } else {
        Err(MetadataIssue::WrongType { field, expected })
    }
}

/// Check a metadata document for the fields and types a registration needs.
///
/// `example_output` and `image` are not in the required list but must be
/// strings, so they are required in practice.
pub fn validate_metadata(metadata: &Value) -> std::result::Result<(), MetadataIssue> {
    if metadata.is_null() {
        return Err(MetadataIssue::Missing);
    }
    let fields = metadata.as_object().ok_or(MetadataIssue::NotAnObject)?;

    if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !fields.contains_key(**f)) {
        return Err(MetadataIssue::MissingField(*missing));
    }

    let author = require_object(&fields["author"], "author")?;
    if let Some(missing) = REQUIRED_AUTHOR_FIELDS
        .iter()
        .find(|f| !author.contains_key(**f))
    {
        return Err(MetadataIssue::MissingAuthorField(*missing));
    }

    let legal = require_object(&fields["legal"], "legal")?;
    if let Some(missing) = REQUIRED_LEGAL_FIELDS
        .iter()
        .find(|f| !legal.contains_key(**f))
    {
        return Err(MetadataIssue::MissingLegalField(*missing));
    }

    let field = |name: &str| fields.get(name).unwrap_or(&NULL);

    expect(field("name").is_string(), "name", "a string")?;
    expect(
        field("description").is_string() || is_string_list(field("description")),
        "description",
        "a string or a list of strings",
    )?;
    expect(field("api_url").is_string(), "api_url", "a string")?;
    expect(
        field("example_output").is_string(),
        "example_output",
        "a string",
    )?;
    expect(field("version").is_string(), "version", "a string")?;
    expect(
        field("requests_per_hour").is_u64(),
        "requests_per_hour",
        "a non-negative integer",
    )?;
    expect(is_string_list(field("tags")), "tags", "a list of strings")?;
    expect(field("image").is_string(), "image", "a string")?;
    expect(
        field("payment_address").is_string() || is_string_list(field("payment_address")),
        "payment_address",
        "a string or a list of strings",
    )?;

    expect(
        REQUIRED_AUTHOR_FIELDS.iter().all(|f| author[*f].is_string()),
        "author",
        "an object of strings",
    )?;
    expect(
        REQUIRED_LEGAL_FIELDS.iter().all(|f| legal[*f].is_string()),
        "legal",
        "an object of strings",
    )?;

    Ok(())
}

/// Boolean form of [`validate_metadata`].
pub fn is_valid_metadata(metadata: &Value) -> bool {
    validate_metadata(metadata).is_ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::IndexerError;

    fn sample() -> Value {
        json!({
            "name": "Summarizer",
            "description": ["Summarizes long documents into ", "short bullet points."],
            "api_url": "https://agents.example.com/summarize",
            "example_output": "- point one",
            "version": "1.0.0",
            "author": {
                "name": "Ada",
                "contact": "ada@example.com",
                "organization": "Example Labs"
            },
            "requests_per_hour": 100,
            "tags": ["nlp", "summary"],
            "legal": {
                "privacy policy": "https://example.com/privacy",
                "terms": "https://example.com/terms"
            },
            "image": "ipfs://Qm123",
            "payment_address": ["addr_test1qpart", "twoofaddress"]
        })
    }

    #[test]
    fn test_valid_metadata() {
        assert!(is_valid_metadata(&sample()));

        let metadata = AgentMetadata::from_value(&sample()).unwrap();
        assert_eq!(
            metadata.description_text(),
            "Summarizes long documents into short bullet points."
        );
        assert_eq!(metadata.payment_address_text(), "addr_test1qparttwoofaddress");
        assert_eq!(metadata.legal.other, None);
        assert_eq!(metadata.author.organization, "Example Labs");
    }

    #[test]
    fn test_plain_string_fields() {
        let mut value = sample();
        value["description"] = json!("One line.");
        value["payment_address"] = json!("addr_test1whole");
        value["legal"]["other"] = json!("Apache-2.0");

        let metadata = AgentMetadata::from_value(&value).unwrap();
        assert_eq!(metadata.description_text(), "One line.");
        assert_eq!(metadata.payment_address_text(), "addr_test1whole");
        assert_eq!(metadata.legal.other.as_deref(), Some("Apache-2.0"));
    }

    #[test]
    fn test_missing_and_non_object() {
        assert_eq!(validate_metadata(&Value::Null), Err(MetadataIssue::Missing));
        assert_eq!(
            validate_metadata(&json!("agent")),
            Err(MetadataIssue::NotAnObject)
        );
    }

    #[test]
    fn test_missing_fields() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("tags");
        assert_eq!(
            validate_metadata(&value),
            Err(MetadataIssue::MissingField("tags"))
        );

        let mut value = sample();
        value["author"].as_object_mut().unwrap().remove("contact");
        assert_eq!(
            validate_metadata(&value),
            Err(MetadataIssue::MissingAuthorField("contact"))
        );

        let mut value = sample();
        value["legal"].as_object_mut().unwrap().remove("privacy policy");
        assert_eq!(
            validate_metadata(&value),
            Err(MetadataIssue::MissingLegalField("privacy policy"))
        );
    }

    #[test]
    fn test_wrong_types() {
        let mut value = sample();
        value["requests_per_hour"] = json!("100");
        assert!(matches!(
            validate_metadata(&value),
            Err(MetadataIssue::WrongType {
                field: "requests_per_hour",
                ..
            })
        ));

        let mut value = sample();
        value["description"] = json!(["ok", 7]);
        assert!(matches!(
            validate_metadata(&value),
            Err(MetadataIssue::WrongType {
                field: "description",
                ..
            })
        ));

        // Not in the required list, but still must be a string.
        let mut value = sample();
        value.as_object_mut().unwrap().remove("image");
        assert!(matches!(
            validate_metadata(&value),
            Err(MetadataIssue::WrongType { field: "image", .. })
        ));

        let mut value = sample();
        value["author"] = json!("Ada");
        assert!(matches!(
            validate_metadata(&value),
            Err(MetadataIssue::WrongType { field: "author", .. })
        ));
    }

    #[test]
    fn test_extra_author_and_legal_entries_allowed() {
        let mut value = sample();
        value["author"]["verified"] = json!(true);
        value["legal"]["other"] = json!(42);
        value["legal"]["jurisdiction"] = Value::Null;

        assert!(is_valid_metadata(&value));
        let metadata = AgentMetadata::from_value(&value).unwrap();
        assert_eq!(metadata.legal.other, None);

        value["legal"]["other"] = Value::Null;
        assert!(is_valid_metadata(&value));

        // Required entries still have to be strings.
        value["author"]["contact"] = json!(12345);
        assert!(matches!(
            validate_metadata(&value),
            Err(MetadataIssue::WrongType { field: "author", .. })
        ));
    }

    #[test]
    fn test_from_value_wraps_issue() {
        let result = AgentMetadata::from_value(&json!({}));
        assert!(matches!(
            result,
            Err(IndexerError::Metadata(MetadataIssue::MissingField("name")))
        ));
    }
}
