//! Domain DTOs for the slyd API.
//!
//! # Design
//! These types mirror the backend's JSON but are defined independently from
//! the mock-server crate; integration tests catch schema drift. Every type
//! keeps unknown keys in a flattened `extra` map so a load/save cycle never
//! drops data the client does not model.
//!
//! Collections are always held in list form here. Conversion to the map form
//! used on the wire happens in `SlydClient`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// An item type: a named schema of extractable fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub fields: Vec<ItemField>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One field of an `Item`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub vary: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ItemField {
    pub fn new(name: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: field_type.to_string(),
            required: false,
            vary: false,
            extra: Map::new(),
        }
    }
}

/// A post-processing extractor, either a regular expression or a type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Extractor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regular_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_extractor: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A spider spec. `name` is not part of the stored document; it is taken
/// from the URL the spider was loaded from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Spider {
    #[serde(default, skip_serializing)]
    pub name: String,
    #[serde(default)]
    pub start_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links_to_follow: Option<String>,
    #[serde(default)]
    pub follow_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respect_nofollow: Option<bool>,
    #[serde(default)]
    pub init_requests: Vec<Value>,
    #[serde(default)]
    pub templates: Vec<Template>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An annotated sample page belonging to a spider.
///
/// `original_body` is the unannotated page snapshot. It is only sent to the
/// backend on the first save of a template created client-side, which is
/// what `is_new` tracks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Template {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrapes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_body: Option<String>,
    #[serde(default, skip_serializing)]
    pub original_body: Option<String>,
    #[serde(skip)]
    pub is_new: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Template {
    /// A template created from a freshly fetched page, not yet persisted.
    pub fn new_from_page(name: &str, url: &str, original_body: &str) -> Self {
        Self {
            name: name.to_string(),
            url: Some(url.to_string()),
            annotated_body: Some(original_body.to_string()),
            original_body: Some(original_body.to_string()),
            is_new: true,
            ..Self::default()
        }
    }
}

/// The result of fetching a page through a spider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FetchedDocument {
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub fp: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A `null` string reads as empty.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A short random name for templates the backend stores unnamed.
pub(crate) fn short_guid() -> String {
    let mut guid = Uuid::new_v4().simple().to_string();
    guid.truncate(12);
    guid
}
