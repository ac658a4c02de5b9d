//! Legacy background-event envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resource an event refers to: a bare name, or a detailed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Resource {
    Name(String),
    Detailed(ResourceDetails),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
}

impl Resource {
    /// The resource name, whichever form it takes.
    pub fn name(&self) -> &str {
        match self {
            Resource::Name(name) => name,
            Resource::Detailed(details) => &details.name,
        }
    }

    pub fn service(&self) -> Option<&str> {
        match self {
            Resource::Name(_) => None,
            Resource::Detailed(details) => details.service.as_deref(),
        }
    }
}

/// Metadata of a legacy event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
}

/// A legacy `(data, context)` event as delivered to EVENT functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundEvent {
    pub data: Value,
    pub context: EventContext,
}

impl BackgroundEvent {
    pub fn new(data: Value, context: EventContext) -> Self {
        Self { data, context }
    }

    /// Read a legacy envelope.
    ///
    /// Accepts both the nested `{"context": {...}, "data": ...}` form and the
    /// flat form carrying `eventId`, `timestamp`, `eventType` and `resource`
    /// at the top level. A missing `data` reads as an empty string.
    pub fn from_json(value: Value) -> Result<Self, String> {
        let Value::Object(mut object) = value else {
            return Err("background event must be a JSON object".to_string());
        };
        let data = object
            .remove("data")
            .unwrap_or_else(|| Value::String(String::new()));
        let context = match object.remove("context") {
            Some(context) => serde_json::from_value(context).map_err(|e| e.to_string())?,
            None => serde_json::from_value(Value::Object(object)).map_err(|e| e.to_string())?,
        };
        Ok(Self { data, context })
    }

    /// Render as the nested legacy envelope.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "context": self.context,
            "data": self.data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_envelope() {
        let event = BackgroundEvent::from_json(json!({
            "context": {
                "eventId": "e1",
                "timestamp": "2020-09-29T11:32:00.000Z",
                "eventType": "google.pubsub.topic.publish",
                "resource": {
                    "service": "pubsub.googleapis.com",
                    "name": "projects/p/topics/t",
                    "type": "type.googleapis.com/google.pubsub.v1.PubsubMessage"
                }
            },
            "data": {"message": "hi"}
        }))
        .unwrap();

        assert_eq!(event.context.event_id.as_deref(), Some("e1"));
        assert_eq!(event.data, json!({"message": "hi"}));
        let resource = event.context.resource.unwrap();
        assert_eq!(resource.service(), Some("pubsub.googleapis.com"));
        assert_eq!(resource.name(), "projects/p/topics/t");
    }

    #[test]
    fn test_flat_envelope() {
        let event = BackgroundEvent::from_json(json!({
            "eventId": "e1",
            "eventType": "providers/cloud.storage/eventTypes/object.change",
            "resource": "projects/_/buckets/b/objects/o",
            "data": {"message": "hi"}
        }))
        .unwrap();

        assert_eq!(event.context.event_id.as_deref(), Some("e1"));
        assert_eq!(
            event.context.resource,
            Some(Resource::Name("projects/_/buckets/b/objects/o".into()))
        );
    }

    #[test]
    fn test_missing_data_defaults_to_empty_string() {
        let event = BackgroundEvent::from_json(json!({"context": {"eventId": "e1"}})).unwrap();
        assert_eq!(event.data, json!(""));
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(BackgroundEvent::from_json(json!([1, 2])).is_err());
        assert!(BackgroundEvent::from_json(json!({"context": "nope"})).is_err());
    }
}
