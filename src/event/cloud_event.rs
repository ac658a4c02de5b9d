//! CloudEvents HTTP codec (structured and binary content modes).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Content type of structured-mode CloudEvents.
pub const CLOUDEVENT_MIME_TYPE: &str = "application/cloudevents+json";

const SPEC_VERSIONS: &[&str] = &["1.0", "0.3"];
const REQUIRED_ATTRIBUTES: &[&str] = &["id", "source", "type", "specversion"];
const OPTIONAL_ATTRIBUTES: &[&str] = &["time", "subject", "datacontenttype", "dataschema"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloudEventError {
    #[error("Missing required attributes: {0:?}")]
    MissingRequiredFields(Vec<String>),

    #[error("Invalid required attribute '{name}': {reason}")]
    InvalidRequiredFields { name: String, reason: String },

    #[error("Failed to read CloudEvent JSON: {0}")]
    InvalidJson(String),
}

/// Event payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    Json(Value),
    Binary(Bytes),
}

impl EventData {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            EventData::Json(value) => Some(value),
            EventData::Binary(_) => None,
        }
    }

    /// Serialised payload bytes.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            EventData::Json(value) => Bytes::from(value.to_string()),
            EventData::Binary(bytes) => bytes.clone(),
        }
    }
}

/// A CloudEvent envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudEvent {
    pub id: String,
    pub source: String,
    pub event_type: String,
    pub specversion: String,
    pub time: Option<String>,
    pub subject: Option<String>,
    pub datacontenttype: Option<String>,
    pub dataschema: Option<String>,
    pub data: Option<EventData>,
    /// Extension attributes, keyed by name.
    pub extensions: BTreeMap<String, Value>,
}

impl CloudEvent {
    /// Create a 1.0 event with the required attributes.
    pub fn new(id: impl Into<String>, source: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            event_type: event_type.into(),
            specversion: "1.0".to_string(),
            time: None,
            subject: None,
            datacontenttype: None,
            dataschema: None,
            data: None,
            extensions: BTreeMap::new(),
        }
    }

    pub fn time(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attach a JSON payload.
    pub fn data(mut self, data: Value) -> Self {
        self.datacontenttype = Some("application/json".to_string());
        self.data = Some(EventData::Json(data));
        self
    }

    pub fn extension(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extensions.insert(name.into(), value.into());
        self
    }

    /// The JSON payload, if the event carries one.
    pub fn data_json(&self) -> Option<&Value> {
        self.data.as_ref().and_then(EventData::as_json)
    }

    /// Parse an event from HTTP headers and body.
    ///
    /// Headers must be keyed by lower-cased name. Binary mode is chosen when
    /// a `ce-specversion` header is present; otherwise the body is read as a
    /// structured-mode document.
    pub fn from_http(headers: &HashMap<String, String>, body: &[u8]) -> Result<Self, CloudEventError> {
        if is_binary(headers) {
            Self::from_binary(headers, body)
        } else {
            Self::from_structured(body)
        }
    }

    /// Parse a structured-mode JSON document.
    pub fn from_structured(body: &[u8]) -> Result<Self, CloudEventError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| CloudEventError::InvalidJson(e.to_string()))?;
        let Value::Object(mut object) = value else {
            return Err(CloudEventError::InvalidJson(
                "structured CloudEvent must be a JSON object".to_string(),
            ));
        };

        let missing: Vec<String> = REQUIRED_ATTRIBUTES
            .iter()
            .filter(|name| !object.contains_key(**name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(CloudEventError::MissingRequiredFields(missing));
        }

        let id = take_required(&mut object, "id")?;
        let source = take_required(&mut object, "source")?;
        let event_type = take_required(&mut object, "type")?;
        let specversion = take_required(&mut object, "specversion")?;
        check_specversion(&specversion)?;

        let time = take_optional(&mut object, "time");
        let subject = take_optional(&mut object, "subject");
        let datacontenttype = take_optional(&mut object, "datacontenttype");
        let dataschema = take_optional(&mut object, "dataschema");

        let data = match (object.remove("data"), object.remove("data_base64")) {
            (Some(data), _) => Some(EventData::Json(data)),
            (None, Some(Value::String(encoded))) => Some(EventData::Binary(Bytes::from(
                BASE64.decode(encoded.as_bytes()).map_err(|e| {
                    CloudEventError::InvalidJson(format!("invalid data_base64: {}", e))
                })?,
            ))),
            (None, Some(_)) => {
                return Err(CloudEventError::InvalidJson(
                    "data_base64 must be a string".to_string(),
                ))
            }
            (None, None) => None,
        };

        Ok(Self {
            id,
            source,
            event_type,
            specversion,
            time,
            subject,
            datacontenttype,
            dataschema,
            data,
            extensions: object.into_iter().collect(),
        })
    }

    /// Parse a binary-mode event from `ce-*` headers and a raw body.
    pub fn from_binary(headers: &HashMap<String, String>, body: &[u8]) -> Result<Self, CloudEventError> {
        let attribute = |name: &str| headers.get(&format!("ce-{}", name)).cloned();

        let missing: Vec<String> = REQUIRED_ATTRIBUTES
            .iter()
            .filter(|name| attribute(name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(CloudEventError::MissingRequiredFields(missing));
        }

        let specversion = attribute("specversion").unwrap_or_default();
        check_specversion(&specversion)?;

        let datacontenttype = headers.get("content-type").cloned();
        let data = if body.is_empty() {
            None
        } else if datacontenttype.as_deref().map_or(true, is_json_content_type) {
            Some(
                serde_json::from_slice(body)
                    .map(EventData::Json)
                    .unwrap_or_else(|_| EventData::Binary(Bytes::copy_from_slice(body))),
            )
        } else {
            Some(EventData::Binary(Bytes::copy_from_slice(body)))
        };

        let extensions = headers
            .iter()
            .filter_map(|(name, value)| {
                let attr = name.strip_prefix("ce-")?;
                let known = REQUIRED_ATTRIBUTES.contains(&attr) || OPTIONAL_ATTRIBUTES.contains(&attr);
                (!known).then(|| (attr.to_string(), Value::String(value.clone())))
            })
            .collect();

        Ok(Self {
            id: attribute("id").unwrap_or_default(),
            source: attribute("source").unwrap_or_default(),
            event_type: attribute("type").unwrap_or_default(),
            specversion,
            time: attribute("time"),
            subject: attribute("subject"),
            datacontenttype,
            dataschema: attribute("dataschema"),
            data,
            extensions,
        })
    }

    /// Render as a structured-mode JSON document.
    pub fn to_structured(&self) -> Value {
        let mut object = Map::new();
        for (name, value) in &self.extensions {
            object.insert(name.clone(), value.clone());
        }
        object.insert("id".into(), Value::String(self.id.clone()));
        object.insert("source".into(), Value::String(self.source.clone()));
        object.insert("type".into(), Value::String(self.event_type.clone()));
        object.insert("specversion".into(), Value::String(self.specversion.clone()));
        let optional = [
            ("time", &self.time),
            ("subject", &self.subject),
            ("datacontenttype", &self.datacontenttype),
            ("dataschema", &self.dataschema),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                object.insert(name.into(), Value::String(value.clone()));
            }
        }
        match &self.data {
            Some(EventData::Json(data)) => {
                object.insert("data".into(), data.clone());
            }
            Some(EventData::Binary(bytes)) => {
                object.insert("data_base64".into(), Value::String(BASE64.encode(bytes)));
            }
            None => {}
        }
        Value::Object(object)
    }

    /// Render as binary-mode headers and body.
    pub fn to_binary(&self) -> (Vec<(String, String)>, Bytes) {
        let mut headers = vec![
            ("ce-id".to_string(), self.id.clone()),
            ("ce-source".to_string(), self.source.clone()),
            ("ce-type".to_string(), self.event_type.clone()),
            ("ce-specversion".to_string(), self.specversion.clone()),
        ];
        let optional = [
            ("ce-time", &self.time),
            ("ce-subject", &self.subject),
            ("ce-dataschema", &self.dataschema),
            ("content-type", &self.datacontenttype),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                headers.push((name.to_string(), value.clone()));
            }
        }
        for (name, value) in &self.extensions {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            headers.push((format!("ce-{}", name), value));
        }
        let body = self.data.as_ref().map(EventData::to_bytes).unwrap_or_default();
        (headers, body)
    }
}

/// Whether the headers describe a binary-mode CloudEvent.
pub fn is_binary(headers: &HashMap<String, String>) -> bool {
    headers.contains_key("ce-specversion")
}

fn is_json_content_type(content_type: &str) -> bool {
    content_type.contains("json")
}

fn take_required(object: &mut Map<String, Value>, name: &str) -> Result<String, CloudEventError> {
    match object.remove(name) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(_) => Err(CloudEventError::InvalidRequiredFields {
            name: name.to_string(),
            reason: "must be a non-empty string".to_string(),
        }),
        None => Err(CloudEventError::MissingRequiredFields(vec![name.to_string()])),
    }
}

fn take_optional(object: &mut Map<String, Value>, name: &str) -> Option<String> {
    match object.remove(name) {
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
        None => None,
    }
}

fn check_specversion(specversion: &str) -> Result<(), CloudEventError> {
    if SPEC_VERSIONS.contains(&specversion) {
        Ok(())
    } else {
        Err(CloudEventError::InvalidRequiredFields {
            name: "specversion".to_string(),
            reason: format!("unsupported version {}", specversion),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_structured_event() {
        let body = json!({
            "specversion": "1.0",
            "id": "my-id",
            "source": "from-galaxy-far-far-away",
            "type": "cloud_event.greet.you",
            "time": "2020-08-16T13:58:54.471765",
            "traceparent": "00-abc-def-01",
            "data": {"name": "john"}
        });
        let event = CloudEvent::from_http(
            &headers(&[("content-type", CLOUDEVENT_MIME_TYPE)]),
            body.to_string().as_bytes(),
        )
        .unwrap();

        assert_eq!(event.id, "my-id");
        assert_eq!(event.event_type, "cloud_event.greet.you");
        assert_eq!(event.time.as_deref(), Some("2020-08-16T13:58:54.471765"));
        assert_eq!(event.data_json(), Some(&json!({"name": "john"})));
        assert_eq!(event.extensions.get("traceparent"), Some(&json!("00-abc-def-01")));
    }

    #[test]
    fn test_parse_binary_event() {
        let event = CloudEvent::from_http(
            &headers(&[
                ("ce-specversion", "1.0"),
                ("ce-id", "my-id"),
                ("ce-source", "from-galaxy-far-far-away"),
                ("ce-type", "cloud_event.greet.you"),
                ("ce-subject", "greetings"),
                ("ce-partitionkey", "p1"),
                ("content-type", "application/json"),
            ]),
            br#"{"name": "john"}"#,
        )
        .unwrap();

        assert_eq!(event.source, "from-galaxy-far-far-away");
        assert_eq!(event.subject.as_deref(), Some("greetings"));
        assert_eq!(event.data_json(), Some(&json!({"name": "john"})));
        assert_eq!(event.extensions.get("partitionkey"), Some(&json!("p1")));
    }

    #[test]
    fn test_binary_event_with_opaque_body() {
        let event = CloudEvent::from_binary(
            &headers(&[
                ("ce-specversion", "1.0"),
                ("ce-id", "1"),
                ("ce-source", "s"),
                ("ce-type", "t"),
                ("content-type", "application/octet-stream"),
            ]),
            &[0xde, 0xad],
        )
        .unwrap();
        assert_eq!(event.data, Some(EventData::Binary(Bytes::from_static(&[0xde, 0xad]))));
    }

    #[test]
    fn test_missing_fields_are_reported() {
        let body = json!({"specversion": "1.0", "id": "x"});
        let err = CloudEvent::from_structured(body.to_string().as_bytes()).unwrap_err();
        assert_eq!(
            err,
            CloudEventError::MissingRequiredFields(vec!["source".into(), "type".into()])
        );
    }

    #[test]
    fn test_invalid_specversion_is_rejected() {
        let body = json!({"specversion": "9.9", "id": "x", "source": "s", "type": "t"});
        assert!(matches!(
            CloudEvent::from_structured(body.to_string().as_bytes()),
            Err(CloudEventError::InvalidRequiredFields { name, .. }) if name == "specversion"
        ));
    }

    #[test]
    fn test_legacy_envelope_is_not_a_cloud_event() {
        let body = json!({"context": {"eventId": "1"}, "data": {}});
        assert!(matches!(
            CloudEvent::from_http(&HashMap::new(), body.to_string().as_bytes()),
            Err(CloudEventError::MissingRequiredFields(_))
        ));
    }

    #[test]
    fn test_structured_output_reparses() {
        let event = CloudEvent::new("1", "//source", "type")
            .time("2020-01-01T00:00:00Z")
            .subject("objects/a")
            .data(json!({"k": "v"}));
        let reparsed = CloudEvent::from_structured(event.to_structured().to_string().as_bytes()).unwrap();
        assert_eq!(reparsed, event);
    }

    #[test]
    fn test_binary_output_headers() {
        let event = CloudEvent::new("1", "//source", "type").data(json!({"k": "v"}));
        let (pairs, body) = event.to_binary();
        let parsed = CloudEvent::from_binary(&pairs.into_iter().collect(), &body).unwrap();
        assert_eq!(parsed, event);
    }
}
