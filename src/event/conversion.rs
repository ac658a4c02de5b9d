//! Conversion between legacy background events and CloudEvents.
//!
//! Only the Pub/Sub and Cloud Storage event families are mapped. Unknown
//! legacy types are passed through with their type unchanged.

use crate::event::background::{BackgroundEvent, EventContext, Resource, ResourceDetails};
use crate::event::cloud_event::{is_binary, CloudEvent, EventData};
use chrono::Utc;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

pub const PUBSUB_SERVICE: &str = "pubsub.googleapis.com";
pub const STORAGE_SERVICE: &str = "storage.googleapis.com";
pub const PUBSUB_EVENT_TYPE: &str = "google.pubsub.topic.publish";
pub const PUBSUB_MESSAGE_TYPE: &str = "type.googleapis.com/google.pubsub.v1.PubsubMessage";

const PUBSUB_CE_TYPE: &str = "google.cloud.pubsub.topic.v1.messagePublished";

/// Legacy event type to CloudEvent type.
const BACKGROUND_TO_CE_TYPE: &[(&str, &str)] = &[
    (PUBSUB_EVENT_TYPE, PUBSUB_CE_TYPE),
    ("providers/cloud.pubsub/eventTypes/topic.publish", PUBSUB_CE_TYPE),
    ("google.storage.object.finalize", "google.cloud.storage.object.v1.finalized"),
    ("google.storage.object.delete", "google.cloud.storage.object.v1.deleted"),
    ("google.storage.object.archive", "google.cloud.storage.object.v1.archived"),
    ("google.storage.object.metadataUpdate", "google.cloud.storage.object.v1.metadataUpdated"),
    ("providers/cloud.storage/eventTypes/object.change", "google.cloud.storage.object.v1.finalized"),
];

/// CloudEvent type to canonical legacy type.
const CE_TO_BACKGROUND_TYPE: &[(&str, &str)] = &[
    (PUBSUB_CE_TYPE, PUBSUB_EVENT_TYPE),
    ("google.cloud.storage.object.v1.finalized", "google.storage.object.finalize"),
    ("google.cloud.storage.object.v1.deleted", "google.storage.object.delete"),
    ("google.cloud.storage.object.v1.archived", "google.storage.object.archive"),
    ("google.cloud.storage.object.v1.metadataUpdated", "google.storage.object.metadataUpdate"),
];

/// Legacy event-type prefix to owning service.
const SERVICE_PREFIXES: &[(&str, &str)] = &[
    ("providers/cloud.pubsub/", PUBSUB_SERVICE),
    ("providers/cloud.storage/", STORAGE_SERVICE),
    ("google.pubsub", PUBSUB_SERVICE),
    ("google.storage", STORAGE_SERVICE),
];

static STORAGE_RESOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(projects/[^/]+/buckets/[^/]+)/(objects/.+)$").expect("valid storage resource regex")
});

static CE_SOURCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^//([^/]+)/(.+)$").expect("valid source regex"));

static PUBSUB_TOPIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"projects/[^/?]+/topics/[^/?]+").expect("valid topic regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("Missing event field: {0}")]
    MissingField(&'static str),

    #[error("Unable to find background event equivalent type for: {0}")]
    UnknownEventType(String),

    #[error("Unexpected CloudEvent source: {0}")]
    UnexpectedSource(String),

    #[error("Invalid resource: {0}")]
    InvalidResource(String),
}

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

fn service_for(event_type: &str) -> Option<&'static str> {
    SERVICE_PREFIXES
        .iter()
        .find(|(prefix, _)| event_type.starts_with(prefix))
        .map(|(_, service)| *service)
}

/// Whether a request carries a binary CloudEvent of a type with a legacy
/// equivalent. Headers must be keyed by lower-cased name.
pub fn is_convertable_cloud_event(headers: &HashMap<String, String>) -> bool {
    is_binary(headers)
        && headers.contains_key("ce-source")
        && headers
            .get("ce-type")
            .is_some_and(|t| lookup(CE_TO_BACKGROUND_TYPE, t).is_some())
}

/// Whether a JSON body is a raw Pub/Sub push delivery rather than a legacy
/// envelope.
pub fn is_raw_pubsub_payload(body: &Value) -> bool {
    let Some(object) = body.as_object() else {
        return false;
    };
    if object.contains_key("context") || !object.contains_key("subscription") {
        return false;
    }
    object
        .get("message")
        .and_then(Value::as_object)
        .is_some_and(|m| m.contains_key("data") && m.contains_key("messageId"))
}

/// The `projects/P/topics/T` segment of a request path, or empty.
pub fn parse_pubsub_topic(path: &str) -> String {
    PUBSUB_TOPIC
        .find(path)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Rewrite a raw Pub/Sub push body into a legacy envelope; other bodies are
/// returned unchanged.
pub fn marshal_background_event_data(body: Value, path: &str) -> Value {
    if !is_raw_pubsub_payload(&body) {
        return body;
    }
    let message = body.get("message").cloned().unwrap_or(Value::Null);
    let timestamp = message
        .get("publishTime")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string());

    json!({
        "context": {
            "eventId": message.get("messageId").cloned().unwrap_or(Value::Null),
            "timestamp": timestamp,
            "eventType": PUBSUB_EVENT_TYPE,
            "resource": {
                "service": PUBSUB_SERVICE,
                "type": PUBSUB_MESSAGE_TYPE,
                "name": parse_pubsub_topic(path),
            },
        },
        "data": {
            "@type": PUBSUB_MESSAGE_TYPE,
            "data": message.get("data").cloned().unwrap_or(Value::Null),
            "attributes": message.get("attributes").cloned().unwrap_or_else(|| json!({})),
        },
    })
}

/// Split a legacy context into `(service, resource, subject)`.
fn split_resource(context: &EventContext) -> Result<(Option<String>, String, Option<String>), ConversionError> {
    let resource = context
        .resource
        .as_ref()
        .ok_or(ConversionError::MissingField("resource"))?;
    let service = resource
        .service()
        .map(str::to_string)
        .or_else(|| {
            context
                .event_type
                .as_deref()
                .and_then(service_for)
                .map(str::to_string)
        });
    let name = resource.name().to_string();

    if service.as_deref() != Some(STORAGE_SERVICE) {
        return Ok((service, name, None));
    }
    let captures = STORAGE_RESOURCE
        .captures(&name)
        .ok_or_else(|| ConversionError::InvalidResource(name.clone()))?;
    Ok((service, captures[1].to_string(), Some(captures[2].to_string())))
}

/// Convert a legacy event into a CloudEvent.
pub fn background_event_to_cloud_event(event: BackgroundEvent) -> Result<CloudEvent, ConversionError> {
    let BackgroundEvent { data, context } = event;
    let event_id = context
        .event_id
        .clone()
        .ok_or(ConversionError::MissingField("eventId"))?;
    let event_type = context
        .event_type
        .clone()
        .ok_or(ConversionError::MissingField("eventType"))?;
    let ce_type = lookup(BACKGROUND_TO_CE_TYPE, &event_type)
        .map(str::to_string)
        .unwrap_or_else(|| event_type.clone());

    let (service, resource, subject) = split_resource(&context)?;
    let source = match &service {
        Some(service) => format!("//{}/{}", service, resource),
        None => resource,
    };

    let data = if service.as_deref() == Some(PUBSUB_SERVICE) {
        let mut message = data;
        if let Value::Object(fields) = &mut message {
            fields
                .entry("messageId")
                .or_insert_with(|| Value::String(event_id.clone()));
            if let Some(timestamp) = &context.timestamp {
                fields
                    .entry("publishTime")
                    .or_insert_with(|| Value::String(timestamp.clone()));
            }
        }
        json!({ "message": message })
    } else {
        data
    };

    let mut cloud_event = CloudEvent::new(event_id, source, ce_type).data(data);
    cloud_event.time = context.timestamp;
    cloud_event.subject = subject;
    Ok(cloud_event)
}

fn split_ce_source(source: &str) -> Result<(String, String), ConversionError> {
    let captures = CE_SOURCE
        .captures(source)
        .ok_or_else(|| ConversionError::UnexpectedSource(source.to_string()))?;
    Ok((captures[1].to_string(), captures[2].to_string()))
}

/// Convert a CloudEvent of a mapped type back into a legacy event.
pub fn cloud_event_to_background_event(event: CloudEvent) -> Result<BackgroundEvent, ConversionError> {
    let event_type = lookup(CE_TO_BACKGROUND_TYPE, &event.event_type)
        .ok_or_else(|| ConversionError::UnknownEventType(event.event_type.clone()))?;
    let (service, name) = split_ce_source(&event.source)?;

    let mut data = match event.data {
        Some(EventData::Json(value)) => value,
        Some(EventData::Binary(bytes)) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        None => Value::Null,
    };

    let resource = match service.as_str() {
        PUBSUB_SERVICE => {
            if let Some(message) = data.get_mut("message").map(Value::take) {
                data = message;
            }
            if let Value::Object(fields) = &mut data {
                fields.remove("messageId");
                fields.remove("publishTime");
            }
            Resource::Detailed(ResourceDetails {
                service: Some(service.clone()),
                name,
                resource_type: Some(PUBSUB_MESSAGE_TYPE.to_string()),
            })
        }
        STORAGE_SERVICE => {
            let subject = event
                .subject
                .as_deref()
                .ok_or(ConversionError::MissingField("subject"))?;
            let kind = data
                .get("kind")
                .and_then(Value::as_str)
                .ok_or(ConversionError::MissingField("data.kind"))?;
            Resource::Detailed(ResourceDetails {
                service: Some(service.clone()),
                name: format!("{}/{}", name, subject),
                resource_type: Some(kind.to_string()),
            })
        }
        _ => match &event.subject {
            Some(subject) => Resource::Name(format!("{}/{}", name, subject)),
            None => Resource::Name(name),
        },
    };

    Ok(BackgroundEvent {
        data,
        context: EventContext {
            event_id: Some(event.id),
            timestamp: event.time,
            event_type: Some(event_type.to_string()),
            resource: Some(resource),
        },
    })
}
