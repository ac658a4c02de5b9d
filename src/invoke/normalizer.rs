//! Turns a fully-read request into the input its function expects.

use crate::error::RequestError;
use crate::event::cloud_event::is_binary;
use crate::event::{
    background_event_to_cloud_event, cloud_event_to_background_event, is_convertable_cloud_event,
    marshal_background_event_data, BackgroundEvent, CloudEvent, EventContext, Resource,
};
use crate::function::{InputType, SignatureKind, TypedValue};
use crate::http::FunctionRequest;
use serde_json::Value;
use tracing::debug;

/// The one input shape handed to a user function.
#[derive(Debug)]
pub enum NormalizedEvent {
    Http(FunctionRequest),
    CloudEvent(CloudEvent),
    Background(BackgroundEvent),
    Typed(TypedValue),
}

impl NormalizedEvent {
    pub fn kind(&self) -> SignatureKind {
        match self {
            NormalizedEvent::Http(_) => SignatureKind::Http,
            NormalizedEvent::CloudEvent(_) => SignatureKind::CloudEvent,
            NormalizedEvent::Background(_) => SignatureKind::Event,
            NormalizedEvent::Typed(_) => SignatureKind::Typed,
        }
    }
}

/// Normalise `request` for a function of the given kind.
///
/// `input_type` is required for typed functions and ignored otherwise.
pub fn normalize(
    kind: SignatureKind,
    request: FunctionRequest,
    input_type: Option<&InputType>,
) -> Result<NormalizedEvent, RequestError> {
    match kind {
        SignatureKind::Http => Ok(NormalizedEvent::Http(request)),
        SignatureKind::CloudEvent => to_cloud_event(&request).map(NormalizedEvent::CloudEvent),
        SignatureKind::Event => to_background_event(&request).map(NormalizedEvent::Background),
        SignatureKind::Typed => {
            let input_type = input_type.ok_or(RequestError::MissingInputType)?;
            to_typed(&request, input_type).map(NormalizedEvent::Typed)
        }
    }
}

fn to_cloud_event(request: &FunctionRequest) -> Result<CloudEvent, RequestError> {
    let body = request.bytes();
    let ce_error = match CloudEvent::from_http(&request.headers, &body) {
        Ok(event) => return Ok(event),
        Err(err) => err,
    };
    debug!("not a CloudEvent ({}), trying legacy conversion", ce_error);

    parse_background(request)
        .and_then(|event| background_event_to_cloud_event(event).map_err(|e| e.to_string()))
        .map_err(|background| RequestError::EventConversion {
            cloud_event: ce_error.to_string(),
            background,
        })
}

fn to_background_event(request: &FunctionRequest) -> Result<BackgroundEvent, RequestError> {
    let body = request.bytes();
    if is_convertable_cloud_event(&request.headers) {
        let event = CloudEvent::from_binary(&request.headers, &body)
            .map_err(|e| RequestError::InvalidEvent(e.to_string()))?;
        return cloud_event_to_background_event(event)
            .map_err(|e| RequestError::InvalidEvent(e.to_string()));
    }

    if is_binary(&request.headers) {
        let data = serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()));
        let header = |name: &str| request.get_header(name).cloned();
        let context = EventContext {
            event_id: header("ce-eventId"),
            timestamp: header("ce-timestamp"),
            event_type: header("ce-eventType"),
            resource: header("ce-resource").map(Resource::Name),
        };
        return Ok(BackgroundEvent::new(data, context));
    }

    parse_background(request).map_err(RequestError::InvalidEvent)
}

fn parse_background(request: &FunctionRequest) -> Result<BackgroundEvent, String> {
    let body = request.bytes();
    if body.is_empty() {
        return Err("empty request body".to_string());
    }
    let value: Value = serde_json::from_slice(&body).map_err(|e| e.to_string())?;
    BackgroundEvent::from_json(marshal_background_event_data(value, &request.url))
}

fn to_typed(request: &FunctionRequest, input_type: &InputType) -> Result<TypedValue, RequestError> {
    let decoding = |message: String| RequestError::Decoding {
        type_name: input_type.name().to_string(),
        message,
    };
    let value: Value = match request.json() {
        Some(parsed) => parsed.map_err(|e| decoding(e.to_string()))?,
        None => return Err(decoding("request body is empty".to_string())),
    };
    input_type.decode(value).map_err(decoding)
}
