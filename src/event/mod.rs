//! Event envelopes and the conversions between them.

pub mod background;
pub mod cloud_event;
pub mod conversion;

pub use background::{BackgroundEvent, EventContext, Resource, ResourceDetails};
pub use cloud_event::{CloudEvent, CloudEventError, EventData, CLOUDEVENT_MIME_TYPE};
pub use conversion::{
    background_event_to_cloud_event, cloud_event_to_background_event, is_convertable_cloud_event,
    marshal_background_event_data, ConversionError,
};
