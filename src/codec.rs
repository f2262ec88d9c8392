//! Event Codec
//!
//! Turns typed domain events into type-tagged payloads and back.
//! The type tag and schema version travel with every stored event so a
//! payload can be decoded without guessing its type.

use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::event_store::EventStoreError;

/// Longest type tag accepted by the store
pub const MAX_EVENT_TYPE_LEN: usize = 255;

/// A domain event that can be persisted
pub trait DomainEvent {
    /// Version of the payload shape. Bump when the serialized form changes.
    const SCHEMA_VERSION: i32 = 1;

    /// Type tag identifying the event variant
    fn event_type(&self) -> &str;
}

/// Encoded event as written to storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedEvent {
    pub event_type: String,
    pub schema_version: i32,
    pub data: serde_json::Value,
}

/// Encodes and decodes one family of events
pub trait EventCodec: Send + Sync {
    /// The event type handled by this codec
    type Event;

    /// Encode an event, failing with `InvalidEvent` when it has no usable type tag
    fn encode(&self, event: &Self::Event) -> Result<EncodedEvent, EventStoreError>;

    /// Decode a stored event back into its typed value
    fn decode(&self, encoded: &EncodedEvent) -> Result<Self::Event, EventStoreError>;
}

/// Check whether a type tag can be stored and recovered
pub fn is_valid_event_type(tag: &str) -> bool {
    if tag.is_empty() || tag.len() > MAX_EVENT_TYPE_LEN {
        return false;
    }

    let mut chars = tag.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'))
}

/// JSON codec backed by serde_json
pub struct JsonCodec<E> {
    _event: PhantomData<fn() -> E>,
}

impl<E> JsonCodec<E> {
    pub fn new() -> Self {
        Self {
            _event: PhantomData,
        }
    }
}

impl<E> Default for JsonCodec<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for JsonCodec<E> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for JsonCodec<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonCodec")
            .field("event", &std::any::type_name::<E>())
            .finish()
    }
}

impl<E> EventCodec for JsonCodec<E>
where
    E: DomainEvent + Serialize + DeserializeOwned,
{
    type Event = E;

    fn encode(&self, event: &E) -> Result<EncodedEvent, EventStoreError> {
        let event_type = event.event_type();
        if !is_valid_event_type(event_type) {
            return Err(EventStoreError::InvalidEvent(format!(
                "unrecoverable type tag {:?}",
                event_type
            )));
        }

        let data = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidEvent(format!("{} cannot be serialized: {}", event_type, e))
        })?;

        Ok(EncodedEvent {
            event_type: event_type.to_string(),
            schema_version: E::SCHEMA_VERSION,
            data,
        })
    }

    fn decode(&self, encoded: &EncodedEvent) -> Result<E, EventStoreError> {
        if !is_valid_event_type(&encoded.event_type) {
            return Err(EventStoreError::InvalidEventData(format!(
                "stored type tag {:?} is not valid",
                encoded.event_type
            )));
        }

        if encoded.schema_version != E::SCHEMA_VERSION {
            return Err(EventStoreError::UnsupportedSchemaVersion {
                event_type: encoded.event_type.clone(),
                found: encoded.schema_version,
                supported: E::SCHEMA_VERSION,
            });
        }

        let event: E = serde_json::from_value(encoded.data.clone())?;

        if event.event_type() != encoded.event_type {
            return Err(EventStoreError::InvalidEventData(format!(
                "payload decodes to {} but is tagged {}",
                event.event_type(),
                encoded.event_type
            )));
        }

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type")]
    enum LampEvent {
        SwitchedOn { brightness: u8 },
        SwitchedOff,
        #[serde(rename = "")]
        Untagged,
    }

    impl DomainEvent for LampEvent {
        fn event_type(&self) -> &str {
            match self {
                LampEvent::SwitchedOn { .. } => "SwitchedOn",
                LampEvent::SwitchedOff => "SwitchedOff",
                LampEvent::Untagged => "",
            }
        }
    }

    #[test]
    fn test_event_type_validation() {
        assert!(is_valid_event_type("AccountOpened"));
        assert!(is_valid_event_type("billing.v2:Invoice-Issued_1"));

        assert!(!is_valid_event_type(""));
        assert!(!is_valid_event_type("1stEvent"));
        assert!(!is_valid_event_type("has space"));
        assert!(!is_valid_event_type(&"a".repeat(MAX_EVENT_TYPE_LEN + 1)));
    }

    #[test]
    fn test_json_codec_round_trip() {
        let codec = JsonCodec::<LampEvent>::new();
        let event = LampEvent::SwitchedOn { brightness: 80 };

        let encoded = codec.encode(&event).unwrap();
        assert_eq!(encoded.event_type, "SwitchedOn");
        assert_eq!(encoded.schema_version, 1);
        assert_eq!(encoded.data["type"], "SwitchedOn");

        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_json_codec_rejects_missing_tag() {
        let codec = JsonCodec::<LampEvent>::new();

        let result = codec.encode(&LampEvent::Untagged);
        assert!(matches!(result, Err(EventStoreError::InvalidEvent(_))));
    }

    #[test]
    fn test_json_codec_rejects_other_schema_version() {
        let codec = JsonCodec::<LampEvent>::new();
        let mut encoded = codec.encode(&LampEvent::SwitchedOff).unwrap();
        encoded.schema_version = 2;

        match codec.decode(&encoded) {
            Err(EventStoreError::UnsupportedSchemaVersion {
                found, supported, ..
            }) => {
                assert_eq!(found, 2);
                assert_eq!(supported, 1);
            }
            other => panic!("Expected UnsupportedSchemaVersion, got: {:?}", other),
        }
    }

    #[test]
    fn test_json_codec_rejects_tag_mismatch() {
        let codec = JsonCodec::<LampEvent>::new();
        let mut encoded = codec.encode(&LampEvent::SwitchedOff).unwrap();
        encoded.event_type = "SwitchedOn".to_string();

        let result = codec.decode(&encoded);
        assert!(matches!(result, Err(EventStoreError::InvalidEventData(_))));
    }
}
