//! Signature kinds and the process-wide signature lookup table.

use crate::error::FrameworkError;
use crate::function::typed::InputType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

/// The calling convention a user function implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureKind {
    /// Receives the raw HTTP request.
    #[default]
    Http,
    /// Receives legacy background-event `(data, context)`.
    Event,
    /// Receives a decoded CloudEvent.
    CloudEvent,
    /// Receives a domain object decoded from JSON.
    Typed,
}

impl SignatureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureKind::Http => "http",
            SignatureKind::Event => "event",
            SignatureKind::CloudEvent => "cloudevent",
            SignatureKind::Typed => "typed",
        }
    }
}

impl std::fmt::Display for SignatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureKind {
    type Err = FrameworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(SignatureKind::Http),
            "event" => Ok(SignatureKind::Event),
            "cloudevent" => Ok(SignatureKind::CloudEvent),
            "typed" => Ok(SignatureKind::Typed),
            other => Err(FrameworkError::InvalidSignature(other.to_string())),
        }
    }
}

/// What is known about one registered function.
#[derive(Debug, Clone)]
pub struct SignatureRegistration {
    pub function_name: String,
    pub signature_kind: SignatureKind,
    pub is_async: bool,
    /// Decoder for the input document; only set for typed functions.
    pub input_type: Option<InputType>,
}

/// Lookup table from function name to declared signature.
///
/// Built once at startup and only read while serving, so it carries no lock.
#[derive(Debug, Clone, Default)]
pub struct SignatureRegistry {
    entries: HashMap<String, SignatureRegistration>,
}

impl SignatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a function's signature kind and async-ness.
    ///
    /// A name maps to at most one signature; registering it again fails.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        kind: SignatureKind,
        is_async: bool,
    ) -> Result<&mut SignatureRegistration, FrameworkError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(FrameworkError::DuplicateRegistration(name));
        }
        debug!(function = %name, kind = %kind, is_async, "registered signature");
        Ok(self
            .entries
            .entry(name.clone())
            .or_insert(SignatureRegistration {
                function_name: name,
                signature_kind: kind,
                is_async,
                input_type: None,
            }))
    }

    /// Record whether an already-registered function is natively async.
    pub fn register_async(&mut self, name: &str, is_async: bool) -> Result<(), FrameworkError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| FrameworkError::FunctionNotFound(name.to_string()))?;
        entry.is_async = is_async;
        Ok(())
    }

    /// Attach the input decoder of a typed function.
    pub fn set_input_type(&mut self, name: &str, input_type: InputType) -> Result<(), FrameworkError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| FrameworkError::FunctionNotFound(name.to_string()))?;
        entry.input_type = Some(input_type);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SignatureRegistration> {
        self.entries.get(name)
    }

    /// The registered kind, if any.
    pub fn kind(&self, name: &str) -> Option<SignatureKind> {
        self.entries.get(name).map(|e| e.signature_kind)
    }

    /// Whether the function is natively async. False for unknown names.
    pub fn is_async(&self, name: &str) -> bool {
        self.entries.get(name).map(|e| e.is_async).unwrap_or(false)
    }

    pub fn input_type(&self, name: &str) -> Option<&InputType> {
        self.entries.get(name).and_then(|e| e.input_type.as_ref())
    }

    /// Effective signature kind.
    ///
    /// Precedence: explicit override, then environment override, then the
    /// registered kind, then HTTP.
    pub fn resolve(
        &self,
        name: &str,
        explicit: Option<SignatureKind>,
        env: Option<SignatureKind>,
    ) -> SignatureKind {
        explicit
            .or(env)
            .or_else(|| self.kind(name))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
