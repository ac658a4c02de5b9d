//! Typed-signature support: input decoding and return validation.
//!
//! A typed function declares its input as a `Deserialize` type; the registry
//! keeps an [`InputType`] that decodes the request body into a type-erased
//! [`TypedValue`], which the registered wrapper downcasts back before calling
//! the user function. Results come back as a [`TypedReturn`].

use crate::function::FunctionError;
use crate::http::FunctionResponse;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::Any;

/// A decoded input document of some registered type.
pub struct TypedValue {
    type_name: &'static str,
    value: Box<dyn Any + Send>,
}

impl TypedValue {
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            value: Box::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Recover the concrete input.
    pub fn downcast<T: 'static>(self) -> Result<T, FunctionError> {
        let type_name = self.type_name;
        self.value.downcast::<T>().map(|v| *v).map_err(|_| {
            FunctionError::new(format!(
                "typed input is {} but the function expects {}",
                type_name,
                std::any::type_name::<T>()
            ))
        })
    }
}

impl std::fmt::Debug for TypedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Type descriptor used to decode request bodies for a typed function.
#[derive(Clone, Copy)]
pub struct InputType {
    name: &'static str,
    decode: fn(Value) -> Result<TypedValue, String>,
}

impl InputType {
    pub fn of<T>() -> Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        Self {
            name: short_type_name(std::any::type_name::<T>()),
            decode: decode_as::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Decode a JSON document, validating field presence and shape.
    pub fn decode(&self, value: Value) -> Result<TypedValue, String> {
        (self.decode)(value)
    }
}

impl std::fmt::Debug for InputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InputType").field(&self.name).finish()
    }
}

fn decode_as<T: DeserializeOwned + Send + 'static>(value: Value) -> Result<TypedValue, String> {
    serde_json::from_value::<T>(value)
        .map(TypedValue::new)
        .map_err(|e| e.to_string())
}

fn short_type_name(full: &'static str) -> &'static str {
    full.rsplit("::").next().unwrap_or(full)
}

/// A value that can render itself as a JSON object.
pub trait ToDict {
    fn to_dict(&self) -> Result<Value, String>;
}

impl<T: Serialize> ToDict for T {
    fn to_dict(&self) -> Result<Value, String> {
        serde_json::to_value(self).map_err(|e| e.to_string())
    }
}

/// What a typed function may return.
pub enum TypedReturn {
    /// Empty 200 response.
    Unit,
    /// A primitive: strings are returned as-is, anything else JSON-encoded.
    Primitive(Value),
    /// A domain object, validated and serialised through [`ToDict`].
    Record(Box<dyn ToDict + Send>),
}

impl TypedReturn {
    pub fn record<T: Serialize + Send + 'static>(value: T) -> Self {
        TypedReturn::Record(Box::new(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        TypedReturn::Primitive(Value::String(value.into()))
    }

    /// Convert into the wire response, running the return-type validator on
    /// records.
    pub fn into_response(self) -> Result<FunctionResponse, String> {
        match self {
            TypedReturn::Unit => Ok(FunctionResponse::text("")),
            TypedReturn::Primitive(Value::String(s)) => Ok(FunctionResponse::text(s)),
            TypedReturn::Primitive(value) => {
                FunctionResponse::json(&value).map_err(|e| e.to_string())
            }
            TypedReturn::Record(record) => {
                let dict = validate_return_type(record.as_ref())?;
                FunctionResponse::json(&Value::Object(dict)).map_err(|e| e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for TypedReturn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypedReturn::Unit => f.write_str("Unit"),
            TypedReturn::Primitive(v) => f.debug_tuple("Primitive").field(v).finish(),
            TypedReturn::Record(_) => f.write_str("Record(..)"),
        }
    }
}

/// Check that a record renders as a JSON object.
pub fn validate_return_type(record: &(dyn ToDict + Send)) -> Result<Map<String, Value>, String> {
    match record.to_dict()? {
        Value::Object(map) => Ok(map),
        other => Err(format!(
            "to_dict must produce an object, got {}",
            json_kind(&other)
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl From<()> for TypedReturn {
    fn from(_: ()) -> Self {
        TypedReturn::Unit
    }
}

impl From<String> for TypedReturn {
    fn from(value: String) -> Self {
        TypedReturn::text(value)
    }
}

impl From<&str> for TypedReturn {
    fn from(value: &str) -> Self {
        TypedReturn::text(value)
    }
}

impl From<bool> for TypedReturn {
    fn from(value: bool) -> Self {
        TypedReturn::Primitive(Value::Bool(value))
    }
}

impl From<i64> for TypedReturn {
    fn from(value: i64) -> Self {
        TypedReturn::Primitive(Value::from(value))
    }
}

impl From<f64> for TypedReturn {
    fn from(value: f64) -> Self {
        TypedReturn::Primitive(Value::from(value))
    }
}

impl From<Value> for TypedReturn {
    fn from(value: Value) -> Self {
        TypedReturn::Primitive(value)
    }
}
