//! Typed extraction of fields from an untyped parameter bag.
//!
//! A [`ParamReader`] never stops at the first bad field. Each `required` or
//! `optional` call records its failure and hands back a default, and
//! [`ParamReader::finish`] reports everything that was collected. Backends
//! decode all of their arguments first, then call `finish` once.

use serde_json::{Map, Value};

use crate::error::{FieldError, ValidationError};

use super::spec::Params;

/// A type that can be read out of a JSON parameter value.
pub trait FromParam: Sized {
    /// Name used in type-mismatch messages.
    const TYPE_NAME: &'static str;

    /// Converts the value, or returns `None` on a type mismatch.
    fn from_param(value: &Value) -> Option<Self>;
}

impl FromParam for String {
    const TYPE_NAME: &'static str = "string";

    fn from_param(value: &Value) -> Option<Self> {
        value.as_str().map(ToOwned::to_owned)
    }
}

impl FromParam for Vec<String> {
    const TYPE_NAME: &'static str = "list of strings";

    fn from_param(value: &Value) -> Option<Self> {
        value
            .as_array()?
            .iter()
            .map(|v| v.as_str().map(ToOwned::to_owned))
            .collect()
    }
}

impl FromParam for Map<String, Value> {
    const TYPE_NAME: &'static str = "map";

    fn from_param(value: &Value) -> Option<Self> {
        value.as_object().cloned()
    }
}

/// Accumulating reader over one spec's parameters.
#[derive(Debug)]
pub struct ParamReader<'a> {
    params: &'a Params,
    errors: Vec<FieldError>,
}

impl<'a> ParamReader<'a> {
    /// Creates a reader over `params`.
    #[must_use]
    pub const fn new(params: &'a Params) -> Self {
        Self {
            params,
            errors: Vec::new(),
        }
    }

    /// Reads an optional field. A present value of the wrong type is recorded.
    pub fn optional<T: FromParam>(&mut self, key: &str) -> Option<T> {
        let value = self.params.get(key)?;
        let converted = T::from_param(value);
        if converted.is_none() {
            self.errors.push(FieldError::InvalidType {
                key: key.to_string(),
                expected: T::TYPE_NAME,
            });
        }
        converted
    }

    /// Reads a required field, recording it as missing when absent.
    ///
    /// The returned value is `T::default()` whenever an error was recorded;
    /// it is never observed because `finish` fails in that case.
    pub fn required<T: FromParam + Default>(&mut self, key: &str) -> T {
        if !self.params.contains_key(key) {
            self.errors.push(FieldError::Missing {
                key: key.to_string(),
            });
            return T::default();
        }
        self.optional(key).unwrap_or_default()
    }

    /// Records a semantic problem with a field that decoded fine.
    pub fn reject(&mut self, key: &str, message: impl Into<String>) {
        self.errors.push(FieldError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        });
    }

    /// Returns true if something was already recorded for `key`.
    #[must_use]
    pub fn has_errors_for(&self, key: &str) -> bool {
        self.errors.iter().any(|e| match e {
            FieldError::Missing { key: k }
            | FieldError::InvalidType { key: k, .. }
            | FieldError::InvalidValue { key: k, .. } => k == key,
        })
    }

    /// Returns the aggregated error, if any field was bad.
    ///
    /// # Errors
    ///
    /// Returns every collected field error.
    pub fn finish(self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                errors: self.errors,
            })
        }
    }
}
