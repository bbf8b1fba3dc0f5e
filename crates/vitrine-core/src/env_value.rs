//! Lenient deserialization for config fields.
//!
//! Environment overlays deliver every value as a string. Fields tagged with
//! `#[serde(deserialize_with = "vitrine_core::env_value::parse")]` accept
//! either the native value or its string form.

use std::fmt::Display;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum NativeOrText<T> {
    Native(T),
    Text(String),
}

/// Deserialize `T` from its native form or from a string.
pub fn parse<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    match NativeOrText::<T>::deserialize(deserializer)? {
        NativeOrText::Native(value) => Ok(value),
        NativeOrText::Text(text) => text.trim().parse().map_err(de::Error::custom),
    }
}
