//! Deserialization helpers for tool arguments.

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

fn id_to_string<E: serde::de::Error>(raw: RawId) -> Result<String, E> {
    let id = match raw {
        RawId::Text(text) => text.trim().to_string(),
        RawId::Number(number) => number.to_string(),
    };
    if id.is_empty() {
        return Err(E::custom("identifier must not be empty"));
    }
    Ok(id)
}

/// Accepts identifiers sent either as JSON strings or integers (job ids, credential ids).
pub fn flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    id_to_string(RawId::deserialize(deserializer)?)
}

pub fn flexible_id_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawId>::deserialize(deserializer)? {
        Some(raw) => id_to_string(raw).map(Some),
        None => Ok(None),
    }
}
