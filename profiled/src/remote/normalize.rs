use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::model::{ExperienceLevel, Favorites, Profile, Role};
use crate::timestamp::Timestamp;

/// Decodes a remote document field by field. Anything missing or of the
/// wrong shape falls back to the field's default so a partially written
/// document never blocks sign-in.
pub fn profile_from_document(value: &Value) -> Profile {
    let Some(doc) = value.as_object() else {
        return Profile::default();
    };

    Profile {
        id: string_field(doc, "id"),
        display_name: string_field(doc, "displayName"),
        avatar_url: string_field(doc, "avatarUrl"),
        language: string_field(doc, "language"),
        role: doc
            .get("role")
            .and_then(Value::as_str)
            .and_then(Role::parse)
            .unwrap_or_default(),
        bio: string_map_field(doc, "bio"),
        experience_level: doc
            .get("experienceLevel")
            .and_then(Value::as_str)
            .and_then(ExperienceLevel::parse),
        interests: string_set(doc.get("interests")),
        location: string_field(doc, "location"),
        spoken_languages: string_set(doc.get("spokenLanguages")),
        favorites: favorites_field(doc.get("favorites")),
        joined_at: doc.get("joinedAt").and_then(normalize_timestamp),
        updated_at: doc.get("updatedAt").and_then(normalize_timestamp),
    }
}

pub fn profile_to_document(profile: &Profile) -> Result<Value, serde_json::Error> {
    serde_json::to_value(profile)
}

/// Converts any timestamp encoding the store may hand back into a
/// [`Timestamp`]: RFC 3339 strings, Unix milliseconds, or server timestamp
/// objects (`{seconds, nanos}`, `{_seconds, _nanoseconds}`,
/// `{timestampValue}`).
pub fn normalize_timestamp(value: &Value) -> Option<Timestamp> {
    match value {
        Value::String(text) => Timestamp::parse_rfc3339(text).ok(),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|v| v.is_finite()).map(|v| v as i64))
            .map(Timestamp::from_millis),
        Value::Object(obj) => {
            if let Some(text) = obj.get("timestampValue").and_then(Value::as_str) {
                return Timestamp::parse_rfc3339(text).ok();
            }
            let seconds = integer(obj.get("seconds").or_else(|| obj.get("_seconds")))?;
            let nanos = integer(obj.get("nanos").or_else(|| obj.get("_nanoseconds"))).unwrap_or(0);
            Some(Timestamp::from_unix_parts(seconds, nanos))
        }
        _ => None,
    }
}

fn integer(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn string_field(doc: &Map<String, Value>, key: &str) -> String {
    doc.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

fn string_map_field(doc: &Map<String, Value>, key: &str) -> BTreeMap<String, String> {
    let Some(map) = doc.get(key).and_then(Value::as_object) else {
        return BTreeMap::new();
    };
    map.iter()
        .filter_map(|(k, v)| v.as_str().map(|text| (k.clone(), text.to_string())))
        .collect()
}

fn string_set(value: Option<&Value>) -> BTreeSet<String> {
    let Some(items) = value.and_then(Value::as_array) else {
        return BTreeSet::new();
    };
    items
        .iter()
        .filter_map(Value::as_str)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn favorites_field(value: Option<&Value>) -> Favorites {
    let Some(obj) = value.and_then(Value::as_object) else {
        return Favorites::default();
    };
    Favorites {
        retreats: string_set(obj.get("retreats")),
        instructors: string_set(obj.get("instructors")),
    }
}
