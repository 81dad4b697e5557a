//! Plain-text sanitizing for user supplied strings.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::store::Record;

static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
        .expect("script pattern is valid")
});

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->|</?[A-Za-z][^>]*>").expect("tag pattern is valid"));

static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z]+);").expect("entity pattern is valid"));

/// Keys whose values are stored verbatim.
pub const RAW_FIELDS: [&str; 4] = ["url", "secret", "key_hash", "payload"];

/// Removes HTML markup and returns trimmed plain text.
///
/// Script and style elements are dropped with their contents; common
/// entities are decoded after tags are gone.
pub fn strip_html(input: &str) -> String {
    let without_code = SCRIPT_OR_STYLE.replace_all(input, "");
    let without_tags = TAG.replace_all(&without_code, "");
    let decoded = ENTITY.replace_all(&without_tags, |caps: &regex::Captures<'_>| {
        decode_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });
    decoded.trim().to_string()
}

fn decode_entity(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    let decoded = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        _ => return None,
    };
    Some(decoded.to_string())
}

/// Strips markup from every string in a record, recursively.
///
/// Values under [`RAW_FIELDS`] keys are left untouched.
pub fn sanitize_record(record: Record) -> Record {
    record
        .into_iter()
        .map(|(key, value)| {
            if RAW_FIELDS.contains(&key.as_str()) {
                (key, value)
            } else {
                (key, sanitize_value(value))
            }
        })
        .collect()
}

fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(strip_html(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(sanitize_record(map)),
        other => other,
    }
}
