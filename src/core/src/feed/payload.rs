//! Wire-document helpers: opaque payloads, gzip bodies and request paths.

use flate2::read::GzDecoder;
use serde::{Deserialize, Deserializer};
use std::io::Read;

/// Keep a payload field as serialized text.
///
/// Embedded feed bodies carry `data` as a JSON string while single-event
/// documents carry it as a JSON value; both end up as the same text.
pub(crate) fn opaque<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

/// Decode a response body according to its `Content-Encoding`.
pub(crate) fn decode_body(content_encoding: Option<&str>, body: &[u8]) -> std::io::Result<Vec<u8>> {
    let gzipped = content_encoding
        .map(|value| value.split(',').any(|enc| enc.trim().eq_ignore_ascii_case("gzip")))
        .unwrap_or(false);
    if !gzipped {
        return Ok(body.to_vec());
    }
    let mut decoded = Vec::with_capacity(body.len() * 4);
    GzDecoder::new(body).read_to_end(&mut decoded)?;
    Ok(decoded)
}

/// Path of a URI without scheme, authority or query.
fn path_of(uri: &str) -> &str {
    let without_query = uri.split(['?', '#']).next().unwrap_or(uri);
    match without_query.find("://") {
        Some(scheme_end) => {
            let rest = &without_query[scheme_end + 3..];
            rest.find('/').map(|p| &rest[p..]).unwrap_or("/")
        }
        None => without_query,
    }
}

/// Stream name of a single-event URI such as `http://host/streams/orders/2`.
pub(crate) fn stream_name_from_uri(uri: &str) -> Option<String> {
    let path = path_of(uri);
    let rest = &path[path.find("/streams/")? + "/streams/".len()..];
    let (stream, _) = rest.rsplit_once('/')?;
    if stream.is_empty() {
        None
    } else {
        Some(stream.to_string())
    }
}

/// Trailing event number of a single-event URI.
pub(crate) fn event_number_from_uri(uri: &str) -> Option<u64> {
    let path = path_of(uri);
    if !path.contains("/streams/") {
        return None;
    }
    path.rsplit('/').next()?.parse().ok()
}

/// Event number of a title marker `"{n}@{stream}"` belonging to `stream`.
pub(crate) fn event_number_from_title(title: &str, stream: &str) -> Option<u64> {
    let (number, title_stream) = title.split_once('@')?;
    if title_stream != stream {
        return None;
    }
    number.parse().ok()
}
