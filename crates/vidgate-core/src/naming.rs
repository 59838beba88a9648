//! File-name sanitization and playback-URL construction.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Everything except RFC 3986 unreserved characters is percent-encoded, so a
/// decoded path segment round-trips to the exact stored file name.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Strip any directory components from a client-supplied file name. Producers
/// only ever send bare names, but the final path must not be steerable.
pub fn sanitize_file_name(raw: &str) -> String {
    let leaf = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if leaf.is_empty() || leaf == "." || leaf == ".." {
        "file".to_string()
    } else {
        leaf.to_string()
    }
}

/// Durable file name for an accepted job. The uuid job id prefix makes
/// collisions between different uploads of the same source name practically
/// impossible.
pub fn final_file_name(job_id: &str, original_file_name: &str) -> String {
    format!("{}_{}", job_id, sanitize_file_name(original_file_name))
}

pub fn playback_url(public_base_url: &str, file_name: &str) -> String {
    format!(
        "{}/media/{}",
        public_base_url.trim_end_matches('/'),
        utf8_percent_encode(file_name, PATH_SEGMENT)
    )
}
