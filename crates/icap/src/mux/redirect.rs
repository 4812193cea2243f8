use http::header::LOCATION;
use http::{HeaderValue, StatusCode};
use tracing::debug;

use crate::connection::ResponseWriter;
use crate::mux::path::clean;
use crate::protocol::{Request, SendError};

/// Replies with a redirect to `target`, which may be relative to the request path.
///
/// A target without a scheme is made absolute against the directory of the request
/// path and cleaned, keeping its trailing slash and query. Targets with a scheme are
/// sent as they are. The response is `status` with a `Location` header and no body.
///
/// # Errors
///
/// [`SendError::InvalidHeader`] if the location can't be a header value, otherwise
/// whatever [`ResponseWriter::write_header`] fails with.
pub async fn redirect(
    writer: &mut ResponseWriter<'_>,
    request: &Request,
    target: &str,
    status: StatusCode,
) -> Result<(), SendError> {
    let location = resolve_location(request.path(), target);
    let value = HeaderValue::try_from(location.as_str()).map_err(|e| SendError::invalid_header(e.to_string()))?;

    debug!(to = target, %location, status = status.as_u16(), "redirect request");
    writer.header_mut().insert(LOCATION, value);
    writer.write_header(status, None, false).await
}

/// The `Location` value for a redirect from `current_path` to `target`.
pub fn resolve_location(current_path: &str, target: &str) -> String {
    if !is_relative_reference(target) {
        return target.to_owned();
    }

    let current_path = if current_path.is_empty() { "/" } else { current_path };
    let mut location = if target.starts_with('/') { target.to_owned() } else { format!("{}{target}", dir(current_path)) };

    let query = match location.find('?') {
        Some(index) => location.split_off(index),
        None => String::new(),
    };

    let trailing = location.ends_with('/');
    let mut cleaned = clean(&location);
    if trailing && !cleaned.ends_with('/') {
        cleaned.push('/');
    }
    cleaned.push_str(&query);
    cleaned
}

/// Whether `target` has neither a scheme nor a colon that makes it unparsable as a
/// relative reference.
fn is_relative_reference(target: &str) -> bool {
    let end = target.find(['?', '#']).unwrap_or(target.len());
    let first_segment = target[..end].split('/').next().unwrap_or_default();
    !first_segment.contains(':')
}

/// Everything up to and including the last `/`.
fn dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..=index],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_target_uses_request_directory() {
        assert_eq!(resolve_location("/a/b/c", "d"), "/a/b/d");
        assert_eq!(resolve_location("/a/b/c", "../d/"), "/a/d/");
        assert_eq!(resolve_location("/a/b/", "d?x=1"), "/a/b/d?x=1");
        assert_eq!(resolve_location("/a/b/c", ""), "/a/b/");
        assert_eq!(resolve_location("", "d"), "/d");
    }

    #[test]
    fn absolute_path_is_cleaned() {
        assert_eq!(resolve_location("/a/b", "/x/./y/../z"), "/x/z");
        assert_eq!(resolve_location("/a/b", "/x//y/"), "/x/y/");
        assert_eq!(resolve_location("/a/b", "/x/../y?q=../z"), "/y?q=../z");
    }

    #[test]
    fn target_with_scheme_is_kept() {
        assert_eq!(resolve_location("/a/b", "icap://other.example/x/../y"), "icap://other.example/x/../y");
        assert_eq!(resolve_location("/a/b", "mailto:admin@example.com"), "mailto:admin@example.com");
        assert_eq!(resolve_location("/a/b", ":broken"), ":broken");
    }
}
