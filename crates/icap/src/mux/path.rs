//! Slash-separated path helpers used for routing and redirects.

/// Shortest equivalent path, by lexical processing only.
///
/// Repeated slashes collapse, `.` elements are dropped, and `..` removes the element
/// before it. A `..` at the start of a rooted path is dropped. The result has no
/// trailing slash unless it is `/`, and an empty result is `.`.
pub fn clean(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut elements: Vec<&str> = Vec::new();

    for element in path.split('/') {
        match element {
            "" | "." => {}
            ".." => match elements.last() {
                Some(&last) if last != ".." => {
                    elements.pop();
                }
                _ if rooted => {}
                _ => elements.push(".."),
            },
            element => elements.push(element),
        }
    }

    let joined = elements.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => String::from("."),
        (false, false) => joined,
    }
}

/// The canonical form of a request path.
///
/// Like [`clean`], but the result always starts with `/` and keeps the trailing
/// slash of `path`.
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return String::from("/");
    }

    let rooted = if path.starts_with('/') { path.to_owned() } else { format!("/{path}") };
    let mut cleaned = clean(&rooted);
    if rooted.ends_with('/') && cleaned != "/" {
        cleaned.push('/');
    }
    cleaned
}

/// Whether `path` is served by `pattern`.
///
/// A pattern ending in `/` names a subtree and matches every path it prefixes,
/// any other pattern matches only itself.
pub fn path_match(pattern: &str, path: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }

    if pattern.ends_with('/') { path.starts_with(pattern) } else { pattern == path }
}
