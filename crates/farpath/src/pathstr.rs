//! String-level path arithmetic shared by all backends.
//!
//! Backends keep their root-relative directory as plain text (remote roots
//! are not host filesystem paths), so joining, normalizing and splitting all
//! operate on `/`-separated strings.

/// Join two path fragments with a single separator.
///
/// An empty base yields `rel` unchanged; an absolute `rel` replaces the base
/// entirely, mirroring `os.path.join` semantics.
pub(crate) fn join(base: &str, rel: &str) -> String {
    if rel.starts_with('/') || base.is_empty() {
        return rel.to_string();
    }
    if rel.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), rel)
}

/// Collapse `.`, `..` and duplicate separators.
///
/// `..` above the root is kept as-is for relative paths and dropped for
/// absolute ones.
pub(crate) fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut kept: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => match kept.last() {
                Some(&last) if last != ".." => {
                    kept.pop();
                }
                _ if absolute => {}
                _ => kept.push(".."),
            },
            other => kept.push(other),
        }
    }
    let joined = kept.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Split into (directory part, final component). The directory part is empty
/// when the path has a single component.
pub(crate) fn split_last(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => ("/", &trimmed[1..]),
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
        None => ("", trimmed),
    }
}

/// Final `/`-delimited component of a path.
pub(crate) fn final_component(path: &str) -> &str {
    split_last(path).1
}

/// Strip a directory prefix from every entry, leaving prefix-relative names.
pub(crate) fn strip_root<'a>(entry: &'a str, root: &str) -> &'a str {
    if root.is_empty() {
        return entry;
    }
    let root = root.trim_end_matches('/');
    entry
        .strip_prefix(root)
        .map_or(entry, |rest| rest.trim_start_matches('/'))
}

/// Percent-decode one URL component (userinfo, password). Invalid UTF-8 is
/// replaced rather than rejected; credentials are opaque to us anyway.
pub(crate) fn decode_component(component: &str) -> String {
    percent_encoding::percent_decode_str(component)
        .decode_utf8_lossy()
        .into_owned()
}

/// Extension of the final component, including the leading dot; empty when
/// there is none. Leading dots are ignored, as in `os.path.splitext`.
pub(crate) fn extension(path: &str) -> &str {
    let name = final_component(path);
    match name.trim_start_matches('.').rfind('.') {
        Some(idx) => {
            let dots = name.len() - name.trim_start_matches('.').len();
            &name[dots + idx..]
        }
        None => "",
    }
}
