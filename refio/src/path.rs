//! URL and filesystem path helpers shared by readers and the resolver.
//!
//! Every document is addressed by an absolute [`Url`]; local files use the
//! `file` scheme. Fragments never take part in document identity.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::Url;

/// The current working directory as a directory URL (with a trailing slash).
pub fn cwd() -> Result<Url, url::ParseError> {
    let dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    Url::from_directory_path(normalize_path(&dir))
        .map_err(|_| url::ParseError::RelativeUrlWithoutBase)
}

/// Turn user input (a URL or a filesystem path, relative or `~`-prefixed) into
/// an absolute URL. A `#fragment` suffix is carried over unchanged.
pub fn to_url(input: &str) -> Result<Url, url::ParseError> {
    if has_scheme(input) {
        return Url::parse(input);
    }

    let (path_part, fragment) = match input.find('#') {
        Some(index) => (&input[..index], Some(&input[index + 1..])),
        None => (input, None),
    };

    let mut url = if path_part.is_empty() {
        cwd()?
    } else {
        let expanded = expand_user(Path::new(path_part));
        let absolute = if expanded.is_absolute() {
            expanded
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("/"))
                .join(expanded)
        };
        Url::from_file_path(normalize_path(&absolute))
            .map_err(|_| url::ParseError::RelativeUrlWithoutBase)?
    };
    if let Some(fragment) = fragment {
        url.set_fragment(Some(fragment));
    }
    Ok(url)
}

/// Resolve `reference` against `base`, the way a browser resolves a link.
pub fn resolve(base: &str, reference: &str) -> Result<Url, url::ParseError> {
    let base = Url::parse(base)?;
    base.join(reference)
}

/// Everything before the first `#`.
pub fn strip_hash(url: &str) -> &str {
    match url.find('#') {
        Some(index) => &url[..index],
        None => url,
    }
}

/// The `#fragment` part including the `#`, or `"#"` when there is none.
pub fn get_hash(url: &str) -> &str {
    match url.find('#') {
        Some(index) => &url[index..],
        None => "#",
    }
}

/// Lower-cased extension of the last path segment, e.g. `".yaml"`.
pub fn extension(url: &str) -> String {
    let name = file_name(url);
    match name.rfind('.') {
        Some(index) if index > 0 => name[index..].to_lowercase(),
        _ => String::new(),
    }
}

/// Percent-decoded last path segment, without query or fragment.
pub fn file_name(url: &str) -> String {
    let without_hash = strip_hash(url);
    let without_query = match without_hash.find('?') {
        Some(index) => &without_hash[..index],
        None => without_hash,
    };
    let segment = without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("");
    percent_decode_str(segment).decode_utf8_lossy().to_string()
}

/// Query string of a URL, without the `?`.
pub fn query(url: &str) -> Option<String> {
    Url::parse(strip_hash(url))
        .ok()
        .and_then(|url| url.query().map(str::to_string))
        .filter(|query| !query.is_empty())
}

pub fn is_http(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

pub fn is_file(url: &str) -> bool {
    url.to_ascii_lowercase().starts_with("file:")
}

/// Render a `file` URL as a local path for humans; other URLs are returned as is.
pub fn to_file_system_path(url: &str) -> String {
    if !is_file(url) {
        return url.to_string();
    }
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.to_file_path().ok())
        .map(|path| path.to_string_lossy().to_string())
        .unwrap_or_else(|| url.to_string())
}

pub fn expand_user(path: &Path) -> PathBuf {
    let Some(home) = dirs::home_dir() else {
        return path.to_path_buf();
    };
    let path_str = path.to_string_lossy();
    if path_str == "~" {
        return home;
    }
    if let Some(stripped) = path_str.strip_prefix("~/") {
        return home.join(stripped);
    }
    path.to_path_buf()
}

/// Lexically collapse `.` and `..` components.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut parts: Vec<OsString> = Vec::new();
    let mut prefix: Option<OsString> = None;
    let mut has_root = false;

    for component in path.components() {
        match component {
            Component::Prefix(prefix_comp) => {
                prefix = Some(prefix_comp.as_os_str().to_os_string());
            }
            Component::RootDir => {
                has_root = true;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(last) = parts.last() {
                    if last != ".." {
                        parts.pop();
                    } else if !has_root {
                        parts.push(OsString::from(".."));
                    }
                } else if !has_root {
                    parts.push(OsString::from(".."));
                }
            }
            Component::Normal(part) => parts.push(part.to_os_string()),
        }
    }

    let mut out = PathBuf::new();
    if let Some(prefix) = prefix {
        out.push(prefix);
    }
    if has_root {
        out.push(std::path::MAIN_SEPARATOR.to_string());
    }
    for part in parts {
        out.push(part);
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// A scheme needs at least two characters so that `C:\schema.json` stays a path.
fn has_scheme(input: &str) -> bool {
    let Some(index) = input.find(':') else {
        return false;
    };
    let scheme = &input[..index];
    scheme.len() > 1
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
}
