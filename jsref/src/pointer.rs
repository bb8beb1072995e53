//! JSON Pointer parsing and formatting for `$ref` strings.
//!
//! A `$ref` fragment is a URI fragment holding a JSON Pointer: tokens are
//! percent-decoded first, then `~1` becomes `/` and `~0` becomes `~`.
//! Formatting applies the same steps in reverse. `$` is never percent-encoded,
//! so `#/$defs/Thing` stays readable.

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use refio::path::{get_hash, strip_hash};

use crate::error::{Error, Result};

/// Characters percent-encoded inside a pointer token.
const TOKEN: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// A parsed `$ref` value: the document part (`None` for "this document") and
/// the unescaped pointer tokens (empty for the whole document).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefPointer {
    pub base: Option<String>,
    pub tokens: Vec<String>,
}

/// Split a raw `$ref` string into its document part and pointer tokens.
pub fn parse_ref(raw: &str) -> Result<RefPointer> {
    let base = strip_hash(raw);
    let tokens = parse(raw)?;
    Ok(RefPointer {
        base: if base.is_empty() {
            None
        } else {
            Some(base.to_string())
        },
        tokens,
    })
}

/// Pointer tokens of the fragment of `path` (a URL or a bare `#...` string).
/// Fails when the fragment is non-empty and does not start with `/`.
pub fn parse(path: &str) -> Result<Vec<String>> {
    let pointer = &get_hash(path)[1..];
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let mut split = pointer.split('/');
    if split.next() != Some("") {
        return Err(Error::InvalidPointer {
            pointer: get_hash(path).to_string(),
        });
    }
    Ok(split.map(decode_token).collect())
}

/// Tokens of a pointer, or an empty path when the pointer is malformed.
pub fn to_path(path: &str) -> Vec<String> {
    parse(path).unwrap_or_default()
}

/// Append tokens to a URL or pointer string, adding `#` when missing.
pub fn join<S: AsRef<str>>(base: &str, tokens: &[S]) -> String {
    let mut out = base.to_string();
    if !out.contains('#') {
        out.push('#');
    }
    for token in tokens {
        out.push('/');
        out.push_str(&encode_token(token.as_ref()));
    }
    out
}

/// `#` followed by the escaped tokens, e.g. `#/definitions/required%20string`.
pub fn format_pointer<S: AsRef<str>>(tokens: &[S]) -> String {
    join("#", tokens)
}

pub fn encode_token(token: &str) -> String {
    let escaped = token.replace('~', "~0").replace('/', "~1");
    utf8_percent_encode(&escaped, TOKEN).to_string()
}

pub fn decode_token(token: &str) -> String {
    let decoded = percent_decode_str(token).decode_utf8_lossy();
    decoded.replace("~1", "/").replace("~0", "~")
}

/// Whether the fragment of a `$ref` holds a percent-escape that
/// [`format_pointer`] would write differently, such as `%24` for `$`.
pub fn has_needless_escapes(raw: &str) -> bool {
    let hash = get_hash(raw);
    hash.match_indices('%').any(|(index, _)| {
        let Some(escape) = hash.get(index..index + 3) else {
            return false;
        };
        let Ok(byte) = u8::from_str_radix(&escape[1..], 16) else {
            return false;
        };
        byte.is_ascii() && !encode_token(&char::from(byte).to_string()).eq_ignore_ascii_case(escape)
    })
}

/// A comparable form of `url#pointer`: same document and same tokens give the
/// same string regardless of how the fragment was escaped.
pub fn canonical(path: &str) -> String {
    match parse(path) {
        Ok(tokens) => join(strip_hash(path), &tokens),
        Err(_) => path.to_string(),
    }
}

pub fn same_location(a: &str, b: &str) -> bool {
    canonical(a) == canonical(b)
}

pub fn is_root_pointer(path: &str) -> bool {
    let hash = get_hash(path);
    hash == "#" || hash == "#/"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needless_escapes() {
        assert!(has_needless_escapes("#/definitions/%24foo"));
        assert!(has_needless_escapes("#/a%2Fb"));
        assert!(!has_needless_escapes("#/paths/~1pets~1{id}"));
        assert!(!has_needless_escapes("#/paths/~1pets~1%7Bid%7D"));
        assert!(!has_needless_escapes("#/definitions/required%20string"));
        assert!(!has_needless_escapes("#/100%"));
    }

    #[test]
    fn parse_handles_escapes() {
        assert_eq!(parse("#").unwrap(), Vec::<String>::new());
        assert_eq!(parse("file:///a.json").unwrap(), Vec::<String>::new());
        assert_eq!(
            parse("#/a~1b/c~0d/e%20f").unwrap(),
            vec!["a/b".to_string(), "c~d".to_string(), "e f".to_string()]
        );
        assert_eq!(parse("#/").unwrap(), vec![String::new()]);
    }

    #[test]
    fn parse_rejects_non_slash_fragment() {
        let err = parse("schema.json#definitions/a").unwrap_err();
        assert_eq!(err.name(), "InvalidPointerError");
        assert_eq!(
            err.to_string(),
            "Invalid $ref pointer \"#definitions/a\". Pointers must begin with \"#/\""
        );
    }

    #[test]
    fn format_keeps_dollar_and_escapes_space() {
        assert_eq!(
            format_pointer(&["definitions", "required string"]),
            "#/definitions/required%20string"
        );
        assert_eq!(format_pointer(&["$defs", "a/b", "~x"]), "#/$defs/a~1b/~0x");
        assert_eq!(format_pointer::<&str>(&[]), "#");
    }

    #[test]
    fn join_appends_to_urls() {
        assert_eq!(join("file:///a.json", &["x"]), "file:///a.json#/x");
        assert_eq!(join("file:///a.json#/x", &["y", "z"]), "file:///a.json#/x/y/z");
    }

    #[test]
    fn canonical_ignores_escaping_differences() {
        assert!(same_location("file:///a.json#/%24defs/a", "file:///a.json#/$defs/a"));
        assert!(!same_location("file:///a.json#/a", "file:///b.json#/a"));
    }

    #[test]
    fn parse_ref_splits_base() {
        let parsed = parse_ref("other.yaml#/definitions/x").unwrap();
        assert_eq!(parsed.base.as_deref(), Some("other.yaml"));
        assert_eq!(parsed.tokens, vec!["definitions", "x"]);
        let parsed = parse_ref("#/definitions/x").unwrap();
        assert_eq!(parsed.base, None);
    }
}
