use std::collections::BTreeMap;

use pct_str::{PctString, URIReserved, InvalidPctString, PctStr};

pub fn url_encode(s: &str) -> String {
    let p = PctString::encode(s.chars(), URIReserved);
    p.to_string()
}

// Owning the message keeps the error independent of the input's
// lifetime (and of pct_str in signatures).

#[derive(Debug, thiserror::Error)]
#[error("url decoding error: {0}")]
pub struct UrlDecodingError(Box<String>);

impl From<InvalidPctString<&str>> for UrlDecodingError {
    fn from(e: InvalidPctString<&str>) -> Self {
        Self(Box::new(format!("{}", e)))
    }
}

pub fn url_decode(s: &str) -> Result<String, UrlDecodingError> {
    let p = PctStr::new(s)?;
    Ok(p.decode())
}

/// Decode one `application/x-www-form-urlencoded` component (`+` is
/// a space).
pub fn form_decode(s: &str) -> Result<String, UrlDecodingError> {
    url_decode(&s.replace('+', " "))
}

/// Parse a query string (without the `?`). Later duplicates win,
/// keys without `=` get the empty string.
pub fn parse_query(query: &str) -> Result<BTreeMap<String, String>, UrlDecodingError> {
    let mut m = BTreeMap::new();
    for part in query.split('&').filter(|p| !p.is_empty()) {
        let (k, v) = part.split_once('=').unwrap_or((part, ""));
        m.insert(form_decode(k)?, form_decode(v)?);
    }
    Ok(m)
}
