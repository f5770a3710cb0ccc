use std::sync::LazyLock;

use axum::body::Bytes;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use catalog::Document;

use crate::{error::AppError, query::options::ID_FIELD};

static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s_]+").unwrap());
static UNSAFE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9-]").unwrap());
static DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").unwrap());

/// URL-safe form of a name: `"Devworks Bootcamp!"` becomes `devworks-bootcamp`.
pub fn slugify(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let dashed = SEPARATORS.replace_all(&lowered, "-");
    let cleaned = UNSAFE.replace_all(&dashed, "");

    DASHES
        .replace_all(&cleaned, "-")
        .trim_matches('-')
        .to_string()
}

pub fn parse_payload<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| AppError::MalformedPayload(e.to_string()))
}

/// Update bodies are partial documents. Changing the identifier is refused.
pub fn parse_changes(body: &Bytes, id: &str) -> Result<Document, AppError> {
    let changes: Document = parse_payload(body)?;

    match changes.get(ID_FIELD) {
        Some(Value::String(given)) if given == id => Ok(changes),
        Some(_) => Err(AppError::MalformedPayload(format!(
            "{ID_FIELD} cannot be changed"
        ))),
        None => Ok(changes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        assert_eq!(slugify("Devworks Bootcamp"), "devworks-bootcamp");
        assert_eq!(slugify("ModernTech_Bootcamp"), "moderntech-bootcamp");
        assert_eq!(slugify("Codemasters!"), "codemasters");
    }

    #[test]
    fn test_leading_trailing_spaces() {
        assert_eq!(slugify("   hello   "), "hello");
        assert_eq!(slugify("  multiple   spaces  "), "multiple-spaces");
    }

    #[test]
    fn test_special_characters() {
        assert_eq!(slugify("!@#$%^&*()"), "");
        assert_eq!(slugify("UI / UX - Academy"), "ui-ux-academy");
    }

    #[test]
    fn test_parse_changes() {
        let body = Bytes::from_static(br#"{"title": "New title"}"#);
        assert_eq!(parse_changes(&body, "c1").unwrap()["title"], "New title");

        let same = Bytes::from_static(br#"{"_id": "c1", "weeks": "6"}"#);
        assert!(parse_changes(&same, "c1").is_ok());

        let moved = Bytes::from_static(br#"{"_id": "c2"}"#);
        assert!(matches!(
            parse_changes(&moved, "c1"),
            Err(AppError::MalformedPayload(_))
        ));

        let garbage = Bytes::from_static(b"[1, 2]");
        assert!(parse_changes(&garbage, "c1").is_err());
    }
}
