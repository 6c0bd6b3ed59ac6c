//! Common types used across the platform

use serde::{Deserialize, Deserializer};

/// Collapse `None`, `""` and whitespace-only strings into `None`.
///
/// Forms submit empty strings for untouched optional fields; everything past
/// the API boundary only ever sees `Option<String>`.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == v.len() {
            Some(v)
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Serde adapter for optional text fields, use with
/// `#[serde(default, deserialize_with = "deserialize_non_blank")]`
pub fn deserialize_non_blank<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(non_blank)
}

/// Serde adapter for optional identifiers; `""` reads as absent
pub fn deserialize_optional_uuid<'de, D>(deserializer: D) -> Result<Option<uuid::Uuid>, D::Error>
where
    D: Deserializer<'de>,
{
    match deserialize_non_blank(deserializer)? {
        None => Ok(None),
        Some(raw) => uuid::Uuid::parse_str(&raw)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Serde adapter for patch fields that can be cleared, use with
/// `#[serde(default, deserialize_with = "deserialize_clearable")]`.
///
/// Absent reads as `None` (leave unchanged), `null` as `Some(None)` (clear).
pub fn deserialize_clearable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Text variant of [`deserialize_clearable`]; `""` clears like `null`
pub fn deserialize_clearable_text<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_non_blank(deserializer).map(Some)
}

/// Short, human-friendly prefix of an identifier for file names
pub fn short_id(id: &uuid::Uuid) -> String {
    id.simple().to_string()[..8].to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Form {
        #[serde(default, deserialize_with = "deserialize_non_blank")]
        observacoes: Option<String>,
    }

    #[derive(Deserialize)]
    struct Origin {
        #[serde(default, deserialize_with = "deserialize_optional_uuid")]
        armazem_origem_id: Option<uuid::Uuid>,
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some(String::new())), None);
        assert_eq!(non_blank(Some("   ".to_string())), None);
        assert_eq!(non_blank(Some(" V848 ".to_string())), Some("V848".to_string()));
        assert_eq!(non_blank(Some("E".to_string())), Some("E".to_string()));
    }

    #[test]
    fn test_deserialize_non_blank() {
        let f: Form = serde_json::from_str(r#"{"observacoes": ""}"#).unwrap();
        assert_eq!(f.observacoes, None);
        let f: Form = serde_json::from_str(r#"{"observacoes": null}"#).unwrap();
        assert_eq!(f.observacoes, None);
        let f: Form = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(f.observacoes, None);
        let f: Form = serde_json::from_str(r#"{"observacoes": "urgente"}"#).unwrap();
        assert_eq!(f.observacoes.as_deref(), Some("urgente"));
    }

    #[test]
    fn test_deserialize_optional_uuid() {
        let o: Origin = serde_json::from_str(r#"{"armazem_origem_id": ""}"#).unwrap();
        assert_eq!(o.armazem_origem_id, None);
        let o: Origin = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(o.armazem_origem_id, None);
        let o: Origin =
            serde_json::from_str(r#"{"armazem_origem_id": "3f2a9c1e-0000-4000-8000-000000000000"}"#)
                .unwrap();
        assert!(o.armazem_origem_id.is_some());
        assert!(serde_json::from_str::<Origin>(r#"{"armazem_origem_id": "V848"}"#).is_err());
    }

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "deserialize_clearable_text")]
        familia: Option<Option<String>>,
        #[serde(default, deserialize_with = "deserialize_clearable")]
        peso: Option<Option<f64>>,
    }

    #[test]
    fn test_deserialize_clearable() {
        let p: Patch = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(p.familia, None);
        assert_eq!(p.peso, None);

        let p: Patch = serde_json::from_str(r#"{"familia": null, "peso": null}"#).unwrap();
        assert_eq!(p.familia, Some(None));
        assert_eq!(p.peso, Some(None));

        let p: Patch = serde_json::from_str(r#"{"familia": "  ", "peso": 2.5}"#).unwrap();
        assert_eq!(p.familia, Some(None));
        assert_eq!(p.peso, Some(Some(2.5)));

        let p: Patch = serde_json::from_str(r#"{"familia": "Cabos"}"#).unwrap();
        assert_eq!(p.familia, Some(Some("Cabos".to_string())));
    }

    #[test]
    fn test_short_id() {
        let id = uuid::Uuid::parse_str("3f2a9c1e-0000-4000-8000-000000000000").unwrap();
        assert_eq!(short_id(&id), "3F2A9C1E");
    }
}
