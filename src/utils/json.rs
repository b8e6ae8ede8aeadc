use serde_json::Value;

/// A nullable text field in a partial update body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NullableText {
    Omitted,
    Null,
    Text(String),
}

impl NullableText {
    /// The value to store, or `None` when the field was not sent.
    pub fn into_update(self) -> Option<Option<String>> {
        match self {
            NullableText::Omitted => None,
            NullableText::Null => Some(None),
            NullableText::Text(text) => {
                let trimmed = text.trim();
                Some((!trimmed.is_empty()).then(|| trimmed.to_string()))
            }
        }
    }
}

pub fn classify_nullable(optional_value: Option<&Value>) -> Result<NullableText, String> {
    match optional_value {
        None => Ok(NullableText::Omitted),
        Some(Value::Null) => Ok(NullableText::Null),
        Some(Value::String(s)) => Ok(NullableText::Text(s.to_owned())),
        Some(other) => Err(format!("expected string or null, got {other}")),
    }
}

/// A required text field in a partial update body; `null` is refused.
pub fn optional_text(optional_value: Option<&Value>, field: &str) -> Result<Option<String>, String> {
    match optional_value {
        None => Ok(None),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(Some(s.trim().to_string())),
        Some(Value::String(_)) => Err(format!("{field} must not be empty")),
        Some(other) => Err(format!("{field}: expected string, got {other}")),
    }
}
