/// A selectable model: user-visible display name plus API identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelChoice {
    pub display_name: String,
    pub api_id: String,
}

/// The table of models offered to users.
#[derive(Clone, Debug)]
pub struct ModelTable {
    entries: Vec<ModelChoice>,
}

impl ModelTable {
    pub fn builtin() -> Self {
        let entries = [
            ("2.5 Flash", "gemini-2.5-flash"),
            ("2.5 Pro", "gemini-2.5-pro"),
            ("3.0 Flash", "gemini-3-flash-preview"),
        ]
        .into_iter()
        .map(|(display, api)| ModelChoice {
            display_name: display.to_string(),
            api_id: api.to_string(),
        })
        .collect();

        Self { entries }
    }

    pub fn api_id(&self, display_name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|m| m.display_name == display_name)
            .map(|m| m.api_id.as_str())
    }

    /// Reverse lookup for footers; falls back to the raw id when unknown.
    pub fn display_name<'a>(&'a self, api_id: &'a str) -> &'a str {
        self.entries
            .iter()
            .find(|m| m.api_id == api_id)
            .map(|m| m.display_name.as_str())
            .unwrap_or(api_id)
    }

    pub fn choices(&self) -> &[ModelChoice] {
        &self.entries
    }

    pub fn get(&self, display_name: &str) -> Option<&ModelChoice> {
        self.entries.iter().find(|m| m.display_name == display_name)
    }
}

/// Normalized request for a single generation call.
#[derive(Clone, Debug)]
pub struct GenerateRequest {
    pub model_api_id: String,
    pub prompt: String,
    pub system_instruction: Option<String>,
}

/// Every generation call resolves to exactly one of these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// The service produced text.
    Answered { text: String },
    /// The service refused due to its safety policy.
    Blocked { reason: Option<String> },
    /// The service returned no candidates and no block signal.
    Empty,
}

/// Coarse classification of an invocation failure.
///
/// Picks the wording of the single apologetic user message and the log
/// fields; never changes control flow (no retry).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvocationErrorKind {
    Credentials,
    Quota,
    Transient,
    Unknown,
}

#[derive(Debug, thiserror::Error)]
#[error("model invocation failed ({kind:?}): {detail}")]
pub struct InvocationError {
    pub kind: InvocationErrorKind,
    pub detail: String,
}

impl InvocationError {
    pub fn new(kind: InvocationErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_round_trips() {
        let table = ModelTable::builtin();
        assert_eq!(table.api_id("2.5 Pro"), Some("gemini-2.5-pro"));
        assert_eq!(table.display_name("gemini-2.5-pro"), "2.5 Pro");
        assert_eq!(table.display_name("gemini-unknown"), "gemini-unknown");
        assert!(table.api_id("9.9 Ultra").is_none());
    }
}
