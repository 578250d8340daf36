//! Fixed model catalog with short aliases.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelEntry {
    pub alias: &'static str,
    pub id: &'static str,
    pub display_name: &'static str,
}

pub const MODELS: &[ModelEntry] = &[
    ModelEntry {
        alias: "sonnet",
        id: "claude-sonnet-4-5-20250929",
        display_name: "Sonnet 4.5",
    },
    ModelEntry {
        alias: "opus",
        id: "claude-opus-4-6",
        display_name: "Opus 4.6",
    },
    ModelEntry {
        alias: "haiku",
        id: "claude-haiku-4-5-20251001",
        display_name: "Haiku 4.5",
    },
];

pub const DEFAULT_MODEL_ALIAS: &str = "sonnet";

/// Resolves an alias (case-insensitive) or a catalog id.
#[must_use]
pub fn resolve_model(name: &str) -> Option<&'static ModelEntry> {
    let name = name.trim();
    MODELS
        .iter()
        .find(|entry| entry.alias.eq_ignore_ascii_case(name) || entry.id == name)
}

#[must_use]
pub fn default_model() -> &'static ModelEntry {
    &MODELS[0]
}

#[must_use]
pub fn alias_list() -> String {
    MODELS
        .iter()
        .map(|entry| entry.alias)
        .collect::<Vec<_>>()
        .join(", ")
}
