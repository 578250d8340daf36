//! Closed set of tool kinds the resumption messages know how to restate.

use serde_json::Value;

const GENERIC_PARAMETERS_MAX_CHARS: usize = 500;

/// Tool call parameters, classified by tool name.
///
/// A known name whose input lacks the fields its restatement needs falls
/// back to [`ToolKind::Other`].
#[derive(Debug, Clone, PartialEq)]
pub enum ToolKind<'a> {
    WriteFile {
        file_path: &'a str,
    },
    EditFile {
        file_path: &'a str,
        replacement: Option<(&'a str, &'a str)>,
    },
    Bash {
        command: &'a str,
    },
    WebFetch {
        url: &'a str,
    },
    WebSearch {
        query: &'a str,
    },
    Other {
        name: &'a str,
        input: &'a Value,
    },
}

impl<'a> ToolKind<'a> {
    #[must_use]
    pub fn classify(name: &'a str, input: &'a Value) -> Self {
        let field = move |key: &str| input.get(key).and_then(Value::as_str);
        let other = Self::Other { name, input };

        match name {
            "Write" => field("file_path").map_or(other, |file_path| Self::WriteFile { file_path }),
            "Edit" => match field("file_path") {
                Some(file_path) => Self::EditFile {
                    file_path,
                    replacement: field("old_string")
                        .filter(|old| !old.is_empty())
                        .map(|old| (old, field("new_string").unwrap_or_default())),
                },
                None => other,
            },
            "Bash" => field("command").map_or(other, |command| Self::Bash { command }),
            "WebFetch" => field("url").map_or(other, |url| Self::WebFetch { url }),
            "WebSearch" => field("query").map_or(other, |query| Self::WebSearch { query }),
            _ => other,
        }
    }

    /// Natural-language restatement of the call, used to re-issue it after approval.
    #[must_use]
    pub fn restate(&self) -> String {
        match self {
            Self::WriteFile { file_path } => format!(
                "Create the file \"{file_path}\" with exactly the same content you were going to write. Do it now."
            ),
            Self::EditFile {
                file_path,
                replacement: Some((old, new)),
            } => format!("Edit the file \"{file_path}\". Replace:\n{old}\nWith:\n{new}"),
            Self::EditFile {
                file_path,
                replacement: None,
            } => format!("Edit the file \"{file_path}\". Apply the change you were going to make."),
            Self::Bash { command } => format!("Run this command:\n{command}"),
            Self::WebFetch { url } => format!("Fetch: {url}"),
            Self::WebSearch { query } => format!("Search: {query}"),
            Self::Other { name, input } => {
                let mut details = format!("Use {name} with the parameters you had planned.");
                if input.as_object().is_some_and(|object| !object.is_empty()) {
                    details.push_str("\nParameters: ");
                    details.push_str(&truncate_chars(
                        &input.to_string(),
                        GENERIC_PARAMETERS_MAX_CHARS,
                    ));
                }
                details
            }
        }
    }
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cutoff, _)) => text[..cutoff].to_string(),
        None => text.to_string(),
    }
}
