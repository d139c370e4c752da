//! Content categorization
//!
//! Classifies entry text into a fixed taxonomy so token cost can be
//! attributed to a functional source (user text, system prompt, tool
//! traffic, project instructions). Rules are evaluated in order and the
//! first match wins; the function is pure and deterministic.

use crate::models::EntryKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed taxonomy of content sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    UserMessages,
    AssistantMessages,
    SystemPrompts,
    ClaudeMd,
    McpTools,
    SystemTools,
    Uncategorized,
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentCategory::UserMessages => "user_messages",
            ContentCategory::AssistantMessages => "assistant_messages",
            ContentCategory::SystemPrompts => "system_prompts",
            ContentCategory::ClaudeMd => "claude_md",
            ContentCategory::McpTools => "mcp_tools",
            ContentCategory::SystemTools => "system_tools",
            ContentCategory::Uncategorized => "uncategorized",
        };
        f.write_str(name)
    }
}

/// Markers injected by the harness around system content.
const SYSTEM_MARKERS: &[&str] = &[
    "<system-reminder>",
    "<command-name>",
    "<command-message>",
    "<local-command-stdout>",
    "[request interrupted",
    "caveat: the messages below",
];

/// Boilerplate that identifies project-instruction / assistant-identity text.
const CLAUDE_MD_MARKERS: &[&str] = &[
    "claude.md",
    "claudemd",
    "you are claude",
    "codebase and user instructions",
];

/// Generic tool-invocation framing.
const TOOL_MARKERS: &[&str] = &[
    "tool_use",
    "tool_result",
    "<function_calls>",
    "function_results",
];

/// Classify `text` into a [`ContentCategory`]. Ordered rules, first match
/// wins; falls through to the entry's role.
pub fn categorize(text: &str, kind: EntryKind) -> ContentCategory {
    if text.is_empty() {
        return ContentCategory::Uncategorized;
    }

    let lower = text.to_lowercase();

    if SYSTEM_MARKERS.iter().any(|m| lower.contains(m)) {
        return ContentCategory::SystemPrompts;
    }
    if CLAUDE_MD_MARKERS.iter().any(|m| lower.contains(m)) {
        return ContentCategory::ClaudeMd;
    }
    if lower.contains("mcp__") {
        return ContentCategory::McpTools;
    }
    if TOOL_MARKERS.iter().any(|m| lower.contains(m)) {
        return ContentCategory::SystemTools;
    }

    match kind {
        EntryKind::User => ContentCategory::UserMessages,
        EntryKind::Assistant => ContentCategory::AssistantMessages,
        _ => ContentCategory::Uncategorized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_is_uncategorized() {
        assert_eq!(categorize("", EntryKind::User), ContentCategory::Uncategorized);
    }

    #[test]
    fn test_system_markers_win_over_role() {
        assert_eq!(
            categorize("<system-reminder>do the thing</system-reminder>", EntryKind::User),
            ContentCategory::SystemPrompts
        );
        assert_eq!(
            categorize("Caveat: the messages below were generated...", EntryKind::User),
            ContentCategory::SystemPrompts
        );
    }

    #[test]
    fn test_claude_md_detection() {
        assert_eq!(
            categorize("Contents of CLAUDE.md:\n# Project notes", EntryKind::User),
            ContentCategory::ClaudeMd
        );
        assert_eq!(
            categorize("You are Claude, an AI assistant", EntryKind::System),
            ContentCategory::ClaudeMd
        );
    }

    #[test]
    fn test_mcp_namespace() {
        assert_eq!(
            categorize("calling mcp__github__list_issues", EntryKind::Assistant),
            ContentCategory::McpTools
        );
    }

    #[test]
    fn test_generic_tool_framing() {
        assert_eq!(
            categorize("tool_use Bash {\"command\":\"ls\"}", EntryKind::Assistant),
            ContentCategory::SystemTools
        );
    }

    #[test]
    fn test_role_fallback() {
        assert_eq!(
            categorize("please fix the bug", EntryKind::User),
            ContentCategory::UserMessages
        );
        assert_eq!(
            categorize("here is the fix", EntryKind::Assistant),
            ContentCategory::AssistantMessages
        );
        assert_eq!(
            categorize("some text", EntryKind::Other),
            ContentCategory::Uncategorized
        );
    }

    #[test]
    fn test_deterministic() {
        let text = "mcp__server__tool and tool_use together";
        let first = categorize(text, EntryKind::User);
        for _ in 0..10 {
            assert_eq!(categorize(text, EntryKind::User), first);
        }
        // mcp rule is evaluated before generic tool framing
        assert_eq!(first, ContentCategory::McpTools);
    }
}
