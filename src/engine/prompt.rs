use super::provider::{ChatPrompt, PromptMessage};
use crate::db::models::Episode;

/// Fixed response constraints for the wellness assistant.
pub const SYSTEM_INSTRUCTION: &str = "\
You are a warm, calm wellness companion for people who experience ectopic heartbeats \
(extra, skipped or early beats). Your role is emotional support and general, \
well-established lifestyle information only.

Rules:
- Never diagnose, never interpret ECGs or symptoms as a specific condition, and never \
suggest starting, stopping or changing medication.
- If the user mentions chest pain, fainting or near-fainting, severe shortness of breath, \
a racing heartbeat that does not settle, or confusion, tell them clearly and first to \
contact emergency services or seek urgent medical care now.
- Encourage discussing new, frequent or worsening episodes with their doctor.
- Keep answers short (under 150 words), kind and practical. Acknowledge feelings before \
giving information.
- You may refer to the user's logged episodes below to notice patterns, but describe them \
as observations, not conclusions.";

/// One line per episode, newest first, skipping empty fields.
pub fn summarize_episodes(episodes: &[Episode]) -> String {
    let mut out = String::new();
    for ep in episodes {
        let mut parts = vec![ep.occurred_at.clone()];
        if let Some(ref t) = ep.beat_type {
            parts.push(format!("type: {t}"));
        }
        if let Some(s) = ep.severity {
            parts.push(format!("severity: {s}/10"));
        }
        if let Some(ref s) = ep.symptoms {
            parts.push(format!("symptoms: {s}"));
        }
        if let Some(ref a) = ep.activity {
            parts.push(format!("activity: {a}"));
        }
        if let Some(ref n) = ep.notes {
            if !n.trim().is_empty() {
                parts.push(format!("notes: {}", n.trim()));
            }
        }
        out.push_str("- ");
        out.push_str(&parts.join("; "));
        out.push('\n');
    }
    out
}

/// Assemble the escalation prompt: system rules, optional episode context,
/// then the user's message.
pub fn build_chat_prompt(message: &str, episodes: &[Episode]) -> ChatPrompt {
    let mut system = String::from(SYSTEM_INSTRUCTION);
    if !episodes.is_empty() {
        system.push_str("\n\n## Recently logged episodes\n");
        system.push_str(&summarize_episodes(episodes));
    }

    ChatPrompt {
        messages: vec![PromptMessage::system(system), PromptMessage::user(message)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repos::episodes::fixture;
    use crate::engine::provider::PromptRole;

    #[test]
    fn test_prompt_without_history() {
        let prompt = build_chat_prompt("Why does my heart skip?", &[]);
        assert_eq!(prompt.messages.len(), 2);
        assert_eq!(prompt.messages[0].role, PromptRole::System);
        assert_eq!(prompt.messages[0].content, SYSTEM_INSTRUCTION);
        assert_eq!(prompt.messages[1], PromptMessage::user("Why does my heart skip?"));
    }

    #[test]
    fn test_prompt_includes_episode_lines() {
        let episodes = vec![
            fixture("u1", "2026-03-02T08:00:00Z", "after coffee"),
            fixture("u1", "2026-03-01T08:00:00Z", " "),
        ];
        let prompt = build_chat_prompt("hi", &episodes);
        let system = &prompt.messages[0].content;
        assert!(system.contains("## Recently logged episodes"));
        assert!(system.contains(
            "- 2026-03-02T08:00:00Z; type: PVC; severity: 4/10; symptoms: thud; activity: resting; notes: after coffee\n"
        ));
        // Blank notes are dropped.
        assert!(system.contains("- 2026-03-01T08:00:00Z; type: PVC; severity: 4/10; symptoms: thud; activity: resting\n"));
    }

    #[test]
    fn test_instruction_covers_safety_rules() {
        assert!(SYSTEM_INSTRUCTION.contains("emergency services"));
        assert!(SYSTEM_INSTRUCTION.contains("Never diagnose"));
    }
}
