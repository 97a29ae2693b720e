//! Renders a persona, recent history and memory facts into one prompt.
//!
//! Section order is fixed: system block, likes, dislikes, memory, history,
//! task. Likes, dislikes and memory are omitted entirely when empty.

use std::fmt::Write;

use crate::chat_db::schema::{MemoryEntry, Persona, Sender, StoredMessage};

/// Number of most recent messages rendered into the history block.
pub const HISTORY_WINDOW: usize = 10;

pub const MEMORY_HEADER: &str = "Memory:";
pub const HISTORY_HEADER: &str = "Conversation History:";

const RULES: [&str; 5] = [
    "Be emotionally supportive",
    "Stay in character",
    "Do not mention you are an AI unless asked",
    "Respond naturally and emotionally",
    "Keep responses conversational and not too long",
];

/// `history` must be in ascending creation order; only its tail is used.
pub fn build_prompt(persona: &Persona, history: &[StoredMessage], memories: &[MemoryEntry]) -> String {
    let mut sections: Vec<String> = Vec::with_capacity(6);

    let mut system = format!(
        "SYSTEM:\nYou are acting as a virtual {} AI.\n\n\
         Persona:\nName: {}\nPersonality: {}\nTone: {}\n\nRules:",
        persona.role, persona.name, persona.personality, persona.tone
    );
    for rule in RULES {
        let _ = write!(system, "\n- {}", rule);
    }
    sections.push(system);

    if let Some(likes) = persona.likes() {
        sections.push(format!("Likes: {}", likes));
    }
    if let Some(dislikes) = persona.dislikes() {
        sections.push(format!("Dislikes: {}", dislikes));
    }

    if !memories.is_empty() {
        let mut block = String::from(MEMORY_HEADER);
        for memory in memories {
            let _ = write!(block, "\n{}: {}", memory.key, memory.value);
        }
        sections.push(block);
    }

    let mut block = String::from(HISTORY_HEADER);
    for message in recent_window(history) {
        let label = match message.sender {
            Sender::User => "User",
            Sender::Ai => persona.name.as_str(),
        };
        let _ = write!(block, "\n{}: {}", label, message.message);
    }
    sections.push(block);

    sections.push(format!(
        "TASK:\nReply naturally as {} would, based on the personality and tone described above.",
        persona.name
    ));

    let mut prompt = sections.join("\n\n");
    prompt.push('\n');
    prompt
}

fn recent_window(history: &[StoredMessage]) -> &[StoredMessage] {
    &history[history.len().saturating_sub(HISTORY_WINDOW)..]
}
