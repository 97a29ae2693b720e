//! Context engine: turns stored persona state into prompts and drives chat turns.

pub mod prompt_builder;
pub mod orchestrator;

pub use prompt_builder::{build_prompt, HISTORY_WINDOW};
pub use orchestrator::{
    ChatOrchestrator, ChatReply, OrchestratorConfig, TurnOutcome, PERSONA_MISSING_REPLY,
};

/// Orchestrator configured from process settings.
pub fn create_orchestrator(
    store: std::sync::Arc<dyn crate::store::ChatStore>,
    model: std::sync::Arc<dyn crate::llm::LanguageModel>,
    config: &crate::config::Config,
) -> ChatOrchestrator {
    let orchestrator_config = OrchestratorConfig {
        serialize_user_turns: config.serialize_user_turns,
    };
    ChatOrchestrator::with_config(store, model, orchestrator_config)
}
