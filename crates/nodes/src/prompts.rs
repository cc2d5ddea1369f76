//! Prompt construction for each agent role.
//!
//! Prompts are rendered deterministically from the [`AgentTask`]: a
//! role-specific system prompt, then the task instructions, then every
//! payload entry as a titled section in key order. Every prompt ends with the
//! JSON fields the response must contain, which are the same fields
//! [`pipeline::AgentOutput::from_value`] checks.

use pipeline::{AgentRole, AgentTask, EditPass, TaskType, WriterMode};
use serde_json::Value;

/// A rendered prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Sampling temperature for a role. Creative roles run warmer than judging roles.
pub fn temperature(role: AgentRole) -> f32 {
    match role {
        AgentRole::Director => 0.7,
        AgentRole::Writer(_) => 0.8,
        AgentRole::Editor(_) => 0.3,
        AgentRole::Critic => 0.2,
        AgentRole::Summarizer => 0.3,
    }
}

pub fn system_prompt(role: AgentRole) -> String {
    let base = match role {
        AgentRole::Director => {
            "You are the director of a novel-writing team. You decide the book's vision, \
             structure and chapter plan, and you keep every chapter faithful to them."
        }
        AgentRole::Writer(WriterMode::Narrative) => {
            "You are a novelist. You write vivid, coherent narrative prose that advances \
             the plot and stays consistent with the story bible."
        }
        AgentRole::Writer(WriterMode::Dialogue) => {
            "You are a novelist who specialises in dialogue. You carry scenes through \
             natural, character-specific conversation."
        }
        AgentRole::Writer(WriterMode::Description) => {
            "You are a novelist who specialises in description. You render settings, \
             atmosphere and sensory detail precisely."
        }
        AgentRole::Editor(EditPass::Grammar) => {
            "You are a copy editor. Fix grammar, spelling and punctuation only. \
             Do not change meaning, plot or voice."
        }
        AgentRole::Editor(EditPass::Style) => {
            "You are a line editor. Improve rhythm, clarity and word choice while \
             keeping the author's voice and every plot event."
        }
        AgentRole::Editor(EditPass::Continuity) => {
            "You are a continuity editor. Correct contradictions with the story bible \
             and earlier chapters. Change nothing else."
        }
        AgentRole::Critic => {
            "You are a demanding literary critic. You score chapters honestly on a \
             0 to 10 scale and give concrete, actionable feedback."
        }
        AgentRole::Summarizer => {
            "You compress fiction into faithful summaries that keep every plot event, \
             character change and unresolved thread."
        }
    };
    format!("{base}\nAlways answer with a single JSON object and nothing else.")
}

fn instructions(task: TaskType) -> &'static str {
    match task {
        TaskType::PlanProject => {
            "Write a vision document for this book: themes, tone, main characters, \
             central conflict and how it resolves."
        }
        TaskType::CreateOutline => {
            "Write a chapter-by-chapter outline covering exactly `target_chapters` chapters. \
             Also return `chapters`: a list of objects with `number`, `title` and `synopsis`."
        }
        TaskType::WriteChapter => {
            "Write the chapter described by `outline`. Continue seamlessly from the \
             preceding context and aim for about `target_word_count` words."
        }
        TaskType::ReviseChapter => {
            "Rewrite `previous_content` so that it addresses every point in `feedback`. \
             Keep what already works."
        }
        TaskType::EditChapter => "Apply your editing pass to `content` and return the full edited text.",
        TaskType::EvaluateChapter => {
            "Score `content` on each dimension in `dimensions` with an integer from 0 to 10. \
             Return the scores as `scores`, overall `feedback`, and optionally a list of \
             concrete `suggestions`."
        }
        TaskType::SummarizeRange => {
            "Summarize `text` in about `target_words` words, in chronological order."
        }
        TaskType::MetaSummarize => {
            "Merge the consecutive `summaries` into one summary of about `target_words` \
             words, in chronological order."
        }
    }
}

/// Renders the prompt pair for `task`.
pub fn render(task: &AgentTask) -> Prompt {
    let mut user = format!("# Task: {}\n\n{}\n", task.task_type, instructions(task.task_type));

    let mut keys: Vec<&String> = task.payload.keys().collect();
    keys.sort();
    for key in keys {
        let rendered = match &task.payload[key.as_str()] {
            Value::String(text) => text.clone(),
            Value::Array(items) if items.iter().all(Value::is_string) => items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("\n\n"),
            other => other.to_string(),
        };
        user.push_str(&format!("\n## {key}\n\n{rendered}\n"));
    }

    let fields: Vec<String> = task
        .task_type
        .required_fields()
        .iter()
        .map(|f| format!("`{f}`"))
        .collect();
    user.push_str(&format!(
        "\nRespond with a JSON object containing: {}.\n",
        fields.join(", ")
    ));

    Prompt {
        system: system_prompt(task.role),
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_required_fields_and_sorted_payload() {
        let task = AgentTask::new(AgentRole::Critic, TaskType::EvaluateChapter)
            .with("content", "Once upon a time.")
            .with("chapter_number", 4);

        let prompt = render(&task);

        let chapter_at = prompt.user.find("## chapter_number").unwrap();
        let content_at = prompt.user.find("## content").unwrap();
        assert!(chapter_at < content_at);
        assert!(prompt.user.contains("`scores`, `feedback`"));
        assert!(prompt.system.contains("critic"));
    }

    #[test]
    fn test_judging_roles_run_cooler_than_writers() {
        assert!(temperature(AgentRole::Critic) < temperature(AgentRole::Writer(WriterMode::Narrative)));
        assert!(temperature(AgentRole::Editor(EditPass::Grammar)) < temperature(AgentRole::Director));
    }
}
