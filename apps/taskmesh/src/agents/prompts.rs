// Prompt templates for LLM interactions
//
// This module contains all prompt templates used by the agent system.
// Prompts are versioned so stored iterations can be traced back to them.

use std::collections::HashMap;

/// Prompt template structure
pub struct PromptTemplate {
    pub name: String,
    pub version: String,
    pub system: String,
    pub user_template: String,
}

impl PromptTemplate {
    /// Render the user template, replacing `{{name}}` placeholders
    ///
    /// Placeholders without a matching variable are left untouched.
    pub fn render(&self, variables: &HashMap<String, String>) -> String {
        render_placeholders(&self.user_template, variables)
    }

    /// Render with variables given as pairs
    pub fn render_with(&self, variables: &[(&str, &str)]) -> String {
        let variables = variables
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.render(&variables)
    }
}

fn render_placeholders(template: &str, variables: &HashMap<String, String>) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match variables.get(key) {
                    Some(value) => rendered.push_str(value),
                    None => rendered.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                rendered.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    rendered.push_str(rest);
    rendered
}

pub mod library {
    use super::PromptTemplate;

    /// Breaks a main task into a JSON array of subtasks
    pub fn task_decomposition() -> PromptTemplate {
        PromptTemplate {
            name: "task_decomposition".to_string(),
            version: "1.1.0".to_string(),
            system: "You are an expert project planner. Given a user task, break it down into 2-6 \
                     clear, actionable subtasks. Return only a JSON list of strings, each string \
                     being a subtask. Do not include any explanation, markdown, or extra text. \
                     Output ONLY a valid JSON array, e.g. [\"Subtask 1\", \"Subtask 2\"]"
                .to_string(),
            user_template: "{{task}}".to_string(),
        }
    }

    /// Appended to the decomposition system prompt on retry attempts
    pub const DECOMPOSITION_CORRECTION: &str =
        "Previous output was not valid JSON. Please output ONLY a valid JSON array, no extra text.";

    /// Drives one worker iteration
    pub fn worker_iteration() -> PromptTemplate {
        PromptTemplate {
            name: "worker_iteration".to_string(),
            version: "1.0.0".to_string(),
            system: "You are an AI agent working iteratively on one subtask of a larger task. \
                     Keep going until the subtask is fully done, then call the task_completed \
                     tool or state that the task is completed. To message another agent, start \
                     your reply with @<agent name>: followed by the message. \
                     Do not ask for user input unless it is absolutely necessary."
                .to_string(),
            user_template: "Previous result: {{previous}}".to_string(),
        }
    }

    /// Manager's notice listing a worker's subtasks
    pub fn assignment_notice() -> PromptTemplate {
        PromptTemplate {
            name: "assignment_notice".to_string(),
            version: "1.0.0".to_string(),
            system: String::new(),
            user_template: "You are assigned the following minimal tasks:\n{{subtasks}}".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_known_variables() {
        let template = library::worker_iteration();
        let rendered = template.render_with(&[("previous", "42 files scanned")]);
        assert_eq!(rendered, "Previous result: 42 files scanned");
    }

    #[test]
    fn render_keeps_unknown_and_unterminated_placeholders() {
        let template = PromptTemplate {
            name: "t".into(),
            version: "0".into(),
            system: String::new(),
            user_template: "{{ a }} and {{b}} then {{open".into(),
        };
        let rendered = template.render_with(&[("a", "x")]);
        assert_eq!(rendered, "x and {{b}} then {{open");
    }

    #[test]
    fn decomposition_prompt_demands_json() {
        let template = library::task_decomposition();
        assert!(template.system.contains("JSON array"));
        assert_eq!(template.render_with(&[("task", "Ship it")]), "Ship it");
    }
}
