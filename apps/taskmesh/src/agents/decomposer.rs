use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{info, warn};

use super::errors::{AgentError, AgentResult};
use super::prompts::library;
use crate::llm::{ChatClient, ChatMessage};

/// Shortest sentence kept by the sentence-splitting fallback
const MIN_SENTENCE_CHARS: usize = 10;

/// Which parser produced a subtask list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseTier {
    /// A JSON array of strings
    Json,
    /// Numbered or bulleted list lines
    List,
    /// Sentences of free prose
    Sentences,
}

/// Turns one free-text task into an ordered list of subtasks
///
/// Models do not reliably return bare JSON, so the reply is run through
/// progressively looser parsers. If every attempt fails the main task
/// itself is returned as the only subtask; the result is never empty.
pub struct TaskDecomposer {
    client: Arc<dyn ChatClient>,
    model: String,
    max_attempts: usize,
}

impl TaskDecomposer {
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>, max_attempts: usize) -> Self {
        Self {
            client,
            model: model.into(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Decompose `main_task` into at least one subtask
    ///
    /// Only fatal capability errors (quota, authorization) are returned;
    /// every other failure uses up one attempt.
    pub async fn decompose(&self, main_task: &str) -> AgentResult<Vec<String>> {
        let template = library::task_decomposition();

        for attempt in 0..self.max_attempts {
            let mut system = template.system.clone();
            if attempt > 0 {
                system.push_str("\n\n");
                system.push_str(library::DECOMPOSITION_CORRECTION);
            }
            let messages = [
                ChatMessage::system(system),
                ChatMessage::user(template.render_with(&[("task", main_task)])),
            ];

            let reply = match self.client.chat(&self.model, &messages).await {
                Ok(reply) => reply,
                Err(e) if e.is_fatal() => return Err(AgentError::LlmError(e)),
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "Decomposition request failed");
                    continue;
                }
            };

            match parse_subtasks(&reply.content) {
                Some((tier, subtasks)) => {
                    if tier != ParseTier::Json {
                        warn!(
                            attempt = attempt + 1,
                            ?tier,
                            count = subtasks.len(),
                            "Model did not return a JSON list; recovered subtasks from raw text"
                        );
                    }
                    info!(count = subtasks.len(), "Task decomposed");
                    return Ok(subtasks);
                }
                None => warn!(
                    attempt = attempt + 1,
                    raw = %reply.content,
                    "Could not parse subtasks from model reply"
                ),
            }
        }

        warn!("Falling back to the main task as the only subtask");
        Ok(vec![main_task.to_string()])
    }
}

/// Runs the parser tiers in order, most structured first
pub fn parse_subtasks(content: &str) -> Option<(ParseTier, Vec<String>)> {
    if let Some(subtasks) = parse_json_array(content) {
        return Some((ParseTier::Json, subtasks));
    }
    let items = parse_list_items(content);
    if !items.is_empty() {
        return Some((ParseTier::List, items));
    }
    let sentences = split_sentences(content);
    if sentences.len() > 1 {
        return Some((ParseTier::Sentences, sentences));
    }
    None
}

/// Tier A: a non-empty JSON array of strings
///
/// Tries the whole reply, then a fenced code block, then the outermost
/// bracketed slice.
pub fn parse_json_array(content: &str) -> Option<Vec<String>> {
    let trimmed = content.trim();
    let mut candidates = vec![trimmed];
    if let Some(fenced) = fenced_block(trimmed) {
        candidates.push(fenced);
    }
    if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
        if start < end {
            candidates.push(&trimmed[start..=end]);
        }
    }

    candidates.into_iter().find_map(|candidate| {
        serde_json::from_str::<Vec<String>>(candidate)
            .ok()
            .filter(|items| !items.is_empty())
    })
}

fn fenced_block(content: &str) -> Option<&str> {
    let start = content.find("```")?;
    let body = &content[start + 3..];
    // Skip an info string such as `json`
    let body = &body[body.find('\n')? + 1..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

fn list_marker() -> &'static Regex {
    static LIST_MARKER_RE: OnceLock<Regex> = OnceLock::new();
    LIST_MARKER_RE.get_or_init(|| {
        Regex::new(r"^\s*(?:\d+\.|[-*])\s+(.*)$").expect("list marker pattern is valid")
    })
}

/// Tier B: `N.` numbered or `-` / `*` bulleted lines
pub fn parse_list_items(content: &str) -> Vec<String> {
    let pattern = list_marker();

    content
        .lines()
        .filter_map(|line| pattern.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|item| {
            item.as_str()
                .trim()
                .trim_matches('"')
                .trim_matches('\'')
                .trim()
                .to_string()
        })
        .filter(|item| !item.is_empty())
        .collect()
}

/// Tier C: sentences longer than ten characters
pub fn split_sentences(content: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = content.trim().chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let ends_sentence = matches!(c, '.' | '!' | '?')
            && chars.peek().map_or(false, |next| next.is_whitespace());
        if ends_sentence {
            sentences.push(std::mem::take(&mut current));
            while chars.peek().map_or(false, |next| next.is_whitespace()) {
                chars.next();
            }
        }
    }
    sentences.push(current);

    sentences
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_array_is_returned_exactly() {
        let parsed = parse_subtasks(r#"["Fetch the page", "Summarize headlines"]"#);
        assert_eq!(
            parsed,
            Some((
                ParseTier::Json,
                vec!["Fetch the page".to_string(), "Summarize headlines".to_string()]
            ))
        );
    }

    #[test]
    fn json_wins_over_bullets_in_the_same_reply() {
        let reply = "Here you go:\n- not this\n[\"A\", \"B\"]\n* nor this";
        let (tier, subtasks) = parse_subtasks(reply).unwrap();
        assert_eq!(tier, ParseTier::Json);
        assert_eq!(subtasks, vec!["A", "B"]);
    }

    #[test]
    fn fenced_json_is_accepted() {
        let reply = "```json\n[\"one\", \"two\"]\n```";
        assert_eq!(parse_json_array(reply), Some(vec!["one".into(), "two".into()]));
    }

    #[test]
    fn non_string_elements_fall_through() {
        assert_eq!(parse_json_array("[1, 2]"), None);
        assert_eq!(parse_json_array("[]"), None);
    }

    #[test]
    fn list_items_win_over_sentences() {
        let reply = "This plan has several parts. It is long enough to split.\n\
                     1. Download the dataset\n\
                     2. \"Clean the rows\"\n\
                     - 'Plot the results'";
        let (tier, subtasks) = parse_subtasks(reply).unwrap();
        assert_eq!(tier, ParseTier::List);
        assert_eq!(
            subtasks,
            vec!["Download the dataset", "Clean the rows", "Plot the results"]
        );
    }

    #[test]
    fn prose_is_split_into_sentences() {
        let reply = "First collect the logs from every host. Then look for repeated errors! Ok.";
        let (tier, subtasks) = parse_subtasks(reply).unwrap();
        assert_eq!(tier, ParseTier::Sentences);
        assert_eq!(
            subtasks,
            vec![
                "First collect the logs from every host.",
                "Then look for repeated errors!"
            ]
        );
    }

    #[test]
    fn single_sentence_or_empty_reply_is_unparseable() {
        assert_eq!(parse_subtasks("Just one long sentence here."), None);
        assert_eq!(parse_subtasks(""), None);
        assert_eq!(parse_subtasks("   "), None);
    }

    #[test]
    fn list_marker_is_compiled_once() {
        assert!(std::ptr::eq(list_marker(), list_marker()));
        assert_eq!(parse_list_items("* one\n10. two"), vec!["one", "two"]);
    }

    #[test]
    fn decimals_do_not_split_sentences() {
        let sentences = split_sentences("Version 1.5 shipped last week sadly. Upgrade all servers now.");
        assert_eq!(sentences.len(), 2);
    }
}
