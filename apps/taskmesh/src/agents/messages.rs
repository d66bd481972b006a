//! Agent message passing
//!
//! Every participant talks through one shared [`Mailbox`]: an append-only,
//! timestamp-ordered log guarded by a single lock. Reads never consume
//! messages; callers pass the last timestamp they have seen.

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Recipient address every participant receives
pub const BROADCAST: &str = "all";

/// Address of the supervising manager
pub const MANAGER: &str = "manager";

/// Per-iteration progress emitted by a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    /// Index of the subtask within the worker's queue
    pub subtask_index: usize,
    /// Iteration slot within the subtask
    pub iteration: usize,
    /// Conversation sent to the model, JSON encoded
    pub prompt: String,
    /// Set when the iteration was abandoned
    pub error: Option<String>,
}

/// What a message means to its recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    /// Free text between participants
    Chat,
    /// Worker-side failure or retry notice for the manager
    Notice,
    /// Iteration result under review
    Progress(ProgressReport),
    /// Manager approved the worker's subtask
    Approval { subtask_index: usize },
    /// Worker left a subtask
    SubtaskClosed { subtask_index: usize, completed: bool },
}

/// One entry of the mailbox log, immutable once appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    pub recipient: String,
    pub content: String,
    /// Seconds since the mailbox was created, strictly increasing
    pub timestamp: f64,
    pub kind: MessageKind,
}

impl Message {
    /// True when the message is addressed to `recipient` directly or by broadcast
    pub fn is_for(&self, recipient: &str) -> bool {
        self.recipient == recipient || self.recipient == BROADCAST
    }
}

struct MailboxLog {
    messages: Vec<Message>,
    last_timestamp: f64,
}

/// Shared, thread-safe message log
pub struct Mailbox {
    log: Mutex<MailboxLog>,
    origin: Instant,
    activity: Notify,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            log: Mutex::new(MailboxLog {
                messages: Vec::new(),
                last_timestamp: 0.0,
            }),
            origin: Instant::now(),
            activity: Notify::new(),
        }
    }

    /// Appends a chat message
    pub fn send(&self, sender: &str, recipient: &str, content: impl Into<String>) -> f64 {
        self.post(sender, recipient, content, MessageKind::Chat)
    }

    /// Appends a message of any kind and returns its timestamp
    pub fn post(
        &self,
        sender: &str,
        recipient: &str,
        content: impl Into<String>,
        kind: MessageKind,
    ) -> f64 {
        let timestamp = {
            let mut log = self.log.lock();
            let now = self.origin.elapsed().as_secs_f64();
            let timestamp = if now > log.last_timestamp {
                now
            } else {
                next_timestamp(log.last_timestamp)
            };
            log.last_timestamp = timestamp;
            log.messages.push(Message {
                sender: sender.to_string(),
                recipient: recipient.to_string(),
                content: content.into(),
                timestamp,
                kind,
            });
            timestamp
        };

        self.activity.notify_waiters();
        timestamp
    }

    /// All messages for `recipient` (or broadcast) newer than `since`, in send order
    pub fn receive(&self, recipient: &str, since: f64) -> Vec<Message> {
        let log = self.log.lock();
        log.messages
            .iter()
            .filter(|m| m.is_for(recipient) && m.timestamp > since)
            .cloned()
            .collect()
    }

    /// Like [`Mailbox::receive`], restricted to one sender
    pub fn receive_from(&self, recipient: &str, sender: &str, since: f64) -> Vec<Message> {
        let log = self.log.lock();
        log.messages
            .iter()
            .filter(|m| m.is_for(recipient) && m.sender == sender && m.timestamp > since)
            .cloned()
            .collect()
    }

    /// Waits for the next send, or until `timeout` elapses
    pub async fn wait_for_activity(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.activity.notified()).await;
    }

    pub fn len(&self) -> usize {
        self.log.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Smallest timestamp greater than `last`
///
/// Timestamps are non-negative and finite, so the next bit pattern is the
/// next representable value at any uptime.
fn next_timestamp(last: f64) -> f64 {
    f64::from_bits(last.to_bits() + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn receive_filters_by_recipient_and_broadcast() {
        let mailbox = Mailbox::new();
        mailbox.send("agent_1", "agent_2", "direct");
        mailbox.send("agent_1", "agent_3", "elsewhere");
        mailbox.send(MANAGER, BROADCAST, "everyone");

        let inbox: Vec<_> = mailbox
            .receive("agent_2", 0.0)
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(inbox, vec!["direct", "everyone"]);
    }

    #[test]
    fn since_excludes_seen_messages() {
        let mailbox = Mailbox::new();
        let first = mailbox.send("a", "b", "one");
        mailbox.send("a", "b", "two");

        let newer = mailbox.receive("b", first);
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].content, "two");
    }

    #[test]
    fn receive_is_idempotent() {
        let mailbox = Mailbox::new();
        mailbox.send("a", "b", "one");
        mailbox.send("a", "b", "two");

        assert_eq!(mailbox.receive("b", 0.0), mailbox.receive("b", 0.0));
        assert_eq!(mailbox.len(), 2);
    }

    #[test]
    fn timestamps_strictly_increase() {
        let mailbox = Mailbox::new();
        let stamps: Vec<f64> = (0..100).map(|i| mailbox.send("a", "b", i.to_string())).collect();
        assert!(stamps.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn timestamps_increase_after_long_uptime() {
        let mailbox = Mailbox::new();
        mailbox.log.lock().last_timestamp = 1e8;

        let first = mailbox.send("a", "b", "one");
        let second = mailbox.send("a", "b", "two");
        assert!(first > 1e8);
        assert!(second > first);
        assert_eq!(mailbox.receive("b", first).len(), 1);
    }

    #[test]
    fn next_timestamp_is_the_adjacent_value() {
        assert!(next_timestamp(0.0) > 0.0);
        assert!(next_timestamp(1e8) > 1e8);
        assert_eq!(next_timestamp(1e8) - 1e8, 1e8 - f64::from_bits(1e8f64.to_bits() - 1));
    }

    #[test]
    fn receive_from_restricts_sender() {
        let mailbox = Mailbox::new();
        mailbox.send("agent_1", MANAGER, "from one");
        mailbox.send("agent_2", MANAGER, "from two");

        let from_two = mailbox.receive_from(MANAGER, "agent_2", 0.0);
        assert_eq!(from_two.len(), 1);
        assert_eq!(from_two[0].sender, "agent_2");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sends_keep_per_sender_order() {
        let mailbox = Arc::new(Mailbox::new());
        let mut handles = Vec::new();
        for sender in 0..4 {
            let mailbox = mailbox.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    mailbox.send(&format!("agent_{sender}"), MANAGER, i.to_string());
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let all = mailbox.receive(MANAGER, 0.0);
        assert_eq!(all.len(), 200);
        assert!(all.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));
        for sender in 0..4 {
            let seq: Vec<usize> = all
                .iter()
                .filter(|m| m.sender == format!("agent_{sender}"))
                .map(|m| m.content.parse().unwrap())
                .collect();
            assert_eq!(seq, (0..50).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn wait_for_activity_wakes_on_send() {
        let mailbox = Arc::new(Mailbox::new());
        let waiter = {
            let mailbox = mailbox.clone();
            tokio::spawn(async move {
                let started = Instant::now();
                mailbox.wait_for_activity(Duration::from_secs(5)).await;
                started.elapsed()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        mailbox.send("a", "b", "ping");

        let waited = waiter.await.unwrap();
        assert!(waited < Duration::from_secs(5));
    }
}
