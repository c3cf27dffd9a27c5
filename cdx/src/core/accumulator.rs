//! Fold of a session's event stream into a result summary.
//!
//! The transition table is an exhaustive `match` over [`ThreadEvent`] and
//! [`ThreadItem`]: adding an event or item variant must be handled here.
//! Progress side effects are returned as [`Progress`] values so the caller
//! decides how to report them.

use crate::core::events::{ThreadEvent, ThreadItem};
use crate::core::types::{FileChange, RunStatus, Usage};

/// Progress notice produced by a single fold step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    SessionStarted { session_id: String },
    TurnStarted,
    TurnCompleted { usage: Usage },
    TurnFailed { message: String },
    CommandStarted { command: String },
    CommandFinished {
        command: String,
        exit_code: Option<i32>,
    },
    FilesChanged { changes: Vec<FileChange> },
    StreamError { message: String },
}

/// Mutable state accumulated over one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accumulator {
    session_id: Option<String>,
    files_changed: Vec<FileChange>,
    final_response: String,
    status: RunStatus,
    error: Option<String>,
    usage: Option<Usage>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Never fails.
    pub fn apply(&mut self, event: &ThreadEvent) -> Option<Progress> {
        match event {
            ThreadEvent::ThreadStarted { thread_id } => {
                if self.session_id.is_some() {
                    return None;
                }
                self.session_id = Some(thread_id.clone());
                Some(Progress::SessionStarted {
                    session_id: thread_id.clone(),
                })
            }
            ThreadEvent::TurnStarted => Some(Progress::TurnStarted),
            ThreadEvent::TurnCompleted { usage } => {
                self.usage = Some(*usage);
                Some(Progress::TurnCompleted { usage: *usage })
            }
            ThreadEvent::TurnFailed { error } => {
                self.fail(&error.message);
                Some(Progress::TurnFailed {
                    message: error.message.clone(),
                })
            }
            ThreadEvent::ItemStarted { item } => match item {
                ThreadItem::CommandExecution { command, .. } => Some(Progress::CommandStarted {
                    command: command.clone(),
                }),
                ThreadItem::FileChange { .. }
                | ThreadItem::AgentMessage { .. }
                | ThreadItem::Other => None,
            },
            ThreadEvent::ItemUpdated { .. } => None,
            ThreadEvent::ItemCompleted { item } => self.complete_item(item),
            ThreadEvent::Error { message } => {
                self.fail(message);
                Some(Progress::StreamError {
                    message: message.clone(),
                })
            }
        }
    }

    fn complete_item(&mut self, item: &ThreadItem) -> Option<Progress> {
        match item {
            ThreadItem::FileChange { changes } => {
                self.files_changed.extend(changes.iter().cloned());
                Some(Progress::FilesChanged {
                    changes: changes.clone(),
                })
            }
            ThreadItem::CommandExecution { command, exit_code } => {
                Some(Progress::CommandFinished {
                    command: command.clone(),
                    exit_code: *exit_code,
                })
            }
            ThreadItem::AgentMessage { text } => {
                self.final_response = text.clone();
                None
            }
            ThreadItem::Other => None,
        }
    }

    // Failure is sticky: nothing resets the status to completed.
    fn fail(&mut self, message: &str) {
        self.status = RunStatus::Failed;
        self.error = Some(message.to_string());
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn files_changed(&self) -> &[FileChange] {
        &self.files_changed
    }

    pub fn final_response(&self) -> &str {
        &self.final_response
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::ThreadError;
    use crate::core::types::FileChangeKind;

    fn fold(events: &[ThreadEvent]) -> Accumulator {
        let mut acc = Accumulator::new();
        for event in events {
            acc.apply(event);
        }
        acc
    }

    fn message(text: &str) -> ThreadEvent {
        ThreadEvent::ItemCompleted {
            item: ThreadItem::AgentMessage {
                text: text.to_string(),
            },
        }
    }

    fn turn_failed(message: &str) -> ThreadEvent {
        ThreadEvent::TurnFailed {
            error: ThreadError {
                message: message.to_string(),
            },
        }
    }

    #[test]
    fn empty_stream_is_completed_without_session() {
        let acc = fold(&[]);
        assert_eq!(acc.status(), RunStatus::Completed);
        assert_eq!(acc.session_id(), None);
        assert_eq!(acc.final_response(), "");
        assert!(acc.files_changed().is_empty());
    }

    #[test]
    fn first_session_id_wins() {
        let mut acc = Accumulator::new();
        let first = acc.apply(&ThreadEvent::ThreadStarted {
            thread_id: "first".to_string(),
        });
        let second = acc.apply(&ThreadEvent::ThreadStarted {
            thread_id: "second".to_string(),
        });

        assert_eq!(
            first,
            Some(Progress::SessionStarted {
                session_id: "first".to_string()
            })
        );
        assert_eq!(second, None);
        assert_eq!(acc.session_id(), Some("first"));
    }

    #[test]
    fn failure_is_sticky_across_later_turns() {
        let acc = fold(&[
            ThreadEvent::TurnStarted,
            turn_failed("boom"),
            ThreadEvent::TurnStarted,
            ThreadEvent::TurnCompleted {
                usage: Usage::default(),
            },
            message("recovered"),
        ]);

        assert_eq!(acc.status(), RunStatus::Failed);
        assert_eq!(acc.error(), Some("boom"));
        assert_eq!(acc.final_response(), "recovered");
    }

    #[test]
    fn stream_error_fails_run_and_records_latest_message() {
        let acc = fold(&[
            turn_failed("turn"),
            ThreadEvent::Error {
                message: "stream".to_string(),
            },
        ]);
        assert_eq!(acc.status(), RunStatus::Failed);
        assert_eq!(acc.error(), Some("stream"));
    }

    #[test]
    fn last_agent_message_wins() {
        let acc = fold(&[message("one"), message("two"), message("three")]);
        assert_eq!(acc.final_response(), "three");
    }

    #[test]
    fn file_changes_append_in_delivery_order() {
        let acc = fold(&[
            ThreadEvent::ItemCompleted {
                item: ThreadItem::FileChange {
                    changes: vec![
                        FileChange::new("b.txt", FileChangeKind::Add),
                        FileChange::new("a.txt", FileChangeKind::Update),
                    ],
                },
            },
            ThreadEvent::ItemCompleted {
                item: ThreadItem::FileChange {
                    changes: vec![FileChange::new("b.txt", FileChangeKind::Update)],
                },
            },
        ]);

        assert_eq!(
            acc.files_changed(),
            &[
                FileChange::new("b.txt", FileChangeKind::Add),
                FileChange::new("a.txt", FileChangeKind::Update),
                FileChange::new("b.txt", FileChangeKind::Update),
            ]
        );
    }

    #[test]
    fn in_progress_file_changes_are_not_recorded() {
        let acc = fold(&[
            ThreadEvent::ItemStarted {
                item: ThreadItem::FileChange {
                    changes: vec![FileChange::new("a.txt", FileChangeKind::Add)],
                },
            },
            ThreadEvent::ItemUpdated {
                item: ThreadItem::FileChange {
                    changes: vec![FileChange::new("a.txt", FileChangeKind::Add)],
                },
            },
        ]);
        assert!(acc.files_changed().is_empty());
    }

    #[test]
    fn usage_keeps_latest_turn() {
        let latest = Usage {
            input_tokens: 20,
            cached_input_tokens: 5,
            output_tokens: 7,
        };
        let acc = fold(&[
            ThreadEvent::TurnCompleted {
                usage: Usage {
                    input_tokens: 1,
                    cached_input_tokens: 0,
                    output_tokens: 1,
                },
            },
            ThreadEvent::TurnCompleted { usage: latest },
        ]);
        assert_eq!(acc.usage(), Some(latest));
    }

    #[test]
    fn command_start_is_surfaced_but_updates_are_silent() {
        let mut acc = Accumulator::new();
        let item = ThreadItem::CommandExecution {
            command: "cargo test".to_string(),
            exit_code: None,
        };

        let started = acc.apply(&ThreadEvent::ItemStarted { item: item.clone() });
        let updated = acc.apply(&ThreadEvent::ItemUpdated { item });

        assert_eq!(
            started,
            Some(Progress::CommandStarted {
                command: "cargo test".to_string()
            })
        );
        assert_eq!(updated, None);
        assert_eq!(acc, Accumulator::new());
    }
}
