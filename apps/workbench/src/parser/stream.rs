//! StreamParser — the public entry point for incremental artifact parsing.
//!
//! Callers hand in the *cumulative* text of a message on every chunk. The
//! parser keeps a cursor per message id and only interprets what is new, so
//! re-sending an already-seen prefix is a no-op.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::parser::events::{ParserEvent, ParserObserver};
use crate::parser::state::MessageState;
use crate::parser::tags::TagNames;

/// Result of one `parse` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseOutput {
    /// Cleaned display text for the whole message so far.
    pub display: String,
    /// Events produced by this call only, in parse order.
    pub events: Vec<ParserEvent>,
}

pub struct StreamParser {
    tags: TagNames,
    messages: HashMap<String, MessageState>,
    observers: Vec<Arc<dyn ParserObserver>>,
}

impl StreamParser {
    pub fn new(tags: TagNames) -> Self {
        Self {
            tags,
            messages: HashMap::new(),
            observers: Vec::new(),
        }
    }

    pub fn tags(&self) -> &TagNames {
        &self.tags
    }

    /// Registers a subscriber. Observers are notified in registration order.
    pub fn subscribe(&mut self, observer: Arc<dyn ParserObserver>) {
        self.observers.push(observer);
    }

    /// Parses whatever part of `input` has not been seen for `message_id` yet.
    ///
    /// Never fails: unknown markup is passed through as text and incomplete
    /// tags are held back until a later call completes them.
    pub fn parse(&mut self, message_id: &str, input: &str) -> ParseOutput {
        let state = self
            .messages
            .entry(message_id.to_string())
            .or_insert_with(|| {
                debug!("Tracking new message {message_id}");
                MessageState::default()
            });

        let mut events = Vec::new();
        if input.len() < state.position() || !input.is_char_boundary(state.position()) {
            warn!(
                "Message {message_id}: input no longer extends the parsed prefix ({} < {}), ignoring",
                input.len(),
                state.position()
            );
        } else {
            state.advance(&self.tags, message_id, input, &mut events);
        }

        for event in &events {
            for observer in &self.observers {
                observer.notify(event);
            }
        }

        ParseOutput {
            display: state.display().to_string(),
            events,
        }
    }

    /// Final call for a message whose stream has ended. Parses the remaining
    /// text, then releases top-level text that was held back as a possible
    /// tag. Open artifacts and actions stay open.
    pub fn finish(&mut self, message_id: &str, input: &str) -> ParseOutput {
        let mut output = self.parse(message_id, input);
        if let Some(state) = self.messages.get_mut(message_id) {
            state.flush(input);
            output.display = state.display().to_string();
        }
        output
    }

    /// Display text parsed so far for a message, if it is tracked.
    #[cfg(test)]
    pub fn display(&self, message_id: &str) -> Option<&str> {
        self.messages.get(message_id).map(MessageState::display)
    }

    /// Drops the state of one message.
    pub fn forget(&mut self, message_id: &str) -> bool {
        self.messages.remove(message_id).is_some()
    }

    /// Drops all per-message state, e.g. at the start of a fresh turn.
    pub fn reset(&mut self) {
        debug!("Resetting parser ({} messages)", self.messages.len());
        self.messages.clear();
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new(TagNames::default())
    }
}
