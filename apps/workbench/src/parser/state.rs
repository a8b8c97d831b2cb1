//! Per-message parse state and the state machine that advances it.

use tracing::{debug, info, warn};

use crate::models::{Action, ActionType, ArtifactMeta};
use crate::parser::events::{ActionEvent, ArtifactEvent, ParserEvent};
use crate::parser::tags::{attributes, Scan, TagKind, TagNames};

/// An action whose close tag has not been seen yet.
#[derive(Debug, Clone)]
struct OpenAction {
    id: usize,
    action_type: ActionType,
    file_path: Option<String>,
    /// Raw body accumulated so far, untrimmed.
    content: String,
}

impl OpenAction {
    fn snapshot(&self, content: String) -> Action {
        Action {
            action_type: self.action_type,
            file_path: self.file_path.clone(),
            content,
        }
    }
}

/// Everything the parser remembers about one message between calls.
#[derive(Debug, Default)]
pub struct MessageState {
    /// Byte offset into the cumulative text; everything before it is consumed.
    position: usize,
    display: String,
    artifact: Option<ArtifactMeta>,
    action: Option<OpenAction>,
    next_action_id: usize,
}

enum BodyStep {
    /// Close tag found; the action is finished.
    Closed,
    /// Ran out of text, possibly holding back the start of a close tag.
    Hold,
}

impl MessageState {
    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn in_artifact(&self) -> bool {
        self.artifact.is_some()
    }

    /// Consumes `input[self.position..]` as far as it can be interpreted
    /// unambiguously, appending display text and pushing events.
    pub fn advance(
        &mut self,
        tags: &TagNames,
        message_id: &str,
        input: &str,
        events: &mut Vec<ParserEvent>,
    ) {
        let mut i = self.position;

        while i < input.len() {
            if self.action.is_some() {
                match self.consume_action_body(tags, message_id, input, &mut i, events) {
                    BodyStep::Closed => continue,
                    BodyStep::Hold => break,
                }
            }

            let rest = &input[i..];
            let Some(lt) = rest.find('<') else {
                if !self.in_artifact() {
                    self.display.push_str(rest);
                }
                i = input.len();
                break;
            };
            if !self.in_artifact() {
                self.display.push_str(&rest[..lt]);
            }
            i += lt;

            let candidate = &input[i..];
            match tags.scan(candidate) {
                Scan::Partial => break,
                Scan::NotTag => {
                    if !self.in_artifact() {
                        self.display.push('<');
                    }
                    i += 1;
                }
                Scan::Tag { kind, len } => {
                    self.on_tag(kind, &candidate[..len], message_id, events);
                    i += len;
                }
            }
        }

        self.position = i;
    }

    /// Emits whatever top-level text is still held back waiting for a tag
    /// that will now never complete. Open entities are left untouched.
    pub fn flush(&mut self, input: &str) {
        if self.in_artifact() || self.position >= input.len() {
            return;
        }
        if let Some(rest) = input.get(self.position..) {
            self.display.push_str(rest);
            self.position = input.len();
        }
    }

    fn consume_action_body(
        &mut self,
        tags: &TagNames,
        message_id: &str,
        input: &str,
        i: &mut usize,
        events: &mut Vec<ParserEvent>,
    ) -> BodyStep {
        let prefix = tags.action_close_prefix();
        let rest = &input[*i..];
        let mut search = 0;

        loop {
            let Some(offset) = rest[search..].find(prefix) else {
                let held = held_suffix(&rest[search..], prefix);
                let take = rest.len() - held;
                self.push_body(&rest[..take]);
                *i += take;
                return BodyStep::Hold;
            };

            let at = search + offset;
            match tags.scan(&rest[at..]) {
                Scan::Tag {
                    kind: TagKind::ActionClose,
                    len,
                } => {
                    self.push_body(&rest[..at]);
                    *i += at + len;
                    self.close_action(message_id, events);
                    return BodyStep::Closed;
                }
                Scan::Partial => {
                    self.push_body(&rest[..at]);
                    *i += at;
                    return BodyStep::Hold;
                }
                // Something like `</folioActions>`: part of the body.
                _ => search = at + 1,
            }
        }
    }

    fn push_body(&mut self, text: &str) {
        if let Some(action) = self.action.as_mut() {
            action.content.push_str(text);
        }
    }

    fn on_tag(
        &mut self,
        kind: TagKind,
        raw: &str,
        message_id: &str,
        events: &mut Vec<ParserEvent>,
    ) {
        match (kind, self.artifact.is_some()) {
            (TagKind::ArtifactOpen, false) => self.open_artifact(raw, message_id, events),
            (TagKind::ArtifactOpen, true) => {
                warn!("Message {message_id}: nested artifact tag ignored: {raw}");
            }
            (TagKind::ArtifactClose, true) => self.close_artifact(message_id, events),
            (TagKind::ActionOpen, true) => self.open_action(raw, message_id, events),
            // Actions only exist inside artifacts; out here it is plain text.
            (TagKind::ActionOpen, false) => self.display.push_str(raw),
            (TagKind::ArtifactClose | TagKind::ActionClose, _) => {
                debug!("Message {message_id}: stray close tag ignored: {raw}");
            }
        }
    }

    fn open_artifact(&mut self, raw: &str, message_id: &str, events: &mut Vec<ParserEvent>) {
        let mut attrs = attributes(raw);
        let id = match attrs.remove("id") {
            Some(id) if !id.trim().is_empty() => id,
            _ => {
                warn!("Message {message_id}: artifact tag without id, treating as text");
                self.display.push_str(raw);
                return;
            }
        };
        let title = attrs.remove("title").unwrap_or_else(|| {
            warn!("Message {message_id}: artifact '{id}' has no title");
            id.clone()
        });

        info!("Message {message_id}: artifact '{id}' opened");
        let artifact = ArtifactMeta { id, title };
        events.push(ParserEvent::ArtifactOpened(ArtifactEvent {
            message_id: message_id.to_string(),
            artifact: artifact.clone(),
        }));
        self.artifact = Some(artifact);
    }

    fn close_artifact(&mut self, message_id: &str, events: &mut Vec<ParserEvent>) {
        if let Some(artifact) = self.artifact.take() {
            info!("Message {message_id}: artifact '{}' closed", artifact.id);
            events.push(ParserEvent::ArtifactClosed(ArtifactEvent {
                message_id: message_id.to_string(),
                artifact,
            }));
        }
    }

    fn open_action(&mut self, raw: &str, message_id: &str, events: &mut Vec<ParserEvent>) {
        let Some(artifact_id) = self.artifact.as_ref().map(|a| a.id.clone()) else {
            return;
        };
        let mut attrs = attributes(raw);

        let action_type = match attrs.get("type").map(|t| t.parse::<ActionType>()) {
            Some(Ok(action_type)) => action_type,
            Some(Err(e)) => {
                warn!("Message {message_id}: {e}, action ignored");
                return;
            }
            None => {
                warn!("Message {message_id}: action tag without type ignored");
                return;
            }
        };

        let file_path = match action_type {
            ActionType::File => match attrs.remove("filePath") {
                Some(path) if !path.trim().is_empty() => Some(path),
                _ => {
                    warn!("Message {message_id}: file action without filePath ignored");
                    return;
                }
            },
            ActionType::Shell => None,
        };

        let open = OpenAction {
            id: self.next_action_id,
            action_type,
            file_path,
            content: String::new(),
        };
        self.next_action_id += 1;
        debug!(
            "Message {message_id}: action {} ({action_type}) opened in '{artifact_id}'",
            open.id
        );

        // Shell commands are meaningless until complete; announce them at close.
        if action_type == ActionType::File {
            events.push(ParserEvent::ActionOpened(ActionEvent {
                message_id: message_id.to_string(),
                artifact_id,
                action_id: open.id,
                action: open.snapshot(String::new()),
            }));
        }
        self.action = Some(open);
    }

    fn close_action(&mut self, message_id: &str, events: &mut Vec<ParserEvent>) {
        let Some(open) = self.action.take() else {
            return;
        };
        let artifact_id = self
            .artifact
            .as_ref()
            .map(|a| a.id.clone())
            .unwrap_or_default();
        let action = open.snapshot(finalize_content(&open.content));
        debug!(
            "Message {message_id}: action {} ({}) closed with {} bytes",
            open.id,
            open.action_type,
            action.content.len()
        );
        events.push(ParserEvent::ActionClosed(ActionEvent {
            message_id: message_id.to_string(),
            artifact_id,
            action_id: open.id,
            action,
        }));
    }
}

/// Strips the tag framing from a raw action body and nothing else: one line
/// break right after the open tag, and the indentation of a close tag that
/// sits on its own line. Everything in between is kept byte for byte.
pub fn finalize_content(raw: &str) -> String {
    let body = match raw.rfind('\n') {
        Some(nl) if raw[nl + 1..].chars().all(|c| c == ' ' || c == '\t') => &raw[..=nl],
        _ => raw,
    };
    let body = body
        .strip_prefix("\r\n")
        .or_else(|| body.strip_prefix('\n'))
        .unwrap_or(body);
    body.to_string()
}

/// Length of the longest proper prefix of `literal` that `text` ends with.
fn held_suffix(text: &str, literal: &str) -> usize {
    let max = literal.len().min(text.len() + 1);
    (1..max)
        .rev()
        .find(|&k| text.ends_with(&literal[..k]))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_content_strips_only_framing() {
        assert_eq!(finalize_content("\n<h1>hi</h1>\n"), "<h1>hi</h1>\n");
        assert_eq!(finalize_content("\nnpm install\n  "), "npm install\n");
        assert_eq!(finalize_content("\r\nls\r\n"), "ls\r\n");
        assert_eq!(finalize_content("ls"), "ls");
        assert_eq!(finalize_content("\n"), "");
        assert_eq!(finalize_content(""), "");
    }

    #[test]
    fn test_finalize_content_keeps_indentation() {
        assert_eq!(
            finalize_content("\n    - item\n    - other\n"),
            "    - item\n    - other\n"
        );
        assert_eq!(
            finalize_content("\n\tall:\n\t\tcc main.c\n\n\t"),
            "\tall:\n\t\tcc main.c\n\n"
        );
        // Trailing spaces on a content line are content.
        assert_eq!(finalize_content("\necho hi  "), "echo hi  ");
    }

    #[test]
    fn test_held_suffix_finds_partial_close_tag() {
        assert_eq!(held_suffix("echo hi\n</folio", "</folioAction"), 7);
        assert_eq!(held_suffix("echo hi\n<", "</folioAction"), 1);
        assert_eq!(held_suffix("echo hi\n", "</folioAction"), 0);
        assert_eq!(held_suffix("", "</folioAction"), 0);
    }

    #[test]
    fn test_body_is_consumed_incrementally() {
        let tags = TagNames::default();
        let mut state = MessageState::default();
        let mut events = Vec::new();
        let text = "<folioArtifact id=\"a\" title=\"A\"><folioAction type=\"shell\">echo one\necho tw";

        state.advance(&tags, "m", text, &mut events);

        assert_eq!(state.position(), text.len());
        let open = state.action.as_ref().unwrap();
        assert_eq!(open.content, "echo one\necho tw");
        // Shell actions are not announced before they close.
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_partial_close_tag_is_held_back() {
        let tags = TagNames::default();
        let mut state = MessageState::default();
        let mut events = Vec::new();
        let text = "<folioArtifact id=\"a\" title=\"A\"><folioAction type=\"shell\">ls</folioAc";

        state.advance(&tags, "m", text, &mut events);

        assert_eq!(state.position(), text.len() - "</folioAc".len());
        assert_eq!(state.action.as_ref().unwrap().content, "ls");
    }

    #[test]
    fn test_flush_releases_held_text_at_top_level() {
        let tags = TagNames::default();
        let mut state = MessageState::default();
        let mut events = Vec::new();

        state.advance(&tags, "m", "x <fol", &mut events);
        assert_eq!(state.display(), "x ");

        state.flush("x <fol");
        assert_eq!(state.display(), "x <fol");
    }
}
