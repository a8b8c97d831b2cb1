//! Tag tokenizer for the artifact micro-language.
//!
//! Works on text that starts at a `<` and answers one question: is this one of
//! our four tags, could it still become one once more text arrives, or is it
//! plain text?

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Default artifact tag literal agreed with the generator prompt.
pub const DEFAULT_ARTIFACT_TAG: &str = "folioArtifact";
/// Default action tag literal agreed with the generator prompt.
pub const DEFAULT_ACTION_TAG: &str = "folioAction";

static ATTRIBUTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|\s)([A-Za-z_][\w:.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("attribute regex is valid")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagNameError {
    #[error("tag name cannot be empty")]
    Empty,

    #[error("tag name '{0}' may only contain ASCII letters, digits, '-' and '_'")]
    InvalidCharacter(String),

    #[error("artifact and action tags must differ (both are '{0}')")]
    Duplicate(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    ArtifactOpen,
    ArtifactClose,
    ActionOpen,
    ActionClose,
}

impl TagKind {
    fn is_close(self) -> bool {
        matches!(self, TagKind::ArtifactClose | TagKind::ActionClose)
    }
}

/// Result of scanning text that begins with `<`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// A complete known tag spanning `len` bytes.
    Tag { kind: TagKind, len: usize },
    /// The text so far is a prefix of a known tag; wait for more input.
    Partial,
    /// Not one of our tags.
    NotTag,
}

/// The fixed literals the parser recognizes, precomputed once.
#[derive(Debug, Clone)]
pub struct TagNames {
    artifact: String,
    action: String,
    candidates: [(TagKind, String); 4],
}

impl TagNames {
    pub fn new(artifact: &str, action: &str) -> Result<Self, TagNameError> {
        validate_name(artifact)?;
        validate_name(action)?;
        if artifact == action {
            return Err(TagNameError::Duplicate(artifact.to_string()));
        }

        Ok(Self {
            artifact: artifact.to_string(),
            action: action.to_string(),
            candidates: [
                (TagKind::ArtifactOpen, format!("<{artifact}")),
                (TagKind::ArtifactClose, format!("</{artifact}")),
                (TagKind::ActionOpen, format!("<{action}")),
                (TagKind::ActionClose, format!("</{action}")),
            ],
        })
    }

    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Start of the tag that ends an action body, e.g. `</folioAction`.
    pub fn action_close_prefix(&self) -> &str {
        &self.candidates[3].1
    }

    /// Classifies `text`, which must start with `<`.
    pub fn scan(&self, text: &str) -> Scan {
        let mut partial = false;

        for (kind, literal) in &self.candidates {
            let outcome = if kind.is_close() {
                scan_close(text, literal)
            } else {
                scan_open(text, literal)
            };
            match outcome {
                Some(Ok(len)) => return Scan::Tag { kind: *kind, len },
                Some(Err(())) => partial = true,
                None => {}
            }
        }

        if partial {
            Scan::Partial
        } else {
            Scan::NotTag
        }
    }
}

impl Default for TagNames {
    fn default() -> Self {
        Self::new(DEFAULT_ARTIFACT_TAG, DEFAULT_ACTION_TAG).expect("default tag names are valid")
    }
}

fn validate_name(name: &str) -> Result<(), TagNameError> {
    if name.is_empty() {
        return Err(TagNameError::Empty);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(TagNameError::InvalidCharacter(name.to_string()));
    }
    Ok(())
}

// Some(Ok(len)) = complete, Some(Err(())) = partial, None = no match.
type Matched = Option<Result<usize, ()>>;

fn scan_close(text: &str, literal: &str) -> Matched {
    let Some(rest) = text.strip_prefix(literal) else {
        return literal.starts_with(text).then_some(Err(()));
    };
    let trimmed = rest.trim_start();
    if trimmed.is_empty() {
        return Some(Err(()));
    }
    if trimmed.starts_with('>') {
        return Some(Ok(text.len() - trimmed.len() + 1));
    }
    None
}

fn scan_open(text: &str, literal: &str) -> Matched {
    let Some(rest) = text.strip_prefix(literal) else {
        return literal.starts_with(text).then_some(Err(()));
    };
    let Some(first) = rest.chars().next() else {
        return Some(Err(()));
    };
    if first != '>' && !first.is_whitespace() {
        // `<folioArtifactual` is some other tag.
        return None;
    }
    match find_tag_end(rest) {
        TagEnd::At(end) => Some(Ok(literal.len() + end + 1)),
        TagEnd::Pending => Some(Err(())),
        TagEnd::Abandoned => None,
    }
}

enum TagEnd {
    At(usize),
    /// No `>` yet; more text may still complete the tag.
    Pending,
    /// The text cannot be the rest of an open tag.
    Abandoned,
}

/// Finds the first `>` in `text` that is not inside a quoted value.
///
/// Gives up on a line break inside quotes, on a blank line, or on another
/// unquoted `<`, so prose that merely mentions a tag name is released as text
/// instead of being held back until the stream ends.
fn find_tag_end(text: &str) -> TagEnd {
    let mut quote: Option<u8> = None;
    // Set after an unquoted line break, cleared by anything but whitespace.
    let mut line_blank = false;
    for (i, b) in text.bytes().enumerate() {
        match (quote, b) {
            (Some(_), b'\n') => return TagEnd::Abandoned,
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'>') => return TagEnd::At(i),
            (None, b'<') => return TagEnd::Abandoned,
            (None, b'\n') if line_blank => return TagEnd::Abandoned,
            (None, b'\n') => line_blank = true,
            (None, b'"' | b'\'') => {
                quote = Some(b);
                line_blank = false;
            }
            (None, b) if b.is_ascii_whitespace() => {}
            (None, _) => line_blank = false,
        }
    }
    TagEnd::Pending
}

/// Extracts `name="value"` pairs from a complete open tag.
/// Later duplicates win. Values are taken verbatim (no entity decoding).
pub fn attributes(tag: &str) -> HashMap<String, String> {
    let body = tag
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim_end_matches('/');
    ATTRIBUTE_RE
        .captures_iter(body)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_string();
            let value = caps.get(2).or_else(|| caps.get(3))?.as_str().to_string();
            Some((name, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> TagNames {
        TagNames::new("folioArtifact", "folioAction").unwrap()
    }

    #[test]
    fn test_complete_open_tag_reports_its_length() {
        let text = r#"<folioArtifact id="a" title="T">rest"#;
        assert_eq!(
            names().scan(text),
            Scan::Tag {
                kind: TagKind::ArtifactOpen,
                len: text.len() - "rest".len()
            }
        );
    }

    #[test]
    fn test_close_tag_tolerates_trailing_whitespace() {
        assert_eq!(
            names().scan("</folioAction  >\n"),
            Scan::Tag {
                kind: TagKind::ActionClose,
                len: 16
            }
        );
    }

    #[test]
    fn test_prefixes_are_partial() {
        let names = names();
        for text in ["<", "<f", "<folioAr", "</", "</folioAct", "<folioAction type=\"fi"] {
            assert_eq!(names.scan(text), Scan::Partial, "{text:?}");
        }
    }

    #[test]
    fn test_gt_inside_quotes_does_not_end_tag() {
        let text = r#"<folioArtifact id="a" title="x > y">"#;
        assert_eq!(
            names().scan(text),
            Scan::Tag {
                kind: TagKind::ArtifactOpen,
                len: text.len()
            }
        );
    }

    #[test]
    fn test_other_markup_is_not_a_tag() {
        let names = names();
        assert_eq!(names.scan("<div>"), Scan::NotTag);
        assert_eq!(names.scan("< 3"), Scan::NotTag);
        assert_eq!(names.scan("<folioArtifactual>"), Scan::NotTag);
        assert_eq!(names.scan("</folioActionx>"), Scan::NotTag);
    }

    #[test]
    fn test_open_tag_may_span_lines() {
        let text = "<folioAction\n  type=\"file\"\n  filePath=\"a.rs\">";
        assert_eq!(
            names().scan(text),
            Scan::Tag {
                kind: TagKind::ActionOpen,
                len: text.len()
            }
        );
    }

    #[test]
    fn test_prose_mentioning_a_tag_is_released() {
        let names = names();
        // An apostrophe opens a "quote" that a line break abandons.
        assert_eq!(names.scan("<folioArtifact tag's format"), Scan::Partial);
        assert_eq!(names.scan("<folioArtifact tag's format\nmore"), Scan::NotTag);
        assert_eq!(names.scan("<folioArtifact is a tag\n\nNext paragraph"), Scan::NotTag);
        assert_eq!(names.scan("<folioArtifact or <b>"), Scan::NotTag);
    }

    #[test]
    fn test_attributes_are_whitespace_flexible() {
        let attrs = attributes("<folioAction   type = \"file\"\n  filePath='src/main.rs' >");
        assert_eq!(attrs.get("type").map(String::as_str), Some("file"));
        assert_eq!(attrs.get("filePath").map(String::as_str), Some("src/main.rs"));
    }

    #[test]
    fn test_attribute_names_are_case_sensitive() {
        let attrs = attributes(r#"<folioAction Type="shell">"#);
        assert!(attrs.get("type").is_none());
    }

    #[test]
    fn test_quoted_values_do_not_leak_attributes() {
        let attrs = attributes(r#"<folioArtifact title="a id=&quot;x" id="real">"#);
        assert_eq!(attrs.get("id").map(String::as_str), Some("real"));
    }

    #[test]
    fn test_tag_name_validation() {
        assert_eq!(TagNames::new("", "a").unwrap_err(), TagNameError::Empty);
        assert!(matches!(
            TagNames::new("bad name", "a"),
            Err(TagNameError::InvalidCharacter(_))
        ));
        assert!(matches!(
            TagNames::new("same", "same"),
            Err(TagNameError::Duplicate(_))
        ));
    }
}
