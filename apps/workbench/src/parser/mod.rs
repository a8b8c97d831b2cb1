// Streaming artifact protocol: tag tokenizer → per-message state → StreamParser.
// The parser is synchronous and never fails; everything it does not recognize
// is display text.

pub mod events;
pub mod handlers;
pub mod state;
pub mod stream;
pub mod tags;

pub use events::{ActionEvent, ArtifactEvent, ParserEvent, ParserObserver};
pub use stream::{ParseOutput, StreamParser};
pub use tags::{TagNameError, TagNames, DEFAULT_ACTION_TAG, DEFAULT_ARTIFACT_TAG};
