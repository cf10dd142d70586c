//! Announcement tokens broadcast after each mutation.
//!
//! An announcement is a single text token `"<verb>:<id>"` with the id in
//! base-10 signed 64-bit form and no surrounding whitespace. The format
//! is deliberately tiny: subscribers fetch message bodies from the
//! canonical store themselves, so the token only has to say what changed.

use crate::error::{FeedError, Result};
use crate::types::MessageId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mutation kind carried by an announcement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    Push,
    Update,
    Remove,
}

impl Verb {
    /// Wire name of the verb.
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Push => "push",
            Verb::Update => "update",
            Verb::Remove => "remove",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "push" => Some(Verb::Push),
            "update" => Some(Verb::Update),
            "remove" => Some(Verb::Remove),
            _ => None,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded announcement: which mutation happened to which id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Announcement {
    pub verb: Verb,
    pub id: MessageId,
}

impl Announcement {
    pub fn new(verb: Verb, id: MessageId) -> Self {
        Self { verb, id }
    }

    /// Encode as a wire token, e.g. `push:1700000000000000000`.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decode a wire token.
    ///
    /// Splits on the first `:`; the verb must be one of `push`, `update`,
    /// `remove` and the id must parse as a signed 64-bit decimal integer.
    /// Anything else is [`FeedError::MalformedAnnouncement`].
    pub fn decode(token: &str) -> Result<Self> {
        let (verb, id) = token
            .split_once(':')
            .ok_or_else(|| FeedError::MalformedAnnouncement(token.to_string()))?;
        let verb =
            Verb::parse(verb).ok_or_else(|| FeedError::MalformedAnnouncement(token.to_string()))?;
        let id: i64 = id
            .parse()
            .map_err(|_| FeedError::MalformedAnnouncement(token.to_string()))?;
        Ok(Self {
            verb,
            id: MessageId(id),
        })
    }
}

impl fmt::Display for Announcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.verb, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_push() {
        let ann = Announcement::decode("push:42").unwrap();
        assert_eq!(ann.verb, Verb::Push);
        assert_eq!(ann.id, MessageId(42));
    }

    #[test]
    fn test_decode_negative_id() {
        let ann = Announcement::decode("remove:-3").unwrap();
        assert_eq!(ann.verb, Verb::Remove);
        assert_eq!(ann.id, MessageId(-3));
    }

    #[test]
    fn test_decode_rejects_missing_separator() {
        let result = Announcement::decode("bogus");
        assert!(matches!(result, Err(FeedError::MalformedAnnouncement(_))));
    }

    #[test]
    fn test_decode_rejects_unknown_verb() {
        let result = Announcement::decode("drop:42");
        assert!(matches!(result, Err(FeedError::MalformedAnnouncement(_))));
    }

    #[test]
    fn test_decode_rejects_non_numeric_id() {
        let result = Announcement::decode("push:abc");
        assert!(matches!(result, Err(FeedError::MalformedAnnouncement(_))));
    }

    #[test]
    fn test_decode_rejects_whitespace() {
        let result = Announcement::decode("push: 42");
        assert!(matches!(result, Err(FeedError::MalformedAnnouncement(_))));
    }

    #[test]
    fn test_encode_matches_wire_format() {
        let token = Announcement::new(Verb::Update, MessageId(7)).encode();
        assert_eq!(token, "update:7");
    }

    #[test]
    fn test_id_splits_on_first_separator_only() {
        // "42:9" is not a valid id
        let result = Announcement::decode("push:42:9");
        assert!(matches!(result, Err(FeedError::MalformedAnnouncement(_))));
    }

    proptest! {
        #[test]
        fn decode_never_panics(token in ".*") {
            let _ = Announcement::decode(&token);
        }

        #[test]
        fn decoded_tokens_round_trip(id in any::<i64>()) {
            let ann = Announcement::decode(&format!("update:{}", id)).unwrap();
            prop_assert_eq!(ann.encode(), format!("update:{}", id));
        }
    }
}
