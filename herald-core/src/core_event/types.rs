/*
    types.rs - Templates and tag helpers

    EventTemplate: what a caller wants to say (no author yet)
    UnsignedEvent: a template stamped with its author, never signed (rumor)
    Event:         what travels over relays

    The template keeps its parts public so the orchestrator can add group
    tags before the signer (which may be remote) ever sees it.
*/

use nostr::{Event, Kind, PublicKey, Tag, TagKind, Tags, Timestamp, UnsignedEvent};

/// Tag `[name, values...]`. Values are kept verbatim, unparsed.
pub fn tag<I, S>(name: &str, values: I) -> Tag
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Tag::custom(TagKind::from(name), values)
}

/// Unsigned message template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTemplate {
    pub kind: Kind,
    pub content: String,
    pub tags: Vec<Tag>,
    pub created_at: Timestamp,
}

impl EventTemplate {
    /// Create a template stamped with the current time
    pub fn new(kind: Kind, content: impl Into<String>, tags: Vec<Tag>) -> Self {
        Self { kind, content: content.into(), tags, created_at: Timestamp::now() }
    }

    /// Override the creation timestamp
    pub fn created_at(mut self, created_at: impl Into<Timestamp>) -> Self {
        self.created_at = created_at.into();
        self
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Stamp the template with its author
    pub fn into_unsigned(self, author: PublicKey) -> UnsignedEvent {
        UnsignedEvent::new(author, self.created_at, self.kind, self.tags, self.content)
    }
}

/// Lookups shared by signed events and rumors
pub trait EventExt {
    fn event_tags(&self) -> &Tags;
    fn event_kind(&self) -> Kind;
    fn author(&self) -> &PublicKey;

    /// First value of the first tag named `name`
    fn tag_value(&self, name: &str) -> Option<&str> {
        self.event_tags().iter().find(|t| is_named(t, name)).and_then(Tag::content)
    }

    /// All values of tags named `name`, in order
    fn tag_values(&self, name: &str) -> Vec<&str> {
        self.event_tags().iter().filter(|t| is_named(t, name)).filter_map(Tag::content).collect()
    }

    /// Expiration as unix seconds, if the event carries one
    fn expiration(&self) -> Option<u64> {
        self.event_tags().expiration().map(Timestamp::as_u64)
    }

    /// Author as lowercase hex
    fn author_hex(&self) -> String {
        self.author().to_hex()
    }
}

fn is_named(tag: &Tag, name: &str) -> bool {
    tag.as_slice().first().is_some_and(|n| n == name)
}

impl EventExt for Event {
    fn event_tags(&self) -> &Tags {
        &self.tags
    }

    fn event_kind(&self) -> Kind {
        self.kind
    }

    fn author(&self) -> &PublicKey {
        &self.pubkey
    }
}

impl EventExt for UnsignedEvent {
    fn event_tags(&self) -> &Tags {
        &self.tags
    }

    fn event_kind(&self) -> Kind {
        self.kind
    }

    fn author(&self) -> &PublicKey {
        &self.pubkey
    }
}

/// Key under which newer versions of `event` supersede older ones.
///
/// Replaceable kinds collapse per (kind, author), addressable kinds per
/// (kind, author, `d` tag); everything else is unique by id.
pub fn dedup_key(event: &Event) -> String {
    if event.kind.is_addressable() {
        format!("{}:{}:{}", event.kind, event.pubkey, event.tags.identifier().unwrap_or(""))
    } else if event.kind.is_replaceable() {
        format!("{}:{}", event.kind, event.pubkey)
    } else {
        event.id.to_hex()
    }
}
