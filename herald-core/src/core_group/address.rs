//! Group addresses
//!
//! A group is addressed as `kind:author:identifier`, the same coordinate
//! format used for addressable events. The kind encodes the visibility:
//! public groups use kind 34550, private (end-to-end) groups kind 35834.
//! Parsing happens once at the boundary; everything past it works with the
//! typed [`GroupAddress`].

use super::{GroupError, GroupResult};
use crate::core_event::{tag, Kind, Tag, KIND_PRIVATE_GROUP, KIND_PUBLIC_GROUP};
use crate::core_identity::is_valid_pubkey;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who can read a group's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GroupVisibility {
    /// Content is signed in the clear and tagged with the address
    Public,
    /// Content is wrapped to the group's shared key
    Private,
}

impl GroupVisibility {
    /// Event kind of the group definition
    pub fn kind(&self) -> Kind {
        match self {
            GroupVisibility::Public => KIND_PUBLIC_GROUP,
            GroupVisibility::Private => KIND_PRIVATE_GROUP,
        }
    }

    pub fn from_kind(kind: Kind) -> Option<Self> {
        if kind == KIND_PUBLIC_GROUP {
            Some(GroupVisibility::Public)
        } else if kind == KIND_PRIVATE_GROUP {
            Some(GroupVisibility::Private)
        } else {
            None
        }
    }
}

/// Typed group coordinate
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupAddress {
    pub visibility: GroupVisibility,
    /// Admin public key
    pub author: String,
    /// Random local identifier (`d` tag of the group definition)
    pub identifier: String,
}

impl GroupAddress {
    pub fn new(
        visibility: GroupVisibility,
        author: impl Into<String>,
        identifier: impl Into<String>,
    ) -> GroupResult<Self> {
        let author = author.into();
        if !is_valid_pubkey(&author) {
            return Err(GroupError::InvalidAddress(format!("malformed author {}", author)));
        }

        let identifier = identifier.into();
        if identifier.is_empty() {
            return Err(GroupError::InvalidAddress("empty identifier".to_string()));
        }

        Ok(Self { visibility, author, identifier })
    }

    /// Random 8-byte hex identifier for a new group
    pub fn generate_identifier() -> String {
        let mut bytes = [0u8; 8];
        rand::rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    pub fn kind(&self) -> Kind {
        self.visibility.kind()
    }

    pub fn is_private(&self) -> bool {
        self.visibility == GroupVisibility::Private
    }

    /// `["a", "kind:author:identifier"]`
    pub fn tag(&self) -> Tag {
        tag("a", [self.to_string()])
    }
}

impl fmt::Display for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind(), self.author, self.identifier)
    }
}

impl FromStr for GroupAddress {
    type Err = GroupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (kind, author, identifier) = match (parts.next(), parts.next(), parts.next()) {
            (Some(k), Some(a), Some(i)) => (k, a, i),
            _ => return Err(GroupError::InvalidAddress(s.to_string())),
        };

        let visibility = kind
            .parse::<u16>()
            .ok()
            .map(Kind::from_u16)
            .and_then(GroupVisibility::from_kind)
            .ok_or_else(|| GroupError::InvalidAddress(format!("unknown group kind in {}", s)))?;

        GroupAddress::new(visibility, author, identifier)
    }
}

impl TryFrom<String> for GroupAddress {
    type Error = GroupError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GroupAddress> for String {
    fn from(address: GroupAddress) -> Self {
        address.to_string()
    }
}
