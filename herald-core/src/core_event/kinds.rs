//! Event kinds used by the publication engine

use nostr::Kind;

/// Profile metadata (JSON object content)
pub const KIND_PROFILE: Kind = Kind::Metadata;

/// Plain text note
pub const KIND_NOTE: Kind = Kind::TextNote;

/// Seal: encrypted rumor signed by the real author
pub const KIND_SEAL: Kind = Kind::Seal;

/// Direct message rumor
pub const KIND_DIRECT_MESSAGE: Kind = Kind::PrivateDirectMessage;

/// Read-receipt marker
pub const KIND_SEEN: Kind = Kind::Custom(15);

/// Group key share (admin key, member key, or eviction notice)
pub const KIND_GROUP_KEY_SHARE: Kind = Kind::Custom(24);

/// Group entry request sent to the group admin
pub const KIND_GROUP_JOIN_REQUEST: Kind = Kind::Custom(25);

/// Group exit notice sent to the group admin
pub const KIND_GROUP_EXIT_REQUEST: Kind = Kind::Custom(26);

/// Modern outer envelope
pub const KIND_GIFT_WRAP: Kind = Kind::GiftWrap;

/// Legacy-cipher compatibility envelope
pub const KIND_LEGACY_WRAP: Kind = Kind::Custom(1060);

/// Relay list (read/write policy)
pub const KIND_RELAY_LIST: Kind = Kind::RelayList;

/// Public group definition
pub const KIND_PUBLIC_GROUP: Kind = Kind::Custom(34550);

/// Private (end-to-end) group definition
pub const KIND_PRIVATE_GROUP: Kind = Kind::Custom(35834);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classes() {
        assert!(KIND_PROFILE.is_replaceable());
        assert!(KIND_RELAY_LIST.is_replaceable());
        assert!(!KIND_NOTE.is_replaceable());

        assert!(KIND_PUBLIC_GROUP.is_addressable());
        assert!(KIND_PRIVATE_GROUP.is_addressable());
        assert!(!KIND_GIFT_WRAP.is_addressable());
    }

    #[test]
    fn test_custom_kinds_compare_by_number() {
        assert_eq!(KIND_SEEN, Kind::from_u16(15));
        assert_eq!(KIND_LEGACY_WRAP.as_u16(), 1060);
        assert_eq!(KIND_PUBLIC_GROUP, Kind::from_u16(34550));
    }
}
