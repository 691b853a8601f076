//! Event access tiers.

use serde::{Deserialize, Serialize};

use crate::id::GroupId;

/// Who may see or register for an event, ordered from least to most restrictive.
///
/// Wire format: `u8` (0 = Public, 1 = Members, 2 = Affiliated, 3 = Groups).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    /// Anyone, including guests without an account.
    Public = 0,
    /// Any signed-in user.
    Members = 1,
    /// Signed-in users sharing the organiser's affiliation.
    Affiliated = 2,
    /// Signed-in users belonging to one of the event's allowed groups.
    Groups = 3,
}

impl AccessTier {
    /// Convert from `u8` wire value. Returns `None` for unknown values.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Public),
            1 => Some(Self::Members),
            2 => Some(Self::Affiliated),
            3 => Some(Self::Groups),
            _ => None,
        }
    }

    /// Convert to `u8` wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl PartialOrd for AccessTier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AccessTier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_u8().cmp(&other.as_u8())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("registration tier must be at least as restrictive as visibility tier")]
    RegistrationLooserThanVisibility,
    #[error("group-exclusive events need at least one allowed group")]
    MissingGroups,
}

/// Validated access rules of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventAccess {
    visibility: AccessTier,
    registration: AccessTier,
    allowed_groups: Vec<GroupId>,
}

impl EventAccess {
    pub fn new(
        visibility: AccessTier,
        registration: AccessTier,
        allowed_groups: Vec<GroupId>,
    ) -> Result<Self, AccessError> {
        if registration < visibility {
            return Err(AccessError::RegistrationLooserThanVisibility);
        }
        let uses_groups = visibility == AccessTier::Groups || registration == AccessTier::Groups;
        if uses_groups && allowed_groups.is_empty() {
            return Err(AccessError::MissingGroups);
        }
        Ok(Self {
            visibility,
            registration,
            allowed_groups,
        })
    }

    pub fn visibility(&self) -> AccessTier {
        self.visibility
    }

    pub fn registration(&self) -> AccessTier {
        self.registration
    }

    pub fn allowed_groups(&self) -> &[GroupId] {
        &self.allowed_groups
    }

    /// Whether a caller may register.
    ///
    /// `caller` is `None` for guests. Guests may only act on fully public events.
    pub fn permits_registration(&self, caller: Option<&CallerAccess<'_>>) -> bool {
        let Some(caller) = caller else {
            return self.registration == AccessTier::Public && self.visibility == AccessTier::Public;
        };
        match self.registration {
            AccessTier::Public | AccessTier::Members => true,
            AccessTier::Affiliated => !caller.is_external,
            AccessTier::Groups => caller
                .group_ids
                .iter()
                .any(|g| self.allowed_groups.contains(g)),
        }
    }
}

/// Facts about a signed-in caller needed for access decisions.
#[derive(Debug, Clone, Copy)]
pub struct CallerAccess<'a> {
    pub is_external: bool,
    pub group_ids: &'a [GroupId],
}

/// A caller is external when their affiliation differs from the organiser's.
/// A missing affiliation on either side counts as different.
pub fn is_external(caller_affiliation: Option<&str>, organiser_affiliation: Option<&str>) -> bool {
    match (caller_affiliation, organiser_affiliation) {
        (Some(caller), Some(organiser)) => !caller.trim().eq_ignore_ascii_case(organiser.trim()),
        _ => true,
    }
}
