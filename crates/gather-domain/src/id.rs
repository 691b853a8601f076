//! Newtype wrappers for domain identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Identifies a user account.
    UserId
);

uuid_id!(
    /// Identifies a schedulable event.
    EventId
);

uuid_id!(
    /// Identifies a purchasable ticket tier within an event.
    TicketId
);

uuid_id!(
    /// Identifies a single checkout attempt.
    PaymentId
);

uuid_id!(
    /// Identifies a confirmed attendance slot.
    RegistrationId
);

uuid_id!(
    /// Identifies a membership group used by group-exclusive events.
    GroupId
);
