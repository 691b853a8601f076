//! Payment status machine.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Refunded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "succeeded" => Some(Self::Succeeded),
            "refunded" => Some(Self::Refunded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Forward-only transitions:
    /// pending -> succeeded | failed
    /// succeeded -> refunded
    /// refunded and failed are terminal.
    pub fn can_transition_to(self, to: PaymentStatus) -> bool {
        match self {
            Self::Pending => matches!(to, Self::Succeeded | Self::Failed),
            Self::Succeeded => matches!(to, Self::Refunded),
            Self::Refunded | Self::Failed => false,
        }
    }
}
