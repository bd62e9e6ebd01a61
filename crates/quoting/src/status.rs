use serde::{Deserialize, Serialize};

/// Client quote lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientQuoteStatus {
    Draft,
    SentToClient,
    ClientReviewing,
    Approved,
    RevisionRequested,
    Rejected,
    Paid,
    /// Replaced by a newer revision. Retained, never deleted.
    Superseded,
}

impl ClientQuoteStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ClientQuoteStatus::Rejected | ClientQuoteStatus::Paid | ClientQuoteStatus::Superseded
        )
    }

    pub fn can_transition_to(self, next: ClientQuoteStatus) -> bool {
        use ClientQuoteStatus::*;
        match (self, next) {
            (Draft, SentToClient) => true,
            (SentToClient, ClientReviewing) => true,
            (ClientReviewing, Approved | RevisionRequested | Rejected) => true,
            (Approved, Paid) => true,
            (Draft | SentToClient | ClientReviewing | RevisionRequested, Superseded) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClientQuoteStatus::Draft => "DRAFT",
            ClientQuoteStatus::SentToClient => "SENT_TO_CLIENT",
            ClientQuoteStatus::ClientReviewing => "CLIENT_REVIEWING",
            ClientQuoteStatus::Approved => "APPROVED",
            ClientQuoteStatus::RevisionRequested => "REVISION_REQUESTED",
            ClientQuoteStatus::Rejected => "REJECTED",
            ClientQuoteStatus::Paid => "PAID",
            ClientQuoteStatus::Superseded => "SUPERSEDED",
        }
    }
}

impl core::fmt::Display for ClientQuoteStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
