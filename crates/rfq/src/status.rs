use serde::{Deserialize, Serialize};

/// RFQ lifecycle.
///
/// `DRAFT → SENT → {PARTIALLY_QUOTED, FULLY_QUOTED} → QUOTE_ACCEPTED`, with
/// `EXPIRED` and `CANCELLED` as side exits. The only backward move is the
/// audited reopen, which is not part of this table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RfqStatus {
    Draft,
    Sent,
    PartiallyQuoted,
    FullyQuoted,
    QuoteAccepted,
    Expired,
    Cancelled,
}

impl RfqStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RfqStatus::QuoteAccepted | RfqStatus::Expired | RfqStatus::Cancelled
        )
    }

    /// Supplier responses can be recorded.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            RfqStatus::Sent | RfqStatus::PartiallyQuoted | RfqStatus::FullyQuoted
        )
    }

    /// Subject to deadline expiry. A fully quoted RFQ waits for acceptance instead.
    pub fn can_expire(self) -> bool {
        matches!(self, RfqStatus::Sent | RfqStatus::PartiallyQuoted)
    }

    pub fn can_transition_to(self, next: RfqStatus) -> bool {
        use RfqStatus::*;
        match (self, next) {
            (Draft, Sent) => true,
            (Sent, PartiallyQuoted | FullyQuoted) => true,
            (PartiallyQuoted, FullyQuoted) => true,
            (PartiallyQuoted | FullyQuoted, QuoteAccepted) => true,
            (Sent | PartiallyQuoted, Expired) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RfqStatus::Draft => "DRAFT",
            RfqStatus::Sent => "SENT",
            RfqStatus::PartiallyQuoted => "PARTIALLY_QUOTED",
            RfqStatus::FullyQuoted => "FULLY_QUOTED",
            RfqStatus::QuoteAccepted => "QUOTE_ACCEPTED",
            RfqStatus::Expired => "EXPIRED",
            RfqStatus::Cancelled => "CANCELLED",
        }
    }
}

impl core::fmt::Display for RfqStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-supplier response lifecycle: `PENDING → VIEWED → {SUBMITTED, DECLINED}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Pending,
    Viewed,
    Submitted,
    Declined,
}

impl ResponseStatus {
    /// Still owes the studio an answer.
    pub fn is_outstanding(self) -> bool {
        matches!(self, ResponseStatus::Pending | ResponseStatus::Viewed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResponseStatus::Pending => "PENDING",
            ResponseStatus::Viewed => "VIEWED",
            ResponseStatus::Submitted => "SUBMITTED",
            ResponseStatus::Declined => "DECLINED",
        }
    }
}

impl core::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status after a submission or decline, given every supplier's response status.
///
/// Nothing outstanding means fully quoted; at least one submission with some
/// still outstanding means partially quoted; otherwise the status is kept.
pub fn recompute(current: RfqStatus, responses: impl IntoIterator<Item = ResponseStatus>) -> RfqStatus {
    let mut any_outstanding = false;
    let mut any_submitted = false;
    for r in responses {
        any_outstanding |= r.is_outstanding();
        any_submitted |= r == ResponseStatus::Submitted;
    }

    let next = if !any_outstanding {
        RfqStatus::FullyQuoted
    } else if any_submitted {
        RfqStatus::PartiallyQuoted
    } else {
        current
    };

    if next == current || current.can_transition_to(next) {
        next
    } else {
        current
    }
}
