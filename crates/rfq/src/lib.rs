//! RFQ domain module (requests for quote and supplier responses, event-sourced).
//!
//! The `Rfq` aggregate owns the request, every invited supplier's response,
//! the reconciled supplier quotes, and the per-line acceptances the client
//! quote is later built from. Deterministic domain logic only: no IO, no
//! clock reads, no storage.

pub mod acceptance;
pub mod quote;
pub mod rfq;
pub mod status;
pub mod supplier;

pub use acceptance::{Acceptance, Offer, QuoteLineRef};
pub use quote::{
    ComponentEntry, DocumentRef, ManualEntry, QuoteSubmission, SupplierQuote, SupplierQuoteLine,
};
pub use rfq::{
    AcceptLineItem, AcceptanceFinalized, CancelRfq, CreateRfq, DeclineRfq, ExpireRfq,
    FinalizeAcceptance, InviteSupplier, LineItemAccepted, NewRfqLine, PermitRevision,
    RecordSupplierView, ReopenRfq, RevisionPermitted, Rfq, RfqCancelled, RfqCommand, RfqCreated,
    RfqEvent, RfqExpired, RfqId, RfqLineItem, RfqReopened, RfqSent, SendRfq,
    SubmitSupplierQuote, SupplierDeclined, SupplierInvited, SupplierQuoteSubmitted,
    SupplierViewed,
};
pub use status::{ResponseStatus, RfqStatus};
pub use supplier::{AccessToken, SupplierId, SupplierRfq, SupplierRfqId};
