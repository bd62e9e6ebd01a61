//! Client quote domain module (event-sourced).
//!
//! A `ClientQuote` is an immutable pricing snapshot of the accepted supplier
//! terms for one RFQ, marked up for the client. Its supplier cost lineage is
//! kept beside the client-facing lines, never inside them.

pub mod builder;
pub mod client_quote;
pub mod status;

pub use builder::{
    AcceptedItem, ClientQuoteLine, CostBasisLine, MarkupPlan, PricedQuote, accepted_items,
    price_items,
};
pub use client_quote::{
    ApproveQuote, BuildClientQuote, ClientPayment, ClientQuote, ClientQuoteApproved,
    ClientQuoteBuilt, ClientQuoteCommand, ClientQuoteEvent, ClientQuoteId,
    ClientQuoteRejected, ClientQuoteSent, ClientQuoteSuperseded, ClientReviewStarted, IssuedOrder,
    MarkClientReviewing, MarkSuperseded, PaymentRecorded, PurchaseOrdersRecorded,
    PurchaseOrdersReserved, RecordPayment, RecordPurchaseOrders, RejectQuote, RequestRevision,
    ReservePurchaseOrders, RevisionRequested, SendToClient,
};
pub use status::ClientQuoteStatus;
