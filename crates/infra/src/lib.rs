//! Infrastructure layer: event storage, dispatch, read models, configuration
//! and the procurement workflow service.

pub mod command_dispatcher;
pub mod config;
pub mod credentials;
pub mod event_store;
pub mod extraction;
pub mod projections;
pub mod read_model;
pub mod sequence;
pub mod services;


/// Aggregate type names recorded on every stored event.
pub mod streams {
    pub const RFQ: &str = "rfq";
    pub const CLIENT_QUOTE: &str = "quoting.client_quote";
    pub const PURCHASE_ORDER: &str = "ordering.purchase_order";
}

pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use config::ProcurementConfig;
pub use services::{
    ClientQuoteRequest, Clock, ManualClock, NewRfq, OrderPlacement, PaymentStatus, ProcurementService,
    ServiceResult, SubmissionReceipt, SupplierInvitation, SupplierSubmission, SupplierView,
    SweepReport, SystemClock,
};
