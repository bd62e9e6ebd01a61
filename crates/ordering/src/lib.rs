//! Purchasing domain module (purchase orders and delivery tracking, event-sourced).
//!
//! Purchase orders are placed from a paid client quote, one per supplier,
//! and carry supplier cost only. Deterministic domain logic; no IO.

pub mod order;
pub mod status;

pub use order::{
    AdvanceOrderStatus, CreatePurchaseOrder, OrderStatusAdvanced, PaidQuoteSnapshot,
    PurchaseOrder, PurchaseOrderCommand, PurchaseOrderCreated, PurchaseOrderEvent,
    PurchaseOrderId, PurchaseOrderLine, StatusChange, SupplierOrderLines, group_by_supplier,
};
pub use status::OrderStatus;
