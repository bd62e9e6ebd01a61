use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

use quoteflow_core::{AggregateId, DocumentKind, DocumentNumber, DomainError, Money, TenantId};
use quoteflow_events::{EventBus, EventEnvelope};
use quoteflow_ordering::{
    AdvanceOrderStatus, CreatePurchaseOrder, OrderStatus, PaidQuoteSnapshot, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderId, group_by_supplier,
};
use quoteflow_quoting::{
    ClientQuote, ClientQuoteCommand, ClientQuoteId, IssuedOrder, RecordPurchaseOrders,
    ReservePurchaseOrders,
};
use quoteflow_rfq::SupplierId;

use super::{ProcurementService, ServiceResult};
use crate::event_store::EventStore;
use crate::streams;

/// One purchase order issued for a paid client quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPlacement {
    pub order_id: PurchaseOrderId,
    pub number: DocumentNumber,
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub total_cost: Money,
}

impl<S, B> ProcurementService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Issue one purchase order per supplier for a fully paid client quote.
    ///
    /// Orders are created once. The quote first reserves every order id and
    /// number with a version-checked write; only the reserved orders are ever
    /// created, so a retry or a concurrent caller completes the same set.
    pub fn create_purchase_orders(
        &self,
        tenant_id: TenantId,
        quote_id: ClientQuoteId,
    ) -> ServiceResult<Vec<OrderPlacement>> {
        let (mut quote, mut quote_version) = self.load_quote(tenant_id, quote_id)?;

        if quote.reserved_orders().is_empty() {
            let reserved = self.reserve_orders(tenant_id, &quote, quote_version);
            (quote, quote_version) = self.load_quote(tenant_id, quote_id)?;
            if let Err(err) = reserved {
                if quote.reserved_orders().is_empty() {
                    return Err(err);
                }
                warn!(
                    tenant_id = %tenant_id,
                    quote_id = %quote_id,
                    error = %err,
                    "purchase orders already reserved by another request; completing that reservation"
                );
            }
        }

        if quote.purchase_orders().is_empty() {
            self.complete_reservation(tenant_id, &quote, quote_version)?;
        }

        quote
            .reserved_orders()
            .iter()
            .map(|reserved| self.placement(tenant_id, PurchaseOrderId::new(reserved.order_id)))
            .collect()
    }

    fn reserve_orders(&self, tenant_id: TenantId, quote: &ClientQuote, quote_version: u64) -> ServiceResult<()> {
        let quote_id = quote.id_typed();

        // Gate before numbers are allocated so a refused attempt leaves no gaps.
        snapshot_of(quote)?.ensure_orderable()?;

        let groups = group_by_supplier(quote.cost_basis());
        if groups.is_empty() {
            return Err(DomainError::validation("cost_basis", "client quote has no accepted lines").into());
        }

        let now = self.now();
        let mut orders = Vec::with_capacity(groups.len());
        for group in &groups {
            orders.push(IssuedOrder {
                order_id: AggregateId::new(),
                number: self.sequences.allocate(tenant_id, DocumentKind::PurchaseOrder, now)?,
                supplier_id: group.supplier_id,
            });
        }

        let count = orders.len();
        self.dispatcher.dispatch_expecting(
            tenant_id,
            quote_id.0,
            streams::CLIENT_QUOTE,
            quote_version,
            ClientQuoteCommand::ReservePurchaseOrders(ReservePurchaseOrders {
                tenant_id,
                quote_id,
                orders,
                occurred_at: now,
            }),
            |_, id| ClientQuote::empty(ClientQuoteId::new(id)),
        )?;
        info!(tenant_id = %tenant_id, quote_id = %quote_id, orders = count, "purchase orders reserved");
        Ok(())
    }

    /// Create whatever reserved orders do not exist yet, then record the set.
    fn complete_reservation(&self, tenant_id: TenantId, quote: &ClientQuote, quote_version: u64) -> ServiceResult<()> {
        let quote_id = quote.id_typed();
        let snapshot = snapshot_of(quote)?;
        let mut groups = group_by_supplier(quote.cost_basis());
        let now = self.now();

        for reserved in quote.reserved_orders() {
            let order_id = PurchaseOrderId::new(reserved.order_id);
            if self.order_exists(tenant_id, order_id)? {
                continue;
            }
            let group = groups
                .iter()
                .position(|g| g.supplier_id == reserved.supplier_id)
                .map(|idx| groups.swap_remove(idx))
                .ok_or_else(|| DomainError::invariant("reserved supplier has no accepted lines"))?;

            let created = self.run_order(
                tenant_id,
                order_id,
                PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                    tenant_id,
                    order_id,
                    number: reserved.number,
                    quote: snapshot.clone(),
                    supplier_id: group.supplier_id,
                    supplier_name: group.supplier_name.clone(),
                    lines: group.lines,
                    occurred_at: now,
                }),
            );
            match created {
                Ok(order) => info!(
                    tenant_id = %tenant_id,
                    quote_id = %quote_id,
                    order_id = %order_id,
                    number = %reserved.number,
                    supplier_id = %reserved.supplier_id,
                    total_cost = ?order.total_cost(),
                    "purchase order created"
                ),
                Err(err) if matches!(self.order_exists(tenant_id, order_id), Ok(true)) => debug!(
                    order_id = %order_id,
                    error = %err,
                    "reserved purchase order created concurrently"
                ),
                Err(err) => return Err(err),
            }
        }

        let recorded = self.dispatcher.dispatch_expecting(
            tenant_id,
            quote_id.0,
            streams::CLIENT_QUOTE,
            quote_version,
            ClientQuoteCommand::RecordPurchaseOrders(RecordPurchaseOrders {
                tenant_id,
                quote_id,
                orders: quote.reserved_orders().to_vec(),
                occurred_at: now,
            }),
            |_, id| ClientQuote::empty(ClientQuoteId::new(id)),
        );
        if let Err(err) = recorded {
            let (current, _) = self.load_quote(tenant_id, quote_id)?;
            if current.purchase_orders() == quote.reserved_orders() {
                return Ok(());
            }
            error!(
                tenant_id = %tenant_id,
                quote_id = %quote_id,
                orders = quote.reserved_orders().len(),
                error = %err,
                "reserved purchase orders created but not recorded on the client quote"
            );
            return Err(err);
        }
        Ok(())
    }

    /// Move a purchase order one step along its lifecycle (or cancel it).
    ///
    /// `expected_from` is the status the caller saw; a different stored status
    /// is a conflict. `tracking` is a free-text carrier/tracking label.
    pub fn advance_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        to: OrderStatus,
        expected_from: Option<OrderStatus>,
        tracking: Option<String>,
        note: Option<String>,
    ) -> ServiceResult<OrderStatus> {
        let order = self.run_order(
            tenant_id,
            order_id,
            PurchaseOrderCommand::AdvanceOrderStatus(AdvanceOrderStatus {
                tenant_id,
                order_id,
                to,
                expected_from,
                tracking,
                note,
                occurred_at: self.now(),
            }),
        )?;
        info!(
            tenant_id = %tenant_id,
            order_id = %order_id,
            status = %order.status(),
            tracking = order.tracking().unwrap_or_default(),
            "purchase order advanced"
        );
        Ok(order.status())
    }

    fn order_exists(&self, tenant_id: TenantId, order_id: PurchaseOrderId) -> ServiceResult<bool> {
        let (order, _) = self.dispatcher.load(tenant_id, order_id.0, |_, id| {
            PurchaseOrder::empty(PurchaseOrderId::new(id))
        })?;
        Ok(order.is_created())
    }

    fn placement(&self, tenant_id: TenantId, order_id: PurchaseOrderId) -> ServiceResult<OrderPlacement> {
        let order = self.purchase_order(tenant_id, order_id)?;
        Ok(OrderPlacement {
            order_id,
            number: *order.number().ok_or(DomainError::NotFound)?,
            supplier_id: order.supplier_id().ok_or(DomainError::NotFound)?,
            supplier_name: order.supplier_name().to_string(),
            total_cost: order.total_cost().cloned().ok_or(DomainError::NotFound)?,
        })
    }
}

fn snapshot_of(quote: &ClientQuote) -> Result<PaidQuoteSnapshot, DomainError> {
    let total = quote
        .total()
        .cloned()
        .ok_or_else(|| DomainError::invariant("client quote has no total"))?;
    let paid = quote.paid().unwrap_or_else(|| Money::zero(total.currency().clone()));
    Ok(PaidQuoteSnapshot {
        quote_id: quote.id_typed(),
        status: quote.status(),
        total,
        paid,
    })
}
