use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use quoteflow_core::{
    Aggregate, AggregateId, AggregateRoot, DocumentKind, DocumentNumber, DomainError, Money,
    TenantId,
};
use quoteflow_events::Event;
use quoteflow_pricing::{ComponentCost, aggregate_total};
use quoteflow_quoting::{ClientQuoteId, ClientQuoteStatus, CostBasisLine};
use quoteflow_rfq::{QuoteLineRef, SupplierId};

use crate::status::OrderStatus;

/// Purchase order identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub AggregateId);

impl PurchaseOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Purchase order line. Supplier cost only; the client price never appears here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub line_no: u32,
    pub name: String,
    pub unit: String,
    pub source: QuoteLineRef,
    pub quantity: Decimal,
    pub unit_cost: Money,
    pub components: Vec<ComponentCost>,
    pub lead_time: Option<String>,
    pub line_cost: Money,
}

/// One entry of the delivery audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub tracking: Option<String>,
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

/// What the order gate needs to know about the client quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaidQuoteSnapshot {
    pub quote_id: ClientQuoteId,
    pub status: ClientQuoteStatus,
    pub total: Money,
    pub paid: Money,
}

impl PaidQuoteSnapshot {
    /// Payment gate for ordering: coverage first, then status.
    pub fn ensure_orderable(&self) -> Result<(), DomainError> {
        let currency = self.total.currency();
        if self.paid.currency() != currency {
            return Err(DomainError::currency_mismatch(currency, self.paid.currency()));
        }
        if self.paid.amount() < self.total.amount() {
            return Err(DomainError::InsufficientPayment {
                required: self.total.clone(),
                recorded: self.paid.clone(),
            });
        }
        if self.status != ClientQuoteStatus::Paid {
            return Err(DomainError::transition(
                "client quote",
                self.status,
                "purchase ordering",
            ));
        }
        Ok(())
    }
}

/// Cost-basis lines of one supplier, ready to become one purchase order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplierOrderLines {
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub lines: Vec<CostBasisLine>,
}

/// Split a client quote's cost basis into one group per supplier, in the
/// order each supplier first appears.
pub fn group_by_supplier(cost_basis: &[CostBasisLine]) -> Vec<SupplierOrderLines> {
    let mut groups: Vec<SupplierOrderLines> = Vec::new();
    for line in cost_basis {
        match groups.iter_mut().find(|g| g.supplier_id == line.supplier_id) {
            Some(group) => group.lines.push(line.clone()),
            None => groups.push(SupplierOrderLines {
                supplier_id: line.supplier_id,
                supplier_name: line.supplier_name.clone(),
                lines: vec![line.clone()],
            }),
        }
    }
    groups
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    tenant_id: Option<TenantId>,
    number: Option<DocumentNumber>,
    quote_id: Option<ClientQuoteId>,
    supplier_id: Option<SupplierId>,
    supplier_name: String,
    lines: Vec<PurchaseOrderLine>,
    total_cost: Option<Money>,
    status: OrderStatus,
    history: Vec<StatusChange>,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: None,
            quote_id: None,
            supplier_id: None,
            supplier_name: String::new(),
            lines: Vec::new(),
            total_cost: None,
            status: OrderStatus::PendingPayment,
            history: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn number(&self) -> Option<&DocumentNumber> {
        self.number.as_ref()
    }

    pub fn quote_id(&self) -> Option<ClientQuoteId> {
        self.quote_id
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn supplier_name(&self) -> &str {
        &self.supplier_name
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[PurchaseOrderLine] {
        &self.lines
    }

    pub fn total_cost(&self) -> Option<&Money> {
        self.total_cost.as_ref()
    }

    pub fn history(&self) -> &[StatusChange] {
        &self.history
    }

    /// Most recent carrier/tracking label, if one was ever given.
    pub fn tracking(&self) -> Option<&str> {
        self.history.iter().rev().find_map(|c| c.tracking.as_deref())
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub number: DocumentNumber,
    pub quote: PaidQuoteSnapshot,
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub lines: Vec<CostBasisLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdvanceOrderStatus.
///
/// `expected_from` is the status the caller last read; when given and it no
/// longer matches, the move is refused as a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceOrderStatus {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub to: OrderStatus,
    pub expected_from: Option<OrderStatus>,
    pub tracking: Option<String>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    AdvanceOrderStatus(AdvanceOrderStatus),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub number: DocumentNumber,
    pub quote_id: ClientQuoteId,
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub lines: Vec<PurchaseOrderLine>,
    pub total_cost: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusAdvanced {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub tracking: Option<String>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    OrderStatusAdvanced(OrderStatusAdvanced),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.order.created",
            PurchaseOrderEvent::OrderStatusAdvanced(_) => "purchasing.order.status_advanced",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::OrderStatusAdvanced(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = Some(e.number.clone());
                self.quote_id = Some(e.quote_id);
                self.supplier_id = Some(e.supplier_id);
                self.supplier_name = e.supplier_name.clone();
                self.lines = e.lines.clone();
                self.total_cost = Some(e.total_cost.clone());
                self.status = OrderStatus::PendingPayment;
                self.history.clear();
                self.created = true;
            }
            PurchaseOrderEvent::OrderStatusAdvanced(e) => {
                self.history.push(StatusChange {
                    from: e.from,
                    to: e.to,
                    tracking: e.tracking.clone(),
                    note: e.note.clone(),
                    at: e.occurred_at,
                });
                self.status = e.to;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => self.handle_create(cmd),
            PurchaseOrderCommand::AdvanceOrderStatus(cmd) => self.handle_advance(cmd),
        }
    }
}

fn trimmed(text: &Option<String>) -> Option<String> {
    text.as_ref()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

impl PurchaseOrder {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(
        &self,
        cmd: &CreatePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }
        if cmd.number.kind() != DocumentKind::PurchaseOrder {
            return Err(DomainError::validation("number", "must be a PO number"));
        }

        let quote = &cmd.quote;
        quote.ensure_orderable()?;
        let currency = quote.total.currency();

        if cmd.lines.is_empty() {
            return Err(DomainError::validation("lines", "at least one line is required"));
        }
        if cmd.supplier_name.trim().is_empty() {
            return Err(DomainError::validation("supplier_name", "must not be empty"));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, basis) in cmd.lines.iter().enumerate() {
            if basis.supplier_id != cmd.supplier_id {
                return Err(DomainError::validation(
                    format!("lines[{idx}].supplier_id"),
                    "belongs to a different supplier",
                ));
            }
            if basis.unit_cost.currency() != currency {
                return Err(DomainError::currency_mismatch(
                    currency,
                    basis.unit_cost.currency(),
                ));
            }
            lines.push(PurchaseOrderLine {
                line_no: basis.line_no,
                name: basis.name.clone(),
                unit: basis.unit.clone(),
                source: basis.source,
                quantity: basis.quantity,
                unit_cost: basis.unit_cost.clone(),
                components: basis.components.clone(),
                lead_time: basis.lead_time.clone(),
                line_cost: basis.cost_line().cost_total()?,
            });
        }
        let total_cost = aggregate_total(currency, lines.iter().map(|l| &l.line_cost))?;

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(
            PurchaseOrderCreated {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                number: cmd.number.clone(),
                quote_id: quote.quote_id,
                supplier_id: cmd.supplier_id,
                supplier_name: cmd.supplier_name.trim().to_string(),
                lines,
                total_cost,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_advance(
        &self,
        cmd: &AdvanceOrderStatus,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if let Some(expected) = cmd.expected_from {
            if expected != self.status {
                return Err(DomainError::conflict(format!(
                    "purchase order is {}, not {expected}",
                    self.status
                )));
            }
        }
        if !self.status.can_transition_to(cmd.to) {
            return Err(DomainError::transition("purchase order", self.status, cmd.to));
        }

        Ok(vec![PurchaseOrderEvent::OrderStatusAdvanced(
            OrderStatusAdvanced {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                from: self.status,
                to: cmd.to,
                tracking: trimmed(&cmd.tracking),
                note: trimmed(&cmd.note),
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use quoteflow_core::CurrencyCode;
    use quoteflow_rfq::SupplierRfqId;
    use rust_decimal_macros::dec;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn cad(amount: Decimal) -> Money {
        Money::new(amount, CurrencyCode::new("CAD").unwrap())
    }

    fn basis(supplier_id: SupplierId, unit_cost: Decimal, quantity: Decimal) -> CostBasisLine {
        CostBasisLine {
            line_no: 1,
            name: "Sofa".into(),
            unit: "each".into(),
            source: QuoteLineRef {
                supplier_rfq_id: SupplierRfqId::new(AggregateId::new()),
                revision: 1,
                line_index: 0,
            },
            supplier_id,
            supplier_name: "Acme Upholstery".into(),
            unit_cost: cad(unit_cost),
            quantity,
            components: vec![],
            lead_time: Some("6 weeks".into()),
            cost_total: cad(unit_cost * quantity),
        }
    }

    fn create_cmd(status: ClientQuoteStatus, total: Decimal, paid: Decimal) -> CreatePurchaseOrder {
        let supplier_id = SupplierId::new(AggregateId::new());
        CreatePurchaseOrder {
            tenant_id: TenantId::new(),
            order_id: PurchaseOrderId::new(AggregateId::new()),
            number: DocumentNumber::new(DocumentKind::PurchaseOrder, 2031, 1).unwrap(),
            quote: PaidQuoteSnapshot {
                quote_id: ClientQuoteId::new(AggregateId::new()),
                status,
                total: cad(total),
                paid: cad(paid),
            },
            supplier_id,
            supplier_name: "Acme Upholstery".into(),
            lines: vec![basis(supplier_id, dec!(1000.00), dec!(1))],
            occurred_at: test_time(),
        }
    }

    fn created_order() -> (PurchaseOrder, TenantId, PurchaseOrderId) {
        let cmd = create_cmd(ClientQuoteStatus::Paid, dec!(1250.00), dec!(1250.00));
        let (tenant_id, order_id) = (cmd.tenant_id, cmd.order_id);
        let mut order = PurchaseOrder::empty(order_id);
        let events = order
            .handle(&PurchaseOrderCommand::CreatePurchaseOrder(cmd))
            .unwrap();
        order.apply(&events[0]);
        (order, tenant_id, order_id)
    }

    fn advance(order: &mut PurchaseOrder, tenant_id: TenantId, to: OrderStatus) {
        let events = order
            .handle(&PurchaseOrderCommand::AdvanceOrderStatus(AdvanceOrderStatus {
                tenant_id,
                order_id: order.id_typed(),
                to,
                expected_from: None,
                tracking: None,
                note: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);
    }

    #[test]
    fn order_lines_carry_supplier_cost() {
        let (order, _, _) = created_order();
        assert_eq!(order.status(), OrderStatus::PendingPayment);
        assert_eq!(order.lines()[0].unit_cost, cad(dec!(1000.00)));
        assert_eq!(order.lines()[0].quantity, dec!(1));
        assert_eq!(order.total_cost(), Some(&cad(dec!(1000.00))));
        assert_eq!(order.number().unwrap().to_string(), "PO-2031-0001");
    }

    #[test]
    fn one_cent_short_is_insufficient_payment() {
        let cmd = create_cmd(ClientQuoteStatus::Approved, dec!(5000.00), dec!(4999.99));
        let err = PurchaseOrder::empty(cmd.order_id)
            .handle(&PurchaseOrderCommand::CreatePurchaseOrder(cmd))
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientPayment {
                required: cad(dec!(5000.00)),
                recorded: cad(dec!(4999.99)),
            }
        );
    }

    #[test]
    fn covered_but_unpaid_quote_is_a_transition_error() {
        let cmd = create_cmd(ClientQuoteStatus::Approved, dec!(5000.00), dec!(5000.00));
        let err = PurchaseOrder::empty(cmd.order_id)
            .handle(&PurchaseOrderCommand::CreatePurchaseOrder(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::StateTransition { .. }));
    }

    #[test]
    fn foreign_supplier_line_is_rejected() {
        let mut cmd = create_cmd(ClientQuoteStatus::Paid, dec!(10), dec!(10));
        cmd.lines.push(basis(SupplierId::new(AggregateId::new()), dec!(5), dec!(1)));
        let err = PurchaseOrder::empty(cmd.order_id)
            .handle(&PurchaseOrderCommand::CreatePurchaseOrder(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { ref field, .. } if field == "lines[1].supplier_id"));
    }

    #[test]
    fn shipped_to_installed_is_rejected_and_status_kept() {
        let (mut order, tenant_id, order_id) = created_order();
        for to in [
            OrderStatus::PaymentReceived,
            OrderStatus::Ordered,
            OrderStatus::Confirmed,
            OrderStatus::InProduction,
            OrderStatus::Shipped,
        ] {
            advance(&mut order, tenant_id, to);
        }

        let version = order.version();
        let err = order
            .handle(&PurchaseOrderCommand::AdvanceOrderStatus(AdvanceOrderStatus {
                tenant_id,
                order_id,
                to: OrderStatus::Installed,
                expected_from: Some(OrderStatus::Shipped),
                tracking: None,
                note: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::transition("purchase order", OrderStatus::Shipped, OrderStatus::Installed)
        );
        assert_eq!(order.status(), OrderStatus::Shipped);
        assert_eq!(order.version(), version);
    }

    #[test]
    fn history_records_tracking_labels() {
        let (mut order, tenant_id, order_id) = created_order();
        for to in [
            OrderStatus::PaymentReceived,
            OrderStatus::Ordered,
            OrderStatus::Confirmed,
            OrderStatus::InProduction,
        ] {
            advance(&mut order, tenant_id, to);
        }
        let events = order
            .handle(&PurchaseOrderCommand::AdvanceOrderStatus(AdvanceOrderStatus {
                tenant_id,
                order_id,
                to: OrderStatus::Shipped,
                expected_from: Some(OrderStatus::InProduction),
                tracking: Some(" Purolator 3312-88 ".into()),
                note: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);

        assert_eq!(order.history().len(), 5);
        assert_eq!(order.tracking(), Some("Purolator 3312-88"));
        let last = order.history().last().unwrap();
        assert_eq!((last.from, last.to), (OrderStatus::InProduction, OrderStatus::Shipped));
    }

    #[test]
    fn stale_expected_status_is_a_conflict() {
        let (mut order, tenant_id, order_id) = created_order();
        advance(&mut order, tenant_id, OrderStatus::PaymentReceived);
        let err = order
            .handle(&PurchaseOrderCommand::AdvanceOrderStatus(AdvanceOrderStatus {
                tenant_id,
                order_id,
                to: OrderStatus::PaymentReceived,
                expected_from: Some(OrderStatus::PendingPayment),
                tracking: None,
                note: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn group_by_supplier_keeps_first_appearance_order() {
        let a = SupplierId::new(AggregateId::new());
        let b = SupplierId::new(AggregateId::new());
        let groups = group_by_supplier(&[
            basis(b, dec!(1), dec!(1)),
            basis(a, dec!(2), dec!(1)),
            basis(b, dec!(3), dec!(1)),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].supplier_id, b);
        assert_eq!(groups[0].lines.len(), 2);
        assert_eq!(groups[1].supplier_id, a);
    }

    fn any_status() -> impl Strategy<Value = OrderStatus> {
        prop::sample::select(vec![
            OrderStatus::PendingPayment,
            OrderStatus::PaymentReceived,
            OrderStatus::Ordered,
            OrderStatus::Confirmed,
            OrderStatus::InProduction,
            OrderStatus::Shipped,
            OrderStatus::InTransit,
            OrderStatus::Delivered,
            OrderStatus::Installed,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ])
    }

    proptest! {
        /// From any reachable status, a requested move either is the next step
        /// or cancellation and succeeds, or fails with StateTransition and
        /// leaves the order untouched.
        #[test]
        fn transitions_are_forward_one_step_or_cancel(
            walk in 0usize..10,
            target in any_status(),
        ) {
            let (mut order, tenant_id, order_id) = created_order();
            for to in OrderStatus::CHAIN.iter().skip(1).take(walk) {
                advance(&mut order, tenant_id, *to);
            }
            let from = order.status();
            let before = order.clone();

            let result = order.handle(&PurchaseOrderCommand::AdvanceOrderStatus(AdvanceOrderStatus {
                tenant_id,
                order_id,
                to: target,
                expected_from: None,
                tracking: None,
                note: None,
                occurred_at: test_time(),
            }));

            let allowed = !from.is_terminal()
                && (target == OrderStatus::Cancelled || from.next() == Some(target));
            match result {
                Ok(events) => {
                    prop_assert!(allowed);
                    order.apply(&events[0]);
                    prop_assert_eq!(order.status(), target);
                }
                Err(err) => {
                    prop_assert!(!allowed);
                    let is_transition = matches!(err, DomainError::StateTransition { .. });
                    prop_assert!(is_transition);
                    prop_assert_eq!(order, before);
                }
            }
        }
    }
}
