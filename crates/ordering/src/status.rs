use serde::{Deserialize, Serialize};

/// Purchase order status chain. Moves one step forward at a time, or to
/// `Cancelled` from any non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingPayment,
    PaymentReceived,
    Ordered,
    Confirmed,
    InProduction,
    Shipped,
    InTransit,
    Delivered,
    Installed,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const CHAIN: [OrderStatus; 10] = [
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
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// The single forward successor, if any.
    pub fn next(self) -> Option<OrderStatus> {
        let idx = Self::CHAIN.iter().position(|s| *s == self)?;
        Self::CHAIN.get(idx + 1).copied()
    }

    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == OrderStatus::Cancelled || self.next() == Some(to)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::PaymentReceived => "PAYMENT_RECEIVED",
            OrderStatus::Ordered => "ORDERED",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::InProduction => "IN_PRODUCTION",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::InTransit => "IN_TRANSIT",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Installed => "INSTALLED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_walks_to_completed() {
        let mut status = OrderStatus::PendingPayment;
        let mut steps = 0;
        while let Some(next) = status.next() {
            assert!(status.can_transition_to(next));
            status = next;
            steps += 1;
        }
        assert_eq!(status, OrderStatus::Completed);
        assert_eq!(steps, 9);
    }

    #[test]
    fn shipped_cannot_jump_to_installed() {
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Installed));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::InTransit));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn terminal_statuses_go_nowhere() {
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Cancelled));
        assert_eq!(OrderStatus::Cancelled.next(), None);
    }
}
