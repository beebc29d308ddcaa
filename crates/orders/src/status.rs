//! Order status lifecycle and its transition table.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use storefront_core::DomainError;

/// Order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Statuses reachable from `self` in a single forward step.
    pub fn next_statuses(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Paid, Cancelled],
            Paid => &[Processing, Shipped, Cancelled, Refunded],
            Processing => &[Shipped, Cancelled],
            Shipped => &[Delivered],
            Delivered | Cancelled | Refunded => &[],
        }
    }

    /// Whether an update may move an order from `self` to `to`.
    ///
    /// Re-asserting the current status is always accepted; it never
    /// overwrites milestone timestamps.
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        self == to || self.next_statuses().contains(&to)
    }

    pub fn is_terminal(self) -> bool {
        self.next_statuses().is_empty()
    }

    /// Statuses whose totals count as realised revenue.
    pub fn counts_as_revenue(self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered
        )
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(DomainError::validation(format!("unknown order status '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn forward_progress_is_allowed() {
        assert!(Pending.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Processing));
        assert!(Paid.can_transition_to(Shipped));
        assert!(Processing.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
    }

    #[test]
    fn backward_moves_are_rejected() {
        assert!(!Delivered.can_transition_to(Pending));
        assert!(!Shipped.can_transition_to(Paid));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Shipped.can_transition_to(Cancelled));
    }

    #[test]
    fn terminal_states_only_accept_themselves() {
        for terminal in [Delivered, Cancelled, Refunded] {
            assert!(terminal.is_terminal());
            for to in OrderStatus::ALL {
                assert_eq!(terminal.can_transition_to(to), terminal == to);
            }
        }
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Shipped".parse::<OrderStatus>().unwrap(), Shipped);
        assert!("lost".parse::<OrderStatus>().is_err());
        for s in OrderStatus::ALL {
            assert_eq!(s.as_str().parse::<OrderStatus>().unwrap(), s);
        }
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn any_status() -> impl Strategy<Value = OrderStatus> {
            proptest::sample::select(OrderStatus::ALL.to_vec())
        }

        proptest! {
            /// Property: following any accepted path never leaves a terminal state.
            #[test]
            fn terminal_states_are_absorbing(path in proptest::collection::vec(any_status(), 1..12)) {
                let mut current = Pending;
                let mut reached_terminal: Option<OrderStatus> = None;
                for next in path {
                    if current.can_transition_to(next) {
                        current = next;
                    }
                    if let Some(t) = reached_terminal {
                        prop_assert_eq!(current, t);
                    } else if current.is_terminal() {
                        reached_terminal = Some(current);
                    }
                }
            }
        }
    }
}
