use storefront_core::UserId;
use storefront_infra::Caller;

/// Caller context for a request (identity + privilege flag).
///
/// Inserted by the identity middleware; present for all order routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CallerContext {
    caller: Caller,
}

impl CallerContext {
    pub fn new(caller: Caller) -> Self {
        Self { caller }
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    pub fn user_id(&self) -> UserId {
        self.caller.user_id
    }
}
