//! Per-user invoice states.
//!
//! ```text
//! NO_INVOICE ──create──▶ INVOICING ──poll (merge ok)──▶ SETTLED
//!                           │  ▲
//!                           └──┘ poll (pending / ledger down / merge refused)
//! ```
//!
//! SETTLED is reported by the poll that reaches it; afterwards the stores hold
//! nothing for the user, so the next query sees NO_INVOICE again.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvoiceState {
    NoInvoice,
    Invoicing,
    Settled,
}

impl InvoiceState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceState::Settled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceState::NoInvoice => "NO_INVOICE",
            InvoiceState::Invoicing => "INVOICING",
            InvoiceState::Settled => "SETTLED",
        }
    }
}

impl fmt::Display for InvoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
