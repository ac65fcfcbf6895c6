//! Payment terms domain module (event-sourced).
//!
//! A payment term carries the policy flags read by the shipping flow:
//! whether the customer pays on delivery and whether invoices generated at
//! shipping are validated right away.

pub mod term;

pub use term::{
    ChangePolicy, CreatePaymentTerm, PaymentTerm, PaymentTermCommand, PaymentTermCreated,
    PaymentTermEvent, PaymentTermId, PaymentTermLookup, PaymentTermPolicy, PolicyChanged,
};
