//! Invoicing domain module (event-sourced).
//!
//! Customer invoices generated from deliveries. Each invoice remembers the
//! payment term it was issued under; the shipping flow filters invoices on it.

pub mod invoice;

pub use invoice::{
    CreateInvoice, Invoice, InvoiceCommand, InvoiceCreated, InvoiceEvent, InvoiceId,
    InvoiceLine, InvoiceLookup, InvoicePartner, InvoicePosted, InvoiceStatus, PostInvoice,
};
