//! Parties domain module: contacts (customers, carriers) and their addresses.
//!
//! Besides the usual identity data, a contact carries the identifiers used by
//! the external delivery-routing system and can render its address in the
//! flat format that system imports.

pub mod address;
pub mod contact;

pub use address::{
    ADDRESS_FIELDS, Address, AddressTemplate, Country, DEFAULT_ROUTING_ADDRESS_FORMAT, State,
    TemplateError,
};
pub use contact::{
    Contact, ContactCommand, ContactEvent, ContactId, ContactRegistered, ContactUpdated,
    InvoicingMode, RegisterContact, RoutingRef, UpdateContact,
};
