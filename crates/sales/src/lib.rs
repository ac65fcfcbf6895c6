//! Sales orders domain module (event-sourced).
//!
//! Orders carry the customer and payment term that the shipping flow reads
//! when deciding whether (and how) a delivery gets invoiced.

pub mod order;

pub use order::{
    AddLine, ConfirmOrder, CreateSalesOrder, LineAdded, MarkInvoiced, OrderConfirmed,
    OrderCustomer, OrderInvoiced, OrderLine, SalesOrder, SalesOrderCommand, SalesOrderCreated,
    SalesOrderEvent, SalesOrderId, SalesOrderStatus,
};
