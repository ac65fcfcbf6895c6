//! Stock shipping domain module.
//!
//! - [`transfer`]: deliveries (pickings) and the invoices produced when they ship
//! - [`shipment_advice`]: groups of transfers loaded together
//! - [`at_shipping`]: invoicing-at-shipping extension points and the
//!   cash-on-delivery policy layered on top of them

pub mod at_shipping;
pub mod shipment_advice;
pub mod transfer;

pub use at_shipping::{
    CashOnDelivery, CashOnDeliveryRecorder, InvoicingAtShipping, InvoicingOutcome,
    customer_invoices_at_shipping, filter_cash_on_delivery,
};
pub use shipment_advice::{
    CreateShipmentAdvice, MarkShipmentDone, PlanTransfers, ShipmentAdvice, ShipmentAdviceCommand,
    ShipmentAdviceCreated, ShipmentAdviceEvent, ShipmentAdviceId, ShipmentDone, ShipmentState,
    ShipmentStarted, ShipmentType, StartShipment, TransfersPlanned,
};
pub use transfer::{
    CashOnDeliveryInvoicesRecorded, CreateTransfer, DoneQuantity,
    InvoicesRecorded, RecordCashOnDeliveryInvoices, RecordInvoices, SaleOrigin, Transfer,
    TransferCommand, TransferCreated, TransferEvent, TransferId, TransferMove,
    TransferState, TransferValidated, ValidateTransfer,
};
