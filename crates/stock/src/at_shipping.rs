//! Invoicing at shipping.
//!
//! The shipping flow asks two questions of a validated transfer: should it be
//! invoiced right away, and if so which invoices came out of it. Both live on
//! [`InvoicingAtShipping`] so policies can be stacked as decorators over a base
//! implementation; [`CashOnDelivery`] is one such policy.

use shipadvice_core::{DomainResult, TenantId};
use shipadvice_invoicing::{InvoiceId, InvoiceLookup};
use shipadvice_parties::InvoicingMode;
use shipadvice_payment_terms::PaymentTermLookup;
use tracing::debug;

use crate::transfer::{Transfer, TransferId};

/// Result of invoicing a transfer at shipping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoicingOutcome {
    /// Invoices generated (or previously generated) for the transfer.
    Invoices(Vec<InvoiceId>),
    /// Work handed to the job queue; carries a status such as the job id.
    Deferred(String),
}

impl InvoicingOutcome {
    pub fn invoices(&self) -> Option<&[InvoiceId]> {
        match self {
            InvoicingOutcome::Invoices(ids) => Some(ids),
            InvoicingOutcome::Deferred(_) => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, InvoicingOutcome::Deferred(_))
    }
}

pub trait InvoicingAtShipping {
    /// Whether validating `transfer` should trigger invoicing. No side effects.
    fn should_invoice_at_shipping(&self, tenant_id: TenantId, transfer: &Transfer) -> bool;

    /// Produce the invoices of a validated transfer, or defer the work.
    fn invoicing_at_shipping(
        &self,
        tenant_id: TenantId,
        transfer: &Transfer,
    ) -> DomainResult<InvoicingOutcome>;
}

impl<T> InvoicingAtShipping for &T
where
    T: InvoicingAtShipping + ?Sized,
{
    fn should_invoice_at_shipping(&self, tenant_id: TenantId, transfer: &Transfer) -> bool {
        (**self).should_invoice_at_shipping(tenant_id, transfer)
    }

    fn invoicing_at_shipping(
        &self,
        tenant_id: TenantId,
        transfer: &Transfer,
    ) -> DomainResult<InvoicingOutcome> {
        (**self).invoicing_at_shipping(tenant_id, transfer)
    }
}

impl<T> InvoicingAtShipping for std::sync::Arc<T>
where
    T: InvoicingAtShipping + ?Sized,
{
    fn should_invoice_at_shipping(&self, tenant_id: TenantId, transfer: &Transfer) -> bool {
        (**self).should_invoice_at_shipping(tenant_id, transfer)
    }

    fn invoicing_at_shipping(
        &self,
        tenant_id: TenantId,
        transfer: &Transfer,
    ) -> DomainResult<InvoicingOutcome> {
        (**self).invoicing_at_shipping(tenant_id, transfer)
    }
}

/// Base eligibility: the ordering customer is invoiced at shipping.
pub fn customer_invoices_at_shipping(transfer: &Transfer) -> bool {
    transfer
        .origin()
        .is_some_and(|o| o.customer.invoicing_mode == InvoicingMode::AtShipping)
}

/// Persists the cash-on-delivery subset of a transfer's invoices.
pub trait CashOnDeliveryRecorder {
    /// Replaces the tracked set; never appends.
    fn record_cash_on_delivery_invoices(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
        invoice_ids: Vec<InvoiceId>,
    ) -> DomainResult<()>;
}

impl<T> CashOnDeliveryRecorder for std::sync::Arc<T>
where
    T: CashOnDeliveryRecorder + ?Sized,
{
    fn record_cash_on_delivery_invoices(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
        invoice_ids: Vec<InvoiceId>,
    ) -> DomainResult<()> {
        (**self).record_cash_on_delivery_invoices(tenant_id, transfer_id, invoice_ids)
    }
}

/// Invoices whose payment term is flagged cash on delivery, in input order.
///
/// Invoices without a payment term are left out.
pub fn filter_cash_on_delivery<C>(
    context: &C,
    tenant_id: TenantId,
    invoice_ids: &[InvoiceId],
) -> Vec<InvoiceId>
where
    C: PaymentTermLookup + InvoiceLookup + ?Sized,
{
    invoice_ids
        .iter()
        .copied()
        .filter(|id| {
            context
                .payment_term_of(tenant_id, *id)
                .is_some_and(|term| context.policy(tenant_id, term).cash_on_delivery)
        })
        .collect()
}

/// Cash-on-delivery policy layered over a base [`InvoicingAtShipping`].
///
/// - eligibility: base decision OR the order's payment term is cash on delivery
/// - invoicing: base result returned unchanged; the cash-on-delivery subset is
///   recorded on the transfer. Deferred results pass through untouched.
#[derive(Debug, Clone)]
pub struct CashOnDelivery<B, C> {
    inner: B,
    context: C,
}

impl<B, C> CashOnDelivery<B, C>
where
    B: InvoicingAtShipping,
    C: PaymentTermLookup + InvoiceLookup + CashOnDeliveryRecorder,
{
    pub fn new(inner: B, context: C) -> Self {
        Self { inner, context }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn order_is_cash_on_delivery(&self, tenant_id: TenantId, transfer: &Transfer) -> bool {
        transfer
            .payment_term_id()
            .is_some_and(|term| self.context.policy(tenant_id, term).cash_on_delivery)
    }
}

impl<B, C> InvoicingAtShipping for CashOnDelivery<B, C>
where
    B: InvoicingAtShipping,
    C: PaymentTermLookup + InvoiceLookup + CashOnDeliveryRecorder,
{
    fn should_invoice_at_shipping(&self, tenant_id: TenantId, transfer: &Transfer) -> bool {
        self.inner.should_invoice_at_shipping(tenant_id, transfer)
            || self.order_is_cash_on_delivery(tenant_id, transfer)
    }

    fn invoicing_at_shipping(
        &self,
        tenant_id: TenantId,
        transfer: &Transfer,
    ) -> DomainResult<InvoicingOutcome> {
        let outcome = self.inner.invoicing_at_shipping(tenant_id, transfer)?;

        match &outcome {
            InvoicingOutcome::Invoices(ids) => {
                let cod = filter_cash_on_delivery(&self.context, tenant_id, ids);
                debug!(
                    tenant_id = %tenant_id,
                    transfer_id = %transfer.id_typed(),
                    invoices = ids.len(),
                    cash_on_delivery = cod.len(),
                    "recording cash-on-delivery invoices"
                );
                self.context
                    .record_cash_on_delivery_invoices(tenant_id, transfer.id_typed(), cod)?;
            }
            InvoicingOutcome::Deferred(status) => {
                debug!(
                    tenant_id = %tenant_id,
                    transfer_id = %transfer.id_typed(),
                    status = %status,
                    "invoicing deferred; cash-on-delivery invoices left untouched"
                );
            }
        }

        Ok(outcome)
    }
}
