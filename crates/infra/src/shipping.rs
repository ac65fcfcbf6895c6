//! Shipping application service: transfers, invoicing at shipping and
//! shipment advices.
//!
//! Invoicing is composed as `CashOnDelivery<ShippingInvoicer>`: the base
//! invoicer creates the invoice of a validated transfer, the cash-on-delivery
//! layer widens eligibility and tracks the invoices to collect at delivery.
//! With queued invoicing enabled, validation hands that chain to a
//! `stock.invoicing_at_shipping` job instead of running it inline.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shipadvice_core::{Aggregate, AggregateId, DomainError, DomainResult, TenantId};
use shipadvice_invoicing::{
    CreateInvoice, Invoice, InvoiceCommand, InvoiceId, InvoiceLine, InvoiceLookup,
    InvoicePartner, InvoiceStatus, PostInvoice,
};
use shipadvice_payment_terms::{PaymentTerm, PaymentTermId, PaymentTermLookup, PaymentTermPolicy};
use shipadvice_sales::{MarkInvoiced, SalesOrder, SalesOrderCommand, SalesOrderId};
use shipadvice_stock::{
    CashOnDelivery, CashOnDeliveryRecorder, CreateShipmentAdvice, CreateTransfer, DoneQuantity,
    InvoicingAtShipping, InvoicingOutcome, MarkShipmentDone, PlanTransfers,
    RecordCashOnDeliveryInvoices, RecordInvoices, SaleOrigin, ShipmentAdvice,
    ShipmentAdviceCommand, ShipmentAdviceId, ShipmentType, StartShipment, Transfer,
    TransferCommand, TransferId, TransferMove, ValidateTransfer, customer_invoices_at_shipping,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::ShipAdviceConfig;
use crate::error::ServiceResult;
use crate::event_store::EventStore;
use crate::jobs::{Job, JobHandler, JobStore, JobWork, RetryPolicy};
use crate::report::ReportAction;
use crate::streams;

/// Name hashed with the transfer id into its invoice id.
const INVOICE_ID_NAME: &[u8] = b"stock.transfer.invoice";

fn load<S, A>(
    dispatcher: &CommandDispatcher<S>,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    make: impl FnOnce(AggregateId) -> A,
) -> Result<A, DispatchError>
where
    S: EventStore,
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    dispatcher.load(tenant_id, aggregate_id, |_, id| make(id))
}

/// Read/write access the cash-on-delivery layer needs, backed by the event
/// store.
pub struct ShippingContext<S> {
    dispatcher: Arc<CommandDispatcher<S>>,
}

impl<S> Clone for ShippingContext<S> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<S: EventStore> ShippingContext<S> {
    pub fn new(dispatcher: Arc<CommandDispatcher<S>>) -> Self {
        Self { dispatcher }
    }
}

impl<S: EventStore> PaymentTermLookup for ShippingContext<S> {
    fn policy(&self, tenant_id: TenantId, term_id: PaymentTermId) -> PaymentTermPolicy {
        match load(&self.dispatcher, tenant_id, term_id.aggregate_id(), |id| {
            PaymentTerm::empty(PaymentTermId::new(id))
        }) {
            Ok(term) => term.policy(),
            Err(e) => {
                warn!(tenant_id = %tenant_id, term_id = %term_id, error = %e, "payment term unreadable; using default policy");
                PaymentTermPolicy::default()
            }
        }
    }
}

impl<S: EventStore> InvoiceLookup for ShippingContext<S> {
    fn payment_term_of(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Option<PaymentTermId> {
        match load(&self.dispatcher, tenant_id, invoice_id.aggregate_id(), |id| {
            Invoice::empty(InvoiceId::new(id))
        }) {
            Ok(invoice) => invoice.invoice_payment_term_id(),
            Err(e) => {
                warn!(tenant_id = %tenant_id, invoice_id = %invoice_id, error = %e, "invoice unreadable");
                None
            }
        }
    }
}

impl<S: EventStore> CashOnDeliveryRecorder for ShippingContext<S> {
    fn record_cash_on_delivery_invoices(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
        invoice_ids: Vec<InvoiceId>,
    ) -> DomainResult<()> {
        self.dispatcher.dispatch(
            tenant_id,
            transfer_id.aggregate_id(),
            streams::TRANSFER,
            TransferCommand::RecordCashOnDeliveryInvoices(RecordCashOnDeliveryInvoices {
                tenant_id,
                transfer_id,
                invoice_ids,
                occurred_at: Utc::now(),
            }),
            |_, id| Transfer::empty(TransferId::new(id)),
        )?;
        Ok(())
    }
}

/// Base invoicing at shipping: one invoice per validated transfer.
///
/// Idempotent: a transfer that already carries invoices gets them back
/// instead of new ones. Each step can be repeated, so a failed run is
/// resumed by running it again.
pub struct ShippingInvoicer<S> {
    dispatcher: Arc<CommandDispatcher<S>>,
    context: ShippingContext<S>,
}

impl<S: EventStore> ShippingInvoicer<S> {
    pub fn new(dispatcher: Arc<CommandDispatcher<S>>) -> Self {
        Self {
            context: ShippingContext::new(Arc::clone(&dispatcher)),
            dispatcher,
        }
    }

    fn invoice_lines(transfer: &Transfer) -> Vec<InvoiceLine> {
        transfer
            .moves()
            .iter()
            .filter(|m| m.quantity_done > 0)
            .map(|m| InvoiceLine {
                line_no: m.line_no,
                product: m.product.clone(),
                quantity: m.quantity_done,
                unit_price: m.unit_price,
            })
            .collect()
    }

    /// Invoice id reserved for a transfer. A run interrupted after creating
    /// the invoice finds it again instead of issuing a second one.
    fn invoice_id_for(transfer_id: TransferId) -> InvoiceId {
        let transfer = transfer_id.aggregate_id();
        InvoiceId::new(AggregateId::from_uuid(Uuid::new_v5(
            transfer.as_uuid(),
            INVOICE_ID_NAME,
        )))
    }

    /// Create the transfer's invoice if missing and link it to the transfer.
    fn issue_invoice(
        &self,
        tenant_id: TenantId,
        transfer: &Transfer,
        origin: &SaleOrigin,
    ) -> Result<InvoiceId, DispatchError> {
        let invoice_id = Self::invoice_id_for(transfer.id_typed());
        let now = Utc::now();

        let existing: Invoice = load(&self.dispatcher, tenant_id, invoice_id.aggregate_id(), |id| {
            Invoice::empty(InvoiceId::new(id))
        })?;
        if existing.is_created() {
            debug!(tenant_id = %tenant_id, invoice_id = %invoice_id, "resuming with existing invoice");
        } else {
            self.dispatcher.dispatch(
                tenant_id,
                invoice_id.aggregate_id(),
                streams::INVOICE,
                InvoiceCommand::CreateInvoice(CreateInvoice {
                    tenant_id,
                    invoice_id,
                    partner: InvoicePartner {
                        contact_id: origin.customer.contact_id,
                        display_name: origin.customer.display_name.clone(),
                    },
                    sales_order_id: Some(origin.sales_order_id),
                    payment_term_id: origin.payment_term_id,
                    lines: Self::invoice_lines(transfer),
                    occurred_at: now,
                }),
                |_, id| Invoice::empty(InvoiceId::new(id)),
            )?;
        }

        self.dispatcher.dispatch(
            tenant_id,
            transfer.id_typed().aggregate_id(),
            streams::TRANSFER,
            TransferCommand::RecordInvoices(RecordInvoices {
                tenant_id,
                transfer_id: transfer.id_typed(),
                invoice_ids: vec![invoice_id],
                occurred_at: now,
            }),
            |_, id| Transfer::empty(TransferId::new(id)),
        )?;

        info!(
            tenant_id = %tenant_id,
            transfer_id = %transfer.id_typed(),
            invoice_id = %invoice_id,
            "invoice created at shipping"
        );
        Ok(invoice_id)
    }

    /// Post drafts under an auto-validating term and mark the order
    /// invoiced. Steps already done are skipped, so every run repeats this.
    fn settle(
        &self,
        tenant_id: TenantId,
        origin: &SaleOrigin,
        invoice_ids: &[InvoiceId],
    ) -> Result<(), DispatchError> {
        let now = Utc::now();
        let policy = origin
            .payment_term_id
            .map(|term| self.context.policy(tenant_id, term))
            .unwrap_or_default();

        if policy.auto_validate_invoice {
            for invoice_id in invoice_ids {
                let invoice: Invoice =
                    load(&self.dispatcher, tenant_id, invoice_id.aggregate_id(), |id| {
                        Invoice::empty(InvoiceId::new(id))
                    })?;
                if !invoice.is_created() || invoice.status() != InvoiceStatus::Draft {
                    continue;
                }
                self.dispatcher.dispatch(
                    tenant_id,
                    invoice_id.aggregate_id(),
                    streams::INVOICE,
                    InvoiceCommand::PostInvoice(PostInvoice {
                        tenant_id,
                        invoice_id: *invoice_id,
                        occurred_at: now,
                    }),
                    |_, id| Invoice::empty(InvoiceId::new(id)),
                )?;
                debug!(tenant_id = %tenant_id, invoice_id = %invoice_id, "invoice posted");
            }
        }

        let order: SalesOrder = load(
            &self.dispatcher,
            tenant_id,
            origin.sales_order_id.aggregate_id(),
            |id| SalesOrder::empty(SalesOrderId::new(id)),
        )?;
        if order.is_invoice_allowed() {
            self.dispatcher.dispatch(
                tenant_id,
                origin.sales_order_id.aggregate_id(),
                streams::SALES_ORDER,
                SalesOrderCommand::MarkInvoiced(MarkInvoiced {
                    tenant_id,
                    order_id: origin.sales_order_id,
                    occurred_at: now,
                }),
                |_, id| SalesOrder::empty(SalesOrderId::new(id)),
            )?;
        }
        Ok(())
    }
}

impl<S: EventStore> InvoicingAtShipping for ShippingInvoicer<S> {
    fn should_invoice_at_shipping(&self, _tenant_id: TenantId, transfer: &Transfer) -> bool {
        customer_invoices_at_shipping(transfer)
    }

    fn invoicing_at_shipping(
        &self,
        tenant_id: TenantId,
        transfer: &Transfer,
    ) -> DomainResult<InvoicingOutcome> {
        let Some(origin) = transfer.origin() else {
            return Ok(InvoicingOutcome::Invoices(vec![]));
        };

        let invoice_ids = if !transfer.invoice_ids().is_empty() {
            transfer.invoice_ids().to_vec()
        } else if transfer.is_done() && transfer.has_done_quantity() {
            vec![self.issue_invoice(tenant_id, transfer, origin)?]
        } else {
            return Ok(InvoicingOutcome::Invoices(vec![]));
        };

        self.settle(tenant_id, origin, &invoice_ids)?;
        Ok(InvoicingOutcome::Invoices(invoice_ids))
    }
}

type Invoicing<S> = CashOnDelivery<ShippingInvoicer<S>, ShippingContext<S>>;

pub struct ShippingService<S, J> {
    dispatcher: Arc<CommandDispatcher<S>>,
    invoicing: Invoicing<S>,
    jobs: J,
    queue_invoicing: bool,
    retry_policy: RetryPolicy,
}

impl<S, J> ShippingService<S, J>
where
    S: EventStore,
    J: JobStore,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S>>, jobs: J, config: &ShipAdviceConfig) -> Self {
        let invoicing = CashOnDelivery::new(
            ShippingInvoicer::new(Arc::clone(&dispatcher)),
            ShippingContext::new(Arc::clone(&dispatcher)),
        );
        Self {
            dispatcher,
            invoicing,
            jobs,
            queue_invoicing: config.queue_invoicing,
            retry_policy: RetryPolicy::default().with_max_attempts(config.invoicing_max_attempts),
        }
    }

    /// The decorated invoicing chain (cash on delivery over the base invoicer).
    pub fn invoicing(&self) -> &impl InvoicingAtShipping {
        &self.invoicing
    }

    pub fn jobs(&self) -> &J {
        &self.jobs
    }

    pub fn load_transfer(&self, tenant_id: TenantId, transfer_id: TransferId) -> ServiceResult<Transfer> {
        let transfer = load(&self.dispatcher, tenant_id, transfer_id.aggregate_id(), |id| {
            Transfer::empty(TransferId::new(id))
        })?;
        if !transfer.is_created() {
            return Err(DomainError::not_found().into());
        }
        Ok(transfer)
    }

    pub fn load_invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> ServiceResult<Invoice> {
        let invoice = load(&self.dispatcher, tenant_id, invoice_id.aggregate_id(), |id| {
            Invoice::empty(InvoiceId::new(id))
        })?;
        if !invoice.is_created() {
            return Err(DomainError::not_found().into());
        }
        Ok(invoice)
    }

    pub fn load_shipment_advice(
        &self,
        tenant_id: TenantId,
        shipment_id: ShipmentAdviceId,
    ) -> ServiceResult<ShipmentAdvice> {
        let advice = load(&self.dispatcher, tenant_id, shipment_id.aggregate_id(), |id| {
            ShipmentAdvice::empty(ShipmentAdviceId::new(id))
        })?;
        if !advice.is_created() {
            return Err(DomainError::not_found().into());
        }
        Ok(advice)
    }

    /// Delivery for every line of a confirmed sales order.
    pub fn create_transfer_from_order(
        &self,
        tenant_id: TenantId,
        order_id: SalesOrderId,
        transfer_id: TransferId,
    ) -> ServiceResult<Transfer> {
        let order: SalesOrder = load(&self.dispatcher, tenant_id, order_id.aggregate_id(), |id| {
            SalesOrder::empty(SalesOrderId::new(id))
        })?;
        let Some(customer) = order.customer().filter(|_| order.is_created()) else {
            return Err(DomainError::not_found().into());
        };
        if order.is_modifiable() {
            return Err(DomainError::validation("sales order must be confirmed before delivery").into());
        }

        let moves = order
            .lines()
            .iter()
            .map(|l| TransferMove {
                line_no: l.line_no,
                product: l.product.clone(),
                quantity: l.quantity,
                quantity_done: 0,
                unit_price: l.unit_price,
            })
            .collect();

        self.create_transfer(CreateTransfer {
            tenant_id,
            transfer_id,
            origin: Some(SaleOrigin {
                sales_order_id: order_id,
                customer: customer.clone(),
                payment_term_id: order.payment_term_id(),
            }),
            moves,
            occurred_at: Utc::now(),
        })
    }

    pub fn create_transfer(&self, cmd: CreateTransfer) -> ServiceResult<Transfer> {
        let (tenant_id, transfer_id) = (cmd.tenant_id, cmd.transfer_id);
        self.dispatcher.dispatch(
            tenant_id,
            transfer_id.aggregate_id(),
            streams::TRANSFER,
            TransferCommand::CreateTransfer(cmd),
            |_, id| Transfer::empty(TransferId::new(id)),
        )?;
        self.load_transfer(tenant_id, transfer_id)
    }

    /// Copy of a transfer; the copy has no invoices of its own.
    pub fn duplicate_transfer(
        &self,
        tenant_id: TenantId,
        source_id: TransferId,
        new_id: TransferId,
    ) -> ServiceResult<Transfer> {
        let source = self.load_transfer(tenant_id, source_id)?;
        self.create_transfer(source.duplicate(tenant_id, new_id, Utc::now()))
    }

    /// Validate a transfer and invoice it when it is eligible.
    ///
    /// `quantities == None` processes every move in full. Not eligible:
    /// empty invoice set. Queued invoicing: `Deferred(<job id>)`.
    pub fn validate_transfer(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
        quantities: Option<Vec<DoneQuantity>>,
    ) -> ServiceResult<InvoicingOutcome> {
        self.dispatcher.dispatch(
            tenant_id,
            transfer_id.aggregate_id(),
            streams::TRANSFER,
            TransferCommand::ValidateTransfer(ValidateTransfer {
                tenant_id,
                transfer_id,
                quantities,
                occurred_at: Utc::now(),
            }),
            |_, id| Transfer::empty(TransferId::new(id)),
        )?;

        let transfer = self.load_transfer(tenant_id, transfer_id)?;
        if !self.is_invoiced_at_shipping(tenant_id, &transfer) {
            return Ok(InvoicingOutcome::Invoices(vec![]));
        }

        if self.queue_invoicing {
            let job = Job::new(tenant_id, JobWork::InvoicingAtShipping { transfer_id })
                .with_retry_policy(self.retry_policy.clone());
            let job_id = self.jobs.enqueue(job)?;
            info!(tenant_id = %tenant_id, transfer_id = %transfer_id, job_id = %job_id, "invoicing at shipping queued");
            return Ok(InvoicingOutcome::Deferred(job_id.to_string()));
        }

        Ok(self.invoicing.invoicing_at_shipping(tenant_id, &transfer)?)
    }

    /// Run the invoicing chain on a validated transfer, inline.
    ///
    /// Safe to call repeatedly: invoices already generated are returned and
    /// the cash-on-delivery subset is recomputed from them. A transfer that
    /// is not invoiced at shipping gets an empty set and is left untouched.
    pub fn invoicing_at_shipping(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
    ) -> ServiceResult<InvoicingOutcome> {
        let transfer = self.load_transfer(tenant_id, transfer_id)?;
        if !self.is_invoiced_at_shipping(tenant_id, &transfer) {
            return Ok(InvoicingOutcome::Invoices(vec![]));
        }
        Ok(self.invoicing.invoicing_at_shipping(tenant_id, &transfer)?)
    }

    fn is_invoiced_at_shipping(&self, tenant_id: TenantId, transfer: &Transfer) -> bool {
        let eligible = self.invoicing.should_invoice_at_shipping(tenant_id, transfer);
        if !eligible {
            debug!(
                tenant_id = %tenant_id,
                transfer_id = %transfer.id_typed(),
                "transfer not invoiced at shipping"
            );
        }
        eligible
    }

    pub fn create_shipment_advice(
        &self,
        tenant_id: TenantId,
        shipment_id: ShipmentAdviceId,
        shipment_type: ShipmentType,
    ) -> ServiceResult<ShipmentAdvice> {
        self.dispatch_advice(
            tenant_id,
            shipment_id,
            ShipmentAdviceCommand::CreateShipmentAdvice(CreateShipmentAdvice {
                tenant_id,
                shipment_id,
                shipment_type,
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn plan_transfers(
        &self,
        tenant_id: TenantId,
        shipment_id: ShipmentAdviceId,
        transfer_ids: Vec<TransferId>,
    ) -> ServiceResult<ShipmentAdvice> {
        for id in &transfer_ids {
            self.load_transfer(tenant_id, *id)?;
        }
        self.dispatch_advice(
            tenant_id,
            shipment_id,
            ShipmentAdviceCommand::PlanTransfers(PlanTransfers {
                tenant_id,
                shipment_id,
                transfer_ids,
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn start_shipment(
        &self,
        tenant_id: TenantId,
        shipment_id: ShipmentAdviceId,
    ) -> ServiceResult<ShipmentAdvice> {
        self.dispatch_advice(
            tenant_id,
            shipment_id,
            ShipmentAdviceCommand::StartShipment(StartShipment {
                tenant_id,
                shipment_id,
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn mark_shipment_done(
        &self,
        tenant_id: TenantId,
        shipment_id: ShipmentAdviceId,
    ) -> ServiceResult<ShipmentAdvice> {
        self.dispatch_advice(
            tenant_id,
            shipment_id,
            ShipmentAdviceCommand::MarkShipmentDone(MarkShipmentDone {
                tenant_id,
                shipment_id,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// PDF action for the cash-on-delivery invoices of every planned transfer,
    /// so the driver can hand them over at delivery.
    pub fn print_cash_on_delivery_invoices(
        &self,
        tenant_id: TenantId,
        shipment_id: ShipmentAdviceId,
    ) -> ServiceResult<ReportAction> {
        let advice = self.load_shipment_advice(tenant_id, shipment_id)?;

        let mut ids: Vec<InvoiceId> = Vec::new();
        for transfer_id in advice.transfer_ids() {
            let transfer = self.load_transfer(tenant_id, *transfer_id)?;
            for id in transfer.cash_on_delivery_invoice_ids() {
                if !ids.contains(id) {
                    ids.push(*id);
                }
            }
        }

        Ok(ReportAction::invoices(ids))
    }

    fn dispatch_advice(
        &self,
        tenant_id: TenantId,
        shipment_id: ShipmentAdviceId,
        command: ShipmentAdviceCommand,
    ) -> ServiceResult<ShipmentAdvice> {
        self.dispatcher.dispatch(
            tenant_id,
            shipment_id.aggregate_id(),
            streams::SHIPMENT_ADVICE,
            command,
            |_, id| ShipmentAdvice::empty(ShipmentAdviceId::new(id)),
        )?;
        self.load_shipment_advice(tenant_id, shipment_id)
    }
}

/// Runs queued invoicing; `Arc<ShippingService>` is the executor's handler.
impl<S, J> JobHandler for ShippingService<S, J>
where
    S: EventStore,
    J: JobStore,
{
    fn handle(&self, job: &Job) -> Result<(), String> {
        match job.work {
            JobWork::InvoicingAtShipping { transfer_id } => {
                let outcome = self
                    .invoicing_at_shipping(job.tenant_id, transfer_id)
                    .map_err(|e| e.to_string())?;
                debug!(job_id = %job.id, %transfer_id, ?outcome, "invoicing job done");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipadvice_parties::{ContactId, InvoicingMode};
    use shipadvice_payment_terms::CreatePaymentTerm;
    use shipadvice_sales::OrderCustomer;

    use crate::event_store::InMemoryEventStore;
    use crate::jobs::InMemoryJobStore;
    use crate::payment_terms::PaymentTermService;

    type Store = InMemoryEventStore;
    type Service = ShippingService<Store, Arc<InMemoryJobStore>>;

    struct Fixture {
        tenant_id: TenantId,
        dispatcher: Arc<CommandDispatcher<Store>>,
        service: Service,
    }

    // Queued invoicing, so validation leaves the invoicing run to the test.
    fn fixture() -> Fixture {
        let dispatcher = Arc::new(CommandDispatcher::new(InMemoryEventStore::new()));
        let service = ShippingService::new(
            Arc::clone(&dispatcher),
            InMemoryJobStore::arc(),
            &ShipAdviceConfig::default(),
        );
        Fixture {
            tenant_id: TenantId::new(),
            dispatcher,
            service,
        }
    }

    impl Fixture {
        fn validated_transfer(&self, policy: PaymentTermPolicy) -> Transfer {
            let term = PaymentTermService::new(Arc::clone(&self.dispatcher))
                .create(CreatePaymentTerm {
                    tenant_id: self.tenant_id,
                    term_id: PaymentTermId::generate(),
                    name: "Cash on delivery".to_string(),
                    policy,
                    occurred_at: Utc::now(),
                })
                .unwrap();

            let transfer = self
                .service
                .create_transfer(CreateTransfer {
                    tenant_id: self.tenant_id,
                    transfer_id: TransferId::generate(),
                    origin: Some(SaleOrigin {
                        sales_order_id: SalesOrderId::generate(),
                        customer: OrderCustomer {
                            contact_id: ContactId::generate(),
                            display_name: "Deco Addict".to_string(),
                            invoicing_mode: InvoicingMode::AtShipping,
                        },
                        payment_term_id: Some(term.id_typed()),
                    }),
                    moves: vec![TransferMove {
                        line_no: 1,
                        product: "Product COD".to_string(),
                        quantity: 1,
                        quantity_done: 0,
                        unit_price: 1_000,
                    }],
                    occurred_at: Utc::now(),
                })
                .unwrap();

            let outcome = self
                .service
                .validate_transfer(self.tenant_id, transfer.id_typed(), None)
                .unwrap();
            assert!(matches!(outcome, InvoicingOutcome::Deferred(_)));
            self.service
                .load_transfer(self.tenant_id, transfer.id_typed())
                .unwrap()
        }

        /// A run that created the invoice and stopped before linking it.
        fn interrupted_run(&self, transfer: &Transfer) -> InvoiceId {
            let invoice_id = ShippingInvoicer::<Store>::invoice_id_for(transfer.id_typed());
            let origin = transfer.origin().unwrap();
            self.dispatcher
                .dispatch(
                    self.tenant_id,
                    invoice_id.aggregate_id(),
                    streams::INVOICE,
                    InvoiceCommand::CreateInvoice(CreateInvoice {
                        tenant_id: self.tenant_id,
                        invoice_id,
                        partner: InvoicePartner {
                            contact_id: origin.customer.contact_id,
                            display_name: origin.customer.display_name.clone(),
                        },
                        sales_order_id: Some(origin.sales_order_id),
                        payment_term_id: origin.payment_term_id,
                        lines: ShippingInvoicer::<Store>::invoice_lines(transfer),
                        occurred_at: Utc::now(),
                    }),
                    |_, id| Invoice::empty(InvoiceId::new(id)),
                )
                .unwrap();
            invoice_id
        }
    }

    #[test]
    fn interrupted_run_is_resumed_without_a_second_invoice() {
        let f = fixture();
        let transfer = f.validated_transfer(PaymentTermPolicy::cash_on_delivery());
        let left_over = f.interrupted_run(&transfer);
        assert!(transfer.invoice_ids().is_empty());

        let outcome = f
            .service
            .invoicing_at_shipping(f.tenant_id, transfer.id_typed())
            .unwrap();
        assert_eq!(outcome, InvoicingOutcome::Invoices(vec![left_over]));

        let transfer = f.service.load_transfer(f.tenant_id, transfer.id_typed()).unwrap();
        assert_eq!(transfer.invoice_ids().to_vec(), vec![left_over]);
        assert_eq!(transfer.cash_on_delivery_invoice_ids().to_vec(), vec![left_over]);
        assert_eq!(
            f.dispatcher
                .store()
                .stream_keys(f.tenant_id, streams::INVOICE)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn rerun_posts_a_draft_left_behind() {
        let f = fixture();
        let transfer = f.validated_transfer(
            PaymentTermPolicy::cash_on_delivery().with_auto_validate_invoice(true),
        );
        let left_over = f.interrupted_run(&transfer);
        assert_eq!(
            f.service.load_invoice(f.tenant_id, left_over).unwrap().status(),
            InvoiceStatus::Draft
        );

        for _ in 0..2 {
            f.service
                .invoicing_at_shipping(f.tenant_id, transfer.id_typed())
                .unwrap();
        }
        assert_eq!(
            f.service.load_invoice(f.tenant_id, left_over).unwrap().status(),
            InvoiceStatus::Posted
        );
    }

    #[test]
    fn invoice_id_is_derived_from_the_transfer() {
        let (a, b) = (TransferId::generate(), TransferId::generate());
        assert_eq!(
            ShippingInvoicer::<Store>::invoice_id_for(a),
            ShippingInvoicer::<Store>::invoice_id_for(a)
        );
        assert_ne!(
            ShippingInvoicer::<Store>::invoice_id_for(a),
            ShippingInvoicer::<Store>::invoice_id_for(b)
        );
    }
}
