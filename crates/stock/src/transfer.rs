use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shipadvice_core::{Aggregate, AggregateRoot, DomainError, TenantId, aggregate_id};
use shipadvice_events::Event;
use shipadvice_invoicing::InvoiceId;
use shipadvice_payment_terms::PaymentTermId;
use shipadvice_sales::{OrderCustomer, SalesOrderId};

aggregate_id!(
    /// Transfer identifier (tenant-scoped via `tenant_id` fields in events/commands).
    TransferId
);

/// Transfer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Ready,
    Done,
}

/// Sales order a delivery originates from, captured at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleOrigin {
    pub sales_order_id: SalesOrderId,
    pub customer: OrderCustomer,
    pub payment_term_id: Option<PaymentTermId>,
}

/// One product line of the transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMove {
    pub line_no: u32,
    pub product: String,
    pub quantity: i64,
    pub quantity_done: i64,
    /// Price in smallest currency unit, copied from the order line.
    pub unit_price: u64,
}

/// Quantity processed for one move when validating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneQuantity {
    pub line_no: u32,
    pub quantity_done: i64,
}

/// Aggregate root: Transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    id: TransferId,
    tenant_id: Option<TenantId>,
    state: TransferState,
    origin: Option<SaleOrigin>,
    moves: Vec<TransferMove>,
    invoice_ids: Vec<InvoiceId>,
    cash_on_delivery_invoice_ids: Vec<InvoiceId>,
    version: u64,
    created: bool,
}

impl Transfer {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: TransferId) -> Self {
        Self {
            id,
            tenant_id: None,
            state: TransferState::Ready,
            origin: None,
            moves: Vec::new(),
            invoice_ids: Vec::new(),
            cash_on_delivery_invoice_ids: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> TransferId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn origin(&self) -> Option<&SaleOrigin> {
        self.origin.as_ref()
    }

    /// Payment term of the originating order, if any.
    pub fn payment_term_id(&self) -> Option<PaymentTermId> {
        self.origin.as_ref().and_then(|o| o.payment_term_id)
    }

    pub fn moves(&self) -> &[TransferMove] {
        &self.moves
    }

    /// Every invoice generated when this transfer shipped.
    pub fn invoice_ids(&self) -> &[InvoiceId] {
        &self.invoice_ids
    }

    /// Subset of [`Self::invoice_ids`] issued under a cash-on-delivery term.
    pub fn cash_on_delivery_invoice_ids(&self) -> &[InvoiceId] {
        &self.cash_on_delivery_invoice_ids
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_done(&self) -> bool {
        self.state == TransferState::Done
    }

    pub fn has_done_quantity(&self) -> bool {
        self.moves.iter().any(|m| m.quantity_done > 0)
    }

    /// Creation command for a copy of this transfer.
    ///
    /// The copy starts over: nothing done, no invoices, no cash-on-delivery
    /// invoices.
    pub fn duplicate(
        &self,
        tenant_id: TenantId,
        new_id: TransferId,
        occurred_at: DateTime<Utc>,
    ) -> CreateTransfer {
        CreateTransfer {
            tenant_id,
            transfer_id: new_id,
            origin: self.origin.clone(),
            moves: self
                .moves
                .iter()
                .map(|m| TransferMove {
                    quantity_done: 0,
                    ..m.clone()
                })
                .collect(),
            occurred_at,
        }
    }
}

impl AggregateRoot for Transfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransfer {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub origin: Option<SaleOrigin>,
    pub moves: Vec<TransferMove>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ValidateTransfer.
///
/// With `quantities == None` every move is processed in full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateTransfer {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub quantities: Option<Vec<DoneQuantity>>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordInvoices (result of invoicing at shipping).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInvoices {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub invoice_ids: Vec<InvoiceId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordCashOnDeliveryInvoices (replaces the tracked subset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCashOnDeliveryInvoices {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub invoice_ids: Vec<InvoiceId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferCommand {
    CreateTransfer(CreateTransfer),
    ValidateTransfer(ValidateTransfer),
    RecordInvoices(RecordInvoices),
    RecordCashOnDeliveryInvoices(RecordCashOnDeliveryInvoices),
}

/// Event: TransferCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCreated {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub origin: Option<SaleOrigin>,
    pub moves: Vec<TransferMove>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferValidated (final done quantities per move).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferValidated {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub quantities: Vec<DoneQuantity>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoicesRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicesRecorded {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub invoice_ids: Vec<InvoiceId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CashOnDeliveryInvoicesRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashOnDeliveryInvoicesRecorded {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub invoice_ids: Vec<InvoiceId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEvent {
    TransferCreated(TransferCreated),
    TransferValidated(TransferValidated),
    InvoicesRecorded(InvoicesRecorded),
    CashOnDeliveryInvoicesRecorded(CashOnDeliveryInvoicesRecorded),
}

impl Event for TransferEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransferEvent::TransferCreated(_) => "stock.transfer.created",
            TransferEvent::TransferValidated(_) => "stock.transfer.validated",
            TransferEvent::InvoicesRecorded(_) => "stock.transfer.invoices_recorded",
            TransferEvent::CashOnDeliveryInvoicesRecorded(_) => {
                "stock.transfer.cod_invoices_recorded"
            }
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransferEvent::TransferCreated(e) => e.occurred_at,
            TransferEvent::TransferValidated(e) => e.occurred_at,
            TransferEvent::InvoicesRecorded(e) => e.occurred_at,
            TransferEvent::CashOnDeliveryInvoicesRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Transfer {
    type Command = TransferCommand;
    type Event = TransferEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransferEvent::TransferCreated(e) => {
                self.id = e.transfer_id;
                self.tenant_id = Some(e.tenant_id);
                self.state = TransferState::Ready;
                self.origin = e.origin.clone();
                self.moves = e.moves.clone();
                self.invoice_ids.clear();
                self.cash_on_delivery_invoice_ids.clear();
                self.created = true;
            }
            TransferEvent::TransferValidated(e) => {
                for done in &e.quantities {
                    if let Some(m) = self.moves.iter_mut().find(|m| m.line_no == done.line_no) {
                        m.quantity_done = done.quantity_done;
                    }
                }
                self.state = TransferState::Done;
            }
            TransferEvent::InvoicesRecorded(e) => {
                self.invoice_ids = e.invoice_ids.clone();
            }
            TransferEvent::CashOnDeliveryInvoicesRecorded(e) => {
                self.cash_on_delivery_invoice_ids = e.invoice_ids.clone();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TransferCommand::CreateTransfer(cmd) => self.handle_create(cmd),
            TransferCommand::ValidateTransfer(cmd) => self.handle_validate(cmd),
            TransferCommand::RecordInvoices(cmd) => self.handle_record_invoices(cmd),
            TransferCommand::RecordCashOnDeliveryInvoices(cmd) => {
                self.handle_record_cod_invoices(cmd)
            }
        }
    }
}

/// Order-preserving dedup.
fn unique(ids: &[InvoiceId]) -> Vec<InvoiceId> {
    let mut out: Vec<InvoiceId> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(*id);
        }
    }
    out
}

impl Transfer {
    fn ensure_existing(&self, tenant_id: TenantId, transfer_id: TransferId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != transfer_id {
            return Err(DomainError::invariant("transfer_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("transfer already exists"));
        }
        if cmd.moves.is_empty() {
            return Err(DomainError::validation("cannot create transfer without moves"));
        }
        if cmd.moves.iter().any(|m| m.quantity <= 0) {
            return Err(DomainError::validation("move quantity must be positive"));
        }

        Ok(vec![TransferEvent::TransferCreated(TransferCreated {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            origin: cmd.origin.clone(),
            moves: cmd
                .moves
                .iter()
                .map(|m| TransferMove {
                    quantity_done: 0,
                    ..m.clone()
                })
                .collect(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_validate(&self, cmd: &ValidateTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.transfer_id)?;

        if self.state != TransferState::Ready {
            return Err(DomainError::conflict("only ready transfers can be validated"));
        }

        let quantities = match &cmd.quantities {
            None => self
                .moves
                .iter()
                .map(|m| DoneQuantity {
                    line_no: m.line_no,
                    quantity_done: m.quantity,
                })
                .collect::<Vec<_>>(),
            Some(quantities) => {
                for done in quantities {
                    if !self.moves.iter().any(|m| m.line_no == done.line_no) {
                        return Err(DomainError::validation(format!(
                            "unknown move line {}",
                            done.line_no
                        )));
                    }
                    if done.quantity_done < 0 {
                        return Err(DomainError::validation("done quantity cannot be negative"));
                    }
                }
                quantities.clone()
            }
        };

        if quantities.iter().all(|q| q.quantity_done == 0) {
            return Err(DomainError::validation(
                "nothing to validate: all done quantities are zero",
            ));
        }

        Ok(vec![TransferEvent::TransferValidated(TransferValidated {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            quantities,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_invoices(&self, cmd: &RecordInvoices) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.transfer_id)?;

        if !self.is_done() {
            return Err(DomainError::invariant(
                "invoices can only be recorded on a done transfer",
            ));
        }

        Ok(vec![TransferEvent::InvoicesRecorded(InvoicesRecorded {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            invoice_ids: unique(&cmd.invoice_ids),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_cod_invoices(
        &self,
        cmd: &RecordCashOnDeliveryInvoices,
    ) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.transfer_id)?;

        if let Some(stray) = cmd.invoice_ids.iter().find(|id| !self.invoice_ids.contains(id)) {
            return Err(DomainError::invariant(format!(
                "invoice {stray} was not generated by this transfer"
            )));
        }

        Ok(vec![TransferEvent::CashOnDeliveryInvoicesRecorded(
            CashOnDeliveryInvoicesRecorded {
                tenant_id: cmd.tenant_id,
                transfer_id: cmd.transfer_id,
                invoice_ids: unique(&cmd.invoice_ids),
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}
