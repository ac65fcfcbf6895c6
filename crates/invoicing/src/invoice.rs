use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shipadvice_core::{Aggregate, AggregateRoot, DomainError, TenantId, aggregate_id};
use shipadvice_events::Event;
use shipadvice_parties::ContactId;
use shipadvice_payment_terms::PaymentTermId;
use shipadvice_sales::SalesOrderId;

aggregate_id!(
    /// Invoice identifier (tenant-scoped via `tenant_id` fields in events/commands).
    InvoiceId
);

/// Invoice status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Posted,
}

/// Invoiced partner as printed on the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePartner {
    pub contact_id: ContactId,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub line_no: u32,
    pub product: String,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
}

/// Read access to invoices, as needed to filter them by payment term.
pub trait InvoiceLookup {
    /// `None` when the invoice is unknown or was issued without a payment term.
    fn payment_term_of(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Option<PaymentTermId>;
}

impl<T> InvoiceLookup for std::sync::Arc<T>
where
    T: InvoiceLookup + ?Sized,
{
    fn payment_term_of(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Option<PaymentTermId> {
        (**self).payment_term_of(tenant_id, invoice_id)
    }
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    tenant_id: Option<TenantId>,
    status: InvoiceStatus,
    partner: Option<InvoicePartner>,
    sales_order_id: Option<SalesOrderId>,
    payment_term_id: Option<PaymentTermId>,
    lines: Vec<InvoiceLine>,
    total_amount: u64,
    version: u64,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            status: InvoiceStatus::Draft,
            partner: None,
            sales_order_id: None,
            payment_term_id: None,
            lines: Vec::new(),
            total_amount: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn partner(&self) -> Option<&InvoicePartner> {
        self.partner.as_ref()
    }

    /// Name of the invoiced partner, empty when not yet created.
    pub fn invoice_partner_display_name(&self) -> &str {
        self.partner
            .as_ref()
            .map(|p| p.display_name.as_str())
            .unwrap_or("")
    }

    pub fn sales_order_id(&self) -> Option<SalesOrderId> {
        self.sales_order_id
    }

    pub fn invoice_payment_term_id(&self) -> Option<PaymentTermId> {
        self.payment_term_id
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn total_amount(&self) -> u64 {
        self.total_amount
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateInvoice (draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub partner: InvoicePartner,
    pub sales_order_id: Option<SalesOrderId>,
    pub payment_term_id: Option<PaymentTermId>,
    pub lines: Vec<InvoiceLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PostInvoice (validate the draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    CreateInvoice(CreateInvoice),
    PostInvoice(PostInvoice),
}

/// Event: InvoiceCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub partner: InvoicePartner,
    pub sales_order_id: Option<SalesOrderId>,
    pub payment_term_id: Option<PaymentTermId>,
    pub lines: Vec<InvoiceLine>,
    pub total_amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoicePosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePosted {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceCreated(InvoiceCreated),
    InvoicePosted(InvoicePosted),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceCreated(_) => "invoicing.invoice.created",
            InvoiceEvent::InvoicePosted(_) => "invoicing.invoice.posted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.occurred_at,
            InvoiceEvent::InvoicePosted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceCreated(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.partner = Some(e.partner.clone());
                self.sales_order_id = e.sales_order_id;
                self.payment_term_id = e.payment_term_id;
                self.lines = e.lines.clone();
                self.total_amount = e.total_amount;
                self.status = InvoiceStatus::Draft;
                self.created = true;
            }
            InvoiceEvent::InvoicePosted(_) => {
                self.status = InvoiceStatus::Posted;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::CreateInvoice(cmd) => self.handle_create(cmd),
            InvoiceCommand::PostInvoice(cmd) => self.handle_post(cmd),
        }
    }
}

/// Sum of `quantity * unit_price` over the lines, rejecting non-positive quantities.
pub(crate) fn lines_total(lines: &[InvoiceLine]) -> Result<u64, DomainError> {
    let mut total: u64 = 0;
    for line in lines {
        if line.quantity <= 0 {
            return Err(DomainError::validation(
                "invoice line quantity must be positive",
            ));
        }
        let line_total = (line.quantity as u64)
            .checked_mul(line.unit_price)
            .ok_or_else(|| DomainError::invariant("invoice line amount overflow"))?;
        total = total
            .checked_add(line_total)
            .ok_or_else(|| DomainError::invariant("invoice total overflow"))?;
    }
    Ok(total)
}

impl Invoice {
    fn ensure_existing(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("cannot create invoice without lines"));
        }
        let total_amount = lines_total(&cmd.lines)?;

        Ok(vec![InvoiceEvent::InvoiceCreated(InvoiceCreated {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            partner: cmd.partner.clone(),
            sales_order_id: cmd.sales_order_id,
            payment_term_id: cmd.payment_term_id,
            lines: cmd.lines.clone(),
            total_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_post(&self, cmd: &PostInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.invoice_id)?;

        if self.status != InvoiceStatus::Draft {
            return Err(DomainError::conflict("only draft invoices can be posted"));
        }

        Ok(vec![InvoiceEvent::InvoicePosted(InvoicePosted {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
