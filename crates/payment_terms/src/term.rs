use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shipadvice_core::{
    Aggregate, AggregateRoot, DomainError, TenantId, ValueObject, aggregate_id,
};
use shipadvice_events::Event;

aggregate_id!(
    /// Payment term identifier (tenant-scoped via `tenant_id` fields in events/commands).
    PaymentTermId
);

/// Policy flags of a payment term. Both default to `false` and are independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentTermPolicy {
    /// Customer pays when the goods are delivered; invoices are produced at shipping.
    #[serde(default)]
    pub cash_on_delivery: bool,
    /// Invoices generated at shipping are posted immediately.
    #[serde(default)]
    pub auto_validate_invoice: bool,
}

impl ValueObject for PaymentTermPolicy {}

impl PaymentTermPolicy {
    pub fn cash_on_delivery() -> Self {
        Self {
            cash_on_delivery: true,
            ..Self::default()
        }
    }

    pub fn with_auto_validate_invoice(mut self, value: bool) -> Self {
        self.auto_validate_invoice = value;
        self
    }
}

/// Read access to configured payment terms.
///
/// Unknown terms resolve to the default policy (every flag off) so callers
/// never fail on a dangling reference.
pub trait PaymentTermLookup {
    fn policy(&self, tenant_id: TenantId, term_id: PaymentTermId) -> PaymentTermPolicy;
}

impl<T> PaymentTermLookup for std::sync::Arc<T>
where
    T: PaymentTermLookup + ?Sized,
{
    fn policy(&self, tenant_id: TenantId, term_id: PaymentTermId) -> PaymentTermPolicy {
        (**self).policy(tenant_id, term_id)
    }
}

/// Aggregate root: PaymentTerm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentTerm {
    id: PaymentTermId,
    tenant_id: Option<TenantId>,
    name: String,
    policy: PaymentTermPolicy,
    version: u64,
    created: bool,
}

impl PaymentTerm {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PaymentTermId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            policy: PaymentTermPolicy::default(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PaymentTermId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> PaymentTermPolicy {
        self.policy
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for PaymentTerm {
    type Id = PaymentTermId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePaymentTerm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePaymentTerm {
    pub tenant_id: TenantId,
    pub term_id: PaymentTermId,
    pub name: String,
    pub policy: PaymentTermPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangePolicy. `None` keeps the current flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePolicy {
    pub tenant_id: TenantId,
    pub term_id: PaymentTermId,
    pub cash_on_delivery: Option<bool>,
    pub auto_validate_invoice: Option<bool>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentTermCommand {
    CreatePaymentTerm(CreatePaymentTerm),
    ChangePolicy(ChangePolicy),
}

/// Event: PaymentTermCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTermCreated {
    pub tenant_id: TenantId,
    pub term_id: PaymentTermId,
    pub name: String,
    pub policy: PaymentTermPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PolicyChanged (full new policy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyChanged {
    pub tenant_id: TenantId,
    pub term_id: PaymentTermId,
    pub policy: PaymentTermPolicy,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentTermEvent {
    PaymentTermCreated(PaymentTermCreated),
    PolicyChanged(PolicyChanged),
}

impl Event for PaymentTermEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentTermEvent::PaymentTermCreated(_) => "account.payment_term.created",
            PaymentTermEvent::PolicyChanged(_) => "account.payment_term.policy_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PaymentTermEvent::PaymentTermCreated(e) => e.occurred_at,
            PaymentTermEvent::PolicyChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PaymentTerm {
    type Command = PaymentTermCommand;
    type Event = PaymentTermEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PaymentTermEvent::PaymentTermCreated(e) => {
                self.id = e.term_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.policy = e.policy;
                self.created = true;
            }
            PaymentTermEvent::PolicyChanged(e) => {
                self.policy = e.policy;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PaymentTermCommand::CreatePaymentTerm(cmd) => self.handle_create(cmd),
            PaymentTermCommand::ChangePolicy(cmd) => self.handle_change_policy(cmd),
        }
    }
}

impl PaymentTerm {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreatePaymentTerm) -> Result<Vec<PaymentTermEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("payment term already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("payment term name cannot be empty"));
        }

        Ok(vec![PaymentTermEvent::PaymentTermCreated(PaymentTermCreated {
            tenant_id: cmd.tenant_id,
            term_id: cmd.term_id,
            name: cmd.name.trim().to_string(),
            policy: cmd.policy,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_policy(&self, cmd: &ChangePolicy) -> Result<Vec<PaymentTermEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        if self.id != cmd.term_id {
            return Err(DomainError::invariant("term_id mismatch"));
        }

        let policy = PaymentTermPolicy {
            cash_on_delivery: cmd.cash_on_delivery.unwrap_or(self.policy.cash_on_delivery),
            auto_validate_invoice: cmd
                .auto_validate_invoice
                .unwrap_or(self.policy.auto_validate_invoice),
        };

        // Nothing to record when the flags are unchanged.
        if policy == self.policy {
            return Ok(vec![]);
        }

        Ok(vec![PaymentTermEvent::PolicyChanged(PolicyChanged {
            tenant_id: cmd.tenant_id,
            term_id: cmd.term_id,
            policy,
            occurred_at: cmd.occurred_at,
        })])
    }
}
