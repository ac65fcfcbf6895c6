//! Payment term configuration.

use std::sync::Arc;

use tracing::info;

use shipadvice_core::{DomainError, TenantId};
use shipadvice_payment_terms::{
    ChangePolicy, CreatePaymentTerm, PaymentTerm, PaymentTermCommand, PaymentTermId,
};

use crate::command_dispatcher::CommandDispatcher;
use crate::error::ServiceResult;
use crate::event_store::EventStore;
use crate::streams;

pub struct PaymentTermService<S> {
    dispatcher: Arc<CommandDispatcher<S>>,
}

impl<S: EventStore> PaymentTermService<S> {
    pub fn new(dispatcher: Arc<CommandDispatcher<S>>) -> Self {
        Self { dispatcher }
    }

    pub fn create(&self, cmd: CreatePaymentTerm) -> ServiceResult<PaymentTerm> {
        let (tenant_id, term_id) = (cmd.tenant_id, cmd.term_id);
        self.dispatch(tenant_id, term_id, PaymentTermCommand::CreatePaymentTerm(cmd))
    }

    /// Flip policy flags. Invoices already generated keep their term; the
    /// next invoicing run of a transfer reads the new flags.
    pub fn change_policy(&self, cmd: ChangePolicy) -> ServiceResult<PaymentTerm> {
        let (tenant_id, term_id) = (cmd.tenant_id, cmd.term_id);
        let term = self.dispatch(tenant_id, term_id, PaymentTermCommand::ChangePolicy(cmd))?;
        info!(
            tenant_id = %tenant_id,
            term_id = %term_id,
            cash_on_delivery = term.policy().cash_on_delivery,
            auto_validate_invoice = term.policy().auto_validate_invoice,
            "payment term policy changed"
        );
        Ok(term)
    }

    pub fn get(&self, tenant_id: TenantId, term_id: PaymentTermId) -> ServiceResult<PaymentTerm> {
        let term = self
            .dispatcher
            .load(tenant_id, term_id.aggregate_id(), |_, id| {
                PaymentTerm::empty(PaymentTermId::new(id))
            })?;
        if !term.is_created() {
            return Err(DomainError::not_found().into());
        }
        Ok(term)
    }

    fn dispatch(
        &self,
        tenant_id: TenantId,
        term_id: PaymentTermId,
        command: PaymentTermCommand,
    ) -> ServiceResult<PaymentTerm> {
        self.dispatcher.dispatch(
            tenant_id,
            term_id.aggregate_id(),
            streams::PAYMENT_TERM,
            command,
            |_, id| PaymentTerm::empty(PaymentTermId::new(id)),
        )?;
        self.get(tenant_id, term_id)
    }
}
