//! Contact application service.
//!
//! Every write goes through a uniqueness check on the routing key before the
//! command is dispatched. The check runs inside the dispatcher's serialized
//! write section, against a directory caught up with the tenant's contact
//! streams, so contacts written through any other service count too.

use std::sync::Arc;

use tracing::{debug, warn};

use shipadvice_core::{AggregateRoot, DomainError, TenantId};
use shipadvice_parties::{
    AddressTemplate, Contact, ContactCommand, ContactId, RegisterContact, UpdateContact,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::error::{ServiceError, ServiceResult};
use crate::event_store::EventStore;
use crate::read_model::{ContactDirectory, ContactRecord, InMemoryTenantStore, TenantStore};
use crate::streams;

pub struct ContactService<S, R = InMemoryTenantStore<ContactId, ContactRecord>> {
    dispatcher: Arc<CommandDispatcher<S>>,
    directory: ContactDirectory<R>,
    template: AddressTemplate,
}

impl<S> ContactService<S>
where
    S: EventStore,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S>>, template: AddressTemplate) -> Self {
        Self::with_store(dispatcher, InMemoryTenantStore::new(), template)
    }
}

impl<S, R> ContactService<S, R>
where
    S: EventStore,
    R: TenantStore<ContactId, ContactRecord>,
{
    pub fn with_store(
        dispatcher: Arc<CommandDispatcher<S>>,
        store: R,
        template: AddressTemplate,
    ) -> Self {
        Self {
            dispatcher,
            directory: ContactDirectory::new(store),
            template,
        }
    }

    pub fn directory(&self) -> &ContactDirectory<R> {
        &self.directory
    }

    pub fn register(&self, cmd: RegisterContact) -> ServiceResult<Contact> {
        self.write(cmd.tenant_id, ContactCommand::RegisterContact(cmd))
    }

    pub fn update(&self, cmd: UpdateContact) -> ServiceResult<Contact> {
        self.write(cmd.tenant_id, ContactCommand::UpdateContact(cmd))
    }

    pub fn get(&self, tenant_id: TenantId, contact_id: ContactId) -> ServiceResult<Contact> {
        let contact = self.load(tenant_id, contact_id)?;
        if !contact.is_created() {
            return Err(DomainError::not_found().into());
        }
        Ok(contact)
    }

    /// Address string exported to the routing system.
    pub fn format_routing_address(
        &self,
        tenant_id: TenantId,
        contact_id: ContactId,
    ) -> ServiceResult<String> {
        Ok(self
            .get(tenant_id, contact_id)?
            .format_routing_address(&self.template))
    }

    /// Contact targeted by a routing import carrying a driver external id.
    pub fn find_by_routing_external_id(
        &self,
        tenant_id: TenantId,
        external_id: &str,
    ) -> ServiceResult<Option<Contact>> {
        self.catch_up(tenant_id)?;
        self.directory
            .find_by_routing_external_id(tenant_id, external_id)
            .map(|record| self.get(tenant_id, record.contact_id))
            .transpose()
    }

    fn write(&self, tenant_id: TenantId, command: ContactCommand) -> ServiceResult<Contact> {
        let _guard = self.dispatcher.serialize_writes()?;

        let contact_id = command.contact_id();
        if let Some(Some(key)) = command.routing_key() {
            self.catch_up(tenant_id)?;
            self.ensure_routing_key_is_free(tenant_id, contact_id, &key)?;
        }

        self.dispatcher.dispatch(
            tenant_id,
            contact_id.aggregate_id(),
            streams::CONTACT,
            command,
            |_, id| Contact::empty(ContactId::new(id)),
        )?;

        let contact = self.load(tenant_id, contact_id)?;
        self.directory.refresh(tenant_id, &contact);
        debug!(
            tenant_id = %tenant_id,
            contact_id = %contact_id,
            routing_key = contact.routing_key(),
            "contact written"
        );
        Ok(contact)
    }

    /// Refresh the directory records that lag behind their contact stream.
    fn catch_up(&self, tenant_id: TenantId) -> ServiceResult<()> {
        let keys = self
            .dispatcher
            .store()
            .stream_keys(tenant_id, streams::CONTACT)
            .map_err(DispatchError::from)?;

        let mut refreshed = 0usize;
        for key in keys {
            let contact = self.load(tenant_id, ContactId::new(key.aggregate_id))?;
            let known = self
                .directory
                .get(tenant_id, contact.id_typed())
                .map(|r| r.version);
            if known != Some(contact.version()) {
                self.directory.refresh(tenant_id, &contact);
                refreshed += 1;
            }
        }
        if refreshed > 0 {
            debug!(tenant_id = %tenant_id, refreshed, "contact directory caught up");
        }
        Ok(())
    }

    fn ensure_routing_key_is_free(
        &self,
        tenant_id: TenantId,
        contact_id: ContactId,
        key: &str,
    ) -> Result<(), ServiceError> {
        let holders = self
            .directory
            .routing_key_holders(tenant_id, key, Some(contact_id));
        if holders.is_empty() {
            return Ok(());
        }

        warn!(
            tenant_id = %tenant_id,
            contact_id = %contact_id,
            routing_key = key,
            held_by = ?holders,
            "routing key already in use"
        );
        Err(DomainError::validation(format!(
            "the routing key ({key}) should be unique. Try another value."
        ))
        .into())
    }

    fn load(&self, tenant_id: TenantId, contact_id: ContactId) -> ServiceResult<Contact> {
        Ok(self
            .dispatcher
            .load(tenant_id, contact_id.aggregate_id(), |_, id| {
                Contact::empty(ContactId::new(id))
            })?)
    }
}
