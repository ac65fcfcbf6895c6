//! Contact directory: lookup of contacts by their routing identifiers.
//!
//! Refreshed from the rehydrated [`Contact`] after every successful write.

use serde::{Deserialize, Serialize};

use shipadvice_core::{Entity, TenantId};
use shipadvice_parties::{Contact, ContactId, InvoicingMode};

use super::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub contact_id: ContactId,
    pub name: String,
    pub invoicing_mode: InvoicingMode,
    pub routing_external_id: Option<String>,
    pub routing_key: Option<String>,
    /// Stream version the record was built from.
    pub version: u64,
}

impl Entity for ContactRecord {
    type Id = ContactId;

    fn id(&self) -> &Self::Id {
        &self.contact_id
    }
}

impl ContactRecord {
    pub fn from_contact(contact: &Contact) -> Self {
        use shipadvice_core::AggregateRoot;

        Self {
            contact_id: contact.id_typed(),
            name: contact.name().to_string(),
            invoicing_mode: contact.invoicing_mode(),
            routing_external_id: contact.routing().external_id.clone(),
            routing_key: contact.routing_key().map(str::to_string),
            version: contact.version(),
        }
    }
}

#[derive(Debug)]
pub struct ContactDirectory<S> {
    store: S,
}

impl<S> ContactDirectory<S>
where
    S: TenantStore<ContactId, ContactRecord>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn refresh(&self, tenant_id: TenantId, contact: &Contact) {
        let record = ContactRecord::from_contact(contact);
        self.store.upsert(tenant_id, record.contact_id, record);
    }

    pub fn get(&self, tenant_id: TenantId, contact_id: ContactId) -> Option<ContactRecord> {
        self.store.get(tenant_id, &contact_id)
    }

    /// Contacts other than `except` holding `key`, in id order.
    pub fn routing_key_holders(
        &self,
        tenant_id: TenantId,
        key: &str,
        except: Option<ContactId>,
    ) -> Vec<ContactId> {
        let mut holders: Vec<ContactId> = self
            .store
            .find(tenant_id, &|r: &ContactRecord| {
                r.routing_key.as_deref() == Some(key) && Some(r.contact_id) != except
            })
            .into_iter()
            .map(|r| r.contact_id)
            .collect();
        holders.sort();
        holders
    }

    /// Contact matched by a routing import through the driver external id.
    pub fn find_by_routing_external_id(
        &self,
        tenant_id: TenantId,
        external_id: &str,
    ) -> Option<ContactRecord> {
        let mut matches = self.store.find(tenant_id, &|r: &ContactRecord| {
            r.routing_external_id.as_deref() == Some(external_id)
        });
        matches.sort_by_key(|r| r.contact_id);
        matches.into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shipadvice_core::Aggregate;
    use shipadvice_parties::{Address, ContactCommand, RegisterContact, RoutingRef};

    use crate::read_model::InMemoryTenantStore;

    fn contact(tenant_id: TenantId, key: Option<&str>, external_id: Option<&str>) -> Contact {
        let contact_id = ContactId::generate();
        let mut contact = Contact::empty(contact_id);
        let cmd = ContactCommand::RegisterContact(RegisterContact {
            tenant_id,
            contact_id,
            name: "Azure Interior".to_string(),
            invoicing_mode: InvoicingMode::Standard,
            address: Address::default(),
            routing: RoutingRef {
                external_id: external_id.map(str::to_string),
                key: key.map(str::to_string),
            },
            occurred_at: Utc::now(),
        });
        for e in contact.handle(&cmd).unwrap() {
            contact.apply(&e);
        }
        contact
    }

    #[test]
    fn routing_key_holders_excludes_the_writer() {
        let directory = ContactDirectory::new(InMemoryTenantStore::new());
        let tenant_id = TenantId::new();
        let a = contact(tenant_id, Some("K-1"), None);
        let b = contact(tenant_id, Some("K-2"), None);
        directory.refresh(tenant_id, &a);
        directory.refresh(tenant_id, &b);

        assert_eq!(
            directory.routing_key_holders(tenant_id, "K-1", None),
            vec![a.id_typed()]
        );
        assert!(
            directory
                .routing_key_holders(tenant_id, "K-1", Some(a.id_typed()))
                .is_empty()
        );
        assert!(
            directory
                .routing_key_holders(TenantId::new(), "K-1", None)
                .is_empty()
        );
    }

    #[test]
    fn external_id_lookup_finds_the_contact() {
        let directory = ContactDirectory::new(InMemoryTenantStore::new());
        let tenant_id = TenantId::new();
        let a = contact(tenant_id, None, Some("DRV-7"));
        directory.refresh(tenant_id, &a);

        let found = directory
            .find_by_routing_external_id(tenant_id, "DRV-7")
            .unwrap();
        assert_eq!(found.contact_id, a.id_typed());
        assert_eq!(found.name, "Azure Interior");
        assert!(directory.find_by_routing_external_id(tenant_id, "DRV-8").is_none());
    }
}
