use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shipadvice_core::{Aggregate, AggregateRoot, DomainError, TenantId, aggregate_id};
use shipadvice_events::Event;

use crate::address::{Address, AddressTemplate};

aggregate_id!(
    /// Contact identifier (tenant-scoped via `tenant_id` fields in events/commands).
    ContactId
);

/// When the customer's deliveries get invoiced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoicingMode {
    /// Invoiced by the regular (periodic) invoicing run.
    #[default]
    Standard,
    /// Invoiced as soon as a delivery is validated.
    AtShipping,
}

/// Identifiers correlating the contact with the external routing system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRef {
    /// Driver external id, used to match the contact after a routing import.
    pub external_id: Option<String>,
    /// Unique key of the contact in the routing system.
    pub key: Option<String>,
}

impl RoutingRef {
    /// Blank values are stored as unset.
    pub fn normalized(self) -> Self {
        Self {
            external_id: normalize(self.external_id),
            key: normalize(self.key),
        }
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Aggregate root: Contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    id: ContactId,
    tenant_id: Option<TenantId>,
    name: String,
    invoicing_mode: InvoicingMode,
    address: Address,
    routing: RoutingRef,
    version: u64,
    created: bool,
}

impl Contact {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ContactId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            invoicing_mode: InvoicingMode::Standard,
            address: Address::default(),
            routing: RoutingRef::default(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ContactId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoicing_mode(&self) -> InvoicingMode {
        self.invoicing_mode
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn routing(&self) -> &RoutingRef {
        &self.routing
    }

    pub fn routing_key(&self) -> Option<&str> {
        self.routing.key.as_deref()
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Address string exported to the routing system.
    pub fn format_routing_address(&self, template: &AddressTemplate) -> String {
        template.render(|field| match field {
            "name" => Some(self.name.as_str()),
            other => self.address.field(other),
        })
    }
}

impl AggregateRoot for Contact {
    type Id = ContactId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterContact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterContact {
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub name: String,
    pub invoicing_mode: InvoicingMode,
    pub address: Address,
    pub routing: RoutingRef,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateContact. `None` keeps the current value.
///
/// `routing` replaces both routing identifiers at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateContact {
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub name: Option<String>,
    pub invoicing_mode: Option<InvoicingMode>,
    pub address: Option<Address>,
    pub routing: Option<RoutingRef>,
    pub occurred_at: DateTime<Utc>,
}

impl UpdateContact {
    pub fn new(tenant_id: TenantId, contact_id: ContactId, occurred_at: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            contact_id,
            name: None,
            invoicing_mode: None,
            address: None,
            routing: None,
            occurred_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactCommand {
    RegisterContact(RegisterContact),
    UpdateContact(UpdateContact),
}

impl ContactCommand {
    /// Normalized routing key the command would leave on the contact.
    ///
    /// Outer `None`: the command does not touch the key.
    pub fn routing_key(&self) -> Option<Option<String>> {
        match self {
            ContactCommand::RegisterContact(cmd) => Some(normalize(cmd.routing.key.clone())),
            ContactCommand::UpdateContact(cmd) => {
                cmd.routing.as_ref().map(|r| normalize(r.key.clone()))
            }
        }
    }

    pub fn contact_id(&self) -> ContactId {
        match self {
            ContactCommand::RegisterContact(cmd) => cmd.contact_id,
            ContactCommand::UpdateContact(cmd) => cmd.contact_id,
        }
    }
}

/// Event: ContactRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRegistered {
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub name: String,
    pub invoicing_mode: InvoicingMode,
    pub address: Address,
    pub routing: RoutingRef,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ContactUpdated (full new state of the mutable fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactUpdated {
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub name: String,
    pub invoicing_mode: InvoicingMode,
    pub address: Address,
    pub routing: RoutingRef,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactEvent {
    ContactRegistered(ContactRegistered),
    ContactUpdated(ContactUpdated),
}

impl Event for ContactEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ContactEvent::ContactRegistered(_) => "parties.contact.registered",
            ContactEvent::ContactUpdated(_) => "parties.contact.updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ContactEvent::ContactRegistered(e) => e.occurred_at,
            ContactEvent::ContactUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Contact {
    type Command = ContactCommand;
    type Event = ContactEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ContactEvent::ContactRegistered(e) => {
                self.id = e.contact_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.invoicing_mode = e.invoicing_mode;
                self.address = e.address.clone();
                self.routing = e.routing.clone();
                self.created = true;
            }
            ContactEvent::ContactUpdated(e) => {
                self.name = e.name.clone();
                self.invoicing_mode = e.invoicing_mode;
                self.address = e.address.clone();
                self.routing = e.routing.clone();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ContactCommand::RegisterContact(cmd) => self.handle_register(cmd),
            ContactCommand::UpdateContact(cmd) => self.handle_update(cmd),
        }
    }
}

impl Contact {
    fn handle_register(&self, cmd: &RegisterContact) -> Result<Vec<ContactEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("contact already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![ContactEvent::ContactRegistered(ContactRegistered {
            tenant_id: cmd.tenant_id,
            contact_id: cmd.contact_id,
            name: cmd.name.clone(),
            invoicing_mode: cmd.invoicing_mode,
            address: cmd.address.clone(),
            routing: cmd.routing.clone().normalized(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateContact) -> Result<Vec<ContactEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(cmd.tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != cmd.contact_id {
            return Err(DomainError::invariant("contact_id mismatch"));
        }

        let name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![ContactEvent::ContactUpdated(ContactUpdated {
            tenant_id: cmd.tenant_id,
            contact_id: cmd.contact_id,
            name,
            invoicing_mode: cmd.invoicing_mode.unwrap_or(self.invoicing_mode),
            address: cmd.address.clone().unwrap_or_else(|| self.address.clone()),
            routing: cmd
                .routing
                .clone()
                .map(RoutingRef::normalized)
                .unwrap_or_else(|| self.routing.clone()),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Country, State};

    fn register_cmd(tenant_id: TenantId, contact_id: ContactId) -> RegisterContact {
        RegisterContact {
            tenant_id,
            contact_id,
            name: "partner_a".to_string(),
            invoicing_mode: InvoicingMode::AtShipping,
            address: Address {
                street: Some("Chemin du Lac 4".to_string()),
                street2: None,
                zip: Some("1020".to_string()),
                city: Some("Renens".to_string()),
                state: Some(State {
                    code: "VD".to_string(),
                    name: "Vaud".to_string(),
                }),
                country: Some(Country {
                    code: "CH".to_string(),
                    name: "Switzerland".to_string(),
                }),
            },
            routing: RoutingRef {
                external_id: Some("  ".to_string()),
                key: Some(" KEY-1 ".to_string()),
            },
            occurred_at: Utc::now(),
        }
    }

    fn registered() -> Contact {
        let contact_id = ContactId::generate();
        let mut contact = Contact::empty(contact_id);
        let events = contact
            .handle(&ContactCommand::RegisterContact(register_cmd(
                TenantId::new(),
                contact_id,
            )))
            .unwrap();
        contact.apply(&events[0]);
        contact
    }

    #[test]
    fn register_normalizes_routing_identifiers() {
        let contact = registered();
        assert_eq!(contact.routing_key(), Some("KEY-1"));
        assert_eq!(contact.routing().external_id, None);
        assert_eq!(contact.invoicing_mode(), InvoicingMode::AtShipping);
        assert_eq!(contact.version(), 1);
    }

    #[test]
    fn register_rejects_empty_name() {
        let contact_id = ContactId::generate();
        let mut cmd = register_cmd(TenantId::new(), contact_id);
        cmd.name = " ".to_string();
        let err = Contact::empty(contact_id)
            .handle(&ContactCommand::RegisterContact(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn update_keeps_unspecified_fields() {
        let mut contact = registered();
        let tenant_id = contact.tenant_id().unwrap();
        let mut cmd = UpdateContact::new(tenant_id, contact.id_typed(), Utc::now());
        cmd.name = Some("partner_a2".to_string());
        let events = contact
            .handle(&ContactCommand::UpdateContact(cmd))
            .unwrap();
        contact.apply(&events[0]);

        assert_eq!(contact.name(), "partner_a2");
        assert_eq!(contact.routing_key(), Some("KEY-1"));
        assert_eq!(contact.address().city.as_deref(), Some("Renens"));
    }

    #[test]
    fn update_can_clear_routing_key() {
        let mut contact = registered();
        let tenant_id = contact.tenant_id().unwrap();
        let mut cmd = UpdateContact::new(tenant_id, contact.id_typed(), Utc::now());
        cmd.routing = Some(RoutingRef {
            external_id: Some("DRV-7".to_string()),
            key: Some(String::new()),
        });
        let events = contact
            .handle(&ContactCommand::UpdateContact(cmd))
            .unwrap();
        contact.apply(&events[0]);

        assert_eq!(contact.routing_key(), None);
        assert_eq!(contact.routing().external_id.as_deref(), Some("DRV-7"));
    }

    #[test]
    fn update_unknown_contact_is_not_found() {
        let contact = Contact::empty(ContactId::generate());
        let cmd = UpdateContact::new(TenantId::new(), contact.id_typed(), Utc::now());
        let err = contact
            .handle(&ContactCommand::UpdateContact(cmd))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn routing_address_uses_template_and_name() {
        let contact = registered();
        let template = AddressTemplate::parse("{name}: {street}, {zip} {city} ({state_code}), {country_name}")
            .unwrap();
        assert_eq!(
            contact.format_routing_address(&template),
            "partner_a: Chemin du Lac 4, 1020 Renens (VD), Switzerland"
        );
    }

    #[test]
    fn routing_address_of_bare_contact_degrades_to_separators() {
        let contact_id = ContactId::generate();
        let mut contact = Contact::empty(contact_id);
        let mut cmd = register_cmd(TenantId::new(), contact_id);
        cmd.address = Address::default();
        let events = contact
            .handle(&ContactCommand::RegisterContact(cmd))
            .unwrap();
        contact.apply(&events[0]);

        assert_eq!(
            contact.format_routing_address(&AddressTemplate::default()),
            " ,  , , "
        );
    }

    #[test]
    fn command_exposes_routing_key_it_writes() {
        let cmd = ContactCommand::RegisterContact(register_cmd(
            TenantId::new(),
            ContactId::generate(),
        ));
        assert_eq!(cmd.routing_key(), Some(Some("KEY-1".to_string())));

        let update = ContactCommand::UpdateContact(UpdateContact::new(
            TenantId::new(),
            ContactId::generate(),
            Utc::now(),
        ));
        assert_eq!(update.routing_key(), None);
    }
}
