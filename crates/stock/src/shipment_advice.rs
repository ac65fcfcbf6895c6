use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shipadvice_core::{Aggregate, AggregateRoot, DomainError, TenantId, aggregate_id};
use shipadvice_events::Event;

use crate::transfer::TransferId;

aggregate_id!(
    /// Shipment advice identifier (tenant-scoped via `tenant_id` fields in events/commands).
    ShipmentAdviceId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShipmentType {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentState {
    Draft,
    InProgress,
    Done,
}

/// Aggregate root: ShipmentAdvice (a truck / dock slot grouping transfers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentAdvice {
    id: ShipmentAdviceId,
    tenant_id: Option<TenantId>,
    shipment_type: ShipmentType,
    state: ShipmentState,
    transfer_ids: Vec<TransferId>,
    version: u64,
    created: bool,
}

impl ShipmentAdvice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ShipmentAdviceId) -> Self {
        Self {
            id,
            tenant_id: None,
            shipment_type: ShipmentType::Outgoing,
            state: ShipmentState::Draft,
            transfer_ids: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ShipmentAdviceId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn shipment_type(&self) -> ShipmentType {
        self.shipment_type
    }

    pub fn state(&self) -> ShipmentState {
        self.state
    }

    pub fn transfer_ids(&self) -> &[TransferId] {
        &self.transfer_ids
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for ShipmentAdvice {
    type Id = ShipmentAdviceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateShipmentAdvice {
    pub tenant_id: TenantId,
    pub shipment_id: ShipmentAdviceId,
    pub shipment_type: ShipmentType,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTransfers {
    pub tenant_id: TenantId,
    pub shipment_id: ShipmentAdviceId,
    pub transfer_ids: Vec<TransferId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartShipment {
    pub tenant_id: TenantId,
    pub shipment_id: ShipmentAdviceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkShipmentDone {
    pub tenant_id: TenantId,
    pub shipment_id: ShipmentAdviceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShipmentAdviceCommand {
    CreateShipmentAdvice(CreateShipmentAdvice),
    PlanTransfers(PlanTransfers),
    StartShipment(StartShipment),
    MarkShipmentDone(MarkShipmentDone),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentAdviceCreated {
    pub tenant_id: TenantId,
    pub shipment_id: ShipmentAdviceId,
    pub shipment_type: ShipmentType,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransfersPlanned (only the newly added transfers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransfersPlanned {
    pub tenant_id: TenantId,
    pub shipment_id: ShipmentAdviceId,
    pub transfer_ids: Vec<TransferId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentStarted {
    pub tenant_id: TenantId,
    pub shipment_id: ShipmentAdviceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentDone {
    pub tenant_id: TenantId,
    pub shipment_id: ShipmentAdviceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShipmentAdviceEvent {
    ShipmentAdviceCreated(ShipmentAdviceCreated),
    TransfersPlanned(TransfersPlanned),
    ShipmentStarted(ShipmentStarted),
    ShipmentDone(ShipmentDone),
}

impl Event for ShipmentAdviceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ShipmentAdviceEvent::ShipmentAdviceCreated(_) => "stock.shipment_advice.created",
            ShipmentAdviceEvent::TransfersPlanned(_) => "stock.shipment_advice.transfers_planned",
            ShipmentAdviceEvent::ShipmentStarted(_) => "stock.shipment_advice.started",
            ShipmentAdviceEvent::ShipmentDone(_) => "stock.shipment_advice.done",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ShipmentAdviceEvent::ShipmentAdviceCreated(e) => e.occurred_at,
            ShipmentAdviceEvent::TransfersPlanned(e) => e.occurred_at,
            ShipmentAdviceEvent::ShipmentStarted(e) => e.occurred_at,
            ShipmentAdviceEvent::ShipmentDone(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ShipmentAdvice {
    type Command = ShipmentAdviceCommand;
    type Event = ShipmentAdviceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ShipmentAdviceEvent::ShipmentAdviceCreated(e) => {
                self.id = e.shipment_id;
                self.tenant_id = Some(e.tenant_id);
                self.shipment_type = e.shipment_type;
                self.state = ShipmentState::Draft;
                self.transfer_ids.clear();
                self.created = true;
            }
            ShipmentAdviceEvent::TransfersPlanned(e) => {
                self.transfer_ids.extend(e.transfer_ids.iter().copied());
            }
            ShipmentAdviceEvent::ShipmentStarted(_) => {
                self.state = ShipmentState::InProgress;
            }
            ShipmentAdviceEvent::ShipmentDone(_) => {
                self.state = ShipmentState::Done;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ShipmentAdviceCommand::CreateShipmentAdvice(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("shipment advice already exists"));
                }
                Ok(vec![ShipmentAdviceEvent::ShipmentAdviceCreated(
                    ShipmentAdviceCreated {
                        tenant_id: cmd.tenant_id,
                        shipment_id: cmd.shipment_id,
                        shipment_type: cmd.shipment_type,
                        occurred_at: cmd.occurred_at,
                    },
                )])
            }
            ShipmentAdviceCommand::PlanTransfers(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.shipment_id)?;
                if self.state != ShipmentState::Draft {
                    return Err(DomainError::invariant(
                        "transfers can only be planned on a draft shipment",
                    ));
                }
                let mut added: Vec<TransferId> = Vec::new();
                for id in &cmd.transfer_ids {
                    if !self.transfer_ids.contains(id) && !added.contains(id) {
                        added.push(*id);
                    }
                }
                if added.is_empty() {
                    return Ok(vec![]);
                }
                Ok(vec![ShipmentAdviceEvent::TransfersPlanned(TransfersPlanned {
                    tenant_id: cmd.tenant_id,
                    shipment_id: cmd.shipment_id,
                    transfer_ids: added,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ShipmentAdviceCommand::StartShipment(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.shipment_id)?;
                if self.state != ShipmentState::Draft {
                    return Err(DomainError::conflict("shipment already started"));
                }
                if self.transfer_ids.is_empty() {
                    return Err(DomainError::validation("no transfer planned in this shipment"));
                }
                Ok(vec![ShipmentAdviceEvent::ShipmentStarted(ShipmentStarted {
                    tenant_id: cmd.tenant_id,
                    shipment_id: cmd.shipment_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ShipmentAdviceCommand::MarkShipmentDone(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.shipment_id)?;
                if self.state != ShipmentState::InProgress {
                    return Err(DomainError::invariant(
                        "only shipments in progress can be set to done",
                    ));
                }
                Ok(vec![ShipmentAdviceEvent::ShipmentDone(ShipmentDone {
                    tenant_id: cmd.tenant_id,
                    shipment_id: cmd.shipment_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl ShipmentAdvice {
    fn ensure_existing(&self, tenant_id: TenantId, shipment_id: ShipmentAdviceId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != shipment_id {
            return Err(DomainError::invariant("shipment_id mismatch"));
        }
        Ok(())
    }
}
