//! Deployment configuration, read from the environment at startup.
//!
//! | Variable | Default |
//! |---|---|
//! | `SHIPADVICE_ROUTING_ADDRESS_FORMAT` | [`DEFAULT_ROUTING_ADDRESS_FORMAT`] |
//! | `SHIPADVICE_QUEUE_INVOICING` | `true` |
//! | `SHIPADVICE_INVOICING_MAX_ATTEMPTS` | `5` |
//! | `SHIPADVICE_LOG` | `info` (used when `RUST_LOG` is unset) |

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use shipadvice_parties::{AddressTemplate, DEFAULT_ROUTING_ADDRESS_FORMAT};

pub const ROUTING_ADDRESS_FORMAT_VAR: &str = "SHIPADVICE_ROUTING_ADDRESS_FORMAT";
pub const QUEUE_INVOICING_VAR: &str = "SHIPADVICE_QUEUE_INVOICING";
pub const INVOICING_MAX_ATTEMPTS_VAR: &str = "SHIPADVICE_INVOICING_MAX_ATTEMPTS";
pub const LOG_VAR: &str = "SHIPADVICE_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipAdviceConfig {
    /// Template of the address string exported to the routing system.
    pub routing_address_format: String,
    /// Hand invoicing at shipping to the job queue instead of running it inline.
    pub queue_invoicing: bool,
    /// Attempts allowed for a queued invoicing job.
    pub invoicing_max_attempts: u32,
    /// Default tracing filter directive.
    pub log_filter: String,
}

impl Default for ShipAdviceConfig {
    fn default() -> Self {
        Self {
            routing_address_format: DEFAULT_ROUTING_ADDRESS_FORMAT.to_string(),
            queue_invoicing: true,
            invoicing_max_attempts: 5,
            log_filter: "info".to_string(),
        }
    }
}

impl ShipAdviceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; unset or blank variables keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(format) = var(ROUTING_ADDRESS_FORMAT_VAR) {
            config.routing_address_format = format;
        }
        if let Some(raw) = var(QUEUE_INVOICING_VAR) {
            config.queue_invoicing = parse_bool(&raw)
                .with_context(|| format!("invalid {QUEUE_INVOICING_VAR}"))?;
        }
        if let Some(raw) = var(INVOICING_MAX_ATTEMPTS_VAR) {
            config.invoicing_max_attempts = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid {INVOICING_MAX_ATTEMPTS_VAR}: {raw:?}"))?;
        }
        if let Some(filter) = var(LOG_VAR) {
            config.log_filter = filter;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.routing_address_template()?;
        if self.invoicing_max_attempts == 0 {
            bail!("{INVOICING_MAX_ATTEMPTS_VAR} must be at least 1");
        }
        Ok(())
    }

    pub fn routing_address_template(&self) -> anyhow::Result<AddressTemplate> {
        let template = AddressTemplate::parse(&self.routing_address_format).with_context(|| {
            format!(
                "invalid routing address format {:?}",
                self.routing_address_format
            )
        })?;
        let unknown = template.unknown_fields();
        if !unknown.is_empty() {
            tracing::warn!(
                fields = ?unknown,
                "routing address format references unknown fields; they render empty"
            );
        }
        Ok(template)
    }
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}
