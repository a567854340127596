//! Shared types for the kiosk gateway

use crate::error::WorkflowError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Instant;

/// Length of a card id as emitted by the card reader
pub const CARD_ID_LEN: usize = 10;

/// Validated card identifier from the card reader
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(String);

impl CardId {
    /// Validate a raw card reading (surrounding whitespace is ignored)
    pub fn parse(raw: &str) -> Result<Self, WorkflowError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(WorkflowError::malformed("empty card reading"));
        }
        if trimmed.len() != CARD_ID_LEN || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(WorkflowError::malformed(format!("invalid card id {trimmed:?}")));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role of a card holder as assigned by the authentication service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Customer,
    Stocker,
    Maintainer,
    Unrecognized(i64),
}

impl Role {
    pub fn from_id(role_id: i64) -> Self {
        match role_id {
            1 => Role::Customer,
            2 => Role::Stocker,
            3 => Role::Maintainer,
            other => Role::Unrecognized(other),
        }
    }

    /// Roles that open the cabinet for a transaction
    pub fn opens_cabinet(&self) -> bool {
        matches!(self, Role::Customer | Role::Stocker)
    }

    /// Only customers are charged through the ledger
    pub fn is_billable(&self) -> bool {
        matches!(self, Role::Customer)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Stocker => "stocker",
            Role::Maintainer => "maintainer",
            Role::Unrecognized(_) => "unrecognized",
        }
    }
}

/// Card holder returned by the authentication service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "accountID")]
    pub account_id: i64,
    #[serde(rename = "personID")]
    pub person_id: i64,
    #[serde(rename = "roleID")]
    pub role_id: i64,
    #[serde(rename = "cardID")]
    pub card_id: String,
}

impl User {
    pub fn role(&self) -> Role {
        Role::from_id(self.role_id)
    }
}

/// Signed quantity change for one SKU, as produced by the vision system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuDelta {
    #[serde(rename = "SKU")]
    pub sku: String,
    pub delta: i64,
}

/// Status report relayed from the controller board
///
/// Every field is optional: boards omit sensors they do not have. A missing
/// `door_closed` carries no door information and never drives a transition.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BoardStatus {
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub lock1_status: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub lock2_status: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub door_closed: Option<bool>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(rename = "minTemperatureStatus", default, deserialize_with = "deserialize_flag")]
    pub min_temperature_status: Option<bool>,
    #[serde(rename = "maxTemperatureStatus", default, deserialize_with = "deserialize_flag")]
    pub max_temperature_status: Option<bool>,
}

impl BoardStatus {
    /// True when the board reports a temperature excursion in either direction
    pub fn temperature_alarm(&self) -> bool {
        self.min_temperature_status.unwrap_or(false) || self.max_temperature_status.unwrap_or(false)
    }
}

/// Boards report flags either as JSON booleans or as 0/1 integers
fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct FlagVisitor;

    impl<'de> Visitor<'de> for FlagVisitor {
        type Value = Option<bool>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a boolean or integer flag")
        }

        fn visit_bool<E>(self, value: bool) -> Result<Option<bool>, E>
        where
            E: de::Error,
        {
            Ok(Some(value))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Option<bool>, E>
        where
            E: de::Error,
        {
            Ok(Some(value != 0))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Option<bool>, E>
        where
            E: de::Error,
        {
            Ok(Some(value != 0))
        }

        fn visit_unit<E>(self) -> Result<Option<bool>, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_none<E>(self) -> Result<Option<bool>, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(FlagVisitor)
}

/// Account ledger returned by the ledger service after a purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(rename = "accountID")]
    pub account_id: i64,
    #[serde(default)]
    pub balance: f64,
    #[serde(rename = "transactionAmount", default)]
    pub transaction_amount: Option<f64>,
}

impl Ledger {
    /// Two LCD rows summarizing the purchase
    pub fn display_rows(&self) -> [String; 2] {
        let first = match self.transaction_amount {
            Some(amount) => format!("Charged ${amount:.2}"),
            None => "Thank you".to_string(),
        };
        [first, format!("Balance ${:.2}", self.balance)]
    }
}

/// Entry appended to the audit log for every inference result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(rename = "cardID")]
    pub card_id: String,
    #[serde(rename = "accountID")]
    pub account_id: i64,
    #[serde(rename = "personID")]
    pub person_id: i64,
    #[serde(rename = "roleID")]
    pub role_id: i64,
    pub items: Vec<SkuDelta>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Build an entry for the given user (or an anonymous entry when none is active)
    pub fn new(user: Option<&User>, items: Vec<SkuDelta>, timestamp: DateTime<Utc>) -> Self {
        match user {
            Some(user) => Self {
                card_id: user.card_id.clone(),
                account_id: user.account_id,
                person_id: user.person_id,
                role_id: user.role_id,
                items,
                timestamp,
            },
            None => Self {
                card_id: String::new(),
                account_id: 0,
                person_id: 0,
                role_id: 0,
                items,
                timestamp,
            },
        }
    }
}

/// Event delivered to the workflow dispatcher from the kiosk message bus
#[derive(Debug, Clone)]
pub enum KioskEvent {
    CardScanned { card_id: CardId, received_at: Instant },
    Inference { deltas: Vec<SkuDelta>, received_at: Instant },
}

impl KioskEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            KioskEvent::CardScanned { .. } => "card_scanned",
            KioskEvent::Inference { .. } => "inference",
        }
    }

    pub fn received_at(&self) -> Instant {
        match self {
            KioskEvent::CardScanned { received_at, .. } | KioskEvent::Inference { received_at, .. } => {
                *received_at
            }
        }
    }
}
