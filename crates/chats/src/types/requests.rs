//! Inputs accepted by the chat services.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use parley_database::RequestStatus;

/// A receiver's answer to a pending chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub fn status(&self) -> RequestStatus {
        match self {
            Decision::Accept => RequestStatus::Accepted,
            Decision::Reject => RequestStatus::Rejected,
        }
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "accept" => Ok(Decision::Accept),
            "reject" => Ok(Decision::Reject),
            other => Err(format!("action must be `accept` or `reject`, got `{other}`")),
        }
    }
}

/// Cursor window over a room's history. Both fields fall back to defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct HistoryQuery {
    pub since: Option<i64>,
    pub limit: Option<u32>,
}
