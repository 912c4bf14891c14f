use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Client population served by the messaging API.
///
/// Each tenant owns an isolated database and credential table. The string
/// form (`company` / `student`) is what travels inside token payloads and
/// request bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tenant {
    Company,
    Student,
}

impl Tenant {
    pub const ALL: [Tenant; 2] = [Tenant::Company, Tenant::Student];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tenant::Company => "company",
            Tenant::Student => "student",
        }
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known tenant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown app kind '{0}'")]
pub struct UnknownTenant(pub String);

impl FromStr for Tenant {
    type Err = UnknownTenant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "company" => Ok(Tenant::Company),
            "student" => Ok(Tenant::Student),
            other => Err(UnknownTenant(other.to_string())),
        }
    }
}
