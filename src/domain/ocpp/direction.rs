//! Direction of an OCPP call relative to the central system.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    /// Initiated by the charge point (e.g. BootNotification).
    CpToCsms,
    /// Initiated by the central system (e.g. Reset).
    CsmsToCp,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CpToCsms => "cp_to_csms",
            Self::CsmsToCp => "csms_to_cp",
        }
    }
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "cp_to_csms" => Ok(Self::CpToCsms),
            "csms_to_cp" => Ok(Self::CsmsToCp),
            other => Err(format!("unknown call direction: {}", other)),
        }
    }
}
