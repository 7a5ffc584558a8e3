// src/types.rs

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Flavour of server core a [`crate::server::catalog::CoreCatalog`] can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    Vanilla,
    #[default]
    Paper,
    Spigot,
}

impl ServerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerKind::Vanilla => "vanilla",
            ServerKind::Paper => "paper",
            ServerKind::Spigot => "spigot",
        }
    }
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vanilla" => Ok(ServerKind::Vanilla),
            "paper" => Ok(ServerKind::Paper),
            "spigot" => Ok(ServerKind::Spigot),
            other => Err(format!(
                "invalid server kind: {other} (expected \"vanilla\", \"paper\" or \"spigot\")"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(" Paper ".parse::<ServerKind>(), Ok(ServerKind::Paper));
        assert_eq!("VANILLA".parse::<ServerKind>(), Ok(ServerKind::Vanilla));
        assert!("forge".parse::<ServerKind>().is_err());
    }
}
