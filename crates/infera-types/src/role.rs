use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role an actor plays inside a topic.
///
/// Workers submit as inferers and forecasters; reputers evaluate them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActorRole {
    Inferer,
    Forecaster,
    Reputer,
}

impl ActorRole {
    pub const ALL: [ActorRole; 3] = [ActorRole::Inferer, ActorRole::Forecaster, ActorRole::Reputer];

    pub fn code(&self) -> u8 {
        match self {
            ActorRole::Inferer => 0,
            ActorRole::Forecaster => 1,
            ActorRole::Reputer => 2,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(ActorRole::Inferer),
            1 => Ok(ActorRole::Forecaster),
            2 => Ok(ActorRole::Reputer),
            other => Err(TypesError::UnknownRole(other)),
        }
    }

    pub fn is_worker(&self) -> bool {
        !matches!(self, ActorRole::Reputer)
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActorRole::Inferer => "inferer",
            ActorRole::Forecaster => "forecaster",
            ActorRole::Reputer => "reputer",
        };
        f.write_str(name)
    }
}

/// What kind of registration an actor holds in a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationKind {
    Worker,
    Reputer,
}

/// Which loss pair a regret entry tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RegretKind {
    /// Inferer loss against the combined network loss.
    InfererNetwork,
    /// Forecaster loss against the combined network loss.
    ForecasterNetwork,
    /// Inferer loss against the naive (forecast-free) network loss.
    NaiveInfererNetwork,
    /// One-in forecaster network loss against an inferer's loss; keyed by counterpart.
    OneInForecaster,
}

impl RegretKind {
    pub fn code(&self) -> u8 {
        match self {
            RegretKind::InfererNetwork => 0,
            RegretKind::ForecasterNetwork => 1,
            RegretKind::NaiveInfererNetwork => 2,
            RegretKind::OneInForecaster => 3,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(RegretKind::InfererNetwork),
            1 => Ok(RegretKind::ForecasterNetwork),
            2 => Ok(RegretKind::NaiveInfererNetwork),
            3 => Ok(RegretKind::OneInForecaster),
            other => Err(TypesError::UnknownRegretKind(other)),
        }
    }

    pub fn has_counterpart(&self) -> bool {
        matches!(self, RegretKind::OneInForecaster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_codes_round_trip() {
        for role in ActorRole::ALL {
            assert_eq!(ActorRole::from_code(role.code()).unwrap(), role);
        }
        assert!(ActorRole::from_code(9).is_err());
        assert!(ActorRole::Forecaster.is_worker());
        assert!(!ActorRole::Reputer.is_worker());
    }
}
