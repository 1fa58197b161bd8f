// ABOUTME: Plain records exchanged between backend, replicas and display clients
// ABOUTME: Opaque to the coherence protocol beyond their keys and medal winners

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a sporting event (score, result and subscription key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventKey(pub String);

/// Identifies a nation (medal tally key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NationKey(pub String);

impl EventKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl NationKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for NationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Athlete {
    pub name: String,
    pub nation: NationKey,
    pub score: i64,
}

impl Athlete {
    pub fn new(name: impl Into<String>, nation: impl Into<String>, score: i64) -> Self {
        Self {
            name: name.into(),
            nation: NationKey::new(nation),
            score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Medal {
    Gold,
    Silver,
    Bronze,
}

impl Medal {
    pub const ALL: [Medal; 3] = [Medal::Gold, Medal::Silver, Medal::Bronze];
}

/// Final standings of a completed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Results {
    pub gold: Athlete,
    pub silver: Athlete,
    pub bronze: Athlete,
}

impl Results {
    pub fn winner(&self, medal: Medal) -> &Athlete {
        match medal {
            Medal::Gold => &self.gold,
            Medal::Silver => &self.silver,
            Medal::Bronze => &self.bronze,
        }
    }

    /// Nation that took the given medal.
    pub fn nation(&self, medal: Medal) -> &NationKey {
        &self.winner(medal).nation
    }

    /// Distinct medal-winning nations, gold first.
    pub fn nations(&self) -> Vec<NationKey> {
        let mut nations: Vec<NationKey> = Vec::with_capacity(3);
        for medal in Medal::ALL {
            let nation = self.nation(medal);
            if !nations.contains(nation) {
                nations.push(nation.clone());
            }
        }
        nations
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub nation: NationKey,
    pub gold: u32,
    pub silver: u32,
    pub bronze: u32,
}

impl Tally {
    pub fn total(&self) -> u32 {
        self.gold + self.silver + self.bronze
    }
}

/// An event whose results are final, as relayed from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedEvent {
    pub name: EventKey,
    pub result: Results,
}
