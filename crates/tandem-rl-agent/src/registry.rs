//! Grouping of sub-algorithms by the optimizer that trains them
//!
//! Group 0 always exists: it holds the observation encoder and is trained by
//! the agent's primary optimizer. Every other member joins group 0 unless it
//! brings an optimizer of its own, in which case it gets a group to itself.
//! Membership is fixed once the agent is built; only optimizer moments change
//! afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use tandem_rl_core::{Optimizer, OptimizerConfig, Result};

/// A trainable member of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Member {
    /// Observation encoder
    Encoder,
    /// Policy algorithm
    Rl,
    /// Curiosity module
    Icm,
    /// Entropy-target controller
    EntropyTarget,
}

impl Member {
    /// Key used for this member in composite records
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Encoder => "encoder",
            Self::Rl => "rl",
            Self::Icm => "icm",
            Self::EntropyTarget => "entropy_target",
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Members trained together by one optimizer
#[derive(Debug, Clone)]
pub struct OptimizerGroup {
    members: Vec<Member>,
    optimizer: Option<Optimizer>,
}

impl OptimizerGroup {
    /// Members of the group, in registration order
    #[must_use]
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Optimizer of the group; `None` leaves its members untrained
    #[must_use]
    pub fn optimizer(&self) -> Option<&Optimizer> {
        self.optimizer.as_ref()
    }

    pub(crate) fn optimizer_mut(&mut self) -> Option<&mut Optimizer> {
        self.optimizer.as_mut()
    }

    /// Whether `member` belongs to the group
    #[must_use]
    pub fn contains(&self, member: Member) -> bool {
        self.members.contains(&member)
    }
}

/// Ordered optimizer groups of an agent
#[derive(Debug, Clone)]
pub struct OptimizerRegistry {
    groups: Vec<OptimizerGroup>,
}

impl OptimizerRegistry {
    /// Registry whose primary group holds the encoder
    pub fn new(primary: Option<&OptimizerConfig>) -> Result<Self> {
        Ok(Self {
            groups: vec![OptimizerGroup {
                members: vec![Member::Encoder],
                optimizer: primary.map(OptimizerConfig::build).transpose()?,
            }],
        })
    }

    /// Register `member`, isolating it when it supplies its own optimizer.
    ///
    /// Returns the index of the group it joined.
    pub fn add(&mut self, member: Member, own: Option<&OptimizerConfig>) -> Result<usize> {
        let index = match own {
            Some(config) => {
                self.groups.push(OptimizerGroup {
                    members: vec![member],
                    optimizer: Some(config.build()?),
                });
                self.groups.len() - 1
            }
            None => {
                self.groups[0].members.push(member);
                0
            }
        };
        debug!(%member, group = index, "registered optimizer group member");
        Ok(index)
    }

    /// Groups in order; group 0 is the primary group
    #[must_use]
    pub fn groups(&self) -> &[OptimizerGroup] {
        &self.groups
    }

    pub(crate) fn groups_mut(&mut self) -> &mut [OptimizerGroup] {
        &mut self.groups
    }

    /// Number of groups
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Always false: the primary group exists from construction
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Index of the group `member` belongs to
    #[must_use]
    pub fn group_of(&self, member: Member) -> Option<usize> {
        self.groups.iter().position(|g| g.contains(member))
    }
}
