//! Replica role state machine
//!
//! - Standalone: not replicated, reads and writes allowed (default)
//! - Primary: sole write authority
//! - IdleSecondary: building its copy, serves nothing
//! - ActiveSecondary: caught up, serves reads, rejects writes
//! - Demoted: closing or removed, serves nothing
//!
//! Transitions are explicit. An idle secondary must become active before it
//! can be promoted; a demoted replica never comes back.

use std::sync::{PoisonError, RwLock};

use uuid::Uuid;

use super::errors::{AvailabilityError, AvailabilityResult};
use super::{AccessStatus, Availability};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplicaRole {
    #[default]
    Standalone,
    Primary,
    IdleSecondary {
        replica_id: Uuid,
    },
    ActiveSecondary {
        replica_id: Uuid,
    },
    Demoted,
}

impl ReplicaRole {
    /// Promote to primary. Valid from Standalone and ActiveSecondary.
    pub fn become_primary(self) -> AvailabilityResult<Self> {
        match self {
            Self::Standalone | Self::ActiveSecondary { .. } | Self::Primary => Ok(Self::Primary),
            other => Err(other.illegal("primary")),
        }
    }

    /// Join as a secondary that is still building its copy.
    pub fn become_idle_secondary(self, replica_id: Uuid) -> AvailabilityResult<Self> {
        match self {
            Self::Standalone => Ok(Self::IdleSecondary { replica_id }),
            Self::IdleSecondary { replica_id: existing } => {
                Self::same_replica(existing, replica_id)?;
                Ok(self)
            }
            other => Err(other.illegal("idle_secondary")),
        }
    }

    /// Mark a secondary as caught up, or demote a primary to a readable
    /// secondary.
    pub fn become_active_secondary(self, replica_id: Uuid) -> AvailabilityResult<Self> {
        match self {
            Self::Primary => Ok(Self::ActiveSecondary { replica_id }),
            Self::IdleSecondary { replica_id: existing }
            | Self::ActiveSecondary { replica_id: existing } => {
                Self::same_replica(existing, replica_id)?;
                Ok(Self::ActiveSecondary { replica_id })
            }
            other => Err(other.illegal("active_secondary")),
        }
    }

    /// Leave the replica set. Valid from any role.
    pub fn demote(self) -> Self {
        Self::Demoted
    }

    pub fn can_write(&self) -> bool {
        matches!(self, Self::Standalone | Self::Primary)
    }

    pub fn can_read(&self) -> bool {
        matches!(
            self,
            Self::Standalone | Self::Primary | Self::ActiveSecondary { .. }
        )
    }

    pub fn replica_id(&self) -> Option<Uuid> {
        match self {
            Self::IdleSecondary { replica_id } | Self::ActiveSecondary { replica_id } => {
                Some(*replica_id)
            }
            _ => None,
        }
    }

    /// Role name for observability.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Standalone => "standalone",
            Self::Primary => "primary",
            Self::IdleSecondary { .. } => "idle_secondary",
            Self::ActiveSecondary { .. } => "active_secondary",
            Self::Demoted => "demoted",
        }
    }

    fn illegal(self, to: &'static str) -> AvailabilityError {
        AvailabilityError::IllegalTransition {
            from: self.name(),
            to,
        }
    }

    fn same_replica(existing: Uuid, requested: Uuid) -> AvailabilityResult<()> {
        if existing == requested {
            Ok(())
        } else {
            Err(AvailabilityError::ReplicaIdMismatch(format!(
                "{} != {}",
                existing, requested
            )))
        }
    }
}

/// Availability derived from the current replica role.
#[derive(Debug, Default)]
pub struct RoleAvailability {
    role: RwLock<ReplicaRole>,
}

impl RoleAvailability {
    pub fn new(role: ReplicaRole) -> Self {
        Self {
            role: RwLock::new(role),
        }
    }

    pub fn role(&self) -> ReplicaRole {
        *self.role.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a transition; the role is unchanged if it fails.
    pub fn transition<F>(&self, step: F) -> AvailabilityResult<ReplicaRole>
    where
        F: FnOnce(ReplicaRole) -> AvailabilityResult<ReplicaRole>,
    {
        let mut role = self.role.write().unwrap_or_else(PoisonError::into_inner);
        let next = step(*role)?;
        *role = next;
        Ok(next)
    }
}

impl Availability for RoleAvailability {
    fn write_status(&self) -> AccessStatus {
        self.role().can_write().into()
    }

    fn read_status(&self) -> AccessStatus {
        self.role().can_read().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_standalone() {
        let role = ReplicaRole::default();
        assert!(role.can_write());
        assert!(role.can_read());
    }

    #[test]
    fn test_idle_secondary_serves_nothing() {
        let role = ReplicaRole::Standalone
            .become_idle_secondary(Uuid::new_v4())
            .unwrap();
        assert!(!role.can_write());
        assert!(!role.can_read());
    }

    #[test]
    fn test_active_secondary_reads_only() {
        let id = Uuid::new_v4();
        let role = ReplicaRole::Standalone
            .become_idle_secondary(id)
            .unwrap()
            .become_active_secondary(id)
            .unwrap();
        assert!(!role.can_write());
        assert!(role.can_read());
        assert_eq!(role.replica_id(), Some(id));
    }

    #[test]
    fn test_idle_secondary_cannot_be_promoted() {
        let role = ReplicaRole::IdleSecondary {
            replica_id: Uuid::new_v4(),
        };
        assert!(matches!(
            role.become_primary(),
            Err(AvailabilityError::IllegalTransition { from: "idle_secondary", .. })
        ));
    }

    #[test]
    fn test_active_secondary_can_be_promoted() {
        let role = ReplicaRole::ActiveSecondary {
            replica_id: Uuid::new_v4(),
        };
        assert_eq!(role.become_primary().unwrap(), ReplicaRole::Primary);
    }

    #[test]
    fn test_replica_id_cannot_change() {
        let role = ReplicaRole::IdleSecondary {
            replica_id: Uuid::new_v4(),
        };
        assert!(role.become_active_secondary(Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_demoted_is_final() {
        let role = ReplicaRole::Primary.demote();
        assert!(role.become_primary().is_err());
        assert!(!role.can_read());
    }

    #[test]
    fn test_role_availability_tracks_transitions() {
        let availability = RoleAvailability::new(ReplicaRole::Primary);
        assert!(availability.write_status().is_granted());

        let id = Uuid::new_v4();
        availability
            .transition(|role| role.become_active_secondary(id))
            .unwrap();
        assert_eq!(availability.write_status(), AccessStatus::Denied);
        assert!(availability.read_status().is_granted());
    }

    #[test]
    fn test_failed_transition_keeps_role() {
        let availability = RoleAvailability::new(ReplicaRole::Demoted);
        assert!(availability.transition(ReplicaRole::become_primary).is_err());
        assert_eq!(availability.role(), ReplicaRole::Demoted);
    }
}
