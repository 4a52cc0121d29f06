//! In-memory leader elector for tests.
//!
//! Single-process only: leadership is not shared across process
//! boundaries, and all state is lost on exit. Useful for exercising the
//! leader lifecycle without a coordination service.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ulid::Ulid;

use super::{LeaderElector, LeadershipResult, RenewalResult};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct Lease {
    instance_id: String,
    token: String,
    expires_at: DateTime<Utc>,
}

impl Lease {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// In-memory [`LeaderElector`] holding at most one lease.
#[derive(Debug)]
pub struct InMemoryLeaderElector {
    lease: RwLock<Option<Lease>>,
    lease_duration: Duration,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::coordination("lease lock poisoned")
}

impl Default for InMemoryLeaderElector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl InMemoryLeaderElector {
    /// Creates an elector with the given lease duration.
    #[must_use]
    pub fn new(lease_duration: Duration) -> Self {
        Self {
            lease: RwLock::new(None),
            lease_duration,
        }
    }

    /// Forcibly expires the current lease, simulating a leader crash.
    ///
    /// # Errors
    ///
    /// Returns a coordination error if the lock is poisoned.
    pub fn expire_lease(&self) -> Result<()> {
        let mut lease = self.lease.write().map_err(poison_err)?;
        if let Some(ref mut lease) = *lease {
            lease.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
        Ok(())
    }

    fn expiry(&self) -> DateTime<Utc> {
        Utc::now()
            + chrono::Duration::from_std(self.lease_duration)
                .unwrap_or_else(|_| chrono::Duration::seconds(30))
    }
}

#[async_trait]
impl LeaderElector for InMemoryLeaderElector {
    async fn try_acquire(&self, instance_id: &str) -> Result<LeadershipResult> {
        let mut slot = self.lease.write().map_err(poison_err)?;
        let now = Utc::now();

        // A live lease held by someone else wins; our own live lease is
        // refreshed with a new token.
        if let Some(ref lease) = *slot {
            if lease.is_live(now) && lease.instance_id != instance_id {
                return Ok(LeadershipResult::NotLeader {
                    current_leader: Some(lease.instance_id.clone()),
                });
            }
        }

        let token = Ulid::new().to_string();
        *slot = Some(Lease {
            instance_id: instance_id.to_string(),
            token: token.clone(),
            expires_at: self.expiry(),
        });
        Ok(LeadershipResult::Acquired {
            lease_token: token,
            lease_duration: self.lease_duration,
        })
    }

    async fn renew(&self, lease_token: &str) -> Result<RenewalResult> {
        let mut slot = self.lease.write().map_err(poison_err)?;
        let now = Utc::now();

        let Some(ref mut lease) = *slot else {
            return Ok(RenewalResult::Lost);
        };
        if lease.token != lease_token {
            return Ok(RenewalResult::InvalidToken);
        }
        if !lease.is_live(now) {
            return Ok(RenewalResult::Lost);
        }

        lease.expires_at = self.expiry();
        Ok(RenewalResult::Renewed)
    }

    async fn release(&self, lease_token: &str) -> Result<bool> {
        let mut slot = self.lease.write().map_err(poison_err)?;
        match *slot {
            Some(ref lease) if lease.token == lease_token => {
                *slot = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn current_leader(&self) -> Result<Option<String>> {
        let slot = self.lease.read().map_err(poison_err)?;
        let now = Utc::now();
        Ok(slot
            .as_ref()
            .filter(|lease| lease.is_live(now))
            .map(|lease| lease.instance_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquires_when_no_leader() -> Result<()> {
        let elector = InMemoryLeaderElector::new(Duration::from_secs(30));
        let result = elector.try_acquire("replica-1").await?;
        assert!(result.is_leader());
        assert!(result.lease_token().is_some());
        Ok(())
    }

    #[tokio::test]
    async fn second_replica_is_refused() -> Result<()> {
        let elector = InMemoryLeaderElector::new(Duration::from_secs(30));
        elector.try_acquire("replica-1").await?;

        let result = elector.try_acquire("replica-2").await?;
        assert_eq!(
            result,
            LeadershipResult::NotLeader {
                current_leader: Some("replica-1".to_string())
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn renew_extends_a_live_lease() -> Result<()> {
        let elector = InMemoryLeaderElector::new(Duration::from_secs(30));
        let token = elector
            .try_acquire("replica-1")
            .await?
            .lease_token()
            .unwrap()
            .to_string();

        assert!(elector.renew(&token).await?.is_renewed());
        assert!(elector.renew(&token).await?.is_renewed());
        Ok(())
    }

    #[tokio::test]
    async fn renew_rejects_wrong_or_missing_lease() -> Result<()> {
        let elector = InMemoryLeaderElector::new(Duration::from_secs(30));
        assert_eq!(elector.renew("no-such-token").await?, RenewalResult::Lost);

        elector.try_acquire("replica-1").await?;
        assert_eq!(
            elector.renew("wrong-token").await?,
            RenewalResult::InvalidToken
        );
        Ok(())
    }

    #[tokio::test]
    async fn expired_lease_is_lost_and_can_be_taken() -> Result<()> {
        let elector = InMemoryLeaderElector::new(Duration::from_secs(30));
        let token = elector
            .try_acquire("replica-1")
            .await?
            .lease_token()
            .unwrap()
            .to_string();

        elector.expire_lease()?;
        assert_eq!(elector.renew(&token).await?, RenewalResult::Lost);
        assert_eq!(elector.current_leader().await?, None);

        let takeover = elector.try_acquire("replica-2").await?;
        assert!(takeover.is_leader());
        assert_eq!(
            elector.current_leader().await?,
            Some("replica-2".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn release_requires_the_matching_token() -> Result<()> {
        let elector = InMemoryLeaderElector::new(Duration::from_secs(30));
        let token = elector
            .try_acquire("replica-1")
            .await?
            .lease_token()
            .unwrap()
            .to_string();

        assert!(!elector.release("wrong-token").await?);
        assert_eq!(
            elector.current_leader().await?,
            Some("replica-1".to_string())
        );

        assert!(elector.release(&token).await?);
        assert_eq!(elector.current_leader().await?, None);
        Ok(())
    }
}
