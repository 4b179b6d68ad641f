//! Failed-PIN attempt limiter using Moka.
//!
//! Counters are keyed by wallet owner and evicted `lockout` after the last
//! failure, so old mistakes are forgotten once the window passes.

use std::time::{Duration, Instant};

use campuspay_shared::types::UserId;
use moka::sync::Cache;

use crate::error::{WalletError, WalletResult};
use crate::pin::verify_pin;

/// Default maximum number of tracked owners.
const DEFAULT_CAPACITY: u64 = 100_000;

#[derive(Debug, Clone, Copy)]
struct AttemptState {
    failures: u32,
    last_failure: Instant,
}

/// Keyed failure counter with TTL eviction.
#[derive(Clone)]
pub struct AttemptLimiter {
    cache: Cache<UserId, AttemptState>,
    max_attempts: u32,
    lockout: Duration,
}

impl std::fmt::Debug for AttemptLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptLimiter")
            .field("max_attempts", &self.max_attempts)
            .field("lockout", &self.lockout)
            .finish_non_exhaustive()
    }
}

impl AttemptLimiter {
    /// Creates a limiter that locks an owner out for `lockout` after
    /// `max_attempts` consecutive failures.
    #[must_use]
    pub fn new(max_attempts: u32, lockout: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(DEFAULT_CAPACITY)
            .time_to_live(lockout)
            .build();
        Self {
            cache,
            max_attempts: max_attempts.max(1),
            lockout,
        }
    }

    /// Fails with `PinLocked` while the owner is locked out.
    pub fn check(&self, owner: UserId) -> WalletResult<()> {
        let Some(state) = self.cache.get(&owner) else {
            return Ok(());
        };
        if state.failures < self.max_attempts {
            return Ok(());
        }
        let remaining = self.lockout.saturating_sub(state.last_failure.elapsed());
        if remaining.is_zero() {
            self.cache.invalidate(&owner);
            return Ok(());
        }
        Err(WalletError::PinLocked {
            retry_after_secs: remaining.as_secs().max(1),
        })
    }

    /// Records a failure and returns the new consecutive count.
    pub fn record_failure(&self, owner: UserId) -> u32 {
        self.cache
            .entry(owner)
            .and_upsert_with(|existing| {
                let failures = existing.map_or(0, |e| e.into_value().failures);
                AttemptState {
                    failures: failures.saturating_add(1),
                    last_failure: Instant::now(),
                }
            })
            .into_value()
            .failures
    }

    /// Clears the owner's counter.
    pub fn reset(&self, owner: UserId) {
        self.cache.invalidate(&owner);
    }

    /// Verifies `pin` against `hash` under the attempt limit.
    ///
    /// Returns `InvalidCredential` on mismatch, or `PinLocked` once the
    /// mismatch exhausts the allowed attempts. A match resets the counter.
    pub fn verify(&self, owner: UserId, pin: &str, hash: &str) -> WalletResult<()> {
        self.check(owner)?;
        if verify_pin(pin, hash)? {
            self.reset(owner);
            return Ok(());
        }
        if self.record_failure(owner) >= self.max_attempts {
            return Err(WalletError::PinLocked {
                retry_after_secs: self.lockout.as_secs().max(1),
            });
        }
        Err(WalletError::InvalidCredential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pin::hash_pin;

    #[test]
    fn test_locks_after_max_attempts() {
        let limiter = AttemptLimiter::new(3, Duration::from_secs(900));
        let owner = UserId::new();
        let hash = hash_pin("1234").unwrap();

        assert_eq!(limiter.verify(owner, "0000", &hash), Err(WalletError::InvalidCredential));
        assert_eq!(limiter.verify(owner, "0000", &hash), Err(WalletError::InvalidCredential));
        assert!(matches!(
            limiter.verify(owner, "0000", &hash),
            Err(WalletError::PinLocked { .. })
        ));
        // even the right PIN is refused while locked
        assert!(matches!(
            limiter.verify(owner, "1234", &hash),
            Err(WalletError::PinLocked { retry_after_secs }) if retry_after_secs > 0
        ));
    }

    #[test]
    fn test_success_resets_counter() {
        let limiter = AttemptLimiter::new(3, Duration::from_secs(900));
        let owner = UserId::new();
        let hash = hash_pin("1234").unwrap();

        assert!(limiter.verify(owner, "9999", &hash).is_err());
        assert!(limiter.verify(owner, "9999", &hash).is_err());
        assert!(limiter.verify(owner, "1234", &hash).is_ok());
        assert_eq!(limiter.verify(owner, "9999", &hash), Err(WalletError::InvalidCredential));
    }

    #[test]
    fn test_owners_are_independent() {
        let limiter = AttemptLimiter::new(1, Duration::from_secs(900));
        let a = UserId::new();
        let b = UserId::new();
        limiter.record_failure(a);
        assert!(limiter.check(a).is_err());
        assert!(limiter.check(b).is_ok());
    }

    #[test]
    fn test_lockout_elapses() {
        let limiter = AttemptLimiter::new(1, Duration::from_millis(30));
        let owner = UserId::new();
        limiter.record_failure(owner);
        assert!(limiter.check(owner).is_err());
        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.check(owner).is_ok());
    }
}
