//! Bounded retry for optimistic ref updates.

use std::time::Duration;

use crate::config::ShadowConfig;
use crate::error::RteError;

/// How many times to try and how long to wait in between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    pub max_attempts: u32,
    /// Attempt `n` (1-based) is followed by a sleep of `n * backoff`.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Policy from the `[shadow]` config section.
    #[must_use]
    pub fn from_config(config: &ShadowConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff(),
        }
    }
}

/// Run `operation` until it succeeds, fails with something other than a ref
/// conflict, or the attempt budget is spent.
///
/// `operation` receives the 1-based attempt number.
///
/// # Errors
/// Non-conflict errors are returned as-is. A conflict on the last attempt
/// becomes [`RteError::CasExhausted`].
pub fn retry_on_conflict<T, F>(
    policy: RetryPolicy,
    ref_name: &str,
    mut operation: F,
) -> Result<T, RteError>
where
    F: FnMut(u32) -> Result<T, RteError>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if err.is_ref_conflict() && attempt < max_attempts => {
                tracing::debug!(%ref_name, attempt, error = %err, "ref moved concurrently; retrying");
                std::thread::sleep(policy.backoff * attempt);
                attempt += 1;
            }
            Err(err) if err.is_ref_conflict() => {
                tracing::warn!(%ref_name, attempts = attempt, "ref update retries exhausted");
                return Err(RteError::CasExhausted {
                    ref_name: ref_name.to_owned(),
                    attempts: attempt,
                });
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use roundtrip_git::GitError;

    use super::*;

    fn conflict() -> RteError {
        RteError::Git {
            op: "update_ref",
            target: "refs/heads/sdk-pristine".into(),
            source: GitError::RefConflict {
                ref_name: "refs/heads/sdk-pristine".into(),
                message: "moved".into(),
            },
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }

    #[test]
    fn succeeds_after_transient_conflicts() {
        let mut calls = 0;
        let value = retry_on_conflict(policy(3), "r", |attempt| {
            calls += 1;
            if attempt < 3 { Err(conflict()) } else { Ok(attempt) }
        })
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn exhaustion_reports_attempts() {
        let err = retry_on_conflict(policy(2), "refs/heads/sdk-pristine", |_| {
            Err::<(), _>(conflict())
        })
        .unwrap_err();
        assert!(matches!(err, RteError::CasExhausted { attempts: 2, .. }), "{err}");
    }

    #[test]
    fn other_errors_are_not_retried() {
        let mut calls = 0;
        let err = retry_on_conflict(policy(5), "r", |_| {
            calls += 1;
            Err::<(), _>(RteError::Cancelled)
        })
        .unwrap_err();
        assert!(matches!(err, RteError::Cancelled));
        assert_eq!(calls, 1);
    }
}
