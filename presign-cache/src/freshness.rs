//! Freshness decisions over timestamps and durations.
//!
//! [`FreshnessPolicy`] holds configuration only; every method is a pure
//! function of its arguments, so it can be tested without a clock.

use std::time::Duration;

use tokio::time::Instant;

use presign_core::constants::DEFAULT_REFRESH_FRACTION;

/// Smallest gap kept between the proactive refresh point and expiry.
const MIN_EXPIRY_MARGIN: Duration = Duration::from_millis(1);

/// Decides when cached URLs must be refreshed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FreshnessPolicy {
    min_refetch_interval: Duration,
    refresh_fraction: f64,
}

impl FreshnessPolicy {
    /// Creates a policy. Out-of-range fractions fall back to the default.
    pub fn new(min_refetch_interval: Duration, refresh_fraction: f64) -> Self {
        let refresh_fraction = if refresh_fraction > 0.0 && refresh_fraction < 1.0 {
            refresh_fraction
        } else {
            DEFAULT_REFRESH_FRACTION
        };
        Self {
            min_refetch_interval,
            refresh_fraction,
        }
    }

    /// True iff at least `min_refetch_interval` has passed since the last
    /// successful fetch. Always true if nothing was ever fetched.
    pub fn needs_refresh(&self, last_fetch: Option<Instant>, now: Instant) -> bool {
        match last_fetch {
            Some(fetched) => now.saturating_duration_since(fetched) >= self.min_refetch_interval,
            None => true,
        }
    }

    /// Time after a fetch at which a proactive refresh should fire.
    ///
    /// Strictly less than `ttl` for any non-zero `ttl`.
    pub fn refresh_lead_time(&self, ttl: Duration) -> Duration {
        match Duration::try_from_secs_f64(ttl.as_secs_f64() * self.refresh_fraction) {
            Ok(lead) if lead < ttl => lead,
            _ => ttl.saturating_sub(MIN_EXPIRY_MARGIN),
        }
    }

    /// True while an entry resolved at `resolved_at` is inside its validity window.
    pub fn is_usable(&self, resolved_at: Instant, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(resolved_at) < ttl
    }

    /// When the background timer should fire next.
    ///
    /// A failure newer than the last success is retried after
    /// `min_refetch_interval`; otherwise the proactive refresh point of the
    /// last success applies. `None` until something was attempted, or when
    /// the refresh point lies beyond the clock's range.
    pub fn next_refresh_at(
        &self,
        last_fetch: Option<Instant>,
        last_failure: Option<Instant>,
        ttl: Duration,
    ) -> Option<Instant> {
        match (last_fetch, last_failure) {
            (Some(fetched), Some(failed)) if failed > fetched => {
                failed.checked_add(self.min_refetch_interval)
            }
            (None, Some(failed)) => failed.checked_add(self.min_refetch_interval),
            (Some(fetched), _) => fetched.checked_add(self.refresh_lead_time(ttl)),
            (None, None) => None,
        }
    }
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), DEFAULT_REFRESH_FRACTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test_case(10, false ; "ten seconds is still fresh")]
    #[test_case(59, false ; "just under the interval")]
    #[test_case(60, true ; "exactly the interval")]
    #[test_case(90, true ; "ninety seconds is stale")]
    fn test_needs_refresh(elapsed_secs: u64, expected: bool) {
        let policy = FreshnessPolicy::default();
        let fetched = Instant::now();
        let now = fetched + Duration::from_secs(elapsed_secs);
        assert_eq!(policy.needs_refresh(Some(fetched), now), expected);
    }

    #[test]
    fn test_needs_refresh_when_never_fetched() {
        assert!(FreshnessPolicy::default().needs_refresh(None, Instant::now()));
    }

    #[test]
    fn test_needs_refresh_tolerates_clock_behind_fetch() {
        let policy = FreshnessPolicy::default();
        let now = Instant::now();
        assert!(!policy.needs_refresh(Some(now + Duration::from_secs(5)), now));
    }

    #[test_case(HOUR, Duration::from_secs(3240) ; "one hour")]
    #[test_case(Duration::from_secs(10), Duration::from_secs(9) ; "ten seconds")]
    fn test_refresh_lead_time(ttl: Duration, expected: Duration) {
        let lead = FreshnessPolicy::default().refresh_lead_time(ttl);
        assert_eq!(lead, expected);
        assert!(lead < ttl);
    }

    #[test]
    fn test_lead_time_strictly_below_ttl_for_tiny_ttl() {
        let policy = FreshnessPolicy::new(Duration::from_secs(60), 0.999_999_999);
        let ttl = Duration::from_nanos(3);
        assert!(policy.refresh_lead_time(ttl) < ttl);
    }

    #[test]
    fn test_invalid_fraction_falls_back_to_default() {
        let policy = FreshnessPolicy::new(Duration::from_secs(1), 1.5);
        assert_eq!(policy.refresh_lead_time(HOUR), Duration::from_secs(3240));
    }

    #[test]
    fn test_is_usable() {
        let policy = FreshnessPolicy::default();
        let resolved = Instant::now();
        assert!(policy.is_usable(resolved, resolved + Duration::from_secs(3599), HOUR));
        assert!(!policy.is_usable(resolved, resolved + HOUR, HOUR));
    }

    #[test]
    fn test_next_refresh_after_success() {
        let policy = FreshnessPolicy::default();
        let fetched = Instant::now();
        assert_eq!(
            policy.next_refresh_at(Some(fetched), None, HOUR),
            Some(fetched + Duration::from_secs(3240))
        );
    }

    #[test]
    fn test_next_refresh_after_failure_uses_min_interval() {
        let policy = FreshnessPolicy::default();
        let fetched = Instant::now();
        let failed = fetched + Duration::from_secs(3240);
        assert_eq!(
            policy.next_refresh_at(Some(fetched), Some(failed), HOUR),
            Some(failed + Duration::from_secs(60))
        );
        assert_eq!(
            policy.next_refresh_at(None, Some(failed), HOUR),
            Some(failed + Duration::from_secs(60))
        );
    }

    #[test]
    fn test_old_failure_does_not_override_later_success() {
        let policy = FreshnessPolicy::default();
        let failed = Instant::now();
        let fetched = failed + Duration::from_secs(5);
        assert_eq!(
            policy.next_refresh_at(Some(fetched), Some(failed), HOUR),
            Some(fetched + Duration::from_secs(3240))
        );
    }

    #[test]
    fn test_unreachable_refresh_point_is_not_scheduled() {
        let policy = FreshnessPolicy::new(Duration::MAX, 0.9);
        let now = Instant::now();
        let huge_ttl = Duration::from_secs(u64::MAX);

        assert_eq!(policy.next_refresh_at(Some(now), None, huge_ttl), None);
        assert_eq!(policy.next_refresh_at(None, Some(now), HOUR), None);
        assert!(policy.refresh_lead_time(huge_ttl) < huge_ttl);
    }

    #[test]
    fn test_nothing_scheduled_before_first_attempt() {
        assert_eq!(FreshnessPolicy::default().next_refresh_at(None, None, HOUR), None);
    }
}
