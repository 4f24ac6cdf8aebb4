//! Pure pricing/renewal policy: plan-tier tables and the channel-transition
//! rule that decides whether a renewal stacks onto remaining paid time or
//! starts a fresh period.

use chrono::{DateTime, Duration, Utc};

pub const GB: i64 = 1 << 30;
pub const TB: i64 = 1 << 40;

/// Channels whose periods never stack: store subscriptions manage their own
/// renewal dates, and free time (trial/gift) must not be added to paid time.
const NON_STACKING_CHANNELS: &[&str] = &["apple", "google", "trial", "gift"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalPolicy {
    /// New period starts now.
    Fresh,
    /// New days are added on top of the remaining period.
    Stack,
}

/// Decide how a renewal's expiry is computed.
///
/// Stacking applies only to a continuation on the same paid channel
/// (stripe -> stripe). Everything else (store channels, any free channel,
/// cross-channel upgrades) starts fresh so free time never leaks into paid
/// periods.
pub fn renewal_policy(existing_channel: &str, requested_channel: &str) -> RenewalPolicy {
    if existing_channel == requested_channel
        && !requested_channel.is_empty()
        && !NON_STACKING_CHANNELS.contains(&requested_channel)
    {
        RenewalPolicy::Stack
    } else {
        RenewalPolicy::Fresh
    }
}

/// Period length in days for a provision on the given channel. Store
/// subscriptions are always 30-day periods; other channels honor the
/// requested length.
pub fn expire_days(channel: &str, requested_days: i64) -> i64 {
    match channel {
        "apple" | "google" => 30,
        _ if requested_days > 0 => requested_days,
        _ => 30,
    }
}

/// Compute the new expiry for a renewal given the policy and the live expiry
/// reported by the VPN manager. A stacked renewal only extends time that is
/// still in the future.
pub fn renewal_expire_at(
    policy: RenewalPolicy,
    current_expire: Option<DateTime<Utc>>,
    days: i64,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let base = match (policy, current_expire) {
        (RenewalPolicy::Stack, Some(current)) if current > now => current,
        _ => now,
    };
    base + Duration::days(days)
}

/// VPN traffic allowance in bytes by plan tier, unless explicitly overridden.
pub fn vpn_traffic_limit(plan_tier: &str, override_bytes: i64) -> i64 {
    if override_bytes > 0 {
        return override_bytes;
    }

    match plan_tier {
        "unlimited" => 10_000 * GB,
        "premium" => 500 * GB,
        "standard" => 200 * GB,
        "basic" => 50 * GB,
        _ => 100 * GB,
    }
}

/// Hosting node traffic allowance in bytes by plan tier.
pub fn hosting_traffic_limit(plan_tier: &str) -> i64 {
    match plan_tier {
        "premium" | "3tb" => 3 * TB,
        "standard" | "2tb" => 2 * TB,
        "basic" | "1tb" => TB,
        _ => TB,
    }
}

/// VPS bundle for a plan tier.
pub fn bundle_id(plan_tier: &str) -> &'static str {
    match plan_tier {
        "premium" | "3tb" => "small_3_0",
        "standard" | "2tb" => "micro_3_0",
        "basic" | "1tb" => "nano_3_0",
        _ => "nano_3_0",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAID: &[&str] = &["stripe", "paypal", "credit"];
    const NON_STACKING: &[&str] = &["apple", "google", "trial", "gift"];

    #[test]
    fn test_same_paid_channel_stacks() {
        for channel in PAID {
            assert_eq!(
                renewal_policy(channel, channel),
                RenewalPolicy::Stack,
                "{channel} -> {channel} should stack"
            );
        }
    }

    #[test]
    fn test_non_stacking_channels_never_stack() {
        for channel in NON_STACKING {
            assert_eq!(
                renewal_policy(channel, channel),
                RenewalPolicy::Fresh,
                "{channel} -> {channel} must not stack"
            );
        }
    }

    #[test]
    fn test_free_to_paid_upgrade_is_fresh() {
        for free in ["trial", "gift"] {
            for paid in PAID {
                assert_eq!(
                    renewal_policy(free, paid),
                    RenewalPolicy::Fresh,
                    "{free} -> {paid} must not carry free time into paid"
                );
            }
        }
    }

    #[test]
    fn test_cross_paid_channel_is_fresh() {
        assert_eq!(renewal_policy("stripe", "paypal"), RenewalPolicy::Fresh);
        assert_eq!(renewal_policy("paypal", "stripe"), RenewalPolicy::Fresh);
        assert_eq!(renewal_policy("stripe", "apple"), RenewalPolicy::Fresh);
    }

    #[test]
    fn test_empty_channels_are_fresh() {
        assert_eq!(renewal_policy("", ""), RenewalPolicy::Fresh);
        assert_eq!(renewal_policy("stripe", ""), RenewalPolicy::Fresh);
    }

    #[test]
    fn test_expire_days() {
        assert_eq!(expire_days("apple", 365), 30);
        assert_eq!(expire_days("google", 0), 30);
        assert_eq!(expire_days("stripe", 90), 90);
        assert_eq!(expire_days("stripe", 0), 30);
        assert_eq!(expire_days("", -1), 30);
    }

    #[test]
    fn test_stacked_renewal_extends_remaining_time() {
        let now = Utc::now();
        let current = now + Duration::days(10);
        let result = renewal_expire_at(RenewalPolicy::Stack, Some(current), 30, now);
        assert_eq!(result, current + Duration::days(30));
    }

    #[test]
    fn test_stacked_renewal_on_lapsed_period_starts_now() {
        let now = Utc::now();
        let lapsed = now - Duration::days(3);
        let result = renewal_expire_at(RenewalPolicy::Stack, Some(lapsed), 30, now);
        assert_eq!(result, now + Duration::days(30));
    }

    #[test]
    fn test_fresh_renewal_ignores_remaining_time() {
        let now = Utc::now();
        let current = now + Duration::days(300);
        let result = renewal_expire_at(RenewalPolicy::Fresh, Some(current), 30, now);
        assert_eq!(result, now + Duration::days(30));
    }

    #[test]
    fn test_stack_without_live_expiry_starts_now() {
        let now = Utc::now();
        let result = renewal_expire_at(RenewalPolicy::Stack, None, 7, now);
        assert_eq!(result, now + Duration::days(7));
    }

    #[test]
    fn test_vpn_traffic_table() {
        assert_eq!(vpn_traffic_limit("unlimited", 0), 10_000 * GB);
        assert_eq!(vpn_traffic_limit("premium", 0), 500 * GB);
        assert_eq!(vpn_traffic_limit("standard", 0), 200 * GB);
        assert_eq!(vpn_traffic_limit("basic", 0), 50 * GB);
        assert_eq!(vpn_traffic_limit("anything-else", 0), 100 * GB);
        // explicit override wins over the table
        assert_eq!(vpn_traffic_limit("premium", 42), 42);
    }

    #[test]
    fn test_hosting_traffic_table() {
        assert_eq!(hosting_traffic_limit("premium"), 3 * TB);
        assert_eq!(hosting_traffic_limit("3tb"), 3 * TB);
        assert_eq!(hosting_traffic_limit("standard"), 2 * TB);
        assert_eq!(hosting_traffic_limit("2tb"), 2 * TB);
        assert_eq!(hosting_traffic_limit("basic"), TB);
        assert_eq!(hosting_traffic_limit("1tb"), TB);
        assert_eq!(hosting_traffic_limit(""), TB);
    }

    #[test]
    fn test_bundle_table() {
        assert_eq!(bundle_id("premium"), "small_3_0");
        assert_eq!(bundle_id("3tb"), "small_3_0");
        assert_eq!(bundle_id("standard"), "micro_3_0");
        assert_eq!(bundle_id("2tb"), "micro_3_0");
        assert_eq!(bundle_id("basic"), "nano_3_0");
        assert_eq!(bundle_id("unknown"), "nano_3_0");
    }
}
