use std::time::{Duration, Instant};

use crate::session::Status;

/// How long a session keeps reading as active after its content stops
/// changing. AI agents emit output in bursts with micro-pauses between
/// them; the cooldown must outlast those pauses. 2–3 s works, 2 s is
/// the default.
pub const ACTIVITY_COOLDOWN: Duration = Duration::from_secs(2);

/// Backdate applied when rehydrating a persisted session so the
/// cooldown is already expired on the first poll.
const REHYDRATE_BACKDATE: Duration = Duration::from_secs(10);

/// Per-session state-machine record.
///
/// The hash+cooldown pair is an event debouncer: a hash change is the
/// "recently active" event, the cooldown is the debounce window, and
/// `stabilized` gates the very first transition into active so a session
/// that is still warming up never flashes green on input echoes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracker {
    /// Hash of the last normalized capture; empty when seeded by
    /// persistence before any content was seen.
    pub last_hash: String,
    /// Monotonic time of the last hash change.
    pub last_change: Instant,
    /// The user has observed this session since it last changed.
    pub acknowledged: bool,
    /// The session has been seen idle at least once since creation.
    pub stabilized: bool,
}

impl Tracker {
    /// Initialize from the first observed hash. The change time is
    /// backdated by the cooldown so a brand-new session does not read
    /// as active for its first two seconds.
    pub fn init(hash: &str, now: Instant) -> Self {
        Self {
            last_hash: hash.to_string(),
            last_change: now - ACTIVITY_COOLDOWN,
            acknowledged: false,
            stabilized: false,
        }
    }

    /// Allocate a tracker for an acknowledgement that arrives before the
    /// first poll. Equivalent to [`Tracker::init`] with no content seen.
    pub fn empty(now: Instant) -> Self {
        Self::init("", now)
    }

    /// Seed a tracker from a persisted status. `acknowledged` restores
    /// idle (gray) vs waiting (yellow); the empty hash defers content
    /// baselining to the first poll, which then cannot report active.
    pub fn rehydrated(acknowledged: bool, now: Instant) -> Self {
        Self {
            last_hash: String::new(),
            last_change: now - REHYDRATE_BACKDATE,
            acknowledged,
            stabilized: true,
        }
    }

    /// Feed one freshly captured, normalized hash through the machine.
    pub fn observe(&mut self, hash: &str, now: Instant) -> Status {
        // Seeded by persistence but never saw content: baseline without
        // reporting a change.
        if self.last_hash.is_empty() {
            self.last_hash = hash.to_string();
            return if self.acknowledged { Status::Idle } else { Status::Waiting };
        }

        if self.last_hash != hash {
            self.last_hash = hash.to_string();
            self.last_change = now;
            self.acknowledged = false;
            return if self.stabilized {
                tracing::debug!(hash = &hash[..hash.len().min(16)], "content changed -> active");
                Status::Active
            } else {
                // Still initializing; output is the session warming up.
                Status::Waiting
            };
        }

        if now.duration_since(self.last_change) < ACTIVITY_COOLDOWN {
            return if self.stabilized { Status::Active } else { Status::Waiting };
        }

        // Content has been stable for a full cooldown.
        if !self.stabilized {
            self.stabilized = true;
            tracing::debug!("stabilized");
        }
        if self.acknowledged {
            Status::Idle
        } else {
            Status::Waiting
        }
    }

    /// User observed the session (attach).
    pub fn acknowledge(&mut self) -> Status {
        self.acknowledged = true;
        Status::Idle
    }

    /// Baseline the given hash and acknowledge in one step (detach):
    /// the user has just seen exactly this content, so the next poll
    /// must not report it as a change.
    pub fn acknowledge_with_snapshot(&mut self, hash: &str) -> Status {
        self.last_hash = hash.to_string();
        self.acknowledged = true;
        Status::Idle
    }

    /// External signal (hook event) that the agent wants attention.
    pub fn reset_acknowledged(&mut self) -> Status {
        self.acknowledged = false;
        Status::Waiting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H1: &str = "hash-one";
    const H2: &str = "hash-two";
    const H3: &str = "hash-three";

    fn past_cooldown(t: Instant) -> Instant {
        t + ACTIVITY_COOLDOWN + Duration::from_millis(500)
    }

    #[test]
    fn first_poll_is_waiting_never_active() {
        let now = Instant::now();
        let mut tracker = Tracker::init(H1, now);
        // The very first observation after init sees the same hash and
        // an already-expired cooldown.
        assert_eq!(tracker.observe(H1, now), Status::Waiting);
    }

    #[test]
    fn change_before_stabilization_stays_waiting() {
        let now = Instant::now();
        let mut tracker = Tracker::init(H1, now);
        // Output keeps arriving while the session warms up.
        assert_eq!(tracker.observe(H2, now + Duration::from_millis(500)), Status::Waiting);
        assert_eq!(tracker.observe(H3, now + Duration::from_millis(900)), Status::Waiting);
        assert!(!tracker.stabilized);
    }

    #[test]
    fn stabilizes_after_quiet_cooldown() {
        let now = Instant::now();
        let mut tracker = Tracker::init(H1, now);
        assert_eq!(tracker.observe(H1, past_cooldown(now)), Status::Waiting);
        assert!(tracker.stabilized);
    }

    #[test]
    fn change_after_stabilization_is_active() {
        let now = Instant::now();
        let mut tracker = Tracker::init(H1, now);
        tracker.observe(H1, past_cooldown(now));
        let t = past_cooldown(now) + Duration::from_secs(1);
        assert_eq!(tracker.observe(H2, t), Status::Active);
        assert!(!tracker.acknowledged);
    }

    #[test]
    fn active_holds_through_cooldown_with_unchanged_content() {
        let now = Instant::now();
        let mut tracker = Tracker::init(H1, now);
        tracker.observe(H1, past_cooldown(now));
        let change = past_cooldown(now) + Duration::from_secs(1);
        tracker.observe(H2, change);
        // Micro-pause: content unchanged but cooldown not yet expired.
        assert_eq!(tracker.observe(H2, change + Duration::from_millis(500)), Status::Active);
        assert_eq!(tracker.observe(H2, change + Duration::from_millis(1900)), Status::Active);
        // Cooldown expires.
        assert_eq!(tracker.observe(H2, past_cooldown(change)), Status::Waiting);
    }

    #[test]
    fn repeated_stable_polls_waiting_until_acknowledged() {
        let now = Instant::now();
        let mut tracker = Tracker::init(H1, now);
        let mut t = past_cooldown(now);
        for _ in 0..5 {
            assert_eq!(tracker.observe(H1, t), Status::Waiting);
            t += Duration::from_millis(500);
        }
        tracker.acknowledge();
        assert_eq!(tracker.observe(H1, t), Status::Idle);
        assert_eq!(tracker.observe(H1, t + Duration::from_millis(500)), Status::Idle);
    }

    #[test]
    fn acknowledge_emits_idle() {
        let now = Instant::now();
        let mut tracker = Tracker::init(H1, now);
        assert_eq!(tracker.acknowledge(), Status::Idle);
        assert!(tracker.acknowledged);
    }

    #[test]
    fn change_clears_acknowledged() {
        let now = Instant::now();
        let mut tracker = Tracker::init(H1, now);
        tracker.observe(H1, past_cooldown(now));
        tracker.acknowledge();
        let t = past_cooldown(now) + Duration::from_secs(1);
        assert_eq!(tracker.observe(H2, t), Status::Active);
        assert!(!tracker.acknowledged);
        // Once quiet again, back to waiting (not idle).
        assert_eq!(tracker.observe(H2, past_cooldown(t)), Status::Waiting);
    }

    #[test]
    fn snapshot_ack_prevents_spurious_active() {
        let now = Instant::now();
        let mut tracker = Tracker::init(H1, now);
        tracker.observe(H1, past_cooldown(now));
        let t = past_cooldown(now) + Duration::from_secs(1);
        tracker.observe(H2, t);
        // User detaches while the pane shows H3 content.
        assert_eq!(tracker.acknowledge_with_snapshot(H3), Status::Idle);
        // Next poll sees the same content the user just saw.
        let after = past_cooldown(t);
        assert_eq!(tracker.observe(H3, after), Status::Idle);
    }

    #[test]
    fn reset_acknowledged_emits_waiting() {
        let now = Instant::now();
        let mut tracker = Tracker::init(H1, now);
        tracker.observe(H1, past_cooldown(now));
        tracker.acknowledge();
        assert_eq!(tracker.reset_acknowledged(), Status::Waiting);
        assert_eq!(tracker.observe(H1, past_cooldown(now) + Duration::from_secs(5)), Status::Waiting);
    }

    #[test]
    fn reset_ack_during_cooldown_does_not_override_active() {
        let now = Instant::now();
        let mut tracker = Tracker::init(H1, now);
        tracker.observe(H1, past_cooldown(now));
        let change = past_cooldown(now) + Duration::from_secs(1);
        tracker.observe(H2, change);
        tracker.reset_acknowledged();
        // Cooldown still governs: content unchanged, window open.
        assert_eq!(tracker.observe(H2, change + Duration::from_millis(800)), Status::Active);
        // After the window, waiting (not idle — ack was reset).
        assert_eq!(tracker.observe(H2, past_cooldown(change)), Status::Waiting);
    }

    #[test]
    fn rehydrated_idle_baselines_without_flash() {
        let now = Instant::now();
        let mut tracker = Tracker::rehydrated(true, now);
        assert_eq!(tracker.last_hash, "");
        // First poll after restart: pane content differs from whatever
        // was on screen before — still no active flash.
        assert_eq!(tracker.observe(H1, now), Status::Idle);
        assert_eq!(tracker.last_hash, H1);
    }

    #[test]
    fn rehydrated_waiting_baselines_without_flash() {
        let now = Instant::now();
        let mut tracker = Tracker::rehydrated(false, now);
        assert_eq!(tracker.observe(H1, now), Status::Waiting);
        // A real change on the next poll does report active: the
        // session was already stabilized before the restart.
        assert_eq!(tracker.observe(H2, now + Duration::from_millis(500)), Status::Active);
    }

    #[test]
    fn empty_tracker_supports_ack_before_first_poll() {
        let now = Instant::now();
        let mut tracker = Tracker::empty(now);
        assert_eq!(tracker.acknowledge(), Status::Idle);
        // First poll then baselines and keeps idle.
        assert_eq!(tracker.observe(H1, now + Duration::from_millis(500)), Status::Idle);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// A brand-new tracker never reports active on its first
            /// observation, whatever the first hash or elapsed time.
            #[test]
            fn no_active_flash_on_first_observation(
                first in "[a-f0-9]{8}",
                second in "[a-f0-9]{8}",
                millis in 0u64..10_000,
            ) {
                let now = Instant::now();
                let mut tracker = Tracker::init(&first, now);
                let status = tracker.observe(&second, now + Duration::from_millis(millis));
                prop_assert_ne!(status, Status::Active);
            }

            /// Once stabilized, any sequence of identical hashes past the
            /// cooldown settles on waiting/idle and stays there.
            #[test]
            fn stable_content_settles(
                hash in "[a-f0-9]{8}",
                polls in 2usize..12,
                acked in proptest::bool::ANY,
            ) {
                let now = Instant::now();
                let mut tracker = Tracker::init(&hash, now);
                if acked {
                    tracker.acknowledge();
                }
                let expected = if acked { Status::Idle } else { Status::Waiting };
                let mut t = now + ACTIVITY_COOLDOWN + Duration::from_millis(100);
                for _ in 0..polls {
                    prop_assert_eq!(tracker.observe(&hash, t), expected);
                    t += Duration::from_millis(500);
                }
            }
        }
    }
}
