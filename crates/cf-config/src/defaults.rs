//! Default values applied to optional configuration fields (§1.3, §4.4.1, §4.8).

/// Default post-success scheduling blackout, in seconds (§4.8).
pub(crate) const BLACKOUT_INTERVAL: u64 = 15;
/// Default federation cache refresh interval, in seconds (§4.4.1).
pub(crate) const REFRESH_INTERVAL_FEDERATIONS: u64 = 30;
/// Default action queue poll interval, in seconds (§4.4.1).
pub(crate) const REFRESH_INTERVAL_ACTIONS: u64 = 5;
/// Default autoscale-evaluation nudge after a successful schedule. Opt-in:
/// a pool must explicitly request the immediate nudge.
pub(crate) const EVALUATE_AUTOSCALE: bool = false;
