//! Unified retry policies for consistent backoff behavior across the client.
//!
//! Ad-hoc sleeps invite thundering herds; every retry in this crate goes
//! through one of these named `backon` policies, all of which include
//! jitter.
//!
//! | Policy | Min Delay | Max Delay | Retries | Use Case |
//! |--------|-----------|-----------|---------|----------|
//! | `metadata_policy` | 100ms | 5s | budget | metadata refresh, seed rotation |
//! | `coordinator_policy` | 100ms | 10s | budget | coordinator lookup, offset RPCs |
//! | `join_policy` | 250ms | 10s | budget | group join/sync sequences |

use std::time::Duration;

use backon::ExponentialBuilder;

/// Policy for metadata requests against seed or cached brokers.
///
/// Short initial delay: a metadata miss is usually a single broker being
/// down, and another seed will answer immediately.
pub fn metadata_policy(budget: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(budget)
        .with_jitter()
}

/// Policy for group-coordinator discovery and coordinator-routed RPCs.
///
/// Longer max delay than metadata: coordinator moves happen during
/// controlled shutdowns and take seconds to settle.
pub fn coordinator_policy(budget: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(10))
        .with_max_times(budget)
        .with_jitter()
}

/// Policy for the join/sync sequence.
///
/// The coordinator holds JoinGroup responses until the rebalance barrier
/// clears, so failures here back off harder before retrying.
pub fn join_policy(budget: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(250))
        .with_max_delay(Duration::from_secs(10))
        .with_max_times(budget)
        .with_jitter()
}
