//! Literal scenario: seeding 1500 one-second-apart samples for a single
//! (device, node) key leaves exactly the most recent 1000 in the store,
//! and an unbounded read returns them newest-last.

use chrono::{Duration, Utc};
use meshsentinel_common::SignalSample;
use meshsentinel_signal::SignalStore;

#[test]
fn store_keeps_exactly_the_most_recent_thousand_samples() {
    let store = SignalStore::new(7);
    let now = Utc::now();
    for i in 0..1500i64 {
        store.append(SignalSample {
            timestamp: now + Duration::seconds(i),
            device_addr: "devD".to_string(),
            node_addr: "nodeN".to_string(),
            rssi: -50,
            channel: None,
            width_mhz: None,
            rate_mbps: None,
        });
    }

    let retained = store.recent("devD", usize::MAX);
    assert_eq!(retained.len(), 1000);
    assert!(retained.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    // The oldest 500 seconds' worth should have been evicted.
    assert_eq!(retained[0].timestamp, now + Duration::seconds(500));
}
