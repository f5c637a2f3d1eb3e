//! Literal scenario: threshold=3, window=60s. Three failures open the
//! breaker; a fourth call within the window is rejected without reaching
//! the transport. After the cooldown elapses, a single trial call is let
//! through and success closes the breaker again.

use std::time::Duration;

use meshsentinel_common::MeshError;
use meshsentinel_deviceshell::CircuitBreaker;

#[test]
fn three_failures_open_the_breaker_and_cooldown_recovers_it() {
    let breaker = CircuitBreaker::new(3, Duration::from_secs(60), Duration::from_millis(30));

    for _ in 0..3 {
        assert!(breaker.allow().is_ok());
        breaker.on_failure();
    }

    match breaker.allow() {
        Err(MeshError::CircuitOpen { .. }) => {}
        other => panic!("expected CircuitOpen, got {other:?}"),
    }

    std::thread::sleep(Duration::from_millis(40));
    assert!(breaker.allow().is_ok(), "single half-open trial should be let through");
    breaker.on_success();
    assert!(!breaker.is_open());
    assert!(breaker.allow().is_ok());
}
