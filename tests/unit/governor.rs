//! Rate governor decisions

use crate::support::test_config;
use chrono::Utc;
use slicehound::auth::{CredentialPool, CredentialState, QuotaSnapshot};
use slicehound::engine::{EngineConfig, PostResponseDecision, PreRequestDecision, RateGovernor};
use slicehound::fetcher::RequestResult;
use std::time::Duration;

fn single_pool(config: &EngineConfig) -> CredentialPool {
    CredentialPool::new(vec!["ghp_governortoken0001".to_string()], config).unwrap()
}

#[test]
fn test_low_quota_rotates() {
    let config = test_config();
    let governor = RateGovernor::new(&config);
    let mut pool = single_pool(&config);
    let id = pool.ids().next().unwrap();

    pool.credential_mut(id).observe(&QuotaSnapshot {
        remaining: Some(1),
        limit: Some(30),
        reset_at: Some(Utc::now() + chrono::Duration::seconds(30)),
    });
    assert_eq!(config.low_quota_threshold, 2);
    assert_eq!(governor.before_request(pool.credential(id)), PreRequestDecision::Rotate);

    pool.credential_mut(id).observe(&QuotaSnapshot {
        remaining: Some(2),
        ..QuotaSnapshot::default()
    });
    assert_eq!(governor.before_request(pool.credential(id)), PreRequestDecision::Proceed);
}

#[test]
fn test_backoff_grows_until_success() {
    let config = EngineConfig {
        jitter_ratio: 0.0,
        ..test_config()
    };
    let mut governor = RateGovernor::new(&config);
    let mut pool = single_pool(&config);
    let id = pool.ids().next().unwrap();

    let limited = RequestResult::error(429, "Too Many Requests");
    let mut waits = Vec::new();
    for _ in 0..4 {
        match governor.after_response(pool.credential_mut(id), &limited) {
            PostResponseDecision::Backoff(wait) => waits.push(wait),
            other => panic!("expected backoff, got {other:?}"),
        }
    }
    assert!(waits.windows(2).all(|pair| pair[0] < pair[1]), "{waits:?}");
    assert_eq!(waits[0], config.base_backoff());

    governor.after_response(pool.credential_mut(id), &RequestResult::page(vec![], 0));
    assert_eq!(pool.credential(id).penalties(), 0);
    match governor.after_response(pool.credential_mut(id), &limited) {
        PostResponseDecision::Backoff(wait) => assert_eq!(wait, config.base_backoff()),
        other => panic!("expected backoff, got {other:?}"),
    }
}

#[test]
fn test_backoff_never_exceeds_cap() {
    let config = test_config();
    let mut governor = RateGovernor::new(&config);
    for penalties in [1, 5, 10, 32, 1000, u32::MAX] {
        assert!(governor.penalty_backoff(penalties) <= config.max_backoff());
    }
}

#[test]
fn test_seeded_jitter_is_reproducible() {
    let config = test_config();
    let mut a = RateGovernor::new(&config);
    let mut b = RateGovernor::new(&config);
    let first: Vec<Duration> = (1..6).map(|n| a.penalty_backoff(n)).collect();
    let second: Vec<Duration> = (1..6).map(|n| b.penalty_backoff(n)).collect();
    assert_eq!(first, second);
}

#[test]
fn test_retry_after_overrides_schedule() {
    let config = test_config();
    let mut governor = RateGovernor::new(&config);
    let mut pool = single_pool(&config);
    let id = pool.ids().next().unwrap();

    let mut limited = RequestResult::error(429, "Too Many Requests");
    limited.retry_after = Some(Duration::from_secs(5));
    assert_eq!(
        governor.after_response(pool.credential_mut(id), &limited),
        PostResponseDecision::Backoff(Duration::from_secs(5))
    );
    assert_eq!(pool.credential(id).state(), CredentialState::RateLimited);
}

#[test]
fn test_abuse_detection_rotates_after_cooldown() {
    let config = test_config();
    let mut governor = RateGovernor::new(&config);
    let mut pool = single_pool(&config);
    let id = pool.ids().next().unwrap();

    let abuse = RequestResult::error(403, "You have triggered an abuse detection mechanism.");
    assert_eq!(
        governor.after_response(pool.credential_mut(id), &abuse),
        PostResponseDecision::RotateAndBackoff(config.abuse_cooldown())
    );
    assert!(matches!(
        governor.before_request(pool.credential(id)),
        PreRequestDecision::Wait(_)
    ));
}

#[test]
fn test_server_error_is_not_a_penalty() {
    let config = test_config();
    let mut governor = RateGovernor::new(&config);
    let mut pool = single_pool(&config);
    let id = pool.ids().next().unwrap();

    assert_eq!(
        governor.after_response(pool.credential_mut(id), &RequestResult::error(502, "")),
        PostResponseDecision::Proceed
    );
    assert_eq!(pool.credential(id).penalties(), 0);
    assert!(pool.credential(id).is_active());
}
