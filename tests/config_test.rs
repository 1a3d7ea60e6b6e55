//! Tests for configuration validation and loading

use dispatch_lot::builders::build_fan_out;
use dispatch_lot::config::{DispatchConfig, FailurePolicy, FanOutConfig, WorkerPoolConfig, DEFAULT_STACK_SIZE};
use dispatch_lot::core::DispatchError;

#[test]
fn test_pool_config_defaults_to_host_parallelism() {
    let cfg = WorkerPoolConfig::new();
    assert_eq!(cfg.worker_count, num_cpus::get().max(1));
    assert_eq!(cfg.queue_capacity, 0);
    assert_eq!(cfg.thread_stack_size, DEFAULT_STACK_SIZE);
    assert_eq!(cfg.failure_policy, FailurePolicy::Isolate);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_pool_config_invalid_worker_count() {
    let invalid = WorkerPoolConfig::new().with_worker_count(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_invalid_stack_size() {
    let invalid = WorkerPoolConfig::new().with_thread_stack_size(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_fan_out_config_invalid_permits() {
    let invalid = FanOutConfig::default().with_permits(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_dispatch_config_from_json() {
    let json = r#"{
        "pool": {
            "worker_count": 4,
            "queue_capacity": 4,
            "failure_policy": "fatal"
        },
        "fan_out": {
            "permits": 2
        }
    }"#;

    let cfg = DispatchConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.pool.worker_count, 4);
    assert_eq!(cfg.pool.queue_capacity, 4);
    assert_eq!(cfg.pool.thread_stack_size, DEFAULT_STACK_SIZE);
    assert_eq!(cfg.pool.failure_policy, FailurePolicy::Fatal);
    assert_eq!(cfg.fan_out.permits, 2);
}

#[test]
fn test_dispatch_config_from_empty_json_uses_defaults() {
    let cfg = DispatchConfig::from_json_str("{}").unwrap();
    assert_eq!(cfg, DispatchConfig::default());
}

#[test]
fn test_dispatch_config_rejects_invalid_section() {
    let err = DispatchConfig::from_json_str(r#"{ "fan_out": { "permits": 0 } }"#).unwrap_err();
    assert!(err.starts_with("fan_out invalid"));
}

#[test]
fn test_dispatch_config_rejects_malformed_json() {
    let err = DispatchConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_failure_policy_parse() {
    assert_eq!("Isolate".parse::<FailurePolicy>(), Ok(FailurePolicy::Isolate));
    assert_eq!(" fatal ".parse::<FailurePolicy>(), Ok(FailurePolicy::Fatal));
    assert!("restart".parse::<FailurePolicy>().is_err());
}

#[test]
fn test_dispatch_config_from_env() {
    // Only this test touches DISPATCH_* variables.
    std::env::set_var("DISPATCH_WORKER_COUNT", "3");
    std::env::set_var("DISPATCH_PERMITS", "5");
    std::env::set_var("DISPATCH_FAILURE_POLICY", "fatal");
    let cfg = DispatchConfig::from_env().unwrap();
    assert_eq!(cfg.pool.worker_count, 3);
    assert_eq!(cfg.fan_out.permits, 5);
    assert_eq!(cfg.pool.failure_policy, FailurePolicy::Fatal);

    std::env::set_var("DISPATCH_WORKER_COUNT", "many");
    assert!(DispatchConfig::from_env().is_err());

    std::env::remove_var("DISPATCH_WORKER_COUNT");
    std::env::remove_var("DISPATCH_PERMITS");
    std::env::remove_var("DISPATCH_FAILURE_POLICY");
}

#[test]
fn test_build_fan_out_validates() {
    let mut cfg = DispatchConfig::default();
    cfg.fan_out.permits = 0;
    assert!(matches!(build_fan_out(&cfg), Err(DispatchError::InvalidConfig(_))));

    cfg.fan_out.permits = 2;
    let fan = build_fan_out(&cfg).unwrap();
    let out = fan.run_bounded(0..10, |n: u32| n).unwrap();
    assert_eq!(out.len(), 10);
}
