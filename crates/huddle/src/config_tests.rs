// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

use super::Config;

fn parse(args: &[&str]) -> Config {
    Config::parse_from(args)
}

#[test]
fn defaults_are_valid() -> anyhow::Result<()> {
    let config = parse(&["huddle"]);
    config.validate()?;
    assert_eq!(config.bind_addr(), "127.0.0.1:8080");
    assert_eq!(config.app_domain, "localhost");
    assert_eq!(config.subdomain, "www");

    let timing = config.timing();
    assert_eq!(timing.write_wait, Duration::from_secs(10));
    assert_eq!(timing.ping_period, Duration::from_secs(54));
    assert_eq!(timing.pong_wait, Duration::from_secs(60));
    Ok(())
}

#[test]
fn zero_timings_fall_back() -> anyhow::Result<()> {
    let config = parse(&[
        "huddle",
        "--write-wait-ms",
        "0",
        "--ping-period-ms",
        "0",
        "--pong-wait-ms",
        "20000",
    ]);
    config.validate()?;
    let timing = config.timing();
    assert_eq!(timing.write_wait, Duration::from_secs(10));
    assert_eq!(timing.ping_period, Duration::from_secs(18));
    assert_eq!(timing.pong_wait, Duration::from_secs(20));
    Ok(())
}

#[yare::parameterized(
    ping_equals_pong = { &["huddle", "--ping-period-ms", "5000", "--pong-wait-ms", "5000"],
                         "must be shorter" },
    ping_after_pong  = { &["huddle", "--ping-period-ms", "70000"], "must be shorter" },
    bad_log_format   = { &["huddle", "--log-format", "xml"], "invalid log format" },
)]
fn invalid_config(args: &[&str], expected_substr: &str) {
    let config = parse(args);
    crate::assert_err_contains!(config.validate(), expected_substr);
}

#[test]
fn origin_policy_uses_domain_settings() {
    let config = parse(&["huddle", "--app-domain", "example.com", "--subdomain", "app"]);
    let policy = config.origin_policy();
    assert!(policy.allows("https://example.com", None));
    assert!(policy.allows("https://app.example.com", None));
    assert!(!policy.allows("https://www.example.com", None));
}

#[test]
fn test_config_is_valid() -> anyhow::Result<()> {
    Config::test().validate()
}
