// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

use crate::connection::Timing;
use crate::transport::ws::OriginPolicy;

/// Real-time room hub for planning and retrospective tools.
#[derive(Debug, Clone, Parser)]
#[command(name = "huddle", version, about)]
pub struct Config {
    /// Host address to bind to.
    #[arg(long, env = "HUDDLE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// HTTP port to listen on.
    #[arg(long, env = "HUDDLE_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Domain the web app is served from. Websocket origins must match it.
    #[arg(long, env = "HUDDLE_APP_DOMAIN", default_value = "localhost")]
    pub app_domain: String,

    /// Subdomain of the app domain that is also accepted as an origin.
    #[arg(long, env = "HUDDLE_SUBDOMAIN", default_value = "www")]
    pub subdomain: String,

    /// Upper bound on a single socket write in ms (0 = default).
    #[arg(long, env = "HUDDLE_WRITE_WAIT_MS", default_value_t = 10_000)]
    pub write_wait_ms: u64,

    /// Interval between server pings in ms (0 = nine tenths of the pong wait).
    #[arg(long, env = "HUDDLE_PING_PERIOD_MS", default_value_t = 54_000)]
    pub ping_period_ms: u64,

    /// How long a socket may stay silent without a pong in ms (0 = default).
    #[arg(long, env = "HUDDLE_PONG_WAIT_MS", default_value_t = 60_000)]
    pub pong_wait_ms: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "HUDDLE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (json or text).
    #[arg(long, env = "HUDDLE_LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let timing = self.timing();
        if timing.ping_period >= timing.pong_wait {
            anyhow::bail!(
                "ping period ({:?}) must be shorter than pong wait ({:?})",
                timing.ping_period,
                timing.pong_wait
            );
        }
        match self.log_format.as_str() {
            "json" | "text" => Ok(()),
            other => anyhow::bail!("invalid log format: {other}"),
        }
    }

    pub fn timing(&self) -> Timing {
        Timing::new(
            Duration::from_millis(self.write_wait_ms),
            Duration::from_millis(self.ping_period_ms),
            Duration::from_millis(self.pong_wait_ms),
        )
    }

    pub fn origin_policy(&self) -> OriginPolicy {
        OriginPolicy::new(&self.app_domain, &self.subdomain)
    }

    /// Address string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Defaults with short keepalive timings, for tests.
    pub fn test() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            app_domain: "localhost".into(),
            subdomain: "www".into(),
            write_wait_ms: 1_000,
            ping_period_ms: 500,
            pong_wait_ms: 2_000,
            log_level: "debug".into(),
            log_format: "text".into(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
