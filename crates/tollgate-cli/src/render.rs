//! Plain-text rendering of admin responses.

use std::fmt::Write;

use tollgate_gateway::GatewayConfig;

use crate::types::{Breakers, Limiters, Routes, Status};

/// Render `GET /status`.
pub fn status(status: &Status) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {} ({})", status.service, status.version, status.status);
    let _ = writeln!(out, "uptime:       {}s", status.uptime_seconds);
    let _ = writeln!(out, "routes:       {}", status.routes);
    let _ = writeln!(out, "connections:  {}", status.connections);
    let _ = writeln!(out, "agents:       {}", list(&status.ai_agents));
    let _ = writeln!(out, "tools:        {}", list(&status.mcp_services));
    let _ = writeln!(out, "proxy routes: {}", list(&status.proxy_routes));
    out
}

/// Render `GET /routes` as one line per entry.
pub fn routes(routes: &Routes) -> String {
    if routes.routes.is_empty() {
        return "no routes\n".to_string();
    }

    let mut out = String::new();
    for entry in &routes.routes {
        let _ = writeln!(
            out,
            "{:<7} {:<30} {:<16} -> {} [id={} weight={}{}]",
            entry.method,
            entry.path,
            entry.service_name,
            entry.backend_url,
            entry.id,
            entry.weight,
            if entry.enabled { "" } else { " disabled" },
        );
    }
    out
}

/// Render `GET /circuit-breakers`.
pub fn breakers(breakers: &Breakers) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "threshold={} success_threshold={} timeout={}ms{}",
        breakers.error_threshold,
        breakers.success_threshold,
        breakers.timeout_ms,
        if breakers.fallback_disabled {
            " (breaking disabled)"
        } else {
            ""
        },
    );
    for (name, service) in &breakers.services {
        let _ = writeln!(
            out,
            "  {name:<24} {:<9} errors={} successes={} since={}ms",
            service.state, service.error_count, service.success_count, service.since_state_change_ms,
        );
    }
    out
}

/// Render `GET /rate-limiters`.
pub fn limiters(limiters: &Limiters) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "defaults: rate={}/s burst={}",
        limiters.default_rate, limiters.default_burst
    );
    for (key, limiter) in &limiters.limiters {
        let _ = writeln!(
            out,
            "  {key:<24} rate={}/s burst={} tokens={:.1}{}",
            limiter.rate,
            limiter.burst,
            limiter.tokens,
            if limiter.enabled { "" } else { " (disabled)" },
        );
    }
    out
}

/// Render a parsed configuration file: the YAML as the gateway will see it,
/// then the proxy routes it would install.
///
/// # Errors
///
/// Returns an error if the configuration cannot be serialized.
pub fn config(config: &GatewayConfig) -> Result<String, serde_yaml::Error> {
    let mut out = serde_yaml::to_string(config)?;
    let _ = writeln!(out, "\nproxy routes:");
    for route in &config.proxy_routes {
        let _ = writeln!(
            out,
            "  {} -> {}{}",
            route.path,
            route.target_url,
            if route.enable { "" } else { " (disabled)" },
        );
    }
    Ok(out)
}

fn list(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}
