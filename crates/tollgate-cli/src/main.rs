//! Tollgate CLI - admin client for a running gateway.
//!
//! This is the entry point for the `tollgatectl` binary.

mod client;
mod render;
mod types;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use client::AdminClient;
use tollgate_gateway::GatewayConfig;

/// Tollgate CLI - inspect and control a running gateway.
#[derive(Parser, Debug)]
#[command(name = "tollgatectl")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Admin listener URL.
    #[arg(long, env = "TOLLGATE_ADMIN", default_value = "http://localhost:8082")]
    admin: String,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show gateway status.
    Status,
    /// Reload the gateway's configuration file.
    ReloadConfig,
    /// Reload only the proxy routes from the configuration file.
    ReloadRoutes,
    /// List route table entries.
    Routes,
    /// Show circuit breaker states.
    Breakers,
    /// Close one service's circuit, or every circuit.
    ResetBreaker {
        /// Service to reset; all when omitted.
        service: Option<String>,
    },
    /// Show rate limiters.
    Limiters,
    /// Parse and print a configuration file without contacting the gateway.
    ShowConfig {
        /// Path to the YAML file.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.debug {
        tracing_subscriber::fmt()
            .with_env_filter("tollgatectl=debug,warn")
            .with_writer(std::io::stderr)
            .init();
    }

    let client = AdminClient::new(&args.admin);
    let output = run(&client, args.command).await?;
    print!("{output}");
    Ok(())
}

async fn run(client: &AdminClient, command: Command) -> anyhow::Result<String> {
    let output = match command {
        Command::Status => {
            let status = client.status().await.context("status request failed")?;
            render::status(&status)
        }
        Command::ReloadConfig => {
            let reload = client
                .reload_config()
                .await
                .context("configuration reload failed")?;
            format!(
                "{}: {} routes, proxy routes: {}\n",
                reload.message,
                reload.routes,
                reload.proxy_routes.join(", ")
            )
        }
        Command::ReloadRoutes => {
            let reload = client
                .reload_proxy_routes()
                .await
                .context("proxy route reload failed")?;
            format!("{}: {}\n", reload.message, reload.proxy_routes.join(", "))
        }
        Command::Routes => {
            let routes = client.routes().await.context("route listing failed")?;
            render::routes(&routes)
        }
        Command::Breakers => {
            let breakers = client
                .circuit_breakers()
                .await
                .context("circuit breaker listing failed")?;
            render::breakers(&breakers)
        }
        Command::ResetBreaker { service } => {
            let reply = client
                .reset_breaker(service.as_deref())
                .await
                .context("circuit breaker reset failed")?;
            format!("{}\n", reply.message)
        }
        Command::Limiters => {
            let limiters = client
                .rate_limiters()
                .await
                .context("rate limiter listing failed")?;
            render::limiters(&limiters)
        }
        Command::ShowConfig { file } => {
            let config = GatewayConfig::from_file(&file)
                .with_context(|| format!("failed to load {}", file.display()))?;
            config
                .validate()
                .with_context(|| format!("{} is not a valid configuration", file.display()))?;
            render::config(&config)?
        }
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn args_parse_subcommands() {
        let args = Args::try_parse_from(["tollgatectl", "reset-breaker", "orders"]).unwrap();
        assert!(matches!(
            args.command,
            Command::ResetBreaker { service: Some(ref s) } if s == "orders"
        ));
        assert_eq!(args.admin, "http://localhost:8082");

        let args = Args::try_parse_from([
            "tollgatectl",
            "--admin",
            "http://gw:9000",
            "reload-routes",
        ])
        .unwrap();
        assert!(matches!(args.command, Command::ReloadRoutes));
        assert_eq!(args.admin, "http://gw:9000");
    }

    #[tokio::test]
    async fn reload_config_summary() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/reload-config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Config reloaded successfully",
                "routes": 2,
                "proxy_routes": ["/a", "/b"]
            })))
            .mount(&server)
            .await;

        let output = run(&AdminClient::new(server.uri()), Command::ReloadConfig)
            .await
            .unwrap();
        assert_eq!(output, "Config reloaded successfully: 2 routes, proxy routes: /a, /b\n");
    }

    #[tokio::test]
    async fn show_config_works_offline() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "proxy_routes:\n  - path: /maps\n    target_url: http://localhost:8303\n",
        )
        .unwrap();

        let client = AdminClient::new("http://127.0.0.1:1");
        let output = run(
            &client,
            Command::ShowConfig {
                file: file.path().to_path_buf(),
            },
        )
        .await
        .unwrap();
        assert!(output.contains("/maps -> http://localhost:8303"));
    }

    #[tokio::test]
    async fn show_config_rejects_invalid_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "server:\n  http_addr: not-an-address\n").unwrap();

        let client = AdminClient::new("http://127.0.0.1:1");
        let result = run(
            &client,
            Command::ShowConfig {
                file: file.path().to_path_buf(),
            },
        )
        .await;
        assert!(result.is_err());
    }
}
