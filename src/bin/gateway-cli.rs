use std::path::PathBuf;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use clap::{Parser, Subcommand};
use serde_json::json;

use edge_gateway::config::{load_config, read_public_key};
use edge_gateway::observability::TraceContextResolver;
use edge_gateway::security::{
    canonical_path, AntPathMatcher, CredentialVerifier, Menu, PermissionDecision, PermissionGate,
    PublicKey,
};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Offline inspection tool for the edge gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve trace context from a set of headers
    Trace {
        /// Header in `name: value` form, repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
    /// Verify a bearer token and print the caller identity
    Verify {
        /// Gateway configuration holding the public key
        #[arg(short, long)]
        config: PathBuf,
        /// Token without the `Bearer ` prefix
        token: String,
    },
    /// Evaluate menu permissions for a path
    Check {
        /// Request path
        #[arg(short, long)]
        path: String,
        /// Menus claim as a JSON array
        #[arg(short, long)]
        menus: String,
        /// Disable the string-prefix fallback
        #[arg(long)]
        strict: bool,
    },
    /// Load and validate a configuration file
    Config {
        path: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Trace { headers } => {
            let inbound = parse_headers(&headers)?;
            let resolver = TraceContextResolver::new();
            let trace = resolver.resolve(&inbound);
            let outbound: serde_json::Map<String, serde_json::Value> = resolver
                .outbound_headers(&trace, &inbound)
                .into_iter()
                .map(|(name, value)| {
                    let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
                    (name.to_string(), json!(value))
                })
                .collect();
            print_json(&json!({ "trace": trace, "outbound_headers": outbound }))?;
        }
        Commands::Verify { config, token } => {
            let config = load_config(&config)?;
            let key = PublicKey::from_pem(&read_public_key(&config.auth)?)?;
            let verifier = CredentialVerifier::new(key, config.auth.clock_skew_secs);
            match verifier.verify(token.trim()) {
                Ok(identity) => print_json(&json!({
                    "user_id": identity.user_id,
                    "username": identity.username,
                    "roles": identity.joined_roles(),
                    "menus": identity.menus,
                }))?,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Check { path, menus, strict } => {
            let menus: Vec<Menu> = serde_json::from_str(&menus)?;
            let gate = PermissionGate::new(Arc::new(AntPathMatcher::new()), !strict);
            match gate.check(&canonical_path(&path), &menus) {
                PermissionDecision::Allow => println!("allow"),
                PermissionDecision::Deny(reason) => {
                    println!("deny: {}", reason);
                    std::process::exit(1);
                }
            }
        }
        Commands::Config { path } => match load_config(&path) {
            Ok(config) => {
                println!("Configuration is valid");
                println!("{}", toml::to_string_pretty(&config)?);
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

fn parse_headers(raw: &[String]) -> Result<HeaderMap, Box<dyn std::error::Error>> {
    let mut map = HeaderMap::new();
    for line in raw {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| format!("header must look like `name: value`, got `{}`", line))?;
        map.append(
            HeaderName::from_bytes(name.trim().as_bytes())?,
            HeaderValue::from_str(value.trim())?,
        );
    }
    Ok(map)
}

fn print_json(value: &serde_json::Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
