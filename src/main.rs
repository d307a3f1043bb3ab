// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Command-line front end for checking tokens against a realm.
//!
//! Configuration comes from the `KEYCLOAK_*` environment variables.
//!
//! ```text
//! keycloak-verify token <TOKEN>   # or the token on stdin
//! keycloak-verify refresh
//! ```

use std::io::{self, Read};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use http::header::AUTHORIZATION;
use http::{Method, Request};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use keycloak_verifier::{AuthError, AuthOutcome, Authenticator, Config};

#[derive(Debug, Parser)]
#[command(name = "keycloak-verify", version, about = "Verify Keycloak bearer tokens")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Verify a token and print its claims.
    Token {
        /// The token. Read from stdin when omitted.
        token: Option<String>,
    },
    /// Fetch the realm's public keys and print their ids and algorithms.
    Refresh,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}

fn report(error: &AuthError) -> ExitCode {
    eprintln!(
        "{}",
        json!({ "code": error.code(), "message": error.message() })
    );
    ExitCode::FAILURE
}

fn read_stdin() -> io::Result<String> {
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf.trim().to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::from(2);
        }
    };

    let authenticator = match Authenticator::from_config(&config) {
        Ok(authenticator) => authenticator,
        Err(e) => {
            error!(error = %e, "Failed to build authenticator");
            return ExitCode::from(2);
        }
    };

    info!(realm = %config.realm_id, server = %config.server_url, "Keycloak verifier ready");

    match cli.command {
        Command::Token { token } => {
            let token = match token {
                Some(token) => token,
                None => match read_stdin() {
                    Ok(token) => token,
                    Err(e) => {
                        error!(error = %e, "Failed to read token from stdin");
                        return ExitCode::from(2);
                    }
                },
            };

            let request = match Request::builder()
                .method(Method::GET)
                .uri("/")
                .header(AUTHORIZATION, format!("Bearer {token}"))
                .body(())
            {
                Ok(request) => request,
                Err(e) => {
                    error!(error = %e, "Token is not a valid header value");
                    return ExitCode::from(2);
                }
            };

            match authenticator.authenticate(&request).await {
                AuthOutcome::Authenticated(decoded) => match serde_json::to_string_pretty(&decoded) {
                    Ok(out) => {
                        println!("{out}");
                        ExitCode::SUCCESS
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to serialize claims");
                        ExitCode::FAILURE
                    }
                },
                AuthOutcome::Skipped | AuthOutcome::Unauthenticated => {
                    println!("{}", json!({ "authenticated": false }));
                    ExitCode::SUCCESS
                }
                AuthOutcome::Failed(e) => report(&e),
            }
        }
        Command::Refresh => match authenticator.refresh_keys().await {
            Ok(keys) => {
                for key in keys.keys() {
                    println!(
                        "{}\t{}\t{}",
                        key.key_id().unwrap_or("-"),
                        key.algorithm().unwrap_or("-"),
                        if key.is_signing_key() { "sig" } else { "enc" },
                    );
                }
                ExitCode::SUCCESS
            }
            Err(e) => report(&e),
        },
    }
}
