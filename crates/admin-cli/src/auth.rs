//! CLI authentication: password login against the back-office API

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use shared::{AuthResponse, Data, LoginRequest, UserView};

use crate::client::ApiClient;
use crate::config::Config;

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Logs in and returns the bearer token.
/// The password comes from `BACKOFFICE_PASSWORD` when set, else stdin.
pub async fn login(server: &str, email: Option<String>) -> Result<String> {
    let email = match email {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = match std::env::var("BACKOFFICE_PASSWORD") {
        Ok(password) if !password.is_empty() => password,
        _ => prompt("Password: ")?,
    };

    let client = ApiClient::new(server, None);
    let reply = client
        .post::<AuthResponse, _>("/api/auth/login", &LoginRequest { email, password })
        .await?;

    println!();
    println!("\x1b[1;32m✅ Login successful!\x1b[0m");
    println!("\x1b[90mUser ID: {} ({})\x1b[0m", reply.data.user_id, reply.data.role);
    Ok(reply.data.token)
}

/// Logout by clearing the stored token
pub fn logout(config: &mut Config) -> Result<()> {
    config.remote.token = None;
    config.save()?;
    println!("\x1b[32m✅ Logged out successfully\x1b[0m");
    Ok(())
}

/// Show current login status, checked against the server
pub async fn whoami(config: &Config, server: &str) -> Result<()> {
    let Some(token) = &config.remote.token else {
        println!("\x1b[33m✗ Not logged in\x1b[0m");
        println!("Run '\x1b[1mbackoffice login\x1b[0m' to authenticate");
        return Ok(());
    };

    let client = ApiClient::new(server, Some(token.clone()));
    match client.get::<Data<UserView>>("/api/auth/me").await {
        Ok(reply) => {
            let user = reply.data.data;
            println!("\x1b[32m✓ Logged in\x1b[0m");
            println!("Server: {}", server);
            println!("User:   {} ({})", user.email, user.role);
        }
        Err(e) => {
            println!("\x1b[33m✗ Stored token was rejected: {}\x1b[0m", e);
            println!("Run '\x1b[1mbackoffice login\x1b[0m' to authenticate");
        }
    }
    Ok(())
}
