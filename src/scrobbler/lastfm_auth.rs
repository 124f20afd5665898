// Last.fm authentication helper
// Interactive username/password login that stores the resulting session

use super::lastfm::LastFm;
use crate::session_store::{Credentials, SessionStore};
use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

/// Prompt for Last.fm credentials on the terminal, log in and save the session.
/// Returns `Ok(None)` when Last.fm refuses the credentials.
pub async fn authenticate(
    lastfm: &LastFm,
    store: &SessionStore,
    username: Option<String>,
) -> Result<Option<Credentials>> {
    if !atty::is(atty::Stream::Stdin) {
        anyhow::bail!("Last.fm login needs an interactive terminal");
    }

    println!("Starting Last.fm authentication...\n");

    // Terminal reads block, keep them off the runtime workers
    let (username, password) = tokio::task::spawn_blocking(move || read_credentials(username))
        .await
        .context("credential prompt failed")??;

    if username.is_empty() || password.is_empty() {
        anyhow::bail!("username and password are required");
    }

    println!("\nAuthenticating with Last.fm...");
    let Some(credentials) = lastfm
        .login(&username, &password)
        .await
        .context("Last.fm login failed")?
    else {
        return Ok(None);
    };

    store.save_session(credentials.clone())?;
    println!("Logged in as {}\n", credentials.display_name());
    Ok(Some(credentials))
}

fn read_credentials(username: Option<String>) -> Result<(String, String)> {
    let username = match username {
        Some(username) => username,
        None => prompt("Last.fm Username: ")?,
    };
    // Hidden input would be better, but this is simple
    let password = prompt("Last.fm Password: ")?;
    Ok((username, password))
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
