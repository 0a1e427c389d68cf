//! Credential collaborator for the CLI: flags, system keyring, prompt.
//!
//! Resolution order: explicit `--user`/`--password` values win; otherwise a
//! previously stored keyring entry for the server host is used (unless
//! `--no-keyring`); otherwise the user is prompted interactively. Newly
//! entered values are stored back to the keyring so the next run does not
//! have to ask. Empty user names and passwords are legal values.

use std::io::{self, BufRead, IsTerminal, Write};

use eprints2archives_core::{CredentialOutcome, CredentialSource};
use keyring::Entry;
use tracing::{debug, warn};

/// Keyring service name under which per-server entries are stored.
const KEYRING_SERVICE: &str = "eprints2archives";

/// Separator between the user and password halves of a stored entry. A
/// control character, so it cannot collide with typed values.
const VALUE_SEPARATOR: char = '\u{3}';

/// [`CredentialSource`] backed by CLI flags, the OS keyring, and stdin.
#[derive(Debug)]
pub struct CliCredentials {
    /// Value of `--user`, if given.
    pub user: Option<String>,
    /// Value of `--password`, if given.
    pub password: Option<String>,
    /// False when `--no-keyring` was given.
    pub use_keyring: bool,
}

impl CredentialSource for CliCredentials {
    fn credentials(&self, host: &str) -> CredentialOutcome {
        let mut user = self.user.clone();
        let mut password = self.password.clone();

        if user.is_none() && password.is_none() && self.use_keyring {
            if let Some((stored_user, stored_password)) = keyring_credentials(host) {
                debug!(%host, "using credentials from keyring");
                user = Some(stored_user);
                password = Some(stored_password);
            }
        }

        if user.is_none() || password.is_none() {
            match prompt(host, user.take(), password.take()) {
                Some((entered_user, entered_password)) => {
                    user = Some(entered_user);
                    password = Some(entered_password);
                }
                None => {
                    return CredentialOutcome {
                        user: None,
                        password: None,
                        cancelled: true,
                    };
                }
            }
        }

        if self.use_keyring
            && let (Some(user), Some(password)) = (&user, &password)
        {
            save_keyring_credentials(host, user, password);
        }
        CredentialOutcome {
            user,
            password,
            cancelled: false,
        }
    }
}

/// Looks up stored credentials for `host`. Returns `None` when there is no
/// entry or the keyring is unusable.
fn keyring_credentials(host: &str) -> Option<(String, String)> {
    let entry = Entry::new(KEYRING_SERVICE, host).ok()?;
    let value = entry.get_password().ok()?;
    let (user, password) = value.split_once(VALUE_SEPARATOR)?;
    Some((user.to_string(), password.to_string()))
}

/// Stores credentials for `host`. Failures are logged and otherwise ignored;
/// an unusable keyring must not block archiving.
fn save_keyring_credentials(host: &str, user: &str, password: &str) {
    let result = Entry::new(KEYRING_SERVICE, host)
        .and_then(|entry| entry.set_password(&format!("{user}{VALUE_SEPARATOR}{password}")));
    if let Err(error) = result {
        warn!(%host, %error, "could not store credentials in keyring");
    }
}

/// Asks the user for missing credentials on the terminal. Returns `None`
/// when the user cancels (EOF). In non-interactive runs the missing values
/// default to empty strings, which EPrints treats as "no login".
fn prompt(
    host: &str,
    user: Option<String>,
    password: Option<String>,
) -> Option<(String, String)> {
    if !io::stdin().is_terminal() {
        return Some((user.unwrap_or_default(), password.unwrap_or_default()));
    }
    eprintln!("User credentials for {host} (empty values are allowed):");
    let user = match user {
        Some(user) => user,
        None => read_value("Login name: ")?,
    };
    let password = match password {
        Some(password) => password,
        None => read_value("Password: ")?,
    };
    Some((user, password))
}

/// Reads one line from stdin, trimmed. `None` on EOF (user cancelled).
fn read_value(prompt_text: &str) -> Option<String> {
    eprint!("{prompt_text}");
    let _ = io::stderr().flush();
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_flags_win_without_prompting() {
        let source = CliCredentials {
            user: Some("alice".to_string()),
            password: Some("secret".to_string()),
            use_keyring: false,
        };
        let outcome = source.credentials("srv.test");
        assert_eq!(outcome.user.as_deref(), Some("alice"));
        assert_eq!(outcome.password.as_deref(), Some("secret"));
        assert!(!outcome.cancelled);
    }

    #[test]
    fn test_separator_is_a_control_character() {
        assert!(VALUE_SEPARATOR.is_control());
    }
}
