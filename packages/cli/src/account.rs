//! `login`, `logout` and `whoami`.

use dialoguer::{Input, Password};
use fightwatch_auth::{AuthError, Credentials, DemoCredentials, Session, UserAccount};

/// Logs in, prompting for whatever was not passed on the command line.
///
/// # Errors
///
/// Returns an error if a prompt fails, the credentials are rejected, or
/// the session cannot be saved.
pub fn login(
    session: &mut Session,
    username: Option<String>,
    password: Option<String>,
    phone: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let username = match username {
        Some(username) => username,
        None => Input::new().with_prompt("Username").interact_text()?,
    };
    let password = match password {
        Some(password) => password,
        None => Password::new().with_prompt("Password").interact()?,
    };
    let phone = match phone {
        Some(phone) => phone,
        None => Input::new().with_prompt("Phone number").interact_text()?,
    };

    let credentials = Credentials {
        username: username.trim().to_string(),
        password,
        phone: phone.trim().to_string(),
    };

    match session.login(&DemoCredentials, &credentials) {
        Ok(user) => {
            println!("Logged in as {} ({})", user.username, user.role);
            Ok(())
        }
        Err(AuthError::InvalidCredentials) => {
            Err("Invalid credentials. Please check your username, password, and phone number.".into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Logs out.
///
/// # Errors
///
/// Returns an error if the session file cannot be removed.
pub fn logout(session: &mut Session) -> Result<(), AuthError> {
    let was_logged_in = session.current().is_some();
    session.logout()?;
    if was_logged_in {
        println!("Logged out.");
    } else {
        println!("Not logged in.");
    }
    Ok(())
}

/// Prints the current user.
pub fn whoami(session: &Session) {
    match session.current() {
        Some(user) => println!("{} ({}, phone {})", user.username, user.role, user.phone),
        None => println!("Not logged in."),
    }
}

/// The logged-in user, for commands that need one.
///
/// # Errors
///
/// Returns [`AuthError::NotLoggedIn`] when nobody is logged in.
pub fn require_user(session: &Session) -> Result<&UserAccount, AuthError> {
    session.current().ok_or(AuthError::NotLoggedIn)
}
