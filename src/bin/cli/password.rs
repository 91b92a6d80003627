//! Password handling for CLI operations.

use arcx::Password;
use rpassword::prompt_password;

/// Reads a password from the terminal without echo.
///
/// An empty answer or an unreadable terminal declines.
pub fn read_password() -> Option<Password> {
    match prompt_password("Enter password: ") {
        Ok(pwd) if !pwd.is_empty() => Some(Password::new(pwd)),
        Ok(_) => None,
        Err(e) => {
            log::debug!("password prompt failed: {}", e);
            None
        }
    }
}
