//! User-facing reply texts. Every error is turned into words here and
//! nowhere else.

use crate::error::{ProvisionError, ValidationError};

pub const MAIL_SUBJECT: &str = "Email Verification Code";

pub fn welcome() -> String {
    "Welcome! Please send me your email address to verify it.".to_string()
}

pub fn mail_body(code: &str) -> String {
    format!(
        "Your verification code is: {code}\n\n\
         Please enter this code in the Telegram bot to verify your email."
    )
}

pub fn validation_failed(err: &ValidationError) -> String {
    match err {
        ValidationError::MalformedEmail(_) => "Invalid email format. Please enter a valid email address.\n\
             If you already have a code, it was lost on our side and you need to request a new one."
            .to_string(),
        ValidationError::DomainNotAllowed { allowed, .. } => {
            format!("Use your {allowed} email address.")
        }
    }
}

pub fn code_sent(email: &str) -> String {
    format!("A verification code has been sent to {email}. Please enter the 6-digit code here.")
}

pub fn mail_failed() -> String {
    "Sorry, there was an error sending the verification email. \
     Please wait 5 minutes and try again, or restart with /start."
        .to_string()
}

pub fn creating_account() -> String {
    "Code is correct. Creating a user...".to_string()
}

/// Success reply. The subscription URL is embedded verbatim.
pub fn verified(subscription_url: &str) -> String {
    format!(
        "Email has been successfully verified!\nYour subscription URL:\n\n{subscription_url}\n\n\
         Use it in your VPN client. Also open it in a browser to see your current traffic limit."
    )
}

pub fn provisioning_failed(err: &ProvisionError) -> String {
    format!(
        "Something went wrong. Try again in 5 minutes. If it does not help, reach out to support.\n\
         Error:\n{err}"
    )
}

pub fn invalid_code() -> String {
    "Invalid verification code. Please try again.\nCheck your spam folder.\n\
     If you still can't find it, restart the verification process with /start."
        .to_string()
}

pub fn internal_error() -> String {
    "Something went wrong on our side. Please try again later.".to_string()
}
