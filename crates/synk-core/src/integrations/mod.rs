pub mod google;
pub mod notion;
pub mod oauth;
pub mod traits;

pub use google::GoogleCalendarClient;
pub use notion::NotionClient;
pub use oauth::KeyringIdentity;
pub use traits::{CalendarApi, IdentityProvider, NotionApi, Service};

use crate::error::{Result, SyncError};

/// Map a non-success HTTP response onto the engine's error taxonomy.
///
/// 401 means the token is no longer accepted; anything else is treated as
/// transient and left to the scheduler's backoff.
pub(crate) async fn check_response(
    service: Service,
    resp: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(SyncError::AuthenticationExpired { service });
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SyncError::Api {
        service,
        status: status.as_u16(),
        body,
    })
}

/// Thin wrapper around the OS keyring for credential storage.
pub mod keyring_store {
    const SERVICE: &str = "synk";

    pub fn get(key: &str) -> Result<Option<String>, keyring::Error> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        match entry.get_password() {
            Ok(pw) => Ok(Some(pw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn set(key: &str, value: &str) -> Result<(), keyring::Error> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        entry.set_password(value)
    }
}
