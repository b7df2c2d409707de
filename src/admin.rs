//! Administrative entry points exposed to the host.

use serde::Serialize;

use fdw_core::{FdwResult, RemoteVersion, ServerDescriptor, UserMapping};

use crate::engine::ConnectionManager;

pub const VERSION_NUM: i32 = 10202;
pub const VERSION_STRING: &str = "1.2.2";

/// A `(name, value)` row as shown to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Setting {
    pub name: String,
    pub value: String,
}

impl Setting {
    fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteVersionInfo {
    pub version: RemoteVersion,
    pub version_num: i32,
    pub version_string: String,
}

pub fn version() -> i32 {
    VERSION_NUM
}

pub fn version_string() -> &'static str {
    VERSION_STRING
}

/// Closes every cached remote connection; returns how many were closed.
pub async fn close_connections(manager: &ConnectionManager) -> usize {
    let closed = manager.close_all().await;
    tracing::info!(closed, "cached remote connections closed");
    closed
}

/// Effective options for `server`, plus the user mapping when given.
/// Passwords are always redacted.
pub fn server_options(server: &ServerDescriptor, user: Option<&UserMapping>) -> Vec<Setting> {
    let mut settings: Vec<Setting> = server
        .options
        .to_pairs()
        .into_iter()
        .map(|(name, value)| Setting::new(name, value))
        .collect();
    if let Some(user) = user {
        if let Some(username) = &user.options.username {
            settings.push(Setting::new("username", username.clone()));
        }
        if let Some(password) = &user.options.password {
            settings.push(Setting::new("password", password.to_string()));
        }
    }
    settings
}

pub async fn diag_settings(manager: &ConnectionManager) -> Vec<Setting> {
    let settings = manager.settings();
    vec![
        Setting::new("version", VERSION_STRING),
        Setting::new("cached_connections", manager.cached_count().await.to_string()),
        Setting::new("local_encoding", settings.local_encoding.clone()),
        Setting::new("client_charset", settings.client_charset()),
        Setting::new("time_zone", settings.time_zone.to_string()),
        Setting::new(
            "connect_timeout",
            settings
                .connect_timeout
                .map_or_else(|| "none".to_string(), |t| format!("{}s", t.as_secs())),
        ),
        Setting::new("log_filter", settings.log_filter.clone()),
    ]
}

/// Remote engine version as reported by the session for `(server, user)`.
pub async fn remote_version(
    manager: &ConnectionManager,
    server: &ServerDescriptor,
    user: &UserMapping,
) -> FdwResult<RemoteVersionInfo> {
    let session = manager.acquire(server, user, 1).await?;
    Ok(RemoteVersionInfo {
        version: session.version,
        version_num: session.version.0,
        version_string: session.version_string.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_fixed() {
        assert_eq!(version(), 10202);
        assert_eq!(version_string(), "1.2.2");
    }

    #[test]
    fn server_options_redact_the_password() {
        let server = ServerDescriptor::new("fb", &[("address", "db.internal"), ("database", "/data/emp.fdb")]).unwrap();
        let user = UserMapping::new("alice", &[("username", "SYSDBA"), ("password", "masterkey")]).unwrap();

        let settings = server_options(&server, Some(&user));
        assert!(settings.contains(&Setting::new("address", "db.internal")));
        assert!(settings.contains(&Setting::new("port", "3050")));
        assert!(settings.contains(&Setting::new("username", "SYSDBA")));
        let password = settings.iter().find(|s| s.name == "password").unwrap();
        assert_ne!(password.value, "masterkey");

        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("masterkey"));

        let without_user = server_options(&server, None);
        assert!(without_user.iter().all(|s| s.name != "password"));
    }
}
