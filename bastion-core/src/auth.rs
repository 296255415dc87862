//! Users, roles and login state.
//!
//! Two roles exist: the player and the game master. GM-only operations are
//! gated through [`Auth::require_gm`]. Logins and user changes are recorded in
//! a bounded security log, newest first.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Security events kept before the oldest are dropped.
pub const SECURITY_LOG_LIMIT: usize = 50;

/// How long a persisted login stays valid.
pub const SESSION_MAX_AGE_HOURS: i64 = 24;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Please fill in all fields")]
    MissingFields,

    #[error("Invalid credentials or role mismatch")]
    InvalidCredentials,

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Role '{0}' required")]
    RoleRequired(Role),

    #[error("Only GMs can {action}")]
    GmOnly { action: String },

    #[error("Cannot remove current user")]
    CannotRemoveSelf,

    #[error("Session expired")]
    SessionExpired,

    #[error("Unknown role: {0}")]
    UnknownRole(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Player,
    Gm,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Player => write!(f, "player"),
            Role::Gm => write!(f, "gm"),
        }
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "player" => Ok(Role::Player),
            "gm" => Ok(Role::Gm),
            other => Err(AuthError::UnknownRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
struct UserAccount {
    access_code: String,
    role: Role,
    display_name: String,
    last_login: Option<DateTime<Utc>>,
}

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub username: String,
    pub role: Role,
    pub display_name: String,
    pub last_login: Option<DateTime<Utc>>,
}

/// The logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub login_time: DateTime<Utc>,
}

/// A login that can be written to disk and restored later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user: CurrentUser,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
}

impl AuthSession {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now - self.timestamp < Duration::hours(SESSION_MAX_AGE_HOURS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    Login,
    LoginFailed,
    Logout,
    UserAdded,
    UserRemoved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: SecurityEventKind,
    pub username: String,
    pub role: Option<Role>,
    /// Who performed the action, for user management events.
    pub actor: Option<String>,
}

/// Account registry plus the current login.
#[derive(Debug, Clone)]
pub struct Auth {
    users: BTreeMap<String, UserAccount>,
    current: Option<CurrentUser>,
    security_log: VecDeque<SecurityEvent>,
}

impl Default for Auth {
    fn default() -> Self {
        let mut auth = Self::empty();
        auth.insert_user("jon", "bastion2024", Role::Player, "Jon");
        auth.insert_user("gm", "gmbastion2024", Role::Gm, "Game Master");
        auth
    }
}

impl Auth {
    /// Registry with the default player and GM accounts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with no accounts at all.
    pub fn empty() -> Self {
        Self {
            users: BTreeMap::new(),
            current: None,
            security_log: VecDeque::new(),
        }
    }

    fn insert_user(&mut self, username: &str, access_code: &str, role: Role, display_name: &str) {
        self.users.insert(
            username.to_lowercase(),
            UserAccount {
                access_code: access_code.to_string(),
                role,
                display_name: display_name.to_string(),
                last_login: None,
            },
        );
    }

    /// Usernames are case-insensitive; the access code must match exactly.
    pub fn validate_credentials(&self, username: &str, access_code: &str, role: Role) -> bool {
        self.users
            .get(&username.trim().to_lowercase())
            .is_some_and(|u| u.access_code == access_code && u.role == role)
    }

    pub fn login(
        &mut self,
        username: &str,
        access_code: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<&CurrentUser, AuthError> {
        let username = username.trim().to_lowercase();
        if username.is_empty() || access_code.is_empty() {
            return Err(AuthError::MissingFields);
        }

        if !self.validate_credentials(&username, access_code, role) {
            self.log_event(SecurityEventKind::LoginFailed, &username, Some(role), None, now);
            tracing::warn!(%username, %role, "Login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let account = self
            .users
            .get_mut(&username)
            .ok_or_else(|| AuthError::UserNotFound(username.clone()))?;
        account.last_login = Some(now);
        let display_name = account.display_name.clone();

        self.log_event(SecurityEventKind::Login, &username, Some(role), None, now);
        tracing::info!(%username, %role, "User logged in");

        Ok(&*self.current.insert(CurrentUser {
            username,
            display_name,
            role,
            login_time: now,
        }))
    }

    /// Log out. Does nothing when nobody is logged in.
    pub fn logout(&mut self, now: DateTime<Utc>) {
        let Some(user) = self.current.take() else {
            return;
        };
        self.log_event(
            SecurityEventKind::Logout,
            &user.username,
            Some(user.role),
            None,
            now,
        );
        tracing::info!(username = %user.username, "User logged out");
    }

    pub fn current_user(&self) -> Option<&CurrentUser> {
        self.current.as_ref()
    }

    pub fn role(&self) -> Option<Role> {
        self.current.as_ref().map(|u| u.role)
    }

    pub fn is_logged_in(&self) -> bool {
        self.current.is_some()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role() == Some(role)
    }

    pub fn is_gm(&self) -> bool {
        self.has_role(Role::Gm)
    }

    pub fn is_player(&self) -> bool {
        self.has_role(Role::Player)
    }

    pub fn require_auth(&self) -> Result<&CurrentUser, AuthError> {
        self.current.as_ref().ok_or(AuthError::AuthRequired)
    }

    pub fn require_role(&self, role: Role) -> Result<&CurrentUser, AuthError> {
        let user = self.require_auth()?;
        if user.role != role {
            return Err(AuthError::RoleRequired(role));
        }
        Ok(user)
    }

    /// Gate a GM-only action. `action` completes "Only GMs can ...".
    pub fn require_gm(&self, action: &str) -> Result<&CurrentUser, AuthError> {
        match self.current.as_ref() {
            Some(user) if user.role == Role::Gm => Ok(user),
            _ => Err(AuthError::GmOnly {
                action: action.to_string(),
            }),
        }
    }

    /// Name recorded on missions and assignments.
    pub fn acting_username(&self) -> String {
        self.current
            .as_ref()
            .map(|u| u.username.clone())
            .unwrap_or_else(|| "system".to_string())
    }

    pub fn add_user(
        &mut self,
        username: &str,
        access_code: &str,
        role: Role,
        display_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let actor = self.require_gm("add users")?.username.clone();
        let username = username.trim();
        if username.is_empty() || access_code.is_empty() {
            return Err(AuthError::MissingFields);
        }

        self.insert_user(username, access_code, role, display_name.unwrap_or(username));
        self.log_event(
            SecurityEventKind::UserAdded,
            &username.to_lowercase(),
            Some(role),
            Some(actor),
            now,
        );
        Ok(())
    }

    pub fn remove_user(&mut self, username: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
        let actor = self.require_gm("remove users")?.username.clone();
        let username = username.trim().to_lowercase();
        if username == actor {
            return Err(AuthError::CannotRemoveSelf);
        }
        if self.users.remove(&username).is_none() {
            return Err(AuthError::UserNotFound(username));
        }

        self.log_event(SecurityEventKind::UserRemoved, &username, None, Some(actor), now);
        Ok(())
    }

    pub fn list_users(&self) -> Result<Vec<UserSummary>, AuthError> {
        self.require_gm("list users")?;
        Ok(self
            .users
            .iter()
            .map(|(username, account)| UserSummary {
                username: username.clone(),
                role: account.role,
                display_name: account.display_name.clone(),
                last_login: account.last_login,
            })
            .collect())
    }

    fn log_event(
        &mut self,
        kind: SecurityEventKind,
        username: &str,
        role: Option<Role>,
        actor: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.security_log.push_front(SecurityEvent {
            timestamp: now,
            kind,
            username: username.to_string(),
            role,
            actor,
        });
        self.security_log.truncate(SECURITY_LOG_LIMIT);
    }

    /// Newest first.
    pub fn security_log(&self) -> impl Iterator<Item = &SecurityEvent> {
        self.security_log.iter()
    }

    pub fn clear_security_log(&mut self) {
        self.security_log.clear();
    }

    /// Merge persisted events into the log, keeping the newest
    /// `SECURITY_LOG_LIMIT`.
    pub fn restore_security_log(&mut self, events: impl IntoIterator<Item = SecurityEvent>) {
        let mut merged: Vec<SecurityEvent> = self.security_log.drain(..).collect();
        for event in events {
            if !merged.contains(&event) {
                merged.push(event);
            }
        }
        merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        merged.truncate(SECURITY_LOG_LIMIT);
        self.security_log = merged.into();
    }

    /// Snapshot of the current login for persisting.
    pub fn session(&self, now: DateTime<Utc>) -> Option<AuthSession> {
        self.current.as_ref().map(|user| AuthSession {
            user: user.clone(),
            role: user.role,
            timestamp: now,
        })
    }

    /// Resume a persisted login if it is younger than a day.
    pub fn restore_session(
        &mut self,
        session: AuthSession,
        now: DateTime<Utc>,
    ) -> Result<&CurrentUser, AuthError> {
        if !session.is_valid(now) {
            return Err(AuthError::SessionExpired);
        }
        let Some(account) = self.users.get(&session.user.username) else {
            return Err(AuthError::UserNotFound(session.user.username));
        };
        if account.role != session.role || account.role != session.user.role {
            tracing::warn!(username = %session.user.username, "Saved session role does not match account");
            return Err(AuthError::InvalidCredentials);
        }
        let role = account.role;
        tracing::info!(username = %session.user.username, "Session restored");
        Ok(&*self.current.insert(CurrentUser {
            role,
            ..session.user
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gm_auth() -> Auth {
        let mut auth = Auth::new();
        auth.login("gm", "gmbastion2024", Role::Gm, Utc::now()).unwrap();
        auth
    }

    #[test]
    fn test_credentials() {
        let auth = Auth::new();
        assert!(auth.validate_credentials("JON", "bastion2024", Role::Player));
        assert!(!auth.validate_credentials("jon", "BASTION2024", Role::Player));
        assert!(!auth.validate_credentials("jon", "bastion2024", Role::Gm));
        assert!(!auth.validate_credentials("nobody", "bastion2024", Role::Player));
    }

    #[test]
    fn test_login_and_logout() {
        let mut auth = Auth::new();
        let user = auth
            .login(" Jon ", "bastion2024", Role::Player, Utc::now())
            .unwrap();
        assert_eq!(user.username, "jon");
        assert_eq!(user.display_name, "Jon");
        assert!(auth.is_player());
        assert!(!auth.is_gm());

        auth.logout(Utc::now());
        assert!(!auth.is_logged_in());
        assert_eq!(auth.require_auth().unwrap_err(), AuthError::AuthRequired);

        let kinds: Vec<_> = auth.security_log().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![SecurityEventKind::Logout, SecurityEventKind::Login]);
    }

    #[test]
    fn test_failed_login() {
        let mut auth = Auth::new();
        let result = auth.login("gm", "gmbastion2024", Role::Player, Utc::now());
        assert_eq!(result.unwrap_err(), AuthError::InvalidCredentials);
        assert!(!auth.is_logged_in());

        let empty = auth.login("", "x", Role::Player, Utc::now());
        assert_eq!(empty.unwrap_err(), AuthError::MissingFields);
    }

    #[test]
    fn test_gm_gate() {
        let mut auth = Auth::new();
        auth.login("jon", "bastion2024", Role::Player, Utc::now()).unwrap();

        let err = auth.require_gm("remove NPCs").unwrap_err();
        assert_eq!(err.to_string(), "Only GMs can remove NPCs");
        assert_eq!(
            auth.require_role(Role::Gm).unwrap_err(),
            AuthError::RoleRequired(Role::Gm)
        );
        assert!(auth.list_users().is_err());
    }

    #[test]
    fn test_user_management() {
        let mut auth = gm_auth();
        auth.add_user("Mira", "secret", Role::Player, None, Utc::now())
            .unwrap();

        let users = auth.list_users().unwrap();
        assert_eq!(users.len(), 3);
        assert!(users.iter().any(|u| u.username == "mira" && u.display_name == "Mira"));

        assert_eq!(
            auth.remove_user("GM", Utc::now()),
            Err(AuthError::CannotRemoveSelf)
        );
        auth.remove_user("mira", Utc::now()).unwrap();
        assert_eq!(auth.list_users().unwrap().len(), 2);

        let latest = auth.security_log().next().unwrap();
        assert_eq!(latest.kind, SecurityEventKind::UserRemoved);
        assert_eq!(latest.actor.as_deref(), Some("gm"));
    }

    #[test]
    fn test_security_log_is_bounded() {
        let mut auth = Auth::new();
        for _ in 0..(SECURITY_LOG_LIMIT + 10) {
            let _ = auth.login("jon", "wrong", Role::Player, Utc::now());
        }
        assert_eq!(auth.security_log().count(), SECURITY_LOG_LIMIT);
    }

    #[test]
    fn test_restored_security_log_merges_newest_first() {
        let start = Utc::now();
        let mut earlier = Auth::new();
        earlier.login("jon", "bastion2024", Role::Player, start).unwrap();
        earlier.logout(start + Duration::minutes(5));
        let saved: Vec<_> = earlier.security_log().cloned().collect();

        let mut auth = Auth::new();
        let _ = auth.login("gm", "wrong", Role::Gm, start + Duration::minutes(10));
        auth.restore_security_log(saved.clone());
        // Restoring twice adds nothing
        auth.restore_security_log(saved);

        let kinds: Vec<_> = auth.security_log().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SecurityEventKind::LoginFailed,
                SecurityEventKind::Logout,
                SecurityEventKind::Login
            ]
        );
    }

    #[test]
    fn test_restored_security_log_is_bounded() {
        let start = Utc::now();
        let events: Vec<_> = (0..(SECURITY_LOG_LIMIT as i64 + 5))
            .map(|i| SecurityEvent {
                timestamp: start + Duration::seconds(i),
                kind: SecurityEventKind::LoginFailed,
                username: "jon".to_string(),
                role: Some(Role::Player),
                actor: None,
            })
            .collect();

        let mut auth = Auth::new();
        auth.restore_security_log(events);
        assert_eq!(auth.security_log().count(), SECURITY_LOG_LIMIT);
        let newest = auth.security_log().next().unwrap();
        assert_eq!(newest.timestamp, start + Duration::seconds(SECURITY_LOG_LIMIT as i64 + 4));
    }

    #[test]
    fn test_session_expiry() {
        let auth = gm_auth();
        let then = Utc::now();
        let session = auth.session(then).unwrap();

        let mut fresh = Auth::new();
        assert_eq!(
            fresh
                .restore_session(session.clone(), then + Duration::hours(25))
                .unwrap_err(),
            AuthError::SessionExpired
        );

        let user = fresh
            .restore_session(session, then + Duration::hours(23))
            .unwrap();
        assert_eq!(user.role, Role::Gm);
        assert!(fresh.is_gm());
    }

    #[test]
    fn test_restored_session_cannot_raise_role() {
        let now = Utc::now();
        let forged = AuthSession {
            user: CurrentUser {
                username: "jon".to_string(),
                display_name: "Jon".to_string(),
                role: Role::Gm,
                login_time: now,
            },
            role: Role::Gm,
            timestamp: now,
        };

        let mut auth = Auth::new();
        assert_eq!(
            auth.restore_session(forged.clone(), now).unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert!(!auth.is_logged_in());
        assert!(!auth.is_gm());
        assert!(auth.require_gm("remove NPCs").is_err());

        // The outer role alone is checked too
        let mixed = AuthSession {
            user: CurrentUser {
                role: Role::Player,
                ..forged.user.clone()
            },
            ..forged
        };
        assert_eq!(
            auth.restore_session(mixed, now).unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert!(!auth.is_logged_in());
    }

    #[test]
    fn test_restored_session_uses_account_role() {
        let mut player = Auth::new();
        player.login("jon", "bastion2024", Role::Player, Utc::now()).unwrap();
        let session = player.session(Utc::now()).unwrap();

        let mut fresh = Auth::new();
        let user = fresh.restore_session(session, Utc::now()).unwrap();
        assert_eq!(user.role, Role::Player);
        assert!(fresh.is_player());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("GM".parse::<Role>(), Ok(Role::Gm));
        assert!("admin".parse::<Role>().is_err());
    }
}
