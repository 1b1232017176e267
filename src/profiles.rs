//! User profiles and demo login

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Result, SpaceError};
use crate::events::{EventBus, SpaceEvent};
use crate::geo::Coordinate;

/// Fixed accounts accepted by [`ProfileStore::login`]
const DEMO_ACCOUNTS: [(&str, &str); 5] = [
    ("demo", "demo123"),
    ("user1", "password1"),
    ("user2", "password2"),
    ("alice", "alice123"),
    ("bob", "bob123"),
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDraft {
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub verification_photo: Option<String>,
    #[serde(default)]
    pub location: Option<Coordinate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: u64,
    pub username: String,
    pub display_name: String,
    pub bio: String,
    pub verification_photo: Option<String>,
    pub location: Option<Coordinate>,
    pub verified: bool,
    pub level: u32,
    pub points: u64,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub id: u64,
    pub username: String,
    pub display_name: String,
    pub verified: bool,
    pub level: u32,
    pub points: u64,
}

impl From<&Profile> for ProfileSummary {
    fn from(p: &Profile) -> Self {
        Self {
            id: p.id,
            username: p.username.clone(),
            display_name: p.display_name.clone(),
            verified: p.verified,
            level: p.level,
            points: p.points,
        }
    }
}

/// Authenticated identity, without credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginUser {
    pub id: String,
    pub username: String,
}

/// Profiles keyed by username
pub struct ProfileStore {
    profiles: DashMap<String, Profile>,
    next_id: AtomicU64,
    events: Arc<EventBus>,
}

impl ProfileStore {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            profiles: DashMap::new(),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    /// Create a profile; usernames are unique
    pub fn create(&self, draft: ProfileDraft) -> Result<Profile> {
        let username = draft.username.trim().to_string();
        if username.is_empty() {
            return Err(SpaceError::InvalidInput("username is required".into()));
        }
        if let Some(location) = &draft.location {
            location.validate()?;
        }

        let profile = match self.profiles.entry(username.clone()) {
            Entry::Occupied(_) => {
                return Err(SpaceError::Conflict(format!("username {username} already exists")));
            }
            Entry::Vacant(vacant) => {
                let now = Utc::now();
                let profile = Profile {
                    id: self.next_id.fetch_add(1, Ordering::Relaxed),
                    display_name: if draft.display_name.is_empty() {
                        username.clone()
                    } else {
                        draft.display_name
                    },
                    username,
                    bio: draft.bio,
                    verification_photo: draft.verification_photo,
                    location: draft.location,
                    verified: true,
                    level: 1,
                    points: 0,
                    created_at: now,
                    last_active: now,
                };
                vacant.insert(profile.clone());
                profile
            }
        };

        info!(id = profile.id, username = %profile.username, "Profile created");
        self.events.emit(SpaceEvent::ProfileCreated {
            id: profile.id,
            username: profile.username.clone(),
        });
        Ok(profile)
    }

    pub fn get(&self, username: &str) -> Option<Profile> {
        self.profiles.get(username).map(|p| p.value().clone())
    }

    /// Summaries in creation order
    pub fn list(&self) -> Vec<ProfileSummary> {
        let mut all: Vec<ProfileSummary> = self
            .profiles
            .iter()
            .map(|p| ProfileSummary::from(p.value()))
            .collect();
        all.sort_by_key(|p| p.id);
        all
    }

    /// Check credentials against the demo account table
    pub fn login(&self, username: &str, password: &str) -> Result<LoginUser> {
        if username.is_empty() || password.is_empty() {
            return Err(SpaceError::InvalidInput(
                "username and password are required".into(),
            ));
        }
        let known = DEMO_ACCOUNTS
            .iter()
            .any(|(user, pass)| *user == username && *pass == password);
        if !known {
            warn!(username = %username, "Login rejected");
            return Err(SpaceError::Auth("invalid username or password".into()));
        }
        Ok(LoginUser {
            id: username.to_string(),
            username: username.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ProfileStore {
        ProfileStore::new(Arc::new(EventBus::new()))
    }

    fn draft(username: &str) -> ProfileDraft {
        ProfileDraft {
            username: username.to_string(),
            display_name: String::new(),
            bio: "hi".into(),
            verification_photo: None,
            location: None,
        }
    }

    #[test]
    fn test_create_defaults() {
        let store = store();
        let p = store.create(draft("alice")).unwrap();
        assert_eq!(p.id, 1);
        assert_eq!(p.level, 1);
        assert_eq!(p.points, 0);
        assert!(p.verified);
        assert_eq!(p.display_name, "alice");
    }

    #[test]
    fn test_duplicate_username() {
        let store = store();
        store.create(draft("alice")).unwrap();
        assert!(matches!(store.create(draft("alice")), Err(SpaceError::Conflict(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_list_in_creation_order() {
        let store = store();
        for name in ["zed", "amy", "kim"] {
            store.create(draft(name)).unwrap();
        }
        let names: Vec<_> = store.list().into_iter().map(|p| p.username).collect();
        assert_eq!(names, vec!["zed", "amy", "kim"]);
    }

    #[test]
    fn test_login() {
        let store = store();
        let user = store.login("alice", "alice123").unwrap();
        assert_eq!(user.id, "alice");
        assert!(matches!(store.login("alice", "nope"), Err(SpaceError::Auth(_))));
        assert!(matches!(store.login("", "x"), Err(SpaceError::InvalidInput(_))));
    }
}
