//! Session registry and cosmetic identity generation.
//!
//! Display names and colors are derived from the client's random uuid, so
//! they are stable per session and collision-tolerant (two "Brave Foxes"
//! are allowed — the uuid is the identity, the name is decoration).

use std::collections::HashMap;
use std::time::SystemTime;

use uuid::Uuid;

use crate::protocol::UserInfo;

const ADJECTIVES: &[&str] = &[
    "Anonymous",
    "Brave",
    "Curious",
    "Daring",
    "Elegant",
    "Fearless",
    "Graceful",
    "Happy",
    "Inventive",
    "Jolly",
    "Kind",
    "Lively",
    "Mighty",
    "Noble",
    "Optimistic",
    "Playful",
    "Quick",
    "Radiant",
    "Swift",
    "Thoughtful",
    "Unique",
    "Vibrant",
    "Wise",
    "Zealous",
];

const ANIMALS: &[&str] = &[
    "Aardvark",
    "Badger",
    "Cheetah",
    "Dolphin",
    "Eagle",
    "Fox",
    "Giraffe",
    "Hedgehog",
    "Iguana",
    "Jaguar",
    "Koala",
    "Lemur",
    "Mongoose",
    "Narwhal",
    "Octopus",
    "Panda",
    "Quokka",
    "Raccoon",
    "Sloth",
    "Tiger",
    "Unicorn",
    "Vulture",
    "Walrus",
    "Xerus",
    "Yak",
    "Zebra",
];

const USER_COLORS: &[&str] = &[
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#FFA07A", "#98D8C8", "#F7DC6F", "#BB8FCE", "#85C1E2",
    "#F8B739", "#52B788", "#E84A5F", "#A8DADC", "#FF8B94", "#B4A7D6", "#FFD97D", "#AAF683",
    "#FF9FF3", "#54A0FF", "#48DBFB", "#FF6348",
];

impl UserInfo {
    /// Derive a display identity from a fresh client id.
    ///
    /// Different uuid bytes index the three tables independently so the
    /// combinations spread out; the uuid itself is v4-random.
    pub fn generate(client_id: Uuid) -> Self {
        let hash = client_id.as_u128();
        let adjective = ADJECTIVES[(hash % ADJECTIVES.len() as u128) as usize];
        let animal = ANIMALS[((hash >> 32) % ANIMALS.len() as u128) as usize];
        let color = USER_COLORS[((hash >> 64) % USER_COLORS.len() as u128) as usize];
        Self {
            client_id,
            name: format!("{adjective} {animal}"),
            color: color.to_string(),
        }
    }
}

/// A connected session as the registry sees it.
#[derive(Debug, Clone)]
pub struct Session {
    pub info: UserInfo,
    pub connected_at: SystemTime,
}

/// Tracks who is connected. The transport handle lives in the broadcast
/// dispatcher; this is identity only.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<Uuid, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, info: UserInfo) {
        self.sessions.insert(
            info.client_id,
            Session {
                info,
                connected_at: SystemTime::now(),
            },
        );
    }

    pub fn remove(&mut self, client_id: Uuid) -> Option<Session> {
        self.sessions.remove(&client_id)
    }

    pub fn get(&self, client_id: Uuid) -> Option<&Session> {
        self.sessions.get(&client_id)
    }

    pub fn display_name(&self, client_id: Uuid) -> Option<&str> {
        self.sessions.get(&client_id).map(|s| s.info.name.as_str())
    }

    /// All connected users, for SYNC_STATE's `allUsers`.
    pub fn users(&self) -> Vec<UserInfo> {
        self.sessions.values().map(|s| s.info.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_stable_per_id() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let a = UserInfo::generate(id);
        let b = UserInfo::generate(id);
        assert_eq!(a, b);
    }

    #[test]
    fn test_generate_name_and_color_from_tables() {
        let info = UserInfo::generate(Uuid::new_v4());
        let (adjective, animal) = info.name.split_once(' ').unwrap();
        assert!(ADJECTIVES.contains(&adjective));
        assert!(ANIMALS.contains(&animal));
        assert!(USER_COLORS.contains(&info.color.as_str()));
    }

    #[test]
    fn test_registry_insert_remove() {
        let mut registry = SessionRegistry::new();
        let info = UserInfo::generate(Uuid::new_v4());
        let id = info.client_id;

        registry.insert(info.clone());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.display_name(id), Some(info.name.as_str()));
        assert_eq!(registry.users(), vec![info]);

        let session = registry.remove(id).unwrap();
        assert_eq!(session.info.client_id, id);
        assert!(registry.is_empty());
        assert!(registry.display_name(id).is_none());
    }

    #[test]
    fn test_connected_at_is_recorded() {
        let mut registry = SessionRegistry::new();
        let info = UserInfo::generate(Uuid::new_v4());
        let id = info.client_id;
        registry.insert(info);
        assert!(registry.get(id).unwrap().connected_at <= SystemTime::now());
    }
}
