//! Room members as the server describes them.

use serde::{Deserialize, Serialize};

use uw_socket::InboundEvent;

/// A user in the room. Identity is `user_id`; everything else may change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(default)]
    pub avatar: String,
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl User {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Fold an event about this user into it. Returns whether anything changed.
    pub fn apply(&mut self, event: &InboundEvent) -> bool {
        match event {
            InboundEvent::UserRenamed { user_id, username }
                if *user_id == self.user_id && *username != self.username =>
            {
                self.username = username.clone();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rena() -> User {
        User {
            user_id: "u1".into(),
            avatar: String::new(),
            username: "Rena".into(),
            roles: vec!["user".into(), "moderator".into()],
        }
    }

    #[test]
    fn test_deserialize_wire_shape() {
        let user: User =
            serde_json::from_str(r#"{"userID":"u1","username":"Rena","roles":["admin"]}"#)
                .unwrap();
        assert_eq!(user.user_id, "u1");
        assert!(user.avatar.is_empty());
        assert!(user.has_role("admin"));
    }

    #[test]
    fn test_apply_rename() {
        let mut user = rena();
        let renamed = InboundEvent::UserRenamed {
            user_id: "u1".into(),
            username: "Rena K".into(),
        };
        assert!(user.apply(&renamed));
        assert_eq!(user.username, "Rena K");
        assert!(!user.apply(&renamed));
    }

    #[test]
    fn test_apply_ignores_other_users_and_events() {
        let mut user = rena();
        assert!(!user.apply(&InboundEvent::UserRenamed {
            user_id: "u2".into(),
            username: "Someone".into(),
        }));
        assert!(!user.apply(&InboundEvent::UserLeft {
            user_id: "u1".into()
        }));
        assert_eq!(user, rena());
        assert!(user.has_role("moderator"));
        assert!(!user.has_role("admin"));
    }
}
