use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Visibility::Public => Visibility::Private,
            Visibility::Private => Visibility::Public,
        }
    }
}

/// Public view of an account, safe to embed in other documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// A movie embedded in a watchlist. `tmdb_id` is unique per watchlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieEntry {
    pub tmdb_id: i64,
    pub title: Option<String>,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
    pub overview: Option<String>,
    pub trailer_key: Option<String>,
    pub added_by: Uuid,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watchlist {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub owner: UserSummary,
    pub members: Vec<Uuid>,
    pub movies: Vec<MovieEntry>,
    pub invite_code: Option<String>,
    pub party_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Watchlist {
    pub fn is_owner(&self, user_id: Uuid) -> bool {
        self.owner.id == user_id
    }

    /// The owner counts as a member even when absent from `members`.
    pub fn is_owner_or_member(&self, user_id: Uuid) -> bool {
        self.is_owner(user_id) || self.members.contains(&user_id)
    }

    /// Public lists are visible to everyone, private ones only to owner and members.
    pub fn is_visible_to(&self, user_id: Option<Uuid>) -> bool {
        match self.visibility {
            Visibility::Public => true,
            Visibility::Private => user_id.is_some_and(|uid| self.is_owner_or_member(uid)),
        }
    }

    pub fn has_movie(&self, tmdb_id: i64) -> bool {
        self.movies.iter().any(|m| m.tmdb_id == tmdb_id)
    }
}

/// Persisted chat line. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub watchlist_id: Uuid,
    /// Absent for guest connections.
    pub user_id: Option<Uuid>,
    pub username: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watchlist(owner: Uuid, members: Vec<Uuid>, visibility: Visibility) -> Watchlist {
        let now = Utc::now();
        Watchlist {
            id: Uuid::new_v4(),
            title: "Friday Night".into(),
            description: None,
            visibility,
            owner: UserSummary {
                id: owner,
                username: "alice".into(),
                avatar_url: None,
            },
            members,
            movies: vec![],
            invite_code: None,
            party_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn owner_is_member_even_when_not_listed() {
        let owner = Uuid::new_v4();
        let wl = watchlist(owner, vec![], Visibility::Private);
        assert!(wl.is_owner_or_member(owner));
        assert!(!wl.is_owner_or_member(Uuid::new_v4()));
    }

    #[test]
    fn private_list_hidden_from_strangers_and_guests() {
        let owner = Uuid::new_v4();
        let member = Uuid::new_v4();
        let wl = watchlist(owner, vec![owner, member], Visibility::Private);

        assert!(wl.is_visible_to(Some(owner)));
        assert!(wl.is_visible_to(Some(member)));
        assert!(!wl.is_visible_to(Some(Uuid::new_v4())));
        assert!(!wl.is_visible_to(None));
    }

    #[test]
    fn public_list_visible_to_guests() {
        let wl = watchlist(Uuid::new_v4(), vec![], Visibility::Public);
        assert!(wl.is_visible_to(None));
    }

    #[test]
    fn visibility_wire_names() {
        assert_eq!(serde_json::to_string(&Visibility::Public).unwrap(), "\"public\"");
        assert_eq!(Visibility::parse("private"), Some(Visibility::Private));
        assert_eq!(Visibility::parse("secret"), None);
        assert_eq!(Visibility::Private.flipped(), Visibility::Public);
    }
}
