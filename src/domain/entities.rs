//! Content entities persisted by the store.

use serde::Serialize;
use time::OffsetDateTime;

/// A blog post together with its embedded comments.
///
/// A freshly-drafted post carries an empty `id`; the store assigns one on
/// first save and uses it as the on-disk file key from then on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub pub_date: OffsetDateTime,
    pub last_modified: OffsetDateTime,
    pub is_published: bool,
    pub categories: Vec<String>,
    pub comments: Vec<Comment>,
}

impl Post {
    /// Create an unsaved draft publishing immediately.
    pub fn draft(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: String::new(),
            slug: String::new(),
            title: title.into(),
            excerpt: String::new(),
            content: content.into(),
            pub_date: now,
            last_modified: now,
            is_published: true,
            categories: Vec::new(),
            comments: Vec::new(),
        }
    }

    /// Visibility predicate: future-dated and unpublished posts are hidden
    /// from non-admin callers.
    pub fn is_visible(&self, is_admin: bool, now: OffsetDateTime) -> bool {
        self.pub_date <= now && (self.is_published || is_admin)
    }

    /// Case-insensitive category membership.
    pub fn has_category(&self, category: &str) -> bool {
        let needle = category.to_lowercase();
        self.categories
            .iter()
            .any(|candidate| candidate.to_lowercase() == needle)
    }

    /// Ids are opaque but compared case-insensitively, so documents written
    /// by older tooling with uppercase GUIDs still resolve.
    pub fn matches_id(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id)
    }
}

/// A reader comment embedded in its parent post's document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub email: String,
    pub content: String,
    pub pub_date: OffsetDateTime,
    pub is_admin: bool,
}

/// Caller-supplied fields for a new comment. The store assigns the id and
/// timestamp and trims the text fields before persisting.
#[derive(Debug, Clone)]
pub struct CommentDraft {
    pub author: String,
    pub email: String,
    pub content: String,
    pub is_admin: bool,
}
