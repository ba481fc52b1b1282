//! In-memory index over every persisted post.
//!
//! The index holds an immutable snapshot behind a lock that is only ever
//! taken long enough to clone or swap an `Arc`. Readers iterate their
//! snapshot without blocking writers; writers build a fresh sorted vector
//! and swap it in whole, so a half-updated collection is never observable.
//! Mutations assume exclusive access, which the content store guarantees by
//! holding its write gate across every read-modify-write sequence.

use std::sync::{Arc, RwLock};

use crate::domain::Post;

pub(crate) type Snapshot = Arc<Vec<Arc<Post>>>;

#[derive(Debug, Default)]
pub(crate) struct IndexCache {
    snapshot: RwLock<Snapshot>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard existing contents and rebuild from decoded posts. Used once
    /// at startup.
    pub fn load(&self, posts: Vec<Post>) {
        let mut entries: Vec<Arc<Post>> = posts.into_iter().map(Arc::new).collect();
        sort_newest_first(&mut entries);
        self.swap(entries);
    }

    /// Current snapshot, sorted by `pub_date` descending.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.read().expect("index lock poisoned").clone()
    }

    /// Insert or replace by id, keeping the ordering invariant.
    pub fn upsert(&self, post: Post) {
        let current = self.snapshot();
        let mut entries: Vec<Arc<Post>> = current.iter().cloned().collect();
        match entries.iter().position(|entry| entry.matches_id(&post.id)) {
            Some(index) => entries[index] = Arc::new(post),
            None => entries.push(Arc::new(post)),
        }
        sort_newest_first(&mut entries);
        self.swap(entries);
    }

    /// Remove by id; absent ids are a no-op.
    pub fn remove(&self, id: &str) {
        let current = self.snapshot();
        let mut entries: Vec<Arc<Post>> = current.iter().cloned().collect();
        entries.retain(|entry| !entry.matches_id(id));
        self.swap(entries);
    }

    /// Filter the snapshot, then paginate. Never mutates the index.
    pub fn query<F>(&self, predicate: F, skip: usize, take: usize) -> Vec<Post>
    where
        F: Fn(&Post) -> bool,
    {
        self.snapshot()
            .iter()
            .filter(|entry| predicate(entry))
            .skip(skip)
            .take(take)
            .map(|entry| (**entry).clone())
            .collect()
    }

    fn swap(&self, entries: Vec<Arc<Post>>) {
        *self.snapshot.write().expect("index lock poisoned") = Arc::new(entries);
    }
}

// Stable sort: equal pub_dates keep their prior relative order.
fn sort_newest_first(entries: &mut [Arc<Post>]) {
    entries.sort_by(|left, right| right.pub_date.cmp(&left.pub_date));
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn post(id: &str, pub_date: time::OffsetDateTime) -> Post {
        let mut post = Post::draft(id, "body");
        post.id = id.to_string();
        post.pub_date = pub_date;
        post
    }

    #[test]
    fn load_sorts_newest_first() {
        let index = IndexCache::new();
        index.load(vec![
            post("old", datetime!(2026-01-01 00:00:00 UTC)),
            post("new", datetime!(2026-02-01 00:00:00 UTC)),
            post("mid", datetime!(2026-01-15 00:00:00 UTC)),
        ]);

        let ids: Vec<_> = index.snapshot().iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, ["new", "mid", "old"]);
    }

    #[test]
    fn upsert_replaces_in_place_and_reorders() {
        let index = IndexCache::new();
        index.load(vec![
            post("a", datetime!(2026-01-01 00:00:00 UTC)),
            post("b", datetime!(2026-02-01 00:00:00 UTC)),
        ]);

        let mut updated = post("a", datetime!(2026-03-01 00:00:00 UTC));
        updated.title = "promoted".to_string();
        index.upsert(updated);

        let snapshot = index.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, "a");
        assert_eq!(snapshot[0].title, "promoted");
    }

    #[test]
    fn remove_is_a_no_op_when_absent() {
        let index = IndexCache::new();
        index.load(vec![post("a", datetime!(2026-01-01 00:00:00 UTC))]);

        index.remove("missing");
        assert_eq!(index.snapshot().len(), 1);

        index.remove("A");
        assert!(index.snapshot().is_empty());
    }

    #[test]
    fn query_applies_predicate_then_pagination() {
        let index = IndexCache::new();
        index.load(
            (0..5)
                .map(|day| {
                    post(
                        &format!("p{day}"),
                        datetime!(2026-01-01 00:00:00 UTC) + time::Duration::days(day),
                    )
                })
                .collect(),
        );

        let page = index.query(|_| true, 1, 2);
        let ids: Vec<_> = page.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, ["p3", "p2"]);
    }

    #[test]
    fn readers_keep_their_snapshot_across_writes() {
        let index = IndexCache::new();
        index.load(vec![post("a", datetime!(2026-01-01 00:00:00 UTC))]);

        let before = index.snapshot();
        index.upsert(post("b", datetime!(2026-02-01 00:00:00 UTC)));

        assert_eq!(before.len(), 1);
        assert_eq!(index.snapshot().len(), 2);
    }
}
