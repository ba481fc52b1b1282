//! The content store: durable post documents plus an in-memory index.
//!
//! One TOML document per post lives under the content root, named by the
//! post id. At startup every document is decoded into the index; afterwards
//! reads are served entirely from index snapshots, and every mutation
//! rewrites the affected document atomically (temp file + rename) before
//! updating the index to match. A store-wide write gate serializes the
//! read-modify-write sequences so concurrent mutations never lose updates.

pub mod codec;
mod error;
mod index;

pub use codec::{DecodeError, EncodeError, SCHEMA_VERSION, TIMESTAMP_FORMAT};
pub use error::StoreError;

use std::io::Write;
use std::path::PathBuf;

use time::OffsetDateTime;
use tokio::{fs, sync::Mutex, task};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ContentSettings;
use crate::domain::{Comment, CommentDraft, Post, slug};
use crate::infra::attachments::AttachmentStore;
use index::IndexCache;

/// File extension for post documents under the content root.
pub const DOCUMENT_EXTENSION: &str = "toml";

/// Façade over the document codec, the index, and attachment storage. The
/// only component external collaborators talk to.
///
/// The store performs no authentication: every read takes a caller-supplied
/// `is_admin` flag and uses it purely for visibility filtering.
pub struct ContentStore {
    root: PathBuf,
    index: IndexCache,
    attachments: AttachmentStore,
    write_gate: Mutex<()>,
}

impl ContentStore {
    /// Open the store: create the content root if missing, decode every
    /// document into the index, and prepare attachment storage.
    ///
    /// A corrupt document is skipped and logged rather than aborting the
    /// load; the store starts with whatever decoded cleanly.
    pub async fn open(settings: &ContentSettings) -> Result<Self, StoreError> {
        fs::create_dir_all(&settings.root).await?;
        let attachments =
            AttachmentStore::new(settings.root.clone(), settings.public_prefix.clone())?;

        let store = Self {
            root: settings.root.clone(),
            index: IndexCache::new(),
            attachments,
            write_gate: Mutex::new(()),
        };
        store.load_documents().await?;
        Ok(store)
    }

    /// Visible posts, newest first, paginated.
    pub fn list(&self, limit: usize, offset: usize, is_admin: bool) -> Vec<Post> {
        let now = OffsetDateTime::now_utc();
        self.index
            .query(|post| post.is_visible(is_admin, now), offset, limit)
    }

    /// Visible posts carrying the category, matched case-insensitively.
    pub fn list_by_category(&self, category: &str, is_admin: bool) -> Vec<Post> {
        let now = OffsetDateTime::now_utc();
        self.index.query(
            |post| post.is_visible(is_admin, now) && post.has_category(category),
            0,
            usize::MAX,
        )
    }

    /// First post whose slug matches, case-insensitively. Slug uniqueness is
    /// not enforced by the store, so duplicate slugs resolve to the newest
    /// match in index order.
    pub fn get_by_slug(&self, slug: &str, is_admin: bool) -> Result<Post, StoreError> {
        let now = OffsetDateTime::now_utc();
        self.index
            .snapshot()
            .iter()
            .find(|post| post.slug.eq_ignore_ascii_case(slug))
            .filter(|post| post.is_visible(is_admin, now))
            .map(|post| (**post).clone())
            .ok_or(StoreError::NotFound)
    }

    /// Post by id, subject to the visibility filter.
    pub fn get_by_id(&self, id: &str, is_admin: bool) -> Result<Post, StoreError> {
        let now = OffsetDateTime::now_utc();
        self.index
            .snapshot()
            .iter()
            .find(|post| post.matches_id(id))
            .filter(|post| post.is_visible(is_admin, now))
            .map(|post| (**post).clone())
            .ok_or(StoreError::NotFound)
    }

    /// Distinct lowercase categories across posts visible to the caller,
    /// in index (newest-post-first) encounter order.
    pub fn list_categories(&self, is_admin: bool) -> Vec<String> {
        let now = OffsetDateTime::now_utc();
        let snapshot = self.index.snapshot();

        let mut seen = Vec::new();
        for post in snapshot.iter() {
            if !post.is_visible(is_admin, now) {
                continue;
            }
            for category in &post.categories {
                let canonical = category.trim().to_lowercase();
                if !canonical.is_empty() && !seen.contains(&canonical) {
                    seen.push(canonical);
                }
            }
        }
        seen
    }

    /// Persist a post: assign an id on first save, derive a slug from the
    /// title when none is supplied, stamp `last_modified`, write the
    /// document atomically, then update the index. Returns the saved post
    /// with the generated fields populated.
    pub async fn save(&self, mut post: Post) -> Result<Post, StoreError> {
        validate_post(&post)?;

        let _gate = self.write_gate.lock().await;
        self.persist(&mut post).await?;
        Ok(post)
    }

    /// Remove the document and the index entry. Idempotent: a missing file
    /// or an already-removed entry is not an error.
    pub async fn delete(&self, post: &Post) -> Result<(), StoreError> {
        let _gate = self.write_gate.lock().await;

        let path = self.document_path(&post.id);
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        self.index.remove(&post.id);
        debug!(id = %post.id, "deleted document");
        Ok(())
    }

    /// Append a comment to the post with the given id, assigning a fresh
    /// comment id and timestamp, and persist the rewritten document.
    ///
    /// The post is re-read from the index under the write gate, so two
    /// concurrent additions to the same post both land. Visibility is not
    /// consulted: unpublished posts may receive comments through this path;
    /// whether they should is the caller's policy.
    pub async fn add_comment(
        &self,
        post_id: &str,
        draft: CommentDraft,
    ) -> Result<Comment, StoreError> {
        validate_comment(&draft)?;

        let _gate = self.write_gate.lock().await;
        let mut post = self.latest_by_id(post_id)?;

        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            author: draft.author.trim().to_string(),
            email: draft.email.trim().to_string(),
            content: draft.content.trim().to_string(),
            pub_date: OffsetDateTime::now_utc(),
            is_admin: draft.is_admin,
        };
        post.comments.push(comment.clone());
        self.persist(&mut post).await?;
        Ok(comment)
    }

    /// Remove a comment by case-insensitive id match and persist the
    /// rewritten document. An absent comment (or post) is `NotFound`.
    pub async fn remove_comment(&self, post_id: &str, comment_id: &str) -> Result<(), StoreError> {
        let _gate = self.write_gate.lock().await;
        let mut post = self.latest_by_id(post_id)?;

        let before = post.comments.len();
        post.comments
            .retain(|comment| !comment.id.eq_ignore_ascii_case(comment_id));
        if post.comments.len() == before {
            return Err(StoreError::NotFound);
        }

        self.persist(&mut post).await?;
        Ok(())
    }

    /// Attachment storage rooted at the same content root.
    pub fn attachments(&self) -> &AttachmentStore {
        &self.attachments
    }

    /// Latest indexed state of a post, ignoring visibility. Mutation paths
    /// start from this rather than a caller-held clone so stale copies
    /// cannot overwrite newer comments.
    fn latest_by_id(&self, id: &str) -> Result<Post, StoreError> {
        self.index
            .snapshot()
            .iter()
            .find(|post| post.matches_id(id))
            .map(|post| (**post).clone())
            .ok_or(StoreError::NotFound)
    }

    // Caller must hold the write gate.
    async fn persist(&self, post: &mut Post) -> Result<(), StoreError> {
        if post.id.trim().is_empty() {
            post.id = Uuid::new_v4().to_string();
        }

        post.title = post.title.trim().to_string();
        post.excerpt = post.excerpt.trim().to_string();
        post.content = post.content.trim().to_string();

        let trimmed_slug = post.slug.trim();
        post.slug = if trimmed_slug.is_empty() {
            // A title made entirely of non-slug characters falls back to the
            // id so the post still has a usable public link.
            slug::derive_slug(&post.title).unwrap_or_else(|_| post.id.clone())
        } else {
            trimmed_slug.to_lowercase()
        };

        post.categories = canonical_categories(&post.categories);
        post.last_modified = OffsetDateTime::now_utc();

        let encoded = codec::encode(post)?;
        self.write_document(&post.id, encoded).await?;
        self.index.upsert(post.clone());
        debug!(id = %post.id, slug = %post.slug, "persisted document");
        Ok(())
    }

    /// Write to a temp file in the content root and rename over the target,
    /// so a crash mid-write never leaves a truncated document visible.
    async fn write_document(&self, id: &str, contents: String) -> Result<(), StoreError> {
        let root = self.root.clone();
        let target = self.document_path(id);

        task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut file = tempfile::NamedTempFile::new_in(&root)?;
            file.write_all(contents.as_bytes())?;
            file.as_file().sync_all()?;
            file.persist(&target)
                .map_err(|err| StoreError::Io(err.error))?;
            Ok(())
        })
        .await
        .map_err(|err| StoreError::Io(std::io::Error::other(err)))?
    }

    async fn load_documents(&self) -> Result<(), StoreError> {
        let mut posts = Vec::new();

        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(DOCUMENT_EXTENSION) {
                continue;
            }

            // A corrupt document must not prevent startup; anything else
            // (unreadable directory, I/O failure) still aborts the load.
            match self.read_document(&path).await {
                Ok(post) => posts.push(post),
                Err(StoreError::Decode { path, source }) => {
                    warn!(path = %path.display(), error = %source, "skipping corrupt document");
                }
                Err(err) => return Err(err),
            }
        }

        debug!(count = posts.len(), "loaded documents into index");
        self.index.load(posts);
        Ok(())
    }

    /// Read and decode a single document from disk. Unlike the bulk startup
    /// load, a decode failure here is fatal for the operation.
    async fn read_document(&self, path: &std::path::Path) -> Result<Post, StoreError> {
        let id = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| {
                StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "document file name is not valid UTF-8",
                ))
            })?;

        let contents = fs::read_to_string(path).await?;
        codec::decode(id, &contents).map_err(|source| StoreError::decode(path, source))
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.{DOCUMENT_EXTENSION}"))
    }
}

fn validate_post(post: &Post) -> Result<(), StoreError> {
    if post.title.trim().is_empty() {
        return Err(StoreError::validation("post title must not be empty"));
    }
    Ok(())
}

fn validate_comment(draft: &CommentDraft) -> Result<(), StoreError> {
    if draft.author.trim().is_empty() {
        return Err(StoreError::validation("comment author must not be empty"));
    }
    if draft.email.trim().is_empty() {
        return Err(StoreError::validation("comment email must not be empty"));
    }
    if draft.content.trim().is_empty() {
        return Err(StoreError::validation("comment content must not be empty"));
    }
    Ok(())
}

fn canonical_categories(categories: &[String]) -> Vec<String> {
    let mut canonical = Vec::with_capacity(categories.len());
    for category in categories {
        let lowered = category.trim().to_lowercase();
        if !lowered.is_empty() && !canonical.contains(&lowered) {
            canonical.push(lowered);
        }
    }
    canonical
}
