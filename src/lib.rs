//! foglio is a small file-backed content store for self-hosted blogs.
//!
//! Posts (each with embedded comments) are persisted as one TOML document
//! per post under a content root, mirrored by an in-memory index that is
//! rebuilt at startup and kept in step with every mutation. Reads are
//! served from immutable index snapshots and filtered by a caller-supplied
//! admin flag; writes are serialized through a store-wide gate and hit the
//! disk atomically. Binary attachments live under the same root with
//! collision-free names.
//!
//! HTTP routing, rendering, authentication, and feeds are deliberately out
//! of scope: callers bring their own and talk to [`store::ContentStore`].
//!
//! ```no_run
//! use foglio::{config, store::ContentStore, domain::Post};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = config::load()?;
//! let store = ContentStore::open(&settings.content).await?;
//!
//! let saved = store.save(Post::draft("Hello, World!", "<p>hi</p>")).await?;
//! assert_eq!(saved.slug, "hello-world");
//!
//! let visible = store.list(10, 0, false);
//! # let _ = visible;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod infra;
pub mod store;

pub use domain::{Comment, CommentDraft, Post};
pub use store::{ContentStore, StoreError};
