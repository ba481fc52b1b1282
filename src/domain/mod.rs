pub mod entities;
pub mod slug;

pub use entities::{Comment, CommentDraft, Post};
