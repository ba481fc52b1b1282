//! Versioned document codec: one post (with embedded comments) per TOML file.
//!
//! The codec is pure and performs no I/O. Defaulting rules are part of the
//! contract: optional fields absent from older documents decode to stated
//! defaults, while a present-but-malformed timestamp is an error.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{
    OffsetDateTime, PrimitiveDateTime,
    format_description::FormatItem,
    macros::{datetime, format_description},
};

use crate::domain::{Comment, Post};

/// Highest document schema version this codec understands.
pub const SCHEMA_VERSION: u32 = 1;

/// Fixed on-disk timestamp format, interpreted as UTC.
pub const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Comments written by tooling that predates the `date` field decode to this.
const FALLBACK_COMMENT_DATE: OffsetDateTime = datetime!(2000-01-01 0:00 UTC);

/// Errors that can occur while parsing a stored document.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("document is not valid TOML: {0}")]
    Syntax(#[from] toml::de::Error),
    #[error("document field `{field}` is missing")]
    MissingField { field: &'static str },
    #[error("document field `{field}` holds malformed timestamp `{value}`")]
    Timestamp { field: &'static str, value: String },
    #[error("document schema version {version} is newer than this codec supports")]
    UnsupportedVersion { version: u32 },
}

/// Errors that can occur while producing a stored document.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to serialise document: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

/// Produce the stored representation of a post. The post id is not written
/// into the body; the file name is the key.
pub fn encode(post: &Post) -> Result<String, EncodeError> {
    let raw = RawDocument {
        version: SCHEMA_VERSION,
        title: post.title.clone(),
        slug: post.slug.clone(),
        pub_date: Some(format_timestamp(post.pub_date)?),
        last_modified: Some(format_timestamp(post.last_modified)?),
        excerpt: post.excerpt.clone(),
        content: post.content.clone(),
        is_published: Some(post.is_published),
        categories: post.categories.clone(),
        comments: post
            .comments
            .iter()
            .map(|comment| {
                Ok(RawComment {
                    id: comment.id.clone(),
                    author: comment.author.clone(),
                    email: comment.email.clone(),
                    date: Some(format_timestamp(comment.pub_date)?),
                    content: comment.content.clone(),
                    is_admin: comment.is_admin,
                })
            })
            .collect::<Result<Vec<_>, EncodeError>>()?,
    };

    Ok(toml::to_string_pretty(&raw)?)
}

/// Parse a stored document back into a post. `id` is the file-name key the
/// document was stored under.
pub fn decode(id: &str, input: &str) -> Result<Post, DecodeError> {
    let raw: RawDocument = toml::from_str(input)?;

    if raw.version > SCHEMA_VERSION {
        return Err(DecodeError::UnsupportedVersion {
            version: raw.version,
        });
    }

    let pub_date = match raw.pub_date {
        Some(value) => parse_timestamp(&value, "pub_date")?,
        None => return Err(DecodeError::MissingField { field: "pub_date" }),
    };
    let last_modified = match raw.last_modified {
        Some(value) => parse_timestamp(&value, "last_modified")?,
        None => OffsetDateTime::now_utc(),
    };

    let comments = raw
        .comments
        .into_iter()
        .map(|comment| {
            let pub_date = match comment.date {
                Some(value) => parse_timestamp(&value, "date")?,
                None => FALLBACK_COMMENT_DATE,
            };
            Ok(Comment {
                id: comment.id,
                author: comment.author,
                email: comment.email,
                content: comment.content,
                pub_date,
                is_admin: comment.is_admin,
            })
        })
        .collect::<Result<Vec<_>, DecodeError>>()?;

    Ok(Post {
        id: id.to_string(),
        slug: raw.slug.to_lowercase(),
        title: raw.title,
        excerpt: raw.excerpt,
        content: raw.content,
        pub_date,
        last_modified,
        is_published: raw.is_published.unwrap_or(true),
        categories: raw.categories,
        comments,
    })
}

fn format_timestamp(value: OffsetDateTime) -> Result<String, time::error::Format> {
    value.format(TIMESTAMP_FORMAT)
}

fn parse_timestamp(value: &str, field: &'static str) -> Result<OffsetDateTime, DecodeError> {
    PrimitiveDateTime::parse(value, TIMESTAMP_FORMAT)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|_| DecodeError::Timestamp {
            field,
            value: value.to_string(),
        })
}

fn default_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Debug, Serialize, Deserialize)]
struct RawDocument {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    title: String,
    #[serde(default)]
    slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_modified: Option<String>,
    #[serde(default)]
    excerpt: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_published: Option<bool>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    comments: Vec<RawComment>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawComment {
    #[serde(default)]
    id: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    is_admin: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_post() -> Post {
        Post {
            id: "a1b2c3".to_string(),
            slug: "first-light".to_string(),
            title: "First Light".to_string(),
            excerpt: "An opening note".to_string(),
            content: "<p>Hello</p>".to_string(),
            pub_date: datetime!(2026-03-01 09:30:00 UTC),
            last_modified: datetime!(2026-03-02 10:00:00 UTC),
            is_published: true,
            categories: vec!["Rust".to_string(), "notes".to_string()],
            comments: vec![Comment {
                id: "c-1".to_string(),
                author: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                content: "Lovely.".to_string(),
                pub_date: datetime!(2026-03-01 12:00:00 UTC),
                is_admin: false,
            }],
        }
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let post = sample_post();
        let encoded = encode(&post).expect("encode");
        let decoded = decode(&post.id, &encoded).expect("decode");

        assert_eq!(decoded, post);
    }

    #[test]
    fn missing_optional_fields_apply_defaults() {
        let input = r#"
title = "Bare"
pub_date = "2026-01-01 08:00:00"
"#;
        let post = decode("bare-id", input).expect("decode");

        assert_eq!(post.id, "bare-id");
        assert!(post.is_published);
        assert!(post.categories.is_empty());
        assert!(post.comments.is_empty());
        assert!(post.slug.is_empty());
        // last_modified defaulted to "now"; just confirm it is recent-ish.
        assert!(post.last_modified >= post.pub_date);
    }

    #[test]
    fn slug_is_lowercased_on_decode() {
        let input = r#"
title = "Mixed"
slug = "Mixed-Case"
pub_date = "2026-01-01 08:00:00"
"#;
        let post = decode("x", input).expect("decode");
        assert_eq!(post.slug, "mixed-case");
    }

    #[test]
    fn missing_pub_date_is_an_error() {
        let err = decode("x", "title = \"No date\"\n").expect_err("missing field");
        assert!(matches!(
            err,
            DecodeError::MissingField { field: "pub_date" }
        ));
    }

    #[test]
    fn malformed_timestamp_is_distinct_from_missing() {
        let input = r#"
title = "Bad clock"
pub_date = "March 1st, 2026"
"#;
        let err = decode("x", input).expect_err("malformed timestamp");
        assert!(matches!(
            err,
            DecodeError::Timestamp {
                field: "pub_date",
                ..
            }
        ));
    }

    #[test]
    fn comment_defaults_apply() {
        let input = r#"
title = "With comment"
pub_date = "2026-01-01 08:00:00"

[[comments]]
author = "Ada"
content = "Hi"
"#;
        let post = decode("x", input).expect("decode");
        let comment = &post.comments[0];

        assert!(!comment.is_admin);
        assert!(comment.id.is_empty());
        assert_eq!(comment.pub_date, FALLBACK_COMMENT_DATE);
    }

    #[test]
    fn newer_schema_versions_are_rejected() {
        let input = r#"
version = 2
title = "From the future"
pub_date = "2026-01-01 08:00:00"
"#;
        let err = decode("x", input).expect_err("unsupported version");
        assert!(matches!(err, DecodeError::UnsupportedVersion { version: 2 }));
    }

    #[test]
    fn syntax_errors_surface_as_decode_errors() {
        let err = decode("x", "title = ").expect_err("syntax");
        assert!(matches!(err, DecodeError::Syntax(_)));
    }
}
