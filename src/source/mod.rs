//! Content source abstraction
//!
//! A source is a wiki made of spaces, pages and page attachments. The
//! reconciler and the retrieval engine only see the [`ContentSource`] trait;
//! response-shape differences are normalized by the implementation.

mod confluence;

pub use confluence::*;

use crate::error::Result;
use crate::extract::AttachmentFormat;
use crate::metadata::{self, Metadata};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// Kind of content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Page,
    Attachment,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Page => "page",
            ContentKind::Attachment => "attachment",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One addressable unit of source content, ready to chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    pub id: String,
    pub kind: ContentKind,
    pub title: String,
    pub space: String,
    /// Owning page (attachments only)
    pub parent_id: Option<String>,
    /// Timestamp as reported by the source, compared verbatim
    pub last_modified: String,
    /// Ancestor titles, root first
    pub hierarchy_path: Vec<String>,
    pub raw_text: String,
    pub link: String,
    pub source_url: String,
    /// Lowercase extension without the dot (attachments only)
    pub file_type: Option<String>,
    /// Any further source metadata
    pub extra: Map<String, Value>,
}

impl ContentItem {
    pub fn is_attachment(&self) -> bool {
        self.kind == ContentKind::Attachment
    }

    /// Build a page item from fetched content
    pub fn page(content: PageContent, hierarchy_path: Vec<String>) -> Self {
        Self {
            id: content.id,
            kind: ContentKind::Page,
            title: content.title,
            space: content.space,
            parent_id: None,
            last_modified: content.last_modified,
            hierarchy_path,
            raw_text: content.text,
            link: content.link,
            source_url: content.source_url,
            file_type: None,
            extra: Map::new(),
        }
    }

    /// Build an attachment item hanging off `page`
    pub fn attachment(
        descriptor: &AttachmentDescriptor,
        page: &ContentItem,
        link: String,
        text: String,
    ) -> Self {
        let mut hierarchy_path = page.hierarchy_path.clone();
        hierarchy_path.push(page.title.clone());

        let mut extra = Map::new();
        extra.insert(
            metadata::PAGE_LAST_MODIFIED.to_string(),
            Value::String(page.last_modified.clone()),
        );
        if let Some(media_type) = &descriptor.media_type {
            extra.insert("media_type".to_string(), Value::String(media_type.clone()));
        }

        Self {
            id: descriptor.id.clone(),
            kind: ContentKind::Attachment,
            title: descriptor.title.clone(),
            space: page.space.clone(),
            parent_id: Some(page.id.clone()),
            last_modified: descriptor.last_modified.clone(),
            hierarchy_path,
            raw_text: text,
            link,
            source_url: descriptor.source_url.clone(),
            file_type: descriptor.extension(),
            extra,
        }
    }

    /// Sanitized metadata shared by every chunk of this item
    pub fn base_metadata(&self) -> Metadata {
        let mut map = self.extra.clone();
        map.insert(metadata::CONTENT_ID.into(), Value::String(self.id.clone()));
        map.insert(metadata::KIND.into(), Value::String(self.kind.as_str().into()));
        map.insert(metadata::TITLE.into(), Value::String(self.title.clone()));
        map.insert(metadata::LINK.into(), Value::String(self.link.clone()));
        map.insert(metadata::SOURCE_URL.into(), Value::String(self.source_url.clone()));
        map.insert(metadata::SPACE.into(), Value::String(self.space.clone()));
        map.insert(
            metadata::LAST_MODIFIED.into(),
            Value::String(self.last_modified.clone()),
        );
        map.insert(metadata::IS_ATTACHMENT.into(), Value::Bool(self.is_attachment()));
        map.insert(
            metadata::HIERARCHY.into(),
            Value::Array(
                self.hierarchy_path
                    .iter()
                    .cloned()
                    .map(Value::String)
                    .collect(),
            ),
        );
        if let Some(parent_id) = &self.parent_id {
            map.insert(metadata::PARENT_ID.into(), Value::String(parent_id.clone()));
        }
        if let Some(file_type) = &self.file_type {
            map.insert(metadata::FILE_TYPE.into(), Value::String(file_type.clone()));
        }

        metadata::sanitize(map)
    }
}

/// Minimal page record from a modified-since search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSummary {
    pub id: String,
    pub title: String,
    pub last_modified: String,
}

/// Full page content
#[derive(Debug, Clone, PartialEq)]
pub struct PageContent {
    pub id: String,
    pub kind: ContentKind,
    pub title: String,
    /// Plain text converted from the storage format
    pub text: String,
    pub last_modified: String,
    pub link: String,
    pub source_url: String,
    pub space: String,
}

/// Direct child page reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRef {
    pub id: String,
    pub title: String,
}

/// Attachment listing entry, normalized across response shapes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentDescriptor {
    pub id: String,
    /// File name
    pub title: String,
    /// Download path, absolute or relative to the wiki root
    pub download: Option<String>,
    pub last_modified: String,
    pub source_url: String,
    pub media_type: Option<String>,
}

impl AttachmentDescriptor {
    /// Lowercase file extension without the dot
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.title)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    /// Supported extraction format, if any
    pub fn format(&self) -> Option<AttachmentFormat> {
        self.extension()
            .and_then(|ext| AttachmentFormat::from_extension(&ext))
    }
}

/// Trait for wiki content sources
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Ids of every page currently in `space`
    async fn list_ids(&self, space: &str) -> Result<HashSet<String>>;

    /// Pages in `space` modified at or after `since`
    async fn list_modified_since(
        &self,
        space: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PageSummary>>;

    /// Page content and metadata
    async fn fetch_content(&self, id: &str) -> Result<PageContent>;

    /// Ancestor titles of a page, root first
    async fn fetch_hierarchy(&self, id: &str) -> Result<Vec<String>>;

    /// Direct child pages
    async fn fetch_children(&self, id: &str) -> Result<Vec<ChildRef>>;

    /// Attachments of a page
    async fn fetch_attachments(&self, id: &str) -> Result<Vec<AttachmentDescriptor>>;

    /// Raw attachment bytes
    async fn fetch_attachment_bytes(&self, attachment: &AttachmentDescriptor) -> Result<Vec<u8>>;

    /// Browser link for an attachment
    fn attachment_link(&self, attachment: &AttachmentDescriptor) -> String {
        attachment.download.clone().unwrap_or_default()
    }
}
