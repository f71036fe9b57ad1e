//! In-crate fakes for reconciler and answer engine tests

use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::extract::{AttachmentFormat, TextExtractor};
use crate::generate::Generator;
use crate::source::{
    AttachmentDescriptor, ChildRef, ContentKind, ContentSource, PageContent, PageSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

/// Deterministic bag-of-words embedder: texts sharing words score higher
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = blake3::hash(token.to_lowercase().as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&hash.as_bytes()[..8]);
            let slot = (u64::from_le_bytes(bytes) % self.dimension as u64) as usize;
            v[slot] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "hash-embedder"
    }
}

#[derive(Debug, Clone)]
pub struct FakeAttachment {
    pub id: String,
    pub title: String,
    pub bytes: Vec<u8>,
    pub last_modified: String,
}

impl FakeAttachment {
    pub fn new(id: &str, title: &str, body: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            bytes: body.as_bytes().to_vec(),
            last_modified: "2024-01-01T00:00:00Z".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakePage {
    pub id: String,
    pub title: String,
    pub space: String,
    pub parent: Option<String>,
    pub text: String,
    pub last_modified: String,
    pub attachments: Vec<FakeAttachment>,
}

impl FakePage {
    pub fn new(id: &str, space: &str, title: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            space: space.to_string(),
            parent: None,
            text: text.to_string(),
            last_modified: "2024-01-01T00:00:00Z".to_string(),
            attachments: Vec::new(),
        }
    }

    pub fn child_of(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn modified(mut self, last_modified: &str) -> Self {
        self.last_modified = last_modified.to_string();
        self
    }

    pub fn with_attachment(mut self, attachment: FakeAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

#[derive(Default)]
struct SourceState {
    pages: BTreeMap<String, FakePage>,
    failing_spaces: HashSet<String>,
    failing_children: HashSet<String>,
    failing_attachment_lists: HashSet<String>,
    transient: HashMap<String, u32>,
    broken: HashSet<String>,
    calls: HashMap<&'static str, u32>,
}

/// Scripted in-memory wiki with failure injection
#[derive(Default)]
pub struct ScriptedSource {
    state: Mutex<SourceState>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SourceState> {
        self.state.lock().unwrap()
    }

    pub fn add_page(&self, page: FakePage) {
        self.state().pages.insert(page.id.clone(), page);
    }

    pub fn remove_page(&self, id: &str) {
        self.state().pages.remove(id);
    }

    pub fn update_page(&self, id: &str, text: &str, last_modified: &str) {
        if let Some(page) = self.state().pages.get_mut(id) {
            page.text = text.to_string();
            page.last_modified = last_modified.to_string();
        }
    }

    /// Replace the attachments hanging off `id`
    pub fn set_attachments(&self, id: &str, attachments: Vec<FakeAttachment>) {
        if let Some(page) = self.state().pages.get_mut(id) {
            page.attachments = attachments;
        }
    }

    /// Every listing of `space` fails transiently
    pub fn fail_space(&self, space: &str) {
        self.state().failing_spaces.insert(space.to_string());
    }

    /// Child listing of `id` fails permanently
    pub fn fail_children(&self, id: &str) {
        self.state().failing_children.insert(id.to_string());
    }

    /// Attachment listing of `id` fails permanently
    pub fn fail_attachment_listing(&self, id: &str) {
        self.state().failing_attachment_lists.insert(id.to_string());
    }

    /// The next `times` content fetches of `id` fail transiently
    pub fn fail_transiently(&self, id: &str, times: u32) {
        self.state().transient.insert(id.to_string(), times);
    }

    /// Content fetches of `id` fail permanently
    pub fn break_page(&self, id: &str) {
        self.state().broken.insert(id.to_string());
    }

    pub fn calls(&self, op: &str) -> u32 {
        self.state().calls.get(op).copied().unwrap_or(0)
    }

    fn record(&self, op: &'static str) {
        *self.state().calls.entry(op).or_insert(0) += 1;
    }

    fn page(&self, id: &str) -> Result<FakePage> {
        let mut state = self.state();
        if state.broken.contains(id) {
            return Err(Error::SourcePermanent(format!("page {} is broken", id)));
        }
        if let Some(remaining) = state.transient.get_mut(id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::SourceTransient(format!("page {} timed out", id)));
            }
        }
        state
            .pages
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("page {}", id)))
    }

    fn check_space(&self, space: &str) -> Result<()> {
        if self.state().failing_spaces.contains(space) {
            return Err(Error::SourceTransient(format!("space {} unavailable", space)));
        }
        Ok(())
    }
}

pub fn page_link(id: &str) -> String {
    format!("https://wiki.test/pages/{}", id)
}

#[async_trait]
impl ContentSource for ScriptedSource {
    async fn list_ids(&self, space: &str) -> Result<HashSet<String>> {
        self.record("list_ids");
        self.check_space(space)?;
        Ok(self
            .state()
            .pages
            .values()
            .filter(|p| p.space == space)
            .map(|p| p.id.clone())
            .collect())
    }

    async fn list_modified_since(
        &self,
        space: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PageSummary>> {
        self.record("list_modified_since");
        self.check_space(space)?;
        Ok(self
            .state()
            .pages
            .values()
            .filter(|p| p.space == space)
            .filter(|p| match DateTime::parse_from_rfc3339(&p.last_modified) {
                Ok(ts) => ts.with_timezone(&Utc) >= since,
                Err(_) => true,
            })
            .map(|p| PageSummary {
                id: p.id.clone(),
                title: p.title.clone(),
                last_modified: p.last_modified.clone(),
            })
            .collect())
    }

    async fn fetch_content(&self, id: &str) -> Result<PageContent> {
        self.record("fetch_content");
        let page = self.page(id)?;
        Ok(PageContent {
            id: page.id.clone(),
            kind: ContentKind::Page,
            title: page.title,
            text: page.text,
            last_modified: page.last_modified,
            link: page_link(&page.id),
            source_url: format!("https://wiki.test/rest/api/content/{}", page.id),
            space: page.space,
        })
    }

    async fn fetch_hierarchy(&self, id: &str) -> Result<Vec<String>> {
        self.record("fetch_hierarchy");
        let state = self.state();
        let mut titles = Vec::new();
        let mut current = state.pages.get(id).and_then(|p| p.parent.clone());
        while let Some(parent_id) = current {
            match state.pages.get(&parent_id) {
                Some(parent) => {
                    titles.push(parent.title.clone());
                    current = parent.parent.clone();
                }
                None => break,
            }
        }
        titles.reverse();
        Ok(titles)
    }

    async fn fetch_children(&self, id: &str) -> Result<Vec<ChildRef>> {
        self.record("fetch_children");
        let state = self.state();
        if state.failing_children.contains(id) {
            return Err(Error::SourcePermanent(format!("children of {}", id)));
        }
        Ok(state
            .pages
            .values()
            .filter(|p| p.parent.as_deref() == Some(id))
            .map(|p| ChildRef {
                id: p.id.clone(),
                title: p.title.clone(),
            })
            .collect())
    }

    async fn fetch_attachments(&self, id: &str) -> Result<Vec<AttachmentDescriptor>> {
        self.record("fetch_attachments");
        if self.state().failing_attachment_lists.contains(id) {
            return Err(Error::SourcePermanent(format!("attachments of {}", id)));
        }
        let page = self.page(id)?;
        Ok(page
            .attachments
            .iter()
            .map(|a| AttachmentDescriptor {
                id: a.id.clone(),
                title: a.title.clone(),
                download: Some(format!("/download/{}/{}", page.id, a.id)),
                last_modified: a.last_modified.clone(),
                source_url: format!("https://wiki.test/rest/api/content/{}", a.id),
                media_type: None,
            })
            .collect())
    }

    async fn fetch_attachment_bytes(&self, attachment: &AttachmentDescriptor) -> Result<Vec<u8>> {
        self.record("fetch_attachment_bytes");
        self.state()
            .pages
            .values()
            .flat_map(|p| p.attachments.iter())
            .find(|a| a.id == attachment.id)
            .map(|a| a.bytes.clone())
            .ok_or_else(|| Error::NotFound(format!("attachment {}", attachment.id)))
    }
}

/// Treats attachment bytes as UTF-8 text; bodies starting with `BAD` fail
pub struct FakeExtractor;

impl TextExtractor for FakeExtractor {
    fn extract(&self, bytes: &[u8], format: AttachmentFormat) -> Result<String> {
        if bytes.starts_with(b"BAD") {
            return Err(Error::Extraction(format!("corrupt {}", format)));
        }
        Ok(String::from_utf8_lossy(bytes).trim().to_string())
    }
}

/// Replays canned generator responses in order and records prompts
#[derive(Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Responses that end with a confidence trailer
    pub fn with_scores(answers: &[(&str, f64)]) -> Self {
        Self::new(
            answers
                .iter()
                .map(|(text, score)| Ok(format!("{}\nCONFIDENCE_SCORE: {}", text, score)))
                .collect(),
        )
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, _system: &str, user: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(user.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Generation("no scripted response left".to_string())))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
