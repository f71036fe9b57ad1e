//! Confluence REST (v1) content source

use super::{AttachmentDescriptor, ChildRef, ContentKind, ContentSource, PageContent, PageSummary};
use crate::config::SourceConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

/// Confluence client implementing [`ContentSource`]
pub struct ConfluenceSource {
    client: Client,
    /// Site root without trailing slash, e.g. `https://acme.atlassian.net`
    base_url: String,
    username: String,
    token: Option<String>,
    page_limit: usize,
    search_limit: usize,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

/// One page of a paginated listing
trait ListingPage: DeserializeOwned {
    /// Results of this page and whether the server advertises another
    fn into_parts(self) -> (Vec<RawContent>, bool);
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageLinks {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(default = "Vec::new")]
    results: Vec<RawContent>,
    #[serde(rename = "_links", default)]
    links: PageLinks,
}

impl ListingPage for Listing {
    fn into_parts(self) -> (Vec<RawContent>, bool) {
        (self.results, self.links.next.is_some())
    }
}

/// Attachment listings come back either wrapped or as a bare array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AttachmentListing {
    Wrapped {
        results: Vec<RawContent>,
        #[serde(rename = "_links", default)]
        links: PageLinks,
    },
    Bare(Vec<RawContent>),
}

impl ListingPage for AttachmentListing {
    fn into_parts(self) -> (Vec<RawContent>, bool) {
        match self {
            AttachmentListing::Wrapped { results, links } => (results, links.next.is_some()),
            // A bare array carries no links, so it is always the last page
            AttachmentListing::Bare(items) => (items, false),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawContent {
    id: String,
    title: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    version: Option<RawVersion>,
    space: Option<RawSpace>,
    body: Option<RawBody>,
    ancestors: Vec<RawAncestor>,
    #[serde(rename = "_links")]
    links: Option<RawLinks>,
    metadata: Option<RawAttachmentMeta>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawVersion {
    when: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSpace {
    key: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBody {
    storage: Option<RawStorage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStorage {
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAncestor {
    title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLinks {
    download: Option<String>,
    #[serde(rename = "self")]
    self_link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAttachmentMeta {
    #[serde(rename = "mediaType")]
    media_type: Option<String>,
}

impl RawContent {
    fn last_modified(&self) -> String {
        self.version
            .as_ref()
            .map(|v| v.when.clone())
            .unwrap_or_default()
    }
}

/// Map an HTTP status to the error taxonomy used by the reconciler
pub fn classify_status(status: StatusCode, context: &str) -> Error {
    match status.as_u16() {
        404 => Error::NotFound(context.to_string()),
        408 | 429 => Error::SourceTransient(format!("{}: HTTP {}", context, status)),
        s if s >= 500 => Error::SourceTransient(format!("{}: HTTP {}", context, status)),
        _ => Error::SourcePermanent(format!("{}: HTTP {}", context, status)),
    }
}

/// Convert Confluence storage-format HTML to plain text
pub fn storage_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let text = html2text::from_read(html.as_bytes(), 120).unwrap_or_else(|_| html.to_string());
    text.trim().to_string()
}

impl ConfluenceSource {
    /// Create a client, reading the API token from the configured env var
    pub fn new(config: &SourceConfig) -> Result<Self> {
        Self::with_token(config, config.api_token())
    }

    /// Create a client with an explicit token
    pub fn with_token(config: &SourceConfig, token: Option<String>) -> Result<Self> {
        // Validate early so a bad URL fails at startup
        Url::parse(&config.base_url)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("wikirag/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(nonzero!(1u32));

        if token.is_none() {
            debug!(
                "No API token in ${}; requests will be anonymous",
                config.api_token_env
            );
        }

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            token,
            page_limit: config.page_limit.max(1),
            search_limit: config.search_limit.max(1),
            limiter: RateLimiter::direct(Quota::per_second(rps)),
        })
    }

    fn api(&self, path: &str) -> String {
        format!("{}/wiki/rest/api/{}", self.base_url, path)
    }

    fn page_link(&self, space: &str, id: &str) -> String {
        format!("{}/wiki/spaces/{}/pages/{}", self.base_url, space, id)
    }

    /// Resolve a download path against the wiki root
    fn download_url(&self, download: &str) -> String {
        if download.starts_with("http://") || download.starts_with("https://") {
            download.to_string()
        } else if download.starts_with("/wiki/") {
            format!("{}{}", self.base_url, download)
        } else {
            format!("{}/wiki{}", self.base_url, download)
        }
    }

    async fn send(&self, url: &str, query: &[(&str, String)]) -> Result<Response> {
        self.limiter.until_ready().await;
        trace!("GET {} {:?}", url, query);

        let mut request = self.client.get(url).query(query);
        if let Some(token) = &self.token {
            request = request.basic_auth(&self.username, Some(token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::SourceTransient(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, url));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let response = self.send(url, query).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| Error::SourcePermanent(format!("Invalid response from {}: {}", url, e)))
    }

    /// Walk a paginated listing until the server stops advertising `next`.
    ///
    /// `start` advances by the number of results actually returned, since
    /// the server may cap `limit` below what was asked for.
    async fn paginate<P: ListingPage>(
        &self,
        url: &str,
        params: &[(&str, String)],
        limit: usize,
    ) -> Result<Vec<RawContent>> {
        let mut all = Vec::new();
        let mut start = 0;

        loop {
            let mut query = params.to_vec();
            query.push(("start", start.to_string()));
            query.push(("limit", limit.to_string()));

            let page: P = self.get_json(url, &query).await?;
            let (results, has_next) = page.into_parts();
            let count = results.len();
            all.extend(results);

            if count == 0 || !has_next {
                break;
            }
            start += count;
        }

        Ok(all)
    }

    fn descriptor(&self, raw: RawContent) -> AttachmentDescriptor {
        let last_modified = raw.last_modified();
        let links = raw.links.unwrap_or_default();
        AttachmentDescriptor {
            source_url: links
                .self_link
                .unwrap_or_else(|| self.api(&format!("content/{}", raw.id))),
            id: raw.id,
            title: raw.title,
            download: links.download,
            last_modified,
            media_type: raw.metadata.and_then(|m| m.media_type),
        }
    }
}

#[async_trait]
impl ContentSource for ConfluenceSource {
    async fn list_ids(&self, space: &str) -> Result<HashSet<String>> {
        let url = self.api(&format!("space/{}/content/page", space));
        let pages = self.paginate::<Listing>(&url, &[], self.page_limit).await?;
        debug!("Listed {} pages in space {}", pages.len(), space);
        Ok(pages.into_iter().map(|p| p.id).collect())
    }

    async fn list_modified_since(
        &self,
        space: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PageSummary>> {
        let cql = format!(
            "space = '{}' AND type = page AND lastmodified >= '{}'",
            space,
            since.format("%Y-%m-%d %H:%M")
        );
        let url = self.api("content/search");
        let params = [("cql", cql), ("expand", "version".to_string())];
        let pages = self.paginate::<Listing>(&url, &params, self.search_limit).await?;

        Ok(pages
            .into_iter()
            .map(|p| PageSummary {
                last_modified: p.last_modified(),
                id: p.id,
                title: p.title,
            })
            .collect())
    }

    async fn fetch_content(&self, id: &str) -> Result<PageContent> {
        let url = self.api(&format!("content/{}", id));
        let raw: RawContent = self
            .get_json(
                &url,
                &[("expand", "body.storage,version,space,ancestors".to_string())],
            )
            .await?;

        let space = raw.space.as_ref().map(|s| s.key.clone()).unwrap_or_default();
        let html = raw
            .body
            .as_ref()
            .and_then(|b| b.storage.as_ref())
            .map(|s| s.value.as_str())
            .unwrap_or_default();
        let kind = match raw.kind.as_deref() {
            Some("attachment") => ContentKind::Attachment,
            _ => ContentKind::Page,
        };

        Ok(PageContent {
            id: id.to_string(),
            kind,
            text: storage_to_text(html),
            last_modified: raw.last_modified(),
            link: self.page_link(&space, id),
            source_url: url.clone(),
            title: raw.title,
            space,
        })
    }

    async fn fetch_hierarchy(&self, id: &str) -> Result<Vec<String>> {
        let url = self.api(&format!("content/{}", id));
        let raw: RawContent = self
            .get_json(&url, &[("expand", "ancestors".to_string())])
            .await?;
        Ok(raw.ancestors.into_iter().map(|a| a.title).collect())
    }

    async fn fetch_children(&self, id: &str) -> Result<Vec<ChildRef>> {
        let url = self.api(&format!("content/{}/child/page", id));
        let children = self.paginate::<Listing>(&url, &[], self.page_limit).await?;
        Ok(children
            .into_iter()
            .map(|c| ChildRef {
                id: c.id,
                title: c.title,
            })
            .collect())
    }

    async fn fetch_attachments(&self, id: &str) -> Result<Vec<AttachmentDescriptor>> {
        let url = self.api(&format!("content/{}/child/attachment", id));
        let params = [("expand", "version".to_string())];
        let attachments = self
            .paginate::<AttachmentListing>(&url, &params, self.page_limit)
            .await?;

        Ok(attachments
            .into_iter()
            .map(|raw| self.descriptor(raw))
            .collect())
    }

    async fn fetch_attachment_bytes(&self, attachment: &AttachmentDescriptor) -> Result<Vec<u8>> {
        let download = attachment.download.as_deref().ok_or_else(|| {
            Error::SourcePermanent(format!("No download link for attachment {}", attachment.title))
        })?;
        let url = self.download_url(download);
        let response = self.send(&url, &[]).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::SourceTransient(format!("{}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }

    fn attachment_link(&self, attachment: &AttachmentDescriptor) -> String {
        attachment
            .download
            .as_deref()
            .map(|d| self.download_url(d))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{basic_auth, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(server: &MockServer) -> ConfluenceSource {
        let config = SourceConfig {
            base_url: server.uri(),
            username: "bot@example.com".to_string(),
            spaces: vec!["DOCS".to_string()],
            requests_per_second: 1000,
            page_limit: 2,
            search_limit: 2,
            ..SourceConfig::default()
        };
        ConfluenceSource::with_token(&config, Some("secret".to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_list_ids_paginates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/space/DOCS/content/page"))
            .and(query_param("start", "0"))
            .and(basic_auth("bot@example.com", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": "1", "title": "A"}, {"id": "2", "title": "B"}],
                "_links": {"next": "/rest/api/space/DOCS/content/page?start=2&limit=2"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/space/DOCS/content/page"))
            .and(query_param("start", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": "3", "title": "C"}]
            })))
            .mount(&server)
            .await;

        let ids = source_for(&server).list_ids("DOCS").await.unwrap();

        let expected: HashSet<String> = ["1", "2", "3"].iter().map(|s| s.to_string()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_list_ids_follows_next_when_server_caps_limit() {
        let server = MockServer::start().await;
        // Asked for 2 per page, the server hands back 1 at a time
        for (start, id, next) in [("0", "1", true), ("1", "2", true), ("2", "3", false)] {
            let mut body = json!({"results": [{"id": id, "title": id}]});
            if next {
                body["_links"] = json!({"next": "/rest/api/space/DOCS/content/page?more"});
            }
            Mock::given(method("GET"))
                .and(path("/wiki/rest/api/space/DOCS/content/page"))
                .and(query_param("start", start))
                .respond_with(ResponseTemplate::new(200).set_body_json(body))
                .expect(1)
                .mount(&server)
                .await;
        }

        let ids = source_for(&server).list_ids("DOCS").await.unwrap();

        let expected: HashSet<String> = ["1", "2", "3"].iter().map(|s| s.to_string()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_attachment_listing_paginates() {
        let server = MockServer::start().await;
        let entry = |id: &str| {
            json!({
                "id": id,
                "title": format!("{}.pdf", id),
                "_links": {"download": format!("/download/attachments/9/{}.pdf", id)}
            })
        };
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/content/9/child/attachment"))
            .and(query_param("start", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [entry("a"), entry("b")],
                "_links": {"next": "/rest/api/content/9/child/attachment?start=2"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/content/9/child/attachment"))
            .and(query_param("start", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [entry("c")]
            })))
            .mount(&server)
            .await;

        let attachments = source_for(&server).fetch_attachments("9").await.unwrap();

        let ids: Vec<&str> = attachments.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_fetch_content_converts_storage_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/content/42"))
            .and(query_param("expand", "body.storage,version,space,ancestors"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "42",
                "type": "page",
                "title": "Install Guide",
                "space": {"key": "DOCS"},
                "version": {"when": "2024-05-01T10:00:00.000Z", "number": 3},
                "body": {"storage": {"value": "<p>Run the <b>installer</b>.</p>"}},
                "ancestors": [{"title": "Home"}]
            })))
            .mount(&server)
            .await;

        let source = source_for(&server);
        let content = source.fetch_content("42").await.unwrap();

        assert_eq!(content.title, "Install Guide");
        assert_eq!(content.space, "DOCS");
        assert_eq!(content.kind, ContentKind::Page);
        assert_eq!(content.last_modified, "2024-05-01T10:00:00.000Z");
        assert!(content.text.contains("installer"));
        assert!(!content.text.contains("<p>"));
        assert_eq!(
            content.link,
            format!("{}/wiki/spaces/DOCS/pages/42", server.uri())
        );
    }

    #[tokio::test]
    async fn test_attachment_listing_shapes() {
        let server = MockServer::start().await;
        let entry = json!({
            "id": "att9",
            "title": "Runbook.pdf",
            "version": {"when": "2024-04-01"},
            "metadata": {"mediaType": "application/pdf"},
            "_links": {"download": "/download/attachments/7/Runbook.pdf"}
        });
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/content/7/child/attachment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [entry.clone()]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/content/8/child/attachment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([entry])))
            .mount(&server)
            .await;

        let source = source_for(&server);
        let wrapped = source.fetch_attachments("7").await.unwrap();
        let bare = source.fetch_attachments("8").await.unwrap();

        assert_eq!(wrapped, bare);
        assert_eq!(wrapped[0].title, "Runbook.pdf");
        assert_eq!(wrapped[0].media_type.as_deref(), Some("application/pdf"));
        assert_eq!(
            source.attachment_link(&wrapped[0]),
            format!("{}/wiki/download/attachments/7/Runbook.pdf", server.uri())
        );
    }

    #[tokio::test]
    async fn test_download_attachment_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wiki/download/attachments/7/a.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
            .mount(&server)
            .await;

        let source = source_for(&server);
        let descriptor = AttachmentDescriptor {
            id: "a".to_string(),
            title: "a.pdf".to_string(),
            download: Some("/download/attachments/7/a.pdf".to_string()),
            last_modified: String::new(),
            source_url: String::new(),
            media_type: None,
        };

        let bytes = source.fetch_attachment_bytes(&descriptor).await.unwrap();
        assert_eq!(bytes, b"%PDF-1.4");
    }

    #[tokio::test]
    async fn test_modified_since_uses_cql() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/content/search"))
            .and(query_param(
                "cql",
                "space = 'DOCS' AND type = page AND lastmodified >= '2024-05-01 08:30'",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": "5", "title": "Changed", "version": {"when": "2024-05-02"}}]
            })))
            .mount(&server)
            .await;

        let since = DateTime::parse_from_rfc3339("2024-05-01T08:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let pages = source_for(&server)
            .list_modified_since("DOCS", since)
            .await
            .unwrap();

        assert_eq!(
            pages,
            vec![PageSummary {
                id: "5".to_string(),
                title: "Changed".to_string(),
                last_modified: "2024-05-02".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/content/404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/content/503"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/content/401"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let source = source_for(&server);
        assert!(matches!(source.fetch_content("404").await, Err(Error::NotFound(_))));
        assert!(matches!(source.fetch_content("503").await, Err(Error::SourceTransient(_))));
        assert!(matches!(source.fetch_content("401").await, Err(Error::SourcePermanent(_))));
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "x").is_transient());
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT, "x").is_transient());
        assert!(!classify_status(StatusCode::FORBIDDEN, "x").is_transient());
    }
}
