//! arXiv provider implementation.
//!
//! Talks to the arXiv Atom API (`/api/query`). Listings are paged, newest
//! `lastUpdatedDate` first; single papers are looked up with `id_list`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::{FetchOutcome, PaperProvider, ProviderError, ProviderResult, RecentPapersRequest};
use crate::models::Paper;

/// Connection settings for the arXiv API.
#[derive(Debug, Clone)]
pub struct ArxivConfig {
    /// Query endpoint
    pub base_url: String,

    /// Results requested per page
    pub page_size: usize,

    /// Pause between consecutive page requests
    pub page_delay: Duration,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            base_url: "https://export.arxiv.org/api/query".to_string(),
            page_size: 100,
            page_delay: Duration::from_secs(3),
            timeout: Duration::from_secs(30),
        }
    }
}

/// arXiv search client.
#[derive(Debug, Clone)]
pub struct ArxivClient {
    client: Client,
    config: ArxivConfig,
}

impl ArxivClient {
    /// Create a client with the given settings.
    ///
    /// # Errors
    /// Returns `ProviderError::ConfigError` if the page size is zero or the HTTP
    /// client cannot be built
    pub fn new(config: ArxivConfig) -> ProviderResult<Self> {
        if config.page_size == 0 {
            return Err(ProviderError::ConfigError(
                "page size must be positive".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("paper-recommender/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::ConfigError(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn get_feed(&self, params: &[(&str, String)]) -> ProviderResult<(StatusCode, String)> {
        let response = self
            .client
            .get(&self.config.base_url)
            .query(params)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        Ok((status, body))
    }

    async fn fetch_page(&self, query: &str, start: usize, max_results: usize) -> ProviderResult<FeedPage> {
        let params = [
            ("search_query", query.to_string()),
            ("sortBy", "lastUpdatedDate".to_string()),
            ("sortOrder", "descending".to_string()),
            ("start", start.to_string()),
            ("max_results", max_results.to_string()),
        ];
        let (status, body) = self.get_feed(&params).await?;
        if !status.is_success() {
            return Err(ProviderError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }
        parse_feed(&body)
    }
}

/// Build the `search_query` value for a set of categories.
pub fn category_query(categories: &[String]) -> String {
    categories
        .iter()
        .map(|c| format!("cat:{}", c))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[async_trait]
impl PaperProvider for ArxivClient {
    async fn fetch_recent(&self, request: &RecentPapersRequest) -> ProviderResult<FetchOutcome> {
        if request.categories.is_empty() {
            return Err(ProviderError::ConfigError(
                "at least one category is required".to_string(),
            ));
        }
        let query = category_query(&request.categories);
        let mut limit = request.max_results;
        let mut start = 0;
        let mut papers = Vec::with_capacity(limit.min(self.config.page_size));

        while start < limit {
            if start > 0 {
                tokio::time::sleep(self.config.page_delay).await;
            }
            let page_len = (limit - start).min(self.config.page_size);
            debug!(start, page_len, "Requesting arXiv page");
            let page = self.fetch_page(&query, start, page_len).await?;

            if let Some(total) = page.total_results {
                limit = limit.min(total);
            }
            if page.entries == 0 {
                if start == 0 {
                    break;
                }
                warn!(
                    start,
                    collected = papers.len(),
                    "arXiv returned an unexpected empty page, stopping early"
                );
                return Ok(FetchOutcome::truncated(papers));
            }

            start += page.entries;
            papers.extend(page.papers);
        }

        papers.truncate(request.max_results);
        Ok(FetchOutcome::complete(papers))
    }

    async fn fetch_by_id(&self, paper_id: &str) -> ProviderResult<Option<Paper>> {
        let Some(id) = normalize_paper_id(paper_id) else {
            debug!(paper_id, "Rejected malformed arXiv id");
            return Ok(None);
        };

        let params = [("id_list", id.clone()), ("max_results", "1".to_string())];
        let (status, body) = self.get_feed(&params).await?;
        if status == StatusCode::BAD_REQUEST {
            debug!(%id, "arXiv rejected id");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ProviderError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(parse_feed(&body)?.papers.into_iter().next())
    }

    fn name(&self) -> &str {
        "arXiv"
    }
}

/// Reduce user input to a bare arXiv identifier.
///
/// Accepts bare ids (`2401.01234`, `2401.01234v2`, `hep-th/9901001`), an
/// `arXiv:` prefix, and abs/pdf URLs. Returns `None` for anything else.
pub fn normalize_paper_id(input: &str) -> Option<String> {
    let mut id = input.trim();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = id.strip_prefix(scheme) {
            id = rest;
        }
    }
    id = id.strip_prefix("www.").unwrap_or(id);
    id = id.strip_prefix("export.").unwrap_or(id);
    for path in ["arxiv.org/abs/", "arxiv.org/pdf/"] {
        if let Some(rest) = id.strip_prefix(path) {
            id = rest;
        }
    }
    if id.get(..6).is_some_and(|prefix| prefix.eq_ignore_ascii_case("arxiv:")) {
        id = &id[6..];
    }
    id = id.strip_suffix(".pdf").unwrap_or(id);
    id = id.trim_end_matches('/');

    is_valid_arxiv_id(id).then(|| id.to_string())
}

fn strip_version(id: &str) -> &str {
    match id.rfind('v') {
        Some(pos) if pos + 1 < id.len() && id[pos + 1..].bytes().all(|b| b.is_ascii_digit()) => {
            &id[..pos]
        }
        _ => id,
    }
}

fn is_valid_arxiv_id(id: &str) -> bool {
    let base = strip_version(id);
    if let Some((archive, number)) = base.split_once('/') {
        // old style: archive(.SUBJ)/YYMMNNN
        let archive_ok = !archive.is_empty()
            && archive
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b == b'-' || b == b'.' || b.is_ascii_uppercase());
        return archive_ok && number.len() == 7 && number.bytes().all(|b| b.is_ascii_digit());
    }
    match base.split_once('.') {
        Some((yymm, seq)) => {
            yymm.len() == 4
                && yymm.bytes().all(|b| b.is_ascii_digit())
                && (seq.len() == 4 || seq.len() == 5)
                && seq.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// One parsed page of an Atom feed.
#[derive(Debug, Default)]
pub(crate) struct FeedPage {
    /// `opensearch:totalResults`, when present
    pub total_results: Option<usize>,

    /// Number of `<entry>` elements seen, including skipped ones
    pub entries: usize,

    /// Entries that describe real papers
    pub papers: Vec<Paper>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Title,
    Summary,
    Updated,
    TotalResults,
}

#[derive(Debug, Default)]
struct EntryBuilder {
    id: String,
    title: String,
    summary: String,
    updated: String,
    pdf_url: Option<String>,
}

impl EntryBuilder {
    fn field_mut(&mut self, field: Field) -> Option<&mut String> {
        match field {
            Field::Id => Some(&mut self.id),
            Field::Title => Some(&mut self.title),
            Field::Summary => Some(&mut self.summary),
            Field::Updated => Some(&mut self.updated),
            Field::TotalResults => None,
        }
    }

    fn read_link(&mut self, element: &BytesStart<'_>) -> ProviderResult<()> {
        let mut is_pdf = false;
        let mut href = None;
        for attr in element.attributes() {
            let attr = attr.map_err(|e| ProviderError::ParseError(e.to_string()))?;
            let value = attr
                .unescape_value()
                .map_err(|e| ProviderError::ParseError(e.to_string()))?;
            match attr.key.as_ref() {
                b"title" => is_pdf = value == "pdf",
                b"href" => href = Some(value.into_owned()),
                _ => {}
            }
        }
        if is_pdf {
            self.pdf_url = href;
        }
        Ok(())
    }

    /// Turn the collected text into a `Paper`, or `None` for arXiv's error
    /// entries and entries missing required fields.
    fn build(self) -> Option<Paper> {
        let id = self.id.trim().to_string();
        if id.is_empty() || id.contains("/api/errors") {
            return None;
        }
        let title = self.title.split_whitespace().collect::<Vec<_>>().join(" ");
        if title.is_empty() {
            return None;
        }
        let updated = DateTime::parse_from_rfc3339(self.updated.trim())
            .ok()?
            .with_timezone(&Utc);
        let url = self
            .pdf_url
            .unwrap_or_else(|| id.replacen("/abs/", "/pdf/", 1));

        Some(Paper {
            id,
            title,
            abstract_text: self.summary.trim().to_string(),
            updated,
            url,
        })
    }
}

/// Parse an arXiv Atom response.
pub(crate) fn parse_feed(xml: &str) -> ProviderResult<FeedPage> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut page = FeedPage::default();
    let mut entry: Option<EntryBuilder> = None;
    let mut field: Option<Field> = None;
    let mut total_text = String::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            ProviderError::ParseError(format!("at position {}: {}", reader.buffer_position(), e))
        })?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"entry" => entry = Some(EntryBuilder::default()),
                b"link" => {
                    if let Some(builder) = entry.as_mut() {
                        builder.read_link(&e)?;
                    }
                }
                b"totalResults" => field = Some(Field::TotalResults),
                b"id" if entry.is_some() => field = Some(Field::Id),
                b"title" if entry.is_some() => field = Some(Field::Title),
                b"summary" if entry.is_some() => field = Some(Field::Summary),
                b"updated" if entry.is_some() => field = Some(Field::Updated),
                _ => field = None,
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"link" {
                    if let Some(builder) = entry.as_mut() {
                        builder.read_link(&e)?;
                    }
                }
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| ProviderError::ParseError(e.to_string()))?;
                append_text(&mut entry, &mut total_text, field, &text);
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                append_text(&mut entry, &mut total_text, field, &text);
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"entry" {
                    if let Some(builder) = entry.take() {
                        page.entries += 1;
                        match builder.build() {
                            Some(paper) => page.papers.push(paper),
                            None => debug!("Skipping arXiv entry without paper metadata"),
                        }
                    }
                }
                field = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !total_text.trim().is_empty() {
        let total = total_text.trim().parse::<usize>().map_err(|e| {
            ProviderError::ParseError(format!("bad totalResults '{}': {}", total_text.trim(), e))
        })?;
        page.total_results = Some(total);
    }

    Ok(page)
}

fn append_text(
    entry: &mut Option<EntryBuilder>,
    total_text: &mut String,
    field: Option<Field>,
    text: &str,
) {
    match (field, entry.as_mut()) {
        (Some(Field::TotalResults), _) => total_text.push_str(text),
        (Some(field), Some(builder)) => {
            if let Some(target) = builder.field_mut(field) {
                if !target.is_empty() {
                    target.push(' ');
                }
                target.push_str(text);
            }
        }
        _ => {}
    }
}
