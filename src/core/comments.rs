use crate::core::CancelFlag;
use crate::core::dataset::CommentRecord;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

const API_URL: &str = "https://www.googleapis.com/youtube/v3/commentThreads";
const PAGE_SIZE: &str = "100";
const MAX_ATTEMPTS: u32 = 3;

/// Hard ceiling on pagination so a very popular video cannot run the fetch
/// stage unbounded. Overridable from the CLI.
pub const DEFAULT_MAX_PAGES: usize = 400;

/// One page of flattened comment records plus the continuation token, if the
/// API reported a further page.
#[derive(Debug, Clone)]
pub struct CommentPage {
    pub records: Vec<CommentRecord>,
    pub next_page_token: Option<String>,
}

/// Source of comment pages. The production implementation is [`YouTubeApi`];
/// tests drive the pagination loop with an in-memory fake.
pub trait CommentPager {
    async fn fetch_page(&self, page_token: Option<&str>) -> Result<CommentPage>;
}

/// Drain a pager into a flat record list: request pages following the
/// continuation token until none is returned or `max_pages` is hit, keeping
/// page arrival order. Any page failure aborts the whole fetch; no partial
/// dataset is silently accepted.
pub async fn fetch_comments<P: CommentPager>(
    pager: &P,
    max_pages: usize,
    cancel: &CancelFlag,
) -> Result<Vec<CommentRecord>> {
    let mut records = Vec::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let page = pager.fetch_page(page_token.as_deref()).await?;
        pages += 1;
        tracing::debug!(page = pages, comments = page.records.len(), "fetched page");
        records.extend(page.records);

        match page.next_page_token {
            None => break,
            Some(_) if pages >= max_pages => {
                tracing::warn!(
                    pages,
                    total = records.len(),
                    "page cap reached; keeping comments collected so far"
                );
                break;
            }
            Some(token) => page_token = Some(token),
        }
    }

    Ok(records)
}

/// YouTube Data API v3 `commentThreads.list` client for a single video.
#[derive(Clone)]
pub struct YouTubeApi {
    client: reqwest::Client,
    api_key: String,
    video_id: String,
}

impl YouTubeApi {
    pub fn new(api_key: impl Into<String>, video_id: &str) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            video_id: sanitize_video_id(video_id)?,
        })
    }
}

impl CommentPager for YouTubeApi {
    async fn fetch_page(&self, page_token: Option<&str>) -> Result<CommentPage> {
        let mut last_err: Option<Error> = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                // Exponential backoff on transient failures
                tokio::time::sleep(Duration::from_millis(250 * (1 << attempt))).await;
            }

            let mut request = self.client.get(API_URL).query(&[
                ("part", "snippet"),
                ("videoId", self.video_id.as_str()),
                ("key", self.api_key.as_str()),
                ("maxResults", PAGE_SIZE),
            ]);
            if let Some(token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    last_err = Some(Error::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if status.is_server_error() {
                last_err = Some(Error::service(format!("comment API returned {status}")));
                continue;
            }

            let body = response.text().await?;
            if !status.is_success() {
                // Auth, quota, missing video: not retryable, caller aborts
                return Err(Error::service(format!(
                    "comment API returned {status}: {}",
                    api_error_message(&body)
                )));
            }

            return parse_page(&body);
        }

        Err(last_err.unwrap_or_else(|| Error::service("comment API unreachable")))
    }
}

#[derive(Deserialize)]
struct ThreadListResponse {
    #[serde(default)]
    items: Vec<ThreadItem>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ThreadItem {
    snippet: ThreadSnippet,
}

#[derive(Deserialize)]
struct ThreadSnippet {
    #[serde(rename = "topLevelComment")]
    top_level_comment: TopLevelComment,
}

#[derive(Deserialize)]
struct TopLevelComment {
    snippet: CommentSnippet,
}

#[derive(Deserialize)]
struct CommentSnippet {
    #[serde(rename = "authorDisplayName")]
    author_display_name: Option<String>,
    #[serde(rename = "textOriginal")]
    text_original: Option<String>,
    #[serde(rename = "likeCount")]
    like_count: Option<u64>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
}

/// Flatten one `commentThreads.list` payload into records. A payload that
/// does not match the expected nesting fails the page (and with it the whole
/// fetch); pages are never skipped silently.
pub fn parse_page(body: &str) -> Result<CommentPage> {
    let response: ThreadListResponse = serde_json::from_str(body)
        .map_err(|e| Error::data_format(format!("unexpected comment page payload: {e}")))?;

    let records = response
        .items
        .into_iter()
        .map(|item| {
            let snippet = item.snippet.top_level_comment.snippet;
            CommentRecord {
                author: snippet.author_display_name,
                comment: snippet.text_original,
                likes: snippet.like_count,
                published_at: snippet.published_at,
            }
        })
        .collect();

    Ok(CommentPage {
        records,
        next_page_token: response.next_page_token,
    })
}

fn api_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.chars().take(200).collect(),
    }
}

pub fn extract_video_id(url: &str) -> Option<String> {
    // Accept raw IDs and the common YouTube URL shapes
    let raw_id = if let Some(v_param) = url.split("v=").nth(1) {
        v_param.split('&').next().unwrap_or(v_param)
    } else if let Some(youtu_be) = url.split("youtu.be/").nth(1) {
        youtu_be.split('?').next().unwrap_or(youtu_be)
    } else {
        url
    };

    sanitize_video_id(raw_id).ok()
}

const MAX_VIDEO_ID_LEN: usize = 128;

/// Ensure a video identifier is safe for downstream use (filesystem paths,
/// API calls). Only ASCII alphanumeric characters plus `_` and `-` are
/// allowed.
pub fn sanitize_video_id(raw: &str) -> Result<String> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(Error::custom("Video ID cannot be empty"));
    }

    if trimmed.len() > MAX_VIDEO_ID_LEN {
        return Err(Error::custom("Video ID is unexpectedly long"));
    }

    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
    {
        return Err(Error::custom(
            "Video ID contains unsupported characters; expected only letters, numbers, '-' or '_'",
        ));
    }

    Ok(trimmed.to_string())
}
