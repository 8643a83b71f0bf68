//! 搜索能力：search（DuckDuckGo HTML 结果页）与 video-search（YouTube 结果页）
//!
//! 请求带超时与浏览器 User-Agent；结果页解析为"标题 / 链接 / 摘要"列表，
//! 解析不到结构化结果时退回 html2text 提取的整页文本；输出超过 max_result_chars 时截断并追加 ...[truncated]。

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Url};

use crate::config::SearchSection;
use crate::core::CapabilityError;
use crate::tools::schema::clean_text_input;
use crate::tools::{Capability, InputShape, InvocationContext};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
const DUCKDUCKGO_HTML: &str = "https://html.duckduckgo.com/html/";
const YOUTUBE_RESULTS: &str = "https://www.youtube.com/results";

/// 一条搜索结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

pub(crate) fn http_client(timeout_secs: u64) -> Client {
    use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()
        .unwrap_or_default()
}

/// GET 并返回 body 文本；非 2xx 视为错误
pub(crate) async fn fetch_text(client: &Client, url: Url) -> Result<String, String> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("Request failed: {}", e))?;
    if !resp.status().is_success() {
        return Err(format!("HTTP {}", resp.status()));
    }
    let body = resp.text().await.map_err(|e| format!("Read body: {}", e))?;
    Ok(body.trim_start_matches('\u{FEFF}').to_string())
}

/// 解码常见 HTML 实体（含数字实体）
pub(crate) fn decode_entities(text: &str) -> String {
    static ENTITY: OnceLock<Regex> = OnceLock::new();
    let re = ENTITY.get_or_init(|| Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("entity regex"));
    re.replace_all(text, |caps: &regex::Captures| {
        let body = &caps[1];
        let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = body.strip_prefix('#') {
            dec.parse::<u32>().ok().and_then(char::from_u32)
        } else {
            match body {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => None,
            }
        };
        decoded.map(String::from).unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

/// 去标签、解实体、压缩空白
fn clean_fragment(fragment: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let re = TAG.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex"));
    let stripped = re.replace_all(fragment, "");
    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// DuckDuckGo 跳转链接 //duckduckgo.com/l/?uddg=<encoded> 还原为目标地址
fn resolve_result_link(href: &str) -> String {
    let href = decode_entities(href);
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.clone()
    };
    Url::parse(&absolute)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or(href)
}

/// 从 DuckDuckGo HTML 结果页解析结果（标题链接与摘要按出现顺序配对）
pub fn parse_duckduckgo_results(html: &str, limit: usize) -> Vec<SearchHit> {
    static LINK: OnceLock<Regex> = OnceLock::new();
    static SNIPPET: OnceLock<Regex> = OnceLock::new();
    let link_re = LINK.get_or_init(|| {
        Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]*)"[^>]*>(.*?)</a>"#).expect("link regex")
    });
    let snippet_re = SNIPPET.get_or_init(|| {
        Regex::new(r#"(?s)class="result__snippet"[^>]*>(.*?)</(?:a|td|div)>"#).expect("snippet regex")
    });

    let snippets: Vec<String> = snippet_re
        .captures_iter(html)
        .map(|c| clean_fragment(&c[1]))
        .collect();

    link_re
        .captures_iter(html)
        .enumerate()
        .map(|(i, c)| SearchHit {
            title: clean_fragment(&c[2]),
            url: resolve_result_link(&c[1]),
            snippet: snippets.get(i).cloned().unwrap_or_default(),
        })
        .filter(|hit| !hit.title.is_empty())
        .take(limit)
        .collect()
}

fn format_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, h)| {
            if h.snippet.is_empty() {
                format!("{}. {}\n   {}", i + 1, h.title, h.url)
            } else {
                format!("{}. {}\n   {}\n   {}", i + 1, h.title, h.url, h.snippet)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn truncate_chars(text: String, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect::<String>() + "\n...[truncated]"
    } else {
        text
    }
}

/// search：网页搜索，返回排序后的结果摘要
pub struct WebSearchCapability {
    client: Client,
    max_results: usize,
    max_result_chars: usize,
}

impl WebSearchCapability {
    pub fn new(cfg: &SearchSection) -> Self {
        Self {
            client: http_client(cfg.timeout_secs),
            max_results: cfg.max_results.max(1),
            max_result_chars: cfg.max_result_chars,
        }
    }

    async fn search(&self, query: &str) -> Result<String, String> {
        let url = Url::parse_with_params(DUCKDUCKGO_HTML, &[("q", query)]).map_err(|e| e.to_string())?;
        let html = fetch_text(&self.client, url).await?;
        let hits = parse_duckduckgo_results(&html, self.max_results);
        let text = if hits.is_empty() {
            // 页面结构变化时退回整页可读文本
            html2text::from_read(html.as_bytes(), 120).map_err(|e| e.to_string())?
        } else {
            format_hits(&hits)
        };
        if text.trim().is_empty() {
            return Ok(format!("No results found for '{}'.", query));
        }
        Ok(truncate_chars(text, self.max_result_chars))
    }
}

#[async_trait]
impl Capability for WebSearchCapability {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Searches the web and returns ranked results with title, link and snippet."
    }

    fn input_shape(&self) -> InputShape {
        InputShape::FreeText {
            hint: "a search query",
        }
    }

    async fn invoke(&self, raw_input: &str, _ctx: &InvocationContext) -> Result<String, CapabilityError> {
        let query = clean_text_input(raw_input);
        if query.is_empty() {
            return Err(CapabilityError::invalid_input(self.name(), "query must not be empty"));
        }
        tracing::info!(query = %query, "search");
        self.search(query).await.map_err(|detail| CapabilityError::Search {
            query: query.to_string(),
            detail,
        })
    }
}

/// 拆分 "query, N" 形式的数量后缀
pub fn split_count_suffix(input: &str) -> (&str, Option<usize>) {
    if let Some((query, tail)) = input.rsplit_once(',') {
        if let Ok(n) = tail.trim().parse::<usize>() {
            return (query.trim(), Some(n));
        }
    }
    (input.trim(), None)
}

/// 从 YouTube 结果页提取去重后的视频 id（保持出现顺序）
pub fn parse_video_ids(html: &str, limit: usize) -> Vec<String> {
    static VIDEO_ID: OnceLock<Regex> = OnceLock::new();
    let re = VIDEO_ID.get_or_init(|| Regex::new(r#""videoId":"([A-Za-z0-9_-]{11})""#).expect("video id regex"));
    let mut ids: Vec<String> = Vec::new();
    for c in re.captures_iter(html) {
        if ids.len() >= limit {
            break;
        }
        let id = c[1].to_string();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// video-search：按关键词搜索视频，返回观看链接
pub struct VideoSearchCapability {
    client: Client,
    default_count: usize,
}

impl VideoSearchCapability {
    pub fn new(cfg: &SearchSection) -> Self {
        Self {
            client: http_client(cfg.timeout_secs),
            default_count: cfg.max_results.max(1),
        }
    }
}

#[async_trait]
impl Capability for VideoSearchCapability {
    fn name(&self) -> &str {
        "video-search"
    }

    fn description(&self) -> &str {
        "Searches YouTube and returns watch URLs of matching videos."
    }

    fn input_shape(&self) -> InputShape {
        InputShape::FreeText {
            hint: "a search query, optionally followed by ', N' for the number of videos",
        }
    }

    async fn invoke(&self, raw_input: &str, _ctx: &InvocationContext) -> Result<String, CapabilityError> {
        let (query, count) = split_count_suffix(clean_text_input(raw_input));
        if query.is_empty() {
            return Err(CapabilityError::invalid_input(self.name(), "query must not be empty"));
        }
        let count = count.unwrap_or(self.default_count).max(1);
        tracing::info!(query = %query, count, "video-search");

        let search_err = |detail: String| CapabilityError::Search {
            query: query.to_string(),
            detail,
        };
        let url = Url::parse_with_params(YOUTUBE_RESULTS, &[("search_query", query)])
            .map_err(|e| search_err(e.to_string()))?;
        let html = fetch_text(&self.client, url).await.map_err(search_err)?;
        let ids = parse_video_ids(&html, count);
        if ids.is_empty() {
            return Ok(format!("No videos found for '{}'.", query));
        }
        Ok(ids
            .iter()
            .map(|id| format!("https://www.youtube.com/watch?v={}", id))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
