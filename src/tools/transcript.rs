//! 字幕抓取能力 transcript-fetch
//!
//! 输入 `{"source": "<视频链接或 id>", "destination-name": "transcript_1.txt"}`（也接受 url / name）；
//! 由 TranscriptProvider 取回纯文本字幕，保存到 `<workspace>/<字幕目录>/<name>`，name 只能是单个文件名。

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Url};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::config::TranscriptSection;
use crate::core::CapabilityError;
use crate::tools::filesystem::Sandbox;
use crate::tools::schema::{input_schema, parse_json_input};
use crate::tools::search::{decode_entities, fetch_text, http_client};
use crate::tools::{Capability, InputShape, InvocationContext};

/// 字幕来源：给定视频引用，返回纯文本字幕；错误为可读描述
#[async_trait]
pub trait TranscriptProvider: Send + Sync {
    async fn fetch(&self, source: &str) -> Result<String, String>;
}

/// 从 watch / shorts / embed / live / youtu.be 链接或裸 id 中解析 11 位视频 id
pub fn extract_video_id(source: &str) -> Option<String> {
    static BARE_ID: OnceLock<Regex> = OnceLock::new();
    let bare = BARE_ID.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("video id regex"));

    let source = source.trim();
    if bare.is_match(source) {
        return Some(source.to_string());
    }

    let with_scheme = if source.contains("://") {
        source.to_string()
    } else {
        format!("https://{}", source)
    };
    let url = Url::parse(&with_scheme).ok()?;
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");

    let candidate = match host {
        "youtu.be" => url.path_segments()?.next().map(str::to_string),
        "youtube.com" | "music.youtube.com" | "youtube-nocookie.com" => {
            let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
            match segments.as_slice() {
                ["watch", ..] => url
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned()),
                ["shorts" | "embed" | "live" | "v", id, ..] => Some(id.to_string()),
                _ => None,
            }
        }
        _ => None,
    }?;

    bare.is_match(&candidate).then_some(candidate)
}

/// 从页面中取出 `"key": [...]` 的 JSON 数组文本（括号配对，跳过字符串内的括号）
fn extract_json_array<'a>(page: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("\"{}\":", key);
    let start = page.find(&needle)? + needle.len();
    let rest = &page[start..];
    let open = rest.find('[')?;
    if !rest[..open].trim().is_empty() {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in rest[open..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&rest[open..=open + i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    base_url: String,
    #[serde(default)]
    language_code: String,
    /// "asr" 表示自动生成字幕
    #[serde(default)]
    kind: Option<String>,
}

/// 选择字幕轨：首选语言的人工字幕 > 首选语言自动字幕 > 同语系 > 第一条
fn pick_track<'a>(tracks: &'a [CaptionTrack], preferred: &str) -> Option<&'a CaptionTrack> {
    let is_asr = |t: &CaptionTrack| t.kind.as_deref() == Some("asr");
    tracks
        .iter()
        .find(|t| t.language_code == preferred && !is_asr(t))
        .or_else(|| tracks.iter().find(|t| t.language_code == preferred))
        .or_else(|| tracks.iter().find(|t| t.language_code.starts_with(preferred)))
        .or_else(|| tracks.first())
}

/// timedtext XML 转纯文本（YouTube 的实体常被二次转义）
pub fn timedtext_to_text(xml: &str) -> String {
    static TEXT: OnceLock<Regex> = OnceLock::new();
    let re = TEXT.get_or_init(|| Regex::new(r"(?s)<text[^>]*>(.*?)</text>").expect("timedtext regex"));
    re.captures_iter(xml)
        .map(|c| decode_entities(&decode_entities(&c[1])))
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// 基于 YouTube 观看页 captionTracks 的字幕来源
pub struct YoutubeTranscripts {
    client: Client,
    preferred_language: String,
}

impl YoutubeTranscripts {
    pub fn new(cfg: &TranscriptSection) -> Self {
        Self {
            client: http_client(cfg.timeout_secs),
            preferred_language: cfg.preferred_language.clone(),
        }
    }
}

#[async_trait]
impl TranscriptProvider for YoutubeTranscripts {
    async fn fetch(&self, source: &str) -> Result<String, String> {
        let video_id = extract_video_id(source).ok_or_else(|| "could not find a video id".to_string())?;
        let watch = Url::parse_with_params("https://www.youtube.com/watch", &[("v", video_id.as_str())])
            .map_err(|e| e.to_string())?;
        let page = fetch_text(&self.client, watch).await?;

        let tracks_json = extract_json_array(&page, "captionTracks")
            .ok_or_else(|| format!("no captions available for video {}", video_id))?;
        let tracks: Vec<CaptionTrack> =
            serde_json::from_str(tracks_json).map_err(|e| format!("unreadable caption list: {}", e))?;
        let track = pick_track(&tracks, &self.preferred_language)
            .ok_or_else(|| format!("no captions available for video {}", video_id))?;
        tracing::debug!(video_id = %video_id, language = %track.language_code, "caption track selected");

        let url = Url::parse(&track.base_url).map_err(|e| e.to_string())?;
        let xml = fetch_text(&self.client, url).await?;
        let text = timedtext_to_text(&xml);
        if text.is_empty() {
            return Err(format!("caption track for video {} is empty", video_id));
        }
        Ok(text)
    }
}

/// transcript-fetch 的输入
#[derive(Debug, Deserialize, JsonSchema)]
pub struct TranscriptFetchInput {
    /// 视频链接或 id
    #[serde(alias = "url")]
    pub source: String,
    /// 保存用的文件名（仅文件名，如 transcript_1.txt）
    #[serde(rename = "destination-name", alias = "name", alias = "destination_name")]
    pub destination_name: String,
}

/// transcript-fetch：抓取字幕并保存到字幕目录
pub struct TranscriptFetchCapability {
    provider: Arc<dyn TranscriptProvider>,
    fs: Sandbox,
    directory: String,
}

impl TranscriptFetchCapability {
    pub fn new(provider: Arc<dyn TranscriptProvider>, fs: Sandbox, directory: impl Into<String>) -> Self {
        Self {
            provider,
            fs,
            directory: directory.into(),
        }
    }
}

#[async_trait]
impl Capability for TranscriptFetchCapability {
    fn name(&self) -> &str {
        "transcript-fetch"
    }

    fn description(&self) -> &str {
        "Fetches the transcript of a video and saves it in the transcripts directory. \
         Pass only a file name such as transcript_1.txt; the directory is handled automatically."
    }

    fn input_shape(&self) -> InputShape {
        InputShape::Json(input_schema::<TranscriptFetchInput>())
    }

    async fn invoke(&self, raw_input: &str, _ctx: &InvocationContext) -> Result<String, CapabilityError> {
        let input: TranscriptFetchInput = parse_json_input(self.name(), raw_input)?;
        let source = input.source.trim();
        if source.is_empty() {
            return Err(CapabilityError::invalid_input(self.name(), "source must not be empty"));
        }
        let name = Sandbox::bare_file_name(&input.destination_name)?;
        tracing::info!(source = %source, name = %name, "transcript-fetch");

        let text = self
            .provider
            .fetch(source)
            .await
            .map_err(|detail| CapabilityError::Transcript {
                source_ref: source.to_string(),
                detail,
            })?;

        let relative = format!("{}/{}", self.directory.trim_end_matches('/'), name);
        self.fs.write(&relative, &text)?;
        Ok(format!(
            "Transcript of {} saved to {} ({} characters)",
            source,
            relative,
            text.chars().count()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct StubProvider(Result<String, String>);

    #[async_trait]
    impl TranscriptProvider for StubProvider {
        async fn fetch(&self, _source: &str) -> Result<String, String> {
            self.0.clone()
        }
    }

    fn capability(dir: &TempDir, result: Result<String, String>) -> TranscriptFetchCapability {
        TranscriptFetchCapability::new(Arc::new(StubProvider(result)), Sandbox::new(dir.path()), "transcripts")
    }

    #[test]
    fn test_extract_video_id() {
        let id = Some("aircAruvnKk".to_string());
        assert_eq!(extract_video_id("aircAruvnKk"), id);
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=aircAruvnKk&t=10s"), id);
        assert_eq!(extract_video_id("youtube.com/watch?v=aircAruvnKk"), id);
        assert_eq!(extract_video_id("https://youtu.be/aircAruvnKk?si=x"), id);
        assert_eq!(extract_video_id("https://www.youtube.com/shorts/aircAruvnKk"), id);
        assert_eq!(extract_video_id("https://www.youtube.com/embed/aircAruvnKk"), id);
        assert_eq!(extract_video_id("https://example.com/watch?v=aircAruvnKk"), None);
        assert_eq!(extract_video_id("not a video"), None);
    }

    #[test]
    fn test_extract_caption_tracks_with_nested_brackets() {
        let page = r#"var x = {"captions":{"captionTracks":[{"baseUrl":"https://www.youtube.com/api/timedtext?v=a&lang=en","name":{"runs":[{"text":"English [auto]"}]},"languageCode":"en","kind":"asr"},{"baseUrl":"https://b","languageCode":"de"}],"audioTracks":[]}};"#;
        let json = extract_json_array(page, "captionTracks").unwrap();
        let tracks: Vec<CaptionTrack> = serde_json::from_str(json).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].base_url, "https://www.youtube.com/api/timedtext?v=a&lang=en");
        assert_eq!(pick_track(&tracks, "en").unwrap().language_code, "en");
        assert_eq!(pick_track(&tracks, "fr").unwrap().language_code, "en");
    }

    #[test]
    fn test_timedtext_to_text() {
        let xml = r#"<?xml version="1.0"?><transcript><text start="0" dur="1.5">Hello &amp;#39;world&amp;#39;</text><text start="1.5" dur="2">it&#39;s
 a   test</text><text start="4" dur="1"></text></transcript>"#;
        assert_eq!(timedtext_to_text(xml), "Hello 'world' it's a test");
    }

    #[tokio::test]
    async fn test_saves_under_transcript_directory() {
        let dir = TempDir::new().unwrap();
        let cap = capability(&dir, Ok("hello transcript".to_string()));
        let msg = cap
            .invoke(
                r#"{"source": "https://youtu.be/aircAruvnKk", "destination-name": "transcript_1.txt"}"#,
                &InvocationContext::default(),
            )
            .await
            .unwrap();
        assert!(msg.contains("transcripts/transcript_1.txt"));
        let saved = std::fs::read_to_string(dir.path().join("transcripts/transcript_1.txt")).unwrap();
        assert_eq!(saved, "hello transcript");
    }

    #[tokio::test]
    async fn test_accepts_url_and_name_aliases() {
        let dir = TempDir::new().unwrap();
        let cap = capability(&dir, Ok("t".to_string()));
        cap.invoke(
            r#"{"url": "aircAruvnKk", "name": "transcript_2.txt"}"#,
            &InvocationContext::default(),
        )
        .await
        .unwrap();
        assert!(dir.path().join("transcripts/transcript_2.txt").exists());
    }

    #[tokio::test]
    async fn test_rejects_traversal_in_name() {
        let dir = TempDir::new().unwrap();
        let cap = capability(&dir, Ok("t".to_string()));
        let err = cap
            .invoke(
                r#"{"source": "aircAruvnKk", "destination-name": "../../escape.txt"}"#,
                &InvocationContext::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::PathEscape(_)));
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_provider_error_mentions_source() {
        let dir = TempDir::new().unwrap();
        let cap = capability(&dir, Err("no captions available".to_string()));
        let err = cap
            .invoke(
                r#"{"source": "aircAruvnKk", "destination-name": "t.txt"}"#,
                &InvocationContext::default(),
            )
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("aircAruvnKk"));
        assert!(err.contains("no captions available"));
    }

    #[tokio::test]
    async fn test_missing_fields_are_invalid_input() {
        let dir = TempDir::new().unwrap();
        let cap = capability(&dir, Ok("t".to_string()));
        let err = cap
            .invoke(r#"{"source": "aircAruvnKk"}"#, &InvocationContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidInput { .. }));
    }
}
