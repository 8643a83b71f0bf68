//! 能力集集成测试：经由 Harvester 的共享执行器调用各能力的非法输入

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use harvest::config::AppConfig;
    use harvest::llm::ScriptedReasoner;
    use harvest::tools::{InvocationContext, TranscriptProvider, TOP_LEVEL_DEPTH};
    use harvest::{HarvestBuilder, Harvester};
    use tempfile::TempDir;

    struct OfflineTranscripts;

    #[async_trait]
    impl TranscriptProvider for OfflineTranscripts {
        async fn fetch(&self, _source: &str) -> Result<String, String> {
            Err("network disabled".to_string())
        }
    }

    fn harvester(dir: &TempDir) -> Harvester {
        HarvestBuilder::new(AppConfig::default())
            .with_workspace(dir.path())
            .with_reasoner(Arc::new(ScriptedReasoner::new(Vec::<String>::new())))
            .with_transcript_provider(Arc::new(OfflineTranscripts))
            .build()
            .unwrap()
    }

    const CTX: InvocationContext = InvocationContext { depth: TOP_LEVEL_DEPTH };

    #[tokio::test]
    async fn test_invalid_input_is_described_per_capability() {
        let dir = TempDir::new().unwrap();
        let h = harvester(&dir);
        let cases = [
            ("search", "   ", "search"),
            ("video-search", ", 3", "video-search"),
            ("transcript-fetch", "not json at all", "transcript-fetch"),
            ("transcript-fetch", r#"{"source": "abc", "destination-name": "../x.txt"}"#, "../x.txt"),
            ("read-file", "missing.txt", "missing.txt"),
            ("write-file", "{\"path\": \"dataset.csv\"}", "write-file"),
            ("write-file", r#"{"path": "../outside.csv", "content": "x"}"#, "../outside.csv"),
            ("list-directory", "../x", "../x"),
            ("delegate", "  ", "delegate"),
        ];

        for (name, input, mention) in cases {
            let result = h.executor().invoke(name, input, &CTX).await;
            assert!(result.is_error, "{} accepted {:?}", name, input);
            assert!(result.text.starts_with("Error: "), "{}: {}", name, result.text);
            assert!(result.text.contains(mention), "{}: {}", name, result.text);
        }
    }

    #[tokio::test]
    async fn test_transcript_failure_names_source_and_cause() {
        let dir = TempDir::new().unwrap();
        let h = harvester(&dir);
        let result = h
            .executor()
            .invoke(
                "transcript-fetch",
                r#"{"url": "https://youtu.be/aircAruvnKk", "name": "transcript_1.txt"}"#,
                &CTX,
            )
            .await;
        assert!(result.is_error);
        assert!(result.text.contains("https://youtu.be/aircAruvnKk"));
        assert!(result.text.contains("network disabled"));
        assert!(!dir.path().join("transcripts/transcript_1.txt").exists());
    }

    #[tokio::test]
    async fn test_unknown_capability_lists_available_names() {
        let dir = TempDir::new().unwrap();
        let h = harvester(&dir);
        let result = h.executor().invoke("shell", "ls", &CTX).await;
        assert!(result.is_error);
        assert!(result.text.contains("shell"));
        assert!(result.text.contains("write-file"));
    }

    #[tokio::test]
    async fn test_write_then_list_and_read_back() {
        let dir = TempDir::new().unwrap();
        let h = harvester(&dir);
        let executor = h.executor();
        let write = r#"{"path": "dataset.csv", "content": "URL,Transcript\n"}"#;
        assert!(!executor.invoke("write-file", write, &CTX).await.is_error);
        assert!(!executor.invoke("write-file", write, &CTX).await.is_error);

        let listing = executor.invoke("list-directory", ".", &CTX).await;
        assert!(listing.text.contains("dataset.csv"));
        let read = executor.invoke("read-file", "dataset.csv", &CTX).await;
        assert_eq!(read.text, "URL,Transcript\nURL,Transcript\n");
    }
}
