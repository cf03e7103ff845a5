use std::sync::Arc;

use async_trait::async_trait;
use comfy_sync_core::sink::ArtifactSink;

/// Tries `primary` first and `fallback` when it yields no URL.
pub struct FallbackSink {
    primary: Arc<dyn ArtifactSink>,
    fallback: Arc<dyn ArtifactSink>,
}

impl FallbackSink {
    pub fn new(primary: Arc<dyn ArtifactSink>, fallback: Arc<dyn ArtifactSink>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl ArtifactSink for FallbackSink {
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> Option<String> {
        if let Some(url) = self.primary.store(bytes, suggested_name).await {
            return Some(url);
        }
        tracing::info!(
            primary = self.primary.kind(),
            fallback = self.fallback.kind(),
            file_name = %suggested_name,
            "Primary sink returned no URL, falling back",
        );
        self.fallback.store(bytes, suggested_name).await
    }

    fn kind(&self) -> &'static str {
        self.primary.kind()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct StubSink {
        url: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl StubSink {
        fn new(url: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                url,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ArtifactSink for StubSink {
        async fn store(&self, _bytes: &[u8], _suggested_name: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.url.map(str::to_string)
        }

        fn kind(&self) -> &'static str {
            "stub"
        }
    }

    #[tokio::test]
    async fn primary_url_short_circuits() {
        let primary = StubSink::new(Some("https://bucket/a.png"));
        let fallback = StubSink::new(Some("/output_images/a.png"));
        let sink = FallbackSink::new(primary.clone(), fallback.clone());

        let url = sink.store(b"png", "a.png").await;

        assert_eq!(url.as_deref(), Some("https://bucket/a.png"));
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_primary_url_uses_fallback() {
        let primary = StubSink::new(None);
        let fallback = StubSink::new(Some("/output_images/a.png"));
        let sink = FallbackSink::new(primary.clone(), fallback.clone());

        let url = sink.store(b"png", "a.png").await;

        assert_eq!(url.as_deref(), Some("/output_images/a.png"));
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn both_failing_yields_none() {
        let sink = FallbackSink::new(StubSink::new(None), StubSink::new(None));
        assert!(sink.store(b"png", "a.png").await.is_none());
    }
}
