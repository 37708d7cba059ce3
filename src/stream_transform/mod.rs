//! Stream adapters over reconciled turn events.

use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::Result;
use crate::events::StreamEvent;
use crate::stream::StreamReconciler;
use crate::types::StreamChunk;

/// Turn a stream of provider chunks into the ordered stream of turn events.
///
/// Events for one chunk are yielded before the next chunk is polled. The
/// stream ends after the first error; dropping it discards partial state.
pub fn reconcile_stream(
    reconciler: StreamReconciler,
    chunks: BoxStream<'static, Result<StreamChunk>>,
) -> BoxStream<'static, Result<StreamEvent>> {
    let transformed = async_stream::stream! {
        let mut reconciler = reconciler;
        let mut inner = std::pin::pin!(chunks);
        while let Some(item) = inner.next().await {
            let events = match item.and_then(|chunk| reconciler.reconcile(&chunk)) {
                Ok(events) => events,
                Err(e) => {
                    yield Err(e);
                    break;
                }
            };
            for event in events {
                yield Ok(event);
            }
        }
    };
    Box::pin(transformed)
}

/// Trait for transforming a stream of turn events.
pub trait StreamTransform: Send + Sync {
    fn transform(
        &self,
        stream: BoxStream<'static, Result<StreamEvent>>,
    ) -> BoxStream<'static, Result<StreamEvent>>;
}

/// Drop events that fail a predicate, e.g. reasoning deltas for a surface
/// that does not render them.
pub struct FilterTransform {
    predicate: std::sync::Arc<dyn Fn(&StreamEvent) -> bool + Send + Sync>,
}

impl FilterTransform {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&StreamEvent) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: std::sync::Arc::new(predicate),
        }
    }

    /// Keep everything except reasoning deltas.
    pub fn without_reasoning() -> Self {
        Self::new(|event| !matches!(event, StreamEvent::ReasoningDelta { .. }))
    }
}

impl StreamTransform for FilterTransform {
    fn transform(
        &self,
        stream: BoxStream<'static, Result<StreamEvent>>,
    ) -> BoxStream<'static, Result<StreamEvent>> {
        let predicate = self.predicate.clone();
        let transformed = async_stream::stream! {
            let mut inner = std::pin::pin!(stream);
            while let Some(item) = inner.next().await {
                match item {
                    Ok(event) => {
                        if (predicate)(&event) {
                            yield Ok(event);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };
        Box::pin(transformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TurnError;
    use crate::types::{ProviderDelta, TurnMetadata};

    fn chunk(text: &str) -> Result<StreamChunk> {
        Ok(StreamChunk::new(
            TurnMetadata::new("run", "thread", "agent", 1),
            ProviderDelta::text(text),
        ))
    }

    #[tokio::test]
    async fn yields_events_in_dispatch_order() {
        let chunks = futures::stream::iter(vec![chunk("a"), chunk("b")]).boxed();
        let events: Vec<_> = reconcile_stream(StreamReconciler::default(), chunks)
            .collect()
            .await;
        let kinds: Vec<_> = events
            .iter()
            .map(|e| e.as_ref().map(StreamEvent::kind).unwrap())
            .collect();
        assert_eq!(kinds, ["step_created", "message_delta", "message_delta"]);
    }

    #[tokio::test]
    async fn stops_after_first_error() {
        let missing = Ok(StreamChunk {
            metadata: None,
            delta: ProviderDelta::text("x"),
        });
        let chunks = futures::stream::iter(vec![missing, chunk("never")]).boxed();
        let events: Vec<_> = reconcile_stream(StreamReconciler::default(), chunks)
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(TurnError::ContextMissing(_))));
    }

    #[tokio::test]
    async fn filter_drops_reasoning() {
        let chunks = futures::stream::iter(vec![chunk("<think>hmm</think>ok")]).boxed();
        let stream = reconcile_stream(StreamReconciler::default(), chunks);
        let events: Vec<_> = FilterTransform::without_reasoning()
            .transform(stream)
            .collect()
            .await;
        assert!(events
            .iter()
            .all(|e| !matches!(e, Ok(StreamEvent::ReasoningDelta { .. }))));
        assert_eq!(events.len(), 3);
    }
}
