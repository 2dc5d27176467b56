use async_stream::stream;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::{future::Future, pin::Pin};

use crate::error::LlmError;
use crate::llm::TokenStream;

/**
 * \brief Body stream handed to the HTTP response.
 */
pub type RelayStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/**
 * \brief Forwards provider text chunk by chunk and runs `on_completion` once with the full text.
 * \details The hook runs after the last chunk and before the stream ends, so the response body
 * is not finished until it returns. A provider error ends the stream without running the hook;
 * dropping the stream early (client gone) skips it too. Hook failures are only logged.
 */
pub fn relay_with_completion<F, Fut>(mut tokens: TokenStream, on_completion: F) -> RelayStream
where
    F: FnOnce(String) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let out = stream! {
        let mut completion = String::new();
        while let Some(item) = tokens.next().await {
            match item {
                Ok(text) => {
                    completion.push_str(&text);
                    yield Ok(Bytes::from(text));
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        received = completion.len(),
                        "provider stream aborted, transcript not saved"
                    );
                    yield Err(e);
                    return;
                }
            }
        }
        if let Err(e) = on_completion(completion).await {
            tracing::error!(error = ?e, "completion hook failed");
        }
    };

    Box::pin(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use futures_util::stream;
    use std::sync::{Arc, Mutex};

    fn tokens(items: Vec<Result<&'static str, LlmError>>) -> TokenStream {
        Box::pin(stream::iter(
            items.into_iter().map(|r| r.map(|s| s.to_string())),
        ))
    }

    #[tokio::test]
    async fn test_chunks_pass_through_and_hook_sees_full_text() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let relay = relay_with_completion(tokens(vec![Ok("Hi"), Ok(" there")]), move |text| async move {
            sink.lock().expect("lock").push(text);
            Ok(())
        });

        let chunks = relay.collect::<Vec<_>>().await;
        let chunks = chunks
            .into_iter()
            .map(|c| c.expect("chunk"))
            .collect::<Vec<_>>();
        assert_eq!(chunks, vec![Bytes::from("Hi"), Bytes::from(" there")]);
        assert_eq!(*seen.lock().expect("lock"), vec!["Hi there".to_string()]);
    }

    #[tokio::test]
    async fn test_hook_runs_before_stream_end() {
        let seen = Arc::new(Mutex::new(false));
        let sink = seen.clone();
        let mut relay = relay_with_completion(tokens(vec![Ok("x")]), move |_| async move {
            *sink.lock().expect("lock") = true;
            Ok(())
        });

        assert!(relay.next().await.is_some());
        assert!(!*seen.lock().expect("lock"));
        assert!(relay.next().await.is_none());
        assert!(*seen.lock().expect("lock"));
    }

    #[tokio::test]
    async fn test_provider_error_skips_hook() {
        let calls = Arc::new(Mutex::new(0));
        let sink = calls.clone();
        let relay = relay_with_completion(
            tokens(vec![Ok("partial"), Err(LlmError::Decode("boom".into())), Ok("never")]),
            move |_| async move {
                *sink.lock().expect("lock") += 1;
                Ok(())
            },
        );

        let items = relay.collect::<Vec<_>>().await;
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
        assert_eq!(*calls.lock().expect("lock"), 0);
    }

    #[tokio::test]
    async fn test_dropped_stream_skips_hook() {
        let calls = Arc::new(Mutex::new(0));
        let sink = calls.clone();
        let mut relay = relay_with_completion(tokens(vec![Ok("a"), Ok("b")]), move |_| async move {
            *sink.lock().expect("lock") += 1;
            Ok(())
        });
        assert!(relay.next().await.is_some());
        drop(relay);
        assert_eq!(*calls.lock().expect("lock"), 0);
    }

    #[tokio::test]
    async fn test_hook_failure_does_not_break_body() {
        let relay = relay_with_completion(tokens(vec![Ok("done")]), |_| async move {
            Err(anyhow!("disk full"))
        });
        let items = relay.collect::<Vec<_>>().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_ok());
    }
}
