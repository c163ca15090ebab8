use std::time::Duration;
use futures::StreamExt;
use ig_core::{JobHandle, JobStatus, StatusTag};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use crate::error::{PollingError, TransportError};
use super::schemas::JobStatusResponse;

/// A status snapshot delivered without being asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct PushUpdate {
    pub handle: JobHandle,
    pub status: JobStatus,
}

/// Secondary status transport: the backend's `/ws` relay.
pub struct PushChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl PushChannel {
    /// Opens the channel; the handshake is bounded by `timeout` like any HTTP call.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, TransportError> {
        log::info!("Connecting push channel at {url}");
        let (stream, _) = tokio::time::timeout(timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;
        Ok(Self { stream })
    }

    /// Next update for any job; `None` once the backend closes the channel.
    pub async fn next_update(&mut self) -> Option<Result<PushUpdate, TransportError>> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if let Some(update) = decode_push_message(text.as_str()) {
                        return Some(Ok(update));
                    }
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
        None
    }

    /// Follows `handle` until a terminal snapshot, with the same observer and
    /// cancellation contract as the status poller.
    pub async fn follow(
        &mut self,
        handle: &JobHandle,
        cancel: &CancellationToken,
        mut observer: impl FnMut(&JobStatus) + Send,
    ) -> Result<JobStatus, PollingError> {
        loop {
            let update = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PollingError::Cancelled(handle.clone())),
                update = self.next_update() => update,
            };

            let update = match update {
                Some(Ok(update)) => update,
                Some(Err(source)) => {
                    return Err(PollingError::Transport {
                        handle: handle.clone(),
                        source,
                    })
                }
                None => {
                    return Err(PollingError::Transport {
                        handle: handle.clone(),
                        source: TransportError::Push(tungstenite::Error::ConnectionClosed),
                    })
                }
            };

            if &update.handle != handle {
                continue;
            }
            observer(&update.status);
            if update.status.is_terminal() {
                return Ok(update.status);
            }
        }
    }
}

/// Maps one relayed message onto the polling schema. Messages that carry no
/// job id or no status information yield `None`.
pub fn decode_push_message(text: &str) -> Option<PushUpdate> {
    let value: Value = serde_json::from_str(text).ok()?;

    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        // Already in the polling schema.
        let handle = JobHandle::new(value.get("prompt_id")?.as_str()?);
        let resp: JobStatusResponse = serde_json::from_value(value).ok()?;
        return Some(PushUpdate {
            handle,
            status: resp.into(),
        });
    };

    let data = value.get("data")?;
    let handle = JobHandle::new(data.get("prompt_id")?.as_str()?);

    let status = match kind {
        "execution_start" => JobStatus::running(0.0),
        "progress" => {
            let current = data.get("value").and_then(Value::as_f64);
            let max = data.get("max").and_then(Value::as_f64).filter(|m| *m > 0.0);
            let fraction = current.zip(max).map(|(v, m)| v / m);
            JobStatus::new(StatusTag::Running, fraction, None, None)
        }
        "executing" if data.get("node").is_some_and(Value::is_null) => JobStatus::completed(),
        "execution_success" => JobStatus::completed(),
        "execution_error" => {
            let message = data
                .get("exception_message")
                .and_then(Value::as_str)
                .unwrap_or("execution error");
            JobStatus::failed(message)
        }
        "execution_interrupted" => JobStatus::failed("execution interrupted"),
        _ => return None,
    };

    Some(PushUpdate { handle, status })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use serde_json::json;
    use tokio::net::TcpListener;

    /// Serves one websocket client, sends `messages` and closes.
    async fn serve(messages: Vec<Value>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            for message in messages {
                ws.send(Message::text(message.to_string())).await.unwrap();
            }
            let _ = ws.close(None).await;
        });
        format!("ws://{addr}/ws")
    }

    async fn channel(url: &str) -> PushChannel {
        PushChannel::connect(url, Duration::from_secs(5)).await.unwrap()
    }

    #[tokio::test]
    async fn test_follow_reports_own_job_until_terminal() {
        let url = serve(vec![
            json!({"type": "execution_start", "data": {"prompt_id": "other"}}),
            json!({"type": "execution_start", "data": {"prompt_id": "123"}}),
            json!({"type": "progress", "data": {"prompt_id": "123", "value": 10, "max": 20}}),
            json!({"type": "executing", "data": {"prompt_id": "123", "node": null}}),
            json!({"type": "progress", "data": {"prompt_id": "123", "value": 20, "max": 20}}),
        ])
        .await;

        let mut seen = Vec::new();
        let last = channel(&url)
            .await
            .follow(&JobHandle::new("123"), &CancellationToken::new(), |s| seen.push(s.clone()))
            .await
            .unwrap();

        assert_eq!(
            seen,
            vec![JobStatus::running(0.0), JobStatus::running(0.5), JobStatus::completed()]
        );
        assert_eq!(last, JobStatus::completed());
    }

    #[tokio::test]
    async fn test_follow_reports_execution_error() {
        let url = serve(vec![json!({
            "type": "execution_error",
            "data": {"prompt_id": "123", "exception_message": "CUDA out of memory"}
        })])
        .await;

        let last = channel(&url)
            .await
            .follow(&JobHandle::new("123"), &CancellationToken::new(), |_| {})
            .await
            .unwrap();
        assert_eq!(last, JobStatus::failed("CUDA out of memory"));
    }

    #[tokio::test]
    async fn test_close_before_terminal_is_transport_error() {
        let url = serve(vec![json!({"type": "execution_start", "data": {"prompt_id": "123"}})]).await;

        let mut seen = 0;
        let err = channel(&url)
            .await
            .follow(&JobHandle::new("123"), &CancellationToken::new(), |_| seen += 1)
            .await
            .unwrap_err();

        assert!(matches!(err, PollingError::Transport { ref handle, .. } if handle.as_str() == "123"));
        assert_eq!(seen, 1);
    }

    #[tokio::test]
    async fn test_follow_cancelled() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = channel(&format!("ws://{addr}/ws"))
            .await
            .follow(&JobHandle::new("123"), &cancel, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PollingError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_stalled_handshake_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let result = PushChannel::connect(&format!("ws://{addr}/ws"), Duration::from_millis(100)).await;
        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }

    fn decode(text: &str) -> Option<(String, JobStatus)> {
        decode_push_message(text).map(|u| (u.handle.to_string(), u.status))
    }

    #[test]
    fn test_progress_event() {
        let (id, status) =
            decode(r#"{"type":"progress","data":{"value":5,"max":20,"prompt_id":"abc"}}"#).unwrap();
        assert_eq!(id, "abc");
        assert_eq!(status, JobStatus::running(0.25));
    }

    #[test]
    fn test_execution_finished() {
        let (_, status) =
            decode(r#"{"type":"executing","data":{"node":null,"prompt_id":"abc"}}"#).unwrap();
        assert_eq!(status, JobStatus::completed());

        assert!(decode(r#"{"type":"executing","data":{"node":"3","prompt_id":"abc"}}"#).is_none());
    }

    #[test]
    fn test_execution_error() {
        let (_, status) = decode(
            r#"{"type":"execution_error","data":{"prompt_id":"abc","exception_message":"CUDA out of memory"}}"#,
        )
        .unwrap();
        assert_eq!(status, JobStatus::failed("CUDA out of memory"));
    }

    #[test]
    fn test_polling_schema_passthrough() {
        let (id, status) =
            decode(r#"{"prompt_id":"xyz","status":"pending","queue_position":3}"#).unwrap();
        assert_eq!(id, "xyz");
        assert_eq!(status, JobStatus::pending(3));
    }

    #[test]
    fn test_messages_without_job_are_ignored() {
        assert!(decode(r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":0}}}}"#).is_none());
        assert!(decode("not json").is_none());
        assert!(decode(r#"{"type":"crystools.monitor","data":{}}"#).is_none());
    }
}
