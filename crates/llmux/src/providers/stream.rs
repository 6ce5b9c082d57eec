//! Turning backend event streams into the canonical chunk sequence.
//!
//! Every backend family supplies a [`StreamDecoder`] that understands its native events.
//! [`normalize`] drives any decoder and owns the ordering rules: content in backend order,
//! then at most one `Usage`, then exactly one `Done`.
use eventsource_stream::{EventStreamError, Eventsource};
use futures::future::{self, Future};
use futures::stream::{self, Stream};
use futures::{StreamExt, TryStreamExt};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::base::ChunkStream;
use super::catalog::ModelInfo;
use super::retry::RetryPolicy;
use super::utils::Endpoint;
use crate::errors::{ConversionError, ProviderError, ProviderResult};
use crate::models::content::ContentBlock;
use crate::models::message::Message;
use crate::models::stream::{CompletedMessage, StopReason, StreamChunk, Usage};

/// What a decoder made of one native event
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Chunk(StreamChunk),
    Usage(Usage),
    Stop(StopReason),
    /// The backend signalled the end of the message, the transport can be released
    End,
}

pub trait StreamDecoder: Send + 'static {
    type Event: Send + 'static;

    fn decode(&mut self, event: Self::Event) -> ProviderResult<Vec<Decoded>>;

    /// Stop reason to report when the backend never sent one
    fn finish(&mut self) -> StopReason {
        StopReason::Unknown
    }

    /// Whether a complete message always ends with [`Decoded::End`]. When it does, a stop
    /// reason alone is not proof that the reply was delivered in full.
    fn requires_end(&self) -> bool {
        false
    }
}

/// Drive native events through a decoder into a canonical chunk stream.
///
/// Usage reports are merged and emitted once at the end, priced with `model` when the
/// backend did not report a cost itself. A transport that runs dry before the backend
/// signalled the end of the message yields a `Protocol` error instead of `Done`.
pub fn normalize<S, D>(events: S, mut decoder: D, model: ModelInfo) -> ChunkStream
where
    S: Stream<Item = ProviderResult<D::Event>> + Send + 'static,
    D: StreamDecoder,
{
    Box::pin(async_stream::stream! {
        let mut events = Box::pin(events);
        let mut usage: Option<Usage> = None;
        let mut stop_reason = None;
        let mut ended = false;

        'events: while let Some(event) = events.next().await {
            let decoded = match event.and_then(|event| decoder.decode(event)) {
                Ok(decoded) => decoded,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };
            for item in decoded {
                match item {
                    Decoded::Chunk(chunk) => {
                        yield Ok(chunk);
                    }
                    Decoded::Usage(report) => {
                        usage.get_or_insert_with(Usage::default).merge(&report);
                    }
                    Decoded::Stop(reason) => stop_reason = Some(reason),
                    Decoded::End => {
                        ended = true;
                        break 'events;
                    }
                }
            }
        }
        drop(events);

        if !ended && (stop_reason.is_none() || decoder.requires_end()) {
            yield Err(ProviderError::Protocol(
                "stream ended before the backend finished the message".to_string(),
            ));
            return;
        }

        if let Some(mut usage) = usage {
            if usage.total_cost.is_none() {
                usage.total_cost = model.calculate_cost(&usage);
            }
            yield Ok(StreamChunk::Usage(usage));
        }
        let stop_reason = stop_reason.unwrap_or_else(|| decoder.finish());
        yield Ok(StreamChunk::Done { stop_reason });
    })
}

fn parse_event<E: DeserializeOwned>(
    result: Result<eventsource_stream::Event, EventStreamError<reqwest::Error>>,
) -> Option<ProviderResult<E>> {
    match result {
        Ok(event) => {
            let data = event.data.trim();
            if data.is_empty() || data == "[DONE]" {
                return None;
            }
            match serde_json::from_str::<E>(data) {
                Ok(parsed) => Some(Ok(parsed)),
                Err(err) => {
                    tracing::warn!(event = %event.event, "Failed to parse stream event: {}", err);
                    Some(Err(ProviderError::Protocol(format!(
                        "unparsable {} stream event: {}",
                        if event.event.is_empty() { "message" } else { event.event.as_str() },
                        err
                    ))))
                }
            }
        }
        Err(EventStreamError::Transport(err)) => Some(Err(err.into())),
        Err(err) => Some(Err(ProviderError::Protocol(format!("Stream error: {}", err)))),
    }
}

/// Parse the server-sent events of a streaming response into native events
pub fn sse_events<E>(response: Response) -> impl Stream<Item = ProviderResult<E>> + Send + 'static
where
    E: DeserializeOwned + Send + 'static,
{
    response
        .bytes_stream()
        .eventsource()
        .filter_map(|result| future::ready(parse_event(result)))
}

/// A non-streaming backend's single response, as a one element event stream
pub fn single_response<F, E>(response: F) -> impl Stream<Item = ProviderResult<E>> + Send + 'static
where
    F: Future<Output = ProviderResult<E>> + Send + 'static,
    E: Send + 'static,
{
    stream::once(response)
}

/// POST `body` to a streaming endpoint and normalize its server-sent events with `D`.
///
/// Nothing is sent until the returned stream is first polled. Attempts that fail before
/// any chunk was delivered are retried according to `retry`.
pub fn stream_request<B, D>(
    endpoint: Endpoint,
    body: B,
    model: ModelInfo,
    retry: RetryPolicy,
) -> ChunkStream
where
    B: Serialize + Send + Sync + 'static,
    D: StreamDecoder + Default,
    D::Event: DeserializeOwned,
{
    let body = Arc::new(body);
    retry.run_stream(move || {
        let endpoint = endpoint.clone();
        let body = body.clone();
        let events = stream::once(async move { endpoint.post(body.as_ref()).await })
            .map_ok(sse_events::<D::Event>)
            .try_flatten();
        normalize(events, D::default(), model)
    })
}

/// Same as [`stream_request`] for backends that answer with a single JSON object
pub fn json_request<B, D>(
    endpoint: Endpoint,
    body: B,
    model: ModelInfo,
    retry: RetryPolicy,
) -> ChunkStream
where
    B: Serialize + Send + Sync + 'static,
    D: StreamDecoder + Default,
    D::Event: DeserializeOwned,
{
    let body = Arc::new(body);
    retry.run_stream(move || {
        let endpoint = endpoint.clone();
        let body = body.clone();
        let events = single_response(async move {
            let response = endpoint.post(body.as_ref()).await?;
            Ok::<_, ProviderError>(response.json::<D::Event>().await?)
        });
        normalize(events, D::default(), model)
    })
}

/// Fold a chunk stream into one assistant message.
///
/// Text fragments are concatenated, tool fragments are grouped by id and their input
/// parsed as JSON. Reasoning is not part of the canonical message and is dropped.
pub async fn collect_message(mut chunks: ChunkStream) -> ProviderResult<CompletedMessage> {
    let mut text = String::new();
    let mut tool_order: Vec<String> = Vec::new();
    let mut tools: HashMap<String, (String, String)> = HashMap::new();
    let mut usage = None;

    while let Some(chunk) = chunks.next().await {
        match chunk? {
            StreamChunk::Text { text: delta } => text.push_str(&delta),
            StreamChunk::Reasoning { .. } => {}
            StreamChunk::ToolUseDelta {
                id,
                name,
                partial_input,
            } => {
                if !tools.contains_key(&id) {
                    tool_order.push(id.clone());
                }
                tools
                    .entry(id)
                    .or_insert_with(|| (name, String::new()))
                    .1
                    .push_str(&partial_input);
            }
            StreamChunk::Usage(report) => usage = Some(report),
            StreamChunk::Done { stop_reason } => {
                let mut message = Message::assistant();
                if !text.is_empty() {
                    message = message.with_text(text);
                }
                for id in tool_order {
                    let (name, input) = tools.remove(&id).unwrap_or_default();
                    let input = if input.trim().is_empty() {
                        Value::Object(Default::default())
                    } else {
                        serde_json::from_str(&input).map_err(|err| {
                            ConversionError::MalformedResponse(format!(
                                "tool {} arguments are not valid JSON: {}",
                                name, err
                            ))
                        })?
                    };
                    message = message.with_content(ContentBlock::tool_use(id, name, input));
                }
                return Ok(CompletedMessage {
                    message,
                    usage,
                    stop_reason,
                });
            }
        }
    }

    Err(ProviderError::Protocol(
        "stream ended before the message was complete".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::catalog::OPENAI_COMPATIBLE_DEFAULTS;
    use indoc::indoc;
    use serde::Deserialize;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Events are "text:...", "usage:<in>:<out>", "stop" or "end"
    struct LineDecoder;

    impl StreamDecoder for LineDecoder {
        type Event = &'static str;

        fn decode(&mut self, event: &'static str) -> ProviderResult<Vec<Decoded>> {
            let parts: Vec<&str> = event.split(':').collect();
            Ok(match parts[0] {
                "text" => vec![Decoded::Chunk(StreamChunk::text(parts[1]))],
                "usage" => vec![Decoded::Usage(Usage::new(
                    parts[1].parse().unwrap(),
                    parts[2].parse().unwrap(),
                ))],
                "stop" => vec![Decoded::Stop(StopReason::MaxTokens)],
                "end" => vec![Decoded::End],
                "bad" => return Err(ProviderError::Protocol("bad event".to_string())),
                _ => vec![],
            })
        }
    }

    fn events(items: Vec<&'static str>) -> impl Stream<Item = ProviderResult<&'static str>> {
        stream::iter(items.into_iter().map(Ok))
    }

    #[tokio::test]
    async fn test_usage_then_done_come_last() {
        let chunks: Vec<StreamChunk> = normalize(
            events(vec!["usage:10:0", "text:a", "text:b", "usage:0:7", "text:c", "stop", "end"]),
            LineDecoder,
            OPENAI_COMPATIBLE_DEFAULTS,
        )
        .map(|c| c.unwrap())
        .collect()
        .await;

        assert_eq!(
            chunks,
            vec![
                StreamChunk::text("a"),
                StreamChunk::text("b"),
                StreamChunk::text("c"),
                StreamChunk::Usage(Usage {
                    input_tokens: 10,
                    output_tokens: 7,
                    total_cost: Some(0.0),
                    ..Default::default()
                }),
                StreamChunk::Done {
                    stop_reason: StopReason::MaxTokens
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_nothing_follows_end() {
        let chunks: Vec<StreamChunk> = normalize(
            events(vec!["text:a", "end", "text:late"]),
            LineDecoder,
            OPENAI_COMPATIBLE_DEFAULTS,
        )
        .map(|c| c.unwrap())
        .collect()
        .await;

        assert_eq!(
            chunks,
            vec![
                StreamChunk::text("a"),
                StreamChunk::Done {
                    stop_reason: StopReason::Unknown
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_transport_ending_early_is_an_error() {
        let chunks: Vec<ProviderResult<StreamChunk>> = normalize(
            events(vec!["usage:5:0", "text:The answer is"]),
            LineDecoder,
            OPENAI_COMPATIBLE_DEFAULTS,
        )
        .collect()
        .await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref().unwrap(), &StreamChunk::text("The answer is"));
        assert!(matches!(chunks[1], Err(ProviderError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_stop_without_end_completes() {
        let chunks: Vec<StreamChunk> = normalize(
            events(vec!["text:a", "stop"]),
            LineDecoder,
            OPENAI_COMPATIBLE_DEFAULTS,
        )
        .map(|c| c.unwrap())
        .collect()
        .await;

        assert_eq!(
            chunks,
            vec![
                StreamChunk::text("a"),
                StreamChunk::Done {
                    stop_reason: StopReason::MaxTokens
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_decoder_error_ends_stream() {
        let chunks: Vec<ProviderResult<StreamChunk>> = normalize(
            events(vec!["text:a", "bad", "text:b"]),
            LineDecoder,
            OPENAI_COMPATIBLE_DEFAULTS,
        )
        .collect()
        .await;

        assert_eq!(chunks.len(), 2);
        assert!(matches!(chunks[1], Err(ProviderError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_collect_message_groups_tool_fragments() {
        let chunks: Vec<ProviderResult<StreamChunk>> = vec![
            Ok(StreamChunk::text("Checking ")),
            Ok(StreamChunk::reasoning("hmm")),
            Ok(StreamChunk::text("now.")),
            Ok(StreamChunk::ToolUseDelta {
                id: "call_1".to_string(),
                name: "get_weather".to_string(),
                partial_input: "{\"city\":".to_string(),
            }),
            Ok(StreamChunk::ToolUseDelta {
                id: "call_1".to_string(),
                name: "get_weather".to_string(),
                partial_input: " \"Oslo\"}".to_string(),
            }),
            Ok(StreamChunk::Usage(Usage::new(5, 9))),
            Ok(StreamChunk::Done {
                stop_reason: StopReason::ToolUse,
            }),
        ];

        let completed = collect_message(stream::iter(chunks).boxed()).await.unwrap();
        assert_eq!(
            completed.message,
            Message::assistant()
                .with_text("Checking now.")
                .with_tool_use("call_1", "get_weather", json!({"city": "Oslo"}))
        );
        assert_eq!(completed.usage, Some(Usage::new(5, 9)));
        assert_eq!(completed.stop_reason, StopReason::ToolUse);
    }

    #[tokio::test]
    async fn test_collect_message_without_done_fails() {
        let chunks = stream::iter(vec![Ok(StreamChunk::text("cut"))]).boxed();
        assert!(matches!(
            collect_message(chunks).await,
            Err(ProviderError::Protocol(_))
        ));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Ping {
        n: u32,
    }

    #[tokio::test]
    async fn test_sse_events_skip_done_and_report_garbage() {
        let body = indoc! {r#"
            : keep-alive

            data: {"n": 1}

            data: not json

            data: {"n": 2}

            data: [DONE]

        "#};
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&mock_server)
            .await;

        let response = reqwest::get(mock_server.uri()).await.unwrap();
        let parsed: Vec<ProviderResult<Ping>> = sse_events::<Ping>(response).collect().await;

        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].as_ref().unwrap(), &Ping { n: 1 });
        assert!(matches!(parsed[1], Err(ProviderError::Protocol(_))));
        assert_eq!(parsed[2].as_ref().unwrap(), &Ping { n: 2 });
    }
}
