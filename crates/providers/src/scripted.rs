//! Local model implementations.
//!
//! [`ScriptedModel`] replays a fixed part sequence (deterministic turn
//! tests). [`EchoModel`] answers by echoing the user's message — the
//! offline default so the runtime works end to end with no network or
//! credentials.

use pa_domain::stream::{BoxStream, ModelPart, ModelRequest, TokenUsage};
use pa_domain::turn::ParticipantRole;
use pa_domain::Result;

/// Replays a pre-baked sequence of parts on every call.
pub struct ScriptedModel {
    parts: Vec<ModelPart>,
}

impl ScriptedModel {
    pub fn new(parts: Vec<ModelPart>) -> Self {
        Self { parts }
    }

    /// A minimal text-only script ending in a `stop` finish.
    pub fn text(chunks: &[&str], output_tokens: u64) -> Self {
        let mut parts: Vec<ModelPart> = chunks
            .iter()
            .map(|c| ModelPart::TextDelta {
                text: (*c).to_owned(),
            })
            .collect();
        parts.push(ModelPart::Finished {
            finish_reason: Some("stop".to_owned()),
            usage: Some(TokenUsage {
                input_tokens: 0,
                output_tokens,
                total_tokens: output_tokens,
            }),
        });
        Self { parts }
    }
}

#[async_trait::async_trait]
impl crate::LanguageModel for ScriptedModel {
    async fn stream_turn(
        &self,
        _req: ModelRequest,
    ) -> Result<BoxStream<'static, Result<ModelPart>>> {
        let parts = self.parts.clone();
        Ok(Box::pin(async_stream::stream! {
            for part in parts {
                yield Ok(part);
            }
        }))
    }
}

/// Factory handing out [`EchoModel`] for every binding — the default
/// wiring when no real provider adapter is configured.
#[derive(Default)]
pub struct OfflineFactory;

impl crate::ModelFactory for OfflineFactory {
    fn create(
        &self,
        binding: &crate::ModelBinding,
    ) -> Result<std::sync::Arc<dyn crate::LanguageModel>> {
        tracing::info!(
            provider = %binding.provider,
            model_id = %binding.model_id,
            has_key = binding.api_key.is_some(),
            "binding offline echo model"
        );
        Ok(std::sync::Arc::new(EchoModel))
    }
}

/// Echoes the last user message back as assistant text.
#[derive(Default)]
pub struct EchoModel;

#[async_trait::async_trait]
impl crate::LanguageModel for EchoModel {
    async fn stream_turn(
        &self,
        req: ModelRequest,
    ) -> Result<BoxStream<'static, Result<ModelPart>>> {
        let text = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == ParticipantRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let words: Vec<String> = text.split_whitespace().map(str::to_owned).collect();
        let output_tokens = words.len() as u64;

        Ok(Box::pin(async_stream::stream! {
            yield Ok(ModelPart::TextDelta {
                text: "You said: ".to_owned(),
            });
            for (i, word) in words.into_iter().enumerate() {
                let text = if i == 0 { word } else { format!(" {word}") };
                yield Ok(ModelPart::TextDelta { text });
            }
            yield Ok(ModelPart::Finished {
                finish_reason: Some("stop".to_owned()),
                usage: Some(TokenUsage {
                    input_tokens: 0,
                    output_tokens: output_tokens + 2,
                    total_tokens: output_tokens + 2,
                }),
            });
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LanguageModel;
    use futures_util::StreamExt;
    use pa_domain::stream::ModelMessage;

    #[tokio::test]
    async fn scripted_model_replays_in_order() {
        let model = ScriptedModel::text(&["Hello", ", world"], 2);
        let mut stream = model.stream_turn(ModelRequest::default()).await.unwrap();

        let mut texts = Vec::new();
        let mut finish = None;
        while let Some(part) = stream.next().await {
            match part.unwrap() {
                ModelPart::TextDelta { text } => texts.push(text),
                ModelPart::Finished { finish_reason, .. } => finish = finish_reason,
                _ => {}
            }
        }
        assert_eq!(texts, vec!["Hello", ", world"]);
        assert_eq!(finish.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn echo_model_reflects_user_message() {
        let model = EchoModel;
        let req = ModelRequest {
            messages: vec![ModelMessage {
                role: ParticipantRole::User,
                content: "ping pong".to_owned(),
            }],
            ..Default::default()
        };
        let mut stream = model.stream_turn(req).await.unwrap();

        let mut buf = String::new();
        while let Some(part) = stream.next().await {
            if let ModelPart::TextDelta { text } = part.unwrap() {
                buf.push_str(&text);
            }
        }
        assert_eq!(buf, "You said: ping pong");
    }
}
