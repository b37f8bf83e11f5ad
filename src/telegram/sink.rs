use crate::error::{OcrelayError, Result};
use crate::pipeline::policy::ForwardingDecision;
use crate::pipeline::sink::{Delivery, Sink, no_text_caption, render_text};
use crate::telegram::api::BotApi;
use async_trait::async_trait;
use std::sync::Arc;

/// Relays decisions into one collection chat.
#[derive(Debug, Clone)]
pub struct TelegramSink {
    api: Arc<BotApi>,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(api: Arc<BotApi>, chat_id: impl Into<String>) -> Self {
        Self {
            api,
            chat_id: chat_id.into(),
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    async fn send(&self, delivery: &Delivery) -> Result<()> {
        let meta = &delivery.meta;
        let chat = self.chat_id.as_str();
        match &delivery.decision {
            ForwardingDecision::ForwardText(text) => {
                self.api.send_message(chat, &render_text(meta, text)).await?;
            }
            ForwardingDecision::ForwardMedia(_) => {
                self.api
                    .forward_message(chat, &meta.channel, meta.message_id)
                    .await?;
            }
            ForwardingDecision::ForwardTextAndMedia(text, image) => {
                self.api
                    .send_photo(chat, image, &render_text(meta, text))
                    .await?;
            }
            ForwardingDecision::NoTextFound(original) if original.is_image() => {
                self.api
                    .send_photo(chat, original, &no_text_caption(meta))
                    .await?;
            }
            ForwardingDecision::NoTextFound(original) => {
                self.api
                    .send_document(chat, original, &no_text_caption(meta))
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for TelegramSink {
    async fn deliver(&self, delivery: &Delivery) -> Result<()> {
        self.send(delivery)
            .await
            .map_err(|e| OcrelayError::SinkDelivery {
                message: format!("{} to chat {}: {e}", delivery.decision.label(), self.chat_id),
            })
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
