use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::config::ChannelConfig;
use crate::error::SlotCheckerError;

/// Delivers one formatted message to the configured channel. Telegram is the
/// only kind today.
pub struct Sender {
    bot: Bot,
    chat_id: ChatId,
}

impl Sender {
    pub fn new(channel: &ChannelConfig) -> Self {
        match channel {
            ChannelConfig::Telegram { token, chat_id } => Self {
                bot: Bot::new(token.clone()),
                chat_id: ChatId(*chat_id),
            },
        }
    }

    pub fn channel_name(&self) -> &'static str {
        "telegram"
    }

    /// No retry; a delivery failure propagates to the caller.
    pub async fn send(&self, message: &str) -> Result<(), SlotCheckerError> {
        self.bot
            .send_message(self.chat_id, message)
            .parse_mode(ParseMode::Html)
            .await
            .map_err(SlotCheckerError::Notify)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telegram_channel_builds_a_sender() {
        let sender = Sender::new(&ChannelConfig::Telegram {
            token: "123:abc".to_string(),
            chat_id: 42,
        });
        assert_eq!(sender.channel_name(), "telegram");
        assert_eq!(sender.chat_id, ChatId(42));
    }
}
