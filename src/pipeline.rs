//! Inbound message handling and translated fan-out.
//!
//! A message starting with `/` is a command. Anything else from a member is
//! relayed to every other member: translated once per distinct target
//! language (concurrently), prefixed with the sender's display name, and sent
//! to several members at once. One member's failed send never stops the
//! others. The log entry is written in the background.

use crate::commands::{Dispatcher, Outcome};
use crate::i18n::{Language, Localizer, Text};
use crate::message_log::LogEntry;
use crate::roster::{normalize_identity, Member};
use crate::store::Store;
use crate::translation::TranslationClient;
use crate::whatsapp::TwilioClient;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Sends in flight at once during a fan-out. Each further batch of this many
/// recipients starts one delivery delay later.
const MAX_CONCURRENT_SENDS: usize = 8;

#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Raw sender handle, with or without the `whatsapp:` prefix
    pub sender: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

/// One outbound copy of a relayed message.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub recipient: String,
    pub name: String,
    pub language: Language,
    pub text: String,
    /// Whether `text` carries a translation (false for same-language
    /// recipients and for translation failures)
    pub translated: bool,
    pub sent: bool,
}

/// Result of handling one inbound message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dispatch {
    /// Reply to the sender, returned in the webhook response
    pub reply: Option<String>,
    pub deliveries: Vec<Delivery>,
}

impl Dispatch {
    fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: Some(text.into()),
            deliveries: Vec::new(),
        }
    }

    pub fn delivered(&self) -> usize {
        self.deliveries.iter().filter(|d| d.sent).count()
    }
}

/// Text prepared for one target language.
struct Rendered {
    text: String,
    translated: bool,
}

pub struct Pipeline {
    store: Arc<Store>,
    translator: Arc<TranslationClient>,
    localizer: Arc<Localizer>,
    dispatcher: Dispatcher,
    twilio: TwilioClient,
    delivery_delay: Duration,
}

impl Pipeline {
    pub fn new(
        store: Arc<Store>,
        translator: Arc<TranslationClient>,
        twilio: TwilioClient,
        delivery_delay: Duration,
    ) -> Self {
        let localizer = Arc::new(Localizer::new(translator.clone()));
        let dispatcher = Dispatcher::new(store.clone(), translator.clone(), localizer.clone());

        Self {
            store,
            translator,
            localizer,
            dispatcher,
            twilio,
            delivery_delay,
        }
    }

    pub fn translator(&self) -> &TranslationClient {
        &self.translator
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn handle(&self, message: InboundMessage) -> Dispatch {
        let sender = match normalize_identity(&message.sender)
            .ok()
            .and_then(|identity| self.store.get(&identity))
        {
            Some(member) => member,
            None => {
                warn!("Ignoring message from non-member {}", message.sender);
                return Dispatch::reply(Text::NotMember.english());
            }
        };

        let text = message.text.trim();
        if text.is_empty() {
            return Dispatch::default();
        }

        if text.starts_with('/') {
            return match self
                .dispatcher
                .dispatch(&sender, text, message.received_at)
                .await
            {
                Outcome::Reply(reply) => Dispatch::reply(reply),
                Outcome::Relay(body) => self.relay(&sender, &body, message.received_at).await,
            };
        }

        self.relay(&sender, text, message.received_at).await
    }

    /// Translate and deliver `text` from `sender` to every other member.
    async fn relay(&self, sender: &Member, text: &str, received_at: DateTime<Utc>) -> Dispatch {
        let text = text.trim();
        if text.is_empty() {
            return Dispatch::default();
        }

        let targets: Vec<Member> = self
            .store
            .members()
            .into_iter()
            .filter(|m| m.identity != sender.identity)
            .collect();

        info!(
            "Relaying message from {} to {} members",
            sender.name,
            targets.len()
        );

        let rendered = self.render_for(text, sender.language(), &targets).await;

        let sends: Vec<_> = targets
            .iter()
            .enumerate()
            .map(|(i, member)| {
                let language = member.language();
                let (body, translated) = match rendered.get(&language) {
                    Some(r) => (r.text.as_str(), r.translated),
                    None => (text, false),
                };
                let body = format!("{}: {}", sender.name, body);
                let pause = self.delivery_delay * (i / MAX_CONCURRENT_SENDS) as u32;

                async move {
                    if !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                    let sent = match self.twilio.send_message(&member.identity, &body).await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(
                                "Failed to deliver to {} ({}): {:#}",
                                member.name, member.identity, e
                            );
                            false
                        }
                    };
                    Delivery {
                        recipient: member.identity.clone(),
                        name: member.name.clone(),
                        language,
                        text: body,
                        translated,
                        sent,
                    }
                }
            })
            .collect();
        let deliveries: Vec<Delivery> = stream::iter(sends)
            .buffered(MAX_CONCURRENT_SENDS)
            .collect()
            .await;

        let mut dispatch = Dispatch {
            reply: None,
            deliveries,
        };
        let attempted = dispatch.deliveries.len();
        let delivered = dispatch.delivered();
        info!("✓ Delivered {}/{} copies", delivered, attempted);

        let entry = LogEntry {
            sender: sender.identity.clone(),
            timestamp: received_at,
            length: text.chars().count(),
            attempted,
            delivered,
        };
        let write = self.store.append_log(entry);
        let sender_name = sender.name.clone();
        tokio::spawn(async move {
            match write.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Message from {} was not logged: {}", sender_name, e),
                Err(e) => warn!("Log write for {} did not finish: {}", sender_name, e),
            }
        });

        if delivered < attempted {
            let notice = self
                .localizer
                .get(Text::PartialDelivery, sender.language())
                .await;
            dispatch.reply = Some(format!("{} {}/{}", notice, attempted - delivered, attempted));
        }

        dispatch
    }

    /// One text per distinct target language. Languages other than the
    /// sender's are translated concurrently, one request each.
    async fn render_for(
        &self,
        text: &str,
        source: Language,
        targets: &[Member],
    ) -> HashMap<Language, Rendered> {
        let mut languages: Vec<Language> = Vec::new();
        for member in targets {
            let language = member.language();
            if language != source && !languages.contains(&language) {
                languages.push(language);
            }
        }

        let results = join_all(languages.iter().map(|&target| async move {
            let result = self.translator.translate(text, Some(source), target).await;
            (target, result)
        }))
        .await;

        let mut rendered = HashMap::with_capacity(results.len() + 1);
        rendered.insert(
            source,
            Rendered {
                text: text.to_string(),
                translated: false,
            },
        );

        for (target, result) in results {
            let entry = match result {
                Ok(translated) => Rendered {
                    text: translated,
                    translated: true,
                },
                Err(e) => {
                    warn!("Sending untranslated text to {} members: {}", target, e);
                    let marker = self
                        .localizer
                        .cached_or_english(Text::TranslationUnavailable, target);
                    Rendered {
                        text: format!("[{}] {}", marker, text),
                        translated: false,
                    }
                }
            };
            rendered.insert(target, entry);
        }

        rendered
    }
}
