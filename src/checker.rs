use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveTime};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::SlotCheckerError;
use crate::intra::{Endpoints, IntraClient};
use crate::notify::Sender;

const HEALTH_DELAY: Duration = Duration::from_secs(60);

/// What the polling loop decides to do with one discovered slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotOutcome {
    Dispatch,
    OutOfWindow,
    AlreadySent,
}

/// Watches the configured project pages and notifies on qualifying slots.
pub struct Checker {
    config: Config,
    config_path: PathBuf,
    endpoints: Endpoints,
}

impl Checker {
    pub fn new(config: Config, config_path: PathBuf) -> Self {
        Self {
            config,
            config_path,
            endpoints: Endpoints::default(),
        }
    }

    /// Run until a fatal error. Each configuration generation gets a fresh
    /// session, sender and sent-set; a config reload starts a new generation
    /// rather than merging state into the old one.
    pub async fn run(mut self) -> Result<(), SlotCheckerError> {
        spawn_health_loop();
        loop {
            info!("Check for available slots");
            let intra = IntraClient::signin(
                &self.config.login,
                &self.config.password,
                self.endpoints.clone(),
            )
            .await?;
            let sender = self.config.channel.as_ref().map(Sender::new);
            let mut sent: HashSet<u64> = HashSet::new();

            loop {
                if self.config.is_stale(&self.config_path) {
                    self.config = Config::load(&self.config_path)?;
                    break;
                }
                for project in &self.config.projects {
                    let slots = intra
                        .project_slots(project, self.config.start, self.config.end)
                        .await?;
                    for slot in &slots {
                        let Some(start) = slot.start_time() else {
                            warn!("Slot {} has an unexpected start time: {}", slot.id, slot.start);
                            continue;
                        };
                        info!(
                            "found slot for project {project}, {} at {}\n{slot:?}",
                            start.format("%d/%m/%Y"),
                            start.format("%H:%M"),
                        );
                        let outcome = classify_slot(
                            start.time(),
                            self.config.window,
                            self.config.avoid_spam,
                            &sent,
                            slot.id,
                        );
                        match outcome {
                            SlotOutcome::Dispatch => {
                                let message = format_notification(project, &start);
                                match &sender {
                                    Some(sender) => {
                                        info!("send to {}", sender.channel_name());
                                        if let Err(err) = sender.send(&message).await {
                                            error!("could not deliver the notification: {err}");
                                        }
                                    }
                                    None => {
                                        debug!("no send channel configured, slot only logged")
                                    }
                                }
                                sent.insert(slot.id);
                            }
                            SlotOutcome::AlreadySent => {
                                info!("Slot details already sent once -> avoiding spam");
                            }
                            SlotOutcome::OutOfWindow => {
                                info!("the slot is not in the disponibility range, not sending");
                            }
                        }
                    }
                }
                tokio::time::sleep(self.config.refresh).await;
            }
        }
    }
}

/// A slot qualifies only strictly inside the window; a start exactly on
/// either boundary stays out. A disabled window rejects everything.
fn classify_slot(
    slot_time: NaiveTime,
    window: Option<(NaiveTime, NaiveTime)>,
    avoid_spam: bool,
    sent: &HashSet<u64>,
    slot_id: u64,
) -> SlotOutcome {
    let in_window = window.is_some_and(|(start, end)| slot_time > start && slot_time < end);
    if !in_window {
        return SlotOutcome::OutOfWindow;
    }
    if avoid_spam && sent.contains(&slot_id) {
        return SlotOutcome::AlreadySent;
    }
    SlotOutcome::Dispatch
}

fn format_notification(project: &str, start: &DateTime<FixedOffset>) -> String {
    format!(
        "Slot found for <b>{project}</b> project :\n<b>{}</b> at <b>{}</b>",
        start.format("%A %d/%m"),
        start.format("%H:%M"),
    )
}

/// Heartbeat so a hung polling loop is still observable in the logs. The
/// task is detached on purpose: nothing joins it and it never delays exit.
fn spawn_health_loop() {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(HEALTH_DELAY);
        loop {
            tick.tick().await;
            info!("[Health check] slot checker still alive");
        }
    });
}
