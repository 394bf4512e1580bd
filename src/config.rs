use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, SystemTime};

use chrono::{Days, Local, NaiveDate, NaiveTime};
use regex::Regex;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::error::SlotCheckerError;

const KNOWN_CHANNELS: &[&str] = &["telegram"];
const TELEGRAM_OPTIONS: &[&str] = &["token", "chat_id"];

const DEFAULT_REFRESH_SECS: u64 = 30;
const DEFAULT_CHECK_RANGE_DAYS: u64 = 7;
const DEFAULT_DISPONIBILITY: &str = "00:00-23:59";

/// Raw shape of the YAML file, before validation.
#[derive(Debug, Deserialize)]
struct RawConfig {
    login: String,
    password: String,
    projects: Vec<String>,
    send: Option<HashMap<String, HashMap<String, String>>>,
    refresh: Option<u64>,
    check_range: Option<u64>,
    disponibility: Option<String>,
    avoid_spam: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelConfig {
    Telegram { token: String, chat_id: i64 },
}

/// Validated operator configuration. Loaded whole, replaced whole on reload,
/// never partially mutated.
#[derive(Debug, Clone)]
pub struct Config {
    pub login: String,
    pub password: String,
    pub projects: Vec<String>,
    pub channel: Option<ChannelConfig>,
    pub refresh: Duration,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Daily availability window. `None` means disabled: no slot ever passes.
    pub window: Option<(NaiveTime, NaiveTime)>,
    pub avoid_spam: bool,
    mtime: SystemTime,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, SlotCheckerError> {
        info!("Loading configuration from file {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|err| {
            SlotCheckerError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        let mtime = std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .unwrap_or_else(|_| SystemTime::now());
        let raw: RawConfig = serde_yaml::from_str(&text)
            .map_err(|err| SlotCheckerError::Config(err.to_string()))?;
        Self::from_raw(raw, mtime)
    }

    fn from_raw(raw: RawConfig, mtime: SystemTime) -> Result<Self, SlotCheckerError> {
        if raw.projects.is_empty() {
            return Err(SlotCheckerError::Config(
                "projects must list at least one project".to_string(),
            ));
        }

        let channel = match raw.send {
            Some(send) => Some(validate_channel(send)?),
            None => None,
        };

        let check_range = raw.check_range.unwrap_or(DEFAULT_CHECK_RANGE_DAYS);
        let start = Local::now().date_naive();
        let end = start.checked_add_days(Days::new(check_range)).ok_or_else(|| {
            SlotCheckerError::Config(format!("check_range is out of range: {check_range}"))
        })?;

        let disponibility = raw
            .disponibility
            .unwrap_or_else(|| DEFAULT_DISPONIBILITY.to_string());

        Ok(Self {
            login: raw.login,
            password: raw.password,
            projects: raw.projects,
            channel,
            refresh: Duration::from_secs(raw.refresh.unwrap_or(DEFAULT_REFRESH_SECS)),
            start,
            end,
            window: parse_window(&disponibility),
            avoid_spam: raw.avoid_spam.unwrap_or(false),
            mtime,
        })
    }

    /// True when the file changed since this configuration was loaded.
    pub fn is_stale(&self, path: &Path) -> bool {
        match std::fs::metadata(path).and_then(|meta| meta.modified()) {
            Ok(modified) if modified > self.mtime => {
                info!("Config file has changed since starting the slot checker");
                true
            }
            Ok(_) => false,
            Err(err) => {
                warn!("Could not stat config file {}: {err}", path.display());
                false
            }
        }
    }
}

fn validate_channel(
    send: HashMap<String, HashMap<String, String>>,
) -> Result<ChannelConfig, SlotCheckerError> {
    let mut channel = None;
    for (kind, options) in send {
        if !KNOWN_CHANNELS.contains(&kind.as_str()) {
            return Err(SlotCheckerError::Config(format!(
                "unknown send channel: {kind}"
            )));
        }
        for key in options.keys() {
            if !TELEGRAM_OPTIONS.contains(&key.as_str()) {
                return Err(SlotCheckerError::Config(format!(
                    "unknown {kind} option: {key}"
                )));
            }
        }
        let token = options
            .get("token")
            .ok_or_else(|| SlotCheckerError::Config(format!("{kind} needs a token")))?;
        let chat_id = options
            .get("chat_id")
            .ok_or_else(|| SlotCheckerError::Config(format!("{kind} needs a chat_id")))?
            .parse::<i64>()
            .map_err(|_| SlotCheckerError::Config(format!("{kind} chat_id must be numeric")))?;
        channel = Some(ChannelConfig::Telegram {
            token: token.clone(),
            chat_id,
        });
    }
    channel.ok_or_else(|| SlotCheckerError::Config("send block is empty".to_string()))
}

/// Parse `HH:MM-HH:MM` into a daily window. A malformed value disables the
/// window (nothing gets notified) instead of aborting.
fn parse_window(disponibility: &str) -> Option<(NaiveTime, NaiveTime)> {
    let shape = Regex::new(r"^[0-9]{2}:[0-9]{2}-[0-9]{2}:[0-9]{2}$").expect("window regex");
    let parsed = if shape.is_match(disponibility) {
        disponibility.split_once('-').and_then(|(start, end)| {
            let start = NaiveTime::parse_from_str(start, "%H:%M").ok()?;
            let end = NaiveTime::parse_from_str(end, "%H:%M").ok()?;
            Some((start, end))
        })
    } else {
        None
    };
    if parsed.is_none() {
        error!("disponibility hours is not valid: {disponibility}");
    }
    parsed
}
