use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub website: String,
    pub intent: String,
}

impl Rule {
    pub fn new(website: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            website: website.into(),
            intent: intent.into(),
        }
    }
}

impl FromStr for Rule {
    type Err = String;

    /// Parses `website=intent`; a bare website gets the intent `all`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (website, intent) = match raw.split_once('=') {
            Some((website, intent)) => (website.trim(), intent.trim()),
            None => (raw.trim(), "all"),
        };
        if website.is_empty() {
            return Err(format!("rule `{raw}` has no website"));
        }
        Ok(Rule::new(website, if intent.is_empty() { "all" } else { intent }))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationDraft {
    #[serde(default)]
    pub allowlist: Vec<Rule>,
    #[serde(default)]
    pub blocklist: Vec<Rule>,
}

/// Frozen session configuration. The token is always non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub allowlist: Vec<Rule>,
    pub blocklist: Vec<Rule>,
    stimulus_token: String,
}

impl Configuration {
    pub fn new(draft: ConfigurationDraft, token: &str) -> Result<Self, ValidationError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ValidationError::MissingToken);
        }
        Ok(Self {
            allowlist: draft.allowlist,
            blocklist: draft.blocklist,
            stimulus_token: token.to_string(),
        })
    }

    pub fn stimulus_token(&self) -> &str {
        &self.stimulus_token
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("please describe the behavior you want to change")]
    MissingDescription,
    #[error("please enter your Pavlok bearer token")]
    MissingToken,
}

#[derive(Debug, Clone)]
pub struct CaptureFrame {
    pub image_base64: String,
    pub captured_at: DateTime<Utc>,
}

/// Per-frame evaluation result, kept in the order the keys appeared in the response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerResult {
    entries: Vec<(String, bool)>,
}

impl TriggerResult {
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[(String, bool)] {
        &self.entries
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First key whose value is true, by response order.
    pub fn first_triggered(&self) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, fired)| *fired)
            .map(|(key, _)| key.as_str())
    }
}

impl Serialize for TriggerResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(k, v)| (k, v)))
    }
}

impl<'de> Deserialize<'de> for TriggerResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = TriggerResult;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of trigger keys to booleans")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, fired)) = map.next_entry::<String, bool>()? {
                    entries.push((key, fired));
                }
                Ok(TriggerResult { entries })
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub capture_count: u64,
    pub trigger_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StimulusKind {
    Beep,
    Vibrate,
    Zap,
}

impl FromStr for StimulusKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "beep" => Ok(Self::Beep),
            "vibrate" => Ok(Self::Vibrate),
            "zap" => Ok(Self::Zap),
            other => Err(format!("unknown stimulus type `{other}` (beep, vibrate, zap)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StimulusOutcome {
    pub success: bool,
    pub message: String,
}
