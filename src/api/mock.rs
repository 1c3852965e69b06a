use futures::{
    future::{ready, BoxFuture},
    FutureExt,
};
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::domain::{CaptureFrame, ConfigurationDraft, Rule, StimulusOutcome, TriggerResult};

use super::{ApiError, TriggerBackend};

const WEBSITE_HIT_RATE: f64 = 0.3;
const INTENT_HIT_RATE: f64 = 0.2;

/// Offline stand-in for the proxy: keyword lists and coin-flip triggers.
pub struct MockBackend {
    rng: Mutex<StdRng>,
    website_rate: f64,
    intent_rate: f64,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy(), WEBSITE_HIT_RATE, INTENT_HIT_RATE)
    }

    fn with_rng(rng: StdRng, website_rate: f64, intent_rate: f64) -> Self {
        Self {
            rng: Mutex::new(rng),
            website_rate,
            intent_rate,
        }
    }

    fn evaluate(&self, blocklist: &[Rule]) -> TriggerResult {
        let mut rng = self.rng.lock();
        let mut entries: Vec<(String, bool)> = Vec::with_capacity(blocklist.len() * 2);
        for rule in blocklist {
            let website = rng.gen_bool(self.website_rate);
            let intent = rng.gen_bool(self.intent_rate);
            set_entry(&mut entries, &rule.website, website);
            set_entry(&mut entries, &rule.intent, intent);
        }
        TriggerResult::from_entries(entries)
    }
}

// A repeated key keeps its first position and takes the latest value.
fn set_entry(entries: &mut Vec<(String, bool)>, key: &str, fired: bool) {
    match entries.iter_mut().find(|(existing, _)| existing.as_str() == key) {
        Some(entry) => entry.1 = fired,
        None => entries.push((key.to_string(), fired)),
    }
}

fn mock_draft(description: &str) -> ConfigurationDraft {
    let description = description.to_lowercase();
    let allowlist = vec![
        Rule::new("docs.google.com", "writing documents"),
        Rule::new("github.com", "coding projects"),
        Rule::new("stackoverflow.com", "learning programming"),
    ];

    let mut blocklist = Vec::new();
    if description.contains("social") {
        blocklist.extend([
            Rule::new("facebook.com", "scrolling social media"),
            Rule::new("instagram.com", "browsing photos"),
            Rule::new("twitter.com", "reading tweets"),
        ]);
    }
    if description.contains("video") || description.contains("youtube") {
        blocklist.extend([
            Rule::new("youtube.com", "watching videos"),
            Rule::new("netflix.com", "streaming shows"),
        ]);
    }
    if description.contains("news") {
        blocklist.extend([
            Rule::new("reddit.com", "browsing news"),
            Rule::new("cnn.com", "reading news"),
        ]);
    }
    if blocklist.is_empty() {
        blocklist.extend([
            Rule::new("facebook.com", "social media browsing"),
            Rule::new("youtube.com", "watching videos"),
        ]);
    }

    ConfigurationDraft {
        allowlist,
        blocklist,
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerBackend for MockBackend {
    fn generate_configuration<'a>(
        &'a self,
        description: &'a str,
    ) -> BoxFuture<'a, Result<ConfigurationDraft, ApiError>> {
        ready(Ok(mock_draft(description))).boxed()
    }

    fn evaluate_frame<'a>(
        &'a self,
        _frame: &'a CaptureFrame,
        blocklist: &'a [Rule],
        _allowlist: &'a [Rule],
    ) -> BoxFuture<'a, Result<TriggerResult, ApiError>> {
        ready(Ok(self.evaluate(blocklist))).boxed()
    }

    fn deliver_stimulus<'a>(
        &'a self,
        _token: &'a str,
        trigger_reason: &'a str,
    ) -> BoxFuture<'a, Result<StimulusOutcome, ApiError>> {
        tracing::info!(target: "api", reason = trigger_reason, "mock stimulus delivered");
        ready(Ok(StimulusOutcome {
            success: true,
            message: format!("Stimulus delivered successfully for {trigger_reason}"),
        }))
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn websites(rules: &[Rule]) -> Vec<&str> {
        rules.iter().map(|rule| rule.website.as_str()).collect()
    }

    #[test]
    fn social_keyword_blocks_social_sites() {
        let draft = mock_draft("I want to stop checking Social media");
        assert_eq!(
            websites(&draft.blocklist),
            ["facebook.com", "instagram.com", "twitter.com"]
        );
        assert_eq!(
            websites(&draft.allowlist),
            ["docs.google.com", "github.com", "stackoverflow.com"]
        );
    }

    #[test]
    fn keywords_stack_in_fixed_order() {
        let draft = mock_draft("less news and fewer YouTube videos");
        assert_eq!(
            websites(&draft.blocklist),
            ["youtube.com", "netflix.com", "reddit.com", "cnn.com"]
        );
    }

    #[test]
    fn unknown_description_gets_default_blocklist() {
        let draft = mock_draft("be more focused");
        assert_eq!(websites(&draft.blocklist), ["facebook.com", "youtube.com"]);
        assert_eq!(draft.blocklist[0].intent, "social media browsing");
    }

    #[tokio::test]
    async fn evaluation_reports_website_and_intent_per_rule() {
        let backend = MockBackend::with_rng(StdRng::seed_from_u64(7), 1.0, 0.0);
        let frame = CaptureFrame {
            image_base64: String::new(),
            captured_at: Utc::now(),
        };
        let blocklist = mock_draft("social").blocklist;

        let result = backend.evaluate_frame(&frame, &blocklist, &[]).await.unwrap();

        let keys: Vec<_> = result.entries().iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(
            keys,
            [
                "facebook.com",
                "scrolling social media",
                "instagram.com",
                "browsing photos",
                "twitter.com",
                "reading tweets"
            ]
        );
        assert_eq!(result.first_triggered(), Some("facebook.com"));
        assert!(result
            .entries()
            .iter()
            .all(|(key, fired)| *fired == key.ends_with(".com")));

        let empty = backend.evaluate_frame(&frame, &[], &[]).await.unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn repeated_keys_keep_first_position() {
        let backend = MockBackend::with_rng(StdRng::seed_from_u64(1), 0.0, 1.0);
        let result = backend.evaluate(&[
            Rule::new("a.com", "browsing"),
            Rule::new("b.com", "browsing"),
        ]);
        let keys: Vec<_> = result.entries().iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, ["a.com", "browsing", "b.com"]);
    }

    #[tokio::test]
    async fn mock_delivery_always_succeeds() {
        let outcome = MockBackend::new()
            .deliver_stimulus("tok_123", "facebook.com")
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.message, "Stimulus delivered successfully for facebook.com");
    }
}
