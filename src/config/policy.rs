//! The moderation policy: everything an admin can change at runtime.

use serde::{Deserialize, Serialize};

use super::{
    DEFAULT_GOODBYE_TEMPLATE, DEFAULT_SCHEDULED_TEXT, DEFAULT_SCHEDULE_INTERVAL_SECS,
    DEFAULT_WELCOME_TEMPLATE,
};

/// Persisted bot policy.
///
/// Field names on disk follow the upper-case keys of the original
/// `config.json`, so existing deployments keep working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Bot token used to sign in. Never changed at runtime.
    #[serde(rename = "TOKEN")]
    pub token: String,

    /// Chat that receives scheduled broadcasts.
    #[serde(rename = "CHAT_ID")]
    pub chat_id: String,

    /// Greeting for new members, `{name}` is replaced by the member name.
    #[serde(rename = "WELCOME_MESSAGE")]
    pub welcome_template: String,

    /// Farewell for leaving members, `{name}` is replaced by the member name.
    #[serde(rename = "GOODBYE_MESSAGE")]
    pub goodbye_template: String,

    /// Body of the scheduled broadcast.
    #[serde(rename = "SCHEDULED_MESSAGE")]
    pub scheduled_text: String,

    /// Seconds between broadcasts. Always greater than zero.
    #[serde(rename = "SCHEDULE_INTERVAL")]
    pub schedule_interval_secs: u64,

    /// Lowercase, trimmed, unique filter entries in insertion order.
    #[serde(rename = "BAD_WORDS")]
    pub bad_words: Vec<String>,

    #[serde(rename = "AUTO_REPLY_ENABLED")]
    pub auto_reply_enabled: bool,

    /// Lowercase trigger substring. Empty never matches.
    #[serde(rename = "AUTO_REPLY_TRIGGER")]
    pub auto_reply_trigger: String,

    #[serde(rename = "AUTO_REPLY_RESPONSE")]
    pub auto_reply_response: String,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            token: String::new(),
            chat_id: String::new(),
            welcome_template: DEFAULT_WELCOME_TEMPLATE.to_owned(),
            goodbye_template: DEFAULT_GOODBYE_TEMPLATE.to_owned(),
            scheduled_text: DEFAULT_SCHEDULED_TEXT.to_owned(),
            schedule_interval_secs: DEFAULT_SCHEDULE_INTERVAL_SECS,
            bad_words: Vec::new(),
            auto_reply_enabled: false,
            auto_reply_trigger: String::new(),
            auto_reply_response: String::new(),
        }
    }
}

impl Policy {
    /// Canonical form of a filter entry or trigger.
    #[must_use]
    pub fn normalize_word(word: &str) -> String {
        word.trim().to_lowercase()
    }

    /// Returns true if `word` (already normalized) is in the filter.
    #[must_use]
    pub fn has_bad_word(&self, word: &str) -> bool {
        self.bad_words.iter().any(|w| w == word)
    }

    /// Adds a filter entry. Returns false if it was already present or
    /// normalizes to nothing.
    pub fn add_bad_word(&mut self, word: &str) -> bool {
        let word = Self::normalize_word(word);
        if word.is_empty() || self.has_bad_word(&word) {
            return false;
        }
        self.bad_words.push(word);
        true
    }

    /// Removes a filter entry. Returns false if it was not present.
    pub fn remove_bad_word(&mut self, word: &str) -> bool {
        let word = Self::normalize_word(word);
        let before = self.bad_words.len();
        self.bad_words.retain(|w| *w != word);
        self.bad_words.len() != before
    }

    /// Sets the auto-reply pair, lower-casing the trigger.
    pub fn set_auto_reply(&mut self, trigger: &str, response: &str) {
        self.auto_reply_trigger = Self::normalize_word(trigger);
        self.auto_reply_response = response.to_owned();
    }

    /// Brings entries read from disk back in line with the invariants.
    ///
    /// Returns true if anything had to change.
    pub fn normalize(&mut self) -> bool {
        let mut words: Vec<String> = Vec::with_capacity(self.bad_words.len());
        for raw in &self.bad_words {
            let word = Self::normalize_word(raw);
            if !word.is_empty() && !words.contains(&word) {
                words.push(word);
            }
        }

        let trigger = Self::normalize_word(&self.auto_reply_trigger);

        let changed = words != self.bad_words || trigger != self.auto_reply_trigger;
        self.bad_words = words;
        self.auto_reply_trigger = trigger;
        changed
    }

    /// Creates a filled-in policy for operators to start from.
    #[must_use]
    pub fn example() -> Self {
        Self {
            token: "123456789:replace-with-your-bot-token".to_owned(),
            chat_id: "-1001234567890".to_owned(),
            bad_words: vec!["spam".to_owned(), "scam".to_owned()],
            auto_reply_enabled: true,
            auto_reply_trigger: "rules".to_owned(),
            auto_reply_response: "Please read the pinned message.".to_owned(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = Policy::default();
        assert!(policy.token.is_empty());
        assert!(policy.chat_id.is_empty());
        assert_eq!(policy.welcome_template, "Welcome, {name}!");
        assert_eq!(policy.goodbye_template, "Goodbye, {name}!");
        assert_eq!(policy.schedule_interval_secs, 3600);
        assert!(policy.bad_words.is_empty());
        assert!(!policy.auto_reply_enabled);
        assert!(policy.auto_reply_trigger.is_empty());
    }

    #[test]
    fn test_add_bad_word_normalizes() {
        let mut policy = Policy::default();
        assert!(policy.add_bad_word("  SpAm "));
        assert_eq!(policy.bad_words, vec!["spam".to_owned()]);
    }

    #[test]
    fn test_add_bad_word_rejects_duplicate_and_empty() {
        let mut policy = Policy::default();
        assert!(policy.add_bad_word("spam"));
        assert!(!policy.add_bad_word("SPAM"));
        assert!(!policy.add_bad_word("   "));
        assert_eq!(policy.bad_words.len(), 1);
    }

    #[test]
    fn test_add_then_remove_restores_set() {
        let mut policy = Policy::default();
        policy.add_bad_word("scam");
        let before = policy.bad_words.clone();

        assert!(policy.add_bad_word("spam"));
        assert!(policy.remove_bad_word("spam"));
        assert_eq!(policy.bad_words, before);
    }

    #[test]
    fn test_add_existing_then_remove_drops_it() {
        // Set semantics: adding an existing word is a no-op, so the
        // following remove takes it out for good.
        let mut policy = Policy::default();
        policy.add_bad_word("spam");
        assert!(!policy.add_bad_word("spam"));
        assert!(policy.remove_bad_word("spam"));
        assert!(policy.bad_words.is_empty());
    }

    #[test]
    fn test_remove_missing_word() {
        let mut policy = Policy::default();
        assert!(!policy.remove_bad_word("spam"));
    }

    #[test]
    fn test_normalize_cleans_disk_entries() {
        let mut policy = Policy {
            bad_words: vec![
                "Spam".to_owned(),
                "spam".to_owned(),
                String::new(),
                " scam ".to_owned(),
            ],
            auto_reply_trigger: " Help".to_owned(),
            ..Policy::default()
        };
        assert!(policy.normalize());
        assert_eq!(policy.bad_words, vec!["spam".to_owned(), "scam".to_owned()]);
        assert_eq!(policy.auto_reply_trigger, "help");
        assert!(!policy.normalize());
    }

    #[test]
    fn test_deserialize_uses_upper_case_keys() {
        let json = r#"{
            "TOKEN": "t",
            "CHAT_ID": "-100",
            "WELCOME_MESSAGE": "Hi {name}",
            "GOODBYE_MESSAGE": "Bye {name}",
            "SCHEDULED_MESSAGE": "tick",
            "SCHEDULE_INTERVAL": 120,
            "BAD_WORDS": ["spam"],
            "AUTO_REPLY_ENABLED": true,
            "AUTO_REPLY_TRIGGER": "help",
            "AUTO_REPLY_RESPONSE": "see /help"
        }"#;
        let policy: Policy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.chat_id, "-100");
        assert_eq!(policy.schedule_interval_secs, 120);
        assert!(policy.auto_reply_enabled);
    }

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        let policy: Policy = serde_json::from_str(r#"{"TOKEN": "abc"}"#).unwrap();
        assert_eq!(policy.token, "abc");
        assert_eq!(policy.schedule_interval_secs, 3600);
    }
}
