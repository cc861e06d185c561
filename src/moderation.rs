//! Message evaluation: bad-word filter and auto-reply matching.
//!
//! Both checks are plain substring tests on lower-cased text. A short
//! filter entry therefore also matches inside longer words ("ass" in
//! "class"); operators choose entries accordingly.

use crate::config::Policy;

/// Lower-cases inbound text before evaluation.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
}

/// Returns the first filter entry found in `text`.
///
/// `text` must already be [`normalize`]d.
#[must_use]
pub fn first_bad_word<'a>(policy: &'a Policy, text: &str) -> Option<&'a str> {
    policy
        .bad_words
        .iter()
        .map(String::as_str)
        .find(|word| text.contains(*word))
}

/// True if any filter entry occurs in `text`.
#[must_use]
pub fn contains_bad_word(policy: &Policy, text: &str) -> bool {
    first_bad_word(policy, text).is_some()
}

/// Returns the auto-reply response if auto-reply is on and the trigger
/// occurs in `text`.
#[must_use]
pub fn match_auto_reply<'a>(policy: &'a Policy, text: &str) -> Option<&'a str> {
    if !policy.auto_reply_enabled || policy.auto_reply_trigger.is_empty() {
        return None;
    }
    text.contains(policy.auto_reply_trigger.as_str())
        .then_some(policy.auto_reply_response.as_str())
}
