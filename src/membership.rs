//! Welcome and goodbye messages.

use crate::config::Policy;

/// Placeholder replaced by the member name.
pub const NAME_PLACEHOLDER: &str = "{name}";

/// Substitutes `name` for every `{name}` in `template`.
///
/// Only this one placeholder is recognised; other braces are left alone.
#[must_use]
pub fn render_template(template: &str, name: &str) -> String {
    template.replace(NAME_PLACEHOLDER, name)
}

#[must_use]
pub fn format_welcome(policy: &Policy, name: &str) -> String {
    render_template(&policy.welcome_template, name)
}

#[must_use]
pub fn format_goodbye(policy: &Policy, name: &str) -> String {
    render_template(&policy.goodbye_template, name)
}

/// One greeting per joiner, in the order given.
#[must_use]
pub fn welcome_messages<S: AsRef<str>>(policy: &Policy, names: &[S]) -> Vec<String> {
    names
        .iter()
        .map(|name| format_welcome(policy, name.as_ref()))
        .collect()
}
