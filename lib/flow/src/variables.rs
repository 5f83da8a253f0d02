//! Per-run variable store with template substitution.
//!
//! Variables are string-to-string, scoped to a single run, seeded from the
//! triggering event and mutated by set-variable and AI-step nodes. Template
//! substitution must never fail a run: unknown variables read as empty, and
//! unresolved placeholders stay in the text so authors can spot typos.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reserved variable holding the most recent AI-step response.
pub const LAST_AI_RESPONSE: &str = "lastAiResponse";

/// String key/value scratch space for one run.
///
/// Names are case-sensitive. Values are always strings; conditions parse
/// numbers at evaluation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableStore {
    values: HashMap<String, String>,
}

impl VariableStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of a variable, or the empty string if unset.
    #[must_use]
    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    /// Returns true if the variable has been set.
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Sets a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Returns the number of set variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no variables are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Substitutes every `{variableName}` occurrence in `text`.
    ///
    /// Placeholders naming an unset variable are left as literal text, not
    /// blanked. Braces that do not delimit a well-formed name (empty, or
    /// containing characters outside `[A-Za-z0-9_]`) pass through untouched.
    #[must_use]
    pub fn resolve_template(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after_open = &rest[open + 1..];

            match after_open.find('}') {
                Some(close) if is_variable_name(&after_open[..close]) => {
                    let name = &after_open[..close];
                    if self.is_set(name) {
                        out.push_str(self.get(name));
                    } else {
                        // Preserve the placeholder so typos are visible.
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                    rest = &after_open[close + 1..];
                }
                _ => {
                    out.push('{');
                    rest = after_open;
                }
            }
        }

        out.push_str(rest);
        out
    }
}

impl FromIterator<(String, String)> for VariableStore {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

fn is_variable_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variable_reads_empty() {
        let vars = VariableStore::new();
        assert_eq!(vars.get("missing"), "");
        assert!(!vars.is_set("missing"));
    }

    #[test]
    fn set_and_get() {
        let mut vars = VariableStore::new();
        vars.set("name", "Sara");
        assert_eq!(vars.get("name"), "Sara");
        assert!(vars.is_set("name"));
    }

    #[test]
    fn names_are_case_sensitive() {
        let mut vars = VariableStore::new();
        vars.set("Name", "Sara");
        assert_eq!(vars.get("name"), "");
        assert_eq!(vars.get("Name"), "Sara");
    }

    #[test]
    fn template_substitutes_known_variables() {
        let mut vars = VariableStore::new();
        vars.set("name", "Sara");
        vars.set("time", "3pm");

        let resolved = vars.resolve_template("Hi {name}, see you at {time}");
        assert_eq!(resolved, "Hi Sara, see you at 3pm");
    }

    #[test]
    fn template_preserves_unresolved_placeholders() {
        let mut vars = VariableStore::new();
        vars.set("name", "Sara");

        let resolved = vars.resolve_template("Hi {name}, see you at {time}");
        assert_eq!(resolved, "Hi Sara, see you at {time}");
    }

    #[test]
    fn template_set_but_empty_variable_is_blanked() {
        let mut vars = VariableStore::new();
        vars.set("note", "");
        assert_eq!(vars.resolve_template("[{note}]"), "[]");
    }

    #[test]
    fn template_ignores_malformed_braces() {
        let mut vars = VariableStore::new();
        vars.set("a", "x");

        assert_eq!(vars.resolve_template("open { brace"), "open { brace");
        assert_eq!(vars.resolve_template("{not a name}"), "{not a name}");
        assert_eq!(vars.resolve_template("{}"), "{}");
        assert_eq!(vars.resolve_template("{a} and {"), "x and {");
    }

    #[test]
    fn template_handles_adjacent_placeholders() {
        let mut vars = VariableStore::new();
        vars.set("a", "1");
        vars.set("b", "2");
        assert_eq!(vars.resolve_template("{a}{b}"), "12");
    }

    #[test]
    fn store_serde_roundtrip() {
        let mut vars = VariableStore::new();
        vars.set("service", "Haircut");

        let json = serde_json::to_string(&vars).expect("serialize");
        let parsed: VariableStore = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(vars, parsed);
    }
}
