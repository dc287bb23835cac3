//! Composes a script's stanzas into the single `Recipe` that applies to a
//! given target name.

use glob::Pattern;

use crate::error::Result;
use crate::script::Script;

/// The composite recipe for one target: an interpreter command line, an
/// optional stanza body, and the `always`/`ignore` flags OR'd together from
/// every matching pattern.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub interpreter: Vec<String>,
    /// `None` means no recipe applies: either nothing matched, or every
    /// match was the bare `*` fallback pattern.
    pub stanza: Option<String>,
    pub always: bool,
    pub ignore: bool,
}

impl Recipe {
    pub fn has_stanza(&self) -> bool {
        self.stanza.is_some()
    }
}

/// Match `target` against every stanza's pattern-set in declaration order,
/// concatenating the stanza text of each matching stanza and OR-ing the
/// `always`/`ignore` flags. A pattern-set where every matching pattern is
/// the literal `*` contributes no recipe text ("generic only").
pub fn match_target(script: &Script, target: &str) -> Result<Recipe> {
    let mut text: Option<String> = None;
    let mut always = false;
    let mut ignore = false;
    let mut generic = true;
    let mut matched_any = false;

    for stanza in &script.stanzas {
        for raw_pattern in stanza.pattern_set.split_whitespace() {
            let (is_ignore, pattern) = match raw_pattern.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, raw_pattern),
            };

            let glob = Pattern::new(pattern)?;
            if glob.matches(target) {
                text = Some(match text {
                    Some(existing) => existing + &stanza.text,
                    None => stanza.text.clone(),
                });
                always = always || stanza.always;
                ignore = ignore || is_ignore;
                generic = generic && pattern == "*";
                matched_any = true;
                break;
            }
        }
    }

    let stanza = if matched_any && !generic { text } else { None };

    Ok(Recipe {
        interpreter: script.interpreter.clone(),
        stanza,
        always,
        ignore,
    })
}
