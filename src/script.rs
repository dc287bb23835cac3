//! Parses a build script into an interpreter command line and an ordered
//! list of stanzas, each keyed by a whitespace-separated pattern-set.
//!
//! A straight translation of the original line-by-line state machine: the
//! tricky part is that the indent captured for a stanza comes from the
//! first non-blank line of its *body*, not from the shebang line that
//! opens it, and that indent is re-captured fresh for every stanza.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{BuildError, Result};

static SHEBANG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#|//|;|--)(\?|!)(.*)").unwrap());
static COMMENT_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(#|//|;|--)").unwrap());
static LEADING_WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*").unwrap());

/// One parsed stanza: its pattern-set text (unsplit), the `always` flag
/// from its discriminator, and its accumulated body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stanza {
    pub pattern_set: String,
    pub always: bool,
    pub text: String,
}

/// A parsed build script: the interpreter command line plus stanzas in
/// file order.
#[derive(Debug, Clone)]
pub struct Script {
    pub interpreter: Vec<String>,
    pub stanzas: Vec<Stanza>,
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| BuildError::Parse {
            script: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        Self::parse(path, &content)
    }

    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let mut lines = content.lines();
        let first = lines.next().ok_or_else(|| parse_err(path, "empty script"))?;
        let shebang = SHEBANG
            .captures(first)
            .ok_or_else(|| parse_err(path, &format!("missing first line \"#!\" in {path:?}")))?;

        let tokens: Vec<&str> = shebang[3].split_whitespace().collect();
        let interpreter = if tokens.len() > 1 {
            tokens[1..].iter().map(|s| s.to_string()).collect()
        } else {
            vec!["/bin/sh".to_string(), "-se".to_string()]
        };

        let mut stanzas = Vec::new();
        let mut pattern: Option<String> = None;
        let mut always = false;
        let mut body = String::new();
        let mut indent: Option<String> = None;

        for line in lines {
            if line.trim().is_empty() {
                body.push_str(line);
                body.push('\n');
                continue;
            }

            if indent.is_none() {
                let captured = LEADING_WS.find(line).map(|m| m.as_str()).unwrap_or("");
                indent = Some(captured.to_string());
            }
            let indent_ref = indent.as_deref().unwrap_or("");

            let shebang_here = SHEBANG.captures(line);
            let active = matches!(&pattern, Some(p) if !p.is_empty());

            if active && shebang_here.is_none() && line.starts_with(indent_ref) {
                body.push_str(&line[indent_ref.len()..]);
                body.push('\n');
            } else if !COMMENT_PREFIX.is_match(line) {
                return Err(parse_err(path, &format!("unexpected line: {line}")));
            } else {
                flush_stanza(&mut stanzas, pattern.take(), always, std::mem::take(&mut body));
                always = false;
                indent = None;
            }

            if let Some(shebang_here) = shebang_here {
                pattern = Some(shebang_here[3].to_string());
                always = &shebang_here[2] == "!";
            }
        }
        flush_stanza(&mut stanzas, pattern.take(), always, body);

        Ok(Script {
            interpreter,
            stanzas,
        })
    }
}

fn flush_stanza(stanzas: &mut Vec<Stanza>, pattern: Option<String>, always: bool, text: String) {
    if let Some(pattern_set) = pattern {
        stanzas.push(Stanza {
            pattern_set,
            always,
            text,
        });
    }
}

fn parse_err(path: &Path, reason: &str) -> BuildError {
    BuildError::Parse {
        script: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Canonicalize a script path the way the Script cache keys on it: absolute,
/// symlinks resolved where possible, falling back to the given path if the
/// file doesn't exist yet (callers always check existence separately).
pub fn canonical_script_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_interpreter() {
        let script = Script::parse(Path::new("b"), "#!/path/to/goodmake\n").unwrap();
        assert_eq!(script.interpreter, vec!["/bin/sh", "-se"]);
        assert!(script.stanzas.is_empty());
    }

    #[test]
    fn parses_explicit_interpreter() {
        let script = Script::parse(Path::new("b"), "#!/path/to/goodmake /bin/bash -e\n").unwrap();
        assert_eq!(script.interpreter, vec!["/bin/bash", "-e"]);
    }

    #[test]
    fn rejects_missing_shebang() {
        assert!(Script::parse(Path::new("b"), "echo hi\n").is_err());
    }

    #[test]
    fn single_stanza_with_indent() {
        let content = "#!/gm\n?tgt/*\n  echo hi > $1\n  echo bye >> $1\n";
        let script = Script::parse(Path::new("b"), content).unwrap();
        assert_eq!(script.stanzas.len(), 1);
        let stanza = &script.stanzas[0];
        assert_eq!(stanza.pattern_set, "tgt/*");
        assert!(!stanza.always);
        assert_eq!(stanza.text, "echo hi > $1\necho bye >> $1\n");
    }

    #[test]
    fn always_flag_from_bang() {
        let content = "#!/gm\n!always.out\n  touch $1\n";
        let script = Script::parse(Path::new("b"), content).unwrap();
        assert!(script.stanzas[0].always);
    }

    #[test]
    fn blank_lines_are_preserved_in_stanza() {
        let content = "#!/gm\n?a\n  line one\n\n  line two\n";
        let script = Script::parse(Path::new("b"), content).unwrap();
        assert_eq!(script.stanzas[0].text, "line one\n\nline two\n");
    }

    #[test]
    fn comment_line_terminates_stanza_without_starting_new_one() {
        let content = "#!/gm\n?a\n  body\n# just a comment\nmore text here\n";
        let script = Script::parse(Path::new("b"), content);
        // "more text here" is unindented and not a comment/shebang -> parse error,
        // since the comment line above closed the stanza without opening a new one.
        assert!(script.is_err());
    }

    #[test]
    fn multiple_stanzas() {
        let content = "#!/gm\n?a\n  make-a\n?b\n  make-b\n";
        let script = Script::parse(Path::new("b"), content).unwrap();
        assert_eq!(script.stanzas.len(), 2);
        assert_eq!(script.stanzas[0].pattern_set, "a");
        assert_eq!(script.stanzas[1].pattern_set, "b");
    }

    #[test]
    fn unindented_non_comment_line_is_parse_error() {
        let content = "#!/gm\n?a\n  body\nnope\n";
        assert!(Script::parse(Path::new("b"), content).is_err());
    }
}
