/// Rule tables: the event map (raw event → symbolic description) and the
/// action table (symbolic description → handler path).
///
/// Both tables are loaded once at startup from blank-delimited text files and
/// are read-only afterwards.  Lookup is first-match, so row order matters.
/// A file that cannot be opened is replaced by the built-in two-row table;
/// a file that opens but holds a malformed number aborts startup.
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

/// Field separators inside a rule line. `#` starts a comment.
const BLANKS: &[char] = &[' ', '\t'];
const COMMENT: char = '#';

const ACTION_FIELDS: usize = 2;
const MAP_FIELDS: usize = 6;

/// One row of the map file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMapping {
    /// Symbolic event type, e.g. `EV_KEY`. Informational only.
    pub type_name: String,
    /// Numeric event type, written in hex in the map file.
    pub kind: u16,
    /// Symbolic event code, e.g. `KEY_POWER`. Informational only.
    pub code_name: String,
    pub code: u16,
    /// 1 = press, 0 = release.
    pub value: i32,
    pub description: String,
}

/// One row of the action file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionMapping {
    /// Matched as a substring of the event description.
    pub key: String,
    /// Handler path relative to the handler root.
    pub action: String,
}

/// Both lookup tables.  Built once, then only borrowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTables {
    pub events: Vec<EventMapping>,
    pub actions: Vec<ActionMapping>,
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("failed to read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}:{line}: bad {field} '{text}'", .path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        field: &'static str,
        text: String,
    },
}

impl RuleTables {
    /// The built-in tables used when neither rule file is readable.
    pub fn defaults() -> Self {
        Self {
            events: default_events(),
            actions: default_actions(),
        }
    }

    /// Loads the action file and the map file.  Each table falls back to its
    /// built-in default independently.
    pub fn load(action_file: &Path, map_file: &Path) -> Result<Self, RuleError> {
        let actions = load_actions(action_file)?;
        let events = load_events(map_file)?;
        info!(
            actions = actions.len(),
            events = events.len(),
            "rule tables loaded"
        );
        Ok(Self { events, actions })
    }
}

pub fn default_events() -> Vec<EventMapping> {
    ["button/power PWRF 00000080", "button/power PWRB 00000080"]
        .into_iter()
        .map(|description| EventMapping {
            type_name: "EV_KEY".to_string(),
            kind: 0x01,
            code_name: "KEY_POWER".to_string(),
            code: 116,
            value: 1,
            description: description.to_string(),
        })
        .collect()
}

pub fn default_actions() -> Vec<ActionMapping> {
    [("PWRF", "PWRF/00000080"), ("LID0", "LID/00000080")]
        .into_iter()
        .map(|(key, action)| ActionMapping {
            key: key.to_string(),
            action: action.to_string(),
        })
        .collect()
}

/// Parses `key action` lines.
pub fn load_actions(path: &Path) -> Result<Vec<ActionMapping>, RuleError> {
    let Some(records) = read_records(path, ACTION_FIELDS)? else {
        return Ok(default_actions());
    };
    Ok(records
        .into_iter()
        .map(|record| ActionMapping {
            key: record.fields[0].clone(),
            action: record.fields[1].clone(),
        })
        .collect())
}

/// Parses `typeName hexType codeName code value description` lines.
pub fn load_events(path: &Path) -> Result<Vec<EventMapping>, RuleError> {
    let Some(records) = read_records(path, MAP_FIELDS)? else {
        return Ok(default_events());
    };

    let mut events = Vec::with_capacity(records.len());
    for record in records {
        let f = &record.fields;
        let malformed = |field: &'static str, text: &str| RuleError::Malformed {
            path: path.to_path_buf(),
            line: record.line,
            field,
            text: text.to_string(),
        };

        let kind = parse_hex_u16(&f[1]).ok_or_else(|| malformed("type", &f[1]))?;
        let code = f[3].parse::<u16>().map_err(|_| malformed("code", &f[3]))?;
        let value = f[4]
            .parse::<i32>()
            .ok()
            .filter(|v| *v >= 0)
            .ok_or_else(|| malformed("value", &f[4]))?;

        events.push(EventMapping {
            type_name: f[0].clone(),
            kind,
            code_name: f[2].clone(),
            code,
            value,
            description: f[5].clone(),
        });
    }
    Ok(events)
}

// ── Tokenizer ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Record {
    /// 1-based line number, for diagnostics.
    line: usize,
    fields: Vec<String>,
}

#[derive(Debug, PartialEq)]
enum Line<'a> {
    Blank,
    Short(usize),
    Fields(Vec<&'a str>),
}

/// Returns `Ok(None)` when the file cannot be opened.
fn read_records(path: &Path, count: usize) -> Result<Option<Vec<Record>>, RuleError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            info!(path = %path.display(), "cannot open rule file ({e}), using built-in table");
            return Ok(None);
        }
    };

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| RuleError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        match tokenize(&line, count) {
            Line::Blank => {}
            Line::Short(found) => warn!(
                path = %path.display(),
                line = index + 1,
                "bad line: {found} fields found, {count} needed"
            ),
            Line::Fields(fields) => records.push(Record {
                line: index + 1,
                fields: fields.into_iter().map(str::to_string).collect(),
            }),
        }
    }
    Ok(Some(records))
}

/// Splits `line` into exactly `count` fields.  The first `count - 1` are
/// separated by runs of blanks; the last one takes the rest of the line.
fn tokenize(line: &str, count: usize) -> Line<'_> {
    let content = match line.find(COMMENT) {
        Some(i) => &line[..i],
        None => line,
    };
    let mut rest = content.trim_matches(BLANKS);
    if rest.is_empty() {
        return Line::Blank;
    }

    let mut fields = Vec::with_capacity(count);
    while fields.len() + 1 < count {
        let Some((field, tail)) = rest.split_once(BLANKS) else {
            break;
        };
        fields.push(field);
        rest = tail.trim_start_matches(BLANKS);
    }
    if !rest.is_empty() {
        fields.push(rest);
    }

    if fields.len() < count {
        Line::Short(fields.len())
    } else {
        Line::Fields(fields)
    }
}

/// Hex with an optional `0x` prefix.
fn parse_hex_u16(text: &str) -> Option<u16> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u16::from_str_radix(digits, 16).ok()
}
