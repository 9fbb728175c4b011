#![forbid(unsafe_code)]

use std::fs;
use std::path::Path;

use lexdrift_contracts::corpus::CorpusRecord;

/// One record per line: a JSON object `{"text": .., "label": ..}` or, for any
/// line not starting with `{`, the raw text. Blank lines are skipped.
pub fn parse_corpus(raw: &str) -> Result<Vec<CorpusRecord>, String> {
    let mut out = Vec::new();
    for (i, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if line.trim_start().starts_with('{') {
            let rec: CorpusRecord = serde_json::from_str(line)
                .map_err(|e| format!("corpus line {}: {e}", i + 1))?;
            out.push(rec);
        } else {
            out.push(CorpusRecord::new(line));
        }
    }
    Ok(out)
}

pub fn read_corpus(path: &Path) -> Result<Vec<CorpusRecord>, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("failed to read corpus '{}': {e}", path.display()))?;
    parse_corpus(&raw)
}

/// One non-blank input line, undecoded, with its 1-based position in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputLine {
    pub line_no: usize,
    pub payload: Vec<u8>,
}

/// Blank lines are skipped but still counted, so `line_no` always points at
/// the line in the original input. Invalid UTF-8 stays visible to the
/// per-record transform.
pub fn parse_payload_lines(raw: &[u8]) -> Vec<InputLine> {
    raw.split(|b| *b == b'\n')
        .enumerate()
        .map(|(i, line)| InputLine {
            line_no: i + 1,
            payload: line.strip_suffix(b"\r").unwrap_or(line).to_vec(),
        })
        .filter(|line| !line.payload.is_empty())
        .collect()
}

pub fn read_payload_lines(path: &Path) -> Result<Vec<InputLine>, String> {
    let raw =
        fs::read(path).map_err(|e| format!("failed to read input '{}': {e}", path.display()))?;
    Ok(parse_payload_lines(&raw))
}
