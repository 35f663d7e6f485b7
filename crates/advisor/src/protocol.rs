//! UCI output parsing: turns one raw engine line into a structured analysis
//! record, or rejects it as irrelevant.

use std::fmt;

use serde::{Serialize, Serializer};

/// Engine evaluation for one ranked line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    /// Centipawns from the side to move's perspective.
    Centipawns(i32),
    /// Mate in N, negative when the side to move gets mated.
    Mate(i32),
}

impl fmt::Display for Score {
    /// Presentation contract: `+0.00` / `-0.37` for centipawns,
    /// `+#3` / `-#2` for mate.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Score::Centipawns(raw) => {
                let value = f64::from(raw) / 100.0;
                if raw < 0 {
                    write!(f, "{value:.2}")
                } else {
                    write!(f, "+{value:.2}")
                }
            }
            Score::Mate(n) => {
                let sign = if n < 0 { '-' } else { '+' };
                write!(f, "{sign}#{}", n.abs())
            }
        }
    }
}

impl Serialize for Score {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One structured progress report from the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRecord {
    /// 1-based rank of the variation slot (the `multipv` index).
    pub rank: u32,
    pub depth: Option<u32>,
    pub score: Score,
    /// Principal variation as coordinate moves; the first entry is the
    /// immediate best move for this rank.
    pub pv: Vec<String>,
}

/// Parse one raw engine output line.
///
/// A line qualifies only when it carries `multipv`, `score`, and `pv`
/// markers; handshake acknowledgements, `bestmove` finalization, and
/// diagnostic text all yield `None`. Non-numeric rank or score magnitude
/// fails closed to `None` as well.
pub fn parse_line(raw: &str) -> Option<AnalysisRecord> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();

    let multipv_idx = tokens.iter().position(|t| *t == "multipv")?;
    let score_idx = tokens.iter().position(|t| *t == "score")?;
    let pv_idx = tokens.iter().position(|t| *t == "pv")?;

    let rank: u32 = tokens.get(multipv_idx + 1)?.parse().ok()?;

    let depth = tokens
        .iter()
        .position(|t| *t == "depth")
        .and_then(|i| tokens.get(i + 1))
        .and_then(|t| t.parse().ok());

    let magnitude: i32 = tokens.get(score_idx + 2)?.parse().ok()?;
    let score = match *tokens.get(score_idx + 1)? {
        "cp" => Score::Centipawns(magnitude),
        "mate" => Score::Mate(magnitude),
        _ => return None,
    };

    let pv = tokens[pv_idx + 1..].iter().map(|t| t.to_string()).collect();

    Some(AnalysisRecord {
        rank,
        depth,
        score,
        pv,
    })
}
