//! Coordinate-move to SAN translation by replay.

use crate::board::Position;

/// Translate a single coordinate move at `position`, or `None` when the
/// rules engine rejects it.
pub fn move_to_san(position: &Position, uci: &str) -> Option<String> {
    position.apply_uci(uci).ok().map(|(_, record)| record.san)
}

/// Replay a principal variation against a disposable copy of `position`,
/// collecting SAN for at most `max_plies` moves. A rejected move is skipped
/// rather than aborting the rest of the translation.
pub fn line_to_san<S: AsRef<str>>(
    position: &Position,
    moves: &[S],
    max_plies: usize,
) -> Vec<String> {
    let mut current = position.clone();
    let mut sans = Vec::new();
    for uci in moves {
        if sans.len() >= max_plies {
            break;
        }
        match current.apply_uci(uci.as_ref()) {
            Ok((next, record)) => {
                current = next;
                sans.push(record.san);
            }
            Err(_) => continue,
        }
    }
    sans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_to_san() {
        let position = Position::start();
        assert_eq!(move_to_san(&position, "g1f3").as_deref(), Some("Nf3"));
        assert_eq!(move_to_san(&position, "e2e5"), None);
        assert_eq!(move_to_san(&position, "zz"), None);
    }

    #[test]
    fn test_line_truncated_to_max_plies() {
        let position = Position::start();
        let pv = ["e2e4", "e7e5", "g1f3", "b8c6", "f1b5"];
        let sans = line_to_san(&position, &pv, 4);
        assert_eq!(sans, vec!["e4", "e5", "Nf3", "Nc6"]);
    }

    #[test]
    fn test_rejected_move_skipped() {
        let position = Position::start();
        // The second token is illegal after e4; translation continues with
        // the rest of the line.
        let pv = ["e2e4", "e2e4", "g8f6"];
        let sans = line_to_san(&position, &pv, 4);
        assert_eq!(sans, vec!["e4", "Nf6"]);
    }
}
