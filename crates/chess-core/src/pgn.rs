//! PGN movetext handling: lightweight regex-based extraction plus replay
//! through the rules engine.

use regex::Regex;

use crate::board::Game;
use crate::error::ChessError;

/// Extract SAN moves from PGN text (after removing headers, comments, and
/// variations).
pub fn extract_moves(pgn: &str) -> Vec<String> {
    // Remove headers
    let header_re = Regex::new(r"\[[^\]]*\]").unwrap();
    let no_headers = header_re.replace_all(pgn, "");

    // Remove comments
    let comment_re = Regex::new(r"\{[^}]*\}").unwrap();
    let no_comments = comment_re.replace_all(&no_headers, "");

    // Remove variations
    let variation_re = Regex::new(r"\([^)]*\)").unwrap();
    let no_variations = variation_re.replace_all(&no_comments, "");

    // Extract moves
    let move_re =
        Regex::new(r"[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=[QRBN])?[+#]?|O-O-O|O-O").unwrap();

    move_re
        .find_iter(&no_variations)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Replay a fetched move record into a `Game`. A record with no readable
/// moves is rejected; a move the rules engine refuses fails the whole
/// replay, since the record is authoritative.
pub fn replay_movetext(record: &str) -> Result<Game, ChessError> {
    let moves = extract_moves(record);
    if moves.is_empty() {
        return Err(ChessError::UnreadableRecord);
    }
    Game::replay_sans(&moves)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_moves_basic() {
        let pgn = "1. e4 e5 2. Nf3 Nc6 3. Bb5 1-0";
        let moves = extract_moves(pgn);
        assert_eq!(moves, vec!["e4", "e5", "Nf3", "Nc6", "Bb5"]);
    }

    #[test]
    fn test_extract_moves_strips_noise() {
        let pgn = r#"[Event "Casual game"]
[Result "*"]

1. e4 {best by test} e5 (1... c5 2. Nf3) 2. Nf3 Nf6 *"#;
        let moves = extract_moves(pgn);
        assert_eq!(moves, vec!["e4", "e5", "Nf3", "Nf6"]);
    }

    #[test]
    fn test_extract_moves_castling_and_promotion() {
        let pgn = "1. e4 e5 2. Nf3 Nf6 3. Bc4 Bc5 4. O-O d6";
        let moves = extract_moves(pgn);
        assert!(moves.contains(&"O-O".to_string()));

        let promo = extract_moves("54. a8=Q+ Kb6");
        assert_eq!(promo[0], "a8=Q+");
    }

    #[test]
    fn test_replay_movetext() {
        let game = replay_movetext("1. e4 e5 2. Nf3").unwrap();
        assert_eq!(game.history().len(), 3);
        let last = game.last_move().unwrap();
        assert_eq!((last.from.as_str(), last.to.as_str()), ("g1", "f3"));
    }

    #[test]
    fn test_replay_rejects_empty_and_broken_records() {
        assert!(replay_movetext("").is_err());
        assert!(replay_movetext("{no moves here}").is_err());
        // Readable tokens that do not form a legal game
        assert!(replay_movetext("1. e5 e4").is_err());
    }
}
