//! (De)serializes a [`Board`] to the JSON text stored in the `states.board`
//! column, reusing its existing wire encoding rather than inventing a second
//! storage format.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::board::Board;

pub fn encode_board(board: &Board) -> Result<String, serde_json::Error> {
    serde_json::to_string(board)
}

pub fn decode_board(raw: &str) -> Result<Board, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Renders a timestamp as fixed-width RFC 3339 (microsecond precision, `Z`
/// suffix) so the `TEXT` column it's stored in sorts and compares correctly
/// with plain string ordering across both the Postgres and SQLite backends
/// the `Any` driver can target.
pub fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{drop_token, State};
    use crate::side::Side;

    #[test]
    fn board_round_trips_through_its_stored_json_form() {
        let mut state = State::new();
        drop_token(&mut state, 2, Some(Side::Blue)).unwrap();
        let encoded = encode_board(&state.board).unwrap();
        let decoded = decode_board(&encoded).unwrap();
        assert_eq!(decoded, state.board);
    }

    #[test]
    fn timestamp_round_trips_and_preserves_lexicographic_order() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::milliseconds(5);

        let encoded_earlier = encode_timestamp(earlier);
        let encoded_later = encode_timestamp(later);
        assert!(encoded_earlier < encoded_later);

        assert_eq!(decode_timestamp(&encoded_earlier).unwrap(), earlier);
    }
}
