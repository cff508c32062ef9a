//! Practice session and match set models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of recorded session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Class,
    Match,
    Friendly,
}

impl SessionKind {
    /// True for scored match play against an opponent.
    pub fn is_match(self) -> bool {
        self == SessionKind::Match
    }

    /// True for sessions played to win: matches and friendlies.
    /// Class sessions are drill work and compare against these in analysis.
    pub fn is_competitive(self) -> bool {
        matches!(self, SessionKind::Match | SessionKind::Friendly)
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKind::Class => write!(f, "class"),
            SessionKind::Match => write!(f, "match"),
            SessionKind::Friendly => write!(f, "friendly"),
        }
    }
}

/// A single practice session or match.
///
/// Sessions are authored on clients and synced in batches, so ids and
/// timestamps are client-supplied. Soft deletion via `deleted_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Set for match and friendly sessions played against a known opponent.
    pub opponent_id: Option<Uuid>,
    pub session_name: String,
    pub session_type: SessionKind,
    pub date: DateTime<Utc>,
    pub duration_minutes: i32,

    // Self-reported shot counters for the session.
    pub rushed_shots: i32,
    pub unforced_errors: i32,
    pub long_rallies: i32,
    pub direction_changes: i32,

    /// Self-rated composure, 1-10.
    pub composure: i32,
    /// What the player set out to work on.
    pub focus_text: Option<String>,
    /// Free-form self assessment; analytics recognize "yes", "partial", "no".
    pub followed_focus: Option<String>,
    /// Match result. None means not recorded, which is distinct from a loss.
    pub is_match_win: Option<bool>,
    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_match(&self) -> bool {
        self.session_type.is_match()
    }

    pub fn is_competitive(&self) -> bool {
        self.session_type.is_competitive()
    }
}

/// One set of a match, scored in games.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSet {
    pub id: Uuid,
    pub session_id: Uuid,
    pub set_number: i32,
    pub player_games: i32,
    pub opponent_games: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl MatchSet {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Games won minus games lost in this set.
    pub fn games_differential(&self) -> i32 {
        self.player_games - self.opponent_games
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_session() -> Session {
        Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            opponent_id: None,
            session_name: "Tuesday drills".to_string(),
            session_type: SessionKind::Class,
            date: Utc.with_ymd_and_hms(2024, 3, 5, 18, 0, 0).unwrap(),
            duration_minutes: 60,
            rushed_shots: 10,
            unforced_errors: 5,
            long_rallies: 3,
            direction_changes: 20,
            composure: 7,
            focus_text: None,
            followed_focus: None,
            is_match_win: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn test_session_kind_groups() {
        assert!(SessionKind::Match.is_match());
        assert!(!SessionKind::Friendly.is_match());
        assert!(SessionKind::Match.is_competitive());
        assert!(SessionKind::Friendly.is_competitive());
        assert!(!SessionKind::Class.is_competitive());
    }

    #[test]
    fn test_session_kind_wire_values() {
        assert_eq!(
            serde_json::to_string(&SessionKind::Friendly).unwrap(),
            "\"friendly\""
        );
        let kind: SessionKind = serde_json::from_str("\"match\"").unwrap();
        assert_eq!(kind, SessionKind::Match);
        assert!(serde_json::from_str::<SessionKind>("\"tournament\"").is_err());
    }

    #[test]
    fn test_session_serializes_camel_case() {
        let json = serde_json::to_value(sample_session()).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj.contains_key("sessionType"));
        assert!(obj.contains_key("durationMinutes"));
        assert!(obj.contains_key("isMatchWin"));
        assert!(obj.contains_key("deletedAt"));
        assert_eq!(obj["sessionType"], "class");
        assert_eq!(obj["isMatchWin"], serde_json::Value::Null);
    }

    #[test]
    fn test_session_optional_fields_default_to_none() {
        let mut json = serde_json::to_value(sample_session()).unwrap();
        let obj = json.as_object_mut().unwrap();
        obj.remove("opponentId");
        obj.remove("isMatchWin");
        obj.remove("deletedAt");
        let parsed: Session = serde_json::from_value(json).unwrap();
        assert!(parsed.opponent_id.is_none());
        assert!(parsed.is_match_win.is_none());
        assert!(!parsed.is_deleted());
    }

    #[test]
    fn test_match_set_games_differential() {
        let set = MatchSet {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            set_number: 1,
            player_games: 6,
            opponent_games: 3,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        assert_eq!(set.games_differential(), 3);
    }
}
