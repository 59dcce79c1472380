use serde::{Deserialize, Serialize, Serializer};

/// The vote currently held by a participant.
///
/// On the wire `NoVote` is `null`, `Abstain` is the string `"no-vote"` and a
/// card is its bare number, so an abstention never collides with a zero card.
/// Whole-valued cards are written as integers (`5`, not `5.0`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Vote {
    #[default]
    NoVote,
    Card(f64),
    Abstain,
}

impl Serialize for Vote {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Vote::NoVote => serializer.serialize_none(),
            Vote::Card(value) if value.fract() == 0.0 && value.abs() < i64::MAX as f64 => {
                serializer.serialize_i64(*value as i64)
            }
            Vote::Card(value) => serializer.serialize_f64(*value),
            Vote::Abstain => serializer.serialize_str(ABSTAIN_MARKER),
        }
    }
}

/// The marker clients send (and receive) for an explicit abstention.
pub const ABSTAIN_MARKER: &str = "no-vote";

/// A vote as submitted by a client: any finite number, or an explicit abstention.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "RawBallot")]
pub enum Ballot {
    Card(f64),
    Abstain,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBallot {
    Card(f64),
    Marker(String),
}

impl TryFrom<RawBallot> for Ballot {
    type Error = String;

    fn try_from(raw: RawBallot) -> Result<Self, Self::Error> {
        match raw {
            RawBallot::Card(value) if value.is_finite() => Ok(Ballot::Card(value)),
            RawBallot::Card(value) => Err(format!("vote {} is not a finite number", value)),
            RawBallot::Marker(marker) if marker == ABSTAIN_MARKER => Ok(Ballot::Abstain),
            RawBallot::Marker(other) => Err(format!("unrecognized vote marker '{}'", other)),
        }
    }
}

impl From<Ballot> for Vote {
    fn from(ballot: Ballot) -> Self {
        match ballot {
            Ballot::Card(value) => Vote::Card(value),
            Ballot::Abstain => Vote::Abstain,
        }
    }
}

/// A single named actor inside a session.
///
/// Admins control the session (reveal, reset, remove, cleanup) and never
/// vote; everyone else votes and cannot touch session state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub vote: Vote,
    pub is_admin: bool,
    pub is_active: bool,
}

impl Participant {
    /// Creates an active participant that has not voted yet.
    pub fn new(id: String, name: String, is_admin: bool) -> Self {
        Self {
            id,
            name,
            vote: Vote::NoVote,
            is_admin,
            is_active: true,
        }
    }
}
