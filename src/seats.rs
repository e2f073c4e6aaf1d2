use crate::{
    identity::AutoplayIdentity,
    storage::{
        KeyValueStore,
        SECOND_SEAT_KEY,
        StorageResult,
        load_json,
        save_json,
    },
    turn_guard::ActingSide,
    types::{
        Credential,
        GameRecord,
        User,
    },
};
use serde::{
    Deserialize,
    Serialize,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    #[serde(rename = "token")]
    pub credential: Credential,
}

impl Session {
    pub fn new(user: User, credential: Credential) -> Self {
        Self { user, credential }
    }
}

/// Which local account a turn belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeatKind {
    Primary,
    SecondHuman,
    Autoplay,
}

/// The accounts this client can act for.
#[derive(Clone, Debug)]
pub struct Seats {
    pub primary: Session,
    pub second: Option<Session>,
    pub autoplay: Option<AutoplayIdentity>,
}

impl Seats {
    pub fn new(primary: Session) -> Self {
        Self {
            primary,
            second: None,
            autoplay: None,
        }
    }

    pub fn kind_of(&self, user_id: &str) -> Option<SeatKind> {
        if self.primary.user.id == user_id {
            Some(SeatKind::Primary)
        } else if self.second.as_ref().is_some_and(|s| s.user.id == user_id) {
            Some(SeatKind::SecondHuman)
        } else if self.autoplay.as_ref().is_some_and(|a| a.user.id == user_id) {
            Some(SeatKind::Autoplay)
        } else {
            None
        }
    }

    pub fn credential_of(&self, kind: SeatKind) -> Option<&Credential> {
        match kind {
            SeatKind::Primary => Some(&self.primary.credential),
            SeatKind::SecondHuman => self.second.as_ref().map(|s| &s.credential),
            SeatKind::Autoplay => self.autoplay.as_ref().map(|a| &a.credential),
        }
    }

    /// Credential of whoever owns the turn in `record`. Turns owned by an
    /// account this client does not hold fall back to the primary credential.
    pub fn credential_for_turn(&self, record: &GameRecord) -> &Credential {
        let owner = &record.current_player().user_id;
        self.kind_of(owner)
            .and_then(|kind| self.credential_of(kind))
            .unwrap_or(&self.primary.credential)
    }

    /// The human side: primary account, second local human as fallback.
    pub fn human_side(&self) -> ActingSide {
        ActingSide::with_fallback(
            self.primary.user.id.clone(),
            self.second.as_ref().map(|s| s.user.id.clone()),
        )
    }

    pub fn autoplay_side(&self) -> Option<ActingSide> {
        self.autoplay
            .as_ref()
            .map(|a| ActingSide::single(a.user.id.clone()))
    }

    /// The local side owning the turn in `record`, if any.
    pub fn side_owning_turn(&self, record: &GameRecord) -> Option<ActingSide> {
        let owner = &record.current_player().user_id;
        self.kind_of(owner)
            .map(|_| ActingSide::single(owner.clone()))
    }
}

pub fn stored_second_seat(store: &dyn KeyValueStore) -> Option<Session> {
    load_json(store, SECOND_SEAT_KEY)
}

pub fn store_second_seat(store: &dyn KeyValueStore, session: &Session) -> StorageResult<()> {
    save_json(store, SECOND_SEAT_KEY, session)
}

pub fn forget_second_seat(store: &dyn KeyValueStore) -> StorageResult<()> {
    store.clear(SECOND_SEAT_KEY)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::types::sample_record;

    fn session(id: &str, token: &str) -> Session {
        Session::new(
            User {
                id: id.into(),
                username: id.into(),
            },
            Credential::new(token),
        )
    }

    #[test]
    fn credential_for_turn__selects_second_seat_when_it_owns_the_turn() {
        // given
        let mut seats = Seats::new(session("u1", "t1"));
        seats.second = Some(session("u2", "t2"));
        let mut record = sample_record();
        record.current_player_id = "p2".into();

        // when
        let credential = seats.credential_for_turn(&record);

        // then
        assert_eq!(credential.as_str(), "t2");
    }

    #[test]
    fn credential_for_turn__falls_back_to_primary_for_unknown_owner() {
        let seats = Seats::new(session("u1", "t1"));
        let mut record = sample_record();
        record.current_player_id = "p2".into();
        assert_eq!(seats.credential_for_turn(&record).as_str(), "t1");
        assert_eq!(seats.side_owning_turn(&record), None);
    }
}
