use crate::types::GameRecord;

/// The account(s) on whose behalf an action is attempted: the primary
/// account plus, in co-located two-player mode, the second local human.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActingSide {
    pub account_id: String,
    pub fallback_account_id: Option<String>,
}

impl ActingSide {
    pub fn single(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            fallback_account_id: None,
        }
    }

    pub fn with_fallback(account_id: impl Into<String>, fallback: Option<String>) -> Self {
        Self {
            account_id: account_id.into(),
            fallback_account_id: fallback,
        }
    }

    pub fn owns_turn(&self, record: &GameRecord) -> bool {
        owns_turn(&self.account_id, self.fallback_account_id.as_deref(), record)
    }
}

/// True when the turn owner of `record` belongs to `actor` or `fallback`.
/// Only meaningful against a record fetched after the caller's last
/// suspension point.
pub fn owns_turn(actor: &str, fallback: Option<&str>, record: &GameRecord) -> bool {
    let Some(seat) = record.seat_of(&record.current_player_id) else {
        return false;
    };
    let owner = record.player(seat).user_id.as_str();
    owner == actor || fallback.is_some_and(|fallback| owner == fallback)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::types::sample_record;
    use proptest::prelude::*;

    #[test]
    fn owns_turn__primary_owner() {
        let record = sample_record();
        assert!(owns_turn("u1", None, &record));
        assert!(!owns_turn("u2", None, &record));
    }

    #[test]
    fn owns_turn__second_local_human_counts() {
        // given
        let mut record = sample_record();
        record.current_player_id = "p2".into();

        // when
        let side = ActingSide::with_fallback("u1", Some("u2".into()));

        // then
        assert!(side.owns_turn(&record));
        assert!(!ActingSide::single("u1").owns_turn(&record));
    }

    #[test]
    fn owns_turn__dangling_turn_pointer_is_never_owned() {
        let mut record = sample_record();
        record.current_player_id = "ghost".into();
        assert!(!owns_turn("u1", Some("u2"), &record));
    }

    proptest! {
        #[test]
        fn owns_turn__matches_owner_membership(
            second_turn in any::<bool>(),
            actor in prop::sample::select(vec!["u1", "u2", "u3"]),
            fallback in prop::option::of(prop::sample::select(vec!["u1", "u2", "u3"])),
        ) {
            let mut record = sample_record();
            if second_turn {
                record.current_player_id = "p2".into();
            }
            let owner = if second_turn { "u2" } else { "u1" };
            let expected = actor == owner || fallback == Some(owner);
            prop_assert_eq!(owns_turn(actor, fallback, &record), expected);
        }
    }
}
