use crate::{
    config::{
        AUTOPLAY_NAME_PREFIXES,
        AUTOPLAY_NAME_SUFFIXES,
    },
    storage::{
        AUTOPLAY_CREDENTIALS_KEY,
        KeyValueStore,
        StorageResult,
        load_json,
        save_json,
    },
    types::{
        Credential,
        Credentials,
        GameRecord,
        Player,
        PlayerRole,
        User,
    },
};
use rand::{
    Rng,
    distr::Alphanumeric,
    seq::IndexedRandom,
};
use std::collections::BTreeMap;

const PASSWORD_LEN: usize = 13;

/// A non-human account that plays its own turns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutoplayIdentity {
    pub user: User,
    pub credential: Credential,
    pub name: String,
}

/// Decides whether a player is an autoplay account. An explicit role tag on
/// the record wins; the display-name prefix list is only consulted for
/// records that carry no role.
#[derive(Clone, Debug)]
pub struct AutoplayDetector {
    prefixes: Vec<String>,
}

impl AutoplayDetector {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }

    pub fn is_autoplay(&self, player: &Player) -> bool {
        match player.role {
            Some(PlayerRole::Autoplay) => true,
            Some(PlayerRole::Human) => false,
            None => self.has_autoplay_name(&player.username),
        }
    }

    pub fn has_autoplay_name(&self, name: &str) -> bool {
        self.prefixes.iter().any(|prefix| name.starts_with(prefix.as_str()))
    }

    pub fn autoplay_player<'a>(&self, record: &'a GameRecord) -> Option<&'a Player> {
        [&record.player1, &record.player2]
            .into_iter()
            .find(|player| self.is_autoplay(player))
    }

    pub fn is_autoplay_game(&self, record: &GameRecord) -> bool {
        self.autoplay_player(record).is_some()
    }
}

impl Default for AutoplayDetector {
    fn default() -> Self {
        Self::new(AUTOPLAY_NAME_PREFIXES.iter().map(|p| p.to_string()).collect())
    }
}

pub fn generate_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let prefix = AUTOPLAY_NAME_PREFIXES.choose(rng).copied().unwrap_or("Nova");
    let suffix = AUTOPLAY_NAME_SUFFIXES.choose(rng).copied().unwrap_or("Dice");
    format!("{prefix}{suffix}")
}

pub fn generate_password<R: Rng + ?Sized>(rng: &mut R) -> String {
    let tail: String = rng
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect();
    format!("ai_{}", tail.to_lowercase())
}

pub fn new_credentials() -> Credentials {
    let mut rng = rand::rng();
    Credentials {
        username: generate_name(&mut rng),
        password: generate_password(&mut rng),
    }
}

/// Autoplay passwords by account name.
type CredentialBook = BTreeMap<String, String>;

/// Credentials saved for the autoplay account called `username`.
pub fn stored_credentials(store: &dyn KeyValueStore, username: &str) -> Option<Credentials> {
    let book: CredentialBook = load_json(store, AUTOPLAY_CREDENTIALS_KEY)?;
    book.get(username).map(|password| Credentials {
        username: username.to_string(),
        password: password.clone(),
    })
}

/// Adds `credentials` to the saved autoplay accounts, replacing any entry
/// with the same name.
pub fn store_credentials(
    store: &dyn KeyValueStore,
    credentials: &Credentials,
) -> StorageResult<()> {
    let mut book: CredentialBook = load_json(store, AUTOPLAY_CREDENTIALS_KEY).unwrap_or_default();
    book.insert(credentials.username.clone(), credentials.password.clone());
    save_json(store, AUTOPLAY_CREDENTIALS_KEY, &book)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        storage::InMemoryStore,
        types::sample_record,
    };
    use rand::{
        SeedableRng,
        rngs::StdRng,
    };

    #[test]
    fn is_autoplay__role_tag_overrides_name_prefix() {
        // given
        let detector = AutoplayDetector::default();
        let mut player = sample_record().player2;
        player.username = "StormRoller".into();

        // when
        let untagged = detector.is_autoplay(&player);
        player.role = Some(PlayerRole::Human);
        let tagged_human = detector.is_autoplay(&player);
        player.username = "bob".into();
        player.role = Some(PlayerRole::Autoplay);
        let tagged_autoplay = detector.is_autoplay(&player);

        // then
        assert!(untagged);
        assert!(!tagged_human);
        assert!(tagged_autoplay);
    }

    #[test]
    fn generate_name__uses_published_prefixes() {
        let mut rng = StdRng::seed_from_u64(7);
        let detector = AutoplayDetector::default();
        for _ in 0..50 {
            let name = generate_name(&mut rng);
            assert!(detector.has_autoplay_name(&name), "{name}");
        }
    }

    #[test]
    fn generate_password__has_prefix_and_length() {
        let mut rng = StdRng::seed_from_u64(1);
        let password = generate_password(&mut rng);
        assert!(password.starts_with("ai_"));
        assert_eq!(password.len(), 3 + PASSWORD_LEN);
    }

    #[test]
    fn stored_credentials__looked_up_by_account_name() {
        // given
        let store = InMemoryStore::new();
        let echo = Credentials {
            username: "EchoAce".into(),
            password: "ai_secret".into(),
        };
        let blaze = Credentials {
            username: "BlazeStriker".into(),
            password: "ai_other".into(),
        };

        // when
        store_credentials(&store, &echo).unwrap();
        store_credentials(&store, &blaze).unwrap();

        // then
        assert_eq!(stored_credentials(&store, "EchoAce"), Some(echo));
        assert_eq!(stored_credentials(&store, "BlazeStriker"), Some(blaze));
        assert_eq!(stored_credentials(&store, "NovaDice"), None);
    }
}
