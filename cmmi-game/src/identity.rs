//! Identity Registry.
//!
//! Display names are unique under trimmed, case-insensitive comparison.
//! Registration is a single conditional insert against the durable backend,
//! or one read-modify-write of the local identity list when the backend is
//! missing or unreachable.
use serde::{Deserialize, Serialize};

use crate::StorageError;
use crate::backend::PlayerInsert;
use crate::constants::MAX_PLAYER_NAME_LEN;
use crate::local::ActiveSession;
use crate::persistence::Persistence;
use crate::score::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerIdentity {
    pub id: String,
    pub player_name: String,
    pub created_at: Timestamp,
    pub last_active: Timestamp,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("player name must not be empty")]
    EmptyName,
    #[error("player name must be at most {max} characters")]
    NameTooLong { max: usize },
    #[error("the name {0:?} is already taken")]
    NameTaken(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Comparison key for display names.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn validate(candidate: &str) -> Result<&str, IdentityError> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return Err(IdentityError::EmptyName);
    }
    if trimmed.chars().count() > MAX_PLAYER_NAME_LEN {
        return Err(IdentityError::NameTooLong {
            max: MAX_PLAYER_NAME_LEN,
        });
    }
    Ok(trimmed)
}

/// Whether the active session already owns `existing`.
fn owned_by(session: &ActiveSession, existing: &PlayerIdentity) -> bool {
    match &session.player_id {
        Some(id) => *id == existing.id,
        None => {
            !session.player_name.is_empty()
                && normalize_name(&session.player_name) == normalize_name(&existing.player_name)
        }
    }
}

#[derive(Clone, Debug)]
pub struct IdentityRegistry {
    persistence: Persistence,
}

impl IdentityRegistry {
    #[must_use]
    pub const fn new(persistence: Persistence) -> Self {
        Self { persistence }
    }

    /// Every registered identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the local identity list cannot be read after the
    /// durable backend failed or is absent.
    pub async fn players(&self) -> Result<Vec<PlayerIdentity>, IdentityError> {
        if let Some(backend) = self.persistence.durable() {
            match backend.players().await {
                Ok(players) => return Ok(players),
                Err(err) => {
                    log::warn!("reading players from durable backend failed, using local store: {err}");
                }
            }
        }
        Ok(self.persistence.local().players()?)
    }

    /// Case-insensitive membership check.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity list cannot be read.
    pub async fn name_exists(&self, candidate: &str) -> Result<bool, IdentityError> {
        let wanted = normalize_name(candidate);
        if wanted.is_empty() {
            return Ok(false);
        }
        Ok(self
            .players()
            .await?
            .iter()
            .any(|p| normalize_name(&p.player_name) == wanted))
    }

    /// Claim `candidate` for this session.
    ///
    /// Re-registering the name this session already holds touches
    /// `last_active` instead of creating a second identity.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::NameTaken`] if another identity holds the
    /// name, a validation error for empty or overlong names, or a storage
    /// error if the local store cannot be updated.
    pub async fn register(&self, candidate: &str) -> Result<PlayerIdentity, IdentityError> {
        let name = validate(candidate)?;
        let session = self.persistence.local().active_session();
        let now = self.persistence.now();
        let fresh = PlayerIdentity {
            id: self.persistence.next_id(),
            player_name: name.to_string(),
            created_at: now,
            last_active: now,
        };

        let identity = match self.register_durable(&session, fresh.clone()).await {
            Some(result) => result?,
            None => self.register_local(&session, fresh)?,
        };

        self.persistence.local().set_active_session(&identity)?;
        log::info!("player {:?} signed in as {}", identity.player_name, identity.id);
        Ok(identity)
    }

    /// `None` when there is no durable backend or it failed.
    async fn register_durable(
        &self,
        session: &ActiveSession,
        fresh: PlayerIdentity,
    ) -> Option<Result<PlayerIdentity, IdentityError>> {
        let backend = self.persistence.durable()?;
        let outcome = match backend.insert_player_if_absent(fresh).await {
            Ok(outcome) => outcome,
            Err(err) => {
                log::warn!("registering with durable backend failed, using local store: {err}");
                return None;
            }
        };
        match outcome {
            PlayerInsert::Inserted(player) => Some(Ok(player)),
            PlayerInsert::Existing(mut existing) => {
                if !owned_by(session, &existing) {
                    return Some(Err(IdentityError::NameTaken(existing.player_name)));
                }
                let now = self.persistence.now();
                if let Err(err) = backend.touch_player(&existing.id, now).await {
                    log::warn!("touching player {} failed: {err}", existing.id);
                }
                existing.last_active = now;
                Some(Ok(existing))
            }
        }
    }

    fn register_local(
        &self,
        session: &ActiveSession,
        fresh: PlayerIdentity,
    ) -> Result<PlayerIdentity, IdentityError> {
        let local = self.persistence.local();
        let mut players = local.players()?;
        let wanted = normalize_name(&fresh.player_name);

        let identity = match players
            .iter_mut()
            .find(|p| normalize_name(&p.player_name) == wanted)
        {
            Some(existing) if owned_by(session, existing) => {
                existing.last_active = fresh.last_active;
                existing.clone()
            }
            Some(existing) => return Err(IdentityError::NameTaken(existing.player_name.clone())),
            None => {
                // Keep an id issued by the durable backend so the session
                // still owns the name once the backend is reachable again.
                let identity = match &session.player_id {
                    Some(id) if normalize_name(&session.player_name) == wanted => PlayerIdentity {
                        id: id.clone(),
                        ..fresh
                    },
                    _ => fresh,
                };
                players.push(identity.clone());
                identity
            }
        };
        local.save_players(&players)?;
        Ok(identity)
    }

    /// The session's active name, or an empty string.
    #[must_use]
    pub fn current_name(&self) -> String {
        self.persistence.local().active_session().player_name
    }

    #[must_use]
    pub fn current_identity_id(&self) -> Option<String> {
        self.persistence.local().active_session().player_id
    }

    /// Forget the session's active name. The identity itself stays registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the session storage cannot be updated.
    pub fn sign_out(&self) -> Result<(), IdentityError> {
        self.persistence.local().clear_active_session()?;
        Ok(())
    }

    /// Delete every identity. Score records are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the local identity list cannot be removed.
    pub async fn clear_identities(&self) -> Result<(), IdentityError> {
        if let Some(backend) = self.persistence.durable()
            && let Err(err) = backend.delete_players().await
        {
            log::warn!("clearing players on durable backend failed: {err}");
        }
        self.persistence.local().clear_players()?;
        log::info!("all player identities cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DocumentBackend, MemoryDocumentBackend};
    use crate::local::MemoryStorage;
    use futures::executor::block_on;
    use std::rc::Rc;

    /// Two sessions sharing one identity list but with separate session keys.
    fn session(shared: &MemoryStorage, backend: Option<&MemoryDocumentBackend>) -> IdentityRegistry {
        let mut builder = Persistence::builder(Rc::new(shared.clone()))
            .session_storage(Rc::new(MemoryStorage::new()));
        if let Some(backend) = backend {
            builder = builder.durable(Rc::new(backend.clone()));
        }
        IdentityRegistry::new(builder.build())
    }

    #[test]
    fn rejects_blank_and_overlong_names() {
        let registry = session(&MemoryStorage::new(), None);
        assert!(matches!(
            block_on(registry.register("   ")),
            Err(IdentityError::EmptyName)
        ));
        assert!(matches!(
            block_on(registry.register("abcdefghijklmnopqrstu")),
            Err(IdentityError::NameTooLong { max: 20 })
        ));
        assert_eq!(registry.current_name(), "");
    }

    #[test]
    fn second_session_cannot_take_a_held_name() {
        let shared = MemoryStorage::new();
        let first = session(&shared, None);
        let second = session(&shared, None);

        let alice = block_on(first.register("  Alice ")).unwrap();
        assert_eq!(alice.player_name, "Alice");
        assert_eq!(first.current_name(), "Alice");
        assert!(block_on(second.name_exists("ALICE")).unwrap());

        let err = block_on(second.register("alice")).unwrap_err();
        assert!(matches!(err, IdentityError::NameTaken(name) if name == "Alice"));
        assert_eq!(second.current_name(), "");
    }

    #[test]
    fn same_session_re_registers_without_duplicating() {
        let shared = MemoryStorage::new();
        let registry = session(&shared, None);
        let first = block_on(registry.register("Alice")).unwrap();
        let again = block_on(registry.register("aLiCe")).unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(block_on(registry.players()).unwrap().len(), 1);
    }

    #[test]
    fn durable_registration_is_a_conditional_insert() {
        let shared = MemoryStorage::new();
        let backend = MemoryDocumentBackend::new();
        let first = session(&shared, Some(&backend));
        let second = session(&MemoryStorage::new(), Some(&backend));

        block_on(first.register("Bob")).unwrap();
        assert!(matches!(
            block_on(second.register(" bob")),
            Err(IdentityError::NameTaken(_))
        ));
        assert_eq!(block_on(backend.players()).unwrap().len(), 1);
        assert!(block_on(first.register("BOB")).is_ok());
        assert_eq!(block_on(backend.players()).unwrap().len(), 1);
    }

    #[test]
    fn offline_backend_falls_back_to_local_identities() {
        let shared = MemoryStorage::new();
        let backend = MemoryDocumentBackend::offline();
        let registry = session(&shared, Some(&backend));
        block_on(registry.register("Carol")).unwrap();
        assert_eq!(shared.len(), 1);
        assert!(block_on(registry.name_exists("carol")).unwrap());
    }

    #[test]
    fn backend_outage_keeps_the_session_on_its_durable_identity() {
        let shared = MemoryStorage::new();
        let backend = MemoryDocumentBackend::new();
        let registry = session(&shared, Some(&backend));

        let online = block_on(registry.register("Alice")).unwrap();
        backend.set_online(false);
        let offline = block_on(registry.register("alice")).unwrap();
        assert_eq!(offline.id, online.id);

        backend.set_online(true);
        let back = block_on(registry.register("Alice")).unwrap();
        assert_eq!(back.id, online.id);
        assert_eq!(registry.current_identity_id(), Some(online.id));
        assert_eq!(block_on(backend.players()).unwrap().len(), 1);
    }

    #[test]
    fn sign_out_releases_the_session_but_keeps_the_identity() {
        let shared = MemoryStorage::new();
        let registry = session(&shared, None);
        block_on(registry.register("Dana")).unwrap();
        registry.sign_out().unwrap();
        assert_eq!(registry.current_name(), "");
        assert!(registry.current_identity_id().is_none());
        assert!(block_on(registry.name_exists("dana")).unwrap());

        block_on(registry.clear_identities()).unwrap();
        assert!(!block_on(registry.name_exists("dana")).unwrap());
    }
}
