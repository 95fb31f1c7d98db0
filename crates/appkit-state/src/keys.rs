use thiserror::Error;

/// Durable key holding the persisted list of synced session keys.
pub const DBKEY_SYNC_KEYS: &str = "sync_keys";

/// Marker payload for signals that carry no argument.
pub(crate) const DUMMY_PAYLOAD: &str = "_dummy";

/// A cross-context signal. Each signal is sent by writing, then immediately removing, the durable
/// key with the signal's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Add a key to the receivers' sync key registry.
    AddToSyncKeys,
    /// Remove a key from the receivers' sync key registry.
    RemoveFromSyncKeys,
    /// Ask every other context to push its session storage.
    GetSessionStorage,
    /// A context's whole session storage, pushed in answer to [Signal::GetSessionStorage].
    SetSessionStorage,
    /// Mirror a synced session entry.
    AddToSessionStorage,
    /// Remove a session entry.
    RemoveFromSessionStorage,
    /// Clear the session storage of every context.
    ClearAllSessionsStorage,
}

impl Signal {
    /// Every signal, in declaration order.
    pub const ALL: [Signal; 7] = [
        Signal::AddToSyncKeys,
        Signal::RemoveFromSyncKeys,
        Signal::GetSessionStorage,
        Signal::SetSessionStorage,
        Signal::AddToSessionStorage,
        Signal::RemoveFromSessionStorage,
        Signal::ClearAllSessionsStorage,
    ];

    /// The durable key the signal is sent on.
    pub const fn name(self) -> &'static str {
        match self {
            Signal::AddToSyncKeys => "addToSyncKeys",
            Signal::RemoveFromSyncKeys => "removeFromSyncKeys",
            Signal::GetSessionStorage => "getSessionStorage",
            Signal::SetSessionStorage => "setSessionStorage",
            Signal::AddToSessionStorage => "addToSessionStorage",
            Signal::RemoveFromSessionStorage => "removeFromSessionStorage",
            Signal::ClearAllSessionsStorage => "clearAllSessionsStorage",
        }
    }

    /// The signal sent on the durable key `name`, if any.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|signal| signal.name() == name)
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A key that cannot be used for application data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidKeyError {
    #[allow(missing_docs)]
    #[error("key cannot be empty")]
    Empty,
    #[allow(missing_docs)]
    #[error("The storage key \"{0}\" is reserved and cannot be used. Please use a different key")]
    Reserved(String),
}

/// Check that `key` can be used for application data: it must not be empty and must not collide
/// with the registry key or a signal name.
pub fn validate_key(key: &str) -> Result<(), InvalidKeyError> {
    if key.is_empty() {
        return Err(InvalidKeyError::Empty);
    }
    if key == DBKEY_SYNC_KEYS || Signal::from_name(key).is_some() {
        return Err(InvalidKeyError::Reserved(key.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_names_round_trip() {
        for signal in Signal::ALL {
            assert_eq!(Signal::from_name(signal.name()), Some(signal));
        }
        assert_eq!(Signal::from_name("user_data"), None);
    }

    #[test]
    fn rejects_empty_and_reserved_keys() {
        assert_eq!(validate_key(""), Err(InvalidKeyError::Empty));
        assert_eq!(
            validate_key("sync_keys"),
            Err(InvalidKeyError::Reserved("sync_keys".to_owned()))
        );
        for signal in Signal::ALL {
            assert!(matches!(
                validate_key(signal.name()),
                Err(InvalidKeyError::Reserved(_))
            ));
        }
    }

    #[test]
    fn accepts_application_keys() {
        assert_eq!(validate_key("current_user"), Ok(()));
        assert_eq!(validate_key("addToSyncKeysLater"), Ok(()));
    }
}
