//! Credential vault: at most one live deposit credential per user.

use std::sync::Arc;

use super::credential::{Credential, PublicKeyFormat, PublicKeyHex};
use super::error::TopupError;
use super::store::{MemoryStore, UserStore};

pub struct CredentialVault {
    store: Arc<dyn UserStore<Arc<Credential>>>,
    format: PublicKeyFormat,
}

impl CredentialVault {
    pub fn new(format: PublicKeyFormat) -> Self {
        Self::with_store(Arc::new(MemoryStore::<Arc<Credential>>::new()), format)
    }

    pub fn with_store(store: Arc<dyn UserStore<Arc<Credential>>>, format: PublicKeyFormat) -> Self {
        Self { store, format }
    }

    /// Issue a credential and return its public key.
    ///
    /// An existing credential is never replaced: funds may already sit at its
    /// address.
    pub fn issue(&self, user_id: &str) -> Result<PublicKeyHex, TopupError> {
        if self.store.contains(user_id) {
            return Err(TopupError::AlreadyInvoicing);
        }
        let credential = Arc::new(Credential::generate(self.format));
        let public_key = credential.public_key().clone();
        if self.store.insert_if_absent(user_id, credential) {
            Ok(public_key)
        } else {
            Err(TopupError::AlreadyInvoicing)
        }
    }

    pub fn get(&self, user_id: &str) -> Option<Arc<Credential>> {
        self.store.get(user_id)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.store.contains(user_id)
    }

    /// Drop the user's credential. The key is zeroized once the last
    /// in-flight handle goes away.
    pub fn clear(&self, user_id: &str) -> bool {
        self.store.remove(user_id).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.store.len()
    }
}
