//! Credential storage.

use std::path::Path;

use sled::transaction::{ConflictableTransactionError, TransactionError};

use crate::credentials::CredentialRecord;
use crate::{ConflictField, IssuerError};

/// Credential store used by the issuer.
///
/// Implementations must enforce uniqueness of username and email inside
/// `insert`; the pre-checks the issuer performs are advisory only.
pub trait CredentialStore: Send + Sync {
    /// Look up a record by username.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn find_by_username(&self, username: &str) -> Result<Option<CredentialRecord>, IssuerError>;

    /// Check whether a username is taken.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn username_exists(&self, username: &str) -> Result<bool, IssuerError>;

    /// Check whether an email is registered.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn email_exists(&self, email: &str) -> Result<bool, IssuerError>;

    /// Insert a new record atomically.
    ///
    /// # Errors
    ///
    /// Returns `IssuerError::Conflict` if the username or email is already
    /// present at commit time, or a storage error.
    fn insert(&self, record: &CredentialRecord) -> Result<(), IssuerError>;
}

const USER_PREFIX: &str = "user:";
const EMAIL_INDEX_PREFIX: &str = "idx:email:";

fn user_key(username: &str) -> String {
    format!("{USER_PREFIX}{username}")
}

fn email_key(email: &str) -> String {
    format!("{EMAIL_INDEX_PREFIX}{}", email.trim().to_lowercase())
}

/// Credential store backed by sled.
pub struct SledStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledStore {
    /// Open or create a credential store at the given path.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, IssuerError> {
        let db = sled::open(path.join("credentials"))
            .map_err(|e| IssuerError::Storage(format!("Failed to open credential database: {e}")))?;

        Self::with_db(db)
    }

    /// Create a store with an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns error if tree cannot be opened.
    pub fn with_db(db: sled::Db) -> Result<Self, IssuerError> {
        let tree = db
            .open_tree("credentials")
            .map_err(|e| IssuerError::Storage(format!("Failed to open credentials tree: {e}")))?;

        Ok(Self { db, tree })
    }

    /// Get the underlying sled database.
    #[must_use]
    pub const fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Count stored records.
    #[must_use]
    pub fn count(&self) -> usize {
        self.tree.scan_prefix(USER_PREFIX).count()
    }

    /// List all records.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn list(&self) -> Result<Vec<CredentialRecord>, IssuerError> {
        let mut records = Vec::new();

        for result in self.tree.scan_prefix(USER_PREFIX) {
            let (_, value) = result.map_err(|e| IssuerError::Storage(format!("Iter error: {e}")))?;
            let record: CredentialRecord = serde_json::from_slice(&value)
                .map_err(|e| IssuerError::Storage(format!("Deserialization error: {e}")))?;
            records.push(record);
        }

        Ok(records)
    }
}

impl CredentialStore for SledStore {
    fn find_by_username(&self, username: &str) -> Result<Option<CredentialRecord>, IssuerError> {
        match self.tree.get(user_key(username).as_bytes()) {
            Ok(Some(value)) => {
                let record: CredentialRecord = serde_json::from_slice(&value)
                    .map_err(|e| IssuerError::Storage(format!("Deserialization error: {e}")))?;
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(IssuerError::Storage(format!("Get error: {e}"))),
        }
    }

    fn username_exists(&self, username: &str) -> Result<bool, IssuerError> {
        self.tree
            .contains_key(user_key(username).as_bytes())
            .map_err(|e| IssuerError::Storage(format!("Lookup error: {e}")))
    }

    fn email_exists(&self, email: &str) -> Result<bool, IssuerError> {
        self.tree
            .contains_key(email_key(email).as_bytes())
            .map_err(|e| IssuerError::Storage(format!("Index lookup error: {e}")))
    }

    fn insert(&self, record: &CredentialRecord) -> Result<(), IssuerError> {
        let user_key = user_key(&record.username);
        let email_key = email_key(&record.email);
        let value = serde_json::to_vec(record)
            .map_err(|e| IssuerError::Storage(format!("Serialization error: {e}")))?;

        // Both uniqueness checks and both writes commit together; sled retries
        // the closure on conflicting concurrent transactions.
        let result = self.tree.transaction(|tx| {
            if tx.get(user_key.as_bytes())?.is_some() {
                return Err(ConflictableTransactionError::Abort(ConflictField::Username));
            }
            if tx.get(email_key.as_bytes())?.is_some() {
                return Err(ConflictableTransactionError::Abort(ConflictField::Email));
            }

            tx.insert(user_key.as_bytes(), value.as_slice())?;
            tx.insert(email_key.as_bytes(), record.username.as_bytes())?;
            Ok(())
        });

        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(field)) => return Err(IssuerError::Conflict(field)),
            Err(TransactionError::Storage(e)) => {
                return Err(IssuerError::Storage(format!("Insert error: {e}")));
            }
        }

        self.tree
            .flush()
            .map_err(|e| IssuerError::Storage(format!("Flush error: {e}")))?;

        Ok(())
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("records", &self.count())
            .finish_non_exhaustive()
    }
}
