//! Single-value store bound to a namespace and scope

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::{row_cost, AccountId, Database, StoreId, ValueSlot};
use crate::error::{Error, Result};

/// At most one value per `(namespace, scope)`, billed like a row
pub struct Singleton<T> {
    db: Database,
    id: StoreId,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Clone + Serialize + DeserializeOwned> Singleton<T> {
    /// Bind a singleton view to the given namespace and scope
    pub fn new(db: &Database, namespace: AccountId, scope: u64) -> Self {
        Self {
            db: db.clone(),
            id: StoreId { namespace, scope },
            _marker: PhantomData,
        }
    }

    /// Check whether a value is stored
    pub fn exists(&self) -> bool {
        self.db.read().singletons.contains_key(&self.id)
    }

    /// Decode the stored value
    pub fn get(&self) -> Result<T> {
        let inner = self.db.read();
        let slot = inner
            .singletons
            .get(&self.id)
            .ok_or_else(|| Error::NotFound("singleton does not exist".to_string()))?;
        Ok(serde_json::from_slice(&slot.bytes)?)
    }

    /// Stored value, or `default` without writing anything
    pub fn get_or_default(&self, default: T) -> Result<T> {
        if self.exists() {
            self.get()
        } else {
            Ok(default)
        }
    }

    /// Stored value, writing `default` billed to `payer` if absent
    pub fn get_or_create(&self, payer: AccountId, default: T) -> Result<T> {
        if !self.exists() {
            self.set(&default, payer)?;
        }
        self.get()
    }

    /// Store a value, billed to `payer`; any previous owner is refunded
    pub fn set(&self, value: &T, payer: AccountId) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        let cost = row_cost(&bytes);

        let mut inner = self.db.write();
        if let Some(old) = inner.singletons.remove(&self.id) {
            let old_cost = row_cost(&old.bytes);
            inner.refund(old.owner, old_cost);
        }
        inner.singletons.insert(
            self.id,
            ValueSlot {
                owner: payer,
                bytes,
            },
        );
        inner.charge(payer, cost);
        Ok(())
    }

    /// Delete the stored value and refund its owner; no-op when absent
    pub fn remove(&self) {
        let mut inner = self.db.write();
        if let Some(slot) = inner.singletons.remove(&self.id) {
            inner.refund(slot.owner, row_cost(&slot.bytes));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Config {
        paused: bool,
        fee: u64,
    }

    fn setup() -> (Database, Singleton<Config>) {
        let db = Database::new();
        let single = Singleton::new(&db, AccountId(1), 0);
        (db, single)
    }

    #[test]
    fn test_get_missing() {
        let (_db, single) = setup();

        assert!(!single.exists());
        assert!(matches!(single.get(), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_set_and_get() {
        let (_db, single) = setup();

        let config = Config {
            paused: true,
            fee: 30,
        };
        single.set(&config, AccountId(1)).unwrap();

        assert!(single.exists());
        assert_eq!(single.get().unwrap(), config);
    }

    #[test]
    fn test_get_or_default_does_not_write() {
        let (_db, single) = setup();

        let value = single.get_or_default(Config::default()).unwrap();
        assert_eq!(value, Config::default());
        assert!(!single.exists());
    }

    #[test]
    fn test_get_or_create_writes_once() {
        let (db, single) = setup();
        let alice = AccountId(1);

        let value = single
            .get_or_create(alice, Config { paused: false, fee: 5 })
            .unwrap();
        assert_eq!(value.fee, 5);
        assert!(single.exists());
        let usage = db.usage_of(alice);
        assert!(usage > 0);

        // Second call reads the stored value and bills nothing new
        single
            .get_or_create(alice, Config { paused: true, fee: 9 })
            .unwrap();
        assert_eq!(single.get().unwrap().fee, 5);
        assert_eq!(db.usage_of(alice), usage);
    }

    #[test]
    fn test_set_rebills_new_payer() {
        let (db, single) = setup();
        let alice = AccountId(1);
        let bob = AccountId(2);

        single.set(&Config::default(), alice).unwrap();
        let alice_usage = db.usage_of(alice);
        assert!(alice_usage > 0);

        single.set(&Config::default(), bob).unwrap();
        assert_eq!(db.usage_of(alice), 0);
        assert_eq!(db.usage_of(bob), alice_usage);
    }

    #[test]
    fn test_remove_refunds() {
        let (db, single) = setup();
        let alice = AccountId(1);

        single.set(&Config::default(), alice).unwrap();
        single.remove();

        assert!(!single.exists());
        assert_eq!(db.usage_of(alice), 0);

        // Removing again is a no-op
        single.remove();
    }
}
