#![forbid(unsafe_code)]

//! Encryption context: key store access, the session key and the open unit.
//!
//! One EncryptedData is encrypted or decrypted per *unit*.  The session key
//! outlives units.

use xseal_core::Error;
use xseal_keys::{Key, KeysManager};

/// Context for XML-Enc operations.
pub struct EncContext<'a> {
    /// Keys manager for recipient and private key lookup.
    pub keys_manager: &'a KeysManager,
    /// Additional ID attribute names.
    pub id_attrs: Vec<String>,
    session_key: Option<Key>,
    unit_open: bool,
}

impl<'a> EncContext<'a> {
    pub fn new(keys_manager: &'a KeysManager) -> Self {
        Self {
            keys_manager,
            id_attrs: Vec::new(),
            session_key: None,
            unit_open: false,
        }
    }

    /// Attach the symmetric session key used by following units.
    pub fn set_session_key(&mut self, key: Key) {
        self.session_key = Some(key);
    }

    pub fn session_key(&self) -> Option<&Key> {
        self.session_key.as_ref()
    }

    /// Start a unit.  Fails if the previous one was never ended.
    pub fn begin_unit(&mut self) -> Result<(), Error> {
        if self.unit_open {
            return Err(Error::Other("encryption unit already open".into()));
        }
        self.unit_open = true;
        Ok(())
    }

    /// End the current unit: the session key is detached, the unit closed
    /// and the key reattached.
    pub fn end_unit(&mut self) {
        let key = self.session_key.take();
        self.unit_open = false;
        self.session_key = key;
    }

    /// Run `f` as one unit.  The unit is ended whether or not `f` succeeds.
    pub fn unit<T, F>(&mut self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Self) -> Result<T, Error>,
    {
        self.begin_unit()?;
        let out = f(self);
        self.end_unit();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_unit_keeps_session_key() {
        let keys = KeysManager::new();
        let mut ctx = EncContext::new(&keys);
        ctx.set_session_key(Key::symmetric(vec![1u8; 16]).with_name("key0"));

        ctx.begin_unit().unwrap();
        ctx.end_unit();
        assert_eq!(ctx.session_key().unwrap().name.as_deref(), Some("key0"));
    }

    #[test]
    fn units_do_not_nest() {
        let keys = KeysManager::new();
        let mut ctx = EncContext::new(&keys);
        ctx.begin_unit().unwrap();
        assert!(ctx.begin_unit().is_err());
        ctx.end_unit();
        assert!(ctx.begin_unit().is_ok());
    }

    #[test]
    fn failing_unit_is_still_ended() {
        let keys = KeysManager::new();
        let mut ctx = EncContext::new(&keys);
        let out: Result<(), Error> = ctx.unit(|c| {
            assert!(c.begin_unit().is_err());
            Err(Error::Other("boom".into()))
        });
        assert!(out.is_err());
        assert!(ctx.unit(|_| Ok(())).is_ok());
    }
}
