//! Walking the secret keys a user has configured.
//!
//! The default key comes first, then every entry of the "secret keys to
//! try" list. Each name is resolved with a secret key lookup and all keys
//! of the resulting keyblock are yielded before moving on.

use std::collections::VecDeque;

use log::debug;

use crate::error::{Error, Result};
use crate::packet::KeyRecord;
use crate::session::Session;
use crate::types::KeyUsage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    DefaultKey,
    List(usize),
    Done,
}

/// Secret key enumerator, created by [`Session::secret_keys`].
pub struct SecretKeys<'s, 'a> {
    session: &'s mut Session<'a>,
    state: State,
    pending: VecDeque<KeyRecord>,
    finished: bool,
}

impl<'s, 'a> SecretKeys<'s, 'a> {
    pub(crate) fn new(session: &'s mut Session<'a>) -> Self {
        Self {
            session,
            state: State::DefaultKey,
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// The next key.
    ///
    /// # Returns
    /// `Ok(None)` once all names are exhausted, then
    /// [`Error::EnumerationFinished`] on every further call.
    pub fn next_key(&mut self) -> Result<Option<KeyRecord>> {
        if self.finished {
            return Err(Error::EnumerationFinished);
        }

        loop {
            if let Some(key) = self.pending.pop_front() {
                return Ok(Some(key));
            }

            let Some(name) = self.next_name() else {
                self.finished = true;
                return Ok(None);
            };

            match self.session.getkey_byname(Some(&name), KeyUsage::empty(), true) {
                Ok((found, _)) => {
                    self.pending = found
                        .keyblock()
                        .keys()
                        .map(|(_, key)| key.clone())
                        .collect();
                }
                Err(e) => debug!("secret key enumeration: skipping '{}': {}", name, e),
            }
        }
    }

    fn next_name(&mut self) -> Option<String> {
        loop {
            let name = match self.state {
                State::DefaultKey => {
                    self.state = State::List(0);
                    self.session.parse_def_secret_key()
                }
                State::List(i) => match self.session.config().secret_keys_to_try.get(i) {
                    Some(name) => {
                        self.state = State::List(i + 1);
                        Some(name.clone())
                    }
                    None => {
                        self.state = State::Done;
                        None
                    }
                },
                State::Done => return None,
            };
            if let Some(name) = name.filter(|n| !n.is_empty()) {
                return Some(name);
            }
        }
    }
}

impl Iterator for SecretKeys<'_, '_> {
    type Item = KeyRecord;

    fn next(&mut self) -> Option<KeyRecord> {
        self.next_key().ok().flatten()
    }
}
