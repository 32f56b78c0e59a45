//! Server salt bookkeeping.

/// Refresh salts when the current one has less than this many seconds left.
pub const REFRESH_MARGIN: i32 = 10 * 60;

/// One salt and the server-time window it is valid for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerSalt {
    pub salt: i64,
    pub valid_since: i32,
    pub valid_until: i32,
}

impl ServerSalt {
    /// A salt with no known window, as learned from the handshake or from
    /// `bad_server_salt`.
    pub fn open(salt: i64) -> Self {
        Self { salt, valid_since: 0, valid_until: i32::MAX }
    }

    fn covers(&self, now: i32) -> bool {
        self.valid_since <= now && now < self.valid_until
    }
}

/// Salts ordered by `valid_since`. Never empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaltSet {
    salts: Vec<ServerSalt>,
}

impl SaltSet {
    pub fn new(first_salt: i64) -> Self {
        Self { salts: vec![ServerSalt::open(first_salt)] }
    }

    /// Restore a persisted list, falling back to `fallback` when it is empty.
    pub fn from_salts(mut salts: Vec<ServerSalt>, fallback: i64) -> Self {
        if salts.is_empty() {
            return Self::new(fallback);
        }
        salts.sort_by_key(|s| s.valid_since);
        Self { salts }
    }

    /// The newest salt valid at `now`, or the newest one known.
    pub fn current(&self, now: i32) -> i64 {
        self.salts
            .iter()
            .rev()
            .find(|s| s.covers(now))
            .or(self.salts.last())
            .map_or(0, |s| s.salt)
    }

    /// Forget everything in favour of the salt from `bad_server_salt`.
    pub fn replace(&mut self, salt: i64) {
        self.salts.clear();
        self.salts.push(ServerSalt::open(salt));
    }

    /// Merge salts from `future_salts`, dropping any that expired by `now`.
    ///
    /// Salts without a known window are superseded by the incoming ones.
    pub fn extend(&mut self, incoming: impl IntoIterator<Item = ServerSalt>, now: i32) {
        let newest = self.salts.last().copied();

        let mut incoming = incoming.into_iter().peekable();
        if incoming.peek().is_some() {
            self.salts.retain(|s| *s != ServerSalt::open(s.salt));
        }
        for salt in incoming {
            if let Some(existing) = self.salts.iter_mut().find(|s| s.salt == salt.salt) {
                *existing = salt;
            } else {
                self.salts.push(salt);
            }
        }
        self.salts.retain(|s| s.valid_until > now);
        self.salts.sort_by_key(|s| s.valid_since);

        if self.salts.is_empty() {
            self.salts.extend(newest);
        }
    }

    /// True when fewer than two salts remain valid or the current one runs
    /// out within [`REFRESH_MARGIN`].
    pub fn needs_refresh(&self, now: i32) -> bool {
        let usable = self.salts.iter().filter(|s| s.valid_until > now).count();
        if usable < 2 {
            return true;
        }
        let current = self.current(now);
        self.salts
            .iter()
            .find(|s| s.salt == current)
            .is_some_and(|s| s.valid_until.saturating_sub(now) < REFRESH_MARGIN)
    }

    pub fn as_slice(&self) -> &[ServerSalt] {
        &self.salts
    }

    pub fn len(&self) -> usize {
        self.salts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.salts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn salt(salt: i64, valid_since: i32, valid_until: i32) -> ServerSalt {
        ServerSalt { salt, valid_since, valid_until }
    }

    #[test]
    fn first_salt_is_current_until_replaced() {
        let mut set = SaltSet::new(7);
        assert_eq!(set.current(1000), 7);
        set.replace(8);
        assert_eq!(set.current(1000), 8);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn newest_covering_window_wins() {
        let mut set = SaltSet::new(1);
        set.extend([salt(2, 1000, 2800), salt(3, 2600, 4400)], 1000);
        assert_eq!(set.current(1500), 2);
        assert_eq!(set.current(2700), 3);
        // Past every window: the newest known salt.
        assert_eq!(set.current(9000), 3);
    }

    #[test]
    fn extend_drops_expired_and_dedupes() {
        let mut set = SaltSet::new(1);
        set.extend([salt(2, 0, 100), salt(3, 100, 2000)], 500);
        assert_eq!(set.as_slice().iter().map(|s| s.salt).collect::<Vec<_>>(), vec![3]);

        set.extend([salt(3, 100, 3000), salt(4, 2000, 4000)], 500);
        assert_eq!(set.len(), 2);
        assert_eq!(set.as_slice()[0].valid_until, 3000);
    }

    #[test]
    fn never_becomes_empty() {
        let mut set = SaltSet::from_salts(vec![salt(5, 0, 100)], 0);
        set.extend(Vec::<ServerSalt>::new(), 500);
        assert_eq!(set.current(500), 5);
        assert!(!set.is_empty());
    }

    #[test]
    fn refresh_policy() {
        let now = 10_000;
        let mut set = SaltSet::new(1);
        assert!(set.needs_refresh(now));

        set.replace(2);
        set.extend([salt(3, now - 100, now + 3600), salt(4, now + 3000, now + 7200)], now);
        assert!(!set.needs_refresh(now));
        assert!(set.needs_refresh(now + 7200 - REFRESH_MARGIN / 2));
    }

    #[test]
    fn restore_sorts_and_falls_back() {
        let set = SaltSet::from_salts(vec![salt(9, 50, 60), salt(8, 10, 60)], 0);
        assert_eq!(set.as_slice()[0].salt, 8);
        assert_eq!(SaltSet::from_salts(Vec::new(), 42).current(0), 42);
    }
}
