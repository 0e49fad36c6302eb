use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::prelude::*;

use dirdav_dav::types::{LockScope, Owner};

use crate::clock::Clock;
use crate::error::{DavError, Result};
use crate::path::DavPath;

pub const TOKEN_SCHEME: &str = "opaquelocktoken:";

/// A lock covers its root only, or its root and the whole subtree below
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDepth {
    Zero,
    Infinity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lock {
    pub token: String,
    pub root: DavPath,
    pub scope: LockScope,
    pub depth: LockDepth,
    pub owner: Option<Owner>,
    /// Requested duration in seconds, `None` is infinite
    pub timeout: Option<u64>,
    /// Absolute expiry in milliseconds since UNIX Epoch
    pub expires_at: Option<u64>,
}

impl Lock {
    pub fn covers(&self, path: &DavPath) -> bool {
        match self.depth {
            LockDepth::Zero => &self.root == path,
            LockDepth::Infinity => self.root.contains(path),
        }
    }

    /// Seconds left before expiry, `None` if the lock never expires
    pub fn remaining_secs(&self, now_msec: u64) -> Option<u64> {
        self.expires_at
            .map(|at| at.saturating_sub(now_msec).div_ceil(1000))
    }
}

/// The single place deciding whether a lock is still alive
pub fn is_expired(lock: &Lock, now_msec: u64) -> bool {
    matches!(lock.expires_at, Some(at) if at <= now_msec)
}

fn compatible(held: LockScope, requested: LockScope) -> bool {
    held == LockScope::Shared && requested == LockScope::Shared
}

fn gen_token() -> String {
    let mut raw = [0u8; 16];
    thread_rng().fill_bytes(&mut raw);
    // UUID version 4, RFC 4122 variant
    raw[6] = (raw[6] & 0x0f) | 0x40;
    raw[8] = (raw[8] & 0x3f) | 0x80;
    let h = hex::encode(raw);
    format!(
        "{}{}-{}-{}-{}-{}",
        TOKEN_SCHEME,
        &h[0..8],
        &h[8..12],
        &h[12..16],
        &h[16..20],
        &h[20..32]
    )
}

/// Number of locks rooted strictly below a path
#[derive(Default, Debug, Clone, Copy)]
struct Below {
    shared: usize,
    exclusive: usize,
}

#[derive(Default)]
struct LockTable {
    by_token: HashMap<String, Lock>,
    by_path: BTreeMap<DavPath, Vec<String>>,
    below: HashMap<DavPath, Below>,
    expiry: BTreeSet<(u64, String)>,
}

impl LockTable {
    fn insert(&mut self, lock: Lock) {
        for ancestor in lock.root.ancestors() {
            let counter = self.below.entry(ancestor).or_default();
            match lock.scope {
                LockScope::Shared => counter.shared += 1,
                LockScope::Exclusive => counter.exclusive += 1,
            }
        }
        if let Some(at) = lock.expires_at {
            self.expiry.insert((at, lock.token.clone()));
        }
        self.by_path
            .entry(lock.root.clone())
            .or_default()
            .push(lock.token.clone());
        self.by_token.insert(lock.token.clone(), lock);
    }

    fn remove(&mut self, token: &str) -> Option<Lock> {
        let lock = self.by_token.remove(token)?;
        for ancestor in lock.root.ancestors() {
            if let Some(counter) = self.below.get_mut(&ancestor) {
                match lock.scope {
                    LockScope::Shared => counter.shared -= 1,
                    LockScope::Exclusive => counter.exclusive -= 1,
                }
                if counter.shared == 0 && counter.exclusive == 0 {
                    self.below.remove(&ancestor);
                }
            }
        }
        if let Some(at) = lock.expires_at {
            self.expiry.remove(&(at, lock.token.clone()));
        }
        if let Some(tokens) = self.by_path.get_mut(&lock.root) {
            tokens.retain(|t| t != token);
            if tokens.is_empty() {
                self.by_path.remove(&lock.root);
            }
        }
        Some(lock)
    }

    fn purge(&mut self, now_msec: u64) {
        while let Some((_, token)) = self.expiry.first().cloned() {
            let alive = self
                .by_token
                .get(&token)
                .map(|lock| !is_expired(lock, now_msec))
                .unwrap_or(false);
            if alive {
                break;
            }
            tracing::debug!(token=%token, "lock expired");
            self.expiry.pop_first();
            self.remove(&token);
        }
    }

    fn rooted_at(&self, path: &DavPath) -> impl Iterator<Item = &Lock> {
        self.by_path
            .get(path)
            .into_iter()
            .flatten()
            .filter_map(|t| self.by_token.get(t))
    }

    /// Locks rooted at an ancestor with infinite depth, then locks rooted at path
    fn covering(&self, path: &DavPath) -> Vec<Lock> {
        let mut acc: Vec<Lock> = path
            .ancestors()
            .iter()
            .flat_map(|a| self.rooted_at(a))
            .filter(|l| l.depth == LockDepth::Infinity)
            .cloned()
            .collect();
        acc.extend(self.rooted_at(path).cloned());
        acc
    }

    /// Root of a lock that forbids taking `scope` on `path` with `depth`
    fn conflict(&self, path: &DavPath, scope: LockScope, depth: LockDepth) -> Option<DavPath> {
        if let Some(held) = self
            .covering(path)
            .into_iter()
            .find(|l| !compatible(l.scope, scope))
        {
            return Some(held.root);
        }

        if depth == LockDepth::Zero {
            return None;
        }
        let below = self.below.get(path).copied().unwrap_or_default();
        let blocked = match scope {
            LockScope::Shared => below.exclusive > 0,
            LockScope::Exclusive => below.exclusive + below.shared > 0,
        };
        if !blocked {
            return None;
        }
        self.by_token
            .values()
            .find(|l| path.is_ancestor_of(&l.root) && !compatible(l.scope, scope))
            .map(|l| l.root.clone())
    }
}

/// In-memory table of the active locks.
///
/// Expired locks are purged lazily at the beginning of every operation,
/// so they are never observed by a caller.
pub struct LockManager {
    clock: Arc<dyn Clock>,
    table: Mutex<LockTable>,
}

impl LockManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            table: Mutex::new(LockTable::default()),
        }
    }

    pub fn now_msec(&self) -> u64 {
        self.clock.now_msec()
    }

    fn table(&self) -> MutexGuard<'_, LockTable> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.purge(self.clock.now_msec());
        table
    }

    fn expiry(&self, timeout: Option<u64>) -> Option<u64> {
        timeout.map(|secs| self.clock.now_msec().saturating_add(secs.saturating_mul(1000)))
    }

    pub fn acquire(
        &self,
        path: &DavPath,
        scope: LockScope,
        depth: LockDepth,
        owner: Option<Owner>,
        timeout: Option<u64>,
    ) -> Result<Lock> {
        let mut table = self.table();
        if let Some(root) = table.conflict(path, scope, depth) {
            tracing::debug!(path=%path, held=%root, "lock refused");
            return Err(DavError::LockConflict(root));
        }

        let lock = Lock {
            token: gen_token(),
            root: path.clone(),
            scope,
            depth,
            owner,
            timeout,
            expires_at: self.expiry(timeout),
        };
        table.insert(lock.clone());
        tracing::debug!(path=%path, token=%lock.token, "lock granted");
        Ok(lock)
    }

    pub fn refresh(&self, token: &str, timeout: Option<u64>) -> Result<Lock> {
        let mut table = self.table();
        let mut lock = table.remove(token).ok_or(DavError::NoSuchLock)?;
        lock.timeout = timeout;
        lock.expires_at = self.expiry(timeout);
        table.insert(lock.clone());
        Ok(lock)
    }

    pub fn release(&self, token: &str) -> Result<()> {
        self.table()
            .remove(token)
            .map(|_| ())
            .ok_or(DavError::NoSuchLock)
    }

    /// UNLOCK: the token must name a lock whose scope covers `path`
    pub fn unlock(&self, path: &DavPath, token: &str) -> Result<()> {
        let mut table = self.table();
        let covers = table
            .by_token
            .get(token)
            .map(|lock| lock.covers(path))
            .unwrap_or(false);
        if !covers {
            return Err(DavError::NoSuchLock);
        }
        table.remove(token);
        Ok(())
    }

    /// Active locks covering `path`
    pub fn query(&self, path: &DavPath) -> Vec<Lock> {
        self.table().covering(path)
    }

    pub fn get(&self, token: &str) -> Option<Lock> {
        self.table().by_token.get(token).cloned()
    }

    /// Succeeds when `path` is not locked or when one of the locks
    /// covering it has been submitted
    pub fn confirm(&self, path: &DavPath, submitted: &[String]) -> Result<()> {
        let covering = self.table().covering(path);
        match covering.first() {
            None => Ok(()),
            Some(_) if covering.iter().any(|l| submitted.contains(&l.token)) => Ok(()),
            Some(held) => Err(DavError::LockConflict(held.root.clone())),
        }
    }

    /// Like `confirm`, but the locks rooted inside the subtree of `path`
    /// must have been submitted too
    pub fn confirm_tree(&self, path: &DavPath, submitted: &[String]) -> Result<()> {
        self.confirm(path, submitted)?;
        let table = self.table();
        let held = table
            .by_token
            .values()
            .find(|l| path.is_ancestor_of(&l.root) && !submitted.contains(&l.token));
        match held {
            Some(lock) => Err(DavError::LockConflict(lock.root.clone())),
            None => Ok(()),
        }
    }

    pub fn rooted_at(&self, path: &DavPath) -> Vec<Lock> {
        self.table().rooted_at(path).cloned().collect()
    }

    /// Drop the locks rooted at `path`, its resource is gone
    pub fn forget(&self, path: &DavPath) {
        let mut table = self.table();
        let tokens = table.by_path.get(path).cloned().unwrap_or_default();
        for token in tokens {
            table.remove(&token);
        }
    }

    /// Drop the locks rooted at `path` or anywhere below it
    pub fn forget_tree(&self, path: &DavPath) {
        let mut table = self.table();
        let tokens: Vec<String> = table
            .by_token
            .values()
            .filter(|l| path.contains(&l.root))
            .map(|l| l.token.clone())
            .collect();
        for token in tokens {
            table.remove(&token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn p(raw: &str) -> DavPath {
        DavPath::parse(raw).unwrap()
    }

    fn manager() -> (Arc<ManualClock>, LockManager) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let mgr = LockManager::new(clock.clone());
        (clock, mgr)
    }

    #[test]
    fn exclusive_excludes_everything() {
        let (_, mgr) = manager();
        let lock = mgr
            .acquire(&p("/a"), LockScope::Exclusive, LockDepth::Zero, None, Some(60))
            .unwrap();
        assert!(lock.token.starts_with(TOKEN_SCHEME));
        assert_eq!(lock.token.len(), TOKEN_SCHEME.len() + 36);

        let again = mgr.acquire(&p("/a"), LockScope::Exclusive, LockDepth::Zero, None, None);
        assert!(matches!(again, Err(DavError::LockConflict(root)) if root == p("/a")));
        let shared = mgr.acquire(&p("/a"), LockScope::Shared, LockDepth::Zero, None, None);
        assert!(matches!(shared, Err(DavError::LockConflict(_))));
    }

    #[test]
    fn shared_locks_stack() {
        let (_, mgr) = manager();
        let one = mgr
            .acquire(&p("/a"), LockScope::Shared, LockDepth::Infinity, None, None)
            .unwrap();
        let two = mgr
            .acquire(&p("/a/b"), LockScope::Shared, LockDepth::Zero, None, None)
            .unwrap();
        assert_ne!(one.token, two.token);
        assert_eq!(mgr.query(&p("/a/b")).len(), 2);

        let excl = mgr.acquire(&p("/a/b"), LockScope::Exclusive, LockDepth::Zero, None, None);
        assert!(matches!(excl, Err(DavError::LockConflict(_))));
    }

    #[test]
    fn depth_controls_the_scope() {
        let (_, mgr) = manager();
        mgr.acquire(&p("/a"), LockScope::Exclusive, LockDepth::Zero, None, None)
            .unwrap();
        // a depth 0 lock leaves the members free
        mgr.acquire(&p("/a/b"), LockScope::Exclusive, LockDepth::Zero, None, None)
            .unwrap();

        mgr.acquire(&p("/x"), LockScope::Exclusive, LockDepth::Infinity, None, None)
            .unwrap();
        let member = mgr.acquire(&p("/x/y/z"), LockScope::Shared, LockDepth::Zero, None, None);
        assert!(matches!(member, Err(DavError::LockConflict(root)) if root == p("/x")));
    }

    #[test]
    fn locked_member_blocks_an_infinite_lock_above() {
        let (_, mgr) = manager();
        mgr.acquire(&p("/a/b/c"), LockScope::Shared, LockDepth::Zero, None, None)
            .unwrap();

        let excl = mgr.acquire(&p("/a"), LockScope::Exclusive, LockDepth::Infinity, None, None);
        assert!(matches!(excl, Err(DavError::LockConflict(root)) if root == p("/a/b/c")));

        // shared over shared is fine, and so is a depth 0 lock
        mgr.acquire(&p("/a"), LockScope::Shared, LockDepth::Infinity, None, None)
            .unwrap();
        mgr.acquire(&p("/a/b"), LockScope::Shared, LockDepth::Zero, None, None)
            .unwrap();

        // siblings sharing a prefix are unrelated
        mgr.acquire(&p("/a/bb"), LockScope::Shared, LockDepth::Zero, None, None)
            .unwrap();
        mgr.acquire(&p("/a/b c"), LockScope::Shared, LockDepth::Infinity, None, None)
            .unwrap();
    }

    #[test]
    fn unlock_is_accepted_once() {
        let (_, mgr) = manager();
        let lock = mgr
            .acquire(&p("/doc"), LockScope::Exclusive, LockDepth::Zero, None, None)
            .unwrap();

        mgr.unlock(&p("/doc"), &lock.token).unwrap();
        assert!(matches!(
            mgr.unlock(&p("/doc"), &lock.token),
            Err(DavError::NoSuchLock)
        ));
        assert!(matches!(mgr.release(&lock.token), Err(DavError::NoSuchLock)));
        assert!(mgr.query(&p("/doc")).is_empty());
    }

    #[test]
    fn unlock_requires_the_scope_to_cover_the_target() {
        let (_, mgr) = manager();
        let shallow = mgr
            .acquire(&p("/d"), LockScope::Exclusive, LockDepth::Zero, None, None)
            .unwrap();
        let deep = mgr
            .acquire(&p("/e"), LockScope::Exclusive, LockDepth::Infinity, None, None)
            .unwrap();

        assert!(matches!(
            mgr.unlock(&p("/d/x"), &shallow.token),
            Err(DavError::NoSuchLock)
        ));
        mgr.unlock(&p("/e/x"), &deep.token).unwrap();
    }

    #[test]
    fn expired_locks_vanish() {
        let (clock, mgr) = manager();
        let lock = mgr
            .acquire(&p("/a"), LockScope::Exclusive, LockDepth::Infinity, None, Some(1))
            .unwrap();
        assert_eq!(lock.remaining_secs(clock.now_msec()), Some(1));
        assert_eq!(mgr.query(&p("/a/b")).len(), 1);

        clock.advance(1001);
        assert!(mgr.query(&p("/a")).is_empty());
        assert!(mgr.get(&lock.token).is_none());
        assert!(matches!(mgr.refresh(&lock.token, Some(10)), Err(DavError::NoSuchLock)));
        mgr.acquire(&p("/a"), LockScope::Exclusive, LockDepth::Zero, None, None)
            .unwrap();
    }

    #[test]
    fn refresh_extends_the_lifetime() {
        let (clock, mgr) = manager();
        let lock = mgr
            .acquire(&p("/a"), LockScope::Shared, LockDepth::Zero, None, Some(10))
            .unwrap();

        clock.advance(8_000);
        let refreshed = mgr.refresh(&lock.token, Some(10)).unwrap();
        assert_eq!(refreshed.token, lock.token);
        assert_eq!(refreshed.remaining_secs(clock.now_msec()), Some(10));

        clock.advance(8_000);
        assert_eq!(mgr.query(&p("/a")).len(), 1);

        let forever = mgr.refresh(&lock.token, None).unwrap();
        assert_eq!(forever.remaining_secs(clock.now_msec()), None);
        clock.advance(1_000_000_000);
        assert_eq!(mgr.query(&p("/a")).len(), 1);
    }

    #[test]
    fn confirm_wants_a_covering_token() {
        let (_, mgr) = manager();
        assert!(mgr.confirm(&p("/free"), &[]).is_ok());

        let lock = mgr
            .acquire(&p("/a"), LockScope::Exclusive, LockDepth::Infinity, None, None)
            .unwrap();
        assert!(matches!(
            mgr.confirm(&p("/a/b"), &[]),
            Err(DavError::LockConflict(root)) if root == p("/a")
        ));
        assert!(mgr
            .confirm(&p("/a/b"), &["opaquelocktoken:other".into()])
            .is_err());
        assert!(mgr.confirm(&p("/a/b"), &[lock.token.clone()]).is_ok());
    }

    #[test]
    fn forget_drops_rooted_locks() {
        let (_, mgr) = manager();
        mgr.acquire(&p("/a"), LockScope::Shared, LockDepth::Zero, None, None)
            .unwrap();
        mgr.acquire(&p("/a"), LockScope::Shared, LockDepth::Zero, None, None)
            .unwrap();
        mgr.acquire(&p("/a/b"), LockScope::Exclusive, LockDepth::Zero, None, None)
            .unwrap();
        assert_eq!(mgr.rooted_at(&p("/a")).len(), 2);

        mgr.forget(&p("/a"));
        assert!(mgr.rooted_at(&p("/a")).is_empty());
        assert_eq!(mgr.rooted_at(&p("/a/b")).len(), 1);

        // the counters below the root were kept in sync
        mgr.forget(&p("/a/b"));
        mgr.acquire(&p("/"), LockScope::Exclusive, LockDepth::Infinity, None, None)
            .unwrap();
    }

    #[test]
    fn subtree_locks() {
        let (_, mgr) = manager();
        let inner = mgr
            .acquire(&p("/a/b/c"), LockScope::Exclusive, LockDepth::Zero, None, None)
            .unwrap();
        mgr.acquire(&p("/ab"), LockScope::Exclusive, LockDepth::Zero, None, None)
            .unwrap();

        assert!(mgr.confirm(&p("/a"), &[]).is_ok());
        assert!(matches!(
            mgr.confirm_tree(&p("/a"), &[]),
            Err(DavError::LockConflict(root)) if root == p("/a/b/c")
        ));
        assert!(mgr.confirm_tree(&p("/a"), &[inner.token.clone()]).is_ok());

        mgr.forget_tree(&p("/a"));
        assert!(mgr.get(&inner.token).is_none());
        assert_eq!(mgr.rooted_at(&p("/ab")).len(), 1);
    }
}
