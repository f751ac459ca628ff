//! Pure compound-key construction.
//!
//! Every cache entry is addressed by a compound key built from the item name
//! and its owner. The shape is fixed (item first, then owner) and must stay
//! consistent across all operations, or callers stop seeing each other's
//! entries and locks.

/// Separator between compound-key parts.
pub const SEPARATOR: &str = "_";

/// Suffix distinguishing a lock entry from the value it guards.
pub const LOCK_SUFFIX: &str = "_lock";

/// Reserved owner name under which produce-right locks live.
pub const PRODUCE_RIGHT_OWNER: &str = "produce_right";

/// Compound key for an item.
///
/// # Example
///
/// ```
/// assert_eq!(alder_cache::keys::compound("daily", "quote"), "quote_daily");
/// ```
#[inline]
pub fn compound(owner: &str, item: &str) -> String {
    format!("{item}{SEPARATOR}{owner}")
}

/// Lock key guarding an item.
///
/// # Example
///
/// ```
/// assert_eq!(alder_cache::keys::lock("daily", "quote"), "quote_daily_lock");
/// ```
#[inline]
pub fn lock(owner: &str, item: &str) -> String {
    format!("{}{LOCK_SUFFIX}", compound(owner, item))
}

/// Lock key guarding the right to produce an item.
///
/// The produce-right lock is a regular lock taken under the reserved
/// [`PRODUCE_RIGHT_OWNER`] namespace, applied to the item's own compound key
/// so distinct (owner, item) pairs never contend.
#[inline]
pub fn produce_lock(owner: &str, item: &str) -> String {
    lock(PRODUCE_RIGHT_OWNER, &compound(owner, item))
}
