//! Resource keys and key-set helpers.

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

/// Identity of one exclusive resource (a motor, a sensor bus, an actuator).
///
/// Two tickets conflict when their requirement sets share a key, so equality
/// is the only thing that matters. Enums work well:
///
/// ```
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum Drive { LeftMotor, RightMotor, Lift }
///
/// fn assert_key<K: ticket_lot::core::ResourceKey>() {}
/// assert_key::<Drive>();
/// assert_key::<String>();
/// ```
pub trait ResourceKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Blanket implementation: any type meeting the requirements is a `ResourceKey`.
impl<T> ResourceKey for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// A set of resource keys.
pub type KeySet<K> = HashSet<K>;

/// True when the two sets share at least one key.
pub fn overlaps<K: ResourceKey>(a: &KeySet<K>, b: &KeySet<K>) -> bool {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small.iter().any(|key| large.contains(key))
}

/// Render the keys of `wanted` that are missing from `available`.
pub(crate) fn describe_missing<K: ResourceKey>(
    wanted: &KeySet<K>,
    available: &KeySet<K>,
) -> String {
    let missing: Vec<&K> = wanted.iter().filter(|key| !available.contains(*key)).collect();
    format!("{missing:?}")
}
