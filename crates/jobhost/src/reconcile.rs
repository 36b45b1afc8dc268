//! Change-set reconciliation between two registry snapshots.
//!
//! Pure set arithmetic over [`Location`] values:
//!
//! ```text
//! Removed = Before - After
//! Added   = After - Before
//! Updated = Touched - Added
//! ```

use std::collections::BTreeSet;
use std::collections::btree_set;

use crate::descriptor::Location;

/// Immutable point-in-time set of registered locations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot(BTreeSet<Location>);

impl RegistrySnapshot {
	pub fn contains(&self, location: &Location) -> bool {
		self.0.contains(location)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> btree_set::Iter<'_, Location> {
		self.0.iter()
	}
}

impl FromIterator<Location> for RegistrySnapshot {
	fn from_iter<I: IntoIterator<Item = Location>>(iter: I) -> Self {
		Self(iter.into_iter().collect())
	}
}

impl<'a> IntoIterator for &'a RegistrySnapshot {
	type Item = &'a Location;
	type IntoIter = btree_set::Iter<'a, Location>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}

/// Added / removed / updated classification of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
	pub added: BTreeSet<Location>,
	pub removed: BTreeSet<Location>,
	pub updated: BTreeSet<Location>,
}

impl ChangeSet {
	pub fn compute(before: &RegistrySnapshot, after: &RegistrySnapshot, touched: &BTreeSet<Location>) -> Self {
		let removed: BTreeSet<Location> = before.0.difference(&after.0).cloned().collect();
		let added: BTreeSet<Location> = after.0.difference(&before.0).cloned().collect();
		let updated = touched.difference(&added).cloned().collect();
		Self { added, removed, updated }
	}

	pub fn is_empty(&self) -> bool {
		self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
	}
}
