use std::collections::{BTreeMap, BTreeSet};

use crate::descriptor::Location;
use crate::registry::AddOutcome;

/// Locations submitted to the registry during one run, with what each add did.
///
/// Scoped to a single run and never shared between runs.
#[derive(Debug, Clone, Default)]
pub struct TouchedSet {
	entries: BTreeMap<Location, AddOutcome>,
}

impl TouchedSet {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record(&mut self, location: Location, outcome: AddOutcome) {
		self.entries.insert(location, outcome);
	}

	pub fn contains(&self, location: &Location) -> bool {
		self.entries.contains_key(location)
	}

	pub fn outcome(&self, location: &Location) -> Option<AddOutcome> {
		self.entries.get(location).copied()
	}

	/// Every submitted location, whether or not the add wrote anything
	pub fn submitted(&self) -> BTreeSet<Location> {
		self.entries.keys().cloned().collect()
	}

	/// Submitted locations whose stored content changed
	pub fn changed(&self) -> BTreeSet<Location> {
		self.entries
			.iter()
			.filter(|(_, outcome)| outcome.changed())
			.map(|(location, _)| location.clone())
			.collect()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_changed_excludes_unchanged() {
		let mut touched = TouchedSet::new();
		let a = Location::new("m", "T", "a");
		let b = Location::new("m", "T", "b");
		let c = Location::new("m", "T", "c");
		touched.record(a.clone(), AddOutcome::Unchanged);
		touched.record(b.clone(), AddOutcome::Replaced);
		touched.record(c.clone(), AddOutcome::Inserted);

		assert_eq!(touched.submitted(), BTreeSet::from([a.clone(), b.clone(), c.clone()]));
		assert_eq!(touched.changed(), BTreeSet::from([b, c]));
		assert_eq!(touched.outcome(&a), Some(AddOutcome::Unchanged));
	}
}
