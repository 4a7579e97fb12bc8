// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Capability grants and how they satisfy checks.
//!
//! A grant names a capability (`request.view`), the broadest scope it applies
//! at, and for unit grants optionally the unit it is bound to. Names match
//! exactly, through a resource wildcard (`request.*`), or through the reserved
//! [`WILDCARD_CAPABILITY`] which means every capability at every scope.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ActorId, ScopeType, UnitId};

/// Reserved capability granting everything. Super-admin escape hatch.
pub const WILDCARD_CAPABILITY: &str = "*.*";

/// A capability granted to an actor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilityGrant {
	pub capability: String,
	pub scope: ScopeType,
	/// For unit grants: the unit the grant is bound to. `None` means the
	/// actor's own unit.
	#[serde(default)]
	pub unit_id: Option<UnitId>,
}

impl CapabilityGrant {
	pub fn new(capability: impl Into<String>, scope: ScopeType) -> Self {
		Self {
			capability: capability.into(),
			scope,
			unit_id: None,
		}
	}

	pub fn global(capability: impl Into<String>) -> Self {
		Self::new(capability, ScopeType::Global)
	}

	pub fn wildcard() -> Self {
		Self::global(WILDCARD_CAPABILITY)
	}

	/// Builder: bind a unit grant to a specific unit.
	pub fn for_unit(mut self, unit_id: UnitId) -> Self {
		self.unit_id = Some(unit_id);
		self
	}

	pub fn is_wildcard(&self) -> bool {
		self.capability == WILDCARD_CAPABILITY
	}

	/// Returns true if this grant's name covers `capability`.
	pub fn matches_name(&self, capability: &str) -> bool {
		if self.is_wildcard() || self.capability == capability {
			return true;
		}
		match self.capability.strip_suffix(".*") {
			Some(resource) => capability
				.strip_prefix(resource)
				.is_some_and(|rest| rest.starts_with('.')),
			None => false,
		}
	}

	/// Returns true if this grant satisfies `check`.
	pub fn satisfies(&self, check: &CapabilityCheck) -> bool {
		if self.is_wildcard() {
			return true;
		}
		if !self.matches_name(&check.capability) || !self.scope.covers(check.scope) {
			return false;
		}
		if check.scope != ScopeType::Unit || self.scope == ScopeType::Global {
			return true;
		}
		match (self.unit_id, check.scope_id) {
			(Some(granted), Some(target)) => granted == target,
			(Some(_), None) => false,
			(None, _) => !check.explicit_unit_required,
		}
	}
}

/// A single capability question asked of a grant set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityCheck {
	pub capability: String,
	pub scope: ScopeType,
	pub scope_id: Option<UnitId>,
	/// Set when the unit id came from the request rather than the actor: only
	/// grants naming that unit (or global grants) may satisfy the check.
	pub explicit_unit_required: bool,
}

impl CapabilityCheck {
	pub fn new(capability: impl Into<String>, scope: ScopeType) -> Self {
		Self {
			capability: capability.into(),
			scope,
			scope_id: None,
			explicit_unit_required: false,
		}
	}

	pub fn wildcard() -> Self {
		Self::new(WILDCARD_CAPABILITY, ScopeType::Global)
	}

	pub fn in_unit(mut self, unit_id: UnitId) -> Self {
		self.scope_id = Some(unit_id);
		self
	}

	pub fn requiring_explicit_unit(mut self) -> Self {
		self.explicit_unit_required = true;
		self
	}
}

/// Returns true if any grant satisfies `check`.
///
/// A wildcard check is only satisfied by a wildcard grant.
pub fn grants_satisfy(grants: &[CapabilityGrant], check: &CapabilityCheck) -> bool {
	if check.capability == WILDCARD_CAPABILITY {
		return grants.iter().any(CapabilityGrant::is_wildcard);
	}
	grants.iter().any(|grant| grant.satisfies(check))
}

/// Answers capability checks for actors whose grants are not pre-resolved.
#[async_trait]
pub trait CapabilityLookup: Send + Sync {
	async fn has_capability(&self, actor_id: ActorId, check: &CapabilityCheck) -> Result<bool>;
}

/// Source of an actor's grants.
#[async_trait]
pub trait GrantStore: Send + Sync {
	async fn grants_for(&self, actor_id: ActorId) -> Result<Vec<CapabilityGrant>>;
}

/// Grant store holding a fixed map, for composition roots and tests.
#[derive(Debug, Default)]
pub struct StaticGrantStore {
	grants: RwLock<HashMap<ActorId, Vec<CapabilityGrant>>>,
}

impl StaticGrantStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn grant(&self, actor_id: ActorId, grant: CapabilityGrant) {
		self.grants.write().entry(actor_id).or_default().push(grant);
	}
}

#[async_trait]
impl GrantStore for StaticGrantStore {
	async fn grants_for(&self, actor_id: ActorId) -> Result<Vec<CapabilityGrant>> {
		Ok(self.grants.read().get(&actor_id).cloned().unwrap_or_default())
	}
}

struct CachedGrants {
	loaded_at: Instant,
	grants: Arc<Vec<CapabilityGrant>>,
}

/// Process-wide grant cache in front of a [`GrantStore`].
///
/// Entries live for `ttl`. Concurrent misses for the same actor may both load
/// from the store; the last write wins, which is fine because grants for an
/// actor are re-derivable.
pub struct CachedGrantLookup<S> {
	store: S,
	ttl: Duration,
	entries: RwLock<HashMap<ActorId, CachedGrants>>,
}

impl<S: GrantStore> CachedGrantLookup<S> {
	pub fn new(store: S, ttl: Duration) -> Self {
		Self {
			store,
			ttl,
			entries: RwLock::new(HashMap::new()),
		}
	}

	/// Returns the actor's grants, loading them when missing or expired.
	pub async fn grants(&self, actor_id: ActorId) -> Result<Arc<Vec<CapabilityGrant>>> {
		let fresh = {
			let entries = self.entries.read();
			entries
				.get(&actor_id)
				.filter(|cached| cached.loaded_at.elapsed() < self.ttl)
				.map(|cached| Arc::clone(&cached.grants))
		};
		if let Some(grants) = fresh {
			return Ok(grants);
		}

		let grants = Arc::new(self.store.grants_for(actor_id).await?);
		tracing::trace!(actor_id = %actor_id, count = grants.len(), "loaded capability grants");
		self.entries.write().insert(
			actor_id,
			CachedGrants {
				loaded_at: Instant::now(),
				grants: Arc::clone(&grants),
			},
		);
		Ok(grants)
	}

	pub fn invalidate(&self, actor_id: ActorId) {
		self.entries.write().remove(&actor_id);
	}

	pub fn invalidate_all(&self) {
		self.entries.write().clear();
	}

	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}
}

#[async_trait]
impl<S: GrantStore> CapabilityLookup for CachedGrantLookup<S> {
	async fn has_capability(&self, actor_id: ActorId, check: &CapabilityCheck) -> Result<bool> {
		let grants = self.grants(actor_id).await?;
		Ok(grants_satisfy(&grants, check))
	}
}

/// Lookup that denies everything. Used when every actor carries
/// pre-resolved grants.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAllLookup;

#[async_trait]
impl CapabilityLookup for DenyAllLookup {
	async fn has_capability(&self, _actor_id: ActorId, _check: &CapabilityCheck) -> Result<bool> {
		Ok(false)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[test]
	fn names_match_exactly_or_by_resource_wildcard() {
		let exact = CapabilityGrant::global("request.view");
		assert!(exact.matches_name("request.view"));
		assert!(!exact.matches_name("request.approve"));

		let resource = CapabilityGrant::global("request.*");
		assert!(resource.matches_name("request.view"));
		assert!(resource.matches_name("request.approve"));
		assert!(!resource.matches_name("requests.view"));
		assert!(!resource.matches_name("payment.view"));

		assert!(CapabilityGrant::wildcard().matches_name("anything.at_all"));
	}

	#[test]
	fn broader_grant_satisfies_narrower_check() {
		let grant = CapabilityGrant::global("request.view");
		let unit = UnitId::generate();
		assert!(grant.satisfies(&CapabilityCheck::new("request.view", ScopeType::Own)));
		assert!(grant.satisfies(&CapabilityCheck::new("request.view", ScopeType::Unit).in_unit(unit)));

		let own = CapabilityGrant::new("request.view", ScopeType::Own);
		assert!(!own.satisfies(&CapabilityCheck::new("request.view", ScopeType::Unit).in_unit(unit)));
	}

	#[test]
	fn unit_bound_grant_only_covers_its_unit() {
		let u1 = UnitId::generate();
		let u2 = UnitId::generate();
		let grant = CapabilityGrant::new("request.view", ScopeType::Unit).for_unit(u1);

		assert!(grant.satisfies(&CapabilityCheck::new("request.view", ScopeType::Unit).in_unit(u1)));
		assert!(!grant.satisfies(&CapabilityCheck::new("request.view", ScopeType::Unit).in_unit(u2)));
	}

	#[test]
	fn own_unit_grant_does_not_cover_request_supplied_unit() {
		let unit = UnitId::generate();
		let grant = CapabilityGrant::new("request.view", ScopeType::Unit);
		let check = CapabilityCheck::new("request.view", ScopeType::Unit).in_unit(unit);

		assert!(grant.satisfies(&check));
		assert!(!grant.satisfies(&check.clone().requiring_explicit_unit()));
		assert!(grant
			.clone()
			.for_unit(unit)
			.satisfies(&check.requiring_explicit_unit()));
	}

	#[test]
	fn wildcard_check_needs_wildcard_grant() {
		let grants = vec![CapabilityGrant::global("request.*")];
		assert!(!grants_satisfy(&grants, &CapabilityCheck::wildcard()));
		assert!(grants_satisfy(
			&[CapabilityGrant::wildcard()],
			&CapabilityCheck::wildcard()
		));
	}

	struct CountingStore {
		calls: AtomicUsize,
		inner: StaticGrantStore,
	}

	#[async_trait]
	impl GrantStore for CountingStore {
		async fn grants_for(&self, actor_id: ActorId) -> Result<Vec<CapabilityGrant>> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.inner.grants_for(actor_id).await
		}
	}

	#[tokio::test]
	async fn cached_lookup_loads_once_within_ttl() {
		let actor = ActorId::generate();
		let inner = StaticGrantStore::new();
		inner.grant(actor, CapabilityGrant::global("request.view"));
		let lookup = CachedGrantLookup::new(
			CountingStore {
				calls: AtomicUsize::new(0),
				inner,
			},
			Duration::from_secs(60),
		);

		let check = CapabilityCheck::new("request.view", ScopeType::Global);
		assert!(lookup.has_capability(actor, &check).await.unwrap());
		assert!(lookup.has_capability(actor, &check).await.unwrap());
		assert_eq!(lookup.store.calls.load(Ordering::SeqCst), 1);

		lookup.invalidate(actor);
		assert!(lookup.has_capability(actor, &check).await.unwrap());
		assert_eq!(lookup.store.calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn cached_lookup_reloads_after_ttl() {
		let actor = ActorId::generate();
		let lookup = CachedGrantLookup::new(
			CountingStore {
				calls: AtomicUsize::new(0),
				inner: StaticGrantStore::new(),
			},
			Duration::ZERO,
		);
		let check = CapabilityCheck::new("request.view", ScopeType::Global);
		assert!(!lookup.has_capability(actor, &check).await.unwrap());
		assert!(!lookup.has_capability(actor, &check).await.unwrap());
		assert_eq!(lookup.store.calls.load(Ordering::SeqCst), 2);
	}

	fn arb_scope() -> impl Strategy<Value = ScopeType> {
		prop_oneof![
			Just(ScopeType::Own),
			Just(ScopeType::Unit),
			Just(ScopeType::Global),
		]
	}

	proptest! {
		#[test]
		fn wildcard_grant_satisfies_every_check(
			name in "[a-z]{1,10}\\.[a-z]{1,10}",
			scope in arb_scope(),
			explicit in any::<bool>(),
		) {
			let mut check = CapabilityCheck::new(name, scope).in_unit(UnitId::generate());
			check.explicit_unit_required = explicit;
			prop_assert!(CapabilityGrant::wildcard().satisfies(&check));
		}

		#[test]
		fn narrower_grant_never_satisfies_broader_check(
			grant_scope in arb_scope(),
			check_scope in arb_scope(),
		) {
			prop_assume!(grant_scope < check_scope);
			let grant = CapabilityGrant::new("request.view", grant_scope);
			let check = CapabilityCheck::new("request.view", check_scope).in_unit(UnitId::generate());
			prop_assert!(!grant.satisfies(&check));
		}
	}
}
