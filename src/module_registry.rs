//! Loaded plugins, grouped by lifecycle boundary.

use std::sync::Arc ;
use std::time::Duration ;
use parking_lot::RwLock ;
use serde::Serialize ;

use crate::{ PluginInstance, PluginVersion };



/// Name of the group that is never fully unloaded.
pub const CORE_GROUP: &str = "core" ;
/// Name of the group holding every other plugin.
pub const SCRIPTS_GROUP: &str = "scripts" ;

/// An ordered collection of plugins sharing a lifecycle boundary.
#[derive( Debug )]
pub struct ModuleGroup {
	name: &'static str,
	is_core: bool,
	plugins: Vec<Arc<PluginInstance>>,
}

impl ModuleGroup {
	#[inline] pub fn name( &self ) -> &str { self.name }
	#[inline] pub fn is_core( &self ) -> bool { self.is_core }
	#[inline] pub fn plugins( &self ) -> &[Arc<PluginInstance>] { &self.plugins }
}

/// Serialisable view of one plugin.
#[derive( Clone, Debug, PartialEq, Eq, Serialize )]
pub struct PluginSummary {
	pub name: String,
	pub unit: String,
	pub author: String,
	pub version: PluginVersion,
	pub description: Option<String>,
	pub enabled: bool,
	pub hooks: Vec<String>,
	pub requires: Vec<String>,
	pub compile_time: Duration,
	pub hook_time: Duration,
}

impl PluginSummary {
	fn of( plugin: &PluginInstance ) -> Self {
		Self {
			name: plugin.name().to_string(),
			unit: plugin.unit().to_string(),
			author: plugin.info().author().to_string(),
			version: plugin.info().version(),
			description: plugin.info().description().map( str::to_string ),
			enabled: plugin.is_enabled(),
			hooks: plugin.metadata().handlers().map(|( hook, _ )| hook.to_string() ).collect(),
			requires: plugin.requires().to_vec(),
			compile_time: plugin.compile_time(),
			hook_time: plugin.total_hook_time(),
		}
	}
}

/// Serialisable view of one group.
#[derive( Clone, Debug, PartialEq, Eq, Serialize )]
pub struct GroupSummary {
	pub name: String,
	pub is_core: bool,
	pub plugins: Vec<PluginSummary>,
}

/// Every loaded plugin instance. Only plugins that reached
/// [`Phase::Ready`]( crate::Phase::Ready ) are ever registered.
#[derive( Debug )]
pub struct ModuleRegistry {
	groups: RwLock<[ModuleGroup; 2]>,
}

impl Default for ModuleRegistry {
	fn default() -> Self { Self::new() }
}

impl ModuleRegistry {

	pub fn new() -> Self {
		Self { groups: RwLock::new([
			ModuleGroup { name: CORE_GROUP, is_core: true, plugins: Vec::new() },
			ModuleGroup { name: SCRIPTS_GROUP, is_core: false, plugins: Vec::new() },
		])}
	}

	/// The plugin named `name`.
	pub fn find( &self, name: &str ) -> Option<Arc<PluginInstance>> {
		self.groups.read().iter()
			.flat_map(| group | &group.plugins )
			.find(| plugin | plugin.name() == name )
			.cloned()
	}

	pub fn contains( &self, name: &str ) -> bool { self.find( name ).is_some() }

	/// Every plugin, core group first, in load order.
	pub fn plugins( &self ) -> Vec<Arc<PluginInstance>> {
		self.groups.read().iter().flat_map(| group | group.plugins.iter().cloned() ).collect()
	}

	/// Plugins instantiated from the unit named `unit`.
	pub fn plugins_of_unit( &self, unit: &str ) -> Vec<Arc<PluginInstance>> {
		self.matching(| plugin | plugin.unit() == unit )
	}

	/// Plugins outside the core group.
	pub fn non_core_plugins( &self ) -> Vec<Arc<PluginInstance>> {
		self.matching(| plugin | !plugin.is_core() )
	}

	pub fn len( &self ) -> usize { self.groups.read().iter().map(| group | group.plugins.len() ).sum() }

	pub fn is_empty( &self ) -> bool { self.len() == 0 }

	fn matching( &self, predicate: impl Fn( &PluginInstance ) -> bool ) -> Vec<Arc<PluginInstance>> {
		self.groups.read().iter()
			.flat_map(| group | &group.plugins )
			.filter(| plugin | predicate( plugin ))
			.cloned()
			.collect()
	}

	/// Removes exactly `plugin`, not merely a plugin of the same name.
	pub(crate) fn remove( &self, plugin: &Arc<PluginInstance> ) -> bool {
		let mut groups = self.groups.write();
		groups.iter_mut().any(| group | {
			let before = group.plugins.len();
			group.plugins.retain(| existing | !Arc::ptr_eq( existing, plugin ));
			group.plugins.len() != before
		})
	}

	/// Removes `stale` and adds `fresh` under one lock, so no lookup sees both.
	pub(crate) fn swap( &self, stale: &[Arc<PluginInstance>], fresh: &[Arc<PluginInstance>] ) {
		let mut groups = self.groups.write();
		for group in groups.iter_mut() {
			group.plugins.retain(| existing | !stale.iter().any(| plugin | Arc::ptr_eq( existing, plugin )));
		}
		for plugin in fresh {
			groups[usize::from( !plugin.is_core() )].plugins.push( Arc::clone( plugin ));
		}
	}

	/// Serialisable view of every group.
	pub fn summaries( &self ) -> Vec<GroupSummary> {
		self.groups.read().iter().map(| group | GroupSummary {
			name: group.name.to_string(),
			is_core: group.is_core,
			plugins: group.plugins.iter().map(| plugin | PluginSummary::of( plugin )).collect(),
		}).collect()
	}

	/// Runs `f` with read access to every group.
	pub fn with_groups<R>( &self, f: impl FnOnce( &[ModuleGroup] ) -> R ) -> R { f( &*self.groups.read() )}

}
