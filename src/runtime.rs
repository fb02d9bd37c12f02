use std::collections::{ HashMap, HashSet };
use std::path::Path ;
use std::sync::Arc ;
use std::time::{ Duration, Instant };
use crossbeam_channel::Receiver ;
use parking_lot::Mutex ;
use wasmtime::{ Engine, Linker, Val };

use crate::{
	ArtifactCache, BatchReport, DispatchError, GroupSummary, HookDescriptor, HookError,
	HookRegistry, HookSummary, Interceptor, LoadError, LoadOrchestrator, ModuleRegistry,
	NoopInterceptor, PluginState, ReferenceSet, RuntimeConfig, SourceUnit, UnitReport,
};
use crate::orchestrator::OrchestratorSettings ;



/// How long [`Runtime::run_until_idle`] sleeps between ticks.
const IDLE_TICK: Duration = Duration::from_millis( 2 );

/// The plugin runtime: registries, the load orchestrator and the
/// operations a host drives them with.
///
/// The host calls [`Runtime::tick`] from its own loop; nothing else blocks.
///
/// ```
/// use std::time::Duration ;
/// use wasm_hotload::{ Engine, Runtime, RuntimeConfig, SourceUnit, HookDescriptor, HookCategory, InterceptionTarget, Val };
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let runtime = Runtime::new( Engine::default(), RuntimeConfig::default() )?;
/// runtime.register_hook( HookDescriptor::new( "OnTick", HookCategory::Server, InterceptionTarget::new( "Server", "Tick" )))?;
///
/// runtime.load( SourceUnit::from_source( "Clock", r#"
/// ;; Info: Clock, Jane Doe, 1.0.0
/// (module
/// 	(global $ticks (mut i32) (i32.const 0))
/// 	(func (export "Clock.OnTick") (global.set $ticks (i32.add (global.get $ticks) (i32.const 1))))
/// 	(func (export "Clock.ticks") (result i32) (global.get $ticks)))
/// "# ));
/// assert!( runtime.run_until_idle( Duration::from_secs( 10 )));
///
/// runtime.dispatch( "OnTick", &[] );
/// let ticks = runtime.call( "Clock", "ticks", &[] )?;
/// assert!( matches!( ticks, Some( Val::I32( 1 ))));
/// # Ok(())
/// # }
/// ```
pub struct Runtime {
	engine: Engine,
	config: RuntimeConfig,
	cache: Arc<ArtifactCache>,
	references: Arc<ReferenceSet>,
	hooks: Arc<HookRegistry>,
	modules: Arc<ModuleRegistry>,
	orchestrator: Mutex<LoadOrchestrator>,
	units: Mutex<HashMap<String, SourceUnit>>,
	ignored: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for Runtime {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::result::Result<(), std::fmt::Error> {
		f.debug_struct( "Runtime" )
			.field( "config", &self.config )
			.field( "hooks", &self.hooks )
			.field( "modules", &self.modules )
			.finish_non_exhaustive()
	}
}

impl Runtime {

	/// Creates a runtime whose hooks need no host-side patching.
	///
	/// # Errors
	/// Fails if the default host functions can't be defined.
	pub fn new( engine: Engine, config: RuntimeConfig ) -> Result<Self, wasmtime::Error> {
		Self::with_interceptor( engine, config, NoopInterceptor )
	}

	/// Creates a runtime attaching hooks through `interceptor`.
	///
	/// # Errors
	/// Fails if the default host functions can't be defined.
	pub fn with_interceptor( engine: Engine, config: RuntimeConfig, interceptor: impl Interceptor + 'static ) -> Result<Self, wasmtime::Error> {
		let cache = Arc::new( ArtifactCache::new() );
		let references = Arc::new( ReferenceSet::new( config.references_directory.clone() ));
		let hooks = Arc::new( HookRegistry::new( interceptor ));
		hooks.set_time_tracking( config.hook_time_tracker );
		let modules = Arc::new( ModuleRegistry::new() );
		let host = crate::linker::host_linker( &engine )?;

		let orchestrator = LoadOrchestrator::new(
			engine.clone(),
			Arc::clone( &cache ),
			Arc::clone( &references ),
			Arc::clone( &hooks ),
			Arc::clone( &modules ),
			host,
			OrchestratorSettings {
				gate_poll_interval: config.gate_poll_interval(),
				hook_validation: config.hook_validation,
				strict_hook_validation: config.strict_hook_validation,
			},
		);

		Ok( Self {
			ignored: Mutex::new( config.ignored.clone() ),
			engine,
			config,
			cache,
			references,
			hooks,
			modules,
			orchestrator: Mutex::new( orchestrator ),
			units: Mutex::new( HashMap::new() ),
		})
	}

	#[inline] pub fn engine( &self ) -> &Engine { &self.engine }
	#[inline] pub fn config( &self ) -> &RuntimeConfig { &self.config }
	#[inline] pub fn cache( &self ) -> &ArtifactCache { &self.cache }
	#[inline] pub fn references( &self ) -> &ReferenceSet { &self.references }
	#[inline] pub fn hooks( &self ) -> &HookRegistry { &self.hooks }
	#[inline] pub fn modules( &self ) -> &ModuleRegistry { &self.modules }

	/// The linker every plugin is instantiated with. Functions added here
	/// are visible to plugins loaded afterwards.
	pub fn host_linker_mut( &mut self ) -> &mut Linker<PluginState> {
		self.orchestrator.get_mut().host_linker_mut()
	}

	/// Registers a hook descriptor.
	///
	/// # Errors
	/// [`HookError::DuplicateDescriptor`] if the name is taken.
	pub fn register_hook( &self, descriptor: HookDescriptor ) -> Result<(), HookError> {
		self.hooks.register( descriptor )
	}

	/// Attaches always-installed hooks that are detached, those whose attach
	/// failed on registration or that a shutdown removed.
	pub fn initialize( &self ) {
		self.hooks.install_always_installed();
		tracing::info!( hooks = self.hooks.summaries().len(), "Runtime initialised" );
	}

	/// Loads a single unit as its own batch.
	pub fn load( &self, unit: SourceUnit ) -> u64 { self.load_batch( vec![ unit ]) }

	/// Loads `units` as one batch and returns the batch id.
	pub fn load_batch( &self, units: Vec<SourceUnit> ) -> u64 {
		{
			let mut known = self.units.lock();
			let mut ignored = self.ignored.lock();
			for unit in &units {
				ignored.remove( unit.name() );
				known.insert( unit.name().to_string(), unit.clone() );
			}
		}
		self.orchestrator.lock().submit( units )
	}

	/// Loads every unit file of `directory` as one batch, skipping `ignored`
	/// names as well as names ignored by configuration or [`Self::unload`].
	///
	/// # Errors
	/// [`LoadError::Io`] if the directory can't be listed.
	pub fn load_directory( &self, directory: impl AsRef<Path>, ignored: &HashSet<String> ) -> Result<u64, LoadError> {
		let directory = directory.as_ref();
		let io_error = | source | LoadError::Io { path: directory.display().to_string(), source };
		let skipped = self.ignored.lock().clone();

		let mut units = std::fs::read_dir( directory ).map_err( io_error )?
			.map(| entry | entry.map(| entry | entry.path() ))
			.collect::<Result<Vec<_>, _>>().map_err( io_error )?
			.into_iter()
			.filter(| path | path.is_file() && path.extension().is_some_and(| extension | extension == self.config.source_extension.as_str() ))
			.map( SourceUnit::from_file )
			.filter(| unit | !ignored.contains( unit.name() ) && !skipped.contains( unit.name() ))
			.collect::<Vec<_>>();
		units.sort_by(| a, b | a.name().cmp( b.name() ));

		tracing::info!( directory = %directory.display(), units = units.len(), "Loading directory" );
		Ok( self.load_batch( units ))
	}

	/// Loads the configured plugin directory.
	///
	/// # Errors
	/// [`LoadError::Io`] if no directory is configured or it can't be listed.
	pub fn load_plugin_directory( &self ) -> Result<u64, LoadError> {
		let Some( directory ) = self.config.plugin_directory.clone() else {
			return Err( LoadError::Io {
				path: String::new(),
				source: std::io::Error::new( std::io::ErrorKind::NotFound, "no plugin directory configured" ),
			});
		};
		self.load_directory( directory, &HashSet::new() )
	}

	/// Loads the unit named `name` again, re-reading its file.
	///
	/// Returns `None` if the unit was never loaded.
	pub fn reload( &self, name: &str ) -> Option<u64> {
		let mut unit = self.units.lock().get( name ).cloned()?;
		unit.forget_source();
		Some( self.load( unit ))
	}

	/// Unloads every non-core plugin, then loads every known non-core unit
	/// that isn't ignored as one batch.
	pub fn reload_all( &self ) -> u64 {
		self.unload_all();
		let ignored = self.ignored.lock().clone();
		let mut units = self.units.lock().values()
			.filter(| unit | !unit.is_core() && !ignored.contains( unit.name() ))
			.cloned()
			.collect::<Vec<_>>();
		units.sort_by(| a, b | a.name().cmp( b.name() ));
		units.iter_mut().for_each( SourceUnit::forget_source );
		self.load_batch( units )
	}

	/// Unloads the unit named `name`: aborts its loads, tears its plugins
	/// down, drops its artifact and status and keeps it out of bulk loads
	/// until it is loaded explicitly again. Returns whether anything was unloaded.
	pub fn unload( &self, name: &str ) -> bool {
		let removed = {
			let mut orchestrator = self.orchestrator.lock();
			orchestrator.abort_unit( name );
			orchestrator.forget_where(| unit | unit == name );
			orchestrator.teardown_unit( name )
		};
		let artifact = self.cache.remove( name );
		self.ignored.lock().insert( name.to_string() );
		removed > 0 || artifact.is_some()
	}

	/// Unloads every plugin outside the core group.
	pub fn unload_all( &self ) {
		let units = {
			let mut orchestrator = self.orchestrator.lock();
			orchestrator.abort_where(| unit | !unit.is_core() );
			let units = orchestrator.teardown_where(| plugin | !plugin.is_core() );
			orchestrator.forget_where(| unit | units.iter().any(| torn | torn == unit ));
			units
		};
		units.iter().for_each(| unit | { self.cache.remove( unit ); });
		tracing::info!( units = units.len(), "Unloaded all plugins" );
	}

	/// Loads every ignored unit that is known, as one batch.
	pub fn load_ignored( &self ) -> Option<u64> {
		let mut units = {
			let known = self.units.lock();
			let mut ignored = self.ignored.lock();
			let units = ignored.iter().filter_map(| name | known.get( name ).cloned() ).collect::<Vec<_>>();
			ignored.retain(| name | !known.contains_key( name ));
			units
		};
		if units.is_empty() { return None }
		units.sort_by(| a, b | a.name().cmp( b.name() ));
		Some( self.load_batch( units ))
	}

	/// Tears everything down, core plugins included: every hook is
	/// uninstalled and the artifact cache emptied.
	pub fn shutdown( &self ) {
		{
			let mut orchestrator = self.orchestrator.lock();
			orchestrator.abort_where(| _ | true );
			orchestrator.teardown_where(| _ | true );
			orchestrator.forget_where(| _ | true );
		}
		self.hooks.teardown();
		self.cache.clear();
		tracing::info!( "Runtime shut down" );
	}

	/// Enables or disables dispatch to the plugin named `name`.
	/// Returns `false` if no such plugin is loaded.
	pub fn set_plugin_enabled( &self, name: &str, enabled: bool ) -> bool {
		let Some( plugin ) = self.modules.find( name ) else { return false };
		plugin.set_enabled( enabled );
		tracing::info!( plugin = name, enabled, "Plugin toggled" );
		true
	}

	/// Calls `member` on the plugin named `plugin`.
	///
	/// # Errors
	/// [`DispatchError::InvalidFunction`] if the plugin isn't loaded,
	/// otherwise see [`PluginInstance::call`]( crate::PluginInstance::call ).
	pub fn call( &self, plugin: &str, member: &str, args: &[Val] ) -> Result<Option<Val>, DispatchError> {
		self.modules.find( plugin )
			.ok_or_else(|| DispatchError::InvalidFunction( format!( "{plugin}.{member}" )))?
			.call( member, args )
	}

	/// Dispatches the hook `name`. See [`HookRegistry::dispatch`].
	pub fn dispatch( &self, name: &str, args: &[Val] ) -> Option<Val> { self.hooks.dispatch( name, args ) }

	/// Advances pending loads. Returns whether loads remain.
	pub fn tick( &self ) -> bool { self.orchestrator.lock().tick() }

	/// Ticks until no load remains or `timeout` elapses. Returns whether
	/// the runtime became idle.
	pub fn run_until_idle( &self, timeout: Duration ) -> bool {
		let deadline = Instant::now() + timeout ;
		loop {
			if !self.tick() { return true }
			if Instant::now() >= deadline { return false }
			std::thread::sleep( IDLE_TICK );
		}
	}

	/// Last terminal report of the unit named `name`.
	pub fn status( &self, name: &str ) -> Option<UnitReport> { self.orchestrator.lock().status( name ).cloned() }

	/// A channel receiving a [`BatchReport`] for every batch finishing from now on.
	pub fn subscribe_batches( &self ) -> Receiver<BatchReport> { self.orchestrator.lock().subscribe() }

	/// Unit names currently ignored by bulk loads.
	pub fn ignored( &self ) -> HashSet<String> { self.ignored.lock().clone() }

	/// Introspection snapshot of every hook.
	pub fn hook_summaries( &self ) -> Vec<HookSummary> { self.hooks.summaries() }

	/// Serialisable view of every loaded plugin, by group.
	pub fn module_summaries( &self ) -> Vec<GroupSummary> { self.modules.summaries() }

}
