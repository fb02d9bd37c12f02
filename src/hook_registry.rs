//! The hook dispatch table.
//!
//! Each registered [`HookDescriptor`] gets one installation record holding its
//! install state, subscriber count, handler list and timings. Mutations of the
//! install state are serialised per hook by a mutex. The handler list is an
//! immutable `Arc<[Handler]>` swapped under a write lock, so [`HookRegistry::dispatch`]
//! only holds a read lock long enough to clone the `Arc` and then runs every
//! handler against that snapshot, lock free.

use std::collections::{ HashMap, HashSet };
use std::sync::Arc ;
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::time::{ Duration, Instant };
use itertools::Itertools ;
use parking_lot::{ Mutex, RwLock };
use serde::Serialize ;
use wasmtime::Val ;

use crate::{ HookCategory, HookDescriptor, HookError, PluginInstance };



/// Installs and removes interception points in the host.
///
/// The registry calls [`Interceptor::attach`] when a hook gains its first
/// subscriber (or on registration for always-installed hooks) and
/// [`Interceptor::detach`] when it loses the last one.
pub trait Interceptor: Send + Sync {
	/// Patches the host location described by `descriptor`.
	///
	/// # Errors
	/// A description of why the location can't be patched. The subscriber
	/// count of the hook is rolled back.
	fn attach( &self, descriptor: &HookDescriptor ) -> Result<(), String>;
	/// Removes a patch previously applied by [`Self::attach`].
	fn detach( &self, descriptor: &HookDescriptor );
}

/// An [`Interceptor`] for hosts that route every hook through
/// [`HookRegistry::dispatch`] unconditionally.
#[derive( Debug, Default, Clone, Copy )]
pub struct NoopInterceptor ;

impl Interceptor for NoopInterceptor {
	fn attach( &self, _: &HookDescriptor ) -> Result<(), String> { Ok(()) }
	fn detach( &self, _: &HookDescriptor ) {}
}

#[derive( Clone )]
struct Handler {
	plugin: Arc<PluginInstance>,
	export: String,
}

#[derive( Debug, Default )]
struct InstallState {
	installed: bool,
	subscribers: usize,
}

struct HookInstallation {
	descriptor: HookDescriptor,
	state: Mutex<InstallState>,
	handlers: RwLock<Arc<[Handler]>>,
	calls: AtomicU64,
	last_nanos: AtomicU64,
	total_nanos: AtomicU64,
}

impl HookInstallation {

	fn new( descriptor: HookDescriptor ) -> Self {
		Self {
			descriptor,
			state: Mutex::new( InstallState::default() ),
			handlers: RwLock::new( Arc::from( Vec::new() )),
			calls: AtomicU64::new( 0 ),
			last_nanos: AtomicU64::new( 0 ),
			total_nanos: AtomicU64::new( 0 ),
		}
	}

	fn snapshot( &self ) -> Arc<[Handler]> { Arc::clone( &self.handlers.read() )}

	fn update_handlers( &self, update: impl FnOnce( &mut Vec<Handler> )) {
		let mut handlers = self.handlers.write();
		let mut next = handlers.to_vec();
		update( &mut next );
		*handlers = Arc::from( next );
	}

}

/// Introspection snapshot of one hook.
#[derive( Clone, Debug, PartialEq, Eq, Serialize )]
pub struct HookSummary {
	pub name: String,
	pub category: HookCategory,
	pub installed: bool,
	pub always_installed: bool,
	pub subscribers: usize,
	/// Plugins with a handler for the hook, in dispatch order.
	pub plugins: Vec<String>,
	pub calls: u64,
	pub last_time: Duration,
	pub total_time: Duration,
}

/// Process-wide mapping from hook name to its descriptor and runtime state.
pub struct HookRegistry {
	hooks: RwLock<HashMap<String, Arc<HookInstallation>>>,
	catalog: RwLock<Arc<HashMap<String, HookDescriptor>>>,
	interceptor: Box<dyn Interceptor>,
	reported_unknown: Mutex<HashSet<String>>,
	time_tracking: AtomicBool,
}

impl std::fmt::Debug for HookRegistry {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::result::Result<(), std::fmt::Error> {
		f.debug_struct( "HookRegistry" )
			.field( "hooks", &self.hooks.read().keys().sorted().collect::<Vec<_>>() )
			.field( "time_tracking", &self.time_tracking.load( Ordering::Relaxed ))
			.finish_non_exhaustive()
	}
}

impl Default for HookRegistry {
	fn default() -> Self { Self::new( NoopInterceptor ) }
}

impl HookRegistry {

	pub fn new( interceptor: impl Interceptor + 'static ) -> Self {
		Self {
			hooks: RwLock::new( HashMap::new() ),
			catalog: RwLock::new( Arc::new( HashMap::new() )),
			interceptor: Box::new( interceptor ),
			reported_unknown: Mutex::new( HashSet::new() ),
			time_tracking: AtomicBool::new( true ),
		}
	}

	/// Adds a descriptor. Descriptors are immutable once registered.
	/// Always-installed hooks are attached right away.
	///
	/// # Errors
	/// [`HookError::DuplicateDescriptor`] if the name is taken.
	pub fn register( &self, descriptor: HookDescriptor ) -> Result<(), HookError> {
		let mut hooks = self.hooks.write();
		if hooks.contains_key( descriptor.name() ) {
			return Err( HookError::DuplicateDescriptor( descriptor.name().to_string() ));
		}
		let mut catalog = self.catalog.write();
		let mut next = HashMap::clone( &catalog );
		next.insert( descriptor.name().to_string(), descriptor.clone() );
		*catalog = Arc::new( next );
		let hook = Arc::new( HookInstallation::new( descriptor ));
		hooks.insert( hook.descriptor.name().to_string(), Arc::clone( &hook ));
		drop(( hooks, catalog ));
		if hook.descriptor.is_always_installed() { self.attach_always_installed( &hook ) }
		Ok(())
	}

	/// The descriptor registered under `name`.
	pub fn descriptor( &self, name: &str ) -> Option<HookDescriptor> {
		self.hooks.read().get( name ).map(| hook | hook.descriptor.clone() )
	}

	/// Snapshot of every registered descriptor, keyed by name.
	pub fn catalog( &self ) -> Arc<HashMap<String, HookDescriptor>> { Arc::clone( &self.catalog.read() )}

	fn installation( &self, name: &str ) -> Result<Arc<HookInstallation>, HookError> {
		self.hooks.read().get( name ).cloned().ok_or_else(|| HookError::UnknownHook( name.to_string() ))
	}

	/// Adds a subscriber, attaching the interception point if it isn't yet.
	///
	/// # Errors
	/// [`HookError::UnknownHook`], or [`HookError::Intercept`] if attaching
	/// failed, in which case the subscriber count is left unchanged.
	pub fn install( &self, name: &str ) -> Result<(), HookError> {
		let hook = self.installation( name )?;
		let mut state = hook.state.lock();
		state.subscribers += 1 ;
		if !state.installed {
			if let Err( reason ) = self.interceptor.attach( &hook.descriptor ) {
				state.subscribers -= 1 ;
				return Err( HookError::Intercept { hook: name.to_string(), reason });
			}
			state.installed = true ;
			tracing::debug!( hook = name, "Installed hook" );
		}
		Ok(())
	}

	/// Removes a subscriber, detaching the interception point once nothing
	/// needs it anymore. Always-installed hooks are only detached when
	/// `shutdown` is set, which also drops every remaining subscriber.
	/// Removing a subscriber from a hook that has none is a no-op.
	///
	/// # Errors
	/// [`HookError::UnknownHook`].
	pub fn uninstall( &self, name: &str, shutdown: bool ) -> Result<(), HookError> {
		let hook = self.installation( name )?;
		let mut state = hook.state.lock();
		match ( shutdown, state.subscribers ) {
			( true, _ ) => state.subscribers = 0,
			( false, 0 ) => return Ok(()),
			( false, _ ) => state.subscribers -= 1,
		}
		let keep = state.subscribers > 0 || ( !shutdown && hook.descriptor.is_always_installed() );
		if state.installed && !keep {
			self.interceptor.detach( &hook.descriptor );
			state.installed = false ;
			tracing::debug!( hook = name, "Uninstalled hook" );
		}
		if shutdown { hook.update_handlers( Vec::clear ) }
		Ok(())
	}

	/// Attaches every always-installed hook that isn't attached yet.
	pub fn install_always_installed( &self ) {
		let hooks = self.hooks.read().values().cloned().collect::<Vec<_>>();
		hooks.iter()
			.filter(| hook | hook.descriptor.is_always_installed() )
			.for_each(| hook | self.attach_always_installed( hook ));
	}

	fn attach_always_installed( &self, hook: &HookInstallation ) {
		let mut state = hook.state.lock();
		if state.installed { return }
		match self.interceptor.attach( &hook.descriptor ) {
			Ok(()) => {
				state.installed = true ;
				tracing::debug!( hook = hook.descriptor.name(), "Installed hook" );
			}
			Err( reason ) => tracing::error!( hook = hook.descriptor.name(), reason = reason.as_str(), "Failed to install hook" ),
		}
	}

	/// Detaches every hook and forgets all handlers and subscribers.
	pub fn teardown( &self ) {
		let names = self.hooks.read().keys().cloned().collect::<Vec<_>>();
		for name in names {
			// Names come from the map itself
			let _ = self.uninstall( &name, true );
		}
	}

	/// Number of plugins subscribed to `name`.
	pub fn subscribers( &self, name: &str ) -> usize {
		self.hooks.read().get( name ).map_or( 0, | hook | hook.state.lock().subscribers )
	}

	/// Whether the interception point for `name` is attached.
	pub fn is_installed( &self, name: &str ) -> bool {
		self.hooks.read().get( name ).is_some_and(| hook | hook.state.lock().installed )
	}

	/// Removes every handler of `plugin` and uninstalls the hooks it used.
	pub(crate) fn unsubscribe( &self, plugin: &Arc<PluginInstance> ) {
		// Nothing is installed when nothing is added
		let _ = self.swap( std::slice::from_ref( plugin ), &[] );
	}

	/// Replaces the handlers of `stale` with those of `fresh`.
	///
	/// Hooks `fresh` needs are installed first, so a hook used by both sides
	/// never loses its last subscriber in between. Each hook's handler list is
	/// swapped in one step, dispatch sees either the old or the new handlers.
	///
	/// # Errors
	/// The first hook that fails to install. Nothing changes in that case.
	pub(crate) fn swap( &self, stale: &[Arc<PluginInstance>], fresh: &[Arc<PluginInstance>] ) -> Result<(), HookError> {

		let mut installed: Vec<String> = Vec::new();
		let needed = fresh.iter().flat_map(| plugin | plugin.metadata().handlers().map(|( hook, _ )| hook.to_string() ).unique() );
		for name in needed {
			if let Err( err ) = self.install( &name ) {
				// Installed just above
				installed.iter().for_each(| name | { let _ = self.uninstall( name, false ); });
				return Err( err );
			}
			installed.push( name );
		}

		let mut incoming = fresh.iter()
			.flat_map(| plugin | plugin.metadata().handlers().map(| ( hook, export ) | ( hook.to_string(), Handler { plugin: Arc::clone( plugin ), export })))
			.into_group_map();

		let hooks = self.hooks.read().values().cloned().collect::<Vec<_>>();
		let mut released = Vec::new();
		for hook in hooks {
			let name = hook.descriptor.name();
			let added = incoming.remove( name ).unwrap_or_default();
			let snapshot = hook.snapshot();
			let leaving = stale.iter()
				.filter(| plugin | snapshot.iter().any(| handler | Arc::ptr_eq( &handler.plugin, plugin )))
				.count();
			if added.is_empty() && leaving == 0 { continue }

			hook.update_handlers(| handlers | {
				handlers.retain(| handler | !stale.iter().any(| plugin | Arc::ptr_eq( &handler.plugin, plugin )));
				handlers.extend( added );
			});
			released.extend( std::iter::repeat_n( name.to_string(), leaving ));
		}

		for name in released {
			// Known to exist
			let _ = self.uninstall( &name, false );
		}

		Ok(())

	}

	/// Runs every enabled handler of `name` with `args`.
	///
	/// Returns the first non-null result, `None` when no handler produced one
	/// and the host should proceed as usual. A failing handler is logged and
	/// skipped. Dispatching an unregistered name is reported once and ignored.
	pub fn dispatch( &self, name: &str, args: &[Val] ) -> Option<Val> {

		let Some( hook ) = self.hooks.read().get( name ).cloned() else {
			if self.reported_unknown.lock().insert( name.to_string() ) {
				tracing::warn!( hook = name, "Dispatched a hook that isn't registered" );
			}
			return None ;
		};

		if !hook.descriptor.matches_args( args ) {
			tracing::error!( hook = name, "Arguments don't match the hook's parameters" );
			return None ;
		}

		let tracking = self.time_tracking.load( Ordering::Relaxed );
		let started = Instant::now();
		let mut result = None ;

		for handler in hook.snapshot().iter().filter(| handler | handler.plugin.is_enabled() ) {
			let handler_started = Instant::now();
			let outcome = handler.plugin.invoke( &handler.export, args );
			if tracking { handler.plugin.record_hook_time( handler_started.elapsed() ) }
			match outcome {
				Ok( value ) => if result.is_none() { result = value.filter( is_non_null ) },
				Err( err ) => tracing::error!(
					hook = name,
					plugin = handler.plugin.name(),
					export = handler.export.as_str(),
					error = %err,
					"Hook handler failed",
				),
			}
		}

		if tracking { Self::accumulate( &hook, started.elapsed() ) }
		result

	}

	/// Adds `elapsed` to the timings of `name`.
	pub fn record_timing( &self, name: &str, elapsed: Duration ) {
		if let Some( hook ) = self.hooks.read().get( name ) { Self::accumulate( hook, elapsed ) }
	}

	fn accumulate( hook: &HookInstallation, elapsed: Duration ) {
		let nanos = u64::try_from( elapsed.as_nanos() ).unwrap_or( u64::MAX );
		hook.calls.fetch_add( 1, Ordering::Relaxed );
		hook.last_nanos.store( nanos, Ordering::Relaxed );
		hook.total_nanos.fetch_add( nanos, Ordering::Relaxed );
	}

	/// Enables or disables timing collection during dispatch.
	pub fn set_time_tracking( &self, enabled: bool ) { self.time_tracking.store( enabled, Ordering::Relaxed ) }

	/// Introspection snapshot of every hook, sorted by name.
	pub fn summaries( &self ) -> Vec<HookSummary> {
		self.hooks.read().values()
			.map(| hook | {
				let state = hook.state.lock();
				HookSummary {
					name: hook.descriptor.name().to_string(),
					category: hook.descriptor.category(),
					installed: state.installed,
					always_installed: hook.descriptor.is_always_installed(),
					subscribers: state.subscribers,
					plugins: hook.snapshot().iter().map(| handler | handler.plugin.name().to_string() ).dedup().collect(),
					calls: hook.calls.load( Ordering::Relaxed ),
					last_time: Duration::from_nanos( hook.last_nanos.load( Ordering::Relaxed )),
					total_time: Duration::from_nanos( hook.total_nanos.load( Ordering::Relaxed )),
				}
			})
			.sorted_by(| a, b | a.name.cmp( &b.name ))
			.collect()
	}

}

/// Zero results read as "no result", like a handler returning nothing.
fn is_non_null( value: &Val ) -> bool {
	match value {
		Val::I32( value ) => *value != 0,
		Val::I64( value ) => *value != 0,
		Val::F32( bits ) => *bits != 0,
		Val::F64( bits ) => *bits != 0,
		_ => true,
	}
}

#[cfg( test )]
mod tests {
	use super::* ;
	use crate::InterceptionTarget ;

	struct FailingInterceptor ;

	impl Interceptor for FailingInterceptor {
		fn attach( &self, descriptor: &HookDescriptor ) -> Result<(), String> {
			Err( format!( "{} can't be patched", descriptor.target() ))
		}
		fn detach( &self, _: &HookDescriptor ) {}
	}

	fn descriptor( name: &str ) -> HookDescriptor {
		HookDescriptor::new( name, HookCategory::Server, InterceptionTarget::new( "Server", "Tick" ))
	}

	#[test]
	fn failed_attach_rolls_back_subscribers() {
		let registry = HookRegistry::new( FailingInterceptor );
		registry.register( descriptor( "OnTick" )).unwrap();
		assert!( matches!( registry.install( "OnTick" ), Err( HookError::Intercept { .. })));
		assert_eq!( registry.subscribers( "OnTick" ), 0 );
		assert!( !registry.is_installed( "OnTick" ));
	}

	#[test]
	fn zero_results_are_null() {
		assert!( !is_non_null( &Val::I32( 0 )));
		assert!( is_non_null( &Val::I64( -1 )));
	}
}
