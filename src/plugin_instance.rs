use std::sync::Arc ;
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::time::Duration ;
use parking_lot::Mutex ;
use wasmtime::{ Engine, Instance, Linker, Module, Store, Val };

use crate::{ CompiledArtifact, DispatchError, ModuleRegistry, ParamKind, PluginInfo, TypeMetadata };
use crate::discovery::{ INIT, UNLOAD };
use crate::linker ;



/// How long a call waits for an instance busy on another thread.
const LOCK_TIMEOUT: Duration = Duration::from_millis( 250 );

/// Data stored in every plugin's wasmtime [`Store`].
#[derive( Debug )]
pub struct PluginState {
	plugin: String,
}

impl PluginState {
	pub(crate) fn new( plugin: impl Into<String> ) -> Self { Self { plugin: plugin.into() }}
	/// Name of the plugin owning the store.
	#[inline] pub fn plugin( &self ) -> &str { &self.plugin }
}

struct Live {
	store: Store<PluginState>,
	instance: Instance,
}

/// Inputs for [`PluginInstance::instantiate`].
pub(crate) struct InstanceSpec<'a> {
	pub engine: &'a Engine,
	pub host: &'a Linker<PluginState>,
	pub artifact: &'a Arc<CompiledArtifact>,
	pub metadata: &'a TypeMetadata,
	pub info: &'a PluginInfo,
	pub unit: &'a str,
	pub libraries: &'a [( String, Module )],
	pub dependencies: &'a [Arc<PluginInstance>],
	pub registry: &'a Arc<ModuleRegistry>,
	pub is_core: bool,
}

/// A live plugin: one type of a compiled artifact, instantiated in its own store.
///
/// Calls into the instance are serialised by a lock. A call that re-enters an
/// instance already executing on the same thread (for example through a
/// dependency cycle) fails with [`DispatchError::LockRejected`].
pub struct PluginInstance {
	name: String,
	unit: String,
	info: PluginInfo,
	artifact: Arc<CompiledArtifact>,
	metadata: TypeMetadata,
	requires: Vec<String>,
	is_core: bool,
	enabled: AtomicBool,
	hook_time_nanos: AtomicU64,
	live: Mutex<Live>,
}

impl std::fmt::Debug for PluginInstance {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::result::Result<(), std::fmt::Error> {
		f.debug_struct( "PluginInstance" )
			.field( "name", &self.name )
			.field( "unit", &self.unit )
			.field( "generation", &self.artifact.generation() )
			.field( "enabled", &self.is_enabled() )
			.finish_non_exhaustive()
	}
}

impl PluginInstance {

	const PLACEHOLDER_VAL: Val = Val::I32( 0 );

	/// Instantiates the type described by `spec.metadata`, links its
	/// references and dependencies, and runs its `Init` member if present.
	pub(crate) fn instantiate( spec: InstanceSpec<'_> ) -> Result<Arc<Self>, wasmtime::Error> {

		let name = spec.metadata.name().to_string();
		let module = spec.artifact.module();

		let mut store = Store::new( spec.engine, PluginState::new( &name ));
		let mut linker = spec.host.clone();
		linker::link_libraries( &mut linker, &mut store, spec.libraries )?;
		linker::link_dependencies( &mut linker, module, spec.dependencies, spec.registry )?;
		let instance = linker.instantiate( &mut store, module )?;

		let plugin = Arc::new( Self {
			name,
			unit: spec.unit.to_string(),
			info: spec.info.clone(),
			artifact: Arc::clone( spec.artifact ),
			metadata: spec.metadata.clone(),
			requires: spec.dependencies.iter().map(| dependency | dependency.name.clone() ).collect(),
			is_core: spec.is_core,
			enabled: AtomicBool::new( true ),
			hook_time_nanos: AtomicU64::new( 0 ),
			live: Mutex::new( Live { store, instance }),
		});

		if plugin.metadata.has_lifecycle( INIT ) {
			plugin.invoke( &plugin.metadata.export_name( INIT ), &[] )?;
		}

		Ok( plugin )

	}

	#[inline] pub fn name( &self ) -> &str { &self.name }
	/// Name of the unit the plugin was compiled from.
	#[inline] pub fn unit( &self ) -> &str { &self.unit }
	#[inline] pub fn info( &self ) -> &PluginInfo { &self.info }
	/// The artifact this instance was created from, possibly superseded since.
	#[inline] pub fn artifact( &self ) -> &Arc<CompiledArtifact> { &self.artifact }
	#[inline] pub fn metadata( &self ) -> &TypeMetadata { &self.metadata }
	/// Names of the plugins this instance was linked against.
	#[inline] pub fn requires( &self ) -> &[String] { &self.requires }
	#[inline] pub fn is_core( &self ) -> bool { self.is_core }
	#[inline] pub fn compile_time( &self ) -> Duration { self.artifact.compile_time() }

	pub fn is_enabled( &self ) -> bool { self.enabled.load( Ordering::Acquire ) }
	pub(crate) fn set_enabled( &self, enabled: bool ) { self.enabled.store( enabled, Ordering::Release ) }

	/// Time spent in this plugin's hook handlers so far.
	pub fn total_hook_time( &self ) -> Duration { Duration::from_nanos( self.hook_time_nanos.load( Ordering::Relaxed ))}

	pub(crate) fn record_hook_time( &self, elapsed: Duration ) {
		let nanos = u64::try_from( elapsed.as_nanos() ).unwrap_or( u64::MAX );
		self.hook_time_nanos.fetch_add( nanos, Ordering::Relaxed );
	}

	/// Calls `member` of the plugin's type with `args`.
	///
	/// Returns the function's single result, or `None` for functions without one.
	///
	/// # Errors
	/// See [`DispatchError`].
	pub fn call( &self, member: &str, args: &[Val] ) -> Result<Option<Val>, DispatchError> {
		self.invoke( &self.metadata.export_name( member ), args )
	}

	/// Calls the export named `export`.
	pub(crate) fn invoke( &self, export: &str, args: &[Val] ) -> Result<Option<Val>, DispatchError> {
		let mut results = Vec::with_capacity( 1 );
		self.with_func( export, args, | store, func | {
			results = vec![ Self::PLACEHOLDER_VAL ; func.ty( &*store ).results().len() ];
			func.call( store, args, &mut results )
		})?;
		Ok( results.pop() )
	}

	/// Calls the export named `export`, writing into a caller-provided result buffer.
	pub(crate) fn call_into( &self, export: &str, args: &[Val], results: &mut [Val] ) -> Result<(), DispatchError> {
		self.with_func( export, args, | store, func | func.call( store, args, results ))
	}

	fn with_func<R>(
		&self,
		export: &str,
		args: &[Val],
		call: impl FnOnce( &mut Store<PluginState>, &wasmtime::Func ) -> Result<R, wasmtime::Error>,
	) -> Result<R, DispatchError> {

		let mut lock = self.live.try_lock_for( LOCK_TIMEOUT ).ok_or( DispatchError::LockRejected )?;
		let Live { store, instance } = &mut *lock ;

		let func = instance
			.get_func( &mut *store, export )
			.ok_or_else(|| DispatchError::InvalidFunction( export.to_string() ))?;

		let ty = func.ty( &*store );
		let params_match = ty.params().len() == args.len()
			&& ty.params().zip( args ).all(|( param, arg )| ParamKind::of_type( &param ).is_some_and(| kind | Some( kind ) == ParamKind::of_val( arg )));
		if !params_match { return Err( DispatchError::InvalidArgumentList ) }

		call( store, &func ).map_err( DispatchError::RuntimeException )

	}

	/// Writes the presence of every referenced plugin into its reference global.
	pub(crate) fn apply_references( &self, is_ready: impl Fn( &str ) -> bool ) {
		if self.metadata.plugin_references().is_empty() { return }
		let mut lock = self.live.lock();
		let Live { store, instance } = &mut *lock ;
		for reference in self.metadata.plugin_references() {
			let value = i32::from( is_ready( reference.plugin() ));
			let Some( global ) = instance.get_global( &mut *store, reference.export() ) else { continue };
			if let Err( err ) = global.set( &mut *store, Val::I32( value )) {
				tracing::warn!( plugin = self.name.as_str(), reference = reference.plugin(), error = %err, "Failed to update plugin reference" );
			}
		}
	}

	/// Runs the `Unload` member, if any. Failures are logged only.
	pub(crate) fn unload( &self ) {
		if !self.metadata.has_lifecycle( UNLOAD ) { return }
		if let Err( err ) = self.invoke( &self.metadata.export_name( UNLOAD ), &[] ) {
			tracing::error!( plugin = self.name.as_str(), error = %err, "Unload failed" );
		}
	}

}
