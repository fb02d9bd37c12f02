//! The load orchestrator.
//!
//! Every requested load becomes a [`LoadTask`] moving through the phases of
//! [`Phase`]. The orchestrator never blocks: [`LoadOrchestrator::tick`] advances
//! each task as far as it can without waiting and returns. Tasks suspend while
//! gated (re-checked every `gate_poll_interval`) and while their compilation
//! job runs (polled every tick).
//!
//! A batch is the set of units submitted together. Once all of its tasks are
//! terminal a [`BatchReport`] is sent to every subscriber.

use std::collections::HashMap ;
use std::sync::Arc ;
use std::time::{ Duration, Instant };
use crossbeam_channel::{ Receiver, Sender };
use itertools::Itertools ;
use wasmtime::{ Engine, Linker, Module };

use crate::{
	ArtifactCache, CompiledArtifact, Diagnostic, HookRegistry, LoadError, ModuleRegistry, Phase,
	PluginInfo, PluginInstance, PluginState, ReferenceSet, SourceUnit, TypeMetadata,
};
use crate::compiler::{ CompilationJob, CompileOutput, CompileRequest, JobContext, JobOutcome };
use crate::plugin_instance::InstanceSpec ;



/// Terminal status of one unit.
#[derive( Clone, Debug )]
pub struct UnitReport {
	unit: String,
	batch: u64,
	phase: Phase,
	plugins: Vec<String>,
	diagnostics: Vec<Diagnostic>,
	error: Option<Arc<LoadError>>,
	compile_started: Option<Instant>,
	finished: Instant,
}

impl UnitReport {
	#[inline] pub fn unit( &self ) -> &str { &self.unit }
	/// Id of the batch the unit was loaded in.
	#[inline] pub fn batch( &self ) -> u64 { self.batch }
	/// [`Phase::Ready`], [`Phase::Failed`] or [`Phase::Aborted`].
	#[inline] pub fn phase( &self ) -> Phase { self.phase }
	/// Names of the plugins the unit produced.
	#[inline] pub fn plugins( &self ) -> &[String] { &self.plugins }
	/// Every diagnostic of the unit, warnings included.
	#[inline] pub fn diagnostics( &self ) -> &[Diagnostic] { &self.diagnostics }
	#[inline] pub fn error( &self ) -> Option<&LoadError> { self.error.as_deref() }
	/// When the unit's compilation job was started, if it got that far.
	#[inline] pub fn compile_started( &self ) -> Option<Instant> { self.compile_started }
	/// When the unit reached its terminal phase.
	#[inline] pub fn finished( &self ) -> Instant { self.finished }
	#[inline] pub fn is_ready( &self ) -> bool { self.phase == Phase::Ready }
}

/// Outcome of a whole batch.
#[derive( Clone, Debug )]
pub struct BatchReport {
	id: u64,
	units: Vec<UnitReport>,
	elapsed: Duration,
}

impl BatchReport {
	#[inline] pub fn id( &self ) -> u64 { self.id }
	/// Reports in submission order.
	#[inline] pub fn units( &self ) -> &[UnitReport] { &self.units }
	#[inline] pub fn elapsed( &self ) -> Duration { self.elapsed }
	pub fn unit( &self, name: &str ) -> Option<&UnitReport> { self.units.iter().find(| report | report.unit == name )}
	/// Whether every unit of the batch became ready.
	pub fn is_success( &self ) -> bool { self.units.iter().all( UnitReport::is_ready )}
}

/// Settings of the orchestrator taken from [`RuntimeConfig`]( crate::RuntimeConfig ).
#[derive( Clone, Copy, Debug )]
pub(crate) struct OrchestratorSettings {
	pub gate_poll_interval: Duration,
	pub hook_validation: bool,
	pub strict_hook_validation: bool,
}

/// One unit being loaded.
#[derive( Debug )]
pub struct LoadTask {
	unit: SourceUnit,
	batch: u64,
	phase: Phase,
	job: Option<CompilationJob>,
	next_gate_check: Instant,
	dependencies: Vec<Arc<PluginInstance>>,
	diagnostics: Vec<Diagnostic>,
	plugins: Vec<String>,
	error: Option<Arc<LoadError>>,
	compile_started: Option<Instant>,
	finished: Option<Instant>,
}

impl LoadTask {

	fn new( unit: SourceUnit, batch: u64 ) -> Self {
		Self {
			unit,
			batch,
			phase: Phase::Pending,
			job: None,
			next_gate_check: Instant::now(),
			dependencies: Vec::new(),
			diagnostics: Vec::new(),
			plugins: Vec::new(),
			error: None,
			compile_started: None,
			finished: None,
		}
	}

	#[inline] pub fn unit( &self ) -> &SourceUnit { &self.unit }
	#[inline] pub fn batch( &self ) -> u64 { self.batch }
	#[inline] pub fn phase( &self ) -> Phase { self.phase }

	fn report( &self ) -> UnitReport {
		UnitReport {
			unit: self.unit.name().to_string(),
			batch: self.batch,
			phase: self.phase,
			plugins: self.plugins.clone(),
			diagnostics: self.diagnostics.clone(),
			error: self.error.clone(),
			compile_started: self.compile_started,
			finished: self.finished.unwrap_or_else( Instant::now ),
		}
	}

	fn finish( &mut self, phase: Phase, error: Option<LoadError> ) {
		if let Some( job ) = self.job.take() { job.abort() }
		self.dependencies.clear();
		self.phase = phase ;
		self.error = error.map( Arc::new );
		self.finished = Some( Instant::now() );
	}

}

struct BatchProgress {
	started: Instant,
}

/// Drives [`LoadTask`]s from source to ready plugins.
pub struct LoadOrchestrator {
	engine: Engine,
	cache: Arc<ArtifactCache>,
	references: Arc<ReferenceSet>,
	hooks: Arc<HookRegistry>,
	modules: Arc<ModuleRegistry>,
	host: Linker<PluginState>,
	settings: OrchestratorSettings,
	tasks: Vec<LoadTask>,
	batches: HashMap<u64, BatchProgress>,
	next_batch: u64,
	statuses: HashMap<String, UnitReport>,
	subscribers: Vec<Sender<BatchReport>>,
}

impl std::fmt::Debug for LoadOrchestrator {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::result::Result<(), std::fmt::Error> {
		f.debug_struct( "LoadOrchestrator" )
			.field( "tasks", &self.tasks )
			.field( "settings", &self.settings )
			.finish_non_exhaustive()
	}
}

/// Borrowed view of the shared registries, so a task can be advanced while
/// the task list is mutably borrowed.
struct Shared<'a> {
	engine: &'a Engine,
	cache: &'a Arc<ArtifactCache>,
	references: &'a Arc<ReferenceSet>,
	hooks: &'a Arc<HookRegistry>,
	modules: &'a Arc<ModuleRegistry>,
	host: &'a Linker<PluginState>,
	settings: OrchestratorSettings,
}

impl LoadOrchestrator {

	#[allow( clippy::too_many_arguments )]
	pub(crate) fn new(
		engine: Engine,
		cache: Arc<ArtifactCache>,
		references: Arc<ReferenceSet>,
		hooks: Arc<HookRegistry>,
		modules: Arc<ModuleRegistry>,
		host: Linker<PluginState>,
		settings: OrchestratorSettings,
	) -> Self {
		Self {
			engine,
			cache,
			references,
			hooks,
			modules,
			host,
			settings,
			tasks: Vec::new(),
			batches: HashMap::new(),
			next_batch: 1,
			statuses: HashMap::new(),
			subscribers: Vec::new(),
		}
	}

	pub(crate) fn host_linker_mut( &mut self ) -> &mut Linker<PluginState> { &mut self.host }

	/// Queues `units` as one batch and returns the batch id.
	///
	/// Unfinished loads of the same unit names are aborted first.
	pub fn submit( &mut self, units: Vec<SourceUnit> ) -> u64 {
		let batch = self.next_batch ;
		self.next_batch += 1 ;

		let units = units.into_iter().unique_by(| unit | unit.name().to_string() ).collect::<Vec<_>>();
		for unit in &units { self.abort_unit( unit.name() ) }

		tracing::info!( batch, units = %units.iter().map( SourceUnit::name ).join( ", " ), "Loading batch" );
		self.batches.insert( batch, BatchProgress { started: Instant::now() });
		self.tasks.extend( units.into_iter().map(| unit | LoadTask::new( unit, batch )));
		batch
	}

	/// Aborts unfinished loads of the unit named `name`.
	pub fn abort_unit( &mut self, name: &str ) {
		self.tasks.iter_mut()
			.filter(| task | task.unit.name() == name && !task.phase.is_terminal() )
			.for_each(| task | {
				tracing::debug!( unit = name, phase = %task.phase, "Aborting load" );
				task.finish( Phase::Aborted, Some( LoadError::Aborted ));
			});
	}

	/// Aborts every unfinished load matching `predicate`.
	pub(crate) fn abort_where( &mut self, predicate: impl Fn( &SourceUnit ) -> bool ) {
		let names = self.tasks.iter()
			.filter(| task | !task.phase.is_terminal() && predicate( &task.unit ))
			.map(| task | task.unit.name().to_string() )
			.collect::<Vec<_>>();
		names.iter().for_each(| name | self.abort_unit( name ));
	}

	/// Unfinished and not yet reported tasks.
	pub fn tasks( &self ) -> &[LoadTask] { &self.tasks }

	/// Whether no task is queued.
	pub fn is_idle( &self ) -> bool { self.tasks.is_empty() }

	/// Last terminal report of the unit named `name`.
	pub fn status( &self, name: &str ) -> Option<&UnitReport> { self.statuses.get( name ) }

	/// Drops the reports of units matching `predicate`. Loads they had in
	/// flight still report once their batch finishes.
	pub(crate) fn forget_where( &mut self, predicate: impl Fn( &str ) -> bool ) {
		self.statuses.retain(| unit, _ | !predicate( unit ));
	}

	/// A channel receiving every [`BatchReport`] from now on.
	pub fn subscribe( &mut self ) -> Receiver<BatchReport> {
		let ( sender, receiver ) = crossbeam_channel::unbounded();
		self.subscribers.push( sender );
		receiver
	}

	/// Advances every task as far as possible without blocking and reports
	/// finished batches. Returns whether tasks remain.
	pub fn tick( &mut self ) -> bool {
		let now = Instant::now();
		for index in 0..self.tasks.len() {
			while self.advance( index, now ) {}
		}
		self.finish_batches();
		!self.tasks.is_empty()
	}

	/// Performs one transition of the task at `index`. Returns `false` when the
	/// task is suspended or terminal.
	fn advance( &mut self, index: usize, now: Instant ) -> bool {

		let gate_open = {
			let task = &self.tasks[index];
			task.phase == Phase::Gated && now >= task.next_gate_check && crate::gate::can_proceed(
				self.tasks.iter()
					.filter(| other | other.batch == task.batch )
					.map(| other | ( other.unit.requires(), other.phase ))
			)
		};

		let shared = Shared {
			engine: &self.engine,
			cache: &self.cache,
			references: &self.references,
			hooks: &self.hooks,
			modules: &self.modules,
			host: &self.host,
			settings: self.settings,
		};
		let task = &mut self.tasks[index];

		match task.phase {
			Phase::Pending => {
				task.phase = Phase::ReferenceExtraction ;
				true
			}
			Phase::ReferenceExtraction => {
				match task.unit.extract() {
					Err( err ) => shared.fail( task, err ),
					Ok(()) if task.unit.requires().is_empty() => shared.start_compiling( task ),
					Ok(()) => {
						tracing::debug!( unit = task.unit.name(), requires = ?task.unit.requires(), "Waiting for dependencies" );
						task.phase = Phase::Gated ;
						task.next_gate_check = now ;
					}
				}
				true
			}
			Phase::Gated if gate_open => {
				match crate::gate::resolve( task.unit.requires(), shared.modules ) {
					Ok( dependencies ) => {
						task.dependencies = dependencies ;
						shared.start_compiling( task );
					}
					Err( missing ) => {
						tracing::warn!( unit = task.unit.name(), missing = %missing.iter().into_iter().join( ", " ), "Missing dependencies" );
						shared.fail( task, LoadError::MissingDependency( missing ));
					}
				}
				true
			}
			Phase::Gated => {
				if now >= task.next_gate_check { task.next_gate_check = now + shared.settings.gate_poll_interval }
				false
			}
			Phase::Compiling => {
				let outcome = match &task.job {
					Some( job ) => job.poll(),
					None => Some( JobOutcome::failed( LoadError::JobFailed( "no compilation job was started".to_string() ))),
				};
				let Some( JobOutcome { warnings, result }) = outcome else { return false };
				task.job = None ;
				task.diagnostics.extend( warnings );
				match result {
					Ok( output ) => {
						task.phase = Phase::Instantiating ;
						shared.instantiate( task, output );
					}
					Err( err ) => shared.fail( task, err ),
				}
				true
			}
			Phase::Instantiating | Phase::Ready | Phase::Failed | Phase::Aborted => false,
		}

	}

	fn finish_batches( &mut self ) {
		let finished = self.batches.keys()
			.copied()
			.filter(| batch | self.tasks.iter().filter(| task | task.batch == *batch ).all(| task | task.phase.is_terminal() ))
			.sorted()
			.collect::<Vec<_>>();

		for batch in finished {
			let Some( progress ) = self.batches.remove( &batch ) else { continue };
			let ( done, remaining ): ( Vec<_>, Vec<_> ) = std::mem::take( &mut self.tasks ).into_iter().partition(| task | task.batch == batch );
			self.tasks = remaining ;

			let units = done.iter().map( LoadTask::report ).collect::<Vec<_>>();
			for report in &units {
				// An aborted load doesn't hide the outcome of the load that superseded it
				if report.phase == Phase::Aborted && self.statuses.get( &report.unit ).is_some_and(| status | status.batch > batch ) { continue }
				self.statuses.insert( report.unit.clone(), report.clone() );
			}

			let report = BatchReport { id: batch, units, elapsed: progress.started.elapsed() };
			tracing::info!(
				batch,
				ready = report.units.iter().filter(| unit | unit.is_ready() ).count(),
				failed = report.units.iter().filter(| unit | unit.phase == Phase::Failed ).count(),
				elapsed = ?report.elapsed,
				"Batch finished",
			);
			self.subscribers.retain(| subscriber | subscriber.send( report.clone() ).is_ok() );
		}
	}

	/// Tears down every plugin of the unit named `unit`.
	pub(crate) fn teardown_unit( &self, unit: &str ) -> usize {
		let plugins = self.modules.plugins_of_unit( unit );
		plugins.iter().for_each(| plugin | teardown( &self.hooks, &self.modules, plugin ));
		apply_references( &self.modules );
		plugins.len()
	}

	/// Tears down every plugin matching `predicate`.
	pub(crate) fn teardown_where( &self, predicate: impl Fn( &PluginInstance ) -> bool ) -> Vec<String> {
		let plugins = self.modules.plugins().into_iter().filter(| plugin | predicate( plugin )).collect::<Vec<_>>();
		plugins.iter().rev().for_each(| plugin | teardown( &self.hooks, &self.modules, plugin ));
		apply_references( &self.modules );
		plugins.iter().map(| plugin | plugin.unit().to_string() ).unique().collect()
	}

}

impl Shared<'_> {

	fn fail( &self, task: &mut LoadTask, error: LoadError ) {
		match &error {
			LoadError::Aborted => tracing::debug!( unit = task.unit.name(), "Load aborted" ),
			LoadError::Compile( diagnostics ) => {
				for diagnostic in diagnostics.iter().into_iter() {
					tracing::error!(
						unit = task.unit.name(),
						file = diagnostic.file(),
						line = diagnostic.line(),
						column = diagnostic.column(),
						"{}", diagnostic.message(),
					);
				}
				task.diagnostics.extend( diagnostics.iter().into_iter().cloned() );
			}
			_ => tracing::error!( unit = task.unit.name(), error = %error, "Load failed" ),
		}
		let phase = match error.is_abort() { true => Phase::Aborted, false => Phase::Failed };
		task.finish( phase, Some( error ));
	}

	fn start_compiling( &self, task: &mut LoadTask ) {
		let request = CompileRequest {
			unit: task.unit.name().to_string(),
			file: task.unit.file_name(),
			source: task.unit.source().unwrap_or_default().to_string(),
			references: task.unit.references().to_vec(),
			dependencies: task.dependencies.iter()
				.map(| dependency | ( dependency.name().to_string(), dependency.artifact().module().clone() ))
				.collect(),
		};
		let context = JobContext {
			engine: self.engine.clone(),
			cache: Arc::clone( self.cache ),
			references: Arc::clone( self.references ),
			hooks: self.hooks.catalog(),
		};
		match CompilationJob::spawn( context, request ) {
			Ok( job ) => {
				tracing::debug!( unit = job.unit(), "Compiling" );
				task.job = Some( job );
				task.phase = Phase::Compiling ;
				task.compile_started = Some( Instant::now() );
			}
			Err( err ) => self.fail( task, err ),
		}
	}

	fn instantiate( &self, task: &mut LoadTask, output: CompileOutput ) {
		let CompileOutput { artifact, libraries } = output ;

		match self.create_plugins( task, &artifact, &libraries ) {
			Ok( plugins ) => {
				let names = plugins.iter().map(| plugin | plugin.name().to_string() ).collect::<Vec<_>>();
				if let Err( err ) = self.replace( task.unit.name(), plugins ) { return self.fail( task, err ) }
				tracing::info!(
					unit = task.unit.name(),
					plugins = %names.iter().join( ", " ),
					compile_time = ?artifact.compile_time(),
					"Loaded",
				);
				task.plugins = names ;
				task.finish( Phase::Ready, None );
			}
			Err( err ) => self.fail( task, err ),
		}
	}

	/// Instantiates every eligible type of `artifact`, all or nothing.
	fn create_plugins(
		&self,
		task: &LoadTask,
		artifact: &Arc<CompiledArtifact>,
		libraries: &[( String, Module )],
	) -> Result<Vec<Arc<PluginInstance>>, LoadError> {

		let directives = task.unit.directives();
		let eligible = artifact.types().iter()
			.filter_map(| ty | match directives.info_for( ty.name() ) {
				Some( info ) => Some(( ty, info )),
				None => {
					tracing::debug!( unit = task.unit.name(), ty = ty.name(), "Skipping type without Info directive" );
					None
				}
			})
			.collect::<Vec<( &TypeMetadata, &PluginInfo )>>();

		if eligible.is_empty() {
			tracing::warn!( unit = task.unit.name(), "No plugin types found" );
		}

		for ( ty, _ ) in &eligible {
			if ty.unsupported_hooks().is_empty() { continue }
			if self.settings.strict_hook_validation {
				return Err( LoadError::UnsupportedHooks { plugin: ty.name().to_string(), hooks: ty.unsupported_hooks().to_vec() });
			}
			if self.settings.hook_validation {
				tracing::warn!( plugin = ty.name(), hooks = %ty.unsupported_hooks().iter().join( ", " ), "Plugin uses unsupported hooks" );
			}
		}

		let mut plugins: Vec<Arc<PluginInstance>> = Vec::with_capacity( eligible.len() );
		for ( metadata, info ) in eligible {
			let spec = InstanceSpec {
				engine: self.engine,
				host: self.host,
				artifact,
				metadata,
				info,
				unit: task.unit.name(),
				libraries,
				dependencies: &task.dependencies,
				registry: self.modules,
				is_core: task.unit.is_core(),
			};
			match PluginInstance::instantiate( spec ) {
				Ok( plugin ) => plugins.push( plugin ),
				Err( error ) => {
					plugins.iter().for_each(| plugin | plugin.unload() );
					return Err( LoadError::Instantiation { plugin: metadata.name().to_string(), error });
				}
			}
		}
		Ok( plugins )

	}

	/// Swaps the plugins of `unit` for `plugins`: old instances of the unit and
	/// same-named instances of other units are replaced by the new ones. If the
	/// new instances can't be subscribed, the old ones stay in place.
	fn replace( &self, unit: &str, plugins: Vec<Arc<PluginInstance>> ) -> Result<(), LoadError> {
		let stale = self.modules.plugins().into_iter()
			.filter(| existing | existing.unit() == unit || plugins.iter().any(| plugin | plugin.name() == existing.name() ))
			.collect::<Vec<_>>();

		if let Err( error ) = self.hooks.swap( &stale, &plugins ) {
			plugins.iter().for_each(| plugin | plugin.unload() );
			return Err( LoadError::Hook { plugin: unit.to_string(), error });
		}
		self.modules.swap( &stale, &plugins );

		for plugin in &stale {
			plugin.unload();
			tracing::info!( plugin = plugin.name(), unit = plugin.unit(), "Unloaded" );
		}
		apply_references( self.modules );
		Ok(())
	}

}

fn teardown( hooks: &HookRegistry, modules: &ModuleRegistry, plugin: &Arc<PluginInstance> ) {
	hooks.unsubscribe( plugin );
	if modules.remove( plugin ) {
		plugin.unload();
		tracing::info!( plugin = plugin.name(), unit = plugin.unit(), "Unloaded" );
	}
}

/// Refreshes every plugin's reference globals.
pub(crate) fn apply_references( modules: &ModuleRegistry ) {
	let plugins = modules.plugins();
	let ready = plugins.iter().map(| plugin | plugin.name() ).collect::<std::collections::HashSet<_>>();
	plugins.iter().for_each(| plugin | plugin.apply_references(| name | ready.contains( name )));
}
