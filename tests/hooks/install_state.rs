use std::sync::Arc ;
use parking_lot::Mutex ;
use wasm_hotload::{ HookDescriptor, HookError, HookRegistry, Interceptor, LoadError, Phase, Runtime, SourceUnit, Val };
use crate::test_runtime::{ config, descriptors, settle, ticker };

/// Records every attach and detach.
#[derive( Clone, Default )]
struct Recorder( Arc<Mutex<Vec<String>>> );

impl Recorder {
	fn take( &self ) -> Vec<String> { std::mem::take( &mut *self.0.lock() )}
}

impl Interceptor for Recorder {
	fn attach( &self, descriptor: &HookDescriptor ) -> Result<(), String> {
		self.0.lock().push( format!( "+{}", descriptor.name() ));
		Ok(())
	}
	fn detach( &self, descriptor: &HookDescriptor ) {
		self.0.lock().push( format!( "-{}", descriptor.name() ));
	}
}

/// Refuses to attach the hook it names.
struct Refuser( &'static str );

impl Interceptor for Refuser {
	fn attach( &self, descriptor: &HookDescriptor ) -> Result<(), String> {
		match descriptor.name() == self.0 {
			true => Err( format!( "{} can't be patched", self.0 )),
			false => Ok(()),
		}
	}
	fn detach( &self, _: &HookDescriptor ) {}
}

fn recorded_registry() -> ( HookRegistry, Recorder ) {
	let recorder = Recorder::default();
	let registry = HookRegistry::new( recorder.clone() );
	descriptors().into_iter().for_each(| descriptor | registry.register( descriptor ).expect( "Failed to register hook" ));
	assert_eq!( recorder.take(), [ "+OnServerSave" ]);
	( registry, recorder )
}

fn intercepted_runtime( interceptor: impl Interceptor + 'static ) -> Runtime {
	let runtime = Runtime::with_interceptor( wasm_hotload::Engine::default(), config(), interceptor ).expect( "Failed to create runtime" );
	descriptors().into_iter().for_each(| descriptor | runtime.register_hook( descriptor ).expect( "Failed to register hook" ));
	runtime
}

#[test]
fn installed_only_while_subscribed() {

	let ( registry, recorder ) = recorded_registry();

	registry.install( "OnTick" ).expect( "Failed to install" );
	registry.install( "OnTick" ).expect( "Failed to install" );
	assert_eq!( registry.subscribers( "OnTick" ), 2 );
	assert_eq!( recorder.take(), [ "+OnTick" ]);

	registry.uninstall( "OnTick", false ).expect( "Failed to uninstall" );
	assert!( registry.is_installed( "OnTick" ));
	registry.uninstall( "OnTick", false ).expect( "Failed to uninstall" );
	assert!( !registry.is_installed( "OnTick" ));
	assert_eq!( recorder.take(), [ "-OnTick" ]);

}

#[test]
fn uninstall_without_subscribers_is_a_noop() {

	let ( registry, recorder ) = recorded_registry();

	registry.uninstall( "OnTick", false ).expect( "Failed to uninstall" );
	assert_eq!( registry.subscribers( "OnTick" ), 0 );
	assert!( !registry.is_installed( "OnTick" ));
	assert!( recorder.take().is_empty() );

	// The count never goes negative, so one install still installs
	registry.install( "OnTick" ).expect( "Failed to install" );
	assert!( registry.is_installed( "OnTick" ));

}

#[test]
fn always_installed_hooks_stay_until_shutdown() {

	let ( registry, recorder ) = recorded_registry();
	assert!( registry.is_installed( "OnServerSave" ));
	registry.install_always_installed();
	assert!( recorder.take().is_empty() );

	registry.install( "OnServerSave" ).expect( "Failed to install" );
	registry.uninstall( "OnServerSave", false ).expect( "Failed to uninstall" );
	assert!( registry.is_installed( "OnServerSave" ));
	assert!( recorder.take().is_empty() );

	registry.uninstall( "OnServerSave", true ).expect( "Failed to uninstall" );
	assert!( !registry.is_installed( "OnServerSave" ));
	assert_eq!( recorder.take(), [ "-OnServerSave" ]);

}

#[test]
fn plugins_drive_the_subscriber_count() {

	let recorder = Recorder::default();
	let runtime = intercepted_runtime( recorder.clone() );
	runtime.initialize();
	assert_eq!( recorder.take(), [ "+OnServerSave" ]);

	runtime.load_batch( vec![
		SourceUnit::from_source( "First", ticker( "First" )),
		SourceUnit::from_source( "Second", ticker( "Second" )),
	]);
	settle( &runtime );
	assert_eq!( runtime.hooks().subscribers( "OnTick" ), 2 );
	assert_eq!( recorder.take(), [ "+OnTick" ]);

	runtime.unload( "First" );
	assert_eq!( runtime.hooks().subscribers( "OnTick" ), 1 );
	runtime.unload( "Second" );
	assert_eq!( runtime.hooks().subscribers( "OnTick" ), 0 );
	assert_eq!( recorder.take(), [ "-OnTick" ]);

	runtime.shutdown();
	assert!( !runtime.hooks().is_installed( "OnServerSave" ));
	assert_eq!( recorder.take(), [ "-OnServerSave" ]);

}

#[test]
fn reload_never_detaches_a_hook_in_use() {

	let recorder = Recorder::default();
	let runtime = intercepted_runtime( recorder.clone() );
	runtime.load( SourceUnit::from_source( "Steady", ticker( "Steady" )));
	settle( &runtime );
	assert_eq!( recorder.take(), [ "+OnServerSave", "+OnTick" ]);

	runtime.load( SourceUnit::from_source( "Steady", ticker( "Steady" )));
	settle( &runtime );

	assert!( runtime.status( "Steady" ).is_some_and(| report | report.is_ready() ));
	assert!( recorder.take().is_empty() );
	assert_eq!( runtime.hooks().subscribers( "OnTick" ), 1 );
	assert!( runtime.hooks().is_installed( "OnTick" ));

}

#[test]
fn failed_hook_install_keeps_the_previous_version() {

	let runtime = intercepted_runtime( Refuser( "OnPlayerJoin" ));
	runtime.load( SourceUnit::from_source( "Patch", ticker( "Patch" )));
	settle( &runtime );

	runtime.load( SourceUnit::from_source( "Patch", r#";; Info: Patch, Tester, 2.0.0
(module
	(func (export "Patch.OnTick"))
	(func (export "Patch.OnPlayerJoin") (param i64))
	(func (export "Patch.ticks") (result i32) i32.const 99))
"# ));
	settle( &runtime );

	let report = runtime.status( "Patch" ).expect( "Patch has no status" );
	assert_eq!( report.phase(), Phase::Failed );
	assert!( matches!( report.error(), Some( LoadError::Hook { error: HookError::Intercept { .. }, .. })), "{:#?}", report );

	// The first version is still loaded and subscribed
	runtime.dispatch( "OnTick", &[] );
	assert!( matches!( runtime.call( "Patch", "ticks", &[] ), Ok( Some( Val::I32( 1 )))));
	assert_eq!( runtime.hooks().subscribers( "OnTick" ), 1 );
	assert_eq!( runtime.hooks().subscribers( "OnPlayerJoin" ), 0 );
	assert!( runtime.hooks().is_installed( "OnTick" ));
	assert!( !runtime.hooks().is_installed( "OnPlayerJoin" ));

}
