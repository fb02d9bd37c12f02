use wasm_hotload::{ SourceUnit, Val };
use crate::test_runtime::{ runtime, settle, ticker };

#[test]
fn shutdown_removes_everything() {

	let runtime = runtime();
	runtime.initialize();
	runtime.load_batch( vec![
		SourceUnit::from_source( "Core", ticker( "Core" )).core(),
		SourceUnit::from_source( "Script", ticker( "Script" )),
	]);
	settle( &runtime );
	assert!( runtime.hooks().is_installed( "OnServerSave" ));

	runtime.shutdown();

	assert!( runtime.modules().is_empty() );
	assert!( runtime.cache().is_empty() );
	assert!( runtime.status( "Core" ).is_none() && runtime.status( "Script" ).is_none() );
	assert!( runtime.hook_summaries().iter().all(| summary | !summary.installed && summary.subscribers == 0 && summary.plugins.is_empty() ));
	assert!( runtime.dispatch( "OnTick", &[] ).is_none() );

}

#[test]
fn shutdown_aborts_pending_loads() {

	let runtime = runtime();
	runtime.load( SourceUnit::from_source( "Late", ticker( "Late" )));
	runtime.shutdown();
	settle( &runtime );

	assert!( runtime.modules().is_empty() );
	assert!( runtime.cache().is_empty() );

}

#[test]
fn unload_runs_the_unload_member() {

	let runtime = runtime();
	runtime.load( SourceUnit::from_source( "Tidy", r#";; Info: Tidy, Tester, 1.0.0
(module
	(import "host" "log" (func $log (param i32 i32)))
	(memory (export "memory") 1)
	(data (i32.const 0) "bye")
	(global $initialised (mut i32) (i32.const 0))
	(func (export "Tidy.Init") (global.set $initialised (i32.const 1)))
	(func (export "Tidy.Unload") (call $log (i32.const 0) (i32.const 3)))
	(func (export "Tidy.initialised") (result i32) (global.get $initialised)))
"# ));
	settle( &runtime );
	assert!( matches!( runtime.call( "Tidy", "initialised", &[] ), Ok( Some( Val::I32( 1 )))));

	let plugin = runtime.modules().find( "Tidy" ).expect( "Tidy is not loaded" );
	assert!( runtime.unload( "Tidy" ));
	assert!( runtime.modules().find( "Tidy" ).is_none() );
	assert!( plugin.metadata().has_lifecycle( wasm_hotload::UNLOAD ));

}
