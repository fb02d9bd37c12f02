use std::time::Duration ;
use wasm_hotload::{ RuntimeConfig, SourceUnit };
use crate::test_runtime::{ config, runtime, settle, ticker, with_config };

#[test]
fn dispatch_records_timings() {

	let runtime = runtime();
	runtime.load( SourceUnit::from_source( "Timed", ticker( "Timed" )));
	settle( &runtime );

	for _ in 0..3 { runtime.dispatch( "OnTick", &[] ); }
	runtime.hooks().record_timing( "OnTick", Duration::from_millis( 5 ));

	let summary = runtime.hook_summaries().into_iter().find(| summary | summary.name == "OnTick" ).expect( "OnTick missing" );
	assert_eq!( summary.calls, 4 );
	assert_eq!( summary.last_time, Duration::from_millis( 5 ));
	assert!( summary.total_time >= Duration::from_millis( 5 ));
	assert_eq!( summary.plugins, [ "Timed" ]);
	assert!( summary.installed );

}

#[test]
fn tracking_can_be_disabled() {

	let runtime = with_config( RuntimeConfig { hook_time_tracker: false, ..config() });
	runtime.load( SourceUnit::from_source( "Untimed", ticker( "Untimed" )));
	settle( &runtime );

	runtime.dispatch( "OnTick", &[] );

	let summary = runtime.hook_summaries().into_iter().find(| summary | summary.name == "OnTick" ).expect( "OnTick missing" );
	assert_eq!( summary.calls, 0 );
	assert_eq!( runtime.modules().find( "Untimed" ).map(| plugin | plugin.total_hook_time() ), Some( Duration::ZERO ));

}

#[test]
fn summaries_are_sorted_and_complete() {

	let runtime = runtime();
	runtime.initialize();
	let names = runtime.hook_summaries().into_iter().map(| summary | summary.name ).collect::<Vec<_>>();
	assert_eq!( names, [ "OnPlayerChat", "OnPlayerJoin", "OnServerSave", "OnTick" ]);

	let save = runtime.hook_summaries().into_iter().find(| summary | summary.name == "OnServerSave" ).expect( "OnServerSave missing" );
	assert!( save.installed && save.always_installed );
	assert_eq!( save.subscribers, 0 );

}
