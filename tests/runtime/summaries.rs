use wasm_hotload::SourceUnit ;
use crate::test_runtime::{ runtime, settle, ticker };

#[test]
fn module_summaries_serialise() {

	let runtime = runtime();
	runtime.load_batch( vec![
		SourceUnit::from_source( "Kernel", ticker( "Kernel" )).core(),
		SourceUnit::from_source( "Greeter", r#";; Requires: Kernel
;; Info: Greeter, Jane Doe, 1.2.3
(module
	(func (export "Greeter.OnPlayerJoin") (param i64)))
"# ),
	]);
	settle( &runtime );

	let json = serde_json::to_value( runtime.module_summaries() ).expect( "Failed to serialise" );
	assert_eq!( json[0]["name"], "core" );
	assert_eq!( json[0]["plugins"][0]["name"], "Kernel" );
	assert_eq!( json[1]["name"], "scripts" );

	let greeter = &json[1]["plugins"][0];
	assert_eq!( greeter["name"], "Greeter" );
	assert_eq!( greeter["author"], "Jane Doe" );
	assert_eq!( greeter["version"]["minor"], 2 );
	assert_eq!( greeter["hooks"], serde_json::json!([ "OnPlayerJoin" ]));
	assert_eq!( greeter["requires"], serde_json::json!([ "Kernel" ]));
	assert_eq!( greeter["enabled"], true );

}

#[test]
fn hook_summaries_serialise() {

	let runtime = runtime();
	runtime.load( SourceUnit::from_source( "Clock", ticker( "Clock" )));
	settle( &runtime );
	runtime.dispatch( "OnTick", &[] );

	let json = serde_json::to_value( runtime.hook_summaries() ).expect( "Failed to serialise" );
	let tick = json.as_array()
		.and_then(| hooks | hooks.iter().find(| hook | hook["name"] == "OnTick" ))
		.expect( "OnTick missing" );
	assert_eq!( tick["installed"], true );
	assert_eq!( tick["subscribers"], 1 );
	assert_eq!( tick["calls"], 1 );
	assert_eq!( tick["plugins"], serde_json::json!([ "Clock" ]));

}
