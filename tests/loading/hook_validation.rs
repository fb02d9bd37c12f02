use wasm_hotload::{ LoadError, Phase, RuntimeConfig, SourceUnit };
use crate::test_runtime::{ config, runtime, settle, with_config };

const EXPLOSIVE: &str = r#";; Info: Demolition, Tester, 1.0.0
(module
	(func (export "Demolition.OnTick"))
	(func (export "Demolition.OnExplosion") (param i64)))
"# ;

#[test]
fn unsupported_hooks_only_warn_by_default() {

	let runtime = runtime();
	runtime.load( SourceUnit::from_source( "Demolition", EXPLOSIVE ));
	settle( &runtime );
	assert_ready!( runtime, "Demolition" );

	let plugin = runtime.modules().find( "Demolition" ).expect( "Demolition is not loaded" );
	assert_eq!( plugin.metadata().hooks(), [ "OnTick" ]);
	assert_eq!( plugin.metadata().unsupported_hooks(), [ "OnExplosion" ]);
	assert_eq!( runtime.hooks().subscribers( "OnTick" ), 1 );

}

#[test]
fn strict_validation_rejects_unsupported_hooks() {

	let runtime = with_config( RuntimeConfig { strict_hook_validation: true, ..config() });
	runtime.load( SourceUnit::from_source( "Demolition", EXPLOSIVE ));
	settle( &runtime );

	let report = runtime.status( "Demolition" ).expect( "Demolition has no status" );
	assert_eq!( report.phase(), Phase::Failed );
	match report.error() {
		Some( LoadError::UnsupportedHooks { plugin, hooks }) => {
			assert_eq!( plugin, "Demolition" );
			assert_eq!( hooks, &[ "OnExplosion".to_string() ]);
		}
		other => panic!( "Expected UnsupportedHooks, found: {:#?}", other ),
	}
	assert!( runtime.modules().is_empty() );
	assert!( !runtime.hooks().is_installed( "OnTick" ));

}

#[test]
fn mismatched_hook_signature_is_not_a_handler() {

	let runtime = runtime();
	runtime.load( SourceUnit::from_source( "Confused", r#";; Info: Confused, Tester, 1.0.0
(module
	(func (export "Confused.OnPlayerJoin") (param i32)))
"# ));
	settle( &runtime );
	assert_ready!( runtime, "Confused" );

	assert_eq!( runtime.hooks().subscribers( "OnPlayerJoin" ), 0 );

}
