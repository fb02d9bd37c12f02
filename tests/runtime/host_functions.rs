use wasm_hotload::{ LoadError, SourceUnit, Val };
use crate::test_runtime::{ runtime, settle };

#[test]
fn plugins_can_log_through_the_host() {

	let runtime = runtime();
	runtime.load( SourceUnit::from_source( "Logger", r#";; Info: Logger, Tester, 1.0.0
(module
	(import "host" "log" (func $log (param i32 i32)))
	(memory (export "memory") 1)
	(data (i32.const 0) "hello from wasm")
	(func (export "Logger.Init") (call $log (i32.const 0) (i32.const 15)))
	(func (export "Logger.shout") (result i32) (call $log (i32.const 6) (i32.const 4)) (i32.const 1)))
"# ));
	settle( &runtime );
	assert_ready!( runtime, "Logger" );
	assert!( matches!( runtime.call( "Logger", "shout", &[] ), Ok( Some( Val::I32( 1 )))));

}

#[test]
fn logging_out_of_bounds_traps() {

	let runtime = runtime();
	runtime.load( SourceUnit::from_source( "Overflow", r#";; Info: Overflow, Tester, 1.0.0
(module
	(import "host" "log" (func $log (param i32 i32)))
	(memory (export "memory") 1)
	(func (export "Overflow.Init") (call $log (i32.const 65530) (i32.const 100))))
"# ));
	settle( &runtime );

	let report = runtime.status( "Overflow" ).expect( "Overflow has no status" );
	assert!( matches!( report.error(), Some( LoadError::Instantiation { .. })));

}

#[test]
fn extra_host_functions_can_be_linked() {

	let mut runtime = runtime();
	runtime.host_linker_mut()
		.func_wrap( wasm_hotload::HOST_MODULE, "answer", || 42_i32 )
		.expect( "Failed to define host function" );

	runtime.load( SourceUnit::from_source( "Oracle", r#";; Info: Oracle, Tester, 1.0.0
(module
	(import "host" "answer" (func $answer (result i32)))
	(func (export "Oracle.ask") (result i32) (call $answer)))
"# ));
	settle( &runtime );
	assert!( matches!( runtime.call( "Oracle", "ask", &[] ), Ok( Some( Val::I32( 42 )))));

}
