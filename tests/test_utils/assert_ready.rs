#[macro_export]
macro_rules! assert_ready {
	( $runtime:expr, $( $unit:literal ),+ $(,)? ) => {{ $(
		match $runtime.status( $unit ) {
			Some( report ) if report.is_ready() => {}
			report => panic!( "Expected {} to be ready, found: {:#?}", $unit, report ),
		}
	)+ }};
}
