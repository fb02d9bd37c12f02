use wasm_hotload::SourceUnit ;
use crate::test_runtime::{ runtime, settle, ticker };

fn dependent( name: &str, requires: &str ) -> SourceUnit {
	SourceUnit::from_source( name, format!( ";; Requires: {requires}\n{}", ticker( name )))
}

#[test]
fn dependents_compile_after_every_dependency_free_unit() {

	// A few fixed interleavings of dependency-free and dependent units
	let orders: [&[usize]; 3] = [
		&[ 0, 1, 2, 3, 4, 5, 6 ],
		&[ 6, 5, 4, 3, 2, 1, 0 ],
		&[ 4, 0, 5, 1, 6, 2, 3 ],
	];

	for order in orders {

		let runtime = runtime();
		let mut units = ( 0..4 ).map(| index | {
			let name = format!( "Base{index}" );
			SourceUnit::from_source( &name, ticker( &name ))
		}).collect::<Vec<_>>();
		units.extend(( 0..3 ).map(| index | dependent( &format!( "Dependent{index}" ), &format!( "Base{index}" ))));
		let units = order.iter().map(| index | units[*index].clone() ).collect::<Vec<_>>();

		let batches = runtime.subscribe_batches();
		runtime.load_batch( units );
		settle( &runtime );

		let report = batches.try_recv().expect( "Batch did not report" );
		assert!( report.is_success(), "Batch failed: {:#?}", report );

		let independent = report.units().iter().filter(| unit | unit.unit().starts_with( "Base" )).collect::<Vec<_>>();
		let last_finished = independent.iter().map(| unit | unit.finished() ).max().expect( "no independent units" );
		let first_finished = independent.iter().map(| unit | unit.finished() ).min().expect( "no independent units" );

		for unit in &independent {
			let started = unit.compile_started().expect( "independent unit never compiled" );
			assert!( started <= first_finished, "{} waited on another unit", unit.unit() );
		}

		for unit in report.units().iter().filter(| unit | unit.unit().starts_with( "Dependent" )) {
			let started = unit.compile_started().expect( "dependent unit never compiled" );
			assert!( started >= last_finished, "{} compiled before the dependency-free units finished", unit.unit() );
		}

	}

}

#[test]
fn dependency_of_a_dependency_in_the_same_batch_is_missing() {

	let runtime = runtime();
	runtime.load_batch( vec![
		SourceUnit::from_source( "Root", ticker( "Root" )),
		dependent( "Middle", "Root" ),
		dependent( "Leaf", "Middle" ),
	]);
	settle( &runtime );

	assert_ready!( runtime, "Root", "Middle" );
	let leaf = runtime.status( "Leaf" ).expect( "Leaf has no status" );
	assert!( matches!( leaf.error(), Some( wasm_hotload::LoadError::MissingDependency( missing )) if missing.first() == "Middle" ));

	// Across batches the dependency is already ready
	runtime.load( dependent( "Leaf", "Middle" ));
	settle( &runtime );
	assert_ready!( runtime, "Leaf" );

}
