use crate::types::{ObjectScope, ObjectType, SourceKind, SpeciesKind, TimeParameter};
use crate::MSX;
use rstest::fixture;

pub fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}

/// Two junctions joined by one pipe, one bulk species, one constant.
/// Still open for configuration.
#[fixture]
pub fn single_pipe() -> MSX {
    let mut msx = MSX::new();
    msx.add_node("A").expect("ERROR ADDING NODE");
    msx.add_node("B").expect("ERROR ADDING NODE");
    msx.add_link("P1", "A", "B", 100.0, 12.0, 0.005)
        .expect("ERROR ADDING LINK");
    msx.add_species("CL2", SpeciesKind::Bulk, "MG/L", 1.0e-6, 1.0e-4)
        .expect("ERROR ADDING SPECIES");
    msx.add_coefficient(ObjectType::Constant, "K1", 0.1)
        .expect("ERROR ADDING CONSTANT");
    msx
}

/// The single pipe network initialized and running: water enters at A with
/// CL2 held at 1.0 and flows toward B at 0.5 cfs.
#[fixture]
pub fn flowing_pipe(mut single_pipe: MSX) -> MSX {
    single_pipe
        .set_time_parameter(TimeParameter::Duration, 3600)
        .unwrap();
    single_pipe.set_timestep(300).unwrap();
    single_pipe
        .add_quality(ObjectScope::Node, "CL2", 1.0, "A")
        .unwrap();
    single_pipe
        .add_source(SourceKind::Concen, "A", "CL2", 1.0, None)
        .unwrap();
    single_pipe.init().expect("ERROR INITIALIZING PROJECT");
    single_pipe.open_q().expect("ERROR OPENING QUALITY");
    single_pipe.init_q().expect("ERROR INITIALIZING QUALITY");
    single_pipe
        .set_hydraulics(&[-0.5, 0.5], &[100.0, 90.0], &[0.5])
        .expect("ERROR SETTING HYDRAULICS");
    single_pipe
}
