//! Physical constants in SI units, for use in input expressions

pub const SPEED_OF_LIGHT: f64 = 299792458.0;
pub const ELEMENTARY_CHARGE: f64 = 1.602176634e-19;
pub const ELECTRON_MASS: f64 = 9.1093837015e-31;
pub const PROTON_MASS: f64 = 1.67262192369e-27;
pub const VACUUM_PERMITTIVITY: f64 = 8.8541878128e-12;
pub const VACUUM_PERMEABILITY: f64 = 1.25663706212e-6;
pub const BOLTZMANN_CONSTANT: f64 = 1.380649e-23;
