/// Holds the Boltzmann constant (J/K)
pub const BOLTZMANN: f64 = 1.380649e-23;

/// Holds the default tolerance for the Newton solver
pub const DEFAULT_NEWTON_TOL: f64 = 1e-8;

/// Holds the default maximum number of Newton iterations
pub const DEFAULT_NEWTON_MITER: usize = 50;

/// Holds the default tolerance for the discrete Kuhn-Tucker feasibility check
pub const DEFAULT_KT_TOL: f64 = 1e-2;

/// Holds the default maximum number of step subdivisions for adaptive substepping
///
/// The total number of substeps is bounded by `2^max_divide`.
pub const DEFAULT_MAX_DIVIDE: usize = 8;

/// Holds the maximum number of step-halving line-search cuts per Newton iteration
pub const LINE_SEARCH_DEPTH: usize = 8;
