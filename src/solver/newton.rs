use crate::base::{Error, LINE_SEARCH_DEPTH};
use russell_lab::{solve_lin_sys, vec_add, vec_copy, vec_norm, Matrix, Norm, Vector};

/// Defines a square nonlinear system R(x) = 0 with an analytic Jacobian
pub trait NonlinearSystem {
    /// Returns the number of unknowns
    fn dim(&self) -> usize;

    /// Computes the residual R(x) and the Jacobian J(x) = dR/dx
    fn residual_jacobian(&mut self, x: &Vector, rr: &mut Vector, jj: &mut Matrix) -> Result<(), Error>;
}

/// Solves R(x) = 0 by damped Newton iterations with an analytic Jacobian
///
/// Each iteration solves `J δ = -R` by dense LU with partial pivoting and
/// takes the full step; when the residual norm grows, the step is halved up
/// to a fixed depth. Convergence is detected on `‖R‖ < tol` or on a relative
/// step size `‖δ‖/max(‖x‖, 1) < tol`. Returns the number of iterations.
///
/// # Errors
///
/// * [Error::LinalgFailure] when the LU factorization fails (singular Jacobian)
/// * [Error::MaxIterations] when the budget `miter` is exhausted
pub fn newton_solve<S: NonlinearSystem>(
    system: &mut S,
    x: &mut Vector,
    tol: f64,
    miter: usize,
    verbose: bool,
) -> Result<usize, Error> {
    let n = system.dim();
    let mut rr = Vector::new(n);
    let mut jj = Matrix::new(n, n);
    let mut aa = Matrix::new(n, n);
    let mut delta = Vector::new(n);
    let mut x_new = Vector::new(n);

    system.residual_jacobian(x, &mut rr, &mut jj)?;
    let mut norm_rr = vec_norm(&rr, Norm::Euc);

    if verbose {
        println!("{:>5} {:>23} {:>23}", "it", "‖R‖", "‖δ‖");
        println!("{:>5} {:>23.15e} {:>23}", 0, norm_rr, "-");
    }

    for it in 0..miter {
        if norm_rr < tol {
            return Ok(it);
        }

        // solve J δ = -R
        for i in 0..n {
            delta[i] = -rr[i];
        }
        for i in 0..n {
            for j in 0..n {
                aa.set(i, j, jj.get(i, j));
            }
        }
        solve_lin_sys(&mut delta, &mut aa).map_err(|_| Error::LinalgFailure)?;
        let norm_delta = vec_norm(&delta, Norm::Euc);

        // full step, then halve while the residual grows
        let mut factor = 1.0;
        vec_add(&mut x_new, 1.0, x, factor, &delta).unwrap();
        system.residual_jacobian(&x_new, &mut rr, &mut jj)?;
        let mut norm_new = vec_norm(&rr, Norm::Euc);
        let mut cuts = 0;
        while norm_new > norm_rr && cuts < LINE_SEARCH_DEPTH {
            factor /= 2.0;
            cuts += 1;
            vec_add(&mut x_new, 1.0, x, factor, &delta).unwrap();
            system.residual_jacobian(&x_new, &mut rr, &mut jj)?;
            norm_new = vec_norm(&rr, Norm::Euc);
        }
        vec_copy(x, &x_new).unwrap();
        norm_rr = norm_new;

        if verbose {
            println!("{:>5} {:>23.15e} {:>23.15e}", it + 1, norm_rr, factor * norm_delta);
        }

        // small relative step
        let norm_x = f64::max(vec_norm(x, Norm::Euc), 1.0);
        if factor * norm_delta / norm_x < tol {
            return Ok(it + 1);
        }
    }

    if norm_rr < tol {
        return Ok(miter);
    }
    Err(Error::MaxIterations)
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{newton_solve, NonlinearSystem};
    use crate::base::Error;
    use russell_lab::{approx_eq, Matrix, Vector};

    // R = [x² + y² - 4, x - y]
    struct Circle {}

    impl NonlinearSystem for Circle {
        fn dim(&self) -> usize {
            2
        }
        fn residual_jacobian(&mut self, x: &Vector, rr: &mut Vector, jj: &mut Matrix) -> Result<(), Error> {
            rr[0] = x[0] * x[0] + x[1] * x[1] - 4.0;
            rr[1] = x[0] - x[1];
            jj.set(0, 0, 2.0 * x[0]);
            jj.set(0, 1, 2.0 * x[1]);
            jj.set(1, 0, 1.0);
            jj.set(1, 1, -1.0);
            Ok(())
        }
    }

    #[test]
    fn newton_solve_works() {
        let mut system = Circle {};
        let mut x = Vector::from(&[1.0, 0.5]);
        let iterations = newton_solve(&mut system, &mut x, 1e-12, 20, false).unwrap();
        assert!(iterations > 0);
        approx_eq(x[0], f64::sqrt(2.0), 1e-10);
        approx_eq(x[1], f64::sqrt(2.0), 1e-10);
    }

    // R = x³ - x - 3 has a wild full Newton step from x = 0.6; line search tames it
    struct Cubic {}

    impl NonlinearSystem for Cubic {
        fn dim(&self) -> usize {
            1
        }
        fn residual_jacobian(&mut self, x: &Vector, rr: &mut Vector, jj: &mut Matrix) -> Result<(), Error> {
            rr[0] = x[0] * x[0] * x[0] - x[0] - 3.0;
            jj.set(0, 0, 3.0 * x[0] * x[0] - 1.0);
            Ok(())
        }
    }

    #[test]
    fn line_search_helps_convergence() {
        let mut system = Cubic {};
        let mut x = Vector::from(&[0.6]);
        newton_solve(&mut system, &mut x, 1e-12, 50, false).unwrap();
        approx_eq(x[0] * x[0] * x[0] - x[0] - 3.0, 0.0, 1e-10);
    }

    // singular Jacobian
    struct Singular {}

    impl NonlinearSystem for Singular {
        fn dim(&self) -> usize {
            2
        }
        fn residual_jacobian(&mut self, x: &Vector, rr: &mut Vector, jj: &mut Matrix) -> Result<(), Error> {
            rr[0] = x[0] + x[1] - 1.0;
            rr[1] = 2.0 * x[0] + 2.0 * x[1] - 2.0;
            jj.set(0, 0, 1.0);
            jj.set(0, 1, 1.0);
            jj.set(1, 0, 2.0);
            jj.set(1, 1, 2.0);
            Ok(())
        }
    }

    #[test]
    fn singular_jacobian_captures_linalg_failure() {
        let mut system = Singular {};
        let mut x = Vector::from(&[10.0, 10.0]);
        assert_eq!(
            newton_solve(&mut system, &mut x, 1e-12, 20, false).err(),
            Some(Error::LinalgFailure)
        );
    }

    // R = atan(x) with a far initial guess diverges within a tiny budget
    struct Flat {}

    impl NonlinearSystem for Flat {
        fn dim(&self) -> usize {
            1
        }
        fn residual_jacobian(&mut self, x: &Vector, rr: &mut Vector, jj: &mut Matrix) -> Result<(), Error> {
            rr[0] = f64::atan(x[0]) + 1.0;
            jj.set(0, 0, 1.0 / (1.0 + x[0] * x[0]));
            Ok(())
        }
    }

    #[test]
    fn iteration_budget_captures_max_iterations() {
        let mut system = Flat {};
        let mut x = Vector::from(&[1000.0]);
        assert_eq!(
            newton_solve(&mut system, &mut x, 1e-14, 2, false).err(),
            Some(Error::MaxIterations)
        );
    }
}
