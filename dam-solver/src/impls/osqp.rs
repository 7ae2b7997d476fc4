use crate::{LinearProgram, LpBackend, LpSolution, SolverError, allocate, clear_call_market};
use dam_core::ports::{
    AllocationOutcome, AllocationRequest, Allocator, CallMarket, CallMarketOutcome,
    CallMarketRequest,
};
use osqp::{CscMatrix, Problem, Settings, Status};
use tracing::{Level, event};

/// A solver implementation that uses the OSQP (Operator Splitting Quadratic Program)
/// solver.
///
/// OSQP uses the Alternating Direction Method of Multipliers (ADMM) approach,
/// which can be faster than interior point methods for large-scale problems,
/// though sometimes with lower precision. The default settings tighten the
/// tolerances and polish the solution, since prices are read from the duals.
pub struct OsqpSolver(Settings);

impl Default for OsqpSolver {
    fn default() -> Self {
        Self(
            Settings::default()
                .verbose(false)
                .polish(true)
                .eps_abs(1e-7)
                .eps_rel(1e-7)
                .max_iter(200_000),
        )
    }
}

impl OsqpSolver {
    /// Construct a solver with explicit settings
    pub fn new(settings: Settings) -> Self {
        Self(settings)
    }
}

impl LpBackend for OsqpSolver {
    fn solve_lp(&self, program: &LinearProgram) -> Result<LpSolution, SolverError> {
        let nzero = program.nrows();
        let n = program.ncols();

        // OSQP handles constraints via a box specification, e.g. lb <= Ax <= ub,
        // where equality is handled via setting lb[i] = ub[i].
        let mut lb = program.rhs().to_vec();
        let mut ub = program.rhs().to_vec();

        let mut q = Vec::with_capacity(n);
        let mut a_nzval = Vec::new();
        let mut a_rowval = Vec::new();
        let mut a_colptr = Vec::with_capacity(n + 1);

        for column in program.columns() {
            q.push(column.cost);
            a_colptr.push(a_nzval.len());

            for &(row, coef) in column.entries.iter() {
                a_nzval.push(coef);
                a_rowval.push(row);
            }

            if column.lower.is_finite() || column.upper.is_finite() {
                a_nzval.push(1.0);
                a_rowval.push(lb.len());
                lb.push(column.lower);
                ub.push(column.upper);
            }
        }
        a_colptr.push(a_nzval.len());

        let m = lb.len();

        let a_matrix = CscMatrix {
            nrows: m,
            ncols: n,
            indptr: a_colptr.into(),
            indices: a_rowval.into(),
            data: a_nzval.into(),
        };

        // The objective is purely linear
        let p_matrix = CscMatrix {
            nrows: n,
            ncols: n,
            indptr: vec![0usize; n + 1].into(),
            indices: Vec::<usize>::new().into(),
            data: Vec::<f64>::new().into(),
        };

        let mut problem = Problem::new(&p_matrix, &q, &a_matrix, &lb, &ub, &self.0).map_err(
            |err| SolverError::Setup {
                backend: "osqp",
                reason: format!("{err:?}"),
            },
        )?;

        let solution = match problem.solve() {
            Status::Solved(solution) => solution,
            Status::SolvedInaccurate(solution) => {
                event!(Level::WARN, "osqp returned an inaccurate solution");
                solution
            }
            _ => {
                return Err(SolverError::NotSolved {
                    backend: "osqp",
                    status: "terminated without a solution".to_owned(),
                });
            }
        };

        // Like Clarabel, OSQP's duals satisfy q + Aᵀy = 0.
        Ok(LpSolution {
            x: solution.x().to_vec(),
            shadow_prices: solution.y()[..nzero].iter().map(|y| -y).collect(),
        })
    }
}

impl Allocator for OsqpSolver {
    type Error = SolverError;

    async fn solve(&self, request: AllocationRequest) -> Result<AllocationOutcome, Self::Error> {
        allocate(self, &request)
    }
}

impl CallMarket for OsqpSolver {
    type Error = SolverError;

    async fn clear(&self, request: CallMarketRequest) -> Result<CallMarketOutcome, Self::Error> {
        clear_call_market(self, &request)
    }
}
