use crate::{LinearProgram, LpBackend, LpSolution, SolverError, allocate, clear_call_market};
use clarabel::{algebra::*, solver::*};
use dam_core::ports::{
    AllocationOutcome, AllocationRequest, Allocator, CallMarket, CallMarketOutcome,
    CallMarketRequest,
};
use tracing::{Level, event};

/// A solver implementation that uses the Clarabel interior point solver.
pub struct ClarabelSolver(DefaultSettings<f64>);

impl Default for ClarabelSolver {
    fn default() -> Self {
        let mut settings = DefaultSettings::default();
        settings.verbose = false;
        Self(settings)
    }
}

impl ClarabelSolver {
    /// Construct a solver with explicit settings
    pub fn new(settings: DefaultSettings<f64>) -> Self {
        Self(settings)
    }
}

impl LpBackend for ClarabelSolver {
    fn solve_lp(&self, program: &LinearProgram) -> Result<LpSolution, SolverError> {
        let nzero = program.nrows();
        let n = program.ncols();

        // Clarabel handles constraints via a cone specification, e.g. Ax + s = b, where s is a cone.
        // The equality rows come first and use the zero cone.
        let mut b = program.rhs().to_vec();
        let mut cones = vec![ZeroConeT(nzero)];

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

            // The box constraints are appended as nonnegative slack rows, so
            // the lower bound is written as -x + s = -lower.
            if column.lower.is_finite() {
                a_nzval.push(-1.0);
                a_rowval.push(b.len());
                b.push(-column.lower);
            }
            if column.upper.is_finite() {
                a_nzval.push(1.0);
                a_rowval.push(b.len());
                b.push(column.upper);
            }
        }
        a_colptr.push(a_nzval.len());

        if b.len() > nzero {
            cones.push(NonnegativeConeT(b.len() - nzero));
        }

        let a_matrix = CscMatrix {
            m: b.len(),
            n,
            colptr: a_colptr,
            rowval: a_rowval,
            nzval: a_nzval,
        };

        // The objective is purely linear
        let p_matrix = CscMatrix {
            m: n,
            n,
            colptr: vec![0; n + 1],
            rowval: Vec::new(),
            nzval: Vec::new(),
        };

        let mut solver = DefaultSolver::new(&p_matrix, &q, &a_matrix, &b, &cones, self.0.clone())
            .map_err(|err| SolverError::Setup {
                backend: "clarabel",
                reason: format!("{err:?}"),
            })?;
        solver.solve();

        match solver.solution.status {
            SolverStatus::Solved => {}
            SolverStatus::AlmostSolved => {
                event!(Level::WARN, "clarabel returned an inaccurate solution");
            }
            status => {
                return Err(SolverError::NotSolved {
                    backend: "clarabel",
                    status: format!("{status:?}"),
                });
            }
        }

        // Clarabel's duals satisfy q + Aᵀz = 0, so the sensitivity of the
        // objective to the right-hand side is -z.
        Ok(LpSolution {
            x: solver.solution.x[..n].to_vec(),
            shadow_prices: solver.solution.z[..nzero].iter().map(|z| -z).collect(),
        })
    }
}

impl Allocator for ClarabelSolver {
    type Error = SolverError;

    async fn solve(&self, request: AllocationRequest) -> Result<AllocationOutcome, Self::Error> {
        allocate(self, &request)
    }
}

impl CallMarket for ClarabelSolver {
    type Error = SolverError;

    async fn clear(&self, request: CallMarketRequest) -> Result<CallMarketOutcome, Self::Error> {
        clear_call_market(self, &request)
    }
}
