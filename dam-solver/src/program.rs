use crate::SolverError;

/// A decision variable of a [`LinearProgram`].
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    /// The objective coefficient (minimized)
    pub cost: f64,
    /// The lower bound; may be `-inf`
    pub lower: f64,
    /// The upper bound; may be `+inf`
    pub upper: f64,
    /// The (row, coefficient) pairs, sorted by row
    pub entries: Vec<(usize, f64)>,
}

/// A linear program in equality form:
///
/// minimize `cᵀx` subject to `Ax = rhs` and `lower ≤ x ≤ upper`.
///
/// The matrix is stored column-wise, which is how both backends consume it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinearProgram {
    rhs: Vec<f64>,
    columns: Vec<Column>,
}

impl LinearProgram {
    /// Append an equality row, returning its index
    pub fn add_row(&mut self, rhs: f64) -> usize {
        self.rhs.push(rhs);
        self.rhs.len() - 1
    }

    /// Shift the right-hand side of an existing row
    pub fn shift_rhs(&mut self, row: usize, delta: f64) {
        self.rhs[row] += delta;
    }

    /// Append a variable, returning its index. Entries with repeated rows are
    /// summed.
    pub fn add_column(
        &mut self,
        cost: f64,
        lower: f64,
        upper: f64,
        entries: impl IntoIterator<Item = (usize, f64)>,
    ) -> usize {
        let mut entries = entries.into_iter().collect::<Vec<_>>();
        entries.sort_by_key(|(row, _)| *row);
        entries.dedup_by(|next, kept| {
            if next.0 == kept.0 {
                kept.1 += next.1;
                true
            } else {
                false
            }
        });
        self.columns.push(Column {
            cost,
            lower,
            upper,
            entries,
        });
        self.columns.len() - 1
    }

    /// The right-hand side of the equality rows
    pub fn rhs(&self) -> &[f64] {
        &self.rhs
    }

    /// The variables
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The number of equality rows
    pub fn nrows(&self) -> usize {
        self.rhs.len()
    }

    /// The number of variables
    pub fn ncols(&self) -> usize {
        self.columns.len()
    }
}

/// The primal and dual solution of a [`LinearProgram`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LpSolution {
    /// The value of each variable
    pub x: Vec<f64>,
    /// The marginal change of the optimal objective per unit increase of each
    /// equality row's right-hand side
    pub shadow_prices: Vec<f64>,
}

/// A convex solver able to solve a [`LinearProgram`].
pub trait LpBackend: Send + Sync {
    /// Solve the program to optimality
    fn solve_lp(&self, program: &LinearProgram) -> Result<LpSolution, SolverError>;
}
