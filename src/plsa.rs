// Two-sided probabilistic latent semantic analysis (PLSA)

use std::collections::HashSet;

use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{PlsaError, Result};

/// Seed for the initial parameter draw. Fixed so repeated construction
/// with identical inputs yields identical starting tables.
const DEFAULT_SEED: u64 = 2020;

/// Hard cap on EM sweeps per `train()` call.
const DEFAULT_MAX_SWEEPS: usize = 10;

/// Relative log-likelihood change below which training stops.
const DEFAULT_FINISH_RATIO: f64 = 1.0e-5;

/// Sentinel for the previous log-likelihood before any sweep has run.
/// Large enough that the first sweep's ratio never triggers early
/// stopping.
const PREV_LLH_SENTINEL: f64 = 100000.0;

/// Two-sided PLSA estimator.
///
/// Fits a K-class latent mixture to discrete (user, item) co-occurrence
/// observations by expectation-maximization:
///
/// ```text
/// P(u, i) = sum_z P(z) P(u | z) P(i | z)
/// ```
///
/// The estimator owns all parameter tables. Construction validates the
/// observation set and draws random starting tables from a seeded
/// ChaCha8 stream; [`train`](Plsa::train) then mutates the tables in
/// place, one EM sweep at a time, until the relative log-likelihood
/// change falls below `finish_ratio` or the sweep cap is hit. Calling
/// `train` again continues from the current tables rather than
/// restarting.
///
/// # Examples
///
/// ```
/// use plsa::Plsa;
///
/// let mut model = Plsa::new(vec![0, 0, 1, 1], vec![0, 1, 0, 1], 2)
///     .unwrap()
///     .with_max_sweeps(20);
/// model.train();
///
/// let pz_u = model.pz_given_user().unwrap();
/// assert_eq!(pz_u.nrows(), 2);
/// ```
#[derive(Debug)]
pub struct Plsa {
    /// User index per observation, dense in `0..n_uniq_users`.
    users: Vec<usize>,
    /// Item index per observation, dense in `0..n_uniq_items`.
    items: Vec<usize>,
    n_data: usize,
    n_uniq_users: usize,
    n_uniq_items: usize,
    n_class: usize,
    /// Model degrees of freedom: (K - 1) + K * n_users + K * n_items.
    n_parameters: usize,

    seed: u64,
    max_sweeps: usize,
    finish_ratio: f64,

    /// Log-likelihood after the most recent completed sweep.
    /// `None` until `train` has run at least one sweep.
    llh: Option<f64>,
    /// Log-likelihood of the last non-stopping sweep, persisted across
    /// `train` calls for continue-training.
    prev_llh: f64,

    /// Class prior P(z). Shape: (K).
    pz: Array1<f64>,
    /// P(user | z). Shape: (n_uniq_users, K); columns sum to 1.
    pu_z: Array2<f64>,
    /// P(item | z). Shape: (n_uniq_items, K); columns sum to 1.
    pi_z: Array2<f64>,
    /// Scratch: per-observation unnormalized log-joint. Shape: (n_data, K).
    puiz: Array2<f64>,
    /// Scratch: per-observation posterior P(z | u, i). Shape: (n_data, K).
    pz_ui: Array2<f64>,
}

impl Plsa {
    /// Creates an estimator for the given observation set and class count.
    ///
    /// `users` and `items` are parallel sequences, one entry per observed
    /// co-occurrence; repeats are meaningful (each is a count of 1). Both
    /// sides must use dense indices `0..n_uniq`, where `n_uniq` is the
    /// number of distinct values appearing on that side.
    ///
    /// Starting tables are drawn from the default seed; use
    /// [`with_seed`](Plsa::with_seed) to redraw from another.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `n_class` is zero ([`PlsaError::InvalidClassCount`]),
    /// - the sequences differ in length ([`PlsaError::DimensionMismatch`]),
    /// - the observation set is empty ([`PlsaError::EmptyInput`]),
    /// - any index is not dense in `0..n_uniq` for its side
    ///   ([`PlsaError::IndexOutOfRange`]).
    pub fn new(users: Vec<usize>, items: Vec<usize>, n_class: usize) -> Result<Self> {
        if n_class < 1 {
            return Err(PlsaError::InvalidClassCount(n_class));
        }
        if users.len() != items.len() {
            return Err(PlsaError::DimensionMismatch {
                users: users.len(),
                items: items.len(),
            });
        }
        if users.is_empty() {
            return Err(PlsaError::EmptyInput);
        }

        let n_uniq_users = distinct_count(&users);
        let n_uniq_items = distinct_count(&items);
        check_dense_indices(&users, n_uniq_users, "user")?;
        check_dense_indices(&items, n_uniq_items, "item")?;

        let n_data = users.len();
        let n_parameters = (n_class - 1) + n_class * n_uniq_users + n_class * n_uniq_items;

        debug!(
            "PLSA setup: n_data {} | n_uniq_users {} | n_uniq_items {} | n_class {}",
            n_data, n_uniq_users, n_uniq_items, n_class
        );

        let mut model = Self {
            users,
            items,
            n_data,
            n_uniq_users,
            n_uniq_items,
            n_class,
            n_parameters,
            seed: DEFAULT_SEED,
            max_sweeps: DEFAULT_MAX_SWEEPS,
            finish_ratio: DEFAULT_FINISH_RATIO,
            llh: None,
            prev_llh: PREV_LLH_SENTINEL,
            pz: Array1::zeros(n_class),
            pu_z: Array2::zeros((n_uniq_users, n_class)),
            pi_z: Array2::zeros((n_uniq_items, n_class)),
            puiz: Array2::zeros((n_data, n_class)),
            pz_ui: Array2::zeros((n_data, n_class)),
        };
        model.draw_initial_tables();
        Ok(model)
    }

    /// Redraws the starting parameter tables from `seed` and resets the
    /// training state. Intended for configuration before the first
    /// `train` call; calling it later discards the fitted tables.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.llh = None;
        self.prev_llh = PREV_LLH_SENTINEL;
        self.draw_initial_tables();
        self
    }

    /// Sets the hard cap on EM sweeps per `train` call (default 10).
    pub fn with_max_sweeps(mut self, max_sweeps: usize) -> Self {
        self.max_sweeps = max_sweeps;
        self
    }

    /// Sets the convergence threshold on the relative log-likelihood
    /// change (default 1.0e-5). Tighter values run more sweeps before
    /// stopping.
    pub fn with_finish_ratio(mut self, finish_ratio: f64) -> Self {
        self.finish_ratio = finish_ratio;
        self
    }

    /// Runs EM sweeps until the relative log-likelihood change drops
    /// below `finish_ratio` or `max_sweeps` sweeps have run.
    ///
    /// Each sweep is one E-step (posterior over classes per
    /// observation), one M-step (re-estimate `P(z)`, `P(u|z)`,
    /// `P(i|z)`), and one log-likelihood evaluation against the updated
    /// tables. One `info!` line is logged per sweep.
    ///
    /// Two numerical policies are deliberate and load-bearing for
    /// output parity with the reference estimator:
    ///
    /// - E-step posterior entries that come out NaN (all exponentials
    ///   underflowed, 0/0) or infinite are clamped to `0.0` with no
    ///   renormalization of the row, so a pathological observation can
    ///   carry an all-zero posterior.
    /// - The M-step divisions by `n_data * P(z=k)` are unguarded. A
    ///   collapsed class (`P(z=k) == 0`) propagates `inf`/`NaN` into
    ///   that class's conditional columns, and from there into the
    ///   reported statistics.
    ///
    /// Calling `train` on an already-trained model continues from the
    /// current tables.
    pub fn train(&mut self) {
        self.train_with_progress(|_, _, _| {});
    }

    /// Like [`train`](Plsa::train), invoking `progress` once per
    /// completed sweep with `(sweep_index, llh, ratio)`.
    pub fn train_with_progress(&mut self, mut progress: impl FnMut(usize, f64, f64)) {
        for sweep in 0..self.max_sweeps {
            self.em_sweep();
            let llh = self.log_likelihood_pass();
            let ratio = ((llh - self.prev_llh) / self.prev_llh).abs();

            info!("EM sweep {} | llh {} | ratio {}", sweep + 1, llh, ratio);
            progress(sweep, llh, ratio);
            self.llh = Some(llh);

            // NaN ratios (0/0 on a flat likelihood) never stop early;
            // the sweep cap terminates those runs.
            if ratio < self.finish_ratio {
                break;
            }
            self.prev_llh = llh;
        }
    }

    /// One EM sweep: posterior per observation, then table re-estimation.
    fn em_sweep(&mut self) {
        // E-step: row-normalized exp of the log-joint, non-finite
        // entries clamped to zero (no renormalization afterwards).
        self.fill_log_joint();
        for n in 0..self.n_data {
            let mut row_sum = 0.0;
            for k in 0..self.n_class {
                row_sum += self.puiz[[n, k]].exp();
            }
            for k in 0..self.n_class {
                let p = self.puiz[[n, k]].exp() / row_sum;
                self.pz_ui[[n, k]] = if p.is_finite() { p } else { 0.0 };
            }
        }

        // M-step. The prior must be fully updated first: both
        // conditional updates divide by the new P(z).
        self.pz = self.pz_ui.sum_axis(Axis(0)) / self.n_data as f64;

        self.pu_z.fill(0.0);
        for n in 0..self.n_data {
            let u = self.users[n];
            for k in 0..self.n_class {
                self.pu_z[[u, k]] += self.pz_ui[[n, k]];
            }
        }
        scale_columns_by_inverse(&mut self.pu_z, &self.pz, self.n_data);

        self.pi_z.fill(0.0);
        for n in 0..self.n_data {
            let i = self.items[n];
            for k in 0..self.n_class {
                self.pi_z[[i, k]] += self.pz_ui[[n, k]];
            }
        }
        scale_columns_by_inverse(&mut self.pi_z, &self.pz, self.n_data);
    }

    /// Fills `puiz` with the unnormalized log-joint
    /// `log P(z) + log P(u_n | z) + log P(i_n | z)` per observation.
    fn fill_log_joint(&mut self) {
        for n in 0..self.n_data {
            let u = self.users[n];
            let i = self.items[n];
            for k in 0..self.n_class {
                self.puiz[[n, k]] =
                    self.pz[k].ln() + self.pu_z[[u, k]].ln() + self.pi_z[[i, k]].ln();
            }
        }
    }

    /// Total log-likelihood of the observation set under the current
    /// tables: `sum_n ln sum_k exp(puiz[n, k])`. Recomputes the
    /// log-joint from the post-update tables, so this is one extra
    /// E-step-equivalent pass per sweep.
    fn log_likelihood_pass(&mut self) -> f64 {
        self.fill_log_joint();
        let mut llh = 0.0;
        for n in 0..self.n_data {
            let mut row_sum = 0.0;
            for k in 0..self.n_class {
                row_sum += self.puiz[[n, k]].exp();
            }
            llh += row_sum.ln();
        }
        llh
    }

    /// Posterior class membership per user, `P(z | u)`, by Bayes' rule
    /// over the fitted tables. Shape: (n_uniq_users, K); each row sums
    /// to 1 unless a collapsed class left zeros in `P(z)`.
    ///
    /// # Errors
    ///
    /// [`PlsaError::NotTrained`] if no training sweep has completed.
    pub fn pz_given_user(&self) -> Result<Array2<f64>> {
        self.ensure_trained()?;
        Ok(bayes_rows(&self.pu_z, &self.pz))
    }

    /// Posterior class membership per item, `P(z | i)`.
    ///
    /// # Errors
    ///
    /// [`PlsaError::NotTrained`] if no training sweep has completed.
    pub fn pz_given_item(&self) -> Result<Array2<f64>> {
        self.ensure_trained()?;
        Ok(bayes_rows(&self.pi_z, &self.pz))
    }

    /// Akaike information criterion: `-2 llh + 2 n_parameters`.
    ///
    /// # Errors
    ///
    /// [`PlsaError::NotTrained`] if no training sweep has completed.
    pub fn aic(&self) -> Result<f64> {
        let llh = self.ensure_trained()?;
        Ok(-2.0 * llh + 2.0 * self.n_parameters as f64)
    }

    /// Bayesian information criterion: `-2 llh + n_parameters ln(n_data)`.
    ///
    /// # Errors
    ///
    /// [`PlsaError::NotTrained`] if no training sweep has completed.
    pub fn bic(&self) -> Result<f64> {
        let llh = self.ensure_trained()?;
        Ok(-2.0 * llh + self.n_parameters as f64 * (self.n_data as f64).ln())
    }

    /// Log-likelihood after the most recent sweep, or `None` before
    /// training.
    pub fn log_likelihood(&self) -> Option<f64> {
        self.llh
    }

    /// Fitted class prior `P(z)`. Shape: (K).
    pub fn pz(&self) -> ArrayView1<f64> {
        self.pz.view()
    }

    /// Fitted conditional `P(u | z)`. Shape: (n_uniq_users, K).
    pub fn pu_z(&self) -> ArrayView2<f64> {
        self.pu_z.view()
    }

    /// Fitted conditional `P(i | z)`. Shape: (n_uniq_items, K).
    pub fn pi_z(&self) -> ArrayView2<f64> {
        self.pi_z.view()
    }

    /// Model degrees of freedom used by AIC/BIC.
    pub fn n_parameters(&self) -> usize {
        self.n_parameters
    }

    /// Number of latent classes K.
    pub fn n_classes(&self) -> usize {
        self.n_class
    }

    /// Number of observations.
    pub fn n_observations(&self) -> usize {
        self.n_data
    }

    /// Number of distinct users in the observation set.
    pub fn n_users(&self) -> usize {
        self.n_uniq_users
    }

    /// Number of distinct items in the observation set.
    pub fn n_items(&self) -> usize {
        self.n_uniq_items
    }

    fn ensure_trained(&self) -> Result<f64> {
        self.llh.ok_or(PlsaError::NotTrained)
    }

    /// Draws `Pz`, `Pu_z`, `Pi_z` uniform over [0, 1) from one seeded
    /// stream (in that order), then normalizes: the prior by its sum,
    /// the conditionals column by column.
    fn draw_initial_tables(&mut self) {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let unit = Uniform::new(0.0, 1.0);

        let mut pz = Array1::random_using(self.n_class, unit, &mut rng);
        let total = pz.sum();
        pz /= total;
        self.pz = pz;

        self.pu_z = Array2::random_using((self.n_uniq_users, self.n_class), unit, &mut rng);
        normalize_columns(&mut self.pu_z);

        self.pi_z = Array2::random_using((self.n_uniq_items, self.n_class), unit, &mut rng);
        normalize_columns(&mut self.pi_z);
    }
}

/// Number of distinct values in an index sequence.
fn distinct_count(indices: &[usize]) -> usize {
    indices.iter().collect::<HashSet<_>>().len()
}

/// Verifies every index is below the distinct-value count, i.e. the
/// sequence is dense in `0..n_uniq`. Training indexes the conditional
/// tables directly, so this is the only bounds check.
fn check_dense_indices(indices: &[usize], n_uniq: usize, side: &'static str) -> Result<()> {
    for (position, &index) in indices.iter().enumerate() {
        if index >= n_uniq {
            return Err(PlsaError::IndexOutOfRange {
                side,
                index,
                position,
                n_uniq,
            });
        }
    }
    Ok(())
}

/// Divides each column of `table` by that column's sum, making every
/// per-class conditional a proper distribution.
fn normalize_columns(table: &mut Array2<f64>) {
    for mut column in table.columns_mut() {
        let total = column.sum();
        column /= total;
    }
}

/// Divides column k of `table` by `n_data * pz[k]`. Deliberately
/// unguarded: a zero prior entry propagates inf/NaN into its column.
fn scale_columns_by_inverse(table: &mut Array2<f64>, pz: &Array1<f64>, n_data: usize) {
    for (k, mut column) in table.columns_mut().into_iter().enumerate() {
        let denom = n_data as f64 * pz[k];
        column /= denom;
    }
}

/// Bayes' rule per row: `P(z | x) = P(x | z) P(z) / sum_z P(x | z) P(z)`.
fn bayes_rows(px_z: &Array2<f64>, pz: &Array1<f64>) -> Array2<f64> {
    let weighted = px_z * pz;
    let row_sums = weighted.sum_axis(Axis(1));
    &weighted / &row_sums.insert_axis(Axis(1))
}
