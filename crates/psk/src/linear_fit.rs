use crate::circular_deque::CircularDeque;

/// Number of updates between full rebuilds of the running sums. Rebuilding
/// cancels systematic floating point error in the incremental updates.
const RESYNC_INTERVAL: usize = 1 << 20;

/// Partial update for [`LinearFit::reset`]. Absent fields leave the
/// corresponding parameter unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct FitReset {
    /// New window length. Shrinking the window drops the oldest points.
    pub num_pts: Option<usize>,
    /// New sample rate. A changed rate rescales the x axis, so the stored
    /// history is cleared.
    pub sample_rate: Option<f64>,
    /// Wipe the stored history regardless of the other fields.
    pub clear_history: bool,
}

/// Windowed linear least-squares fit for uniformly sampled data.
///
/// Pass in one data point at a time with [`LinearFit::next`]; the fitted value
/// at the newest point given the current history is returned. Updates run in
/// O(1) once the window is full.
pub struct LinearFit {
    yvals: CircularDeque<f64>,
    m: f64,
    b: f64,
    y_sum: f64,
    xy_sum: f64,
    n: usize,
    xdelta: f64,
    denominator: f64,
    x_avg: f64,
    count: usize,
}

impl LinearFit {
    pub fn new(num_pts: usize, sample_rate: f64) -> Self {
        assert!(num_pts >= 1, "fit window must hold at least one point");
        assert!(sample_rate > 0.0, "sample rate must be positive");
        Self {
            yvals: CircularDeque::new(num_pts),
            m: 0.0,
            b: 0.0,
            y_sum: 0.0,
            xy_sum: 0.0,
            n: num_pts,
            xdelta: 1.0 / sample_rate,
            denominator: 1.0,
            x_avg: 0.0,
            count: 0,
        }
    }

    /// Number of points currently stored, at most the window length.
    pub fn len(&self) -> usize {
        self.yvals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.yvals.is_empty()
    }

    /// Slope of the current fit, in y units per second.
    pub fn slope(&self) -> f64 {
        self.m
    }

    /// Incorporates a new sample as the newest point and returns the fitted
    /// value at its x position. While the window is still filling the window
    /// grows; afterwards the oldest sample is evicted.
    pub fn next(&mut self, yval: f64) -> f64 {
        // Cope with systematic floating point math errors.
        if self.count == RESYNC_INTERVAL {
            self.reset(FitReset::default());
        }
        let steady_state = self.yvals.len() == self.n;
        if steady_state {
            // Evicting y0 and keeping the earliest point at x = 0 shifts the
            // whole x axis by one step:
            //   xy_sum' = sum(x[i-1]*y[i]) + new*(n-1)*xdelta
            //           = xy_sum - xdelta*(y1+...+y[n-1]) + new*(n-1)*xdelta
            // and y1+...+y[n-1] is exactly the post-eviction y_sum. The new
            // point's term is added below, outside the steady state check.
            self.y_sum -= self.yvals[0];
            self.yvals.drain_front(1);
            self.xy_sum -= self.xdelta * self.y_sum;
        }
        self.y_sum += yval;
        // The new point has not been pushed yet, so len is its index and this
        // multiplies by (n-1)*xdelta in steady state. This is intentional.
        self.xy_sum += yval * self.yvals.len() as f64 * self.xdelta;
        self.yvals.push_back(yval);

        if !steady_state {
            // The window grew, so the cached denominator is stale.
            self.recalculate_denominator();
        }
        self.count += 1;
        self.calculate_fit()
    }

    /// Applies a partial parameter update, rebuilds the running sums from the
    /// surviving history and returns the refitted current value.
    pub fn reset(&mut self, update: FitReset) -> f64 {
        let mut clear_history = update.clear_history;
        if let Some(sample_rate) = update.sample_rate {
            // History is useless once the x axis rescales.
            let new_xdelta = 1.0 / sample_rate;
            if self.xdelta != new_xdelta {
                self.xdelta = new_xdelta;
                clear_history = true;
            }
        }
        if clear_history {
            self.yvals.clear();
        }
        if let Some(num_pts) = update.num_pts {
            assert!(num_pts >= 1, "fit window must hold at least one point");
            if num_pts != self.n {
                self.n = num_pts;
                if self.yvals.len() > num_pts {
                    let excess = self.yvals.len() - num_pts;
                    self.yvals.drain_front(excess);
                }
            }
        }
        if self.yvals.capacity() != self.n {
            self.yvals.set_capacity(self.n);
        }

        // Recalculate the running sums directly from the stored history.
        self.y_sum = 0.0;
        self.xy_sum = 0.0;
        for (j, yval) in self.yvals.iter().enumerate() {
            self.y_sum += yval;
            self.xy_sum += j as f64 * self.xdelta * yval;
        }
        self.recalculate_denominator();
        self.count = 0;
        self.calculate_fit()
    }

    /// Subtracts a constant from every stored sample and from the fit state,
    /// then refits. Used for periodic phase wrapping.
    pub fn subtract_const(&mut self, yval: f64) -> f64 {
        for stored in self.yvals.iter_mut() {
            *stored -= yval;
        }
        self.reset(FitReset::default())
    }

    fn calculate_fit(&mut self) -> f64 {
        // The general least-squares line fit is
        //   numerator   = sum(xi*yi) - 1/n*sum(xi)*sum(yi)
        //   denominator = sum(xi^2) - 1/n*(sum(xi))^2
        //   m = numerator / denominator
        //   b = sum(y)/n - m*sum(x)/n
        // For regularly sampled data, xi = i*xdelta, the numerator reduces to
        //   sum(xi*yi) - xdelta*(n-1)/2*sum(yi)
        // and the denominator only depends on xdelta and n, so it is cached.
        let pts = self.yvals.len();
        if pts > 1 {
            let pts_m_1 = (pts - 1) as f64;
            self.m = (self.xy_sum - self.xdelta * pts_m_1 / 2.0 * self.y_sum) / self.denominator;
            self.b = self.y_sum / pts as f64 - self.m * self.x_avg;
            self.m * self.xdelta * pts_m_1 + self.b
        } else {
            self.m = 0.0;
            self.b = if pts == 0 { 0.0 } else { self.yvals[0] };
            self.b
        }
    }

    fn recalculate_denominator(&mut self) {
        let pts = self.yvals.len();
        if pts <= 1 {
            return;
        }
        let p = (pts - 1) as f64;
        let n = pts as f64;
        self.denominator =
            self.xdelta.powi(2) * (p.powi(3) / 3.0 + p.powi(2) / 2.0 + p / 6.0 - p.powi(2) * n / 4.0);
        self.x_avg = self.xdelta * p / 2.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    /// Straightforward fit over an explicit history, evaluated at the newest x.
    fn brute_force_fit(history: &[f64], xdelta: f64) -> f64 {
        let pts = history.len();
        if pts == 0 {
            return 0.0;
        }
        if pts == 1 {
            return history[0];
        }
        let n = pts as f64;
        let x_sum: f64 = (0..pts).map(|i| i as f64 * xdelta).sum();
        let y_sum: f64 = history.iter().sum();
        let xy_sum: f64 = history
            .iter()
            .enumerate()
            .map(|(i, y)| i as f64 * xdelta * y)
            .sum();
        let xx_sum: f64 = (0..pts).map(|i| (i as f64 * xdelta).powi(2)).sum();
        let m = (xy_sum - x_sum * y_sum / n) / (xx_sum - x_sum * x_sum / n);
        let b = y_sum / n - m * x_sum / n;
        m * (pts - 1) as f64 * xdelta + b
    }

    /// Deterministic wiggle so the fit is not degenerate.
    fn test_sample(i: usize) -> f64 {
        0.05 * i as f64 + ((i * 37) % 17) as f64 * 0.1 - 0.8
    }

    #[test]
    fn fit_of_a_line_returns_the_newest_point() {
        let sample_rate = 100.0;
        let xdelta = 1.0 / sample_rate;
        let mut fit = LinearFit::new(8, sample_rate);
        let mut latest = 0.0;
        for i in 0..20 {
            latest = fit.next(2.0 + 3.0 * i as f64 * xdelta);
        }
        assert!((latest - (2.0 + 3.0 * 19.0 * xdelta)).abs() < TOLERANCE);
        assert!((fit.slope() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn incremental_update_matches_rebuild() {
        let sample_rate = 250.0;
        let xdelta = 1.0 / sample_rate;
        let window = 8;
        let mut fit = LinearFit::new(window, sample_rate);
        let mut history: Vec<f64> = Vec::new();
        for i in 0..200 {
            let yval = test_sample(i);
            history.push(yval);
            if history.len() > window {
                history.remove(0);
            }
            let incremental = fit.next(yval);
            let rebuilt = brute_force_fit(&history, xdelta);
            assert!(
                (incremental - rebuilt).abs() < TOLERANCE,
                "diverged at sample {}: {} vs {}",
                i,
                incremental,
                rebuilt
            );
        }
    }

    #[test]
    fn degenerate_windows() {
        let mut fit = LinearFit::new(4, 1.0);
        assert_eq!(fit.reset(FitReset::default()), 0.0);
        let first = fit.next(1.5);
        assert!((first - 1.5).abs() < TOLERANCE);
        assert_eq!(fit.slope(), 0.0);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut fit = LinearFit::new(5, 10.0);
        for i in 0..12 {
            fit.next(test_sample(i));
        }
        let once = fit.reset(FitReset::default());
        let slope_once = fit.slope();
        let twice = fit.reset(FitReset::default());
        assert_eq!(once, twice);
        assert_eq!(slope_once, fit.slope());
        assert_eq!(fit.len(), 5);
    }

    #[test]
    fn shrinking_the_window_drops_the_oldest_points() {
        let xdelta = 1.0;
        let mut fit = LinearFit::new(5, 1.0 / xdelta);
        for yval in [1.0, 2.0, 3.0, 4.0, 5.0] {
            fit.next(yval);
        }
        let refit = fit.reset(FitReset {
            num_pts: Some(3),
            ..FitReset::default()
        });
        assert_eq!(fit.len(), 3);
        let expected = brute_force_fit(&[3.0, 4.0, 5.0], xdelta);
        assert!((refit - expected).abs() < TOLERANCE);
    }

    #[test]
    fn sample_rate_change_clears_the_history() {
        let mut fit = LinearFit::new(6, 10.0);
        for i in 0..6 {
            fit.next(test_sample(i));
        }
        let refit = fit.reset(FitReset {
            sample_rate: Some(20.0),
            ..FitReset::default()
        });
        assert_eq!(fit.len(), 0);
        assert_eq!(refit, 0.0);

        // Resetting with the unchanged rate keeps the history.
        fit.next(1.0);
        fit.next(2.0);
        fit.reset(FitReset {
            sample_rate: Some(20.0),
            ..FitReset::default()
        });
        assert_eq!(fit.len(), 2);
    }

    #[test]
    fn subtract_const_shifts_the_fit_without_touching_the_slope() {
        let sample_rate = 50.0;
        let xdelta = 1.0 / sample_rate;
        let mut fit = LinearFit::new(10, sample_rate);
        let mut latest = 0.0;
        for i in 0..25 {
            latest = fit.next(7.0 + 0.5 * i as f64 * xdelta);
        }
        let slope_before = fit.slope();
        let shifted = fit.subtract_const(7.0);
        assert!((shifted - (latest - 7.0)).abs() < TOLERANCE);
        assert!((fit.slope() - slope_before).abs() < TOLERANCE);
    }
}
