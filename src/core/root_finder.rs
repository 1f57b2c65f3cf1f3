//! Scalar root finders
//!
//! Both finders look for `x` with `f(x) == target` given two known
//! points. Failure to converge is reported as NaN, never as an error.

/// A point of a scalar function
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XValue {
    pub x: f64,
    pub value: f64,
}

impl XValue {
    pub fn new(x: f64, value: f64) -> Self {
        Self { x, value }
    }
}

/// Common interface of the bracketing root finders
pub trait RootFinder {
    /// Root between two known points, or NaN when none can be found
    fn calculate_value(
        &self,
        low: XValue,
        high: XValue,
        target: f64,
        function: &mut dyn FnMut(f64) -> f64,
    ) -> f64;
}

/// Interval halving
#[derive(Debug, Clone)]
pub struct BisectionRootFinder {
    /// Accepted residual |f(x) - target|
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Maximum number of bracket expansions before giving up
    pub max_expansions: usize,
}

impl Default for BisectionRootFinder {
    fn default() -> Self {
        Self {
            tolerance: 1e-12,
            max_iterations: 1000,
            max_expansions: 100,
        }
    }
}

impl BisectionRootFinder {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            ..Default::default()
        }
    }

    /// Root search from a start interval that need not contain the root
    ///
    /// The interval is widened in the direction of the target until it
    /// brackets it. A function without slope over the start interval, or
    /// one that never reaches the target, gives NaN.
    pub fn calculate_value_from_range(
        &self,
        min_start: f64,
        max_start: f64,
        target: f64,
        function: &mut dyn FnMut(f64) -> f64,
    ) -> f64 {
        let mut low = XValue::new(min_start.min(max_start), f64::NAN);
        let mut high = XValue::new(min_start.max(max_start), f64::NAN);
        low.value = function(low.x);
        high.value = function(high.x);

        if low.value.is_nan() || high.value.is_nan() {
            return f64::NAN;
        }
        if (low.value - target).abs() <= self.tolerance {
            return low.x;
        }
        if (high.value - target).abs() <= self.tolerance {
            return high.x;
        }
        if low.value == high.value {
            return f64::NAN;
        }

        let ascending = high.value > low.value;
        let mut expansions = 0;

        loop {
            let below_low = if ascending {
                target < low.value
            } else {
                target > low.value
            };
            let above_high = if ascending {
                target > high.value
            } else {
                target < high.value
            };

            if !below_low && !above_high {
                break;
            }
            if expansions >= self.max_expansions {
                return f64::NAN;
            }
            expansions += 1;

            let width = high.x - low.x;
            if below_low {
                high = low;
                low.x -= 2.0 * width;
                low.value = function(low.x);
            } else {
                low = high;
                high.x += 2.0 * width;
                high.value = function(high.x);
            }

            if low.value.is_nan() || high.value.is_nan() {
                return f64::NAN;
            }
            // The slope flipped while widening, the function is not monotone
            if (high.value > low.value) != ascending {
                return f64::NAN;
            }
        }

        self.calculate_value(low, high, target, function)
    }
}

impl RootFinder for BisectionRootFinder {
    fn calculate_value(
        &self,
        low: XValue,
        high: XValue,
        target: f64,
        function: &mut dyn FnMut(f64) -> f64,
    ) -> f64 {
        let (mut low, mut high) = if low.x <= high.x {
            (low, high)
        } else {
            (high, low)
        };

        if low.value.is_nan() || high.value.is_nan() {
            return f64::NAN;
        }
        if (low.value - target).abs() <= self.tolerance {
            return low.x;
        }
        if (high.value - target).abs() <= self.tolerance {
            return high.x;
        }
        if (low.value - target).signum() == (high.value - target).signum() {
            return f64::NAN;
        }

        let low_below = low.value < target;

        for _ in 0..self.max_iterations {
            let x = 0.5 * (low.x + high.x);
            let value = function(x);

            if value.is_nan() {
                return f64::NAN;
            }
            if (value - target).abs() <= self.tolerance || x == low.x || x == high.x {
                return x;
            }

            if (value < target) == low_below {
                low = XValue::new(x, value);
            } else {
                high = XValue::new(x, value);
            }
        }

        f64::NAN
    }
}

/// Linear interpolation with bisection fallback
#[derive(Debug, Clone)]
pub struct LinearRootFinder {
    /// Accepted residual |f(x) - target|
    pub tolerance: f64,
    /// Accepted bracket width
    pub x_tolerance: f64,
    pub max_iterations: usize,
}

impl Default for LinearRootFinder {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            x_tolerance: 1e-6,
            max_iterations: 50,
        }
    }
}

impl LinearRootFinder {
    pub fn new(tolerance: f64, x_tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            x_tolerance,
            max_iterations,
        }
    }
}

impl RootFinder for LinearRootFinder {
    fn calculate_value(
        &self,
        low: XValue,
        high: XValue,
        target: f64,
        function: &mut dyn FnMut(f64) -> f64,
    ) -> f64 {
        const RESIDUAL_RATIO: f64 = 0.2;
        const WIDTH_RATIO: f64 = 0.95;

        let (mut low, mut high) = if low.x <= high.x {
            (low, high)
        } else {
            (high, low)
        };

        if low.value.is_nan() || high.value.is_nan() {
            return f64::NAN;
        }
        if (low.value - target).abs() <= self.tolerance {
            return low.x;
        }
        if (high.value - target).abs() <= self.tolerance {
            return high.x;
        }
        if (low.value - target).signum() == (high.value - target).signum() {
            return f64::NAN;
        }

        let ascending = high.value > low.value;
        let mut use_bisection = false;

        for _ in 0..self.max_iterations {
            let x = if use_bisection {
                0.5 * (low.x + high.x)
            } else {
                low.x + (target - low.value) * (high.x - low.x) / (high.value - low.value)
            };
            let value = function(x);

            if value.is_nan() {
                return f64::NAN;
            }
            if (value - target).abs() <= self.tolerance {
                return x;
            }

            // A value outside the bracket values means the function goes
            // both up and down inside the bracket
            let lowest = low.value.min(high.value);
            let highest = low.value.max(high.value);
            if value < lowest || value > highest {
                return f64::NAN;
            }

            let previous_width = high.x - low.x;
            let previous_residual = (low.value - target)
                .abs()
                .min((high.value - target).abs());

            if (value < target) == ascending {
                low = XValue::new(x, value);
            } else {
                high = XValue::new(x, value);
            }

            let width = high.x - low.x;
            if width <= self.x_tolerance {
                return if (low.value - target).abs() < (high.value - target).abs() {
                    low.x
                } else {
                    high.x
                };
            }

            let residual = (value - target).abs();
            use_bisection =
                residual / previous_residual > RESIDUAL_RATIO && width / previous_width > WIDTH_RATIO;
        }

        f64::NAN
    }
}
