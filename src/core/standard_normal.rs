//! Standard normal transforms between u-values and probabilities
//!
//! The cumulative distribution uses Hart's double precision rational
//! approximation, which is accurate to machine precision for |u| <= 37.
//! The inverse is found by bracketing and linear interpolation in log
//! probability space, so it is consistent with the forward transform.

/// Cap for reliability indices (u-values)
pub const BETA_MAX: f64 = 40.0;

/// Beyond this |u| the tail probability underflows
const U_LIMIT: f64 = 37.0;

const SQRT_2PI: f64 = 2.506628274631000502415765284811;

/// Non-exceedance probability Φ(u) = P(U <= u)
pub fn get_p_from_u(u: f64) -> f64 {
    if u.is_nan() {
        return f64::NAN;
    }
    let tail = lower_tail(-u.abs());
    if u > 0.0 {
        1.0 - tail
    } else {
        tail
    }
}

/// Exceedance probability Q(u) = P(U > u)
pub fn get_q_from_u(u: f64) -> f64 {
    if u.is_nan() {
        return f64::NAN;
    }
    get_p_from_u(-u)
}

/// Standard normal density φ(u)
pub fn pdf(u: f64) -> f64 {
    (-0.5 * u * u).exp() / SQRT_2PI
}

/// Hart's algorithm for Φ(x), x <= 0
fn lower_tail(x: f64) -> f64 {
    let x_abs = x.abs();
    if x_abs > U_LIMIT {
        return 0.0;
    }

    let exponential = (-x_abs * x_abs / 2.0).exp();

    if x_abs < 7.071_067_811_865_47 {
        let mut numerator = 3.526_249_659_989_11e-2 * x_abs + 0.700_383_064_443_688;
        numerator = numerator * x_abs + 6.373_962_203_531_65;
        numerator = numerator * x_abs + 33.912_866_078_383;
        numerator = numerator * x_abs + 112.079_291_497_871;
        numerator = numerator * x_abs + 221.213_596_169_931;
        numerator = numerator * x_abs + 220.206_867_912_376;

        let mut denominator = 8.838_834_764_831_84e-2 * x_abs + 1.755_667_163_182_64;
        denominator = denominator * x_abs + 16.064_177_579_207;
        denominator = denominator * x_abs + 86.780_732_202_946_1;
        denominator = denominator * x_abs + 296.564_248_779_674;
        denominator = denominator * x_abs + 637.333_633_378_831;
        denominator = denominator * x_abs + 793.826_512_519_948;
        denominator = denominator * x_abs + 440.413_735_824_752;

        exponential * numerator / denominator
    } else {
        let mut build = x_abs + 0.65;
        build = x_abs + 4.0 / build;
        build = x_abs + 3.0 / build;
        build = x_abs + 2.0 / build;
        build = x_abs + 1.0 / build;
        exponential / build / SQRT_2PI
    }
}

/// u-value belonging to a non-exceedance probability
pub fn get_u_from_p(p: f64) -> f64 {
    if p.is_nan() {
        return f64::NAN;
    }
    -get_u_from_q(p)
}

/// u-value belonging to an exceedance probability
///
/// Returns `BETA_MAX` for q <= 0 and `-BETA_MAX` for q >= 1.
pub fn get_u_from_q(q: f64) -> f64 {
    if q.is_nan() {
        return f64::NAN;
    }
    if q <= 0.0 {
        return BETA_MAX;
    }
    if q >= 1.0 {
        return -BETA_MAX;
    }
    if q == 0.5 {
        return 0.0;
    }

    let tail = if q > 0.5 { 1.0 - q } else { q };
    let u = upper_tail_quantile(tail).min(BETA_MAX);

    if q > 0.5 {
        -u
    } else {
        u
    }
}

/// Closed form first guess, different below and above 0.15
fn initial_estimate(q: f64) -> f64 {
    if q < 0.15 {
        let t = (-2.0 * q.ln()).sqrt();
        t - (2.515_517 + 0.802_853 * t + 0.010_328 * t * t)
            / (1.0 + 1.432_788 * t + 0.189_269 * t * t + 0.001_308 * t * t * t)
    } else {
        SQRT_2PI * (0.5 - q)
    }
}

/// Solves Q(u) = q for 0 < q < 0.5, so u > 0
fn upper_tail_quantile(q: f64) -> f64 {
    const MAX_ITERATIONS: usize = 50;
    const RELAXED_AFTER: usize = 25;

    let target = q.ln();
    let residual = |u: f64| get_q_from_u(u).ln() - target;

    let u0 = initial_estimate(q).max(0.0);
    let r0 = residual(u0);
    if r0 == 0.0 {
        return u0;
    }

    // Q decreases in u: a positive residual means u is too small
    let mut step = 0.1;
    let (mut low, mut r_low, mut high, mut r_high) = if r0 > 0.0 {
        let mut low = u0;
        let mut r_low = r0;
        let mut high = (u0 + step).min(U_LIMIT);
        let mut r_high = residual(high);
        while r_high > 0.0 && high < U_LIMIT {
            low = high;
            r_low = r_high;
            step *= 2.0;
            high = (high + step).min(U_LIMIT);
            r_high = residual(high);
        }
        (low, r_low, high, r_high)
    } else {
        let mut high = u0;
        let mut r_high = r0;
        let mut low = (u0 - step).max(0.0);
        let mut r_low = residual(low);
        while r_low < 0.0 && low > 0.0 {
            high = low;
            r_high = r_low;
            step *= 2.0;
            low = (low - step).max(0.0);
            r_low = residual(low);
        }
        (low, r_low, high, r_high)
    };

    if !(r_low >= 0.0 && r_high <= 0.0) {
        // Underflow in the far tail, the bracket end is the best we have
        return high;
    }

    let mut margin = 1e-14;
    let mut u = u0;
    let mut last_side = 0i8;

    for iteration in 0..MAX_ITERATIONS {
        if iteration == RELAXED_AFTER {
            margin *= 10.0;
        }

        let denominator = r_low - r_high;
        u = if denominator > 0.0 {
            low + r_low * (high - low) / denominator
        } else {
            0.5 * (low + high)
        };

        let r = residual(u);
        if r.abs() <= margin || (high - low) <= margin * high.max(1.0) {
            return u;
        }

        // Illinois modification keeps regula falsi from stalling on one side
        if r > 0.0 {
            low = u;
            r_low = r;
            if last_side == 1 {
                r_high *= 0.5;
            }
            last_side = 1;
        } else {
            high = u;
            r_high = r;
            if last_side == -1 {
                r_low *= 0.5;
            }
            last_side = -1;
        }
    }

    u
}
