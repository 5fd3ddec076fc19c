use knotflow::testing::*;
use knotflow::*;

fn ramp() -> Series<i64> {
    series_of(&[(1, 1i64), (2, 2), (3, 3), (4, 4), (5, 5)])
}

#[test]
fn inception_sum_accumulates_from_the_first_knot() {
    let out = ramp().sum().evaluate(ts(0), ts(10)).unwrap();
    assert_block_eq(&out, &[(1, 1), (2, 3), (3, 6), (4, 10), (5, 15)]);
}

#[test]
fn windowed_sum_emits_full_windows_only() {
    let out = ramp()
        .sum_window(3, false)
        .unwrap()
        .evaluate(ts(0), ts(10))
        .unwrap();
    assert_block_eq(&out, &[(3, 6), (4, 9), (5, 12)]);
}

#[test]
fn windowed_sum_with_emit_early_ticks_from_the_start() {
    let out = ramp()
        .sum_window(3, true)
        .unwrap()
        .evaluate(ts(0), ts(10))
        .unwrap();
    assert_block_eq(&out, &[(1, 1), (2, 3), (3, 6), (4, 9), (5, 12)]);
}

#[test]
fn windowed_reductions_are_batch_consistent() {
    let w = ramp().sum_window(3, false).unwrap();
    assert_batch_consistent(&w, 0, 10, &[1, 2, 3, 4, 5]);
    assert_batch_consistent(&w, 0, 10, &[3]);
    let m = series_of(&[(1, 1.0), (2, 2.0), (3, 4.0), (4, 8.0)])
        .mean_window(2, true)
        .unwrap();
    assert_batch_consistent(&m, 0, 10, &[2, 3]);
}

#[test]
fn inception_prod_and_mean() {
    let p = series_of(&[(1, 2i64), (2, 3), (3, 4)])
        .prod()
        .evaluate(ts(0), ts(10))
        .unwrap();
    assert_block_eq(&p, &[(1, 2), (2, 6), (3, 24)]);

    let m = series_of(&[(1, 1.0), (2, 2.0), (3, 6.0)])
        .mean()
        .evaluate(ts(0), ts(10))
        .unwrap();
    assert_block_approx(&m, &[(1, 1.0), (2, 1.5), (3, 3.0)], 1e-12);
}

#[test]
fn variance_is_silent_until_two_knots() {
    let v = series_of(&[(1, 2.0), (2, 4.0), (3, 6.0)])
        .var()
        .evaluate(ts(0), ts(10))
        .unwrap();
    // Corrected variance of [2,4] is 2, of [2,4,6] is 4.
    assert_block_approx(&v, &[(2, 2.0), (3, 4.0)], 1e-12);
}

#[test]
fn std_is_the_square_root_of_variance() {
    let s = series_of(&[(1, 2.0), (2, 4.0), (3, 6.0)])
        .std()
        .evaluate(ts(0), ts(10))
        .unwrap();
    assert_block_approx(&s, &[(2, 2f64.sqrt()), (3, 2.0)], 1e-12);
}

#[test]
fn windowed_variance_slides_exactly() {
    let v = series_of(&[(1, 1.0), (2, 2.0), (3, 3.0), (4, 10.0)])
        .var_window(3, false)
        .unwrap()
        .evaluate(ts(0), ts(10))
        .unwrap();
    // var([1,2,3]) = 1, var([2,3,10]) = 19
    assert_block_approx(&v, &[(3, 1.0), (4, 19.0)], 1e-9);
}

#[test]
fn one_knot_variance_windows_are_rejected() {
    let x = series_of(&[(1, 1.0)]);
    assert!(matches!(x.var_window(1, false), Err(Error::InvalidInput(_))));
    assert!(matches!(x.std_window(1, true), Err(Error::InvalidInput(_))));
    assert!(matches!(
        cov_window(&x, &x, Alignment::Union, 1, false),
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(x.sum_window(0, false), Err(Error::InvalidInput(_))));
}

#[test]
fn time_window_covers_a_half_open_interval_behind_each_tick() {
    // Width 5: the knot exactly 5 old has fallen out of (t-5, t].
    let x = series_of(&[(0, 1i64), (3, 2), (5, 4), (8, 8)]);
    let out = x
        .sum_over(Duration::from_millis(5), true)
        .unwrap()
        .evaluate(ts(0), ts(20))
        .unwrap();
    // t0: {1}; t3: {1,2}; t5: {2,4} (the t0 knot is exactly 5 old); t8: {4,8}.
    assert_block_eq(&out, &[(0, 1), (3, 3), (5, 6), (8, 12)]);
}

#[test]
fn time_window_without_emit_early_waits_for_full_coverage() {
    let x = series_of(&[(0, 1i64), (3, 2), (5, 4), (8, 8)]);
    let out = x
        .sum_over(Duration::from_millis(5), false)
        .unwrap()
        .evaluate(ts(0), ts(20))
        .unwrap();
    // Coverage is full once t >= first_knot + width = 5.
    assert_block_eq(&out, &[(5, 6), (8, 12)]);
}

#[test]
fn time_windows_are_batch_consistent() {
    let x = series_of(&[(0, 1i64), (3, 2), (5, 4), (8, 8), (14, 1)]);
    let w = x.sum_over(Duration::from_millis(5), true).unwrap();
    assert_batch_consistent(&w, 0, 20, &[4, 9, 13]);
    assert_batch_consistent(&w, 0, 20, &[1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn covariance_and_correlation_match_direct_computation() {
    let x = series_of(&[(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0)]);
    let y = series_of(&[(1, 2.0), (2, 4.0), (3, 6.0), (4, 8.0)]);

    let c = cov(&x, &y, Alignment::Union)
        .evaluate(ts(0), ts(10))
        .unwrap();
    // cov of [1,2],[2,4] = 1; [1..3],[2..6] = 2; [1..4],[2..8] ≈ 3.333...
    assert_block_approx(&c, &[(2, 1.0), (3, 2.0), (4, 10.0 / 3.0)], 1e-9);

    let r = cor(&x, &y, Alignment::Union)
        .evaluate(ts(0), ts(10))
        .unwrap();
    assert_block_approx(&r, &[(2, 1.0), (3, 1.0), (4, 1.0)], 1e-9);
}

#[test]
fn windowed_covariance_is_batch_consistent() {
    let x = series_of(&[(1, 1.0), (2, 5.0), (3, 2.0), (4, 8.0), (5, 3.0)]);
    let y = series_of(&[(1, 9.0), (2, 1.0), (3, 7.0), (4, 2.0), (5, 5.0)]);
    let c = cov_window(&x, &y, Alignment::Union, 3, false).unwrap();
    assert_batch_consistent(&c, 0, 10, &[2, 4]);
}

#[test]
fn ema_smooths_with_the_given_factor() {
    let x = series_of(&[(1, 10.0), (2, 20.0), (3, 10.0)]);
    let out = x.ema(0.5).unwrap().evaluate(ts(0), ts(10)).unwrap();
    assert_block_approx(&out, &[(1, 10.0), (2, 15.0), (3, 12.5)], 1e-12);
}

#[test]
fn ema_rejects_factors_outside_the_unit_interval() {
    let x = series_of(&[(1, 1.0)]);
    assert!(matches!(x.ema(0.0), Err(Error::InvalidInput(_))));
    assert!(matches!(x.ema(1.5), Err(Error::InvalidInput(_))));
    assert!(x.ema(1.0).is_ok());
}

/// A user-supplied reduction: running maximum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
struct MaxFn;

impl ReduceFn<i64> for MaxFn {
    type Acc = i64;
    type Out = i64;

    fn create(&self, v: &i64) -> i64 {
        *v
    }

    fn add_input(&self, acc: &mut i64, v: &i64) {
        *acc = (*acc).max(*v);
    }

    fn merge(&self, earlier: &i64, later: &i64) -> i64 {
        (*earlier).max(*later)
    }

    fn finish(&self, acc: &i64) -> i64 {
        *acc
    }
}

#[test]
fn user_reductions_ride_both_scaffolds() {
    let x = series_of(&[(1, 3i64), (2, 1), (3, 5), (4, 2), (5, 4)]);

    let running = x.fold(MaxFn).evaluate(ts(0), ts(10)).unwrap();
    assert_block_eq(&running, &[(1, 3), (2, 3), (3, 5), (4, 5), (5, 5)]);

    let windowed = x
        .fold_window(MaxFn, 2, false)
        .unwrap()
        .evaluate(ts(0), ts(10))
        .unwrap();
    assert_block_eq(&windowed, &[(2, 3), (3, 5), (4, 5), (5, 4)]);

    assert_batch_consistent(&x.fold_window(MaxFn, 2, false).unwrap(), 0, 10, &[3]);
}
