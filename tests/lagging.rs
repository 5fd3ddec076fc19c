use knotflow::testing::*;
use knotflow::*;

#[test]
fn knot_lag_emits_old_values_at_new_times() {
    let x = series_of(&[(1, 1i64), (2, 2), (3, 3), (4, 4), (5, 5)]);
    let out = x.lag(2).evaluate(ts(0), ts(10)).unwrap();
    assert_block_eq(&out, &[(3, 1), (4, 2), (5, 3)]);
}

#[test]
fn knot_lag_threads_its_ring_across_batches() {
    let x = series_of(&[(1, 1i64), (2, 2), (3, 3), (4, 4), (5, 5)]);
    assert_batch_consistent(&x.lag(2), 0, 10, &[1, 2, 3, 4, 5]);
    assert_batch_consistent(&x.lag(4), 0, 10, &[3]);
}

#[test]
fn lag_by_zero_is_the_series_itself() {
    let x = series_of(&[(1, 1i64)]);
    assert_eq!(x.lag(0), x);
}

#[test]
fn lagging_a_constant_or_empty_node_is_an_identity() {
    let c = constant(5i64);
    assert_eq!(c.lag(3), c);
    let e = empty_node::<i64>();
    assert_eq!(e.lag(3), e);
    assert_eq!(c.lag_time(Duration::from_millis(10)).unwrap(), c);
}

#[test]
fn time_lag_shifts_every_knot() {
    let x = series_of(&[(1, 1i64), (4, 2), (6, 3)]);
    let out = x
        .lag_time(Duration::from_millis(3))
        .unwrap()
        .evaluate(ts(0), ts(20))
        .unwrap();
    assert_block_eq(&out, &[(4, 1), (7, 2), (9, 3)]);
}

#[test]
fn time_lag_retains_history_exactly_until_emission() {
    // A knot at t with lag Δ must stay buffered through every batch ending
    // at or before t + Δ, and be emitted in the first batch beyond it.
    let x = series_of(&[(1, 1i64), (4, 2), (6, 3)]);
    let lagged = x.lag_time(Duration::from_millis(5)).unwrap();

    let mut session = lagged.session_at(ts(0));
    session.evaluate_until(ts(6)).unwrap();
    // Knot (1, 1) shifts to t6, which is outside [0, 6).
    assert_eq!(session.output(&lagged).unwrap().len(), 0);
    session.evaluate_until(ts(7)).unwrap();
    assert_block_eq(&session.output(&lagged).unwrap(), &[(6, 1)]);
    session.evaluate_until(ts(20)).unwrap();
    assert_block_eq(&session.output(&lagged).unwrap(), &[(6, 1), (9, 2), (11, 3)]);
}

#[test]
fn time_lag_is_batch_consistent() {
    let x = series_of(&[(1, 1i64), (4, 2), (6, 3), (9, 4)]);
    let lagged = x.lag_time(Duration::from_millis(5)).unwrap();
    assert_batch_consistent(&lagged, 0, 20, &[5, 10, 15]);
    assert_batch_consistent(&lagged, 0, 20, &[6, 7, 8, 9]);
}

#[test]
fn negative_time_lag_is_rejected() {
    let x = series_of(&[(1, 1i64)]);
    let err = x.lag_time(Duration::from_millis(-1)).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[test]
fn diff_subtracts_the_lagged_series() {
    let x = series_of(&[(1, 1i64), (2, 4), (3, 9), (4, 16)]);
    let out = x.diff(1).evaluate(ts(0), ts(10)).unwrap();
    assert_block_eq(&out, &[(2, 3), (3, 5), (4, 7)]);
}
