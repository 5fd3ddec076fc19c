use knotflow::testing::*;
use knotflow::*;

#[test]
fn merge_unions_ticks_with_leftmost_priority() {
    let a = series_of(&[(1, 1i64), (3, 3)]);
    let b = series_of(&[(2, 20i64), (3, 30)]);
    let out = merge(&[a, b]).unwrap().evaluate(ts(0), ts(10)).unwrap();
    assert_block_eq(&out, &[(1, 1), (2, 20), (3, 3)]);
}

#[test]
fn merge_of_a_series_with_itself_is_the_series() {
    let x = series_of(&[(1, 1i64)]);
    assert_eq!(merge(&[x.clone(), x.clone(), x.clone()]).unwrap(), x);
    assert_eq!(merge(&[x.clone()]).unwrap(), x);
}

#[test]
fn merge_with_duplicates_matches_merge_without() {
    let a = series_of(&[(1, 1i64), (3, 3)]);
    let b = series_of(&[(2, 20i64)]);
    assert_eq!(
        merge(&[a.clone(), b.clone(), a.clone()]).unwrap(),
        merge(&[a, b]).unwrap()
    );
}

#[test]
fn merge_requires_an_input() {
    assert!(matches!(
        merge::<i64>(&[]),
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn prepend_hands_over_at_the_first_tick_of_the_tail() {
    let x = series_of(&[(1, 42i64), (5, 99)]);
    let y = series_of(&[(2, 5i64), (3, 6)]);
    let out = prepend(&x, &y).evaluate(ts(0), ts(10)).unwrap();
    // Once y has ticked, later x knots are suppressed for good.
    assert_block_eq(&out, &[(1, 42), (2, 5), (3, 6)]);
}

#[test]
fn prepend_handoff_survives_batch_boundaries() {
    let x = series_of(&[(1, 42i64), (5, 99)]);
    let y = series_of(&[(2, 5i64), (3, 6)]);
    assert_batch_consistent(&prepend(&x, &y), 0, 10, &[2, 4, 6]);
    assert_batch_consistent(&prepend(&x, &y), 0, 10, &[1, 2, 3, 4, 5]);
}

#[test]
fn prepend_of_an_empty_head_is_the_tail() {
    let y = series_of(&[(1, 1i64)]);
    assert_eq!(prepend(&empty_node::<i64>(), &y), y);
}

#[test]
fn align_samples_the_latest_value_at_the_clock() {
    let x = series_of(&[(1, 10i64), (4, 40)]);
    let clock = series_of(&[(2, 0.0), (3, 0.0), (5, 0.0)]);
    let out = align(&x, &clock).evaluate(ts(0), ts(10)).unwrap();
    assert_block_eq(&out, &[(2, 10), (3, 10), (5, 40)]);
}

#[test]
fn align_with_itself_is_the_series() {
    let x = series_of(&[(1, 1i64)]);
    assert_eq!(align(&x, &x), x);
    assert_eq!(align_once(&x, &x), x);
}

#[test]
fn align_once_never_repeats_a_value() {
    let x = series_of(&[(1, 10i64), (4, 40)]);
    let clock = series_of(&[(2, 0.0), (3, 0.0), (5, 0.0), (6, 0.0)]);
    let out = align_once(&x, &clock).evaluate(ts(0), ts(10)).unwrap();
    assert_block_eq(&out, &[(2, 10), (5, 40)]);
}

#[test]
fn align_is_batch_consistent() {
    let x = series_of(&[(1, 10i64), (4, 40), (8, 80)]);
    let clock = series_of(&[(2, 0i64), (5, 0), (6, 0), (9, 0)]);
    assert_batch_consistent(&align(&x, &clock), 0, 12, &[3, 7]);
    assert_batch_consistent(&align_once(&x, &clock), 0, 12, &[2, 5, 9]);
}

#[test]
fn coalign_makes_both_outputs_tick_together() {
    let x = series_of(&[(1, 1i64), (3, 3)]);
    let y = series_of(&[(2, 20i64), (4, 40)]);
    let (cx, cy) = coalign(&x, &y, Alignment::Union);
    let bx = cx.evaluate(ts(0), ts(10)).unwrap();
    let by = cy.evaluate(ts(0), ts(10)).unwrap();
    assert_eq!(bx.times(), by.times());
    assert_block_eq(&bx, &[(2, 1), (3, 3), (4, 3)]);
    assert_block_eq(&by, &[(2, 20), (3, 20), (4, 40)]);
}

#[test]
fn coalign_many_shares_one_union_skeleton() {
    let a = series_of(&[(1, 1i64), (4, 4)]);
    let b = series_of(&[(2, 2i64)]);
    let c = series_of(&[(3, 3i64)]);
    let outs = coalign_many(&[a, b, c]).unwrap();
    let blocks: Vec<_> = outs
        .iter()
        .map(|s| s.evaluate(ts(0), ts(10)).unwrap())
        .collect();
    assert_block_eq(&blocks[0], &[(1, 1), (2, 1), (3, 1), (4, 4)]);
    assert_block_eq(&blocks[1], &[(2, 2), (3, 2), (4, 2)]);
    assert_block_eq(&blocks[2], &[(3, 3), (4, 3)]);
}

#[test]
fn filter_keeps_matching_knots() {
    let x = series_of(&[(1, 1i64), (2, 2), (3, 3), (4, 4)]);
    let out = x
        .filter(|v: &i64| v % 2 == 0)
        .evaluate(ts(0), ts(10))
        .unwrap();
    assert_block_eq(&out, &[(2, 2), (4, 4)]);
}

#[test]
fn filter_by_gates_on_the_latest_gate_value() {
    let x = series_of(&[(1, 1i64), (3, 3), (5, 5), (7, 7)]);
    let gate = series_of(&[(2, true), (4, false), (6, true)]);
    let out = filter_by(&x, &gate).evaluate(ts(0), ts(10)).unwrap();
    // t1: gate never ticked; t3: open; t5: closed; t7: open again.
    assert_block_eq(&out, &[(3, 3), (7, 7)]);
}

#[test]
fn skip_missing_narrows_the_value_type() {
    let x = series_of(&[
        (1, None::<i64>),
        (2, Some(2)),
        (3, Some(3)),
        (4, None),
    ]);
    let out: Block<i64> = skip_missing(&x).evaluate(ts(0), ts(10)).unwrap();
    assert_block_eq(&out, &[(2, 2), (3, 3)]);
}

#[test]
fn first_knot_keeps_only_the_first_tick() {
    let x = series_of(&[(2, 20i64), (5, 50)]);
    let out = x.first_knot().evaluate(ts(0), ts(10)).unwrap();
    assert_block_eq(&out, &[(2, 20)]);
}

#[test]
fn first_knot_is_idempotent_by_node_identity() {
    let x = series_of(&[(1, 1i64)]);
    assert_eq!(x.first_knot().first_knot(), x.first_knot());
    let c = constant(1i64);
    assert_eq!(c.first_knot(), c);
}

#[test]
fn first_knot_is_batch_consistent() {
    let x = series_of(&[(3, 30i64), (6, 60)]);
    assert_batch_consistent(&x.first_knot(), 0, 10, &[2, 4, 8]);
}

#[test]
fn throttle_keeps_the_first_of_each_run() {
    let x = series_of(&[(1, 1i64), (2, 2), (3, 3), (4, 4), (5, 5), (6, 6), (7, 7)]);
    let out = x.throttle(3).unwrap().evaluate(ts(0), ts(10)).unwrap();
    assert_block_eq(&out, &[(1, 1), (4, 4), (7, 7)]);
    assert_batch_consistent(&x.throttle(3).unwrap(), 0, 10, &[2, 5]);
}

#[test]
fn throttle_of_one_is_the_series_and_zero_is_rejected() {
    let x = series_of(&[(1, 1i64)]);
    assert_eq!(x.throttle(1).unwrap(), x);
    assert!(matches!(x.throttle(0), Err(Error::InvalidInput(_))));
}

#[test]
fn count_knots_numbers_the_ticks() {
    let x = series_of(&[(1, 5.0), (4, 5.0), (9, 5.0)]);
    let out = x.count_knots().evaluate(ts(0), ts(10)).unwrap();
    assert_block_eq(&out, &[(1, 1), (4, 2), (9, 3)]);
    assert_batch_consistent(&x.count_knots(), 0, 10, &[5]);
}

#[test]
fn history_carries_the_trailing_values() {
    let x = series_of(&[(1, 1i64), (2, 2), (3, 3)]);
    let out = x.history(2).unwrap().evaluate(ts(0), ts(10)).unwrap();
    assert_block_eq(
        &out,
        &[(1, vec![1]), (2, vec![1, 2]), (3, vec![2, 3])],
    );
    assert!(matches!(x.history(0), Err(Error::InvalidInput(_))));
}

#[test]
fn active_count_rises_as_inputs_start_ticking() {
    let a = series_of(&[(1, 1i64), (6, 2)]);
    let b = series_of(&[(3, 1.0), (4, 2.0)]);
    let c = series_of(&[(3, true)]);
    let out = active_count(&[&a as &dyn AnySeries, &b, &c])
        .unwrap()
        .evaluate(ts(0), ts(10))
        .unwrap();
    // b and c first tick simultaneously at t3.
    assert_block_eq(&out, &[(1, 1), (3, 3)]);
}

#[test]
fn active_count_is_batch_consistent() {
    let a = series_of(&[(1, 1i64), (6, 2)]);
    let b = series_of(&[(3, 1.0), (8, 2.0)]);
    let count = active_count(&[&a as &dyn AnySeries, &b]).unwrap();
    assert_batch_consistent(&count, 0, 10, &[2, 5, 7]);
}

#[test]
fn tick_times_exposes_the_skeleton() {
    let x = series_of(&[(2, 5i64), (7, 9)]);
    let out = tick_times(&x).evaluate(ts(0), ts(10)).unwrap();
    assert_eq!(out.values(), &[ts(2), ts(7)]);
}
