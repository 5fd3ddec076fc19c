use anyhow::anyhow;
use knotflow::testing::*;
use knotflow::*;

#[test]
fn one_shot_and_batched_evaluation_agree() {
    let x = series_of(&[(1, 1.0), (3, 2.0), (5, 3.0), (9, 4.0)]);
    let y = series_of(&[(2, 1.0), (5, 1.0), (8, 1.0)]);
    let node = (&x + &y).ema(0.5).unwrap();

    let whole = node.evaluate(ts(0), ts(12)).unwrap();
    let stepped = node
        .evaluate_batched(ts(0), ts(12), Duration::from_millis(3))
        .unwrap();
    assert!(whole.approx_eq(&stepped, 1e-12));

    let ragged = node
        .evaluate_batched(ts(0), ts(12), Duration::from_millis(5))
        .unwrap();
    assert!(whole.approx_eq(&ragged, 1e-12));
}

#[test]
fn every_output_lands_inside_the_requested_interval() {
    let x = series_of(&[(1, 1i64), (5, 2), (9, 3), (14, 4)]);
    let out = x.sum().evaluate(ts(2), ts(10)).unwrap();
    for (t, _) in out.iter() {
        assert!(ts(2) <= t && t < ts(10), "knot at {t:?} escaped [2, 10)");
    }
    assert_block_eq(&out, &[(5, 2), (9, 5)]);
}

#[test]
fn sessions_collect_outputs_incrementally() {
    let x = series_of(&[(1, 1i64), (5, 2), (9, 3)]);
    let total = x.sum();
    let mut session = total.session_at(ts(0));
    assert_eq!(session.current_time(), ts(0));

    session.evaluate_until(ts(6)).unwrap();
    assert_block_eq(&session.output(&total).unwrap(), &[(1, 1), (5, 3)]);

    session.evaluate_until(ts(20)).unwrap();
    assert_eq!(session.current_time(), ts(20));
    assert_block_eq(&session.output(&total).unwrap(), &[(1, 1), (5, 3), (9, 6)]);
}

#[test]
fn evaluating_backwards_is_rejected() {
    let x = series_of(&[(1, 1i64)]);
    let mut session = x.session_at(ts(5));
    session.evaluate_until(ts(8)).unwrap();
    let err = session.evaluate_until(ts(7)).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    // An empty interval is fine.
    session.evaluate_until(ts(8)).unwrap();
}

#[test]
fn outputs_are_only_kept_for_requested_nodes() {
    let x = series_of(&[(1, 1i64), (2, 2)]);
    let total = x.sum();
    let session = evaluate_nodes(&[total.node().clone()], ts(0), ts(10), None).unwrap();
    assert!(session.contains(x.node()));
    let err = session.output(&x).unwrap_err();
    assert!(matches!(err, Error::MissingValue(_)));
}

#[test]
fn multiple_requested_nodes_share_one_evaluation() {
    let x = series_of(&[(1, 1.0), (2, 2.0), (3, 3.0)]);
    let m = x.mean();
    let s = x.sum();
    let session =
        evaluate_nodes(&[m.node().clone(), s.node().clone()], ts(0), ts(10), None).unwrap();
    assert_block_approx(&session.output(&m).unwrap(), &[(1, 1.0), (2, 1.5), (3, 2.0)], 1e-12);
    assert_block_eq(&session.output(&s).unwrap(), &[(1, 1.0), (2, 3.0), (3, 6.0)]);
}

#[test]
fn duplicated_sessions_diverge_independently() {
    let x = series_of(&[(1, 1i64), (3, 2), (5, 3), (7, 4)]);
    let total = x.sum();
    let mut original = total.session_at(ts(0));
    original.evaluate_until(ts(4)).unwrap();

    let mut fork = original.duplicate();
    original.evaluate_until(ts(10)).unwrap();

    // The fork resumes from the duplication point with its own state.
    assert_eq!(fork.current_time(), ts(4));
    fork.evaluate_until(ts(10)).unwrap();

    let a = original.output(&total).unwrap();
    let b = fork.output(&total).unwrap();
    assert_eq!(a, b);
    assert_block_eq(&a, &[(1, 1), (3, 3), (5, 6), (7, 10)]);
}

#[test]
fn repeated_evaluation_is_deterministic() {
    // Pseudo-randomness lives in the seed, so two fresh sessions agree.
    let x = series_of(&[(1, 0i64), (2, 0), (3, 0), (4, 0)]);
    let noisy = x.scan(0x2545F49_u64, |rng, _, _| {
        *rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        Some((*rng >> 33) as i64)
    });
    let a = noisy.evaluate(ts(0), ts(10)).unwrap();
    let b = noisy.evaluate(ts(0), ts(10)).unwrap();
    assert_eq!(a, b);
    assert_batch_consistent(&noisy, 0, 10, &[2, 3]);
}

#[test]
fn constants_tick_at_the_start_of_each_session() {
    let c = constant(9i64);
    assert_block_eq(&c.evaluate(ts(3), ts(10)).unwrap(), &[(3, 9)]);
    assert_block_eq(&c.evaluate(ts(7), ts(10)).unwrap(), &[(7, 9)]);

    let mut session = c.session_at(ts(2));
    session.evaluate_until(ts(5)).unwrap();
    session.evaluate_until(ts(9)).unwrap();
    assert_block_eq(&session.output(&c).unwrap(), &[(2, 9)]);
}

#[test]
fn source_adapters_feed_the_graph() {
    let x = source_fn(|span| {
        let mut pairs = Vec::new();
        let mut t = span.start;
        while t < span.end {
            pairs.push((t, t.millis() * 2));
            t = t + Duration::from_millis(4);
        }
        Ok(Block::from_pairs(pairs)?)
    });
    let out = x.evaluate(ts(0), ts(10)).unwrap();
    assert_block_eq(&out, &[(0, 0), (4, 8), (8, 16)]);
}

#[test]
fn misbehaving_adapters_are_caught() {
    let bad = source_fn(|_span| Ok(knots(&[(1_000, 1i64)])));
    let err = bad.evaluate(ts(0), ts(10)).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[test]
fn a_failing_operator_poisons_the_session() {
    let failing = source_fn::<i64, _>(|span| {
        if span.start >= ts(5) {
            Err(anyhow!("feed went away"))
        } else {
            Ok(Block::empty())
        }
    });
    let total = failing.sum();
    let mut session = total.session_at(ts(0));
    session.evaluate_until(ts(5)).unwrap();
    assert!(!session.is_poisoned());

    let err = session.evaluate_until(ts(10)).unwrap_err();
    assert!(matches!(err, Error::Operator(_)));
    assert!(session.is_poisoned());

    // A poisoned session refuses everything, even going nowhere.
    let err = session.evaluate_until(ts(20)).unwrap_err();
    assert!(matches!(err, Error::StateCorruption(_)));

    // Reconstructing from the start is the documented recovery path.
    let fresh = total.session_at(ts(0));
    assert!(!fresh.is_poisoned());
}

#[test]
fn deep_graphs_evaluate_in_topological_order() {
    // A diamond with a long chain on one side.
    let x = series_of(&[(1, 1i64), (2, 2), (3, 3), (4, 4), (5, 5), (6, 6)]);
    let mut chain = x.clone();
    for _ in 0..50 {
        chain = &chain + &constant(0i64);
    }
    let out = (&chain + &x.lag(1)).evaluate(ts(0), ts(10)).unwrap();
    assert_block_eq(&out, &[(2, 3), (3, 5), (4, 7), (5, 9), (6, 11)]);
}

#[test]
fn batch_interval_must_be_positive() {
    let x = series_of(&[(1, 1i64)]);
    let err = x
        .evaluate_batched(ts(0), ts(10), Duration::from_millis(0))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    let err = evaluate_nodes(&[x.node().clone()], ts(10), ts(0), None).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}
