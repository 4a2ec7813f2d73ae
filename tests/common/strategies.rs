//! Proptest strategies for haul-cycle inputs

use proptest::prelude::*;

/// One step against a loading point queue
#[derive(Debug, Clone)]
pub enum QueueOp {
    Admit(usize),
    Release(usize),
    Withdraw(usize),
}

pub fn queue_op_strategy(trucks: usize) -> impl Strategy<Value = QueueOp> {
    prop_oneof![
        3 => (0..trucks).prop_map(QueueOp::Admit),
        2 => (0..trucks).prop_map(QueueOp::Release),
        1 => (0..trucks).prop_map(QueueOp::Withdraw),
    ]
}

/// Minutes spent queueing, loading, hauling, dumping and returning
pub fn phase_minutes_strategy() -> impl Strategy<Value = [i64; 5]> {
    (0i64..45, 1i64..20, 1i64..60, 1i64..15, 1i64..60)
        .prop_map(|(queue, loading, hauling, dumping, returning)| [queue, loading, hauling, dumping, returning])
}

/// Seconds past the minute for each phase boundary
pub fn jitter_strategy() -> impl Strategy<Value = [i64; 6]> {
    proptest::array::uniform6(0i64..60)
}

pub fn delay_rule_strategy() -> impl Strategy<Value = (f64, i64, i64)> {
    (0.0f64..=1.0, 1i64..30).prop_flat_map(|(probability, min)| {
        (Just(probability), Just(min), min..(min + 40))
    })
}
