//! Concrete semantic equivalences the search is allowed to rely on: pairs of
//! expressions that must evaluate identically on every environment, checked
//! here by direct evaluation rather than through the full CEGIS loop.

use cozy_core::{eval, BinOp, Exp, Type, UnOp, Value, Var};
use pretty_assertions::assert_eq;
use std::collections::HashMap;

type Env = HashMap<String, Value>;

#[test]
fn distinct_equals_map_keys_of_a_constant_valued_map() {
    let xs = Var::new("xs", Type::bag(Type::Int));
    let x = Var::new("x", Type::Int);

    let left = Exp::unary_op(UnOp::Distinct, Exp::var(xs.clone()));
    let right = Exp::map_keys(Exp::make_map2(Exp::var(xs), Exp::lambda(x, Exp::bool_(true))));

    let mut env = Env::new();
    env.insert("xs".to_string(), Value::Bag(vec![Value::Int(1), Value::Int(2), Value::Int(2), Value::Int(3)]));

    assert_eq!(eval(&left, &env).unwrap(), eval(&right, &env).unwrap());
}

#[test]
fn has_key_equals_membership_in_map_keys() {
    let m = Var::new("m", Type::map(Type::Int, Type::Int));
    let k = Var::new("k", Type::Int);

    let left = Exp::has_key(Exp::var(m.clone()), Exp::var(k.clone()));
    let right = Exp::bin_op(Exp::var(k.clone()), BinOp::In, Exp::map_keys(Exp::var(m.clone())));

    let mut env = Env::new();
    env.insert("m".to_string(), Value::Map(vec![(Value::Int(1), Value::Int(10)), (Value::Int(2), Value::Int(20))]));

    for key in [1, 2, 5] {
        env.insert("k".to_string(), Value::Int(key));
        assert_eq!(eval(&left, &env).unwrap(), eval(&right, &env).unwrap(), "key {key}");
    }
}

/// `MapGet(MakeMap2(xs, \x. tuple(x.val, y.val)), y)` against the
/// filter-and-pick-the-unique-match form, for a lookup table keyed by whole
/// records (standing in for handle identity: two records here are equal iff
/// their fields match, so lookup-by-key and lookup-by-filter agree).
#[test]
fn map_get_over_make_map2_equals_filter_and_the() {
    let thing = Type::Record(vec![("id".to_string(), Type::Int), ("val".to_string(), Type::Int)]);
    let xs = Var::new("xs", Type::bag(thing.clone()));
    let y = Var::new("y", thing.clone());
    let bound_x = Var::new("x", thing.clone());
    let bound_f = Var::new("f", thing.clone());

    let left = Exp::map_get(
        Exp::make_map2(
            Exp::var(xs.clone()),
            Exp::lambda(
                bound_x.clone(),
                Exp::tuple(vec![Exp::get_field(Exp::var(bound_x), "val"), Exp::get_field(Exp::var(y.clone()), "val")]),
            ),
        ),
        Exp::var(y.clone()),
    );

    let default = Exp::tuple(vec![Exp::num(0), Exp::num(0)]);
    let right = Exp::cond(
        Exp::bin_op(Exp::var(y.clone()), BinOp::In, Exp::var(xs.clone())),
        Exp::tuple(vec![
            Exp::get_field(
                Exp::unary_op(UnOp::The, Exp::filter(Exp::var(xs), Exp::lambda(bound_f.clone(), Exp::bin_op(Exp::var(bound_f), BinOp::Eq, Exp::var(y.clone()))))),
                "val",
            ),
            Exp::get_field(Exp::var(y), "val"),
        ]),
        default,
    );

    let record = |id: i64, val: i64| Value::Record(vec![("id".to_string(), Value::Int(id)), ("val".to_string(), Value::Int(val))]);
    let xs_val = Value::Bag(vec![record(1, 100), record(2, 200)]);

    let mut env = Env::new();
    env.insert("xs".to_string(), xs_val.clone());
    env.insert("y".to_string(), record(2, 200));
    assert_eq!(eval(&left, &env).unwrap(), eval(&right, &env).unwrap());
    assert_eq!(eval(&left, &env).unwrap(), Value::Tuple(vec![Value::Int(200), Value::Int(200)]));

    env.insert("xs".to_string(), xs_val);
    env.insert("y".to_string(), record(99, 999));
    assert_eq!(eval(&left, &env).unwrap(), eval(&right, &env).unwrap());
    assert_eq!(eval(&left, &env).unwrap(), Value::Tuple(vec![Value::Int(0), Value::Int(0)]));
}

#[test]
fn arg_min_of_a_bag_union_equals_the_min_of_the_two_mins() {
    let xs = Var::new("xs", Type::bag(Type::Int));
    let ys = Var::new("ys", Type::bag(Type::Int));
    let id = |v: Var| Exp::lambda(v.clone(), Exp::var(v));

    let left = Exp::arg_min(Exp::bin_op(Exp::var(xs.clone()), BinOp::Add, Exp::var(ys.clone())), id(Var::new("x", Type::Int)));

    let min_xs = Exp::arg_min(Exp::var(xs.clone()), id(Var::new("x", Type::Int)));
    let min_ys = Exp::arg_min(Exp::var(ys.clone()), id(Var::new("y", Type::Int)));
    let right = Exp::cond(
        Exp::unary_op(UnOp::Empty, Exp::var(xs.clone())),
        Exp::arg_min(Exp::var(ys.clone()), id(Var::new("y", Type::Int))),
        Exp::cond(
            Exp::unary_op(UnOp::Empty, Exp::var(ys.clone())),
            Exp::arg_min(Exp::var(xs.clone()), id(Var::new("x", Type::Int))),
            Exp::arg_min(Exp::bin_op(Exp::singleton(min_xs), BinOp::Add, Exp::singleton(min_ys)), id(Var::new("x", Type::Int))),
        ),
    );

    let mut env = Env::new();
    env.insert("xs".to_string(), Value::Bag(vec![Value::Int(5), Value::Int(-1), Value::Int(3)]));
    env.insert("ys".to_string(), Value::Bag(vec![Value::Int(2), Value::Int(0)]));
    assert_eq!(eval(&left, &env).unwrap(), eval(&right, &env).unwrap());
    assert_eq!(eval(&left, &env).unwrap(), Value::Int(-1));

    env.insert("xs".to_string(), Value::Bag(Vec::new()));
    assert_eq!(eval(&left, &env).unwrap(), eval(&right, &env).unwrap());
    assert_eq!(eval(&left, &env).unwrap(), Value::Int(0));
}

#[test]
fn filter_of_a_bag_difference_equals_the_difference_of_the_filters() {
    let xs = Var::new("xs", Type::bag(Type::Int));
    let ys = Var::new("ys", Type::bag(Type::Int));
    let pred = |v: Var| Exp::lambda(v.clone(), Exp::bin_op(Exp::var(v), BinOp::Gt, Exp::num(0)));

    let left = Exp::filter(Exp::bin_op(Exp::var(xs.clone()), BinOp::Sub, Exp::var(ys.clone())), pred(Var::new("x", Type::Int)));
    let right = Exp::bin_op(
        Exp::filter(Exp::var(xs.clone()), pred(Var::new("x", Type::Int))),
        BinOp::Sub,
        Exp::filter(Exp::var(ys.clone()), pred(Var::new("y", Type::Int))),
    );

    let mut env = Env::new();
    env.insert("xs".to_string(), Value::Bag(vec![Value::Int(1), Value::Int(-2), Value::Int(3), Value::Int(3)]));
    env.insert("ys".to_string(), Value::Bag(vec![Value::Int(3), Value::Int(-2)]));

    assert_eq!(eval(&left, &env).unwrap(), eval(&right, &env).unwrap());
}

#[test]
fn the_of_a_map_equals_cond_on_existence() {
    let xs = Var::new("xs", Type::bag(Type::Int));
    let x = Var::new("x", Type::Int);
    let f = |e: Exp| Exp::bin_op(e, BinOp::Mul, Exp::num(10));

    let left = Exp::unary_op(UnOp::The, Exp::map(Exp::var(xs.clone()), Exp::lambda(x.clone(), f(Exp::var(x)))));
    let right = Exp::cond(
        Exp::unary_op(UnOp::Exists, Exp::var(xs.clone())),
        f(Exp::unary_op(UnOp::The, Exp::var(xs.clone()))),
        Exp::unary_op(UnOp::The, Exp::empty_list(Type::Int)),
    );

    let mut env = Env::new();
    env.insert("xs".to_string(), Value::Bag(vec![Value::Int(4), Value::Int(9)]));
    assert_eq!(eval(&left, &env).unwrap(), eval(&right, &env).unwrap());
    assert_eq!(eval(&left, &env).unwrap(), Value::Int(40));

    env.insert("xs".to_string(), Value::Bag(Vec::new()));
    assert_eq!(eval(&left, &env).unwrap(), eval(&right, &env).unwrap());
}
