// tests/evaluator_tests.rs

use dolex_transform::{
    ColumnOptions, EvalError, Evaluator, FilterOp, FunctionRegistry, Row, RowFilter, Value, parse,
};

fn row(pairs: Vec<(&str, Value)>) -> Row {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn eval_expr(expr_str: &str, row: &Row) -> Result<Value, EvalError> {
    let registry = FunctionRegistry::builtin();
    let evaluator = Evaluator::new(&registry);
    let expr = parse(expr_str).unwrap();
    evaluator.evaluate(&expr, row)
}

fn eval(expr_str: &str) -> Value {
    eval_expr(expr_str, &Row::new()).unwrap()
}

fn sales() -> Vec<Row> {
    vec![
        row(vec![("region", "north".into()), ("revenue", 100.0.into())]),
        row(vec![("region", "south".into()), ("revenue", 50.0.into())]),
        row(vec![("region", "north".into()), ("revenue", 300.0.into())]),
        row(vec![("region", "south".into()), ("revenue", 150.0.into())]),
    ]
}

// ============================================================================
// Arithmetic
// ============================================================================

#[test]
fn test_arithmetic() {
    assert_eq!(eval("1 + 2 * 3"), Value::Number(7.0));
    assert_eq!(eval("(1 + 2) * 3"), Value::Number(9.0));
    assert_eq!(eval("7 % 4"), Value::Number(3.0));
    assert_eq!(eval("2 ^ 3 ^ 2"), Value::Number(512.0));
    assert_eq!(eval("-2 ^ 2"), Value::Number(4.0));
    assert_eq!(eval("10 / 4"), Value::Number(2.5));
}

#[test]
fn test_division_and_modulo_by_zero_are_null() {
    assert_eq!(eval("1 / 0"), Value::Null);
    assert_eq!(eval("0 / 0"), Value::Null);
    assert_eq!(eval("5 % 0"), Value::Null);
}

#[test]
fn test_non_finite_results_are_null() {
    assert_eq!(eval("(0 - 8) ^ 0.5"), Value::Null);
    assert_eq!(eval("10 ^ 400"), Value::Null);
}

#[test]
fn test_string_concatenation() {
    assert_eq!(eval(r#""a" + "b""#), Value::from("ab"));
}

#[test]
fn test_mixed_plus_is_a_type_error() {
    let err = eval_expr(r#""a" + 1"#, &Row::new()).unwrap_err();
    assert!(matches!(err, EvalError::TypeMismatch(_)));
}

#[test]
fn test_arithmetic_on_strings_is_a_type_error() {
    let err = eval_expr(r#""6" * 2"#, &Row::new()).unwrap_err();
    assert!(matches!(err, EvalError::TypeMismatch(_)));
}

// ============================================================================
// Null propagation and equality
// ============================================================================

#[test]
fn test_null_propagates_through_operators() {
    let r = row(vec![("x", Value::Null), ("y", 3.0.into())]);
    for expr in ["x + y", "y - x", "x * 2", "-x", "!x", "x > 1", "x != 1", "x && true"] {
        assert_eq!(eval_expr(expr, &r).unwrap(), Value::Null, "Failed for: {}", expr);
    }
}

#[test]
fn test_missing_column_equals_itself() {
    assert_eq!(eval("missing == missing"), Value::Boolean(true));
    assert_eq!(eval("missing == 1"), Value::Boolean(false));
    assert_eq!(eval("missing"), Value::Null);
}

#[test]
fn test_equality_across_types_is_false() {
    assert_eq!(eval(r#"1 == "1""#), Value::Boolean(false));
    assert_eq!(eval(r#"1 != "1""#), Value::Boolean(true));
}

// ============================================================================
// Comparison and logic
// ============================================================================

#[test]
fn test_comparisons() {
    let r = row(vec![("price", 120.0.into()), ("name", "widget".into())]);
    assert_eq!(eval_expr("price >= 120", &r).unwrap(), Value::Boolean(true));
    assert_eq!(eval_expr("price < 100", &r).unwrap(), Value::Boolean(false));
    assert_eq!(eval_expr(r#"name > "apple""#, &r).unwrap(), Value::Boolean(true));
}

#[test]
fn test_comparison_across_types_is_a_type_error() {
    let err = eval_expr(r#"1 < "2""#, &Row::new()).unwrap_err();
    assert!(matches!(err, EvalError::TypeMismatch(_)));
}

#[test]
fn test_logic_requires_booleans() {
    assert_eq!(eval("true && !false"), Value::Boolean(true));
    assert_eq!(eval("false || false"), Value::Boolean(false));
    let err = eval_expr("1 && true", &Row::new()).unwrap_err();
    assert!(matches!(err, EvalError::TypeMismatch(_)));
}

#[test]
fn test_logic_evaluates_both_sides() {
    // No short-circuit: the right side's error surfaces even when the left decides
    let err = eval_expr(r#"false && ("a" + 1 == "a1")"#, &Row::new()).unwrap_err();
    assert!(matches!(err, EvalError::TypeMismatch(_)));
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn test_unknown_function() {
    let err = eval_expr("frobnicate(1)", &Row::new()).unwrap_err();
    assert_eq!(err, EvalError::UnknownFunction("frobnicate".to_string()));
}

#[test]
fn test_wrong_arity() {
    let err = eval_expr("abs(1, 2)", &Row::new()).unwrap_err();
    assert!(matches!(err, EvalError::Arity { got: 2, .. }));
}

#[test]
fn test_array_outside_argument() {
    let err = eval_expr("[1, 2]", &Row::new()).unwrap_err();
    assert_eq!(err, EvalError::UnexpectedList);
    let err = eval_expr("abs([1])", &Row::new()).unwrap_err();
    assert_eq!(err, EvalError::UnexpectedList);
}

#[test]
fn test_function_names_are_case_insensitive() {
    assert_eq!(eval("ABS(0 - 3)"), Value::Number(3.0));
}

#[test]
fn test_backtick_column_lookup() {
    let r = row(vec![("unit price", 4.0.into())]);
    assert_eq!(eval_expr("`unit price` * 2", &r).unwrap(), Value::Number(8.0));
}

// ============================================================================
// Partitions and columns
// ============================================================================

#[test]
fn test_evaluate_in_partition() {
    let rows = sales();
    let refs: Vec<&Row> = rows.iter().collect();
    let registry = FunctionRegistry::builtin();
    let evaluator = Evaluator::new(&registry);
    let expr = parse("revenue - mean(revenue)").unwrap();

    let value = evaluator.evaluate_in_partition(&expr, &refs, 2).unwrap();
    assert_eq!(value, Value::Number(150.0));

    let err = evaluator.evaluate_in_partition(&expr, &refs, 9).unwrap_err();
    assert_eq!(err, EvalError::RowOutOfRange { index: 9, len: 4 });
}

#[test]
fn test_single_row_partition_functions() {
    let r = row(vec![("x", 5.0.into())]);
    assert_eq!(eval_expr("rank(x)", &r).unwrap(), Value::Number(1.0));
    assert_eq!(eval_expr("percentile_rank(x)", &r).unwrap(), Value::Number(0.0));
}

#[test]
fn test_column_without_partition_uses_whole_table() {
    let rows = sales();
    let registry = FunctionRegistry::builtin();
    let evaluator = Evaluator::new(&registry);
    let expr = parse("pct_of_total(revenue)").unwrap();

    let output = evaluator
        .evaluate_column(&expr, &rows, ColumnOptions::default())
        .unwrap();
    assert_eq!(
        output.values,
        vec![
            Value::Number(100.0 / 600.0 * 100.0),
            Value::Number(50.0 / 600.0 * 100.0),
            Value::Number(300.0 / 600.0 * 100.0),
            Value::Number(150.0 / 600.0 * 100.0),
        ]
    );
}

#[test]
fn test_column_with_partition() {
    let rows = sales();
    let registry = FunctionRegistry::builtin();
    let evaluator = Evaluator::new(&registry);
    let expr = parse("rank(revenue)").unwrap();

    let options = ColumnOptions {
        partition_by: Some("region"),
        ..Default::default()
    };
    let output = evaluator.evaluate_column(&expr, &rows, options).unwrap();
    assert_eq!(
        output.values,
        vec![
            Value::Number(1.0),
            Value::Number(1.0),
            Value::Number(2.0),
            Value::Number(2.0),
        ]
    );
}

#[test]
fn test_null_partition_key_is_its_own_group() {
    let mut rows = sales();
    rows.push(row(vec![("region", Value::Null), ("revenue", 7.0.into())]));
    rows.push(row(vec![("revenue", 9.0.into())]));
    let registry = FunctionRegistry::builtin();
    let evaluator = Evaluator::new(&registry);
    let expr = parse("sum(revenue)").unwrap();

    let options = ColumnOptions {
        partition_by: Some("region"),
        ..Default::default()
    };
    let output = evaluator.evaluate_column(&expr, &rows, options).unwrap();
    assert_eq!(output.values[0], Value::Number(400.0));
    assert_eq!(output.values[1], Value::Number(200.0));
    assert_eq!(output.values[4], Value::Number(16.0));
    assert_eq!(output.values[5], Value::Number(16.0));
}

#[test]
fn test_filtered_rows_are_null_and_excluded_from_partitions() {
    let rows = sales();
    let registry = FunctionRegistry::builtin();
    let evaluator = Evaluator::new(&registry);
    let expr = parse("sum(revenue)").unwrap();

    let filter = vec![RowFilter::new("revenue", FilterOp::Gt, 60.0)];
    let options = ColumnOptions {
        filter: &filter,
        ..Default::default()
    };
    let output = evaluator.evaluate_column(&expr, &rows, options).unwrap();
    assert_eq!(
        output.values,
        vec![
            Value::Number(550.0),
            Value::Null,
            Value::Number(550.0),
            Value::Number(550.0),
        ]
    );
    assert_eq!(output.stats.null_count, 1);
}

#[test]
fn test_column_stats_come_with_values() {
    let rows = sales();
    let registry = FunctionRegistry::builtin();
    let evaluator = Evaluator::new(&registry);
    let expr = parse("revenue / 50").unwrap();

    let output = evaluator
        .evaluate_column(&expr, &rows, ColumnOptions::default())
        .unwrap();
    assert_eq!(output.stats.row_count, 4);
    assert_eq!(output.stats.null_count, 0);
    assert_eq!(output.stats.min, Some(Value::Number(1.0)));
    assert_eq!(output.stats.max, Some(Value::Number(6.0)));
    assert_eq!(output.stats.mean, Some(3.0));
}

#[test]
fn test_nested_partition_calls() {
    let rows = sales();
    let registry = FunctionRegistry::builtin();
    let evaluator = Evaluator::new(&registry);
    // rank of the deviation from the mean, computed once per partition
    let expr = parse("rank(revenue - mean(revenue)) + count(revenue)").unwrap();

    let output = evaluator
        .evaluate_column(&expr, &rows, ColumnOptions::default())
        .unwrap();
    assert_eq!(
        output.values,
        vec![
            Value::Number(6.0),
            Value::Number(5.0),
            Value::Number(8.0),
            Value::Number(7.0),
        ]
    );
}

#[test]
fn test_evaluation_error_aborts_column() {
    let rows = sales();
    let registry = FunctionRegistry::builtin();
    let evaluator = Evaluator::new(&registry);
    let expr = parse("region * 2").unwrap();
    assert!(
        evaluator
            .evaluate_column(&expr, &rows, ColumnOptions::default())
            .is_err()
    );
}
