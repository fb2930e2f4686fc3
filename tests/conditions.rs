// Condition Expression Scenarios
// End-to-end coverage of parsing and evaluating gate conditions

use pipeline_expressions::{
    parse, ConvertError, EvaluationContext, ExtensionFunction, ExtensionRegistry, Kind,
    NoopTraceWriter, ParseError, ParseErrorKind, Value, Version,
};

use rust_decimal::Decimal;

use std::any::Any;
use std::str::FromStr;

/// Registry resembling what a build agent wires up: job-status functions
/// plus a state accessor.
fn agent_registry() -> ExtensionRegistry {
    let mut registry = ExtensionRegistry::new();
    registry
        .register(ExtensionFunction::new("always", 0, 0, |_args, _context| {
            Ok(Value::Boolean(true))
        }))
        .unwrap();
    registry
        .register(ExtensionFunction::new(
            "succeeded",
            0,
            0,
            |_args, context| {
                let succeeded = context
                    .state
                    .and_then(|state| state.downcast_ref::<JobState>())
                    .map(|job| job.succeeded)
                    .unwrap_or(false);
                Ok(Value::Boolean(succeeded))
            },
        ))
        .unwrap();
    registry
        .register(ExtensionFunction::new(
            "variables",
            1,
            1,
            |args, context| {
                let name = args[0].convert_to_string()?;
                let value = context
                    .state
                    .and_then(|state| state.downcast_ref::<JobState>())
                    .and_then(|job| {
                        job.variables
                            .iter()
                            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
                            .map(|(_, value)| value.clone())
                    })
                    .unwrap_or(Value::Null);
                Ok(value)
            },
        ))
        .unwrap();
    registry
        .register(ExtensionFunction::new("testData", 0, 0, |_args, context| {
            Ok(context
                .state
                .and_then(|state| state.downcast_ref::<Value>())
                .cloned()
                .unwrap_or(Value::Null))
        }))
        .unwrap();
    registry
}

struct JobState {
    succeeded: bool,
    variables: Vec<(String, Value)>,
}

fn check(raw: &str, state: Option<&dyn Any>) -> Result<bool, ConvertError> {
    let registry = agent_registry();
    let expression = parse(raw, &mut NoopTraceWriter, &registry).unwrap();
    let mut trace = NoopTraceWriter;
    let mut context = EvaluationContext::new(&mut trace, state);
    expression.evaluate_boolean(&mut context)
}

fn check_parse(raw: &str) -> Result<(), ParseError> {
    let registry = agent_registry();
    parse(raw, &mut NoopTraceWriter, &registry).map(|_| ())
}

#[test]
fn gate_on_job_status_and_variable() {
    let state = JobState {
        succeeded: true,
        variables: vec![("env".to_string(), Value::from("prod"))],
    };
    assert!(check(
        "and(succeeded(), eq(variables('env'), 'prod'))",
        Some(&state)
    )
    .unwrap());

    let state = JobState {
        succeeded: true,
        variables: vec![("env".to_string(), Value::from("staging"))],
    };
    assert!(!check(
        "and(succeeded(), eq(variables('env'), 'prod'))",
        Some(&state)
    )
    .unwrap());

    let state = JobState {
        succeeded: false,
        variables: vec![("env".to_string(), Value::from("prod"))],
    };
    assert!(!check(
        "and(succeeded(), eq(variables('env'), 'prod'))",
        Some(&state)
    )
    .unwrap());
}

#[test]
fn unrecognized_literal_fails_to_parse() {
    let err = check_parse("eq(1.2, 3.4a)").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UnrecognizedValue);
    assert_eq!(err.raw_token, "3.4a");
}

#[test]
fn short_circuit_skips_failing_conversion() {
    // gt would demand a Number from 'not a number'; and() must never
    // reach it.
    assert!(!check("and(false, gt(1, 'not a number'))", None).unwrap());
    assert!(check("or(true, gt(1, 'not a number'))", None).unwrap());
    assert!(check("in(1, 1, gt(1, 'not a number'))", None).unwrap());

    // Reached, the conversion fails loudly.
    let err = check("gt(1, 'not a number')", None).unwrap_err();
    assert_eq!(err.from_kind, Kind::String);
    assert_eq!(err.to_kind, Kind::Number);
}

#[test]
fn numeric_equality_coerces_formatted_strings() {
    assert!(check("eq(123456.789, ' +123,456.789 ')", None).unwrap());
    assert!(!check("eq(123456.789, '123 456.789')", None).unwrap());
}

#[test]
fn ordering_two_component_version_against_four() {
    let registry = agent_registry();
    let expression = parse("gt(1.2, 1.2.0.0)", &mut NoopTraceWriter, &registry).unwrap();
    let mut trace = NoopTraceWriter;
    let mut context = EvaluationContext::new(&mut trace, None);
    let err = expression.evaluate_boolean(&mut context).unwrap_err();
    assert_eq!(err.from_kind, Kind::Version);
    assert_eq!(err.to_kind, Kind::Number);
    assert_eq!(err.value, Value::Version(Version::parse("1.2.0.0").unwrap()));
}

#[test]
fn state_object_indexing() {
    let state = Value::from(serde_json::json!({
        "subObj": { "nestedProp1": "v1" },
        "prop1": "property value 1",
        "array": ["a0", "a1"],
    }));

    assert!(check("eq('property value 1', testData()['prop1'])", Some(&state)).unwrap());
    assert!(check("eq('v1', testData().subObj.nestedProp1)", Some(&state)).unwrap());
    assert!(check("eq('a1', testData()['array'][1])", Some(&state)).unwrap());
    assert!(check("eq('', testData()['no such prop'])", Some(&state)).unwrap());
}

#[test]
fn cross_kind_equality_scenarios() {
    assert!(check("eq(1, true)", None).unwrap());
    assert!(!check("eq(2, true)", None).unwrap());
    assert!(check("eq('TRue', true)", None).unwrap());
    // With no state bound testData() yields Null, which stringifies empty.
    assert!(check("eq('', testData())", None).unwrap());
}

#[test]
fn equality_and_membership_are_consistent_negations() {
    let pairs = [
        ("eq(1, '1')", "ne(1, '1')"),
        ("eq('a', 'B')", "ne('a', 'B')"),
        ("eq(1.2.3, '1.2.3')", "ne(1.2.3, '1.2.3')"),
        ("in('b', 'a', 'B', 'c')", "notIn('b', 'a', 'B', 'c')"),
        ("in(5, 1, 2, 3)", "notIn(5, 1, 2, 3)"),
    ];
    for (positive, negative) in pairs {
        let a = check(positive, None).unwrap();
        let b = check(negative, None).unwrap();
        assert!(a != b, "{} and {} must disagree", positive, negative);
    }
}

#[test]
fn not_in_checks_every_candidate() {
    // The match sits past the second parameter; notIn must still see it.
    assert!(!check("notIn('d', 'a', 'b', 'c', 'D')", None).unwrap());
    assert!(check("notIn('z', 'a', 'b', 'c', 'd')", None).unwrap());
}

#[test]
fn string_predicates_fold_ascii_case() {
    assert!(check("contains('Refs/Heads/Main', 'heads')", None).unwrap());
    assert!(!check("contains('refs/heads/main', 'tags')", None).unwrap());
    assert!(check("startsWith('refs/heads/main', 'REFS/')", None).unwrap());
    assert!(check("endsWith('refs/heads/MAIN', 'main')", None).unwrap());
    // Both operands are coerced to strings first.
    assert!(check("startsWith(1.2.3, '1.2')", None).unwrap());
    assert!(check("contains(true, 'RU')", None).unwrap());
}

#[test]
fn logical_functions() {
    assert!(check("not(false)", None).unwrap());
    assert!(!check("not('yes')", None).unwrap());
    assert!(check("xor(true, false)", None).unwrap());
    assert!(!check("xor(true, 'x')", None).unwrap());
    assert!(check("and(true, 1, 'x', 1.2.3)", None).unwrap());
    assert!(!check("or(false, 0, '')", None).unwrap());
}

#[test]
fn ordering_functions() {
    assert!(check("lt(1, 2)", None).unwrap());
    assert!(check("le('apple', 'APPLE')", None).unwrap());
    assert!(check("gt('b', 'A')", None).unwrap());
    assert!(check("ge(1.2.3, 1.2.3)", None).unwrap());
    assert!(check("lt(1.2.3, 1.2.3.0)", None).unwrap());
    assert!(check("gt(true, false)", None).unwrap());
    // Null normalizes to Number zero on the left.
    assert!(check("lt(testData(), 1)", None).unwrap());
}

#[test]
fn whitespace_between_tokens_is_insignificant() {
    let registry = agent_registry();
    let tight = parse(
        "and(succeeded(),eq(variables('env'),'prod'))",
        &mut NoopTraceWriter,
        &registry,
    )
    .unwrap();
    let airy = parse(
        " and ( succeeded ( ) , eq( variables ( 'env' ) , 'prod' ) ) ",
        &mut NoopTraceWriter,
        &registry,
    )
    .unwrap();
    assert_eq!(tight.root(), airy.root());
}

#[test]
fn parse_error_rendering() {
    let err = check_parse("and(true, false").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unclosed function: 'and'. Located at position 1 within condition expression: and(true, false"
    );
}

#[test]
fn number_projection_round_trips_decimal_precision() {
    let registry = agent_registry();
    // 28 significant digits survive; a binary double could not hold this.
    let expression = parse("2147483648.1", &mut NoopTraceWriter, &registry).unwrap();
    let mut trace = NoopTraceWriter;
    let mut context = EvaluationContext::new(&mut trace, None);
    assert_eq!(
        expression.evaluate_number(&mut context).unwrap(),
        Decimal::from_str("2147483648.1").unwrap()
    );
    assert!(check("eq(123456789012345678901234.5678, '123456789012345678901234.5678')", None).unwrap());
}
