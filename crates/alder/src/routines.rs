//! Prebuilt kernel subroutines, encoded once at program start: the record
//! field access and record update routines, and the adaptive
//! partial-application trampoline.
//!
//! All three follow the same convention as emitted user code: they run with
//! `Environment = [envFunctions, arguments]`, and recursion re-enters the
//! routine through `ParseAndEval` with the routine's own encoded form as the
//! first environment entry.

use std::sync::LazyLock;

use crate::kernel::{Expr, FUNCTION_TAG, RECORD_TAG, Value, encode};

/// Reserved environment entry name under which the trampoline is threaded
/// into declarations. The angle brackets keep it out of the surface
/// language's identifier space.
pub const PARTIAL_APPLICATION_NAME: &str = "<partial-application>";

fn env_functions() -> Expr {
    Expr::item(0, Expr::Environment)
}

fn arguments() -> Expr {
    Expr::item(1, Expr::Environment)
}

fn argument(index: usize) -> Expr {
    Expr::item(index, arguments())
}

/// `[fields]` sits at index 1 of a record value; the fields list is its sole
/// element.
fn record_fields(record: Expr) -> Expr {
    Expr::item(0, Expr::item(1, record))
}

/// The recursive scanner behind field access: environment
/// `[[self], [fields, fieldName]]`, result the field's value, or the empty
/// list when the field is missing.
static RECORD_ACCESS_SCAN: LazyLock<Value> = LazyLock::new(|| {
    let fields = argument(0);
    let name = argument(1);
    let this = Expr::item(0, env_functions());
    let entry = Expr::head(fields.clone());
    let body = Expr::conditional(
        Expr::equal2(Expr::length(fields.clone()), Expr::lit(Value::from_i64(0))),
        Expr::lit(Value::empty_list()),
        Expr::conditional(
            Expr::equal2(Expr::item(0, entry.clone()), name.clone()),
            Expr::item(1, entry),
            Expr::parse_and_eval(
                this,
                Expr::List(vec![
                    env_functions(),
                    Expr::List(vec![Expr::skip(1, fields), name]),
                ]),
            ),
        ),
    );
    encode(&body)
});

/// Body of a field access: tag check, then the recursive scan over the
/// fields list.
fn record_access_body(record: Expr, name: Expr) -> Expr {
    let scan = Expr::lit(RECORD_ACCESS_SCAN.clone());
    Expr::conditional(
        Expr::equal2(Expr::head(record.clone()), Expr::lit(Value::name(RECORD_TAG))),
        Expr::parse_and_eval(
            scan.clone(),
            Expr::List(vec![
                Expr::List(vec![scan]),
                Expr::List(vec![record_fields(record), name]),
            ]),
        ),
        Expr::lit(Value::empty_list()),
    )
}

/// The record field access routine: environment `[[], [record, fieldName]]`.
pub static RECORD_ACCESS: LazyLock<Expr> =
    LazyLock::new(|| record_access_body(argument(0), argument(1)));

/// A unary access routine with the field name baked in, used as a
/// deconstruction step for record patterns: environment `[[], [record]]`.
pub fn record_field_access_routine(field: &str) -> Expr {
    record_access_body(argument(0), Expr::lit(Value::name(field)))
}

/// Replaces the first field entry matching the pair's name, preserving field
/// order: environment `[[update, setField], [fields, pair]]`.
static RECORD_SET_FIELD: LazyLock<Value> = LazyLock::new(|| {
    let fields = argument(0);
    let pair = argument(1);
    let set_field = Expr::item(1, env_functions());
    let body = Expr::conditional(
        Expr::equal2(Expr::length(fields.clone()), Expr::lit(Value::from_i64(0))),
        Expr::lit(Value::empty_list()),
        Expr::conditional(
            Expr::equal2(
                Expr::item(0, Expr::head(fields.clone())),
                Expr::item(0, pair.clone()),
            ),
            Expr::concat(vec![
                Expr::List(vec![pair.clone()]),
                Expr::skip(1, fields.clone()),
            ]),
            Expr::concat(vec![
                Expr::List(vec![Expr::head(fields.clone())]),
                Expr::parse_and_eval(
                    set_field,
                    Expr::List(vec![
                        env_functions(),
                        Expr::List(vec![Expr::skip(1, fields), pair]),
                    ]),
                ),
            ]),
        ),
    );
    encode(&body)
});

/// Applies the replacement pairs one by one: environment
/// `[[update, setField], [fields, pairs]]`.
static RECORD_UPDATE_FIELDS: LazyLock<Value> = LazyLock::new(|| {
    let fields = argument(0);
    let pairs = argument(1);
    let update = Expr::item(0, env_functions());
    let set_field = Expr::item(1, env_functions());
    let updated_once = Expr::parse_and_eval(
        set_field,
        Expr::List(vec![
            env_functions(),
            Expr::List(vec![fields.clone(), Expr::head(pairs.clone())]),
        ]),
    );
    let body = Expr::conditional(
        Expr::equal2(Expr::length(pairs.clone()), Expr::lit(Value::from_i64(0))),
        fields,
        Expr::parse_and_eval(
            update,
            Expr::List(vec![
                env_functions(),
                Expr::List(vec![updated_once, Expr::skip(1, pairs)]),
            ]),
        ),
    );
    encode(&body)
});

/// The record update routine: environment `[[], [record, pairs]]` where
/// `pairs` is a list of `[fieldName, newValue]` entries. Rebuilds the record
/// with the affected fields replaced in place.
pub static RECORD_UPDATE: LazyLock<Expr> = LazyLock::new(|| {
    let record = argument(0);
    let pairs = argument(1);
    let update = Expr::lit(RECORD_UPDATE_FIELDS.clone());
    let set_field = Expr::lit(RECORD_SET_FIELD.clone());
    Expr::conditional(
        Expr::equal2(Expr::head(record.clone()), Expr::lit(Value::name(RECORD_TAG))),
        Expr::List(vec![
            Expr::lit(Value::name(RECORD_TAG)),
            Expr::List(vec![Expr::parse_and_eval(
                update.clone(),
                Expr::List(vec![
                    Expr::List(vec![update, set_field]),
                    Expr::List(vec![record_fields(record), pairs]),
                ]),
            )]),
        ]),
        Expr::lit(Value::empty_list()),
    )
});

/// The adaptive partial-application trampoline: environment
/// `[[self], [function, remainingArgs]]`.
///
/// Consumes the remaining arguments one at a time. Function-record callees
/// collect arguments until their arity is reached, at which point the inner
/// body is evaluated under `[envFunctions, collected]`; whatever it returns
/// flows back through the trampoline with the rest of the arguments, which
/// is what makes over-application work. Anything that is not a function
/// record is treated as an encoded program and evaluated with the next
/// argument as its entire environment.
pub static PARTIAL_APPLICATION: LazyLock<Expr> = LazyLock::new(|| {
    let function = argument(0);
    let remaining = argument(1);
    let this = Expr::item(0, env_functions());

    let recurse = |next_function: Expr, rest: Expr| {
        Expr::parse_and_eval(
            this.clone(),
            Expr::List(vec![env_functions(), Expr::List(vec![next_function, rest])]),
        )
    };

    let record = Expr::item(1, function.clone());
    let inner = Expr::item(0, record.clone());
    let arity = Expr::item(1, record.clone());
    let env_fns = Expr::item(2, record.clone());
    let collected = Expr::item(3, record);
    let collected_next = Expr::concat(vec![collected, Expr::take(1, remaining.clone())]);

    let apply_record = Expr::conditional(
        Expr::equal2(Expr::length(collected_next.clone()), arity.clone()),
        recurse(
            Expr::parse_and_eval(
                inner.clone(),
                Expr::List(vec![env_fns.clone(), collected_next.clone()]),
            ),
            Expr::skip(1, remaining.clone()),
        ),
        recurse(
            Expr::List(vec![
                Expr::lit(Value::name(FUNCTION_TAG)),
                Expr::List(vec![inner, arity, env_fns, collected_next]),
            ]),
            Expr::skip(1, remaining.clone()),
        ),
    );

    Expr::conditional(
        Expr::equal2(Expr::length(remaining.clone()), Expr::lit(Value::from_i64(0))),
        function.clone(),
        Expr::conditional(
            Expr::equal2(Expr::head(function.clone()), Expr::lit(Value::name(FUNCTION_TAG))),
            apply_record,
            recurse(
                Expr::parse_and_eval(function, Expr::head(remaining.clone())),
                Expr::skip(1, remaining),
            ),
        ),
    )
});

/// The trampoline's encoded form, the value every partial-application
/// environment slot carries.
pub static PARTIAL_APPLICATION_VALUE: LazyLock<Value> =
    LazyLock::new(|| encode(&PARTIAL_APPLICATION));

/// A call into the trampoline: `function` applied to the elements of
/// `arguments_list` one by one.
pub fn partial_application_call(function: Expr, arguments_list: Expr) -> Expr {
    let encoded = Expr::lit(PARTIAL_APPLICATION_VALUE.clone());
    Expr::parse_and_eval(
        encoded.clone(),
        Expr::List(vec![
            Expr::List(vec![encoded]),
            Expr::List(vec![function, arguments_list]),
        ]),
    )
}

/// A closed function-record value as stored in module values and the
/// persistent environment.
pub fn function_record_value(
    inner: Value,
    parameter_count: usize,
    env_functions: Vec<Value>,
) -> Value {
    Value::tag(
        FUNCTION_TAG,
        vec![
            inner,
            Value::from_i64(parameter_count as i64),
            Value::List(env_functions),
            Value::empty_list(),
        ],
    )
}

/// Destructures a function-record value into
/// `(inner, parameterCount, envFunctions, collected)`.
pub fn parse_function_record(value: &Value) -> Option<(&Value, usize, &[Value], &[Value])> {
    let (tag, args) = value.as_tagged()?;
    if tag != FUNCTION_TAG {
        return None;
    }
    let [inner, parameter_count, Value::List(env_functions), Value::List(collected)] = args else {
        return None;
    };
    let parameter_count = usize::try_from(parameter_count.as_i64()?).ok()?;
    Some((inner, parameter_count, env_functions, collected))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{
        PARTIAL_APPLICATION_VALUE, RECORD_ACCESS, RECORD_UPDATE, function_record_value,
        partial_application_call, record_field_access_routine,
    };
    use crate::kernel::{Expr, KernelFunction, Value, encode, evaluate};

    fn run_routine(routine: &Expr, arguments: Vec<Value>) -> Value {
        let env = Value::List(vec![Value::empty_list(), Value::List(arguments)]);
        evaluate(&env, routine).unwrap()
    }

    fn sample_record() -> Value {
        Value::record(vec![
            ("alpha".to_owned(), Value::from_i64(1)),
            ("beta".to_owned(), Value::from_i64(2)),
        ])
    }

    #[test]
    fn record_access_finds_fields() {
        let record = sample_record();
        for (field, expected) in [("alpha", 1), ("beta", 2)] {
            let result = run_routine(
                &RECORD_ACCESS,
                vec![record.clone(), Value::name(field)],
            );
            assert_eq!(result, Value::from_i64(expected), "field {field}");
        }
        // missing fields and non-records yield the empty list
        let missing = run_routine(&RECORD_ACCESS, vec![record, Value::name("gamma")]);
        assert_eq!(missing, Value::empty_list());
        let not_record = run_routine(
            &RECORD_ACCESS,
            vec![Value::from_i64(3), Value::name("alpha")],
        );
        assert_eq!(not_record, Value::empty_list());
    }

    #[test]
    fn field_access_routine_bakes_in_the_name() {
        let routine = record_field_access_routine("beta");
        let env = Value::List(vec![
            Value::empty_list(),
            Value::List(vec![sample_record()]),
        ]);
        assert_eq!(evaluate(&env, &routine).unwrap(), Value::from_i64(2));
    }

    #[test]
    fn record_update_replaces_in_place() {
        let pairs = Value::List(vec![Value::List(vec![
            Value::name("alpha"),
            Value::from_i64(9),
        ])]);
        let updated = run_routine(&RECORD_UPDATE, vec![sample_record(), pairs]);
        let expected = Value::record(vec![
            ("alpha".to_owned(), Value::from_i64(9)),
            ("beta".to_owned(), Value::from_i64(2)),
        ]);
        assert_eq!(updated, expected);
    }

    /// A two-parameter function record computing `arg0 - arg1`.
    fn subtract_record() -> Value {
        let args = Expr::item(1, Expr::Environment);
        let body = Expr::kernel(
            KernelFunction::IntAdd,
            Expr::List(vec![
                Expr::item(0, args.clone()),
                Expr::negate(Expr::item(1, args)),
            ]),
        );
        function_record_value(encode(&body), 2, Vec::new())
    }

    #[test]
    fn trampoline_fully_applies_a_function_record() {
        let call = partial_application_call(
            Expr::lit(subtract_record()),
            Expr::List(vec![
                Expr::lit(Value::from_i64(10)),
                Expr::lit(Value::from_i64(3)),
            ]),
        );
        assert_eq!(
            evaluate(&Value::empty_list(), &call).unwrap(),
            Value::from_i64(7)
        );
    }

    #[test]
    fn trampoline_collects_partial_arguments() {
        let call = partial_application_call(
            Expr::lit(subtract_record()),
            Expr::List(vec![Expr::lit(Value::from_i64(10))]),
        );
        let result = evaluate(&Value::empty_list(), &call).unwrap();
        let (_, parameter_count, _, collected) =
            super::parse_function_record(&result).expect("a partially applied function record");
        assert_eq!(parameter_count, 2);
        assert_eq!(collected, [Value::from_i64(10)]);
    }

    #[test]
    fn trampoline_resumes_after_partial_collection() {
        // apply one argument, then feed the partial record the second one
        let first = partial_application_call(
            Expr::lit(subtract_record()),
            Expr::List(vec![Expr::lit(Value::from_i64(10))]),
        );
        let partial = evaluate(&Value::empty_list(), &first).unwrap();
        let second = partial_application_call(
            Expr::lit(partial),
            Expr::List(vec![Expr::lit(Value::from_i64(3))]),
        );
        assert_eq!(
            evaluate(&Value::empty_list(), &second).unwrap(),
            Value::from_i64(7)
        );
    }

    #[test]
    fn trampoline_value_is_stable() {
        // the encoded trampoline is a process-wide constant
        assert_eq!(*PARTIAL_APPLICATION_VALUE, PARTIAL_APPLICATION_VALUE.clone());
    }
}
