//! Sandbox containment tests: the forbidden-name list, the execution
//! budget, and boundary value conversion.

use amsengine::definition::{ScriptDef, ScriptNamespace};
use amsengine::script::runtime::ScriptRuntime;
use amsengine::script::sandbox::FORBIDDEN_NAMES;
use mlua::Value;

fn runtime() -> ScriptRuntime {
    ScriptRuntime::new(200_000).unwrap()
}

fn behavior(name: &str, source: &str) -> ScriptDef {
    ScriptDef {
        name: name.to_string(),
        namespace: ScriptNamespace::Behavior,
        source: source.to_string(),
        origin: format!("behaviors.{name}"),
    }
}

#[test]
fn every_forbidden_name_evaluates_to_nil() {
    let runtime = runtime();
    for name in FORBIDDEN_NAMES {
        let probe = format!(
            "local ok, v = pcall(function() return {name} end)\nif ok then return v end\nreturn nil"
        );
        let value = runtime.eval(&probe).unwrap();
        assert!(
            matches!(value, Value::Nil),
            "forbidden name '{name}' is reachable"
        );
    }
}

#[test]
fn whitelist_survives_the_clear() {
    let runtime = runtime();
    for name in ["pairs", "ipairs", "type", "tostring", "tonumber", "pcall", "select", "math", "ams"] {
        let value = runtime.eval(&format!("return {name}")).unwrap();
        assert!(
            !matches!(value, Value::Nil),
            "whitelisted name '{name}' was removed"
        );
    }
    // The impure corners of math are gone.
    assert!(matches!(runtime.eval("return math.random").unwrap(), Value::Nil));
    assert!(matches!(runtime.eval("return math.randomseed").unwrap(), Value::Nil));
    // The pure ones stay.
    let pi: f64 = match runtime.eval("return math.pi").unwrap() {
        Value::Number(n) => n,
        other => panic!("math.pi was {other:?}"),
    };
    assert!((pi - std::f64::consts::PI).abs() < 1e-12);
}

#[test]
fn calling_a_forbidden_name_errors_without_poisoning_the_runtime() {
    let runtime = runtime();
    assert!(runtime.eval("return io.open('/etc/passwd')").is_err());
    assert!(runtime.eval("return load('return 1')()").is_err());
    // The interpreter is still healthy afterwards.
    let value = runtime.eval("return 1 + 1").unwrap();
    assert!(matches!(value, Value::Integer(2) | Value::Number(_)));
}

#[test]
fn script_exceptions_are_contained_per_invocation() {
    let mut runtime = runtime();
    runtime
        .compile(&behavior(
            "crashy",
            "local M = {}\nfunction M.on_update(id) error('boom') end\nfunction M.ok(id) return 42 end\nreturn M",
        ))
        .unwrap();
    let err = runtime.call("crashy", "on_update", "e1", ("e1",)).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("crashy"), "context missing: {message}");
    assert!(message.contains("on_update"), "context missing: {message}");
    // The next invocation on the same runtime succeeds.
    let value = runtime.call("crashy", "ok", "e1", ("e1",)).unwrap();
    assert!(matches!(value, Value::Integer(42) | Value::Number(_)));
}

#[test]
fn runaway_scripts_hit_the_execution_budget() {
    let mut runtime = ScriptRuntime::new(50_000).unwrap();
    runtime
        .compile(&behavior(
            "spinner",
            "local M = {}\nfunction M.on_update(id)\n  local x = 0\n  while true do x = x + 1 end\nend\nreturn M",
        ))
        .unwrap();
    let err = runtime.call("spinner", "on_update", "e1", ("e1",)).unwrap_err();
    assert!(
        err.to_string().contains("budget"),
        "unexpected error: {err}"
    );
}

#[test]
fn missing_entry_points_are_reported_not_invented() {
    let mut runtime = runtime();
    runtime
        .compile(&behavior("quiet", "return {}"))
        .unwrap();
    assert!(!runtime.exports("quiet", "on_update"));
    assert!(runtime.call("quiet", "on_update", "e1", ("e1",)).is_err());
}

#[test]
fn ams_math_is_deterministic_under_a_seed() {
    let runtime_a = runtime();
    let runtime_b = runtime();
    for rt in [&runtime_a, &runtime_b] {
        rt.with_shadow(|s| s.rng = fastrand::Rng::with_seed(99));
    }
    let sample = |rt: &ScriptRuntime| -> Vec<f64> {
        (0..16)
            .map(|_| match rt.eval("return ams.random()").unwrap() {
                Value::Number(n) => n,
                other => panic!("expected number, got {other:?}"),
            })
            .collect()
    };
    assert_eq!(sample(&runtime_a), sample(&runtime_b));

    let in_range = match runtime_a.eval("return ams.random_range(5, 6)").unwrap() {
        Value::Number(n) => n,
        other => panic!("expected number, got {other:?}"),
    };
    assert!((5.0..=6.0).contains(&in_range));
}

#[test]
fn unconvertible_values_never_cross_the_boundary() {
    let runtime = runtime();
    runtime.with_shadow(|s| {
        s.type_defaults.insert(
            "thing".to_string(),
            amsengine::script::shadow::TypeDefaults {
                width: 10.0,
                height: 10.0,
                max_hits: 1,
                ..Default::default()
            },
        );
        s.entity_cap = 8;
        s.spawn_cap_per_frame = 8;
    });
    let id: String = match runtime.eval("return ams.spawn('thing', 1, 2)").unwrap() {
        Value::String(s) => s.to_string_lossy().to_string(),
        other => panic!("spawn returned {other:?}"),
    };
    // A function is outside the primitive whitelist: the write is
    // dropped, not mangled.
    runtime
        .eval(&format!(
            "ams.set_prop('{id}', 'f', function() end)\nams.set_prop('{id}', 'n', 7)"
        ))
        .unwrap();
    let f = runtime.eval(&format!("return ams.get_prop('{id}', 'f')")).unwrap();
    assert!(matches!(f, Value::Nil));
    let n = runtime.eval(&format!("return ams.get_prop('{id}', 'n')")).unwrap();
    assert!(matches!(n, Value::Number(_) | Value::Integer(7)));
}

#[test]
fn reads_on_unknown_ids_return_safe_defaults() {
    let runtime = runtime();
    assert!(matches!(
        runtime.eval("return ams.get_x('ghost')").unwrap(),
        Value::Number(_) | Value::Integer(0)
    ));
    assert!(matches!(
        runtime.eval("return ams.is_alive('ghost')").unwrap(),
        Value::Boolean(false)
    ));
    assert!(matches!(
        runtime.eval("return ams.get_prop('ghost', 'x')").unwrap(),
        Value::Nil
    ));
    // Writes on unknown ids are silent no-ops.
    runtime.eval("ams.set_x('ghost', 5)").unwrap();
    runtime.eval("ams.destroy('ghost')").unwrap();
}
