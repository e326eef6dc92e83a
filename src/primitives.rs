// パス: src/primitives.rs
// 役割: 実行時の組み込み関数・組み込みプロトタイプを実行環境へ導入する
// 意図: 組み込み一覧を表で持ち、評価器本体から初期化処理を切り離す
// 関連ファイル: src/evaluator.rs, src/runtime.rs, src/intrinsics.rs, src/capabilities.rs
//! 組み込み（primitives）
//!
//! - 各メソッドは `NativeFn` として表に並べ、`install` が一括で登録する。
//! - `JSON` は `serde_json` の値と相互変換する。

use std::cell::Cell;
use std::cmp::Ordering;
use std::rc::Rc;

use serde::Serialize;
use serde_json::Value as Json;

use crate::evaluator::{property_key, Interpreter};
use crate::runtime::{
    array_index, emit_error_line, emit_line, emit_raw, error_headline, inspect, number_to_string,
    strict_equals, to_display_string, to_number, truthy, Callable, JsObject, NativeFn, ObjKind,
    ObjRef, Unwind, Value,
};

type Native = Result<Value, Unwind>;

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

fn define(target: &ObjRef, name: &str, v: Value) {
    target.borrow_mut().props.set(name, v);
}

fn define_methods(interp: &Interpreter, target: &ObjRef, methods: &[(&'static str, NativeFn)]) {
    for (name, f) in methods {
        define(target, name, interp.native_fn(*name, *f));
    }
}

/// コンストラクタ関数を作り、`prototype`/`constructor` を相互に結ぶ。
fn constructor(interp: &Interpreter, name: &'static str, f: NativeFn, proto: &ObjRef) -> ObjRef {
    let ctor = JsObject::new(
        Some(Rc::clone(&interp.realm.function_proto)),
        ObjKind::Function(Callable::Native { name, f }),
    );
    define(&ctor, "prototype", Value::Object(Rc::clone(proto)));
    define(proto, "constructor", Value::Object(Rc::clone(&ctor)));
    ctor
}

/// 実行環境へ組み込みを導入する。
pub fn install(interp: &mut Interpreter) {
    let realm_object = Rc::clone(&interp.realm.object_proto);
    let realm_function = Rc::clone(&interp.realm.function_proto);
    let realm_array = Rc::clone(&interp.realm.array_proto);
    let realm_string = Rc::clone(&interp.realm.string_proto);
    let realm_number = Rc::clone(&interp.realm.number_proto);
    let realm_boolean = Rc::clone(&interp.realm.boolean_proto);

    define_methods(interp, &realm_object, OBJECT_PROTO_METHODS);
    define_methods(interp, &realm_function, FUNCTION_PROTO_METHODS);
    define_methods(interp, &realm_array, ARRAY_METHODS);
    define_methods(interp, &realm_string, STRING_METHODS);
    define_methods(interp, &realm_number, NUMBER_METHODS);
    define_methods(interp, &realm_boolean, BOOLEAN_METHODS);

    let global = interp.global().clone();
    let object_ctor = constructor(interp, "Object", object_ctor, &realm_object);
    define_methods(interp, &object_ctor, OBJECT_STATICS);
    global.declare("Object", Value::Object(object_ctor));
    global.declare(
        "Function",
        Value::Object(constructor(interp, "Function", function_ctor, &realm_function)),
    );
    let array_ctor = constructor(interp, "Array", array_ctor, &realm_array);
    define_methods(interp, &array_ctor, &[("isArray", array_is_array)]);
    global.declare("Array", Value::Object(array_ctor));
    let string_ctor = constructor(interp, "String", string_ctor, &realm_string);
    define_methods(interp, &string_ctor, &[("fromCharCode", string_from_char_code)]);
    global.declare("String", Value::Object(string_ctor));
    let number_ctor = constructor(interp, "Number", number_ctor, &realm_number);
    define(&number_ctor, "MAX_SAFE_INTEGER", Value::Number(9007199254740991.0));
    define(&number_ctor, "MIN_SAFE_INTEGER", Value::Number(-9007199254740991.0));
    define(&number_ctor, "NaN", Value::Number(f64::NAN));
    define_methods(interp, &number_ctor, &[("isInteger", number_is_integer)]);
    global.declare("Number", Value::Object(number_ctor));
    global.declare(
        "Boolean",
        Value::Object(constructor(interp, "Boolean", boolean_ctor, &realm_boolean)),
    );

    install_errors(interp);

    global.declare("undefined", Value::Undefined);
    global.declare("NaN", Value::Number(f64::NAN));
    global.declare("Infinity", Value::Number(f64::INFINITY));
    for (name, f) in GLOBAL_FUNCTIONS {
        global.declare(*name, interp.native_fn(*name, *f));
    }

    let console = JsObject::new(Some(Rc::clone(&realm_object)), ObjKind::Ordinary);
    define_methods(interp, &console, CONSOLE_METHODS);
    global.declare("console", Value::Object(console));

    let math = JsObject::new(Some(Rc::clone(&realm_object)), ObjKind::Ordinary);
    define(&math, "PI", Value::Number(std::f64::consts::PI));
    define(&math, "E", Value::Number(std::f64::consts::E));
    define_methods(interp, &math, MATH_METHODS);
    global.declare("Math", Value::Object(math));

    let json = JsObject::new(Some(Rc::clone(&realm_object)), ObjKind::Ordinary);
    define_methods(interp, &json, &[("stringify", json_stringify), ("parse", json_parse)]);
    global.declare("JSON", Value::Object(json));

    let process = install_process(interp);
    global.declare("process", process);
    let exports = interp.new_object();
    let module = interp.new_object();
    if let Value::Object(m) = &module {
        define(m, "exports", exports.clone());
    }
    global.declare("exports", exports);
    global.declare("module", module);

    crate::intrinsics::install(interp);
}

const ERROR_KINDS: &[(&str, NativeFn)] = &[
    ("Error", error_ctor),
    ("TypeError", type_error_ctor),
    ("RangeError", range_error_ctor),
    ("ReferenceError", reference_error_ctor),
    ("SyntaxError", syntax_error_ctor),
];

fn install_errors(interp: &mut Interpreter) {
    let base = JsObject::new(Some(Rc::clone(&interp.realm.object_proto)), ObjKind::Ordinary);
    for (name, f) in ERROR_KINDS {
        let proto = if *name == "Error" {
            Rc::clone(&base)
        } else {
            JsObject::new(Some(Rc::clone(&base)), ObjKind::Ordinary)
        };
        define(&proto, "name", Value::str(name));
        define(&proto, "message", Value::str(""));
        if *name == "Error" {
            define_methods(interp, &proto, &[("toString", error_to_string)]);
        }
        let ctor = constructor(interp, *name, *f, &proto);
        interp.realm.error_protos.insert(*name, proto);
        interp.global().declare(*name, Value::Object(ctor));
    }
}

fn install_process(interp: &Interpreter) -> Value {
    let process = JsObject::new(Some(Rc::clone(&interp.realm.object_proto)), ObjKind::Ordinary);
    let argv: Vec<Value> = interp.argv.iter().map(Value::str).collect();
    define(&process, "argv", interp.new_array(argv));
    let env = JsObject::new(Some(Rc::clone(&interp.realm.object_proto)), ObjKind::Ordinary);
    let mut vars: Vec<(String, String)> = std::env::vars().collect();
    vars.sort();
    for (k, v) in vars {
        define(&env, &k, Value::str(v));
    }
    define(&process, "env", Value::Object(env));
    define(&process, "platform", Value::str(crate::capabilities::node_platform()));
    define_methods(interp, &process, &[("exit", process_exit), ("cwd", process_cwd)]);
    let stdout = JsObject::new(Some(Rc::clone(&interp.realm.object_proto)), ObjKind::Ordinary);
    define_methods(interp, &stdout, &[("write", process_stdout_write)]);
    define(&process, "stdout", Value::Object(stdout));
    Value::Object(process)
}

// ---- 共通ヘルパ ----

fn not_a_function(interp: &Interpreter, v: &Value) -> Unwind {
    interp.throw_error("TypeError", &format!("{} is not a function", inspect(v)))
}

fn callback(interp: &Interpreter, args: &[Value]) -> Result<Value, Unwind> {
    let f = arg(args, 0);
    if f.is_callable() {
        Ok(f)
    } else {
        Err(not_a_function(interp, &f))
    }
}

/// 負数を末尾からの位置として扱う添字解決（`slice` 系）。
fn relative_index(v: &Value, len: usize, default: usize) -> usize {
    if matches!(v, Value::Undefined) {
        return default;
    }
    let n = to_number(v);
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

fn clamp_index(v: &Value, len: usize, default: usize) -> usize {
    if matches!(v, Value::Undefined) {
        return default;
    }
    let n = to_number(v);
    if n.is_nan() || n < 0.0 {
        0
    } else {
        n.trunc().min(len as f64) as usize
    }
}

fn array_items(interp: &Interpreter, this: &Value) -> Result<(ObjRef, Vec<Value>), Unwind> {
    if let Value::Object(o) = this {
        if let ObjKind::Array(items) = &o.borrow().kind {
            return Ok((Rc::clone(o), items.clone()));
        }
    }
    Err(interp.throw_error("TypeError", "Array.prototype method called on a non-array"))
}

fn with_items<R>(o: &ObjRef, f: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
    match &mut o.borrow_mut().kind {
        ObjKind::Array(items) => Some(f(items)),
        _ => None,
    }
}

/// `console.log` / `util.format` の書式化（`%s %d %i %f %j %o %%` を解釈）。
pub(crate) fn format_values(args: &[Value]) -> String {
    let render = |v: &Value| match v {
        Value::String(s) => s.to_string(),
        other => inspect(other),
    };
    let mut rest = args.iter();
    let mut out = match args.first() {
        Some(Value::String(fmt)) if fmt.contains('%') => {
            rest.next();
            let mut out = String::new();
            let mut chars = fmt.chars().peekable();
            while let Some(c) = chars.next() {
                if c != '%' {
                    out.push(c);
                    continue;
                }
                match chars.peek().copied() {
                    Some('%') => {
                        chars.next();
                        out.push('%');
                    }
                    Some(spec @ ('s' | 'd' | 'i' | 'f' | 'j' | 'o' | 'O')) => {
                        chars.next();
                        match rest.next() {
                            Some(v) => out.push_str(&match spec {
                                's' => to_display_string(v),
                                'd' | 'f' => number_to_string(to_number(v)),
                                'i' => number_to_string(to_number(v).trunc()),
                                'j' => to_json(v, &mut Vec::new())
                                    .ok()
                                    .flatten()
                                    .map(|j| j.to_string())
                                    .unwrap_or_else(|| "undefined".into()),
                                _ => inspect(v),
                            }),
                            None => {
                                out.push('%');
                                out.push(spec);
                            }
                        }
                    }
                    _ => out.push('%'),
                }
            }
            out
        }
        Some(first) => {
            rest.next();
            render(first)
        }
        None => String::new(),
    };
    for v in rest {
        out.push(' ');
        out.push_str(&render(v));
    }
    out
}

// ---- Object / Function ----

const OBJECT_PROTO_METHODS: &[(&str, NativeFn)] = &[
    ("hasOwnProperty", object_has_own_property),
    ("toString", object_to_string),
];

const OBJECT_STATICS: &[(&str, NativeFn)] = &[
    ("keys", object_keys),
    ("assign", object_assign),
    ("create", object_create),
    ("setPrototypeOf", object_set_prototype_of),
    ("getPrototypeOf", object_get_prototype_of),
];

fn object_ctor(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    match arg(args, 0) {
        v @ Value::Object(_) => Ok(v),
        _ => Ok(interp.new_object()),
    }
}

fn function_ctor(interp: &mut Interpreter, _this: Value, _args: &[Value]) -> Native {
    Err(interp.throw_error("Error", "Function constructor is not supported"))
}

fn object_has_own_property(_interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let key = property_key(&arg(args, 0));
    let own = match &this {
        Value::Object(o) => {
            let o = o.borrow();
            o.props.contains(&key)
                || match &o.kind {
                    ObjKind::Array(items) => {
                        key == "length" || array_index(&key).is_some_and(|i| i < items.len())
                    }
                    _ => false,
                }
        }
        Value::String(s) => key == "length" || array_index(&key).is_some_and(|i| i < s.chars().count()),
        _ => false,
    };
    Ok(Value::Bool(own))
}

fn object_to_string(_interp: &mut Interpreter, this: Value, _args: &[Value]) -> Native {
    let tag = match &this {
        Value::Undefined => "Undefined",
        Value::Null => "Null",
        Value::Object(o) => match o.borrow().kind {
            ObjKind::Array(_) => "Array",
            ObjKind::Function(_) => "Function",
            ObjKind::Error => "Error",
            ObjKind::Ordinary => "Object",
        },
        Value::String(_) => "String",
        Value::Number(_) => "Number",
        Value::Bool(_) => "Boolean",
    };
    Ok(Value::str(format!("[object {}]", tag)))
}

fn object_keys(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let target = arg(args, 0);
    if target.is_nullish() {
        return Err(interp.throw_error("TypeError", "Cannot convert undefined or null to object"));
    }
    let keys = interp.own_keys(&target).into_iter().map(Value::str).collect();
    Ok(interp.new_array(keys))
}

fn object_assign(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let target = arg(args, 0);
    if target.is_nullish() {
        return Err(interp.throw_error("TypeError", "Cannot convert undefined or null to object"));
    }
    for source in args.iter().skip(1) {
        for key in interp.own_keys(source) {
            let v = interp.get_member(source, &key)?;
            interp.put(&target, &key, v)?;
        }
    }
    Ok(target)
}

fn object_create(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    match arg(args, 0) {
        Value::Object(p) => Ok(Value::Object(JsObject::new(Some(p), ObjKind::Ordinary))),
        Value::Null => Ok(Value::Object(JsObject::new(None, ObjKind::Ordinary))),
        other => Err(interp.throw_error(
            "TypeError",
            &format!("Object prototype may only be an Object or null: {}", inspect(&other)),
        )),
    }
}

fn object_set_prototype_of(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let target = arg(args, 0);
    if let Value::Object(o) = &target {
        o.borrow_mut().proto = match arg(args, 1) {
            Value::Object(p) => Some(p),
            _ => None,
        };
    }
    Ok(target)
}

fn object_get_prototype_of(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let proto = match arg(args, 0) {
        Value::Object(o) => o.borrow().proto.clone(),
        Value::String(_) => Some(Rc::clone(&interp.realm.string_proto)),
        Value::Number(_) => Some(Rc::clone(&interp.realm.number_proto)),
        Value::Bool(_) => Some(Rc::clone(&interp.realm.boolean_proto)),
        _ => return Err(interp.throw_error("TypeError", "Cannot convert undefined or null to object")),
    };
    Ok(proto.map(Value::Object).unwrap_or(Value::Null))
}

const FUNCTION_PROTO_METHODS: &[(&str, NativeFn)] = &[
    ("call", function_call),
    ("apply", function_apply),
    ("toString", function_to_string),
];

fn function_call(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    if !this.is_callable() {
        return Err(not_a_function(interp, &this));
    }
    interp.call(&this, arg(args, 0), args.get(1..).unwrap_or(&[]))
}

fn function_apply(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    if !this.is_callable() {
        return Err(not_a_function(interp, &this));
    }
    let list = match arg(args, 1) {
        Value::Undefined | Value::Null => Vec::new(),
        other => array_items(interp, &other)?.1,
    };
    interp.call(&this, arg(args, 0), &list)
}

fn function_to_string(_interp: &mut Interpreter, this: Value, _args: &[Value]) -> Native {
    Ok(Value::str(to_display_string(&this)))
}

// ---- Array ----

const ARRAY_METHODS: &[(&str, NativeFn)] = &[
    ("push", array_push),
    ("pop", array_pop),
    ("shift", array_shift),
    ("unshift", array_unshift),
    ("join", array_join),
    ("indexOf", array_index_of),
    ("slice", array_slice),
    ("concat", array_concat),
    ("reverse", array_reverse),
    ("map", array_map),
    ("filter", array_filter),
    ("forEach", array_for_each),
    ("reduce", array_reduce),
    ("some", array_some),
    ("every", array_every),
    ("sort", array_sort),
    ("toString", array_to_string),
];

fn array_ctor(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    if let [Value::Number(n)] = args {
        if *n < 0.0 || n.fract() != 0.0 {
            return Err(interp.throw_error("RangeError", "Invalid array length"));
        }
        return Ok(interp.new_array(vec![Value::Undefined; *n as usize]));
    }
    Ok(interp.new_array(args.to_vec()))
}

fn array_is_array(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    Ok(Value::Bool(matches!(
        args.first(),
        Some(Value::Object(o)) if matches!(o.borrow().kind, ObjKind::Array(_))
    )))
}

fn array_push(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let (o, _) = array_items(interp, &this)?;
    let len = with_items(&o, |items| {
        items.extend(args.iter().cloned());
        items.len()
    })
    .unwrap_or(0);
    Ok(Value::Number(len as f64))
}

fn array_pop(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Native {
    let (o, _) = array_items(interp, &this)?;
    Ok(with_items(&o, Vec::pop).flatten().unwrap_or(Value::Undefined))
}

fn array_shift(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Native {
    let (o, _) = array_items(interp, &this)?;
    let first = with_items(&o, |items| (!items.is_empty()).then(|| items.remove(0)));
    Ok(first.flatten().unwrap_or(Value::Undefined))
}

fn array_unshift(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let (o, _) = array_items(interp, &this)?;
    let len = with_items(&o, |items| {
        items.splice(0..0, args.iter().cloned());
        items.len()
    })
    .unwrap_or(0);
    Ok(Value::Number(len as f64))
}

fn join_items(items: &[Value], sep: &str) -> String {
    items
        .iter()
        .map(|v| if v.is_nullish() { String::new() } else { to_display_string(v) })
        .collect::<Vec<_>>()
        .join(sep)
}

fn array_join(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let (_, items) = array_items(interp, &this)?;
    let sep = match arg(args, 0) {
        Value::Undefined => ",".to_string(),
        other => to_display_string(&other),
    };
    Ok(Value::str(join_items(&items, &sep)))
}

fn array_to_string(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Native {
    let (_, items) = array_items(interp, &this)?;
    Ok(Value::str(join_items(&items, ",")))
}

fn array_index_of(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let (_, items) = array_items(interp, &this)?;
    let needle = arg(args, 0);
    let from = relative_index(&arg(args, 1), items.len(), 0);
    let found = items
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, v)| strict_equals(v, &needle))
        .map(|(i, _)| i as f64)
        .unwrap_or(-1.0);
    Ok(Value::Number(found))
}

fn array_slice(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let (_, items) = array_items(interp, &this)?;
    let start = relative_index(&arg(args, 0), items.len(), 0);
    let end = relative_index(&arg(args, 1), items.len(), items.len());
    let slice = if start < end { items[start..end].to_vec() } else { Vec::new() };
    Ok(interp.new_array(slice))
}

fn array_concat(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let (_, mut items) = array_items(interp, &this)?;
    for a in args {
        match array_items(interp, a) {
            Ok((_, more)) => items.extend(more),
            Err(_) => items.push(a.clone()),
        }
    }
    Ok(interp.new_array(items))
}

fn array_reverse(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Native {
    let (o, _) = array_items(interp, &this)?;
    with_items(&o, |items| items.reverse());
    Ok(this)
}

fn array_map(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let (_, items) = array_items(interp, &this)?;
    let f = callback(interp, args)?;
    let mut out = Vec::with_capacity(items.len());
    for (i, v) in items.into_iter().enumerate() {
        out.push(interp.call(&f, arg(args, 1), &[v, Value::Number(i as f64), this.clone()])?);
    }
    Ok(interp.new_array(out))
}

fn array_filter(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let (_, items) = array_items(interp, &this)?;
    let f = callback(interp, args)?;
    let mut out = Vec::new();
    for (i, v) in items.into_iter().enumerate() {
        let keep = interp.call(&f, arg(args, 1), &[v.clone(), Value::Number(i as f64), this.clone()])?;
        if truthy(&keep) {
            out.push(v);
        }
    }
    Ok(interp.new_array(out))
}

fn array_for_each(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let (_, items) = array_items(interp, &this)?;
    let f = callback(interp, args)?;
    for (i, v) in items.into_iter().enumerate() {
        interp.call(&f, arg(args, 1), &[v, Value::Number(i as f64), this.clone()])?;
    }
    Ok(Value::Undefined)
}

fn array_reduce(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let (_, items) = array_items(interp, &this)?;
    let f = callback(interp, args)?;
    let mut iter = items.into_iter().enumerate();
    let mut acc = match args.get(1) {
        Some(init) => init.clone(),
        None => match iter.next() {
            Some((_, first)) => first,
            None => {
                return Err(interp.throw_error("TypeError", "Reduce of empty array with no initial value"))
            }
        },
    };
    for (i, v) in iter {
        acc = interp.call(&f, Value::Undefined, &[acc, v, Value::Number(i as f64), this.clone()])?;
    }
    Ok(acc)
}

fn array_some(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let (_, items) = array_items(interp, &this)?;
    let f = callback(interp, args)?;
    for (i, v) in items.into_iter().enumerate() {
        if truthy(&interp.call(&f, arg(args, 1), &[v, Value::Number(i as f64), this.clone()])?) {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn array_every(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let (_, items) = array_items(interp, &this)?;
    let f = callback(interp, args)?;
    for (i, v) in items.into_iter().enumerate() {
        if !truthy(&interp.call(&f, arg(args, 1), &[v, Value::Number(i as f64), this.clone()])?) {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

/// 安定なマージソート。比較関数の例外をそのまま伝播する。
fn merge_sort<F>(mut items: Vec<Value>, greater: &mut F) -> Result<Vec<Value>, Unwind>
where
    F: FnMut(&Value, &Value) -> Result<bool, Unwind>,
{
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(items, greater)?;
    let right = merge_sort(right, greater)?;
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut right = right.into_iter().peekable();
    for l in left {
        while let Some(r) = right.peek() {
            if !greater(&l, r)? {
                break;
            }
            out.extend(right.next());
        }
        out.push(l);
    }
    out.extend(right);
    Ok(out)
}

fn array_sort(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let (o, items) = array_items(interp, &this)?;
    let compare = args.first().filter(|v| v.is_callable()).cloned();
    let sorted = merge_sort(items, &mut |a: &Value, b: &Value| {
        Ok(match (a, b) {
            (Value::Undefined, _) => !matches!(b, Value::Undefined),
            (_, Value::Undefined) => false,
            _ => match &compare {
                Some(f) => {
                    let r = interp.call(f, Value::Undefined, &[a.clone(), b.clone()])?;
                    to_number(&r) > 0.0
                }
                None => to_display_string(a).cmp(&to_display_string(b)) == Ordering::Greater,
            },
        })
    })?;
    with_items(&o, |items| *items = sorted);
    Ok(this)
}

// ---- String ----

const STRING_METHODS: &[(&str, NativeFn)] = &[
    ("charAt", string_char_at),
    ("charCodeAt", string_char_code_at),
    ("indexOf", string_index_of),
    ("lastIndexOf", string_last_index_of),
    ("slice", string_slice),
    ("substring", string_substring),
    ("substr", string_substr),
    ("toUpperCase", string_to_upper_case),
    ("toLowerCase", string_to_lower_case),
    ("trim", string_trim),
    ("split", string_split),
    ("replace", string_replace),
    ("concat", string_concat),
    ("toString", string_to_string),
];

fn this_chars(this: &Value) -> Vec<char> {
    to_display_string(this).chars().collect()
}

fn string_ctor(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    Ok(match args.first() {
        Some(v) => Value::str(to_display_string(v)),
        None => Value::str(""),
    })
}

fn string_from_char_code(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let s: String = args
        .iter()
        .filter_map(|v| char::from_u32(to_number(v) as u32))
        .collect();
    Ok(Value::str(s))
}

fn string_char_at(_interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let chars = this_chars(&this);
    let i = to_number(&arg(args, 0));
    let i = if i.is_nan() { 0.0 } else { i.trunc() };
    Ok(Value::str(
        (i >= 0.0)
            .then(|| chars.get(i as usize))
            .flatten()
            .map(|c| c.to_string())
            .unwrap_or_default(),
    ))
}

fn string_char_code_at(_interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let chars = this_chars(&this);
    let i = to_number(&arg(args, 0));
    let i = if i.is_nan() { 0.0 } else { i.trunc() };
    Ok(Value::Number(
        (i >= 0.0)
            .then(|| chars.get(i as usize))
            .flatten()
            .map(|c| *c as u32 as f64)
            .unwrap_or(f64::NAN),
    ))
}

fn find_chars(hay: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(hay.len()));
    }
    (from..hay.len()).find(|&i| hay[i..].starts_with(needle))
}

fn string_index_of(_interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let hay = this_chars(&this);
    let needle: Vec<char> = to_display_string(&arg(args, 0)).chars().collect();
    let from = clamp_index(&arg(args, 1), hay.len(), 0);
    Ok(Value::Number(
        find_chars(&hay, &needle, from).map(|i| i as f64).unwrap_or(-1.0),
    ))
}

fn string_last_index_of(_interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let hay = this_chars(&this);
    let needle: Vec<char> = to_display_string(&arg(args, 0)).chars().collect();
    let found = (0..=hay.len())
        .rev()
        .find(|&i| hay[i..].starts_with(&needle));
    Ok(Value::Number(found.map(|i| i as f64).unwrap_or(-1.0)))
}

fn string_slice(_interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let chars = this_chars(&this);
    let start = relative_index(&arg(args, 0), chars.len(), 0);
    let end = relative_index(&arg(args, 1), chars.len(), chars.len());
    let s: String = if start < end { chars[start..end].iter().collect() } else { String::new() };
    Ok(Value::str(s))
}

fn string_substring(_interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let chars = this_chars(&this);
    let a = clamp_index(&arg(args, 0), chars.len(), 0);
    let b = clamp_index(&arg(args, 1), chars.len(), chars.len());
    let (start, end) = if a <= b { (a, b) } else { (b, a) };
    Ok(Value::str(chars[start..end].iter().collect::<String>()))
}

fn string_substr(_interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let chars = this_chars(&this);
    let start = relative_index(&arg(args, 0), chars.len(), 0);
    let len = match arg(args, 1) {
        Value::Undefined => chars.len() - start,
        v => {
            let n = to_number(&v);
            if n.is_nan() || n <= 0.0 { 0 } else { n.trunc() as usize }
        }
    };
    let end = (start + len).min(chars.len());
    Ok(Value::str(chars[start..end].iter().collect::<String>()))
}

fn string_to_upper_case(_interp: &mut Interpreter, this: Value, _args: &[Value]) -> Native {
    Ok(Value::str(to_display_string(&this).to_uppercase()))
}

fn string_to_lower_case(_interp: &mut Interpreter, this: Value, _args: &[Value]) -> Native {
    Ok(Value::str(to_display_string(&this).to_lowercase()))
}

fn string_trim(_interp: &mut Interpreter, this: Value, _args: &[Value]) -> Native {
    Ok(Value::str(to_display_string(&this).trim()))
}

fn string_split(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let s = to_display_string(&this);
    let limit = match arg(args, 1) {
        Value::Undefined => usize::MAX,
        v => to_number(&v).max(0.0) as usize,
    };
    let parts: Vec<Value> = match arg(args, 0) {
        Value::Undefined => vec![Value::str(&s)],
        sep => {
            let sep = to_display_string(&sep);
            if sep.is_empty() {
                s.chars().map(|c| Value::str(c.to_string())).collect()
            } else {
                s.split(sep.as_str()).map(Value::str).collect()
            }
        }
    };
    Ok(interp.new_array(parts.into_iter().take(limit).collect()))
}

fn string_replace(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let s = to_display_string(&this);
    let pattern = to_display_string(&arg(args, 0));
    let Some(at) = s.find(&pattern) else {
        return Ok(Value::str(s));
    };
    let replacement = match arg(args, 1) {
        f if f.is_callable() => {
            let offset = s[..at].chars().count() as f64;
            let r = interp.call(&f, Value::Undefined, &[Value::str(&pattern), Value::Number(offset), this.clone()])?;
            to_display_string(&r)
        }
        other => to_display_string(&other).replace("$&", &pattern),
    };
    Ok(Value::str(format!("{}{}{}", &s[..at], replacement, &s[at + pattern.len()..])))
}

fn string_concat(_interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let mut s = to_display_string(&this);
    for a in args {
        s.push_str(&to_display_string(a));
    }
    Ok(Value::str(s))
}

fn string_to_string(_interp: &mut Interpreter, this: Value, _args: &[Value]) -> Native {
    Ok(Value::str(to_display_string(&this)))
}

// ---- Number / Boolean ----

const NUMBER_METHODS: &[(&str, NativeFn)] = &[("toFixed", number_to_fixed), ("toString", number_to_string_method)];

const BOOLEAN_METHODS: &[(&str, NativeFn)] = &[("toString", string_to_string)];

fn number_ctor(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    Ok(Value::Number(args.first().map(to_number).unwrap_or(0.0)))
}

fn boolean_ctor(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    Ok(Value::Bool(args.first().is_some_and(truthy)))
}

fn number_is_integer(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    Ok(Value::Bool(matches!(
        args.first(),
        Some(Value::Number(n)) if n.is_finite() && n.fract() == 0.0
    )))
}

fn number_to_fixed(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let n = to_number(&this);
    let digits = to_number(&arg(args, 0));
    let digits = if digits.is_nan() { 0.0 } else { digits.trunc() };
    if !(0.0..=100.0).contains(&digits) {
        return Err(interp.throw_error("RangeError", "toFixed() digits argument must be between 0 and 100"));
    }
    if !n.is_finite() {
        return Ok(Value::str(number_to_string(n)));
    }
    Ok(Value::str(format!("{:.*}", digits as usize, n)))
}

fn number_to_string_method(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    let n = to_number(&this);
    let radix = match arg(args, 0) {
        Value::Undefined => 10,
        v => to_number(&v) as u32,
    };
    if !(2..=36).contains(&radix) {
        return Err(interp.throw_error("RangeError", "toString() radix must be between 2 and 36"));
    }
    if radix == 10 || !n.is_finite() || n.fract() != 0.0 {
        return Ok(Value::str(number_to_string(n)));
    }
    let mut digits = Vec::new();
    let mut m = n.abs() as u64;
    loop {
        digits.push(std::char::from_digit((m % radix as u64) as u32, radix).unwrap_or('0'));
        m /= radix as u64;
        if m == 0 {
            break;
        }
    }
    if n < 0.0 {
        digits.push('-');
    }
    Ok(Value::str(digits.iter().rev().collect::<String>()))
}

// ---- Error ----

/// `new Error(msg)` は新しいエラーを返し、`Error.call(this, msg)`（派生クラスの親呼び出し）は
/// `this` をエラーとして初期化する。
fn init_error(interp: &mut Interpreter, kind: &str, this: Value, args: &[Value]) -> Native {
    let message = match arg(args, 0) {
        Value::Undefined => String::new(),
        v => to_display_string(&v),
    };
    match this {
        Value::Object(o) if !matches!(o.borrow().kind, ObjKind::Function(_)) => {
            o.borrow_mut().kind = ObjKind::Error;
            if !message.is_empty() {
                define(&o, "message", Value::str(&message));
            }
            let headline = error_headline(&o);
            define(&o, "stack", Value::str(format!("{}\n    at <anonymous>", headline)));
            Ok(Value::Object(o))
        }
        _ => Ok(interp.make_error(kind, &message)),
    }
}

fn error_ctor(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    init_error(interp, "Error", this, args)
}

fn type_error_ctor(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    init_error(interp, "TypeError", this, args)
}

fn range_error_ctor(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    init_error(interp, "RangeError", this, args)
}

fn reference_error_ctor(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    init_error(interp, "ReferenceError", this, args)
}

fn syntax_error_ctor(interp: &mut Interpreter, this: Value, args: &[Value]) -> Native {
    init_error(interp, "SyntaxError", this, args)
}

fn error_to_string(_interp: &mut Interpreter, this: Value, _args: &[Value]) -> Native {
    match &this {
        Value::Object(o) => Ok(Value::str(error_headline(o))),
        other => Ok(Value::str(to_display_string(other))),
    }
}

// ---- 大域関数 ----

const GLOBAL_FUNCTIONS: &[(&str, NativeFn)] = &[
    ("parseInt", parse_int),
    ("parseFloat", parse_float),
    ("isNaN", is_nan),
    ("isFinite", is_finite),
    ("require", require),
];

fn parse_int(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let text = to_display_string(&arg(args, 0));
    let mut s = text.trim_start();
    let mut sign = 1.0;
    if let Some(rest) = s.strip_prefix('-') {
        sign = -1.0;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }
    let mut radix = match arg(args, 1) {
        Value::Undefined => 10,
        v => to_number(&v) as u32,
    };
    if radix == 0 {
        radix = 10;
    }
    if radix == 16 || matches!(arg(args, 1), Value::Undefined) {
        if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            s = rest;
            radix = 16;
        }
    }
    if !(2..=36).contains(&radix) {
        return Ok(Value::Number(f64::NAN));
    }
    let digits: Vec<u32> = s.chars().map_while(|c| c.to_digit(radix)).collect();
    if digits.is_empty() {
        return Ok(Value::Number(f64::NAN));
    }
    let n = digits.iter().fold(0.0, |acc, d| acc * radix as f64 + *d as f64);
    Ok(Value::Number(sign * n))
}

fn parse_float(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let text = to_display_string(&arg(args, 0));
    let s = text.trim_start();
    for (prefix, value) in [("Infinity", f64::INFINITY), ("+Infinity", f64::INFINITY), ("-Infinity", f64::NEG_INFINITY)] {
        if s.starts_with(prefix) {
            return Ok(Value::Number(value));
        }
    }
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let bytes = s.as_bytes();
    while end < bytes.len() {
        let c = bytes[end];
        let ok = match c {
            b'0'..=b'9' => true,
            b'+' | b'-' => end == 0 || matches!(bytes[end - 1], b'e' | b'E'),
            b'.' if !seen_dot && !seen_exp => {
                seen_dot = true;
                true
            }
            b'e' | b'E' if !seen_exp && end > 0 => {
                seen_exp = true;
                true
            }
            _ => false,
        };
        if !ok {
            break;
        }
        end += 1;
    }
    // 末尾の不完全な指数部・符号は捨てる
    let mut candidate = &s[..end];
    while !candidate.is_empty() && candidate.parse::<f64>().is_err() {
        candidate = &candidate[..candidate.len() - 1];
    }
    Ok(Value::Number(candidate.parse::<f64>().unwrap_or(f64::NAN)))
}

fn is_nan(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    Ok(Value::Bool(to_number(&arg(args, 0)).is_nan()))
}

fn is_finite(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    Ok(Value::Bool(to_number(&arg(args, 0)).is_finite()))
}

fn require(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let name = to_display_string(&arg(args, 0));
    interp.require(&name)
}

// ---- console / process ----

const CONSOLE_METHODS: &[(&str, NativeFn)] = &[
    ("log", console_log),
    ("info", console_log),
    ("error", console_error),
    ("warn", console_error),
];

fn console_log(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    emit_line(&format_values(args));
    Ok(Value::Undefined)
}

fn console_error(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    emit_error_line(&format_values(args));
    Ok(Value::Undefined)
}

fn process_exit(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let code = match arg(args, 0) {
        Value::Undefined => 0,
        v => to_number(&v) as i32,
    };
    Err(Unwind::Exit(code))
}

fn process_cwd(_interp: &mut Interpreter, _this: Value, _args: &[Value]) -> Native {
    let cwd = std::env::current_dir().unwrap_or_default();
    Ok(Value::str(cwd.to_string_lossy()))
}

fn process_stdout_write(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    emit_raw(&to_display_string(&arg(args, 0)));
    Ok(Value::Bool(true))
}

// ---- Math ----

const MATH_METHODS: &[(&str, NativeFn)] = &[
    ("abs", math_abs),
    ("floor", math_floor),
    ("ceil", math_ceil),
    ("round", math_round),
    ("sqrt", math_sqrt),
    ("pow", math_pow),
    ("max", math_max),
    ("min", math_min),
    ("random", math_random),
];

fn unary_math(args: &[Value], f: fn(f64) -> f64) -> Native {
    Ok(Value::Number(f(to_number(&arg(args, 0)))))
}

fn math_abs(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    unary_math(args, f64::abs)
}

fn math_floor(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    unary_math(args, f64::floor)
}

fn math_ceil(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    unary_math(args, f64::ceil)
}

fn math_round(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    // 0.5 は正の無限大方向へ丸める
    unary_math(args, |n| (n + 0.5).floor())
}

fn math_sqrt(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    unary_math(args, f64::sqrt)
}

fn math_pow(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    Ok(Value::Number(to_number(&arg(args, 0)).powf(to_number(&arg(args, 1)))))
}

fn math_max(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let mut acc = f64::NEG_INFINITY;
    for v in args {
        let n = to_number(v);
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        acc = acc.max(n);
    }
    Ok(Value::Number(acc))
}

fn math_min(_interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let mut acc = f64::INFINITY;
    for v in args {
        let n = to_number(v);
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        acc = acc.min(n);
    }
    Ok(Value::Number(acc))
}

thread_local! {
    static RANDOM_STATE: Cell<u64> = Cell::new(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x2545_f491_4f6c_dd1d)
            | 1,
    );
}

fn math_random(_interp: &mut Interpreter, _this: Value, _args: &[Value]) -> Native {
    // xorshift64*
    let bits = RANDOM_STATE.with(|state| {
        let mut x = state.get();
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        state.set(x);
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    });
    Ok(Value::Number((bits >> 11) as f64 / (1u64 << 53) as f64))
}

// ---- JSON ----

/// 値を JSON へ変換する。`undefined` と関数は `None`（オブジェクトでは省略）。
fn to_json(v: &Value, seen: &mut Vec<*const std::cell::RefCell<JsObject>>) -> Result<Option<Json>, String> {
    Ok(Some(match v {
        Value::Undefined => return Ok(None),
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => {
            if !n.is_finite() {
                Json::Null
            } else if n.fract() == 0.0 && n.abs() < 1e15 {
                Json::from(*n as i64)
            } else {
                serde_json::Number::from_f64(*n).map(Json::Number).unwrap_or(Json::Null)
            }
        }
        Value::String(s) => Json::String(s.to_string()),
        Value::Object(o) => {
            let ptr = Rc::as_ptr(o);
            if seen.contains(&ptr) {
                return Err("Converting circular structure to JSON".into());
            }
            if matches!(o.borrow().kind, ObjKind::Function(_)) {
                return Ok(None);
            }
            seen.push(ptr);
            let borrowed = o.borrow();
            let out = match &borrowed.kind {
                ObjKind::Array(items) => {
                    let mut arr = Vec::with_capacity(items.len());
                    for it in items {
                        arr.push(to_json(it, seen)?.unwrap_or(Json::Null));
                    }
                    Json::Array(arr)
                }
                _ => {
                    let mut map = serde_json::Map::new();
                    for (k, val) in borrowed.props.entries() {
                        if let Some(j) = to_json(val, seen)? {
                            map.insert(k.clone(), j);
                        }
                    }
                    Json::Object(map)
                }
            };
            seen.pop();
            out
        }
    }))
}

fn from_json(interp: &Interpreter, j: &Json) -> Value {
    match j {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => Value::str(s),
        Json::Array(items) => interp.new_array(items.iter().map(|it| from_json(interp, it)).collect()),
        Json::Object(map) => {
            let obj = JsObject::new(Some(Rc::clone(&interp.realm.object_proto)), ObjKind::Ordinary);
            for (k, v) in map {
                define(&obj, k, from_json(interp, v));
            }
            Value::Object(obj)
        }
    }
}

fn json_stringify(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let json = match to_json(&arg(args, 0), &mut Vec::new()) {
        Ok(Some(j)) => j,
        Ok(None) => return Ok(Value::Undefined),
        Err(msg) => return Err(interp.throw_error("TypeError", &msg)),
    };
    let indent = match arg(args, 2) {
        Value::Number(n) if n >= 1.0 => " ".repeat(n.min(10.0) as usize),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };
    if indent.is_empty() {
        return Ok(Value::str(json.to_string()));
    }
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    json.serialize(&mut ser)
        .map_err(|e| interp.throw_error("TypeError", &e.to_string()))?;
    Ok(Value::str(String::from_utf8_lossy(&buf)))
}

fn json_parse(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Native {
    let text = to_display_string(&arg(args, 0));
    match serde_json::from_str::<Json>(&text) {
        Ok(j) => Ok(from_json(interp, &j)),
        Err(e) => Err(interp.throw_error("SyntaxError", &format!("Unexpected token in JSON: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(src: &str) -> String {
        let mut interp = Interpreter::new();
        inspect(&interp.run(src).unwrap())
    }

    #[test]
    /// 配列メソッドとコールバック。
    fn array_methods() {
        assert_eq!(eval("[1, 2, 3].map(function (x) { return x * 2; });"), "[ 2, 4, 6 ]");
        assert_eq!(eval("[3, 1, 2].sort();"), "[ 1, 2, 3 ]");
        assert_eq!(eval("[10, 9, 1].sort(function (a, b) { return a - b; });"), "[ 1, 9, 10 ]");
        assert_eq!(eval("[1, 2, 3, 4].reduce(function (a, b) { return a + b; }, 0);"), "10");
        assert_eq!(eval("var a = [1]; a.push(2, 3); a.slice(-2);"), "[ 2, 3 ]");
        assert_eq!(eval("[1, [2, 3]].concat([4], 5).length;"), "4");
    }

    #[test]
    /// 文字列メソッド。
    fn string_methods() {
        assert_eq!(eval("'hello'.charAt(1);"), "'e'");
        assert_eq!(eval("'a,b,,c'.split(',');"), "[ 'a', 'b', '', 'c' ]");
        assert_eq!(eval("'  pad '.trim().toUpperCase();"), "'PAD'");
        assert_eq!(eval("'abcdef'.substring(4, 1);"), "'bcd'");
        assert_eq!(eval("'aXbX'.replace('X', '-');"), "'a-bX'");
        assert_eq!(eval("'abc'.lastIndexOf('c');"), "2");
    }

    #[test]
    /// 数値関連の組み込み。
    fn number_builtins() {
        assert_eq!(eval("(3.14159).toFixed(2);"), "'3.14'");
        assert_eq!(eval("(255).toString(16);"), "'ff'");
        assert_eq!(eval("parseInt('42px');"), "42");
        assert_eq!(eval("parseInt('0x1f');"), "31");
        assert_eq!(eval("parseFloat('3.5e2xyz');"), "350");
        assert_eq!(eval("isNaN(parseInt('z'));"), "true");
        assert_eq!(eval("Math.max(1, 5, 3) + Math.round(2.5);"), "8");
    }

    #[test]
    /// JSON の往復でキー順と数値表記が保たれる。
    fn json_stringify_and_parse() {
        assert_eq!(eval("JSON.stringify({ b: 1, a: [true, null, 'x'], u: undefined });"), "'{\"b\":1,\"a\":[true,null,\"x\"]}'");
        assert_eq!(eval("JSON.stringify(1.5);"), "'1.5'");
        assert_eq!(eval("JSON.parse('{\"k\": [1, 2]}').k[1];"), "2");
        assert_eq!(eval("JSON.stringify({ a: 1 }, null, 2);"), "'{\\n  \"a\": 1\\n}'");
        let mut interp = Interpreter::new();
        let err = interp.run("var o = {}; o.self = o; JSON.stringify(o);").unwrap_err();
        assert!(err.to_string().starts_with("TypeError: Converting circular structure"));
    }

    #[test]
    /// console.log の書式指定子と出力捕捉。
    fn console_formatting() {
        let (_, lines) = crate::runtime::capture_output(|| {
            let mut interp = Interpreter::new();
            interp.run("console.log('%s has %d items', 'cart', 3); console.log('x', 1, [1]);").unwrap();
        });
        assert_eq!(lines, vec!["cart has 3 items".to_string(), "x 1 [ 1 ]".to_string()]);
    }

    #[test]
    /// エラーコンストラクタと継承関係。
    fn error_constructors() {
        assert_eq!(eval("new TypeError('bad') instanceof Error;"), "true");
        assert_eq!(eval("String(new RangeError('r'));"), "'RangeError: r'");
        assert_eq!(eval("Object.keys({ x: 1, y: 2 });"), "[ 'x', 'y' ]");
        assert_eq!(eval("Object.getPrototypeOf(Object.create(null));"), "null");
    }
}
