// パス: src/intrinsics.rs
// 役割: 下位変換した出力が参照する補助関数（`__extends` など）を集約する
// 意図: 出力側の補助関数ソースと、実行環境側のネイティブ実装を同じ表で管理する
// 関連ファイル: src/codegen/es5.rs, src/primitives.rs, src/evaluator.rs

use std::rc::Rc;

use crate::evaluator::Interpreter;
use crate::runtime::{JsObject, NativeFn, ObjKind, Unwind, Value};

/// 補助関数の種類。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IntrinsicKind {
    /// クラス継承（`class A extends B`）。
    Extends,
    /// オブジェクトスプレッド（`{ ...a }`）。
    Assign,
}

/// 補助関数のメタデータ。
#[derive(Clone, Copy)]
pub struct Intrinsic {
    pub name: &'static str,
    pub kind: IntrinsicKind,
    /// `--emit-helpers` 指定時に出力先頭へ置く定義。
    pub source: &'static str,
    native: NativeFn,
}

const EXTENDS_SOURCE: &str = "var __extends = (this && this.__extends) || function (d, b) {
    for (var p in b) if (b.hasOwnProperty(p)) d[p] = b[p];
    function __() { this.constructor = d; }
    if (b === null) {
        d.prototype = Object.create(b);
    } else {
        __.prototype = b.prototype;
        d.prototype = new __();
    }
};";

const ASSIGN_SOURCE: &str = "var __assign = (this && this.__assign) || Object.assign || function (t) {
    for (var s, i = 1, n = arguments.length; i < n; i++) {
        s = arguments[i];
        for (var p in s) if (Object.prototype.hasOwnProperty.call(s, p)) t[p] = s[p];
    }
    return t;
};";

const INTRINSICS: &[Intrinsic] = &[
    Intrinsic {
        name: "__extends",
        kind: IntrinsicKind::Extends,
        source: EXTENDS_SOURCE,
        native: extends,
    },
    Intrinsic {
        name: "__assign",
        kind: IntrinsicKind::Assign,
        source: ASSIGN_SOURCE,
        native: assign,
    },
];

/// 名前から補助関数を検索する。
pub fn lookup(name: &str) -> Option<Intrinsic> {
    INTRINSICS.iter().copied().find(|intr| intr.name == name)
}

/// 種類から補助関数を取り出す。
pub fn of_kind(kind: IntrinsicKind) -> Intrinsic {
    INTRINSICS
        .iter()
        .copied()
        .find(|intr| intr.kind == kind)
        .unwrap_or(INTRINSICS[0])
}

/// 補助関数をネイティブ関数として大域へ登録する。
pub fn install(interp: &mut Interpreter) {
    for intr in INTRINSICS {
        let f = interp.native_fn(intr.name, intr.native);
        interp.global().declare(intr.name, f);
    }
}

fn extends(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Unwind> {
    let derived = args.first().cloned().unwrap_or(Value::Undefined);
    let base = args.get(1).cloned().unwrap_or(Value::Undefined);
    if !derived.is_callable() || !(base.is_callable() || matches!(base, Value::Null)) {
        return Err(interp.throw_error(
            "TypeError",
            "Class extends value is not a constructor or null",
        ));
    }
    let base_proto = match &base {
        Value::Null => None,
        _ => {
            for key in interp.own_keys(&base) {
                if key == "prototype" {
                    continue;
                }
                let v = interp.get_member(&base, &key)?;
                interp.put(&derived, &key, v)?;
            }
            match interp.get_member(&base, "prototype")? {
                Value::Object(p) => Some(p),
                _ => None,
            }
        }
    };
    let proto = JsObject::new(base_proto, ObjKind::Ordinary);
    proto
        .borrow_mut()
        .props
        .set("constructor", derived.clone());
    interp.put(&derived, "prototype", Value::Object(Rc::clone(&proto)))?;
    Ok(Value::Undefined)
}

fn assign(interp: &mut Interpreter, _this: Value, args: &[Value]) -> Result<Value, Unwind> {
    let target = args.first().cloned().unwrap_or(Value::Undefined);
    for source in args.iter().skip(1) {
        for key in interp.own_keys(source) {
            let v = interp.get_member(source, &key)?;
            interp.put(&target, &key, v)?;
        }
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::inspect;

    #[test]
    /// 名前と種類の双方から引ける。
    fn lookup_by_name_and_kind() {
        assert_eq!(lookup("__extends").map(|i| i.kind), Some(IntrinsicKind::Extends));
        assert!(lookup("__missing").is_none());
        assert!(of_kind(IntrinsicKind::Assign).source.starts_with("var __assign"));
    }

    #[test]
    /// `__extends` はプロトタイプ連鎖と静的メンバを引き継ぐ。
    fn extends_links_prototypes() {
        let mut interp = Interpreter::new();
        let src = "function B() {} B.prototype.hi = function () { return 'hi'; }; B.make = 1;\n\
                   function D() { B.call(this); } __extends(D, B);\n\
                   var d = new D(); [d.hi(), d instanceof B, D.make, d.constructor === D];";
        assert_eq!(inspect(&interp.run(src).unwrap()), "[ 'hi', true, 1, true ]");
    }

    #[test]
    /// 補助関数の定義ソースも同じ意味で動く。
    fn helper_sources_run() {
        let mut interp = Interpreter::new();
        let src = format!(
            "{}\n{}\nvar o = __assign({{}}, {{ a: 1 }}, {{ b: 2 }}); Object.keys(o).length;",
            EXTENDS_SOURCE, ASSIGN_SOURCE
        );
        assert_eq!(inspect(&interp.run(&src).unwrap()), "2");
    }
}
