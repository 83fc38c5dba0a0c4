use indoc::indoc;

use objsh::{new_shell, Interp, Oo};

fn shell() -> (Interp<Oo>, Oo) {
    new_shell()
}

fn eval(interp: &mut Interp<Oo>, oo: &mut Oo, script: &str) -> String {
    match interp.eval(oo, script) {
        Ok(v) => v.to_string(),
        Err(e) => panic!("script failed: {}\nscript: {}", e.render(), script),
    }
}

fn eval_err(interp: &mut Interp<Oo>, oo: &mut Oo, script: &str) -> String {
    match interp.eval(oo, script) {
        Ok(v) => panic!("expected error, got \"{}\"\nscript: {}", v, script),
        Err(e) => e.value.to_string(),
    }
}

#[test]
fn basic_inheritance_shadows_base_method() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create Base
        class method Base greet {} {return "base"}
        class create Derived Base
        class method Derived greet {} {return "derived"}
        Derived d
    "#};
    eval(&mut interp, &mut oo, setup);

    assert_eq!(eval(&mut interp, &mut oo, "d greet"), "derived");
    // The base version stays reachable under its qualified name.
    assert_eq!(eval(&mut interp, &mut oo, "d Base::greet"), "base");
}

#[test]
fn qualified_call_from_derived_scope() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create Base
        class method Base greet {} {return "base"}
        class create Derived Base
        class method Derived greet {} {return "derived"}
        class method Derived callBase {} {return [Base::greet]}
        class method Derived callOwn {} {return [greet]}
        Derived d
    "#};
    eval(&mut interp, &mut oo, setup);

    assert_eq!(eval(&mut interp, &mut oo, "d callBase"), "base");
    assert_eq!(eval(&mut interp, &mut oo, "d callOwn"), "derived");
}

#[test]
fn private_variables_stay_in_their_class() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create A
        class variable A private x aVal
        class method A getAx {} {return $x}
        class create B A
        class variable B public x bVal
        class method B getBx {} {return $x}
        B b
    "#};
    eval(&mut interp, &mut oo, setup);

    // A's bodies see A's x, B's bodies see B's x; no crossover.
    assert_eq!(eval(&mut interp, &mut oo, "b getAx"), "aVal");
    assert_eq!(eval(&mut interp, &mut oo, "b getBx"), "bVal");
}

#[test]
fn protection_levels_are_enforced() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create S
        class method S private secret {} {return hidden}
        class method S public reveal {} {return [secret]}
        S s
    "#};
    eval(&mut interp, &mut oo, setup);

    let err = eval_err(&mut interp, &mut oo, "s secret");
    assert!(err.contains("private"), "unexpected error: {}", err);
    assert_eq!(eval(&mut interp, &mut oo, "s reveal"), "hidden");
}

#[test]
fn protected_methods_reachable_from_derived() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create A
        class method A protected helper {} {return helped}
        class create B A
        class method B public go {} {return [helper]}
        B b
    "#};
    eval(&mut interp, &mut oo, setup);

    assert_eq!(eval(&mut interp, &mut oo, "b go"), "helped");
    let err = eval_err(&mut interp, &mut oo, "b helper");
    assert!(err.contains("protected"), "unexpected error: {}", err);
}

#[test]
fn duplicate_definition_in_same_class_rejected() {
    let (mut interp, mut oo) = shell();
    eval(&mut interp, &mut oo, "class create A");
    eval(&mut interp, &mut oo, "class method A m {} {return 1}");
    let err = eval_err(&mut interp, &mut oo, "class method A m {} {return 2}");
    assert!(err.contains("already defined"), "unexpected error: {}", err);
}

#[test]
fn unknown_method_reports_alternatives() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create A
        class method A ping {} {return pong}
        A a
    "#};
    eval(&mut interp, &mut oo, setup);

    let err = eval_err(&mut interp, &mut oo, "a nosuch");
    assert!(err.contains("bad option \"nosuch\""), "unexpected error: {}", err);
    assert!(err.contains("ping"), "listing should include ping: {}", err);
    assert!(err.contains("configure"), "listing should include builtins: {}", err);
}

#[test]
fn wrong_arg_count_names_usage() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create S
        class method S hello {who} {return "hi $who"}
        S s
    "#};
    eval(&mut interp, &mut oo, setup);

    assert_eq!(eval(&mut interp, &mut oo, "s hello world"), "hi world");
    let err = eval_err(&mut interp, &mut oo, "s hello");
    assert!(
        err.contains("wrong # args") && err.contains("s hello who"),
        "unexpected error: {}",
        err
    );
}

#[test]
fn common_procs_run_without_an_object() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create Counter
        class common Counter public count 0
        class proc Counter bump {} {incr count}
    "#};
    eval(&mut interp, &mut oo, setup);

    assert_eq!(eval(&mut interp, &mut oo, "Counter::bump"), "1");
    assert_eq!(eval(&mut interp, &mut oo, "Counter::bump"), "2");
    // Commons are shared: visible from every instance.
    eval(&mut interp, &mut oo, "class method Counter read {} {return $count}");
    eval(&mut interp, &mut oo, "Counter c");
    assert_eq!(eval(&mut interp, &mut oo, "c read"), "2");
}

#[test]
fn methods_need_an_object_context() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create A
        class method A m {} {return 1}
    "#};
    eval(&mut interp, &mut oo, setup);

    let err = eval_err(&mut interp, &mut oo, "A::m");
    assert!(err.contains("no object context"), "unexpected error: {}", err);
}

#[test]
fn method_variable_accessor_reads_and_writes() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create M
        class methodvariable M speed 5
        M m
    "#};
    eval(&mut interp, &mut oo, setup);

    assert_eq!(eval(&mut interp, &mut oo, "m speed"), "5");
    assert_eq!(eval(&mut interp, &mut oo, "m speed 9"), "9");
    assert_eq!(eval(&mut interp, &mut oo, "m speed"), "9");
}

#[test]
fn this_follows_renames() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create R
        class method R whoami {} {return $this}
        R r
    "#};
    eval(&mut interp, &mut oo, setup);

    assert_eq!(eval(&mut interp, &mut oo, "r whoami"), "::r");
    eval(&mut interp, &mut oo, "rename r r2");
    assert_eq!(eval(&mut interp, &mut oo, "r2 whoami"), "::r2");
}

#[test]
fn isa_tests_heritage() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create A
        class create B A
        class create C B
        C c
        A a
    "#};
    eval(&mut interp, &mut oo, setup);

    assert_eq!(eval(&mut interp, &mut oo, "c isa A"), "1");
    assert_eq!(eval(&mut interp, &mut oo, "c isa B"), "1");
    assert_eq!(eval(&mut interp, &mut oo, "c isa C"), "1");
    assert_eq!(eval(&mut interp, &mut oo, "a isa C"), "0");
    let err = eval_err(&mut interp, &mut oo, "c isa NoSuch");
    assert!(err.contains("unknown class"), "unexpected error: {}", err);
}

#[test]
fn info_reports_class_and_heritage() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create A
        class create B A
        B b
    "#};
    eval(&mut interp, &mut oo, setup);

    assert_eq!(eval(&mut interp, &mut oo, "b info class"), "::B");
    assert_eq!(eval(&mut interp, &mut oo, "b info inherit"), "::A");
    let heritage = eval(&mut interp, &mut oo, "b info heritage");
    assert!(heritage.starts_with("::B ::A"), "heritage: {}", heritage);
}
