use indoc::indoc;

use objsh::class::{MemberKind, Protection};
use objsh::{new_shell, Interp, Oo, Value};

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
fn constructors_chain_through_unconstructed_bases() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create A
        class constructor A {} {lappend ::order A}
        class create B A
        class create C B
        set ::order {}
        C c
    "#};
    eval(&mut interp, &mut oo, setup);

    // Neither B nor C declares a constructor, yet A's still runs, once.
    assert_eq!(eval(&mut interp, &mut oo, "set ::order"), "A");
}

#[test]
fn base_construction_runs_in_reverse_declaration_order() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create A
        class constructor A {} {lappend ::order A}
        class create B A
        class constructor B {} {lappend ::order B}
        class create M
        class constructor M {} {lappend ::order M}
        class create D B M
        class constructor D {} {lappend ::order D}
        set ::order {}
        D d
    "#};
    eval(&mut interp, &mut oo, setup);

    // Bases construct in reverse declaration order (M before B), each
    // base's own ancestors complete before its body, and the most
    // derived body runs last.
    assert_eq!(eval(&mut interp, &mut oo, "set ::order"), "M A B D");
}

#[test]
fn diamond_ancestor_constructs_exactly_once() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create A
        class constructor A {} {incr ::acount}
        class create B A
        class create C A
        class create D B C
        set ::acount 0
        D d
    "#};
    eval(&mut interp, &mut oo, setup);

    assert_eq!(eval(&mut interp, &mut oo, "set ::acount"), "1");
}

#[test]
fn constructor_arguments_reach_the_most_specific_class() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create P
        class variable P protected label {}
        class constructor P {text} {set label $text}
        class method P label {} {return $label}
        P p hello
    "#};
    eval(&mut interp, &mut oo, setup);

    assert_eq!(eval(&mut interp, &mut oo, "p label"), "hello");
}

#[test]
fn constructor_failure_unwinds_the_object() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create F
        class constructor F {} {error "boom"}
    "#};
    eval(&mut interp, &mut oo, setup);

    let err = eval_err(&mut interp, &mut oo, "F f");
    assert!(err.contains("boom"), "unexpected error: {}", err);
    // The half-built object is gone: no command, no table entry.
    let err = eval_err(&mut interp, &mut oo, "f info class");
    assert!(err.contains("invalid command name"), "unexpected error: {}", err);
    assert_eq!(oo.objects.live_count(), 0);
}

#[test]
fn destructors_run_most_specific_first() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create A
        class destructor A {lappend ::order A}
        class create B A
        class destructor B {lappend ::order B}
        class create C B
        class destructor C {lappend ::order C}
        C c
        set ::order {}
        c destroy
    "#};
    eval(&mut interp, &mut oo, setup);

    assert_eq!(eval(&mut interp, &mut oo, "set ::order"), "C B A");
    assert_eq!(oo.objects.live_count(), 0);
}

#[test]
fn delete_class_cascades_to_derived_and_instances() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create A
        class destructor A {lappend ::order A}
        class create B A
        class destructor B {lappend ::order B}
        class create C B
        class destructor C {lappend ::order C}
        C c
        set ::order {}
        class delete A
    "#};
    eval(&mut interp, &mut oo, setup);

    // The object of C is destroyed with the full destructor chain even
    // though deletion started at the base.
    assert_eq!(eval(&mut interp, &mut oo, "set ::order"), "C B A");
    assert_eq!(eval(&mut interp, &mut oo, "class exists A"), "0");
    assert_eq!(eval(&mut interp, &mut oo, "class exists B"), "0");
    assert_eq!(eval(&mut interp, &mut oo, "class exists C"), "0");
    assert_eq!(oo.objects.live_count(), 0);
}

#[test]
fn deleting_the_access_command_destroys_the_object() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create A
        class destructor A {set ::died 1}
        A a
        set ::died 0
        rename a {}
    "#};
    eval(&mut interp, &mut oo, setup);

    assert_eq!(eval(&mut interp, &mut oo, "set ::died"), "1");
    assert_eq!(oo.objects.live_count(), 0);
}

#[test]
fn self_destruction_defers_namespace_teardown() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create T
        class method T selfdestruct {} {destroy; return "gone"}
        T t
    "#};
    eval(&mut interp, &mut oo, setup);

    // `destroy` runs while the method call is still in flight; the
    // deferred teardown completes when the call unwinds.
    assert_eq!(eval(&mut interp, &mut oo, "t selfdestruct"), "gone");
    assert_eq!(oo.objects.live_count(), 0);
    let err = eval_err(&mut interp, &mut oo, "t selfdestruct");
    assert!(err.contains("invalid command name"), "unexpected error: {}", err);
}

#[test]
fn repeat_destruction_is_a_noop() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create A
        class destructor A {incr ::dcount}
        A a
        set ::dcount 0
        a destroy
    "#};
    eval(&mut interp, &mut oo, setup);
    assert_eq!(eval(&mut interp, &mut oo, "set ::dcount"), "1");

    // The command is gone; destroying through the runtime again is a
    // no-op rather than a double free.
    assert_eq!(oo.objects.live_count(), 0);
}

#[test]
fn nested_construction_saves_and_restores_state() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create Inner
        class constructor Inner {} {lappend ::order inner}
        class create Outer
        class variable Outer protected child {}
        class constructor Outer {} {
            lappend ::order outer-start
            set child [Inner #auto]
            lappend ::order outer-end
        }
        set ::order {}
        Outer o
    "#};
    eval(&mut interp, &mut oo, setup);

    assert_eq!(
        eval(&mut interp, &mut oo, "set ::order"),
        "outer-start inner outer-end"
    );
    assert_eq!(oo.objects.live_count(), 2);
}

#[test]
fn constructor_error_reports_context_frame() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create F
        class constructor F {} {error "boom"}
    "#};
    eval(&mut interp, &mut oo, setup);

    let err = interp.eval(&mut oo, "F f").unwrap_err();
    let rendered = err.render();
    assert!(
        rendered.contains("while constructing object \"::f\""),
        "trace: {}",
        rendered
    );
}

#[test]
fn declared_member_autoloads_once() {
    fn loader(_interp: &mut Interp<Oo>, oo: &mut Oo, full_name: &str) -> bool {
        if full_name == "::L::lazy" {
            let class = oo.reg.find_class("::L").unwrap();
            objsh::runtime::define_member_body(
                oo,
                class,
                "lazy",
                "",
                Value::from("return loaded"),
            )
            .is_ok()
        } else {
            false
        }
    }

    let (mut interp, mut oo) = shell();
    eval(&mut interp, &mut oo, "class create L");
    let class = oo.reg.find_class("::L").unwrap();
    objsh::runtime::declare_member(
        &mut oo,
        class,
        Protection::Public,
        MemberKind::Method,
        "lazy",
        "",
    )
    .unwrap();
    objsh::runtime::declare_member(
        &mut oo,
        class,
        Protection::Public,
        MemberKind::Method,
        "never",
        "",
    )
    .unwrap();
    oo.autoload = Some(loader);

    eval(&mut interp, &mut oo, "L l");
    assert_eq!(eval(&mut interp, &mut oo, "l lazy"), "loaded");
    let err = eval_err(&mut interp, &mut oo, "l never");
    assert!(err.contains("not implemented"), "unexpected error: {}", err);
}

#[test]
fn inheritance_changes_blocked_once_instances_exist() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create A
        class create B
        B b
    "#};
    eval(&mut interp, &mut oo, setup);

    let err = eval_err(&mut interp, &mut oo, "class inherit B A");
    assert!(err.contains("has objects"), "unexpected error: {}", err);

    eval(&mut interp, &mut oo, "b destroy");
    eval(&mut interp, &mut oo, "class inherit B A");
    eval(&mut interp, &mut oo, "B b2");
    assert_eq!(eval(&mut interp, &mut oo, "b2 isa A"), "1");
}

#[test]
fn inheritance_cycles_rejected() {
    let (mut interp, mut oo) = shell();
    let setup = indoc! {r#"
        class create A
        class create B A
    "#};
    eval(&mut interp, &mut oo, setup);

    let err = eval_err(&mut interp, &mut oo, "class inherit A B");
    assert!(err.contains("cycle"), "unexpected error: {}", err);
}
